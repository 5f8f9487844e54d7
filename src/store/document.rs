use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ArtifactMap, ProjectStore, SampleStream, StoreError, StoredSample};
use crate::ml::VariantTag;
use crate::project::{ClassIndex, ClassLabels, ProjectMeta};

/// SQLite schema management for the document store.
mod schema;
/// Error mapping and path helpers.
mod util;

use util::map_sql_error;

/// Samples fetched per query while streaming.
const PAGE_SIZE: i64 = 64;

/// Projects as JSON documents with a per-project image sub-collection, kept in SQLite.
pub struct DocumentStore {
    connection: Mutex<Connection>,
    location: String,
}

/// The stored project document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectDoc {
    labels: [String; 3],
    #[serde(default)]
    counters: [u64; 3],
    /// Inverse of the persistent flag.
    #[serde(default = "default_temporary")]
    temporary: bool,
    #[serde(default)]
    active_variant: VariantTag,
    /// Base64 artifact blobs.
    #[serde(default)]
    models: BTreeMap<VariantTag, String>,
}

fn default_temporary() -> bool {
    true
}

impl ProjectDoc {
    fn from_meta(meta: &ProjectMeta) -> Self {
        Self {
            labels: meta.class_labels.as_array().clone(),
            counters: meta.counters,
            temporary: !meta.persistent,
            active_variant: meta.active_variant,
            models: BTreeMap::new(),
        }
    }

    fn to_meta(&self, name: &str) -> Result<ProjectMeta, StoreError> {
        let class_labels = ClassLabels::new(self.labels.clone())
            .map_err(|err| StoreError::Corrupt(format!("{name}: {err}")))?;
        Ok(ProjectMeta {
            name: name.to_string(),
            class_labels,
            counters: self.counters,
            persistent: !self.temporary,
            active_variant: self.active_variant,
        })
    }
}

impl DocumentStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        util::create_parent_if_needed(path)?;
        let connection = Connection::open(path).map_err(map_sql_error)?;
        Self::from_connection(connection, busy_timeout, path.display().to_string())
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(busy_timeout: Duration) -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(map_sql_error)?;
        Self::from_connection(connection, busy_timeout, ":memory:".to_string())
    }

    fn from_connection(
        connection: Connection,
        busy_timeout: Duration,
        location: String,
    ) -> Result<Self, StoreError> {
        schema::apply_pragmas(&connection, busy_timeout)?;
        schema::apply_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            location,
        })
    }

    /// Database path, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch_page(
        &self,
        project: &str,
        after: (i64, i64),
    ) -> Result<Vec<(i64, i64, String)>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached(
                "SELECT class_index, sequence, image FROM project_images
                 WHERE project_id = ?1 AND (class_index, sequence) > (?2, ?3)
                 ORDER BY class_index, sequence
                 LIMIT ?4",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![project, after.0, after.1, PAGE_SIZE], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(map_sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)
    }
}

fn read_doc(conn: &Connection, name: &str) -> Result<ProjectDoc, StoreError> {
    let doc: Option<String> = conn
        .query_row("SELECT doc FROM projects WHERE id = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()
        .map_err(map_sql_error)?;
    let doc = doc.ok_or_else(|| StoreError::NotFound(name.to_string()))?;
    Ok(serde_json::from_str(&doc)?)
}

fn write_doc(conn: &Connection, name: &str, doc: &ProjectDoc) -> Result<(), StoreError> {
    let json = serde_json::to_string(doc)?;
    conn.execute(
        "UPDATE projects SET doc = ?2 WHERE id = ?1",
        params![name, json],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

impl ProjectStore for DocumentStore {
    fn backend_name(&self) -> &'static str {
        "document"
    }

    fn create_project(&self, meta: &ProjectMeta) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM projects WHERE id = ?1",
                params![meta.name],
                |_| Ok(()),
            )
            .optional()
            .map_err(map_sql_error)?
            .is_some();
        if exists {
            return Err(StoreError::AlreadyExists(meta.name.clone()));
        }
        let json = serde_json::to_string(&ProjectDoc::from_meta(meta))?;
        tx.execute(
            "INSERT INTO projects (id, doc) VALUES (?1, ?2)",
            params![meta.name, json],
        )
        .map_err(map_sql_error)?;
        tx.commit().map_err(map_sql_error)?;
        tracing::debug!(project = %meta.name, db = %self.location, "Created project document");
        Ok(())
    }

    fn project_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let found = conn
            .query_row(
                "SELECT 1 FROM projects WHERE id = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()
            .map_err(map_sql_error)?;
        Ok(found.is_some())
    }

    fn save_sample(&self, name: &str, class: ClassIndex, blob: &[u8]) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let mut doc = read_doc(&tx, name)?;
        let slot = class.slot();
        doc.counters[slot] += 1;
        let sequence = doc.counters[slot];
        tx.execute(
            "INSERT INTO project_images (doc_id, project_id, class_index, sequence, image)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                name,
                i64::from(class.get()),
                sequence as i64,
                STANDARD.encode(blob)
            ],
        )
        .map_err(map_sql_error)?;
        write_doc(&tx, name, &doc)?;
        tx.commit().map_err(map_sql_error)?;
        tracing::debug!(project = name, class = %class, sequence, "Stored sample document");
        Ok(sequence)
    }

    fn stream_samples(&self, name: &str) -> Result<SampleStream<'_>, StoreError> {
        if !self.project_exists(name)? {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(Box::new(DocumentSamples {
            store: self,
            project: name.to_string(),
            after: (0, 0),
            page: VecDeque::new(),
            done: false,
        }))
    }

    fn save_artifacts(&self, name: &str, artifacts: &ArtifactMap) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let mut doc = read_doc(&tx, name)?;
        doc.models = artifacts
            .iter()
            .map(|(tag, blob)| (*tag, STANDARD.encode(blob)))
            .collect();
        write_doc(&tx, name, &doc)?;
        tx.commit().map_err(map_sql_error)
    }

    fn load_artifacts(&self, name: &str) -> Result<ArtifactMap, StoreError> {
        let doc = read_doc(&self.conn(), name)?;
        doc.models
            .into_iter()
            .map(|(tag, encoded)| {
                STANDARD
                    .decode(encoded)
                    .map(|blob| (tag, blob))
                    .map_err(|err| StoreError::Corrupt(format!("{name}: {tag} model: {err}")))
            })
            .collect()
    }

    fn save_meta(&self, meta: &ProjectMeta) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let mut doc = read_doc(&tx, &meta.name)?;
        doc.labels = meta.class_labels.as_array().clone();
        doc.temporary = !meta.persistent;
        doc.active_variant = meta.active_variant;
        for (stored, given) in doc.counters.iter_mut().zip(meta.counters) {
            *stored = (*stored).max(given);
        }
        write_doc(&tx, &meta.name, &doc)?;
        tx.commit().map_err(map_sql_error)
    }

    fn load_meta(&self, name: &str) -> Result<ProjectMeta, StoreError> {
        read_doc(&self.conn(), name)?.to_meta(name)
    }

    fn delete_project(&self, name: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        read_doc(&tx, name)?;
        let removed = tx
            .execute(
                "DELETE FROM project_images WHERE project_id = ?1",
                params![name],
            )
            .map_err(map_sql_error)?;
        tx.execute("DELETE FROM projects WHERE id = ?1", params![name])
            .map_err(map_sql_error)?;
        tx.commit().map_err(map_sql_error)?;
        Ok(removed as u64)
    }
}

/// Keyset-paged walk over a project's images; the connection is only locked per page.
struct DocumentSamples<'a> {
    store: &'a DocumentStore,
    project: String,
    after: (i64, i64),
    page: VecDeque<(i64, i64, String)>,
    done: bool,
}

impl DocumentSamples<'_> {
    fn decode_row(&self, class_index: i64, sequence: i64, image: String) -> Result<StoredSample, StoreError> {
        let corrupt = |what: String| {
            StoreError::Corrupt(format!(
                "{} image {class_index}/{sequence}: {what}",
                self.project
            ))
        };
        let class_index = ClassIndex::try_from(class_index).map_err(|err| corrupt(err.to_string()))?;
        let blob = STANDARD
            .decode(image)
            .map_err(|err| corrupt(err.to_string()))?;
        Ok(StoredSample {
            class_index,
            sequence: sequence as u64,
            blob,
        })
    }
}

impl Iterator for DocumentSamples<'_> {
    type Item = Result<StoredSample, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.done {
            match self.store.fetch_page(&self.project, self.after) {
                Ok(rows) => {
                    self.done = (rows.len() as i64) < PAGE_SIZE;
                    self.page.extend(rows);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        let (class_index, sequence, image) = self.page.pop_front()?;
        self.after = (class_index, sequence);
        Some(self.decode_row(class_index, sequence, image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn meta(name: &str) -> ProjectMeta {
        let labels = ClassLabels::new(["a".into(), "b".into(), "c".into()]).unwrap();
        ProjectMeta::new(name, labels, false)
    }

    fn store() -> DocumentStore {
        DocumentStore::open_in_memory(Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn document_tracks_counters_and_temporary_flag() {
        let store = store();
        store.create_project(&meta("zoo")).unwrap();
        let class = ClassIndex::try_from(3u8).unwrap();
        store.save_sample("zoo", class, b"img").unwrap();
        let raw: String = store
            .conn()
            .query_row("SELECT doc FROM projects WHERE id = 'zoo'", [], |row| {
                row.get(0)
            })
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["counters"], serde_json::json!([0, 0, 1]));
        assert_eq!(doc["temporary"], serde_json::json!(true));
        assert_eq!(doc["labels"], serde_json::json!(["a", "b", "c"]));
    }

    #[test]
    fn streaming_pages_through_many_samples() {
        let store = store();
        store.create_project(&meta("zoo")).unwrap();
        let total = PAGE_SIZE as u64 * 2 + 5;
        for i in 0..total {
            let class = ClassIndex::ALL[(i % 3) as usize];
            store.save_sample("zoo", class, &i.to_le_bytes()).unwrap();
        }
        let samples: Vec<StoredSample> = store
            .stream_samples("zoo")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(samples.len() as u64, total);
        assert!(samples.windows(2).all(|pair| {
            (pair[0].class_index, pair[0].sequence) < (pair[1].class_index, pair[1].sequence)
        }));
    }

    #[test]
    fn corrupt_rows_are_reported_individually() {
        let store = store();
        store.create_project(&meta("zoo")).unwrap();
        let class = ClassIndex::try_from(1u8).unwrap();
        store.save_sample("zoo", class, b"good").unwrap();
        store.save_sample("zoo", class, b"also good").unwrap();
        store
            .conn()
            .execute(
                "UPDATE project_images SET image = '!!' WHERE sequence = 1",
                [],
            )
            .unwrap();
        let items: Vec<_> = store.stream_samples("zoo").unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(StoreError::Corrupt(_))));
        assert_eq!(items[1].as_ref().unwrap().blob, b"also good");
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("projects.db");
        {
            let store = DocumentStore::open(&path, Duration::from_secs(1)).unwrap();
            store.create_project(&meta("zoo")).unwrap();
        }
        let store = DocumentStore::open(&path, Duration::from_secs(1)).unwrap();
        assert!(store.project_exists("zoo").unwrap());
        assert_eq!(store.location(), path.display().to_string());
    }
}
