use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{
    ArtifactMap, ProjectStore, SampleStream, StoreError, StoredSample, validate_name,
};
use crate::fs_util;
use crate::ml::VariantTag;
use crate::project::{ClassIndex, ProjectMeta};

/// Combined metadata and artifact file inside each project directory.
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.json";
const SAMPLE_EXTENSION: &str = "png";

/// Projects as directories under a root:
/// `<root>/<project>/class_<n>/<seq>.png` plus `<root>/<project>/snapshot.json`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    meta: ProjectMeta,
    /// Base64 artifact blobs.
    #[serde(default)]
    artifacts: BTreeMap<VariantTag, String>,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Project directory, failing with `NotFound` when no snapshot exists.
    fn existing_project_dir(&self, name: &str) -> Result<PathBuf, StoreError> {
        let dir = self.project_dir(name)?;
        if !dir.join(SNAPSHOT_FILE_NAME).is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(dir)
    }

    fn read_snapshot(&self, name: &str) -> Result<(PathBuf, Snapshot), StoreError> {
        let dir = self.existing_project_dir(name)?;
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let bytes = std::fs::read(&path).map_err(|source| io_error(&path, source))?;
        let snapshot = serde_json::from_slice(&bytes)?;
        Ok((dir, snapshot))
    }

    fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        fs_util::atomic_write(&path, &bytes).map_err(|source| io_error(&path, source))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn class_dir(project_dir: &Path, class: ClassIndex) -> PathBuf {
    project_dir.join(format!("class_{class}"))
}

/// Sample files of one class sorted by sequence. Temp files and strays are ignored.
fn list_sequences(dir: &Path) -> Result<Vec<(u64, PathBuf)>, StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_error(dir, source)),
    };
    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|source| io_error(dir, source))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SAMPLE_EXTENSION) {
            continue;
        }
        let sequence = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok());
        if let Some(sequence) = sequence.filter(|&seq| seq > 0) {
            found.push((sequence, path));
        }
    }
    found.sort_by_key(|(sequence, _)| *sequence);
    Ok(found)
}

fn highest_sequence(project_dir: &Path, class: ClassIndex) -> Result<u64, StoreError> {
    Ok(list_sequences(&class_dir(project_dir, class))?
        .last()
        .map(|(sequence, _)| *sequence)
        .unwrap_or(0))
}

impl ProjectStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn create_project(&self, meta: &ProjectMeta) -> Result<(), StoreError> {
        let dir = self.project_dir(&meta.name)?;
        if dir.join(SNAPSHOT_FILE_NAME).exists() {
            return Err(StoreError::AlreadyExists(meta.name.clone()));
        }
        // Leftover directories from an interrupted create are reused.
        for class in ClassIndex::ALL {
            let path = class_dir(&dir, class);
            std::fs::create_dir_all(&path).map_err(|source| io_error(&path, source))?;
        }
        let snapshot = Snapshot {
            meta: meta.clone(),
            artifacts: BTreeMap::new(),
        };
        // The snapshot is claimed with create-new semantics: one concurrent creator wins.
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        match fs_util::atomic_write_new(&path, &bytes) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(meta.name.clone()));
            }
            Err(source) => return Err(io_error(&path, source)),
        }
        tracing::debug!(project = %meta.name, root = %self.root.display(), "Created project directory");
        Ok(())
    }

    fn project_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.project_dir(name)?.join(SNAPSHOT_FILE_NAME).is_file())
    }

    fn save_sample(&self, name: &str, class: ClassIndex, blob: &[u8]) -> Result<u64, StoreError> {
        let dir = self.existing_project_dir(name)?;
        let class_path = class_dir(&dir, class);
        std::fs::create_dir_all(&class_path).map_err(|source| io_error(&class_path, source))?;
        let mut sequence = highest_sequence(&dir, class)? + 1;
        loop {
            let path = class_path.join(format!("{sequence}.{SAMPLE_EXTENSION}"));
            match fs_util::atomic_write_new(&path, blob) {
                Ok(()) => {
                    tracing::debug!(project = name, class = %class, sequence, "Stored sample");
                    return Ok(sequence);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => sequence += 1,
                Err(source) => return Err(io_error(&path, source)),
            }
        }
    }

    fn stream_samples(&self, name: &str) -> Result<SampleStream<'_>, StoreError> {
        let dir = self.existing_project_dir(name)?;
        Ok(Box::new(LocalSamples {
            dir,
            next_class: 0,
            pending: VecDeque::new(),
        }))
    }

    fn save_artifacts(&self, name: &str, artifacts: &ArtifactMap) -> Result<(), StoreError> {
        let (dir, mut snapshot) = self.read_snapshot(name)?;
        snapshot.artifacts = artifacts
            .iter()
            .map(|(tag, blob)| (*tag, STANDARD.encode(blob)))
            .collect();
        Self::write_snapshot(&dir, &snapshot)
    }

    fn load_artifacts(&self, name: &str) -> Result<ArtifactMap, StoreError> {
        let (_, snapshot) = self.read_snapshot(name)?;
        snapshot
            .artifacts
            .into_iter()
            .map(|(tag, encoded)| {
                STANDARD
                    .decode(encoded)
                    .map(|blob| (tag, blob))
                    .map_err(|err| StoreError::Corrupt(format!("{name}: {tag} artifact: {err}")))
            })
            .collect()
    }

    fn save_meta(&self, meta: &ProjectMeta) -> Result<(), StoreError> {
        let (dir, mut snapshot) = self.read_snapshot(&meta.name)?;
        let mut counters = meta.counters;
        for (slot, stored) in counters.iter_mut().zip(snapshot.meta.counters) {
            *slot = (*slot).max(stored);
        }
        snapshot.meta = ProjectMeta {
            counters,
            ..meta.clone()
        };
        Self::write_snapshot(&dir, &snapshot)
    }

    fn load_meta(&self, name: &str) -> Result<ProjectMeta, StoreError> {
        let (dir, snapshot) = self.read_snapshot(name)?;
        let mut meta = snapshot.meta;
        meta.name = name.to_string();
        for class in ClassIndex::ALL {
            meta.counters[class.slot()] = highest_sequence(&dir, class)?;
        }
        Ok(meta)
    }

    fn delete_project(&self, name: &str) -> Result<u64, StoreError> {
        let dir = self.existing_project_dir(name)?;
        let mut removed = 0u64;
        for class in ClassIndex::ALL {
            removed += list_sequences(&class_dir(&dir, class))?.len() as u64;
        }
        std::fs::remove_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(removed)
    }
}

/// Walks the class directories one at a time, reading each file on demand.
struct LocalSamples {
    dir: PathBuf,
    next_class: usize,
    pending: VecDeque<(ClassIndex, u64, PathBuf)>,
}

impl Iterator for LocalSamples {
    type Item = Result<StoredSample, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((class_index, sequence, path)) = self.pending.pop_front() {
                let item = std::fs::read(&path)
                    .map(|blob| StoredSample {
                        class_index,
                        sequence,
                        blob,
                    })
                    .map_err(|source| io_error(&path, source));
                return Some(item);
            }
            let class = *ClassIndex::ALL.get(self.next_class)?;
            self.next_class += 1;
            match list_sequences(&class_dir(&self.dir, class)) {
                Ok(files) => self.pending.extend(
                    files
                        .into_iter()
                        .map(|(sequence, path)| (class, sequence, path)),
                ),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
