use std::time::Duration;

use rusqlite::Connection;

use super::super::StoreError;
use super::util::map_sql_error;

pub(super) fn apply_pragmas(connection: &Connection, busy_timeout: Duration) -> Result<(), StoreError> {
    connection
        .execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store=MEMORY;",
        )
        .map_err(map_sql_error)?;
    connection.busy_timeout(busy_timeout).map_err(map_sql_error)
}

/// `projects` holds one JSON document per project; `project_images` is its sample sub-collection.
pub(super) fn apply_schema(connection: &Connection) -> Result<(), StoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                doc TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS project_images (
                doc_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                class_index INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                image TEXT NOT NULL,
                UNIQUE(project_id, class_index, sequence)
             );",
        )
        .map_err(map_sql_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_sets_timeout() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn, Duration::from_millis(1234)).unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 1234);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('projects', 'project_images')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
