/*!
 * Job table layout, versioned through SQLite's `user_version` pragma.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Layout version written to `user_version`
pub const SCHEMA_VERSION: i32 = 1;

const JOBS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        video_ref TEXT NOT NULL,
        source_language TEXT NOT NULL,
        target_language TEXT NOT NULL,
        state TEXT NOT NULL,
        stage TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        error_stage TEXT,
        error_kind TEXT,
        error_message TEXT,
        result BLOB,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
    CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
"#;

/// Bring a freshly opened database up to `SCHEMA_VERSION`.
///
/// A file written by a newer build is refused rather than guessed at.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let version = user_version(conn)?;

    match version {
        0 => {
            info!("Creating job table (schema v{})", SCHEMA_VERSION);
            // Lets `vidscribe jobs` read while a translate run writes
            conn.pragma_update(None, "journal_mode", "WAL")
                .context("Failed to enable WAL journal")?;
            conn.execute_batch(JOBS_TABLE).context("Failed to create job table")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        SCHEMA_VERSION => debug!("Job table is at schema v{}", version),
        other => {
            return Err(anyhow!(
                "Database schema v{} is not supported (expected v{})",
                other,
                SCHEMA_VERSION
            ));
        }
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to read schema version")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initializeSchema_withFreshDatabase_shouldCreateJobsTable() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'jobs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initializeSchema_calledTwice_shouldBeIdempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initializeSchema_withNewerVersion_shouldRefuse() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        assert!(initialize_schema(&conn).is_err());
    }
}
