/*!
 * Repository layer for database operations.
 *
 * High-level job persistence on top of `DatabaseConnection`; callers never
 * see SQL.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::connection::DatabaseConnection;
use super::models::JobRecord;

const JOB_COLUMNS: &str = "id, video_ref, source_language, target_language, state, stage, progress, \
     error_stage, error_kind, error_message, result, created_at, updated_at";

/// Repository for job records
#[derive(Clone, Debug)]
pub struct Repository {
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// Insert or replace the row of a job
    pub async fn save_job(&self, record: &JobRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO jobs (
                        id, video_ref, source_language, target_language, state, stage, progress,
                        error_stage, error_kind, error_message, result, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    ON CONFLICT(id) DO UPDATE SET
                        state = excluded.state,
                        stage = excluded.stage,
                        progress = excluded.progress,
                        error_stage = excluded.error_stage,
                        error_kind = excluded.error_kind,
                        error_message = excluded.error_message,
                        result = excluded.result,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        record.id,
                        record.video_ref,
                        record.source_language,
                        record.target_language,
                        record.state,
                        record.stage,
                        record.progress,
                        record.error_stage,
                        record.error_kind,
                        record.error_message,
                        record.result,
                        record.created_at,
                        record.updated_at,
                    ],
                )?;
                debug!("Saved job {} ({})", record.id, record.state);
                Ok(())
            })
            .await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_job_sync(conn, &job_id))
            .await
    }

    fn get_job_sync(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let record = conn.query_row(&sql, [job_id], parse_job_row).optional()?;
        Ok(record)
    }

    /// All jobs, oldest first
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        self.db
            .execute_async(|conn| {
                let sql = format!("SELECT {} FROM jobs ORDER BY created_at ASC, id ASC", JOB_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map([], parse_job_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    /// Delete a job; returns whether a row was removed
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                let removed = conn.execute("DELETE FROM jobs WHERE id = ?1", [&job_id])?;
                Ok(removed > 0)
            })
            .await
    }
}

fn parse_job_row(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        video_ref: row.get(1)?,
        source_language: row.get(2)?,
        target_language: row.get(3)?,
        state: row.get(4)?,
        stage: row.get(5)?,
        progress: row.get(6)?,
        error_stage: row.get(7)?,
        error_kind: row.get(8)?,
        error_message: row.get(9)?,
        result: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
