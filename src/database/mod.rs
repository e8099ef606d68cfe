/*!
 * Database module for persistent storage of jobs.
 *
 * SQLite-backed, optional: the job controller works purely in memory unless
 * a repository is attached. Stored rows let a restarted process report the
 * outcome of earlier jobs and serve their finished subtitles.
 */

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

// Re-export main types
pub use connection::DatabaseConnection;
pub use models::JobRecord;
pub use repository::Repository;
