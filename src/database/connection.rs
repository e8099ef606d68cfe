/*!
 * SQLite connection shared by the repository.
 *
 * rusqlite is synchronous; every query runs on tokio's blocking pool through
 * `execute_async`.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

const DB_DIRNAME: &str = "vidscribe";
const DB_FILENAME: &str = "jobs.db";

/// Cloneable handle to one open database
#[derive(Clone)]
pub struct DatabaseConnection {
    location: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection").field("location", &self.location).finish()
    }
}

impl DatabaseConnection {
    /// Open or create the database file, creating parent directories
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let location = db_path.as_ref().to_path_buf();
        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        info!("Opening job database at {}", location.display());
        let conn = Connection::open(&location)
            .with_context(|| format!("Failed to open database: {}", location.display()))?;
        Self::with_schema(conn, location)
    }

    /// Private database that disappears with the handle
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory job database");
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::with_schema(conn, PathBuf::from(":memory:"))
    }

    fn with_schema(conn: Connection, location: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            location,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<local data dir>/vidscribe/jobs.db`, used by the `jobs` subcommand
    /// when the config names no database
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .ok_or_else(|| anyhow!("Could not determine a data directory"))?;
        Ok(base_dir.join(DB_DIRNAME).join(DB_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Run `f` against the connection on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let conn = connection.lock();
            f(&conn)
        })
        .await
        .context("Database task panicked")?
    }
}
