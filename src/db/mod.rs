//! Transactional persistence layer. Keeps the single-`Connection`-behind-a-
//! mutex shape the rest of the crate was built around, but exposes it as a
//! `Store` of repository methods rather than a fire-and-forget writer actor:
//! several operations here (delete guards, uniqueness checks) need to read
//! and decide inside one critical section, which a channel of commands can't
//! express without a reply slot per call.

pub mod analyses;
pub mod fills;
pub mod market;
pub mod sentiment;
pub mod sync_status;
pub mod trades;

use crate::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type DbPool = Arc<Mutex<Connection>>;

#[derive(Clone)]
pub struct Store {
    pub pool: DbPool,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.pool
            .lock()
            .map_err(|e| AppError::Database(format!("lock poisoned: {e}")))
    }
}

pub fn init_db(data_dir: &Path) -> AppResult<DbPool> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| AppError::Database(format!("create dir: {e}")))?;
    let db_path = data_dir.join("macro_trader.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000; PRAGMA foreign_keys=ON;",
    )?;

    let schema = include_str!("../../migrations/001_init.sql");
    conn.execute_batch(schema)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory store for unit and integration tests. Not `cfg(test)`-gated
/// since integration tests under `tests/` link against the crate's normal
/// (non-test-cfg) build and need this symbol too.
pub fn init_test_db() -> DbPool {
    let conn = Connection::open_in_memory().expect("open in-memory sqlite");
    conn.execute_batch(include_str!("../../migrations/001_init.sql"))
        .expect("apply schema");
    Arc::new(Mutex::new(conn))
}
