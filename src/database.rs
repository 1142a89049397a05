use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Poisoned(String),
    Serde(serde_json::Error),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite: {}", e),
            StoreError::Poisoned(s) => write!(f, "Mutex poisoned: {}", s),
            StoreError::Serde(e) => write!(f, "Serialization: {}", e),
            StoreError::Unavailable(s) => write!(f, "Store unavailable: {}", s),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Best-effort key/value persistence. No transactional guarantee across calls.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Log IO-related DB errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!("[DB] {}: Disk full. Free space on drive.", context);
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check the data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

/// SQLite-backed store.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            StoreError::Poisoned(format!(
                "{}. A panic occurred while holding the database lock.",
                e
            ))
        })
    }

    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;

        // Detect corruption before touching the schema
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
        if integrity.to_lowercase() != "ok" {
            return Err(StoreError::Unavailable(format!(
                "Database corruption detected: {}",
                integrity
            )));
        }

        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(
                "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                e
            );
        }
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open `path`; if the file is corrupted, move it aside and start fresh.
    pub fn open_with_recovery(path: &Path) -> StoreResult<Self> {
        let path_str = path.to_str().ok_or_else(|| {
            StoreError::Unavailable(format!(
                "Database path contains invalid UTF-8: {}",
                path.display()
            ))
        })?;

        match Database::new(path_str) {
            Ok(db) => Ok(db),
            Err(e) => {
                let err_str = e.to_string();
                let is_corruption = err_str.contains("corrupt") || err_str.contains("not a database");
                if !is_corruption || !path.exists() {
                    return Err(e);
                }
                let backup = path.with_extension(format!(
                    "db.corrupted.{}",
                    chrono::Utc::now().timestamp()
                ));
                std::fs::rename(path, &backup).map_err(|rename_e| {
                    warn!("[DB] Failed to rename corrupted DB to {:?}: {}", backup, rename_e);
                    StoreError::Unavailable(format!("Database corrupted and could not backup: {}", e))
                })?;
                info!("[DB] Corrupted DB backed up to {:?}, starting fresh", backup);
                Database::new(path_str)
            }
        }
    }

    const SCHEMA_VERSION: i32 = 1;

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
                [],
            )?;
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }
}

impl Store for Database {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row.get(0)?));
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )
        .map_err(|e| {
            log_io_error_if_any("set", &e);
            e
        })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| {
                log_io_error_if_any("delete", &e);
                e
            })?;
        Ok(())
    }
}

/// In-process store: fallback when no database can be opened, and the test double.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`delete` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// Keys of successful and attempted `set` calls, in order.
    pub fn write_log(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn values(&self) -> StoreResult<MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if let Ok(mut w) = self.writes.lock() {
            w.push(key.to_string());
        }
        self.check_writable()?;
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.values()?.remove(key);
        Ok(())
    }
}
