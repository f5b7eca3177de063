use std::sync::Mutex;

use rusqlite::Connection;

use crate::schema::MIG_0001_INIT;
use crate::StoreError;

/// Handle to the health database. Cheap to share behind an `Arc`; the
/// connection mutex is held only for single-statement calls.
pub struct Db {
    pub(crate) conn: Mutex<Connection>,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::Unavailable)?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Unavailable)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    // naive: if the site_health table doesn't exist, apply 0001
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='site_health'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT)?;
    }
    Ok(())
}
