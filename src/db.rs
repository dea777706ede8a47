use std::path::Path;
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::Result;

pub const DB_FILE: &str = "premiums.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS uploaded_files (
    id INTEGER PRIMARY KEY,
    plan_name TEXT NOT NULL UNIQUE,
    file_name TEXT NOT NULL,
    upload_date TEXT NOT NULL,
    month TEXT NOT NULL,
    year INTEGER NOT NULL,
    checksum TEXT,
    row_count INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS charges (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL,
    subscriber_id TEXT NOT NULL DEFAULT '',
    subscriber_name TEXT NOT NULL DEFAULT '',
    plan TEXT NOT NULL,
    coverage_type TEXT NOT NULL,
    status TEXT NOT NULL,
    coverage_dates TEXT NOT NULL DEFAULT '',
    charge_amount REAL NOT NULL,
    month TEXT NOT NULL,
    year INTEGER NOT NULL,
    FOREIGN KEY (file_id) REFERENCES uploaded_files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_charges_month_year ON charges(month, year);
CREATE INDEX IF NOT EXISTS idx_charges_plan_month_year ON charges(plan, month, year);
CREATE INDEX IF NOT EXISTS idx_charges_file ON charges(file_id);
CREATE INDEX IF NOT EXISTS idx_charges_subscriber ON charges(subscriber_id);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(10))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    register_functions(&conn)?;
    Ok(conn)
}

/// `fold_case(x)`: Unicode lower-casing. SQLite's built-in `lower()` only folds ASCII.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).to_lowercase()),
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
            })
        },
    )?;
    Ok(())
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}
