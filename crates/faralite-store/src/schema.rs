//! SQL DDL for the faralite database.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Tables and indexes, idempotent.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    card_number TEXT UNIQUE NOT NULL,
    photo BLOB,
    unit_number TEXT,
    plate_number TEXT,
    permission TEXT NOT NULL DEFAULT 'Open'
);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    user_name TEXT,
    user_id TEXT,
    direction TEXT,
    unit TEXT,
    plate TEXT,
    permission TEXT,
    device_serial TEXT,
    photo_path TEXT,
    raw_data TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_logs_device ON logs(device_serial);
CREATE INDEX IF NOT EXISTS idx_logs_date ON logs(date);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

/// Connection pragmas.
pub const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";
