//! Access log rows written by the dashboard consumer.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

/// Input for [`LogRepo::insert`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewLogRecord {
    /// Local date, `%Y-%m-%d`.
    pub date: String,
    /// Local time, `%H:%M:%S`.
    pub time: String,
    /// Card holder's name, if known.
    pub user_name: String,
    /// Card holder identifier.
    pub user_id: String,
    /// `In` / `Out` or the device's raw value.
    pub direction: String,
    /// Unit number.
    pub unit: String,
    /// Vehicle plate.
    pub plate: String,
    /// Permission decision.
    pub permission: String,
    /// Reporting device.
    pub device_serial: String,
    /// Captured photo, empty when none.
    pub photo_path: String,
    /// The event as received.
    pub raw_data: Value,
}

/// A stored log row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Row ID.
    pub id: i64,
    /// Local date.
    pub date: String,
    /// Local time.
    pub time: String,
    /// Card holder's name.
    pub user_name: String,
    /// Card holder identifier.
    pub user_id: String,
    /// Direction label.
    pub direction: String,
    /// Unit number.
    pub unit: String,
    /// Vehicle plate.
    pub plate: String,
    /// Permission decision.
    pub permission: String,
    /// Reporting device.
    pub device_serial: String,
    /// Captured photo path.
    pub photo_path: String,
    /// The event as received.
    pub raw_data: Value,
    /// Insert time, RFC 3339 UTC.
    pub created_at: String,
}

/// Access log persistence.
#[derive(Clone)]
pub struct LogRepo {
    db: Database,
}

impl LogRepo {
    /// Wrap a database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a row. Returns its ID.
    #[instrument(skip(self, record), fields(device = %record.device_serial))]
    pub fn insert(&self, record: &NewLogRecord) -> Result<i64, StoreError> {
        let raw = serde_json::to_string(&record.raw_data)?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO logs (date, time, user_name, user_id, direction, unit, plate,
                                   permission, device_serial, photo_path, raw_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    record.date,
                    record.time,
                    record.user_name,
                    record.user_id,
                    record.direction,
                    record.unit,
                    record.plate,
                    record.permission,
                    record.device_serial,
                    record.photo_path,
                    raw,
                    now
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent rows first.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: u32) -> Result<Vec<LogRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, date, time, user_name, user_id, direction, unit, plate, permission,
                        device_serial, photo_path, raw_data, created_at
                 FROM logs ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    let text = |idx: usize| -> rusqlite::Result<String> {
                        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
                    };
                    Ok((
                        LogRecord {
                            id: row.get(0)?,
                            date: row.get(1)?,
                            time: row.get(2)?,
                            user_name: text(3)?,
                            user_id: text(4)?,
                            direction: text(5)?,
                            unit: text(6)?,
                            plate: text(7)?,
                            permission: text(8)?,
                            device_serial: text(9)?,
                            photo_path: text(10)?,
                            raw_data: Value::Null,
                            created_at: row.get(12)?,
                        },
                        text(11)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(mut record, raw)| -> Result<LogRecord, StoreError> {
                    record.raw_data = if raw.is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_str(&raw)?
                    };
                    Ok(record)
                })
                .collect()
        })
    }

    /// Total rows.
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(user: &str) -> NewLogRecord {
        NewLogRecord {
            date: "2026-02-14".into(),
            time: "12:00:00".into(),
            user_name: user.into(),
            user_id: "4242".into(),
            direction: "In".into(),
            unit: "3".into(),
            plate: "12ج456".into(),
            permission: "Open".into(),
            device_serial: "DEV1".into(),
            photo_path: String::new(),
            raw_data: json!({"cmd": "access_event", "site_code": "1"}),
        }
    }

    #[test]
    fn insert_returns_increasing_ids() {
        let repo = LogRepo::new(Database::in_memory().unwrap());
        let a = repo.insert(&record("a")).unwrap();
        let b = repo.insert(&record("b")).unwrap();
        assert!(b > a);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let repo = LogRepo::new(Database::in_memory().unwrap());
        for i in 0..5 {
            let _ = repo.insert(&record(&format!("user {i}"))).unwrap();
        }
        let rows = repo.recent(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_name, "user 4");
        assert_eq!(rows[1].user_name, "user 3");
    }

    #[test]
    fn raw_data_round_trips_unicode() {
        let repo = LogRepo::new(Database::in_memory().unwrap());
        let _ = repo.insert(&record("x")).unwrap();
        let row = repo.recent(1).unwrap().remove(0);
        assert_eq!(row.raw_data["site_code"], "1");
        assert_eq!(row.plate, "12ج456");
        assert!(!row.created_at.is_empty());
    }
}
