//! Broker stream consumer that records access events.
//!
//! Each `Access` event is enriched from the user table by card number and
//! persisted as a log row. Presence changes are logged.

use chrono::{DateTime, Local, TimeZone};
use faralite_core::{AccessEvent, BrokerEvent, DeviceId, Direction};
use faralite_store::{Database, LogRepo, NewLogRecord, StoreError, UserRepo, UserRow};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Consumes [`BrokerEvent`]s and writes log rows.
#[derive(Clone)]
pub struct Dashboard {
    users: UserRepo,
    logs: LogRepo,
}

impl Dashboard {
    /// Dashboard backed by `db`.
    pub fn new(db: Database) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            logs: LogRepo::new(db),
        }
    }

    /// Enrich and persist one access event. Returns the new row's ID.
    pub fn record(
        &self,
        event: &AccessEvent,
        received_at: DateTime<Local>,
    ) -> Result<i64, StoreError> {
        let user = match self.users.find_by_card(&event.card_number) {
            Ok(user) => user,
            Err(e) => {
                warn!(card = %event.card_number, error = %e, "user lookup failed");
                None
            }
        };
        let record = build_log_record(event, received_at, user.as_ref());
        let id = self.logs.insert(&record)?;
        info!(
            id,
            date = %record.date,
            time = %record.time,
            user = %record.user_name,
            user_id = %record.user_id,
            direction = %record.direction,
            unit = %record.unit,
            plate = %record.plate,
            permission = %record.permission,
            device = %record.device_serial,
            "access logged"
        );
        Ok(id)
    }

    /// Drain `events` until the broker drops its sender.
    ///
    /// Store calls run on the blocking pool, one at a time and in stream
    /// order.
    pub async fn run(self, mut events: broadcast::Receiver<BrokerEvent>) {
        loop {
            match events.recv().await {
                Ok(BrokerEvent::Access(event)) => {
                    let received_at = Local::now();
                    let device = event.device_serial.clone();
                    let dashboard = self.clone();
                    let stored =
                        tokio::task::spawn_blocking(move || dashboard.record(&event, received_at))
                            .await;
                    match stored {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            warn!(device = %device, error = %e, "failed to store access log");
                        }
                        Err(e) => warn!(device = %device, error = %e, "access log task panicked"),
                    }
                }
                Ok(BrokerEvent::PresenceChanged(devices)) => {
                    let list: Vec<&str> = devices.iter().map(DeviceId::as_str).collect();
                    if list.is_empty() {
                        info!("no devices online");
                    } else {
                        info!(count = list.len(), devices = %list.join(", "), "devices online");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dashboard fell behind, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("broker stream closed");
                    break;
                }
            }
        }
    }
}

/// Turn an access event into a log row.
///
/// Date and time come from the event timestamp in `received_at`'s zone,
/// or from `received_at` itself when the device sent none. A matching user
/// supplies the name and fills unit, plate and permission only where the
/// event left them empty.
pub fn build_log_record<Tz>(
    event: &AccessEvent,
    received_at: DateTime<Tz>,
    user: Option<&UserRow>,
) -> NewLogRecord
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let tz = received_at.timezone();
    let at = event
        .timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map_or(received_at, |utc| utc.with_timezone(&tz));

    let mut user_name = extra_text(event, "user_name");
    let mut user_id = extra_text(event, "user_id");
    if user_id.is_empty() {
        user_id.clone_from(&event.card_number);
    }
    let mut unit = event.unit_number.clone();
    let mut plate = event.plate_number.clone();
    let mut permission = event.permission.clone();

    if let Some(user) = user {
        user_name.clone_from(&user.name);
        if user_id.is_empty() {
            user_id = user.id.to_string();
        }
        fill_empty(&mut unit, &user.unit_number);
        fill_empty(&mut plate, &user.plate_number);
        fill_empty(&mut permission, &user.permission);
    }

    NewLogRecord {
        date: at.format("%Y-%m-%d").to_string(),
        time: at.format("%H:%M:%S").to_string(),
        user_name,
        user_id,
        direction: direction_label(&event.direction).to_owned(),
        unit,
        plate,
        permission,
        device_serial: event.device_serial.clone(),
        photo_path: String::new(),
        raw_data: Value::Object(event.raw.clone()),
    }
}

/// `In` for entries and for a missing direction, `Out` for everything else.
fn direction_label(direction: &Direction) -> &'static str {
    match direction {
        Direction::In => "In",
        Direction::Other(raw) if raw.is_empty() => "In",
        Direction::Out | Direction::Other(_) => "Out",
    }
}

fn extra_text(event: &AccessEvent, key: &str) -> String {
    match event.extra(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn fill_empty(field: &mut String, fallback: &str) {
    if field.is_empty() {
        fallback.clone_into(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faralite_core::decode;
    use faralite_store::NewUser;
    use serde_json::json;
    use std::time::Duration;

    fn event(fields: &Value) -> AccessEvent {
        decode(&fields.to_string()).unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap()
    }

    fn user() -> UserRow {
        UserRow {
            id: 17,
            name: "Sara Ahmadi".into(),
            card_number: "4242".into(),
            unit_number: "12".into(),
            plate_number: "45الف789".into(),
            permission: "Limited".into(),
        }
    }

    #[test]
    fn device_timestamp_sets_date_and_time() {
        let ev = event(&json!({
            "command": "access_event",
            "device_serial": "DEV1",
            "card_number": "4242",
            "direction": "in",
            "timestamp": 1_700_000_000,
        }));
        let row = build_log_record(&ev, noon(), None);
        assert_eq!(row.date, "2023-11-14");
        assert_eq!(row.time, "22:13:20");
        assert_eq!(row.direction, "In");
        assert_eq!(row.user_id, "4242");
        assert_eq!(row.device_serial, "DEV1");
        assert_eq!(row.raw_data["timestamp"], 1_700_000_000);
    }

    #[test]
    fn missing_timestamp_uses_receipt_time() {
        let ev = event(&json!({"command": "access_event", "card_number": "1", "direction": "OUT"}));
        let row = build_log_record(&ev, noon(), None);
        assert_eq!(row.date, "2026-02-14");
        assert_eq!(row.time, "12:00:00");
        assert_eq!(row.direction, "Out");
    }

    #[test]
    fn missing_direction_reads_as_in() {
        let ev = decode(r#"{"command":"access_event","card_number":"1"}"#).unwrap();
        assert_eq!(build_log_record(&ev, noon(), None).direction, "In");
        let odd = event(&json!({
            "command": "access_event",
            "card_number": "1",
            "direction": "sideways",
        }));
        assert_eq!(build_log_record(&odd, noon(), None).direction, "Out");
    }

    #[test]
    fn user_fills_only_empty_fields() {
        let ev = event(&json!({
            "command": "access_event",
            "card_number": "4242",
            "unit_number": "3",
            "permission": "",
        }));
        let row = build_log_record(&ev, noon(), Some(&user()));
        assert_eq!(row.user_name, "Sara Ahmadi");
        assert_eq!(row.unit, "3");
        assert_eq!(row.plate, "45الف789");
        assert_eq!(row.permission, "Limited");
        assert_eq!(row.user_id, "4242");
    }

    #[test]
    fn explicit_user_fields_pass_through() {
        let ev = event(&json!({
            "command": "access_event",
            "card_number": "",
            "user_id": 99,
            "user_name": "Guest",
        }));
        let row = build_log_record(&ev, noon(), None);
        assert_eq!(row.user_id, "99");
        assert_eq!(row.user_name, "Guest");
        assert!(row.photo_path.is_empty());
    }

    #[test]
    fn record_persists_enriched_row() {
        let db = Database::in_memory().unwrap();
        let _ = UserRepo::new(db.clone())
            .insert(&NewUser {
                name: "Ali".into(),
                card_number: "777".into(),
                unit_number: "5".into(),
                permission: "Restricted".into(),
                ..NewUser::default()
            })
            .unwrap();
        let dashboard = Dashboard::new(db.clone());

        let ev = event(&json!({
            "cmd": "access_event",
            "device_serial": "GATE",
            "card_number": "777",
            "direction": "out",
            "site_code": "1",
        }));
        let _ = dashboard.record(&ev, Local::now()).unwrap();

        let rows = LogRepo::new(db).recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_name, "Ali");
        assert_eq!(rows[0].unit, "5");
        assert_eq!(rows[0].permission, "Restricted");
        assert_eq!(rows[0].direction, "Out");
        assert_eq!(rows[0].raw_data["site_code"], "1");
    }

    #[tokio::test]
    async fn run_stores_events_and_stops_when_stream_closes() {
        let db = Database::in_memory().unwrap();
        let (tx, rx) = broadcast::channel(16);
        let task = tokio::spawn(Dashboard::new(db.clone()).run(rx));

        let ev = event(&json!({
            "command": "access_event",
            "device_serial": "D",
            "card_number": "1",
        }));
        let _ = tx.send(BrokerEvent::PresenceChanged(std::collections::BTreeSet::new()));
        let _ = tx.send(BrokerEvent::Access(ev));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(LogRepo::new(db).count().unwrap(), 1);
    }

    #[tokio::test]
    async fn busy_store_does_not_stall_the_runtime() {
        let db = Database::in_memory().unwrap();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder_db = db.clone();
        let holder = std::thread::spawn(move || {
            holder_db.with_conn(|_| {
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            })
        });
        locked_rx.recv().unwrap();

        let (tx, rx) = broadcast::channel(16);
        let task = tokio::spawn(Dashboard::new(db.clone()).run(rx));
        let ev = event(&json!({
            "command": "access_event",
            "device_serial": "D",
            "card_number": "1",
        }));
        let _ = tx.send(BrokerEvent::Access(ev));

        // Single-threaded runtime: this timer only fires on time if the
        // consumer yields while the store is locked.
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_millis(300));

        holder.join().unwrap().unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(LogRepo::new(db).count().unwrap(), 1);
    }
}
