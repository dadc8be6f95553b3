//! Registered card holders.

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::StoreError;

/// Permission levels a user can hold.
pub const PERMISSIONS: [&str; 3] = ["Open", "Limited", "Restricted"];

/// Highest manually assigned user ID.
pub const MAX_MANUAL_ID: i64 = 5000;

/// A stored user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// Row ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Card number (unique).
    pub card_number: String,
    /// Unit number.
    pub unit_number: String,
    /// Vehicle plate.
    pub plate_number: String,
    /// Permission level.
    pub permission: String,
}

/// Input for [`UserRepo::insert`].
#[derive(Clone, Debug, Default)]
pub struct NewUser {
    /// Explicit ID in `1..=5000`, or `None` to auto-assign.
    pub id: Option<i64>,
    /// Letters and single spaces only.
    pub name: String,
    /// Digits only.
    pub card_number: String,
    /// Unit number.
    pub unit_number: String,
    /// Vehicle plate.
    pub plate_number: String,
    /// One of [`PERMISSIONS`]; empty means `Open`.
    pub permission: String,
}

impl NewUser {
    /// Check field rules. Returns the trimmed, normalized record.
    pub fn validated(&self) -> Result<Self, StoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name cannot be empty".into()));
        }
        if !name.split(' ').all(|word| !word.is_empty() && word.chars().all(char::is_alphabetic)) {
            return Err(StoreError::Validation("name must contain only letters and spaces".into()));
        }

        let card = self.card_number.trim();
        if card.is_empty() {
            return Err(StoreError::Validation("card number cannot be empty".into()));
        }
        if !card.chars().all(|c| c.is_ascii_digit()) {
            return Err(StoreError::Validation("card number must contain only digits".into()));
        }

        if let Some(id) = self.id {
            if !(1..=MAX_MANUAL_ID).contains(&id) {
                return Err(StoreError::Validation(format!(
                    "id must be between 1 and {MAX_MANUAL_ID}"
                )));
            }
        }

        let permission = match self.permission.trim() {
            "" => PERMISSIONS[0].to_string(),
            p => PERMISSIONS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(p))
                .map(|known| (*known).to_string())
                .ok_or_else(|| StoreError::Validation(format!("unknown permission: {p}")))?,
        };

        Ok(Self {
            id: self.id,
            name: name.to_string(),
            card_number: card.to_string(),
            unit_number: self.unit_number.trim().to_string(),
            plate_number: self.plate_number.trim().to_string(),
            permission,
        })
    }
}

/// User lookups and inserts.
#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    /// Wrap a database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validate and insert a user. Duplicate card numbers or IDs yield
    /// [`StoreError::Conflict`].
    #[instrument(skip(self, user), fields(card = %user.card_number))]
    pub fn insert(&self, user: &NewUser) -> Result<UserRow, StoreError> {
        let user = user.validated()?;
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO users (id, name, card_number, unit_number, plate_number, permission)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.card_number,
                    user.unit_number,
                    user.plate_number,
                    user.permission
                ],
            )?;
            let id = conn.last_insert_rowid();
            debug!(id, "user inserted");
            Ok(UserRow {
                id,
                name: user.name,
                card_number: user.card_number,
                unit_number: user.unit_number,
                plate_number: user.plate_number,
                permission: user.permission,
            })
        })
    }

    /// Look up a user by card number.
    #[instrument(skip(self))]
    pub fn find_by_card(&self, card_number: &str) -> Result<Option<UserRow>, StoreError> {
        let card = card_number.trim();
        if card.is_empty() {
            return Ok(None);
        }
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, card_number, unit_number, plate_number, permission
                     FROM users WHERE card_number = ?1",
                    [card],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            card_number: row.get(2)?,
                            unit_number: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                            plate_number: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                            permission: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}
