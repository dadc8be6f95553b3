//! Access event generation for simulated devices.

use chrono::Utc;
use faralite_core::{AccessEvent, Direction};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::errors::DeviceError;

/// Plates a simulated reader may report. Empty means no vehicle.
pub const PLATES: [&str; 4] = ["12ج456", "45الف789", "89ب123", ""];

/// Permission decisions a simulated reader may report.
pub const PERMISSIONS: [&str; 3] = ["Open", "Limited", "Restricted"];

/// Key under which the site code travels.
pub const SITE_CODE_KEY: &str = "site_code";

/// Builds access events for one simulated device.
pub struct EventFactory {
    device_serial: String,
    site_code: String,
    rng: StdRng,
}

impl EventFactory {
    /// Factory seeded from the thread RNG.
    pub fn new(device_serial: impl Into<String>, site_code: impl Into<String>) -> Self {
        Self::with_rng(device_serial, site_code, StdRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic factory for tests.
    pub fn seeded(
        device_serial: impl Into<String>,
        site_code: impl Into<String>,
        seed: u64,
    ) -> Self {
        Self::with_rng(device_serial, site_code, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        device_serial: impl Into<String>,
        site_code: impl Into<String>,
        rng: StdRng,
    ) -> Self {
        Self {
            device_serial: device_serial.into().trim().to_owned(),
            site_code: site_code.into().trim().to_owned(),
            rng,
        }
    }

    /// Serial stamped on every event.
    pub fn device_serial(&self) -> &str {
        &self.device_serial
    }

    /// Event for a random card in `1000..=9999`.
    pub fn random_event(&mut self) -> AccessEvent {
        let card = self.rng.random_range(1000..=9999u32).to_string();
        self.build(card)
    }

    /// Event for a specific card. The card must be non-empty digits.
    pub fn event_for_card(&mut self, card_number: &str) -> Result<AccessEvent, DeviceError> {
        let card = card_number.trim();
        if card.is_empty() || !card.chars().all(|c| c.is_ascii_digit()) {
            return Err(DeviceError::InvalidCard(card_number.to_owned()));
        }
        Ok(self.build(card.to_owned()))
    }

    fn build(&mut self, card_number: String) -> AccessEvent {
        let direction = if self.rng.random_bool(0.5) { Direction::In } else { Direction::Out };
        let mut event = AccessEvent::new(self.device_serial.clone(), card_number, direction);
        event.unit_number = self.rng.random_range(1..=20u32).to_string();
        event.plate_number = (*PLATES.choose(&mut self.rng).unwrap_or(&"")).to_owned();
        event.permission = (*PERMISSIONS.choose(&mut self.rng).unwrap_or(&"Open")).to_owned();
        event.timestamp = Some(Utc::now().timestamp());
        let _ = event
            .raw
            .insert(SITE_CODE_KEY.to_owned(), Value::String(self.site_code.clone()));
        event
    }
}
