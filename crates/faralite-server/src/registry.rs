//! Set of currently connected devices.

use std::collections::{BTreeMap, BTreeSet};

use faralite_core::{BrokerEvent, DeviceId};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::metrics::PRESENCE_TRANSITIONS_TOTAL;

/// Reference-counted presence set.
///
/// Each bound session holds one reference to its device. A device is
/// online while at least one reference exists. Every online/offline
/// transition publishes [`BrokerEvent::PresenceChanged`] with the full set,
/// sent while the lock is held so subscribers observe transitions in order.
pub struct DeviceRegistry {
    devices: Mutex<BTreeMap<DeviceId, usize>>,
    events: broadcast::Sender<BrokerEvent>,
}

impl DeviceRegistry {
    /// Create an empty registry publishing to `events`.
    pub fn new(events: broadcast::Sender<BrokerEvent>) -> Self {
        Self {
            devices: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Add a reference to `id`. Returns `true` if the device just came
    /// online.
    pub fn register_if_absent(&self, id: &DeviceId) -> bool {
        let mut devices = self.devices.lock();
        let refs = devices.entry(id.clone()).or_insert(0);
        *refs += 1;
        debug!(device = %id, refs = *refs, "device reference added");
        if *refs > 1 {
            return false;
        }
        self.publish(&devices);
        true
    }

    /// Drop a reference to `id`. Returns `true` if the device just went
    /// offline. Unknown identifiers are a no-op.
    pub fn unregister(&self, id: &DeviceId) -> bool {
        let mut devices = self.devices.lock();
        let Some(refs) = devices.get_mut(id) else {
            return false;
        };
        *refs -= 1;
        debug!(device = %id, refs = *refs, "device reference dropped");
        if *refs > 0 {
            return false;
        }
        let _ = devices.remove(id);
        self.publish(&devices);
        true
    }

    /// Copy of the online set.
    pub fn snapshot(&self) -> BTreeSet<DeviceId> {
        self.devices.lock().keys().cloned().collect()
    }

    /// Whether `id` is online.
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.lock().contains_key(id)
    }

    /// Number of sessions bound to `id`.
    pub fn session_count(&self, id: &DeviceId) -> usize {
        self.devices.lock().get(id).copied().unwrap_or(0)
    }

    /// Number of online devices.
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    /// Whether no device is online.
    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    fn publish(&self, devices: &BTreeMap<DeviceId, usize>) {
        counter!(PRESENCE_TRANSITIONS_TOTAL).increment(1);
        let snapshot: BTreeSet<DeviceId> = devices.keys().cloned().collect();
        // No subscribers is fine.
        let _ = self.events.send(BrokerEvent::PresenceChanged(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(s: &str) -> DeviceId {
        DeviceId::parse(s).unwrap()
    }

    fn make() -> (DeviceRegistry, broadcast::Receiver<BrokerEvent>) {
        let (tx, rx) = broadcast::channel(256);
        (DeviceRegistry::new(tx), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<BrokerEvent>) -> Vec<BTreeSet<DeviceId>> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let BrokerEvent::PresenceChanged(set) = ev {
                out.push(set);
            }
        }
        out
    }

    #[test]
    fn starts_empty() {
        let (reg, _rx) = make();
        assert!(reg.is_empty());
        assert!(reg.snapshot().is_empty());
    }

    #[test]
    fn register_publishes_snapshot() {
        let (reg, mut rx) = make();
        assert!(reg.register_if_absent(&dev("DEV1")));
        let events = drain(&mut rx);
        assert_eq!(events, vec![BTreeSet::from([dev("DEV1")])]);
    }

    #[test]
    fn double_register_notifies_once() {
        let (reg, mut rx) = make();
        assert!(reg.register_if_absent(&dev("DEV1")));
        assert!(!reg.register_if_absent(&dev("DEV1")));
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.session_count(&dev("DEV1")), 2);
    }

    #[test]
    fn shared_identity_stays_until_last_reference() {
        let (reg, mut rx) = make();
        let _ = reg.register_if_absent(&dev("DEV1"));
        let _ = reg.register_if_absent(&dev("DEV1"));
        assert!(!reg.unregister(&dev("DEV1")));
        assert!(reg.contains(&dev("DEV1")));
        assert!(reg.unregister(&dev("DEV1")));
        assert!(!reg.contains(&dev("DEV1")));
        let events = drain(&mut rx);
        assert_eq!(events, vec![BTreeSet::from([dev("DEV1")]), BTreeSet::new()]);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let (reg, mut rx) = make();
        assert!(!reg.unregister(&dev("GHOST")));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn publish_without_subscribers_does_not_fail() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let reg = DeviceRegistry::new(tx);
        assert!(reg.register_if_absent(&dev("A")));
        assert!(reg.unregister(&dev("A")));
    }

    #[test]
    fn concurrent_register_unregister_is_consistent() {
        let (tx, _rx) = broadcast::channel(16);
        let reg = std::sync::Arc::new(DeviceRegistry::new(tx));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reg = std::sync::Arc::clone(&reg);
                std::thread::spawn(move || {
                    let id = dev(&format!("DEV{}", t % 3));
                    for _ in 0..500 {
                        let _ = reg.register_if_absent(&id);
                        let _ = reg.unregister(&id);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(reg.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        #[derive(Clone, Debug)]
        enum Op {
            Register(u8),
            Unregister(u8),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(0u8..5).prop_map(Op::Register), (0u8..5).prop_map(Op::Unregister)]
        }

        proptest! {
            #[test]
            fn matches_reference_count_model(ops in proptest::collection::vec(op(), 0..200)) {
                let (tx, mut rx) = broadcast::channel(1024);
                let reg = DeviceRegistry::new(tx);
                let mut model: HashMap<u8, usize> = HashMap::new();
                let mut transitions = 0usize;

                for op in ops {
                    match op {
                        Op::Register(n) => {
                            let refs = model.entry(n).or_insert(0);
                            *refs += 1;
                            let expected = *refs == 1;
                            let changed = reg.register_if_absent(&dev(&format!("D{n}")));
                            prop_assert_eq!(changed, expected);
                            transitions += usize::from(expected);
                        }
                        Op::Unregister(n) => {
                            let expected = match model.get_mut(&n) {
                                Some(refs) if *refs > 0 => {
                                    *refs -= 1;
                                    *refs == 0
                                }
                                _ => false,
                            };
                            prop_assert_eq!(reg.unregister(&dev(&format!("D{n}"))), expected);
                            transitions += usize::from(expected);
                        }
                    }
                    let want: BTreeSet<DeviceId> = model
                        .iter()
                        .filter(|(_, refs)| **refs > 0)
                        .map(|(n, _)| dev(&format!("D{n}")))
                        .collect();
                    prop_assert_eq!(reg.snapshot(), want);
                }

                prop_assert_eq!(drain(&mut rx).len(), transitions);
            }
        }
    }
}
