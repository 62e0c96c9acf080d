//! Device registry
//!
//! The registry is the single shared store of device state. It maps each
//! discovered [`DeviceHandle`] to its [`DeviceRecord`]:
//! - Records are only ever added (discovery is append-only)
//! - Identity strings never change once recorded
//! - Modes change only when a newer sequence number is applied

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use lidarctl_types::{DeviceHandle, DeviceRecord, Mode, SequenceNumber};

/// What happened to a mode update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Mode written
    Applied,

    /// Sequence number not newer than the last applied one, discarded
    Stale,

    /// Handle was never discovered, discarded
    UnknownDevice,
}

/// Thread-safe device registry
///
/// Can be cloned cheaply (Arc internally); clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    pub(crate) records: Arc<Mutex<BTreeMap<DeviceHandle, DeviceRecord>>>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered device
    ///
    /// Inserts a new record when `handle` is unseen and returns `true`.
    /// Re-discovery of a known handle changes nothing: a mode learned from a
    /// completion is never reset by a later discovery event.
    pub fn upsert(&self, handle: DeviceHandle, identity: &str, default_mode: Mode) -> bool {
        let mut records = self.records.lock();

        if let Some(existing) = records.get(&handle) {
            if existing.identity != identity {
                warn!(
                    device = %handle,
                    recorded = %existing.identity,
                    announced = %identity,
                    "Device re-announced with a different identity, keeping the first"
                );
            }
            return false;
        }

        records.insert(handle, DeviceRecord::discovered(handle, identity, default_mode));
        debug!(device = %handle, identity = %identity, mode = %default_mode, "Device registered");
        true
    }

    /// Apply a confirmed mode
    ///
    /// The update is applied only if `sequence` is newer than the last one
    /// applied to this device. Older or unknown-device updates are discarded.
    pub fn update_mode(
        &self,
        handle: DeviceHandle,
        sequence: SequenceNumber,
        mode: Mode,
    ) -> UpdateStatus {
        let mut records = self.records.lock();

        let Some(record) = records.get_mut(&handle) else {
            warn!(
                device = %handle,
                sequence,
                "Completion for a device that was never discovered, discarding"
            );
            return UpdateStatus::UnknownDevice;
        };

        if !record.accepts(sequence) {
            debug!(
                device = %handle,
                sequence,
                applied = record.last_sequence,
                "Stale mode update discarded"
            );
            return UpdateStatus::Stale;
        }

        record.mode = mode;
        record.last_sequence = sequence;
        record.last_updated = Utc::now();

        debug!(device = %handle, sequence, mode = %mode, "Mode updated");
        UpdateStatus::Applied
    }

    /// Point-in-time copy of all records, ordered by handle
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.records.lock().values().cloned().collect()
    }

    /// Get a copy of one record
    pub fn get(&self, handle: DeviceHandle) -> Option<DeviceRecord> {
        self.records.lock().get(&handle).cloned()
    }

    /// Number of discovered devices
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if nothing has been discovered
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::thread;

    fn handle(n: u32) -> DeviceHandle {
        DeviceHandle::from_raw(n)
    }

    #[test]
    fn test_upsert_new_device() {
        let registry = DeviceRegistry::new();

        assert!(registry.upsert(handle(1), "SN1", Mode::Standby));
        assert_eq!(registry.len(), 1);

        let record = registry.get(handle(1)).unwrap();
        assert_eq!(record.identity, "SN1");
        assert_eq!(record.mode, Mode::Standby);
    }

    #[test]
    fn test_rediscovery_keeps_newer_mode() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(1), "SN1", Mode::Standby);
        registry.update_mode(handle(1), 4, Mode::Active);

        assert!(!registry.upsert(handle(1), "SN1", Mode::Standby));

        let record = registry.get(handle(1)).unwrap();
        assert_eq!(record.mode, Mode::Active);
        assert_eq!(record.last_sequence, 4);
    }

    #[test]
    fn test_rediscovery_keeps_identity() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(1), "SN1", Mode::Standby);
        registry.upsert(handle(1), "OTHER", Mode::Standby);

        assert_eq!(registry.get(handle(1)).unwrap().identity, "SN1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_update_discarded() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(1), "SN1", Mode::Standby);

        assert_eq!(registry.update_mode(handle(1), 5, Mode::Active), UpdateStatus::Applied);
        assert_eq!(registry.update_mode(handle(1), 3, Mode::Standby), UpdateStatus::Stale);
        assert_eq!(registry.update_mode(handle(1), 5, Mode::Standby), UpdateStatus::Stale);

        assert_eq!(registry.get(handle(1)).unwrap().mode, Mode::Active);
    }

    #[test]
    fn test_update_unknown_device() {
        let registry = DeviceRegistry::new();

        assert_eq!(
            registry.update_mode(handle(9), 1, Mode::Active),
            UpdateStatus::UnknownDevice
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_ordered_and_detached() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(3), "SN3", Mode::Standby);
        registry.upsert(handle(1), "SN1", Mode::Standby);

        let snapshot = registry.snapshot();
        registry.update_mode(handle(1), 1, Mode::Active);

        let handles: Vec<_> = snapshot.iter().map(|r| r.handle).collect();
        assert_eq!(handles, vec![handle(1), handle(3)]);
        assert_eq!(snapshot[0].mode, Mode::Standby);
    }

    #[test]
    fn test_concurrent_discovery() {
        let registry = DeviceRegistry::new();

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for n in 0..100 {
                        registry.upsert(handle(n), &format!("SN{}-{}", n, t), Mode::Standby);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.len(), 100);
    }

    proptest! {
        #[test]
        fn prop_one_identity_per_handle(events in proptest::collection::vec((0u32..8, 0u8..4), 0..64)) {
            let registry = DeviceRegistry::new();
            let mut first_identity: HashMap<u32, String> = HashMap::new();

            for (raw, tag) in events {
                let identity = format!("SN{}-{}", raw, tag);
                first_identity.entry(raw).or_insert_with(|| identity.clone());
                registry.upsert(handle(raw), &identity, Mode::Standby);
            }

            let snapshot = registry.snapshot();
            prop_assert_eq!(snapshot.len(), first_identity.len());
            for record in snapshot {
                prop_assert_eq!(&record.identity, &first_identity[&record.handle.raw()]);
            }
        }

        #[test]
        fn prop_highest_sequence_wins(updates in proptest::collection::vec((1u64..1000, any::<bool>()), 1..32)) {
            let registry = DeviceRegistry::new();
            registry.upsert(handle(1), "SN1", Mode::Standby);

            for &(seq, active) in &updates {
                let mode = if active { Mode::Active } else { Mode::Standby };
                registry.update_mode(handle(1), seq, mode);
            }

            // The first update carrying the highest sequence is the one that sticks
            let max = updates.iter().map(|(s, _)| *s).max().unwrap();
            let (_, active) = updates.iter().find(|(s, _)| *s == max).unwrap();
            let expected = if *active { Mode::Active } else { Mode::Standby };

            let record = registry.get(handle(1)).unwrap();
            prop_assert_eq!(record.last_sequence, max);
            prop_assert_eq!(record.mode, expected);
        }
    }
}
