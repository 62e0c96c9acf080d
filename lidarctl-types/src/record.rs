//! Registry records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handle::DeviceHandle;
use crate::mode::Mode;

/// Command sequence number
///
/// Allocated strictly increasing at dispatch time. Zero is reserved for the
/// mode assumed at discovery.
pub type SequenceNumber = u64;

/// Last-known state of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device handle
    pub handle: DeviceHandle,

    /// Serial number reported at discovery (never changes)
    pub identity: String,

    /// Current mode
    pub mode: Mode,

    /// When `mode` was last written
    pub last_updated: DateTime<Utc>,

    /// Sequence number of the last applied mode update
    pub last_sequence: SequenceNumber,
}

impl DeviceRecord {
    /// Sequence number of the discovery default
    pub const DISCOVERY_SEQUENCE: SequenceNumber = 0;

    /// Create a record for a freshly discovered device
    pub fn discovered(handle: DeviceHandle, identity: impl Into<String>, mode: Mode) -> Self {
        Self {
            handle,
            identity: identity.into(),
            mode,
            last_updated: Utc::now(),
            last_sequence: Self::DISCOVERY_SEQUENCE,
        }
    }

    /// Check if an update with `sequence` would be newer than what is applied
    pub fn accepts(&self, sequence: SequenceNumber) -> bool {
        sequence > self.last_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_discovered_record() {
        let record = DeviceRecord::discovered(DeviceHandle::from_raw(7), "SN7", Mode::Standby);

        assert_eq!(record.identity, "SN7");
        assert_eq!(record.mode, Mode::Standby);
        assert_eq!(record.last_sequence, DeviceRecord::DISCOVERY_SEQUENCE);
    }

    #[test]
    fn test_record_accepts_only_newer() {
        let mut record = DeviceRecord::discovered(DeviceHandle::from_raw(7), "SN7", Mode::Standby);
        assert!(record.accepts(1));

        record.last_sequence = 5;
        assert!(!record.accepts(5));
        assert!(!record.accepts(4));
        assert!(record.accepts(6));
    }
}
