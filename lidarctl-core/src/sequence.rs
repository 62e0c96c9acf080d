//! Command sequence numbers
//!
//! Every command request gets a sequence number that is strictly greater than
//! any number handed out before it in this process. The registry uses it to
//! order mode updates independently of arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lidarctl_types::{DeviceRecord, SequenceNumber};

/// Sequence number generator
///
/// Thread-safe and can be cloned cheaply (Arc internally). Clones share the
/// same counter.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    next: Arc<AtomicU64>,
}

impl SequenceGenerator {
    /// First sequence number handed out
    ///
    /// Everything at or below [`DeviceRecord::DISCOVERY_SEQUENCE`] is older
    /// than any command.
    pub const INITIAL: SequenceNumber = DeviceRecord::DISCOVERY_SEQUENCE + 1;

    /// Create a new generator
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(Self::INITIAL)),
        }
    }

    /// Get next sequence number
    pub fn next(&self) -> SequenceNumber {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
