//! Protocol and timing constants

/// Port devices listen on for discovery broadcasts
pub const DEFAULT_DETECTION_PORT: u16 = 56000;

/// Port devices accept control commands on
pub const DEFAULT_COMMAND_PORT: u16 = 56100;

/// Interval between discovery broadcasts (milliseconds)
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 1000;

/// Discovery window (milliseconds)
pub const DEFAULT_DISCOVERY_WINDOW_MS: u64 = 3000;

/// Fleet operation timeout (milliseconds)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 500;

/// Receive buffer size for control datagrams
pub const MAX_DATAGRAM_SIZE: usize = 1500;
