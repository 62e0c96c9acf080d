//! Error types for lidarctl-core

use lidarctl_types::Mode;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Only stable modes can be requested
    #[error("Mode {0} cannot be requested, expected active or standby")]
    InvalidTargetMode(Mode),

    /// Frame is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// First byte is not the start-of-frame marker
    #[error("Bad start of frame: 0x{0:02X}")]
    BadStartOfFrame(u8),

    /// Length field disagrees with the received bytes
    #[error("Length mismatch: header declares {declared} bytes, got {actual} bytes")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// Header checksum verification failed
    #[error("Header checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    HeaderChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Payload checksum verification failed
    #[error("Payload checksum mismatch: expected 0x{expected:08X}, received 0x{received:08X}")]
    PayloadChecksumMismatch {
        expected: u32,
        received: u32,
    },

    /// Unknown command identifier
    #[error("Unknown command id: 0x{0:04X}")]
    UnknownCommand(u16),

    /// A header or payload field holds an unexpected value
    #[error("Invalid {field}: {value}")]
    InvalidField {
        field: &'static str,
        value: u32,
    },

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the error comes from a malformed frame
    ///
    /// Malformed frames are dropped by transports; they never abort an operation.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            Self::PacketTooShort { .. }
                | Self::BadStartOfFrame(_)
                | Self::LengthMismatch { .. }
                | Self::HeaderChecksumMismatch { .. }
                | Self::PayloadChecksumMismatch { .. }
                | Self::UnknownCommand(_)
                | Self::InvalidField { .. }
                | Self::Io(_)
        )
    }
}
