//! Errors raised while building lidarctl values from text

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Text that is not a dotted IPv4 device address
    #[error("invalid device address '{input}': {source}")]
    InvalidAddress {
        input: String,
        #[source]
        source: std::net::AddrParseError,
    },
}
