//! Device handles

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable identifier of a discovered device
///
/// The handle is derived from the device's IPv4 address the same way the
/// vendor layer does it: the four octets in network order, packed into a
/// little-endian `u32`. It displays as the dotted address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    /// Create a handle from its raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Create a handle from a device address
    pub fn from_ipv4(addr: Ipv4Addr) -> Self {
        Self(u32::from_le_bytes(addr.octets()))
    }

    /// Raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Device address this handle was derived from
    pub fn ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from(self.0.to_le_bytes())
    }
}

impl From<Ipv4Addr> for DeviceHandle {
    fn from(addr: Ipv4Addr) -> Self {
        Self::from_ipv4(addr)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ipv4())
    }
}

impl FromStr for DeviceHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Ipv4Addr>()
            .map(Self::from_ipv4)
            .map_err(|source| Error::InvalidAddress {
                input: s.to_string(),
                source,
            })
    }
}

impl From<DeviceHandle> for String {
    fn from(handle: DeviceHandle) -> String {
        handle.to_string()
    }
}

impl TryFrom<String> for DeviceHandle {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
