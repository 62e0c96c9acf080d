//! Device information structures

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::DeviceHandle;

/// Device information carried by a discovery event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device handle (derived from its address)
    pub handle: DeviceHandle,

    /// Device serial number
    pub serial_number: String,

    /// Device type code reported by the sensor
    pub device_type: Option<u8>,

    /// Port the device accepts control commands on
    pub command_port: Option<u16>,
}

impl DeviceInfo {
    pub fn new(handle: DeviceHandle, serial_number: impl Into<String>) -> Self {
        Self {
            handle,
            serial_number: serial_number.into(),
            device_type: None,
            command_port: None,
        }
    }

    /// Set the reported device type
    pub fn with_device_type(mut self, device_type: u8) -> Self {
        self.device_type = Some(device_type);
        self
    }

    /// Set the command port
    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = Some(port);
        self
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lidar[SN: {}, IP: {}]", self.serial_number, self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo::new("192.168.1.12".parse().unwrap(), "47MDL9T0020193")
            .with_command_port(56100);

        assert_eq!(info.to_string(), "Lidar[SN: 47MDL9T0020193, IP: 192.168.1.12]");
        assert_eq!(info.command_port, Some(56100));
        assert_eq!(info.device_type, None);
    }
}
