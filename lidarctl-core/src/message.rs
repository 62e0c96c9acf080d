//! Payloads of the control frames used by lidarctl

use std::io::{Cursor, Read};
use std::net::Ipv4Addr;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use lidarctl_types::{DeviceHandle, DeviceInfo};

use crate::command::{WorkMode, KEY_WORK_MODE};
use crate::error::{Error, Result};

/// Length of the serial number field
pub const SERIAL_LEN: usize = 16;

/// Discovery acknowledgement
///
/// ```text
/// ret_code u8 | dev_type u8 | sn [16] | ip [4] | cmd_port u16
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryAck {
    pub ret_code: u8,
    pub device_type: u8,
    pub serial_number: String,
    pub address: Ipv4Addr,
    pub command_port: u16,
}

impl DiscoveryAck {
    pub const SIZE: usize = 2 + SERIAL_LEN + 4 + 2;

    /// Parse from a frame payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::SIZE,
                actual: payload.len(),
            });
        }

        let mut cursor = Cursor::new(payload);
        let ret_code = cursor.read_u8()?;
        let device_type = cursor.read_u8()?;

        let mut sn = [0u8; SERIAL_LEN];
        cursor.read_exact(&mut sn)?;
        let end = sn.iter().position(|&b| b == 0).unwrap_or(SERIAL_LEN);
        let serial_number = String::from_utf8_lossy(&sn[..end]).into_owned();

        let mut ip = [0u8; 4];
        cursor.read_exact(&mut ip)?;
        let command_port = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            ret_code,
            device_type,
            serial_number,
            address: Ipv4Addr::from(ip),
            command_port,
        })
    }

    /// Encode as a frame payload
    ///
    /// Serial numbers longer than the field are truncated.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(self.ret_code);
        buf.put_u8(self.device_type);

        let mut sn = [0u8; SERIAL_LEN];
        let raw = self.serial_number.as_bytes();
        let n = raw.len().min(SERIAL_LEN);
        sn[..n].copy_from_slice(&raw[..n]);
        buf.put_slice(&sn);

        buf.put_slice(&self.address.octets());
        buf.put_u16_le(self.command_port);
        buf.freeze()
    }

    /// Convert into the discovery event handed to the registry
    pub fn into_device_info(self) -> DeviceInfo {
        DeviceInfo::new(DeviceHandle::from_ipv4(self.address), self.serial_number)
            .with_device_type(self.device_type)
            .with_command_port(self.command_port)
    }
}

/// Payload of a parameter-configuration request writing the work mode
///
/// ```text
/// key_num u16 | reserved u16 | key u16 | len u16 | value u8
/// ```
pub fn work_mode_request(mode: WorkMode) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u16_le(1);
    buf.put_u16_le(0);
    buf.put_u16_le(KEY_WORK_MODE);
    buf.put_u16_le(1);
    buf.put_u8(mode as u8);
    buf.freeze()
}

/// Parse the work mode out of a parameter-configuration request
///
/// Returns `None` when the request does not write the work-mode key.
pub fn parse_work_mode_request(payload: &[u8]) -> Result<Option<WorkMode>> {
    let mut cursor = Cursor::new(payload);
    let key_num = cursor.read_u16::<LittleEndian>()?;
    let _reserved = cursor.read_u16::<LittleEndian>()?;

    for _ in 0..key_num {
        let key = cursor.read_u16::<LittleEndian>()?;
        let len = cursor.read_u16::<LittleEndian>()? as usize;
        let mut value = vec![0u8; len];
        cursor.read_exact(&mut value)?;

        if key == KEY_WORK_MODE {
            let raw = value.first().copied().ok_or(Error::PacketTooShort {
                expected: 1,
                actual: 0,
            })?;
            return WorkMode::try_from(raw).map(Some);
        }
    }

    Ok(None)
}

/// Parameter-configuration acknowledgement
///
/// ```text
/// ret_code u8 | error_key u16
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAck {
    pub ret_code: u8,
    pub error_key: u16,
}

impl ConfigAck {
    pub const SIZE: usize = 3;

    pub fn ok() -> Self {
        Self {
            ret_code: 0,
            error_key: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.ret_code == 0
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::SIZE,
                actual: payload.len(),
            });
        }

        let mut cursor = Cursor::new(payload);
        Ok(Self {
            ret_code: cursor.read_u8()?,
            error_key: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(self.ret_code);
        buf.put_u16_le(self.error_key);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_discovery_ack_parse() {
        let mut payload = vec![0x00, 0x09];
        payload.extend_from_slice(b"47MDL9T002019300");
        payload.extend_from_slice(&[192, 168, 1, 12]);
        payload.extend_from_slice(&56100u16.to_le_bytes());

        let ack = DiscoveryAck::parse(&payload).unwrap();
        assert_eq!(ack.device_type, 9);
        assert_eq!(ack.serial_number, "47MDL9T002019300");
        assert_eq!(ack.address, Ipv4Addr::new(192, 168, 1, 12));
        assert_eq!(ack.command_port, 56100);
    }

    #[test]
    fn test_discovery_ack_trims_padding() {
        let ack = DiscoveryAck {
            ret_code: 0,
            device_type: 9,
            serial_number: "SHORT".into(),
            address: Ipv4Addr::new(10, 0, 0, 2),
            command_port: 56100,
        };

        let parsed = DiscoveryAck::parse(&ack.encode()).unwrap();
        assert_eq!(parsed, ack);

        let info = parsed.into_device_info();
        assert_eq!(info.handle.to_string(), "10.0.0.2");
        assert_eq!(info.serial_number, "SHORT");
    }

    #[test]
    fn test_discovery_ack_too_short() {
        assert!(matches!(
            DiscoveryAck::parse(&[0; 10]),
            Err(Error::PacketTooShort { expected: 24, actual: 10 })
        ));
    }

    #[test]
    fn test_work_mode_request_layout() {
        let payload = work_mode_request(WorkMode::Normal);
        assert_eq!(
            payload.as_ref(),
            &[0x01, 0x00, 0x00, 0x00, 0x1A, 0x00, 0x01, 0x00, 0x01]
        );
        assert_eq!(
            parse_work_mode_request(&payload).unwrap(),
            Some(WorkMode::Normal)
        );
    }

    #[test]
    fn test_parse_request_without_work_mode_key() {
        let payload = [0x01, 0x00, 0x00, 0x00, 0x05, 0x00, 0x01, 0x00, 0x07];
        assert_eq!(parse_work_mode_request(&payload).unwrap(), None);
    }

    #[test]
    fn test_config_ack() {
        let ack = ConfigAck::parse(&[0x01, 0x1A, 0x00]).unwrap();
        assert!(!ack.is_success());
        assert_eq!(ack.error_key, KEY_WORK_MODE);
        assert!(ConfigAck::parse(&ConfigAck::ok().encode()).unwrap().is_success());
    }
}
