//! Control protocol command definitions

use std::fmt;

use lidarctl_types::Mode;

use crate::error::{Error, Result};

/// Control command identifiers
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandId {
    /// Broadcast search for devices
    Discovery = 0x0000,

    /// Write a list of key-value parameters
    ParameterConfig = 0x0100,
}

impl CommandId {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Discovery => "CMD_DISCOVERY",
            Self::ParameterConfig => "CMD_PARAM_CONFIG",
        }
    }
}

impl From<CommandId> for u16 {
    fn from(cmd: CommandId) -> u16 {
        cmd as u16
    }
}

impl TryFrom<u16> for CommandId {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x0000 => Ok(Self::Discovery),
            0x0100 => Ok(Self::ParameterConfig),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04X})", self.name(), *self as u16)
    }
}

/// Direction of a frame
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0,
    Ack = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Ack),
            _ => Err(Error::InvalidField {
                field: "cmd_type",
                value: value as u32,
            }),
        }
    }
}

/// Sender of a frame
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Sender {
    Host = 0,
    Lidar = 1,
}

impl TryFrom<u8> for Sender {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Host),
            1 => Ok(Self::Lidar),
            _ => Err(Error::InvalidField {
                field: "sender_type",
                value: value as u32,
            }),
        }
    }
}

/// Parameter key holding the work mode
pub const KEY_WORK_MODE: u16 = 0x001A;

/// Device work mode values as carried on the wire
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkMode {
    /// Sampling
    Normal = 0x01,

    /// Powered, motor idle
    WakeUp = 0x02,

    Sleep = 0x03,
    Error = 0x04,
    PowerOnSelfTest = 0x05,
    MotorStarting = 0x06,
    MotorStopping = 0x07,
    Upgrade = 0x08,
}

impl WorkMode {
    /// Wire value to request `mode`
    ///
    /// Returns `None` for modes that cannot be requested.
    pub fn for_request(mode: Mode) -> Option<Self> {
        match mode {
            Mode::Active => Some(Self::Normal),
            Mode::Standby => Some(Self::WakeUp),
            _ => None,
        }
    }

    /// Mode a device reporting this work mode is in
    pub fn observed_mode(self) -> Mode {
        match self {
            Self::Normal => Mode::Active,
            Self::WakeUp | Self::Sleep => Mode::Standby,
            Self::MotorStarting => Mode::TransitioningToActive,
            Self::MotorStopping => Mode::TransitioningToStandby,
            Self::Error | Self::PowerOnSelfTest | Self::Upgrade => Mode::Unknown,
        }
    }
}

impl TryFrom<u8> for WorkMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Normal),
            0x02 => Ok(Self::WakeUp),
            0x03 => Ok(Self::Sleep),
            0x04 => Ok(Self::Error),
            0x05 => Ok(Self::PowerOnSelfTest),
            0x06 => Ok(Self::MotorStarting),
            0x07 => Ok(Self::MotorStopping),
            0x08 => Ok(Self::Upgrade),
            _ => Err(Error::InvalidField {
                field: "work_mode",
                value: value as u32,
            }),
        }
    }
}
