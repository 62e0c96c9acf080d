//! Transport layer for lidarctl
//!
//! Implementations of [`DeviceTransport`]:
//! - [`UdpTransport`] talks to real sensors over the UDP control protocol
//! - [`SimulatedTransport`] runs an in-process fleet for dry runs and tests

pub mod error;
pub mod simulated;
pub mod udp;

pub use error::{Error, Result};
pub use simulated::{Behaviour, SimulatedDevice, SimulatedTransport};
pub use udp::{UdpConfig, UdpTransport};

pub use lidarctl_core::DeviceTransport;
