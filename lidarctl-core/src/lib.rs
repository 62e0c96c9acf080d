//! # lidarctl-core
//!
//! Fleet control core for network-attached LiDAR sensors.
//!
//! This crate provides:
//! - The device registry (last-known state per device)
//! - The command dispatcher and fleet operations
//! - The convergence waiter
//! - The transport contract devices are reached through
//! - Control frame encoding/decoding and checksums

pub mod checksum;
pub mod command;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod operation;
pub mod packet;
pub mod registry;
pub mod sequence;
pub mod transport;
pub mod waiter;

pub use command::{CommandId, WorkMode};
pub use dispatcher::CommandDispatcher;
pub use error::{Error, Result};
pub use operation::{Completion, CommandOutcome, CommandRequest, FleetOperation, OutcomeStatus};
pub use packet::Frame;
pub use registry::{DeviceRegistry, UpdateStatus};
pub use sequence::SequenceGenerator;
pub use transport::{DeviceTransport, DiscoveryCallback, InitError};
pub use waiter::{await_completion, ConvergenceResult};

pub use lidarctl_types::{DeviceHandle, DeviceInfo, DeviceRecord, Mode, SequenceNumber};
