//! Type definitions for lidarctl

pub mod device_info;
pub mod error;
pub mod handle;
pub mod mode;
pub mod record;

pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use handle::DeviceHandle;
pub use mode::Mode;
pub use record::{DeviceRecord, SequenceNumber};
