//! # lidarctl
//!
//! Discover the LiDAR sensors on a network and switch all of them between
//! scanning and standby.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lidarctl::{ConsolePresenter, FleetConfig, FleetController, Mode, UdpTransport};
//!
//! #[tokio::main]
//! async fn main() -> lidarctl::Result<()> {
//!     let config = FleetConfig::from_file("lidarctl.json")?;
//!     config.validate()?;
//!     let transport = Arc::new(UdpTransport::with_config(config.udp()));
//!
//!     let mut controller = FleetController::from_config(transport, &config);
//!     let report = controller.run(Mode::Active, &mut ConsolePresenter::stdout()).await?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod presenter;
pub mod report;

// Re-exports
pub use config::{ConfigError, FleetConfig, SimulationConfig};
pub use controller::{ControllerState, FleetController};
pub use error::{Error, Result};
pub use presenter::{ConsolePresenter, JsonPresenter, Presenter};
pub use report::{DeviceReport, FleetReport};

// Re-export lower layers
pub use lidarctl_core::{DeviceRegistry, DeviceTransport, OutcomeStatus};
pub use lidarctl_transport::{SimulatedTransport, UdpTransport};
pub use lidarctl_types::{DeviceHandle, DeviceInfo, Mode};
