//! Fleet controller
//!
//! Drives one invocation through
//! `Idle → Discovering → Selecting → Dispatching → Converging → Reporting → Idle`.
//! It is the only place with policy: which mode to ask for, how long to
//! listen for devices and how long to wait for them to answer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use lidarctl_core::constants::{DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DISCOVERY_WINDOW_MS};
use lidarctl_core::{await_completion, CommandDispatcher, DeviceRegistry, DeviceTransport};
use lidarctl_types::{DeviceHandle, DeviceInfo, Mode};

use crate::config::FleetConfig;
use crate::error::{Error, Result};
use crate::presenter::Presenter;
use crate::report::FleetReport;

/// Mode assumed for a device until it confirms a command
pub const DISCOVERY_DEFAULT_MODE: Mode = Mode::Standby;

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Discovering,
    Selecting,
    Dispatching,
    Converging,
    Reporting,
}

/// Discovers a fleet and switches it to one mode
pub struct FleetController {
    transport: Arc<dyn DeviceTransport>,
    registry: DeviceRegistry,
    dispatcher: CommandDispatcher,
    discovery_window: Duration,
    command_timeout: Duration,
    state: ControllerState,
    history: Vec<ControllerState>,
}

impl FleetController {
    /// Create a controller with default timing
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        let registry = DeviceRegistry::new();
        let dispatcher = CommandDispatcher::new(registry.clone(), transport.clone());

        Self {
            transport,
            registry,
            dispatcher,
            discovery_window: Duration::from_millis(DEFAULT_DISCOVERY_WINDOW_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            state: ControllerState::Idle,
            history: Vec::new(),
        }
    }

    /// Create a controller with timing taken from `config`
    pub fn from_config(transport: Arc<dyn DeviceTransport>, config: &FleetConfig) -> Self {
        Self::new(transport)
            .with_discovery_window(config.discovery_window())
            .with_command_timeout(config.command_timeout())
    }

    /// Set how long discovery runs
    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    /// Set how long a fleet operation may take
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Current state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[ControllerState] {
        &self.history
    }

    /// Registry filled by discovery
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Discover devices, switch all of them to `mode` and present the outcome
    ///
    /// Per-device failures and timeouts end up in the returned report. The
    /// transport is shut down before this returns, on every path.
    ///
    /// # Errors
    ///
    /// - [`Error::Core`] if `mode` cannot be requested
    /// - [`Error::Init`] if the transport fails to come up
    /// - [`Error::NoDevicesFound`] if discovery found nothing (the report is
    ///   still presented)
    /// - [`Error::Report`] if the presenter fails to write
    pub async fn run(&mut self, mode: Mode, presenter: &mut dyn Presenter) -> Result<FleetReport> {
        if !mode.is_requestable() {
            return Err(lidarctl_core::Error::InvalidTargetMode(mode).into());
        }

        let result = self.execute(mode, presenter).await;

        self.transport.shutdown().await;
        self.transition(ControllerState::Idle);

        result
    }

    async fn execute(&mut self, mode: Mode, presenter: &mut dyn Presenter) -> Result<FleetReport> {
        self.transition(ControllerState::Discovering);
        self.discover().await?;

        self.transition(ControllerState::Selecting);
        let targets: Vec<DeviceHandle> = self.registry.snapshot().iter().map(|r| r.handle).collect();

        let report = if targets.is_empty() {
            warn!(window_ms = self.discovery_window.as_millis() as u64, "No devices discovered");
            self.transition(ControllerState::Reporting);
            FleetReport::no_devices(mode)
        } else {
            info!(devices = targets.len(), mode = %mode, "Selected targets");

            self.transition(ControllerState::Dispatching);
            let op = self.dispatcher.dispatch(targets, mode)?;

            self.transition(ControllerState::Converging);
            let result = await_completion(&op, self.command_timeout).await;

            self.transition(ControllerState::Reporting);
            FleetReport::from_result(mode, &result, &self.registry.snapshot())
        };

        presenter.present(&report)?;

        if report.no_devices {
            return Err(Error::NoDevicesFound);
        }
        Ok(report)
    }

    async fn discover(&mut self) -> Result<()> {
        let registry = self.registry.clone();
        self.transport
            .on_device_discovered(Box::new(move |info: DeviceInfo| {
                if registry.upsert(info.handle, &info.serial_number, DISCOVERY_DEFAULT_MODE) {
                    debug!(device = %info.handle, serial = %info.serial_number, "Registered device");
                }
            }));

        self.transport.initialize().await?;

        info!(window_ms = self.discovery_window.as_millis() as u64, "Scanning for devices");
        let started = Instant::now();
        time::sleep(self.discovery_window).await;

        debug!(
            found = self.registry.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery window closed"
        );
        Ok(())
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = ?self.state, to = ?next, "Controller state change");
        self.state = next;
        self.history.push(next);
    }
}
