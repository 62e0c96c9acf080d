//! Device transport contract
//!
//! The fleet core never talks to the network itself. Discovery events and
//! command completions arrive through an implementation of
//! [`DeviceTransport`], on whatever threads or tasks that implementation uses.

use async_trait::async_trait;

use lidarctl_types::{DeviceHandle, DeviceInfo, Mode};

use crate::operation::Completion;

/// Callback invoked for every discovered device
pub type DiscoveryCallback = Box<dyn Fn(DeviceInfo) + Send + Sync + 'static>;

/// Transport initialization failure
#[derive(Debug, thiserror::Error)]
#[error("Transport initialization failed: {message}")]
pub struct InitError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl InitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Access to a network of devices
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Bring the transport up and start discovery
    async fn initialize(&self) -> Result<(), InitError>;

    /// Tear the transport down
    ///
    /// Commands still in flight never complete after this returns.
    async fn shutdown(&self);

    /// Register the discovery callback
    ///
    /// Devices discovered before registration are replayed to `callback`.
    fn on_device_discovered(&self, callback: DiscoveryCallback);

    /// Ask one device to switch to `mode`
    ///
    /// Fire-and-forget: the outcome is reported through `completion`, which
    /// may be resolved from any thread, more than once, or never.
    fn send_mode_command(&self, handle: DeviceHandle, mode: Mode, completion: Completion);
}
