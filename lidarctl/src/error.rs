//! High-level error types

use std::process::ExitCode;

use lidarctl_core::InitError;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error("Core error: {0}")]
    Core(#[from] lidarctl_core::Error),

    #[error("No LiDAR devices found")]
    NoDevicesFound,

    #[error("Failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error
    ///
    /// Every error that aborts an invocation exits with 1. Usage errors never
    /// get here; clap exits with 2 on its own.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Init(_) | Self::Core(_) | Self::NoDevicesFound | Self::Report(_) => {
                ExitCode::from(1)
            }
        }
    }
}
