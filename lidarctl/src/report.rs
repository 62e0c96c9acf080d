//! Fleet operation reports

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use lidarctl_core::{ConvergenceResult, OutcomeStatus};
use lidarctl_types::{DeviceHandle, DeviceRecord, Mode};

/// Final state of one targeted device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub handle: DeviceHandle,
    pub serial_number: String,
    pub outcome: OutcomeStatus,

    /// Mode in the registry once the operation finished
    pub mode: Mode,

    /// Time from submission to resolution
    pub latency_ms: u64,
}

/// Summary of one controller run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetReport {
    /// Mode the run asked for
    pub requested: Mode,

    /// No device answered discovery, nothing was dispatched
    pub no_devices: bool,

    pub fully_converged: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub elapsed_ms: u64,

    /// One entry per targeted device, ordered by handle
    pub devices: Vec<DeviceReport>,
}

impl FleetReport {
    /// Report for a run that found nothing to command
    pub fn no_devices(requested: Mode) -> Self {
        Self {
            requested,
            no_devices: true,
            fully_converged: false,
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            elapsed_ms: 0,
            devices: Vec::new(),
        }
    }

    /// Combine a convergence result with a registry snapshot taken after it
    pub fn from_result(requested: Mode, result: &ConvergenceResult, snapshot: &[DeviceRecord]) -> Self {
        let records: BTreeMap<DeviceHandle, &DeviceRecord> =
            snapshot.iter().map(|r| (r.handle, r)).collect();

        let mut devices: Vec<DeviceReport> = result
            .outcomes
            .iter()
            .map(|outcome| {
                let record = records.get(&outcome.handle);
                DeviceReport {
                    handle: outcome.handle,
                    serial_number: record.map(|r| r.identity.clone()).unwrap_or_default(),
                    outcome: outcome.status.clone(),
                    mode: record.map(|r| r.mode).unwrap_or_default(),
                    latency_ms: outcome.latency.as_millis() as u64,
                }
            })
            .collect();
        devices.sort_by_key(|d| d.handle);

        Self {
            requested,
            no_devices: false,
            fully_converged: result.fully_converged,
            succeeded: result.succeeded.len(),
            failed: result.failed.len(),
            timed_out: result.timed_out.len(),
            elapsed_ms: result.elapsed.as_millis() as u64,
            devices,
        }
    }

    /// Number of targeted devices
    pub fn total(&self) -> usize {
        self.devices.len()
    }

    /// Entry for one device
    pub fn device(&self, handle: DeviceHandle) -> Option<&DeviceReport> {
        self.devices.iter().find(|d| d.handle == handle)
    }
}

impl fmt::Display for FleetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no_devices {
            return f.write_str("no devices found");
        }

        write!(
            f,
            "{}/{} {} ({} failed, {} timed out)",
            self.succeeded,
            self.total(),
            self.requested,
            self.failed,
            self.timed_out
        )
    }
}
