//! Report presentation
//!
//! The controller hands its final [`FleetReport`] to a [`Presenter`] and
//! nothing else reaches stdout. Logs go to stderr.

use std::io::{self, Write};

use lidarctl_core::OutcomeStatus;

use crate::report::FleetReport;

/// Receives the final report of a run
pub trait Presenter {
    fn present(&mut self, report: &FleetReport) -> io::Result<()>;
}

/// Plain-text table with one marker per device
///
/// ```text
/// ✓ 192.168.1.10     SN-A              active
/// ✗ 192.168.1.12     SN-C              standby   device rejected work mode (ret_code 1, key 0x001A)
/// ⏱ 192.168.1.11     SN-B              standby   no answer after 500 ms
///
/// 1 succeeded, 1 failed, 1 timed out (requested: active)
/// ```
pub struct ConsolePresenter<W> {
    out: W,
}

impl ConsolePresenter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn present(&mut self, report: &FleetReport) -> io::Result<()> {
        if report.no_devices {
            writeln!(self.out, "✗ No LiDAR devices found")?;
            return self.out.flush();
        }

        for device in &report.devices {
            let (marker, detail) = match &device.outcome {
                OutcomeStatus::Succeeded { .. } => ("✓", String::new()),
                OutcomeStatus::Failed { reason } => ("✗", reason.clone()),
                OutcomeStatus::TimedOut => ("⏱", format!("no answer after {} ms", device.latency_ms)),
            };

            let line = format!(
                "{} {:<16} {:<17} {:<9} {}",
                marker,
                device.handle.to_string(),
                device.serial_number,
                device.mode.to_string(),
                detail
            );
            writeln!(self.out, "{}", line.trim_end())?;
        }

        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} succeeded, {} failed, {} timed out (requested: {})",
            report.succeeded, report.failed, report.timed_out, report.requested
        )?;
        self.out.flush()
    }
}

/// Pretty-printed JSON
pub struct JsonPresenter<W> {
    out: W,
}

impl JsonPresenter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for JsonPresenter<W> {
    fn present(&mut self, report: &FleetReport) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, report)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::DeviceReport;
    use lidarctl_types::{DeviceHandle, Mode};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn report() -> FleetReport {
        let device = |last: u8, serial: &str, outcome, mode, latency_ms| DeviceReport {
            handle: DeviceHandle::from_ipv4(Ipv4Addr::new(192, 168, 1, last)),
            serial_number: serial.into(),
            outcome,
            mode,
            latency_ms,
        };

        FleetReport {
            requested: Mode::Active,
            no_devices: false,
            fully_converged: false,
            succeeded: 1,
            failed: 1,
            timed_out: 1,
            elapsed_ms: 500,
            devices: vec![
                device(10, "SN-A", OutcomeStatus::Succeeded { observed: Mode::Active }, Mode::Active, 12),
                device(
                    12,
                    "SN-C",
                    OutcomeStatus::Failed { reason: "ret_code 1".into() },
                    Mode::Standby,
                    30,
                ),
                device(11, "SN-B", OutcomeStatus::TimedOut, Mode::Standby, 500),
            ],
        }
    }

    #[test]
    fn test_console_output() {
        let mut presenter = ConsolePresenter::new(Vec::new());
        presenter.present(&report()).unwrap();

        let output = String::from_utf8(presenter.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("✓ 192.168.1.10"));
        assert!(lines[0].contains("SN-A"));
        assert!(lines[1].starts_with("✗ 192.168.1.12"));
        assert!(lines[1].ends_with("ret_code 1"));
        assert!(lines[2].starts_with("⏱ 192.168.1.11"));
        assert!(lines[2].ends_with("no answer after 500 ms"));
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "1 succeeded, 1 failed, 1 timed out (requested: active)");
    }

    #[test]
    fn test_console_no_devices() {
        let mut presenter = ConsolePresenter::new(Vec::new());
        presenter.present(&FleetReport::no_devices(Mode::Standby)).unwrap();

        let output = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(output, "✗ No LiDAR devices found\n");
    }

    #[test]
    fn test_json_output_parses_back() {
        let mut presenter = JsonPresenter::new(Vec::new());
        presenter.present(&report()).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&presenter.into_inner()).unwrap();
        assert_eq!(value["succeeded"], 1);
        assert_eq!(value["devices"][2]["handle"], "192.168.1.11");
        assert_eq!(value["devices"][2]["outcome"]["status"], "timed_out");
    }
}
