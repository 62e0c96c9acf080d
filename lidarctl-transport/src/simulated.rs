//! In-process simulated fleet
//!
//! Every simulated sensor speaks the same control frames as a real one: the
//! transport encodes the work-mode request, the sensor decodes it and answers
//! with an encoded ACK, and the transport decodes that ACK before resolving
//! the command. Only the network is missing.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace};

use lidarctl_core::command::{CommandId, FrameKind, Sender, WorkMode};
use lidarctl_core::message::{self, ConfigAck, DiscoveryAck};
use lidarctl_core::{Completion, DeviceTransport, DiscoveryCallback, Frame, InitError};
use lidarctl_types::{DeviceHandle, DeviceInfo, Mode};

use crate::error::Error;

/// How a simulated sensor reacts to a work-mode command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Behaviour {
    /// ACK with success after `latency_ms`
    Respond { latency_ms: u64 },

    /// ACK with an error code after `latency_ms`
    Fail { latency_ms: u64 },

    /// Never answer
    Silent,

    /// ACK with success twice, `latency_ms` apart
    Duplicate { latency_ms: u64 },
}

impl Default for Behaviour {
    fn default() -> Self {
        Self::Respond { latency_ms: 50 }
    }
}

/// One simulated sensor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatedDevice {
    pub serial: String,
    pub address: Ipv4Addr,

    /// Delay between initialization and the discovery announcement
    #[serde(default)]
    pub announce_after_ms: u64,

    #[serde(default)]
    pub behaviour: Behaviour,
}

impl SimulatedDevice {
    pub fn new(serial: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            serial: serial.into(),
            address,
            announce_after_ms: 0,
            behaviour: Behaviour::default(),
        }
    }

    /// Set the command behaviour
    pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    /// Set the discovery announcement delay
    pub fn announce_after(mut self, delay: Duration) -> Self {
        self.announce_after_ms = delay.as_millis() as u64;
        self
    }

    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle::from_ipv4(self.address)
    }

    fn discovery_ack(&self, seq: u32) -> Frame {
        let ack = DiscoveryAck {
            ret_code: 0,
            device_type: 9,
            serial_number: self.serial.clone(),
            address: self.address,
            command_port: lidarctl_core::constants::DEFAULT_COMMAND_PORT,
        };

        Frame::with_payload(CommandId::Discovery, FrameKind::Ack, Sender::Lidar, seq, ack.encode())
    }

    /// Answer an encoded work-mode request the way this sensor is scripted to
    fn answer(&self, request: &[u8]) -> Option<Frame> {
        let request = Frame::decode(request.into()).ok()?;
        message::parse_work_mode_request(&request.payload).ok()??;

        let ack = match self.behaviour {
            Behaviour::Respond { .. } | Behaviour::Duplicate { .. } => ConfigAck::ok(),
            Behaviour::Fail { .. } => ConfigAck {
                ret_code: 1,
                error_key: lidarctl_core::command::KEY_WORK_MODE,
            },
            Behaviour::Silent => return None,
        };

        Some(Frame::with_payload(
            CommandId::ParameterConfig,
            FrameKind::Ack,
            Sender::Lidar,
            request.seq,
            ack.encode(),
        ))
    }
}

#[derive(Default)]
struct Shared {
    discovered: Mutex<BTreeMap<DeviceHandle, DeviceInfo>>,
    callback: Mutex<Option<Arc<dyn Fn(DeviceInfo) + Send + Sync>>>,
    seq: AtomicU32,
}

impl Shared {
    fn announce(&self, ack: Frame) {
        let info = match DiscoveryAck::parse(&ack.payload) {
            Ok(ack) => ack.into_device_info(),
            Err(e) => {
                debug!("Malformed simulated discovery ACK: {}", e);
                return;
            }
        };

        info!("Lidar found: {}", info);
        self.discovered.lock().insert(info.handle, info.clone());

        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(info);
        }
    }
}

/// Transport backed by simulated sensors
pub struct SimulatedTransport {
    devices: BTreeMap<DeviceHandle, SimulatedDevice>,
    shared: Arc<Shared>,
    runtime: Mutex<Option<Handle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulatedTransport {
    /// Create a simulated fleet
    ///
    /// Devices sharing an address collapse into the last one given.
    pub fn new(devices: impl IntoIterator<Item = SimulatedDevice>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.handle(), d)).collect(),
            shared: Arc::new(Shared::default()),
            runtime: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Check if initialized
    pub fn is_initialized(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Devices announced so far
    pub fn discovered(&self) -> Vec<DeviceInfo> {
        self.shared.discovered.lock().values().cloned().collect()
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn initialize(&self) -> Result<(), InitError> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized.into());
        }

        let runtime = Handle::current();
        info!("Simulated transport with {} device(s)", self.devices.len());

        let mut tasks = self.tasks.lock();
        for device in self.devices.values() {
            let shared = self.shared.clone();
            let delay = Duration::from_millis(device.announce_after_ms);
            let ack = device.discovery_ack(shared.seq.fetch_add(1, Ordering::AcqRel));

            tasks.push(runtime.spawn(async move {
                sleep(delay).await;
                shared.announce(ack);
            }));
        }

        *self.runtime.lock() = Some(runtime);
        Ok(())
    }

    async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.runtime.lock().take();
    }

    fn on_device_discovered(&self, callback: DiscoveryCallback) {
        let callback: Arc<dyn Fn(DeviceInfo) + Send + Sync> = Arc::from(callback);
        *self.shared.callback.lock() = Some(callback.clone());

        let known: Vec<DeviceInfo> = self.shared.discovered.lock().values().cloned().collect();
        for info in known {
            callback(info);
        }
    }

    fn send_mode_command(&self, handle: DeviceHandle, mode: Mode, completion: Completion) {
        let Some(runtime) = self.runtime.lock().clone() else {
            completion.fail(Error::NotInitialized.to_string());
            return;
        };

        // Unknown devices behave like an unreachable address
        let Some(device) = self.devices.get(&handle).cloned() else {
            trace!("No simulated device at {}", handle);
            return;
        };

        let Some(work_mode) = WorkMode::for_request(mode) else {
            completion.fail(format!("mode {} cannot be requested", mode));
            return;
        };

        let request = Frame::with_payload(
            CommandId::ParameterConfig,
            FrameKind::Request,
            Sender::Host,
            self.shared.seq.fetch_add(1, Ordering::AcqRel),
            message::work_mode_request(work_mode),
        )
        .encode();

        let (latency, deliveries) = match device.behaviour {
            Behaviour::Respond { latency_ms } | Behaviour::Fail { latency_ms } => (latency_ms, 1),
            Behaviour::Duplicate { latency_ms } => (latency_ms, 2),
            Behaviour::Silent => {
                trace!("Simulated device {} stays silent", handle);
                return;
            }
        };

        let task = runtime.spawn(async move {
            for _ in 0..deliveries {
                sleep(Duration::from_millis(latency)).await;

                let Some(reply) = device.answer(&request) else {
                    return;
                };
                let Ok(reply) = Frame::decode(reply.encode()) else {
                    return;
                };

                match ConfigAck::parse(&reply.payload) {
                    Ok(ack) if ack.is_success() => {
                        completion.succeed(work_mode.observed_mode());
                    }
                    Ok(ack) => {
                        completion.fail(format!(
                            "device rejected work mode (ret_code {}, key 0x{:04X})",
                            ack.ret_code, ack.error_key
                        ));
                    }
                    Err(e) => {
                        completion.fail(format!("malformed ACK: {}", e));
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }
}
