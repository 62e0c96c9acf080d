//! UDP transport for LiDAR sensors
//!
//! Sensors answer discovery broadcasts on the detection port (56000) and
//! accept parameter-configuration commands on their command port (56100).
//! A single host socket is used for both; replies are matched to pending
//! commands by the frame sequence number.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use lidarctl_core::command::{CommandId, FrameKind, Sender, WorkMode};
use lidarctl_core::constants::{
    DEFAULT_COMMAND_PORT, DEFAULT_DETECTION_PORT, DEFAULT_DISCOVERY_INTERVAL_MS, MAX_DATAGRAM_SIZE,
};
use lidarctl_core::message::{self, ConfigAck, DiscoveryAck};
use lidarctl_core::{Completion, DeviceTransport, DiscoveryCallback, Frame, InitError};
use lidarctl_types::{DeviceHandle, DeviceInfo, Mode};

use crate::error::*;

/// Network settings of the UDP transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpConfig {
    /// Local address to bind
    pub host_ip: Ipv4Addr,

    /// Local port to bind (0 = ephemeral)
    pub host_port: u16,

    /// Where discovery broadcasts go
    pub broadcast_address: Ipv4Addr,

    /// Device discovery port
    pub detection_port: u16,

    /// Device command port, used when discovery did not report one
    pub command_port: u16,

    /// Time between discovery broadcasts
    pub discovery_interval: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host_ip: Ipv4Addr::UNSPECIFIED,
            host_port: 0,
            broadcast_address: Ipv4Addr::BROADCAST,
            detection_port: DEFAULT_DETECTION_PORT,
            command_port: DEFAULT_COMMAND_PORT,
            discovery_interval: Duration::from_millis(DEFAULT_DISCOVERY_INTERVAL_MS),
        }
    }
}

struct PendingCommand {
    completion: Completion,
    requested: WorkMode,
}

/// State shared with the background tasks
#[derive(Default)]
struct Shared {
    devices: Mutex<BTreeMap<DeviceHandle, DeviceInfo>>,
    callback: Mutex<Option<Arc<dyn Fn(DeviceInfo) + Send + Sync>>>,
    pending: Mutex<HashMap<u32, PendingCommand>>,
    seq: AtomicU32,
}

impl Shared {
    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::AcqRel)
    }

    fn handle_frame(&self, frame: Frame, from: SocketAddr) {
        trace!("Received from {}: {:?}", from, frame);

        if !frame.is_ack() {
            trace!("Ignoring non-ACK {} from {}", frame.command, from);
            return;
        }

        match frame.command {
            CommandId::Discovery => match DiscoveryAck::parse(&frame.payload) {
                Ok(ack) if ack.ret_code == 0 => self.handle_discovery(ack.into_device_info()),
                Ok(ack) => debug!("Discovery ACK from {} with ret_code {}", from, ack.ret_code),
                Err(e) => debug!("Malformed discovery ACK from {}: {}", from, e),
            },
            CommandId::ParameterConfig => {
                let Some(pending) = self.pending.lock().remove(&frame.seq) else {
                    debug!("No pending command for seq {} from {}", frame.seq, from);
                    return;
                };

                match ConfigAck::parse(&frame.payload) {
                    Ok(ack) if ack.is_success() => {
                        pending.completion.succeed(pending.requested.observed_mode());
                    }
                    Ok(ack) => {
                        pending.completion.fail(format!(
                            "device rejected work mode (ret_code {}, key 0x{:04X})",
                            ack.ret_code, ack.error_key
                        ));
                    }
                    Err(e) => {
                        pending.completion.fail(format!("malformed ACK: {}", e));
                    }
                }
            }
            other => trace!("Ignoring {} from {}", other, from),
        }
    }

    fn handle_discovery(&self, info: DeviceInfo) {
        let is_new = {
            let mut devices = self.devices.lock();
            let is_new = !devices.contains_key(&info.handle);
            devices.insert(info.handle, info.clone());
            is_new
        };

        if is_new {
            info!("Lidar found: {}", info);
        }

        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(info);
        }
    }

    fn command_addr(&self, handle: DeviceHandle, default_port: u16) -> SocketAddr {
        let port = self
            .devices
            .lock()
            .get(&handle)
            .and_then(|info| info.command_port)
            .unwrap_or(default_port);

        SocketAddr::V4(SocketAddrV4::new(handle.ipv4(), port))
    }
}

/// UDP transport for LiDAR sensors
pub struct UdpTransport {
    config: UdpConfig,
    shared: Arc<Shared>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    runtime: Mutex<Option<Handle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Create new UDP transport with default ports
    pub fn new(host_ip: Ipv4Addr) -> Self {
        Self::with_config(UdpConfig {
            host_ip,
            ..UdpConfig::default()
        })
    }

    /// Create new UDP transport
    pub fn with_config(config: UdpConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            socket: Mutex::new(None),
            runtime: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Check if initialized
    pub fn is_initialized(&self) -> bool {
        self.socket.lock().is_some()
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.lock().clone().ok_or(Error::NotInitialized)?;
        Ok(socket.local_addr()?)
    }

    async fn bind(&self) -> Result<UdpSocket> {
        let local = SocketAddrV4::new(self.config.host_ip, self.config.host_port);

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", local, e)))?;
        socket.set_broadcast(true)?;

        Ok(socket)
    }

    async fn receive_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Receive error: {}", e);
                    continue;
                }
            };

            match Frame::decode(BytesMut::from(&buf[..n])) {
                Ok(frame) => shared.handle_frame(frame, from),
                Err(e) if e.is_malformed_frame() => debug!(
                    "Dropping malformed datagram from {} ({}): {}",
                    from,
                    e,
                    hex::encode(&buf[..n.min(32)])
                ),
                Err(e) => warn!("Cannot decode datagram from {}: {}", from, e),
            }
        }
    }

    async fn discovery_loop(
        socket: Arc<UdpSocket>,
        shared: Arc<Shared>,
        target: SocketAddr,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let frame = Frame::request(CommandId::Discovery, shared.next_seq());
            let data = frame.encode();

            trace!("Broadcasting discovery to {}: {}", target, hex::encode(&data));

            if let Err(e) = socket.send_to(&data, target).await {
                warn!("Discovery broadcast to {} failed: {}", target, e);
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for UdpTransport {
    async fn initialize(&self) -> std::result::Result<(), InitError> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized.into());
        }

        let socket = Arc::new(self.bind().await?);
        let local = socket.local_addr().map_err(Error::Io)?;
        let target = SocketAddr::V4(SocketAddrV4::new(
            self.config.broadcast_address,
            self.config.detection_port,
        ));

        info!("UDP transport bound to {}, discovering via {}", local, target);

        let runtime = Handle::current();
        let receiver = runtime.spawn(Self::receive_loop(socket.clone(), self.shared.clone()));
        let discovery = runtime.spawn(Self::discovery_loop(
            socket.clone(),
            self.shared.clone(),
            target,
            self.config.discovery_interval,
        ));

        self.tasks.lock().extend([receiver, discovery]);
        *self.runtime.lock() = Some(runtime);
        *self.socket.lock() = Some(socket);

        Ok(())
    }

    async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        self.runtime.lock().take();
        if self.socket.lock().take().is_some() {
            debug!("UDP transport shut down");
        }

        let dropped = self.shared.pending.lock().drain().count();
        if dropped > 0 {
            debug!("Dropped {} pending commands", dropped);
        }
    }

    fn on_device_discovered(&self, callback: DiscoveryCallback) {
        let callback: Arc<dyn Fn(DeviceInfo) + Send + Sync> = Arc::from(callback);
        *self.shared.callback.lock() = Some(callback.clone());

        let known: Vec<DeviceInfo> = self.shared.devices.lock().values().cloned().collect();
        for info in known {
            callback(info);
        }
    }

    fn send_mode_command(&self, handle: DeviceHandle, mode: Mode, completion: Completion) {
        let (Some(socket), Some(runtime)) = (self.socket.lock().clone(), self.runtime.lock().clone()) else {
            completion.fail(Error::NotInitialized.to_string());
            return;
        };

        let Some(work_mode) = WorkMode::for_request(mode) else {
            completion.fail(format!("mode {} cannot be requested", mode));
            return;
        };

        let seq = self.shared.next_seq();
        let frame = Frame::with_payload(
            CommandId::ParameterConfig,
            FrameKind::Request,
            Sender::Host,
            seq,
            message::work_mode_request(work_mode),
        );
        let addr = self.shared.command_addr(handle, self.config.command_port);

        {
            let mut pending = self.shared.pending.lock();

            // Timed-out commands never get their ACK applied
            pending.retain(|_, p| !p.completion.is_resolved());
            pending.insert(
                seq,
                PendingCommand {
                    completion: completion.clone(),
                    requested: work_mode,
                },
            );
        }

        trace!("Sending to {}: {:?}", addr, frame);

        let shared = self.shared.clone();
        let data = frame.encode();
        runtime.spawn(async move {
            if let Err(e) = socket.send_to(&data, addr).await {
                shared.pending.lock().remove(&seq);
                completion.fail(format!("send to {} failed: {}", addr, e));
            }
        });
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if self.is_initialized() {
            warn!("UDP transport dropped while still initialized");
            for task in self.tasks.lock().drain(..) {
                task.abort();
            }
        }
    }
}
