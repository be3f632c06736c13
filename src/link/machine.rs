//! Serial link service: a single spawned task owning the connection lifecycle
//!
//! Attach/detach notifications, the permission callback, inbound serial bytes
//! and caller commands all arrive as `LinkEvent`s on one queue, so every state
//! transition happens on the machine task. Nothing else ever touches the
//! serial connection.

use crate::error::LinkError;
use crate::gateway::CommandGateway;
use crate::link::state::{is_valid_transition, LinkState};
use crate::registry::{DeviceRegistry, UsbDevice};
use crate::transport::{LinkStream, SerialBackend, SerialParams};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Vendor IDs recognized as robot controllers, unless overridden in config
pub const DEFAULT_SUPPORTED_VENDOR_IDS: [u16; 3] = [9025, 10755, 4292];

/// Configuration for the serial link service
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Allow-list of USB vendor IDs; fixed at startup
    pub supported_vendor_ids: Vec<u16>,
    /// Serial line parameters
    pub serial: SerialParams,
    /// Event queue capacity
    pub event_capacity: usize,
    /// Notice channel capacity
    pub notice_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            supported_vendor_ids: DEFAULT_SUPPORTED_VENDOR_IDS.to_vec(),
            serial: SerialParams::default(),
            event_capacity: 64,
            notice_capacity: 64,
        }
    }
}

/// Events consumed by the machine task
enum LinkEvent {
    Start,
    DeviceAttached,
    DeviceDetached,
    PermissionResult {
        granted: bool,
    },
    Inbound(Bytes),
    Send {
        payload: Bytes,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Status {
        reply: oneshot::Sender<LinkStatus>,
    },
    Shutdown,
}

/// Notices emitted to the service's consumer
#[derive(Debug, Clone)]
pub enum LinkNotice {
    /// Serial connection is open
    Connected { device: String },
    /// Connection torn down (detach or shutdown)
    Disconnected { reason: String },
    /// The host denied access to the selected device
    PermissionDenied,
    /// Port setup failed after permission was granted
    ConnectFailed { reason: String },
    /// Decoded telemetry text received from the robot
    Telemetry(String),
}

/// Snapshot of the machine's state, taken on the machine task itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub has_device: bool,
    pub has_connection: bool,
}

/// The open serial connection; exists only while the link is `Connected`
struct SerialConnection {
    writer: WriteHalf<Box<dyn LinkStream>>,
    reader_task: JoinHandle<()>,
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

struct LinkMachine {
    config: LinkConfig,
    registry: Arc<dyn DeviceRegistry>,
    backend: Arc<dyn SerialBackend>,
    state: LinkState,
    device: Option<UsbDevice>,
    connection: Option<SerialConnection>,
    event_tx: mpsc::Sender<LinkEvent>,
    notice_tx: mpsc::Sender<LinkNotice>,
}

impl LinkMachine {
    async fn run(mut self, mut event_rx: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = event_rx.recv().await {
            match event {
                LinkEvent::Start => self.handle_start().await,
                LinkEvent::DeviceAttached => {
                    if self.state.is_idle() {
                        info!("USB device attached");
                        self.handle_start().await;
                    } else {
                        debug!("attach event ignored in state {}", self.state);
                    }
                }
                LinkEvent::DeviceDetached => {
                    if self.state.is_idle() {
                        debug!("detach event ignored while idle");
                    } else {
                        info!("USB device detached");
                        self.teardown("device detached").await;
                    }
                }
                LinkEvent::PermissionResult { granted } => {
                    self.handle_permission_result(granted).await;
                }
                LinkEvent::Inbound(chunk) => self.handle_inbound(chunk).await,
                LinkEvent::Send { payload, reply } => {
                    let result = self.handle_send(payload).await;
                    let _ = reply.send(result);
                }
                LinkEvent::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                LinkEvent::Shutdown => {
                    self.teardown("shutdown").await;
                    break;
                }
            }
        }
        debug!("link service task exiting");
    }

    /// Begin discovery; no-op unless idle
    async fn handle_start(&mut self) {
        if !self.state.is_idle() {
            debug!("start ignored in state {}", self.state);
            return;
        }
        self.set_state(LinkState::Discovering);

        let devices = match self.registry.list_attached().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("device enumeration failed: {}", e);
                self.set_state(LinkState::Idle);
                return;
            }
        };

        if devices.is_empty() {
            // Nothing plugged in: the normal quiescent state, not an error.
            debug!("no USB devices attached");
            self.set_state(LinkState::Idle);
            return;
        }

        // First enumerated match wins; registry iteration order is the only
        // tie-break when several supported devices are attached.
        let supported = &self.config.supported_vendor_ids;
        let Some(device) = devices
            .into_iter()
            .find(|d| supported.contains(&d.vendor_id))
        else {
            warn!(
                "no attached device matches the supported vendor IDs {:?}",
                supported
            );
            self.set_state(LinkState::Idle);
            return;
        };

        info!("selected {} (vendor {})", device.id, device.vendor_id);
        match self.registry.request_permission(&device).await {
            Ok(ticket) => {
                self.device = Some(device);
                self.set_state(LinkState::PermissionRequested);

                // Forward the broker's decision into the event queue so it is
                // serialized with everything else. A dropped broker counts as
                // a denial.
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let granted = ticket.await.unwrap_or(false);
                    let _ = event_tx.send(LinkEvent::PermissionResult { granted }).await;
                });
            }
            Err(e) => {
                warn!("permission request failed: {}", e);
                self.set_state(LinkState::Idle);
            }
        }
    }

    /// Permission callback; ignored unless a request is outstanding, which
    /// guards against stale grants for an already-released device.
    async fn handle_permission_result(&mut self, granted: bool) {
        if !self.state.awaits_permission() {
            debug!(
                "permission result (granted={}) ignored in state {}",
                granted, self.state
            );
            return;
        }

        if !granted {
            info!("device permission denied by the host");
            self.device = None;
            self.set_state(LinkState::Idle);
            self.notify(LinkNotice::PermissionDenied).await;
            return;
        }

        self.set_state(LinkState::PermissionGranted);

        let Some(device) = self.device.clone() else {
            warn!("permission granted but no device selected");
            self.set_state(LinkState::Idle);
            return;
        };

        match self.setup_port(&device).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.set_state(LinkState::Connected);
                info!("serial connection open on {}", device.id);
                self.notify(LinkNotice::Connected { device: device.id }).await;
            }
            Err(e) => {
                warn!("port setup failed for {}: {}", device.id, e);
                self.device = None;
                self.set_state(LinkState::Idle);
                self.notify(LinkNotice::ConnectFailed {
                    reason: e.to_string(),
                })
                .await;
            }
        }
    }

    /// Open the device and configure the serial interface
    async fn setup_port(&mut self, device: &UsbDevice) -> Result<SerialConnection, LinkError> {
        let handle = self.registry.open(device).await?;
        let stream = self.backend.configure(&handle, &self.config.serial).await?;
        let (reader, writer) = tokio::io::split(stream);

        // Register the read loop before declaring the link connected.
        let reader_task = spawn_reader(reader, self.event_tx.clone());

        Ok(SerialConnection {
            writer,
            reader_task,
        })
    }

    async fn handle_send(&mut self, payload: Bytes) -> Result<(), LinkError> {
        let Some(connection) = self.connection.as_mut() else {
            debug!("send of {} bytes rejected: not connected", payload.len());
            return Err(LinkError::NotConnected);
        };
        connection.writer.write_all(&payload).await?;
        Ok(())
    }

    /// Inbound serial chunk; each chunk is decoded on its own, with no
    /// reassembly across reads.
    async fn handle_inbound(&mut self, chunk: Bytes) {
        if self.state != LinkState::Connected {
            debug!("dropping {} inbound bytes after teardown", chunk.len());
            return;
        }
        match std::str::from_utf8(&chunk) {
            Ok(text) => {
                debug!("received from serial: {}", text);
                self.notify(LinkNotice::Telemetry(text.to_string())).await;
            }
            Err(e) => warn!("dropping undecodable serial chunk: {}", e),
        }
    }

    /// Release the connection and the selected device; safe to call in any
    /// state, including when teardown already ran.
    async fn teardown(&mut self, reason: &str) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.writer.shutdown().await;
        }
        self.device = None;
        if !self.state.is_idle() {
            self.set_state(LinkState::Idle);
            self.notify(LinkNotice::Disconnected {
                reason: reason.to_string(),
            })
            .await;
        }
    }

    fn set_state(&mut self, next: LinkState) {
        debug_assert!(is_valid_transition(self.state, next));
        if self.state != next {
            debug!("link state: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            has_device: self.device.is_some(),
            has_connection: self.connection.is_some(),
        }
    }

    async fn notify(&self, notice: LinkNotice) {
        let _ = self.notice_tx.send(notice).await;
    }
}

/// Read loop for an open connection; pushes chunks into the event queue
fn spawn_reader(
    mut reader: ReadHalf<Box<dyn LinkStream>>,
    event_tx: mpsc::Sender<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("serial stream closed");
                    break;
                }
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    if event_tx.send(LinkEvent::Inbound(chunk)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("serial read ended: {}", e);
                    break;
                }
            }
        }
    })
}

/// Clonable handle feeding events into the machine task
///
/// All calls fail with `ChannelClosed` once the service has shut down.
#[derive(Clone)]
pub struct LinkHandle {
    event_tx: mpsc::Sender<LinkEvent>,
}

impl LinkHandle {
    /// Begin discovery and the permission handshake (idempotent)
    pub async fn start(&self) -> Result<(), LinkError> {
        self.push(LinkEvent::Start).await
    }

    /// Tear down and stop the service
    pub async fn shutdown(&self) -> Result<(), LinkError> {
        self.push(LinkEvent::Shutdown).await
    }

    /// Host notification: a USB device was plugged in
    pub async fn on_device_attached(&self) -> Result<(), LinkError> {
        self.push(LinkEvent::DeviceAttached).await
    }

    /// Host notification: a USB device was removed
    pub async fn on_device_detached(&self) -> Result<(), LinkError> {
        self.push(LinkEvent::DeviceDetached).await
    }

    /// Host notification: the permission broker answered
    pub async fn on_permission_result(&self, granted: bool) -> Result<(), LinkError> {
        self.push(LinkEvent::PermissionResult { granted }).await
    }

    /// Write one command payload to the robot
    ///
    /// Fails with `NotConnected` when no connection exists; the command is
    /// dropped, never queued.
    pub async fn send(&self, payload: Bytes) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.push(LinkEvent::Send {
            payload,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| LinkError::ChannelClosed)?
    }

    /// Query the current state; round-trips the event queue, so all events
    /// submitted before this call are reflected in the answer.
    pub async fn status(&self) -> Result<LinkStatus, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.push(LinkEvent::Status { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| LinkError::ChannelClosed)
    }

    async fn push(&self, event: LinkEvent) -> Result<(), LinkError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }
}

/// The serial link service
///
/// Owns the notice stream; everything else is reachable through cloned
/// [`LinkHandle`]s.
pub struct SerialLink {
    handle: LinkHandle,
    notice_rx: mpsc::Receiver<LinkNotice>,
}

impl SerialLink {
    /// Create the service and spawn its machine task
    pub fn new(
        config: LinkConfig,
        registry: Arc<dyn DeviceRegistry>,
        backend: Arc<dyn SerialBackend>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (notice_tx, notice_rx) = mpsc::channel(config.notice_capacity);

        let machine = LinkMachine {
            config,
            registry,
            backend,
            state: LinkState::Idle,
            device: None,
            connection: None,
            event_tx: event_tx.clone(),
            notice_tx,
        };
        tokio::spawn(machine.run(event_rx));

        Self {
            handle: LinkHandle { event_tx },
            notice_rx,
        }
    }

    /// Get a clonable handle to the service
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Get a command gateway for the application's send surface
    pub fn gateway(&self) -> CommandGateway {
        CommandGateway::new(self.handle.clone())
    }

    /// Receive the next notice; `None` once the service has stopped
    pub async fn recv(&mut self) -> Option<LinkNotice> {
        self.notice_rx.recv().await
    }

    pub async fn start(&self) -> Result<(), LinkError> {
        self.handle.start().await
    }

    pub async fn shutdown(&self) -> Result<(), LinkError> {
        self.handle.shutdown().await
    }

    pub async fn send(&self, payload: Bytes) -> Result<(), LinkError> {
        self.handle.send(payload).await
    }

    pub async fn status(&self) -> Result<LinkStatus, LinkError> {
        self.handle.status().await
    }
}
