//! Shared test doubles for the link core

use crate::error::LinkError;
use crate::registry::{DeviceHandle, DeviceRegistry, PermissionTicket, UsbDevice};
use crate::transport::{LinkStream, SerialBackend, SerialParams};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::oneshot;

fn devices_for(vendor_ids: &[u16]) -> Vec<UsbDevice> {
    vendor_ids
        .iter()
        .enumerate()
        .map(|(i, &vid)| UsbDevice {
            id: format!("/dev/ttyUSB{i}"),
            vendor_id: vid,
        })
        .collect()
}

/// In-memory device registry with a scriptable permission broker
pub struct MockRegistry {
    devices: Mutex<Vec<UsbDevice>>,
    auto_grant: Option<bool>,
    permission_requests: AtomicUsize,
    opens: AtomicUsize,
    held_grants: Mutex<Vec<oneshot::Sender<bool>>>,
}

impl MockRegistry {
    /// Registry whose permission broker never answers on its own; tests
    /// resolve requests via `resolve_grants` or feed the callback directly.
    pub fn new(vendor_ids: &[u16]) -> Self {
        Self::build(vendor_ids, None)
    }

    /// Registry whose permission broker answers every request immediately
    pub fn with_auto_grant(vendor_ids: &[u16], granted: bool) -> Self {
        Self::build(vendor_ids, Some(granted))
    }

    fn build(vendor_ids: &[u16], auto_grant: Option<bool>) -> Self {
        Self {
            devices: Mutex::new(devices_for(vendor_ids)),
            auto_grant,
            permission_requests: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            held_grants: Mutex::new(Vec::new()),
        }
    }

    /// Replace the set of attached devices (simulates hotplug)
    pub fn set_devices(&self, vendor_ids: &[u16]) {
        *self.devices.lock().unwrap() = devices_for(vendor_ids);
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Resolve every held permission request with the given decision
    pub fn resolve_grants(&self, granted: bool) {
        for grant_tx in self.held_grants.lock().unwrap().drain(..) {
            let _ = grant_tx.send(granted);
        }
    }
}

#[async_trait]
impl DeviceRegistry for MockRegistry {
    async fn list_attached(&self) -> Result<Vec<UsbDevice>, LinkError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn request_permission(&self, _device: &UsbDevice) -> Result<PermissionTicket, LinkError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let (grant_tx, ticket) = oneshot::channel();
        match self.auto_grant {
            Some(granted) => {
                let _ = grant_tx.send(granted);
            }
            None => self.held_grants.lock().unwrap().push(grant_tx),
        }
        Ok(ticket)
    }

    async fn open(&self, device: &UsbDevice) -> Result<DeviceHandle, LinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceHandle {
            device: device.clone(),
        })
    }
}

/// Serial backend producing in-memory duplex streams
///
/// The far end of every configured stream is retained so tests can observe
/// written commands and inject inbound telemetry bytes.
pub struct MockBackend {
    fail: bool,
    configures: AtomicUsize,
    far_ends: Mutex<Vec<DuplexStream>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            fail: false,
            configures: AtomicUsize::new(0),
            far_ends: Mutex::new(Vec::new()),
        }
    }

    /// Backend that cannot produce a serial interface for any handle
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn configures(&self) -> usize {
        self.configures.load(Ordering::SeqCst)
    }

    /// Take the far end of the oldest configured stream
    pub fn take_far_end(&self) -> DuplexStream {
        self.far_ends.lock().unwrap().remove(0)
    }
}

#[async_trait]
impl SerialBackend for MockBackend {
    async fn configure(
        &self,
        _handle: &DeviceHandle,
        _params: &SerialParams,
    ) -> Result<Box<dyn LinkStream>, LinkError> {
        if self.fail {
            return Err(LinkError::PortUnavailable("mock backend".into()));
        }
        self.configures.fetch_add(1, Ordering::SeqCst);
        let (near, far) = tokio::io::duplex(256);
        self.far_ends.lock().unwrap().push(far);
        Ok(Box::new(near))
    }
}
