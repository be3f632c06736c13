//! Device registry abstraction for USB serial device discovery and access

mod host;

pub use host::HostRegistry;

use crate::error::LinkError;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// A discovered USB serial device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// Opaque device identifier (the port path on desktop hosts)
    pub id: String,
    /// USB vendor ID of the device's manufacturer
    pub vendor_id: u16,
}

/// Token for a successfully opened device, consumed by the serial backend
#[derive(Debug)]
pub struct DeviceHandle {
    /// The device this handle was opened for
    pub device: UsbDevice,
}

/// Pending permission request
///
/// Resolves to the grant/deny decision of the host's permission broker.
/// The link machine forwards the resolution into its own event queue so the
/// callback stays serialized with attach/detach and inbound-byte events.
/// A dropped sender side is treated as a denial.
pub type PermissionTicket = oneshot::Receiver<bool>;

/// Registry of attached USB serial devices
///
/// Consumed, not implemented, by the link core: the real implementation sits
/// on top of the host's port enumeration, tests substitute a mock.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Enumerate currently attached USB serial devices, in registry order
    async fn list_attached(&self) -> Result<Vec<UsbDevice>, LinkError>;

    /// Ask the host for access to the device
    ///
    /// At most one request is outstanding at a time; the decision arrives
    /// asynchronously through the returned ticket.
    async fn request_permission(&self, device: &UsbDevice) -> Result<PermissionTicket, LinkError>;

    /// Open the device, yielding a handle the serial backend can configure
    async fn open(&self, device: &UsbDevice) -> Result<DeviceHandle, LinkError>;
}
