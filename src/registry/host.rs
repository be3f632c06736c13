//! Host-backed device registry using the operating system's port enumeration

use super::{DeviceHandle, DeviceRegistry, PermissionTicket, UsbDevice};
use crate::error::LinkError;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_serial::SerialPortType;
use tracing::debug;

/// Device registry backed by the host's serial port enumeration
///
/// Only USB-attached ports are reported; built-in UARTs and PCI serial
/// devices carry no vendor ID and are skipped.
#[derive(Debug, Default)]
pub struct HostRegistry;

impl HostRegistry {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceRegistry for HostRegistry {
    async fn list_attached(&self) -> Result<Vec<UsbDevice>, LinkError> {
        let ports = tokio_serial::available_ports()?;

        Ok(ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => Some(UsbDevice {
                    id: port.port_name,
                    vendor_id: usb.vid,
                }),
                _ => None,
            })
            .collect())
    }

    async fn request_permission(&self, device: &UsbDevice) -> Result<PermissionTicket, LinkError> {
        // Desktop hosts gate serial access through file permissions rather than
        // an interactive broker; resolve as granted and let the subsequent open
        // surface any actual denial.
        debug!("permission auto-granted for {}", device.id);
        let (grant_tx, ticket) = oneshot::channel();
        let _ = grant_tx.send(true);
        Ok(ticket)
    }

    async fn open(&self, device: &UsbDevice) -> Result<DeviceHandle, LinkError> {
        // Confirm the device is still attached before handing out a handle; the
        // actual port open happens in the serial backend.
        let attached = self.list_attached().await?;
        if attached.iter().any(|d| d.id == device.id) {
            Ok(DeviceHandle {
                device: device.clone(),
            })
        } else {
            Err(LinkError::OpenFailed(format!(
                "{} is no longer attached",
                device.id
            )))
        }
    }
}
