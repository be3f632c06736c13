//! USB serial backend over the host serial port layer

use crate::error::LinkError;
use crate::registry::DeviceHandle;
use crate::transport::traits::{LinkStream, SerialBackend, SerialParams};
use async_trait::async_trait;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// Serial backend producing `tokio_serial` streams for USB devices
#[derive(Debug, Default)]
pub struct UsbSerialBackend;

impl UsbSerialBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialBackend for UsbSerialBackend {
    async fn configure(
        &self,
        handle: &DeviceHandle,
        params: &SerialParams,
    ) -> Result<Box<dyn LinkStream>, LinkError> {
        let stream: SerialStream = tokio_serial::new(&handle.device.id, params.baud_rate)
            .data_bits(params.data_bits)
            .stop_bits(params.stop_bits)
            .parity(params.parity)
            .flow_control(params.flow_control)
            .open_native_async()
            .map_err(|e| LinkError::PortUnavailable(e.to_string()))?;

        debug!(
            "configured {} at {} baud",
            handle.device.id, params.baud_rate
        );

        Ok(Box::new(stream))
    }
}
