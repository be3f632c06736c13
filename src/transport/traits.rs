//! Serial backend trait abstraction for pluggable port implementations

use crate::error::LinkError;
use crate::registry::DeviceHandle;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

/// A full-duplex serial byte stream
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static> LinkStream for T {}

/// Serial line parameters
///
/// The robot controller speaks a fixed 9600 8-N-1 configuration with flow
/// control off; these are not runtime-configurable.
#[derive(Debug, Clone)]
pub struct SerialParams {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Factory producing configured serial streams for opened devices
#[async_trait]
pub trait SerialBackend: Send + Sync {
    /// Configure the serial interface for an opened device
    ///
    /// Fails with `PortUnavailable` when no serial interface can be produced
    /// for this handle.
    async fn configure(
        &self,
        handle: &DeviceHandle,
        params: &SerialParams,
    ) -> Result<Box<dyn LinkStream>, LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

    #[test]
    fn test_default_params_are_9600_8n1() {
        let params = SerialParams::default();
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.data_bits, DataBits::Eight);
        assert_eq!(params.stop_bits, StopBits::One);
        assert_eq!(params.parity, Parity::None);
        assert_eq!(params.flow_control, FlowControl::None);
    }
}
