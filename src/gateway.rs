//! Command gateway - the application-facing send surface

use crate::error::LinkError;
use crate::link::LinkHandle;
use bytes::Bytes;

/// Fire-and-forget command channel to the robot
///
/// Cheap to clone and hand to whatever drives the robot. Commands submitted
/// while no connection exists are dropped and reported as `NotConnected`,
/// never queued or retried; there is no acknowledgment protocol.
#[derive(Clone)]
pub struct CommandGateway {
    link: LinkHandle,
}

impl CommandGateway {
    pub fn new(link: LinkHandle) -> Self {
        Self { link }
    }

    /// Write one opaque command payload to the serial link
    pub async fn send(&self, command: Bytes) -> Result<(), LinkError> {
        self.link.send(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkConfig, LinkState, SerialLink};
    use crate::testutil::{MockBackend, MockRegistry};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_gateway_rejects_when_disconnected() {
        let registry = Arc::new(MockRegistry::new(&[]));
        let backend = Arc::new(MockBackend::new());
        let link = SerialLink::new(LinkConfig::default(), registry, backend);

        let gateway = link.gateway();
        let result = gateway.send(Bytes::from_static(b"F10")).await;
        assert!(matches!(result, Err(LinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_gateway_writes_through_the_link() {
        let registry = Arc::new(MockRegistry::with_auto_grant(&[9025], true));
        let backend = Arc::new(MockBackend::new());
        let link = SerialLink::new(LinkConfig::default(), registry, backend.clone());

        link.start().await.unwrap();
        timeout(Duration::from_secs(1), async {
            while link.status().await.unwrap().state != LinkState::Connected {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for connection");

        let gateway = link.gateway();
        gateway.send(Bytes::from_static(b"F10")).await.unwrap();

        let mut far = backend.take_far_end();
        let mut written = [0u8; 3];
        timeout(Duration::from_secs(1), far.read_exact(&mut written))
            .await
            .expect("timed out reading command")
            .unwrap();
        assert_eq!(&written, b"F10");
    }
}
