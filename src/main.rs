use botlink::registry::{DeviceRegistry, HostRegistry};
use botlink::transport::UsbSerialBackend;
use botlink::watch::HotplugWatcher;
use botlink::{LinkConfig, LinkNotice, SerialLink};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HOTPLUG_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig::default();
    info!("botlink starting");
    info!("  supported vendor IDs: {:?}", config.supported_vendor_ids);
    info!("  serial: {} baud, 8-N-1", config.serial.baud_rate);

    let registry: Arc<dyn DeviceRegistry> = Arc::new(HostRegistry::new());
    let backend = Arc::new(UsbSerialBackend::new());
    let mut link = SerialLink::new(config, registry.clone(), backend);

    // Subscribe to the host's attach/detach notifications.
    let watcher = HotplugWatcher::spawn(registry, link.handle(), HOTPLUG_POLL_INTERVAL);

    // Drive movement commands from stdin, one command per line.
    let gateway = link.gateway();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.is_empty() {
                continue;
            }
            if let Err(e) = gateway.send(Bytes::from(line.into_bytes())).await {
                warn!("command dropped: {}", e);
            }
        }
    });

    // Shut the link down on Ctrl-C.
    let ctl = link.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = ctl.shutdown().await;
        }
    });

    // Pick up a controller that is already plugged in.
    link.start().await?;

    // Main notice loop
    while let Some(notice) = link.recv().await {
        match notice {
            LinkNotice::Connected { device } => {
                info!("serial connection open on {}", device);
            }
            LinkNotice::Disconnected { reason } => {
                warn!("disconnected: {}", reason);
            }
            LinkNotice::PermissionDenied => {
                warn!("device permission denied");
            }
            LinkNotice::ConnectFailed { reason } => {
                error!("connection failed: {}", reason);
            }
            LinkNotice::Telemetry(text) => {
                info!("telemetry: {}", text);
            }
        }
    }

    watcher.stop();
    info!("botlink stopped");
    Ok(())
}
