//! Hotplug watcher - delivers attach/detach notifications to the link

use crate::link::LinkHandle;
use crate::registry::DeviceRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Polls the device registry and turns snapshot differences into attach and
/// detach callbacks on the link.
///
/// The subscription is scoped: `stop()` or dropping the watcher aborts the
/// poll task, so error-path teardown still unsubscribes.
pub struct HotplugWatcher {
    task: JoinHandle<()>,
}

impl HotplugWatcher {
    /// Start watching; `poll_interval` is the enumeration cadence.
    ///
    /// Devices already attached when the watcher starts produce no events;
    /// the initial sweep belongs to `start()`.
    pub fn spawn(
        registry: Arc<dyn DeviceRegistry>,
        link: LinkHandle,
        poll_interval: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            let mut known: Option<HashSet<String>> = None;

            loop {
                ticker.tick().await;

                let current: HashSet<String> = match registry.list_attached().await {
                    Ok(devices) => devices.into_iter().map(|d| d.id).collect(),
                    Err(e) => {
                        warn!("hotplug enumeration failed: {}", e);
                        continue;
                    }
                };

                if let Some(previous) = &known {
                    let detached = previous.difference(&current).count();
                    let attached = current.difference(previous).count();

                    if detached > 0 {
                        debug!("{} USB device(s) detached", detached);
                        if link.on_device_detached().await.is_err() {
                            break;
                        }
                    }
                    if attached > 0 {
                        debug!("{} USB device(s) attached", attached);
                        if link.on_device_attached().await.is_err() {
                            break;
                        }
                    }
                }
                known = Some(current);
            }
            debug!("hotplug watcher exiting");
        });

        Self { task }
    }

    /// Stop watching and release the subscription
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        // Idempotent with stop(); the link must never receive callbacks from
        // a watcher that was supposed to be gone.
        self.task.abort();
    }
}
