use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::queue::OfflineSyncQueue;

/// Latest known connectivity, shared over a watch channel.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Record the current state. Returns `true` on an offline-to-online edge.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.sender.send_replace(online);
        if was_online != online {
            info!(online, "connectivity changed");
        }
        online && !was_online
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Run `queue.sync()` every time `connectivity` goes from offline to online.
/// The task ends when every sender is dropped.
pub fn spawn_sync_on_reconnect(
    queue: Arc<OfflineSyncQueue>,
    mut connectivity: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut online = *connectivity.borrow_and_update();
        while connectivity.changed().await.is_ok() {
            let now_online = *connectivity.borrow_and_update();
            let reconnected = now_online && !online;
            online = now_online;
            if !reconnected {
                continue;
            }

            match queue.sync().await {
                Ok(report) => info!(
                    completed = report.completed.len(),
                    remaining = report.remaining,
                    "reconnect sync finished"
                ),
                Err(error) => warn!(error = %error, "reconnect sync failed"),
            }
        }
    })
}
