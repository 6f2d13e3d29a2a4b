//! Connectivity monitor
//!
//! Two-state machine (Online / Offline) driven by platform network-status
//! events: the embedding terminal calls [`ConnectivityMonitor::set_online`]
//! and [`ConnectivityMonitor::set_offline`] from its event hooks. An
//! Offline→Online transition is published on the `reconnected` broadcast
//! channel, which the queue worker consumes to trigger reconciliation.
//!
//! No intermediate "flaky" state is modeled; each individual request still
//! fails or succeeds on its own and is handled by the caller.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Reconnect event channel capacity; events are unit markers, so a small
/// buffer is enough even if a consumer briefly lags.
const RECONNECT_CHANNEL_CAPACITY: usize = 16;

/// Network status as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Online,
    Offline,
}

/// Tracks online/offline transitions and publishes reconnect events
#[derive(Clone)]
pub struct ConnectivityMonitor {
    status: Arc<RwLock<ConnectionStatus>>,
    reconnected_tx: broadcast::Sender<()>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectionStatus) -> Self {
        let (reconnected_tx, _) = broadcast::channel(RECONNECT_CHANNEL_CAPACITY);
        Self {
            status: Arc::new(RwLock::new(initial)),
            reconnected_tx,
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_online(&self) -> bool {
        self.status() == ConnectionStatus::Online
    }

    /// Report that the platform regained connectivity.
    ///
    /// Fires a `reconnected` event only on an actual Offline→Online
    /// transition; repeated online reports are ignored.
    pub fn set_online(&self) {
        let mut status = self.status.write();
        if *status == ConnectionStatus::Online {
            return;
        }
        *status = ConnectionStatus::Online;
        drop(status);

        tracing::info!("Connectivity restored");
        if self.reconnected_tx.send(()).is_err() {
            tracing::debug!("Reconnect event dropped: no active receivers");
        }
    }

    /// Report that the platform lost connectivity
    pub fn set_offline(&self) {
        let mut status = self.status.write();
        if *status == ConnectionStatus::Offline {
            return;
        }
        *status = ConnectionStatus::Offline;
        drop(status);

        tracing::warn!("Connectivity lost, entering offline mode");
    }

    /// Subscribe to Offline→Online transitions
    pub fn subscribe_reconnected(&self) -> broadcast::Receiver<()> {
        self.reconnected_tx.subscribe()
    }
}
