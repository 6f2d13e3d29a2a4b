//! TerminalState — owned component wiring
//!
//! Every engine component is constructed here at terminal startup and
//! torn down at shutdown; nothing lives in ambient globals, so tests
//! build fresh instances per case. The embedding UI holds one
//! `TerminalState` and reaches the components through its accessors.

use crate::catalog::ReferenceCache;
use crate::connectivity::{ConnectionStatus, ConnectivityMonitor};
use crate::core::TerminalConfig;
use crate::orders::ActiveOrderStore;
use crate::queue::{OfflineQueue, QueueWorker};
use crate::remote::{entities, RemoteStore};
use crate::settlement::SettlementWorkflow;
use crate::storage::{StorageError, TerminalStorage};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wires storage, connectivity, cache, orders, settlement, and the queue
pub struct TerminalState {
    config: TerminalConfig,
    monitor: ConnectivityMonitor,
    catalog: ReferenceCache,
    orders: Arc<ActiveOrderStore>,
    queue: OfflineQueue,
    settlement: SettlementWorkflow,
}

impl TerminalState {
    /// Open the durable state file and wire all components
    pub fn new(
        config: TerminalConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, StorageError> {
        let storage = TerminalStorage::open(&config.state_path)?;
        Self::with_storage(config, remote, storage)
    }

    /// Wire components over an already-open storage handle
    pub fn with_storage(
        config: TerminalConfig,
        remote: Arc<dyn RemoteStore>,
        storage: TerminalStorage,
    ) -> Result<Self, StorageError> {
        let monitor = ConnectivityMonitor::new(ConnectionStatus::Online);
        let catalog = ReferenceCache::new(
            storage.clone(),
            remote.clone(),
            monitor.clone(),
            config.cache_ttl_ms,
        )?;
        let orders = Arc::new(ActiveOrderStore::new(storage.clone(), catalog.clone())?);
        let queue = OfflineQueue::new(
            storage,
            remote.clone(),
            monitor.clone(),
            config.queue_retention_ms,
        );
        let settlement = SettlementWorkflow::new(
            orders.clone(),
            queue.clone(),
            remote,
            monitor.clone(),
        );

        Ok(Self {
            config,
            monitor,
            catalog,
            orders,
            queue,
            settlement,
        })
    }

    /// Startup sequence: warm the reference caches, fall back to the
    /// takeaway selection if nothing was restored, and reconcile the
    /// queue once if online. Each step degrades gracefully.
    pub async fn startup(&self) {
        for entity in [entities::PRODUCTS, entities::DINING_TABLES] {
            if let Err(e) = self.catalog.get(entity).await {
                tracing::warn!(entity = %entity, error = %e, "Reference warm-up failed");
            }
        }

        match self.orders.default_to_takeaway() {
            Ok(true) => tracing::debug!("No restored selection, defaulted to takeaway"),
            Ok(false) => {}
            Err(e) => tracing::error!("Selection restore failed: {e}"),
        }

        if self.monitor.is_online() {
            if let Err(e) = self.queue.flush().await {
                tracing::error!("Startup queue flush failed: {e}");
            }
        }
    }

    /// Spawn the background reconciliation worker.
    ///
    /// Returns the join handle and the token that stops the worker at
    /// terminal shutdown.
    pub fn spawn_queue_worker(&self) -> (JoinHandle<()>, CancellationToken) {
        let shutdown = CancellationToken::new();
        let worker = QueueWorker::new(self.queue.clone(), self.monitor.clone(), shutdown.clone());
        (tokio::spawn(worker.run()), shutdown)
    }

    // ========== Component access ==========

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn catalog(&self) -> &ReferenceCache {
        &self.catalog
    }

    pub fn orders(&self) -> &ActiveOrderStore {
        &self.orders
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn settlement(&self) -> &SettlementWorkflow {
        &self.settlement
    }
}
