//! QueueWorker — background task that drains the offline queue
//!
//! Subscribes to the connectivity monitor's reconnect channel and flushes
//! the queue on every Offline→Online transition, plus once at startup if
//! the terminal comes up online. Flush failures are logged, never
//! surfaced: the cashier already has the customer's payment, so the only
//! correct reaction is to retry on the next trigger.

use crate::connectivity::ConnectivityMonitor;
use crate::queue::OfflineQueue;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub struct QueueWorker {
    queue: OfflineQueue,
    monitor: ConnectivityMonitor,
    shutdown: CancellationToken,
}

impl QueueWorker {
    pub fn new(
        queue: OfflineQueue,
        monitor: ConnectivityMonitor,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            monitor,
            shutdown,
        }
    }

    /// Run the worker until shutdown.
    ///
    /// 1. Flush on startup when online
    /// 2. Flush on every reconnect event
    pub async fn run(self) {
        tracing::info!("QueueWorker started");

        if self.monitor.is_online() {
            self.flush_logged().await;
        }

        let mut reconnected = self.monitor.subscribe_reconnected();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("QueueWorker shutting down");
                    break;
                }

                result = reconnected.recv() => {
                    match result {
                        Ok(()) => self.flush_logged().await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Missed events collapse into one flush; the
                            // queue itself is the source of truth
                            tracing::warn!("QueueWorker lagged {n} reconnect events, flushing");
                            self.flush_logged().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Reconnect channel closed, QueueWorker stopping");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("QueueWorker stopped");
    }

    async fn flush_logged(&self) {
        match self.queue.flush().await {
            Ok(summary) if summary.flushed > 0 || summary.remaining > 0 => {
                tracing::info!(
                    flushed = summary.flushed,
                    remaining = summary.remaining,
                    purged = summary.purged,
                    "Queue flush cycle finished"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Queue flush failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectionStatus;
    use crate::queue::DEFAULT_RETENTION_MS;
    use crate::remote::testing::MockRemoteStore;
    use crate::storage::TerminalStorage;
    use shared::models::{Invoice, InvoiceLine, InvoiceStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn invoice(id: &str) -> Invoice {
        Invoice {
            invoice_id: id.to_string(),
            table_id: "B001".to_string(),
            issued_at: 0,
            employee: "Lan".to_string(),
            customer: "Walk-in".to_string(),
            subtotal: 100000.0,
            vat: 10000.0,
            discount: 0.0,
            amount_paid: 110000.0,
            change: 0.0,
            note: String::new(),
            status: InvoiceStatus::Settled,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_drains_queue_on_reconnect() {
        let storage = TerminalStorage::open_in_memory().unwrap();
        let remote = Arc::new(MockRemoteStore::new());
        let monitor = ConnectivityMonitor::new(ConnectionStatus::Offline);
        let queue = OfflineQueue::new(
            storage,
            remote.clone(),
            monitor.clone(),
            DEFAULT_RETENTION_MS,
        );

        queue
            .enqueue(invoice("INV-1"), vec![InvoiceLine::new("INV-1", "P1", 1)], false)
            .unwrap();

        let shutdown = CancellationToken::new();
        let worker = QueueWorker::new(queue.clone(), monitor.clone(), shutdown.clone());
        let handle = tokio::spawn(worker.run());

        // Offline at startup: nothing flushed
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.unprocessed_count().unwrap(), 1);

        monitor.set_online();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.unprocessed_count().unwrap(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_flushes_at_startup_when_online() {
        let storage = TerminalStorage::open_in_memory().unwrap();
        let remote = Arc::new(MockRemoteStore::new());
        let monitor = ConnectivityMonitor::new(ConnectionStatus::Online);
        let queue = OfflineQueue::new(
            storage,
            remote.clone(),
            monitor.clone(),
            DEFAULT_RETENTION_MS,
        );
        queue
            .enqueue(invoice("INV-1"), vec![InvoiceLine::new("INV-1", "P1", 1)], false)
            .unwrap();

        let shutdown = CancellationToken::new();
        let worker = QueueWorker::new(queue.clone(), monitor, shutdown.clone());
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.unprocessed_count().unwrap(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
