//! Offline transaction queue
//!
//! Durable log of settlements not yet confirmed by the remote store.
//!
//! # Guarantees
//!
//! - **At-least-once, idempotent**: every replay reuses the original
//!   invoice id; retries only stop once the transaction is locally marked
//!   processed, so a lost acknowledgment can resend an accepted invoice.
//! - **Ordering**: transactions replay strictly in enqueue order, one at
//!   a time. A failed replay stops the whole cycle; continuing would let
//!   a later sale reach the store before an earlier one.
//! - **Partial-commit replay**: the invoice header and its lines are
//!   separate remote calls. `header_committed` is persisted between them,
//!   so a replay after a lines failure (or a crash mid-replay) does not
//!   resend the header.
//! - **Retention**: processed transactions are kept for a 7-day audit
//!   window and purged by age at the start of each flush cycle;
//!   unprocessed transactions are never purged.
//!
//! Flushing is triggered by [`QueueWorker`] on reconnect events and at
//! startup; a flush with nothing unprocessed performs no network calls.

pub mod worker;

pub use worker::QueueWorker;

use crate::connectivity::ConnectivityMonitor;
use crate::remote::{entities, Operation, RemoteError, RemoteStore, RequestPayload};
use crate::storage::{PendingTransaction, StorageError, TerminalStorage};
use shared::models::{Invoice, InvoiceLine};
use shared::util::now_millis;
use std::sync::Arc;

/// Retention window for processed transactions (7 days)
pub const DEFAULT_RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Outcome of one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Transactions confirmed this cycle
    pub flushed: usize,
    /// Unprocessed transactions left behind
    pub remaining: usize,
    /// Processed transactions purged by age
    pub purged: usize,
}

enum ReplayError {
    Remote(RemoteError),
    Storage(StorageError),
}

/// Durable settlement log with ordered, idempotent replay
#[derive(Clone)]
pub struct OfflineQueue {
    storage: TerminalStorage,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    retention_ms: i64,
}

impl OfflineQueue {
    pub fn new(
        storage: TerminalStorage,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
        retention_ms: i64,
    ) -> Self {
        Self {
            storage,
            remote,
            monitor,
            retention_ms,
        }
    }

    /// Log a settlement for later reconciliation.
    ///
    /// `header_committed` records whether the invoice header already
    /// reached the remote store during a partially-failed direct commit.
    pub fn enqueue(
        &self,
        invoice: Invoice,
        lines: Vec<InvoiceLine>,
        header_committed: bool,
    ) -> Result<u64, StorageError> {
        let invoice_id = invoice.invoice_id.clone();
        let tx = PendingTransaction {
            invoice,
            lines,
            enqueued_at: now_millis(),
            processed: false,
            header_committed,
        };
        let seq = self.storage.append_pending(&tx)?;
        tracing::info!(
            invoice_id = %invoice_id,
            sequence = seq,
            header_committed,
            "Settlement queued for reconciliation"
        );
        Ok(seq)
    }

    /// Count of settlements still awaiting confirmation
    pub fn unprocessed_count(&self) -> Result<usize, StorageError> {
        self.storage.unprocessed_count()
    }

    /// The full log in enqueue order (processed entries included)
    pub fn pending(&self) -> Result<Vec<(u64, PendingTransaction)>, StorageError> {
        self.storage.pending_transactions()
    }

    /// Replay unprocessed transactions against the remote store.
    ///
    /// Runs the age purge first (local only), then replays in enqueue
    /// order until the log is drained or a replay fails. Remote failures
    /// leave the transaction unprocessed for the next trigger; only
    /// storage failures surface to the caller.
    pub async fn flush(&self) -> Result<FlushSummary, StorageError> {
        let purged = self
            .storage
            .purge_processed_before(now_millis() - self.retention_ms)?;
        if purged > 0 {
            tracing::debug!(purged, "Purged processed transactions past retention");
        }

        if !self.monitor.is_online() {
            return Ok(FlushSummary {
                flushed: 0,
                remaining: self.storage.unprocessed_count()?,
                purged,
            });
        }

        let pending: Vec<(u64, PendingTransaction)> = self
            .storage
            .pending_transactions()?
            .into_iter()
            .filter(|(_, tx)| !tx.processed)
            .collect();
        if pending.is_empty() {
            return Ok(FlushSummary {
                flushed: 0,
                remaining: 0,
                purged,
            });
        }

        let total = pending.len();
        tracing::info!(count = total, "Reconciling queued transactions");

        let mut flushed = 0;
        for (seq, mut tx) in pending {
            let invoice_id = tx.invoice.invoice_id.clone();
            match self.replay(seq, &mut tx).await {
                Ok(()) => {
                    tx.processed = true;
                    self.storage.update_pending(seq, &tx)?;
                    flushed += 1;
                    tracing::info!(invoice_id = %invoice_id, "Queued settlement confirmed");
                }
                Err(ReplayError::Remote(e)) => {
                    tracing::warn!(
                        invoice_id = %invoice_id,
                        error = %e,
                        "Replay failed, stopping flush to preserve ordering"
                    );
                    break;
                }
                Err(ReplayError::Storage(e)) => return Err(e),
            }
        }

        Ok(FlushSummary {
            flushed,
            remaining: total - flushed,
            purged,
        })
    }

    /// Send one transaction: header (unless already committed), then
    /// lines. The header sub-state is persisted before the lines call so
    /// an interruption in between never resends the header.
    async fn replay(&self, seq: u64, tx: &mut PendingTransaction) -> Result<(), ReplayError> {
        if !tx.header_committed {
            let header_rows =
                vec![serde_json::to_value(&tx.invoice)
                    .map_err(|e| ReplayError::Storage(e.into()))?];
            self.remote
                .request(entities::INVOICES, Operation::Add, RequestPayload::rows(header_rows))
                .await
                .map_err(ReplayError::Remote)?;

            tx.header_committed = true;
            self.storage
                .update_pending(seq, tx)
                .map_err(ReplayError::Storage)?;
        }

        let line_rows = tx
            .lines
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ReplayError::Storage(e.into()))?;
        self.remote
            .request(
                entities::INVOICE_LINES,
                Operation::Add,
                RequestPayload::rows(line_rows),
            )
            .await
            .map_err(ReplayError::Remote)?;

        Ok(())
    }
}
