//! Settlement workflow
//!
//! Finalizes the selected table's cart into an immutable invoice. Each
//! checkout attempt walks `Validating → Committing → Finalizing →
//! Settled`, or stops at `Rejected` during validation.
//!
//! Committing never surfaces a network failure to the cashier: by the
//! time a sale is committed the customer has already paid, so any remote
//! failure (including the lines call failing after the header was
//! accepted) falls back to the offline transaction queue under the same
//! invoice id. Finalizing always runs, whether the commit was direct or
//! queued.
//!
//! Receipt rendering is the caller's concern; the returned
//! [`SettlementOutcome`] carries everything a printer needs, and a
//! printing failure must not roll settlement back.

pub mod money;

use crate::connectivity::ConnectivityMonitor;
use crate::orders::{ActiveOrderStore, OrderError};
use crate::queue::OfflineQueue;
use crate::remote::{entities, Operation, RemoteStore, RequestPayload};
use crate::storage::StorageError;
use shared::cart::CartLine;
use shared::models::{Invoice, InvoiceLine, InvoiceStatus};
use shared::util::now_millis;
use std::sync::Arc;
use thiserror::Error;

pub use money::CartTotals;

/// Customer label when none is given
pub const WALK_IN_CUSTOMER: &str = "Walk-in";

/// Checkout attempt phases, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPhase {
    Validating,
    Committing,
    Finalizing,
    Settled,
    Rejected,
}

/// How the invoice reached (or will reach) the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPath {
    /// Committed to the remote store during settlement
    Direct,
    /// Enqueued for reconciliation on the next reconnect
    Queued,
}

/// Cashier input for one checkout attempt
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub employee: String,
    pub customer: Option<String>,
    pub discount: f64,
    pub amount_paid: f64,
    pub note: Option<String>,
}

/// Result of a settled sale, handed to the receipt printer by the caller
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub path: CommitPath,
}

/// Settlement errors; every variant except the pass-throughs is a
/// user-input rejection with no state mutated.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("no table selected")]
    NoTableSelected,

    #[error("employee identity is required")]
    MissingEmployee,

    #[error("discount must be a non-negative amount")]
    InvalidDiscount,

    #[error("payment amount must be positive")]
    InvalidPayment,

    #[error("insufficient payment: {due} due, {paid} tendered")]
    InsufficientPayment { due: f64, paid: f64 },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invoice serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validates and finalizes sales against the active order store
pub struct SettlementWorkflow {
    store: Arc<ActiveOrderStore>,
    queue: OfflineQueue,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
}

impl SettlementWorkflow {
    pub fn new(
        store: Arc<ActiveOrderStore>,
        queue: OfflineQueue,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            queue,
            remote,
            monitor,
        }
    }

    /// Settle the currently visible cart.
    ///
    /// The cart and selection are read at call time; finalization then
    /// re-checks the selection at resume time, since the cashier may have
    /// switched tables while the commit was in flight.
    pub async fn settle(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementOutcome, SettlementError> {
        let (table_id, cart, totals, due) = match self.validate(&request) {
            Ok(validated) => validated,
            Err(e) => {
                tracing::debug!(phase = ?SettlementPhase::Rejected, error = %e, "Settlement rejected");
                return Err(e);
            }
        };

        let invoice_id = format!("INV-{}", uuid::Uuid::new_v4());
        let invoice = Invoice {
            invoice_id: invoice_id.clone(),
            table_id: table_id.clone(),
            issued_at: now_millis(),
            employee: request.employee.trim().to_string(),
            customer: request
                .customer
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(WALK_IN_CUSTOMER)
                .to_string(),
            subtotal: totals.subtotal,
            vat: totals.vat,
            discount: request.discount,
            amount_paid: request.amount_paid,
            change: money::change_due(request.amount_paid, due),
            note: request.note.unwrap_or_default(),
            status: InvoiceStatus::Settled,
        };
        let lines: Vec<InvoiceLine> = cart
            .iter()
            .map(|line| InvoiceLine::new(&invoice_id, &line.product_id, line.quantity))
            .collect();

        tracing::debug!(
            phase = ?SettlementPhase::Committing,
            invoice_id = %invoice_id,
            table_id = %table_id,
            "Committing settlement"
        );
        let path = self.commit(&invoice, &lines).await?;

        tracing::debug!(phase = ?SettlementPhase::Finalizing, table_id = %table_id, "Finalizing settlement");
        self.store.finalize_settlement(&table_id)?;

        tracing::info!(
            phase = ?SettlementPhase::Settled,
            invoice_id = %invoice_id,
            table_id = %table_id,
            total = due,
            path = ?path,
            "Sale settled"
        );
        Ok(SettlementOutcome {
            invoice,
            lines,
            path,
        })
    }

    /// Validation order, first failure wins: cart non-empty → table
    /// selected → employee present → discount valid → payment valid →
    /// amount due covered by payment.
    fn validate(
        &self,
        request: &SettlementRequest,
    ) -> Result<(String, Vec<CartLine>, CartTotals, f64), SettlementError> {
        tracing::debug!(phase = ?SettlementPhase::Validating, "Validating settlement");

        let cart = self.store.visible_cart();
        if cart.is_empty() {
            return Err(SettlementError::EmptyCart);
        }
        let table_id = self
            .store
            .selected_table()
            .ok_or(SettlementError::NoTableSelected)?;
        if request.employee.trim().is_empty() {
            return Err(SettlementError::MissingEmployee);
        }
        if !request.discount.is_finite() || request.discount < 0.0 {
            return Err(SettlementError::InvalidDiscount);
        }
        if !request.amount_paid.is_finite() || request.amount_paid <= 0.0 {
            return Err(SettlementError::InvalidPayment);
        }

        let totals = money::compute_totals(&cart);
        let due = money::final_amount(&totals, request.discount);
        if !money::covers(request.amount_paid, due) {
            return Err(SettlementError::InsufficientPayment {
                due,
                paid: request.amount_paid,
            });
        }

        Ok((table_id, cart, totals, due))
    }

    /// Two-call direct commit when online, offline queue otherwise.
    ///
    /// A failure after the header was accepted enqueues with
    /// `header_committed` set, so the replay only resends the lines.
    async fn commit(
        &self,
        invoice: &Invoice,
        lines: &[InvoiceLine],
    ) -> Result<CommitPath, SettlementError> {
        if !self.monitor.is_online() {
            self.queue.enqueue(invoice.clone(), lines.to_vec(), false)?;
            return Ok(CommitPath::Queued);
        }

        let header_rows = vec![serde_json::to_value(invoice)?];
        let line_rows = lines
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = self
            .remote
            .request(entities::INVOICES, Operation::Add, RequestPayload::rows(header_rows))
            .await
        {
            tracing::warn!(
                invoice_id = %invoice.invoice_id,
                error = %e,
                "Direct commit failed, queueing settlement"
            );
            self.queue.enqueue(invoice.clone(), lines.to_vec(), false)?;
            return Ok(CommitPath::Queued);
        }

        if let Err(e) = self
            .remote
            .request(
                entities::INVOICE_LINES,
                Operation::Add,
                RequestPayload::rows(line_rows),
            )
            .await
        {
            tracing::warn!(
                invoice_id = %invoice.invoice_id,
                error = %e,
                "Lines commit failed after header was accepted, queueing remainder"
            );
            self.queue.enqueue(invoice.clone(), lines.to_vec(), true)?;
            return Ok(CommitPath::Queued);
        }

        Ok(CommitPath::Direct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ReferenceCache, DEFAULT_CACHE_TTL_MS};
    use crate::connectivity::ConnectionStatus;
    use crate::queue::DEFAULT_RETENTION_MS;
    use crate::remote::testing::MockRemoteStore;
    use crate::storage::{CacheRecord, TerminalStorage};
    use serde_json::json;
    use shared::models::TableStatus;

    struct Fixture {
        store: Arc<ActiveOrderStore>,
        workflow: SettlementWorkflow,
        queue: OfflineQueue,
        remote: Arc<MockRemoteStore>,
    }

    fn build_fixture(initial: ConnectionStatus) -> Fixture {
        let storage = TerminalStorage::open_in_memory().unwrap();
        storage
            .store_cache_record(
                entities::PRODUCTS,
                &CacheRecord {
                    rows: vec![
                        json!({"id": "P1", "name": "Iced Coffee", "unit_price": 25000.0}),
                        json!({"id": "P2", "name": "Green Tea", "unit_price": 18000.0}),
                    ],
                    fetched_at: now_millis(),
                },
            )
            .unwrap();
        storage
            .store_cache_record(
                entities::DINING_TABLES,
                &CacheRecord {
                    rows: vec![
                        json!({"id": "B001", "name": "Table 1", "capacity": 4, "status": "available", "is_takeaway": false}),
                        json!({"id": "B002", "name": "Table 2", "capacity": 2, "status": "available", "is_takeaway": false}),
                    ],
                    fetched_at: now_millis(),
                },
            )
            .unwrap();

        let monitor = ConnectivityMonitor::new(initial);
        let remote = Arc::new(MockRemoteStore::new());
        let catalog = ReferenceCache::new(
            storage.clone(),
            remote.clone(),
            monitor.clone(),
            DEFAULT_CACHE_TTL_MS,
        )
        .unwrap();
        let store = Arc::new(ActiveOrderStore::new(storage.clone(), catalog).unwrap());
        let queue = OfflineQueue::new(
            storage,
            remote.clone(),
            monitor.clone(),
            DEFAULT_RETENTION_MS,
        );
        let workflow = SettlementWorkflow::new(
            store.clone(),
            queue.clone(),
            remote.clone(),
            monitor.clone(),
        );

        Fixture {
            store,
            workflow,
            queue,
            remote,
        }
    }

    fn request(paid: f64) -> SettlementRequest {
        SettlementRequest {
            employee: "Lan".to_string(),
            customer: None,
            discount: 0.0,
            amount_paid: paid,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_validation_order_first_failure_wins() {
        let fx = build_fixture(ConnectionStatus::Online);

        // Empty cart comes before anything else
        let result = fx.workflow.settle(request(100000.0)).await;
        assert!(matches!(result, Err(SettlementError::EmptyCart)));

        fx.store.select_table("B001").unwrap();
        fx.store.add_line("P1").unwrap();

        let mut req = request(100000.0);
        req.employee = "  ".to_string();
        assert!(matches!(
            fx.workflow.settle(req).await,
            Err(SettlementError::MissingEmployee)
        ));

        let mut req = request(100000.0);
        req.discount = -1.0;
        assert!(matches!(
            fx.workflow.settle(req).await,
            Err(SettlementError::InvalidDiscount)
        ));

        let req = request(0.0);
        assert!(matches!(
            fx.workflow.settle(req).await,
            Err(SettlementError::InvalidPayment)
        ));

        // 25000 + 2500 VAT = 27500 due
        let req = request(27000.0);
        assert!(matches!(
            fx.workflow.settle(req).await,
            Err(SettlementError::InsufficientPayment { .. })
        ));

        // Rejections must not have mutated any state
        assert_eq!(fx.store.visible_cart().len(), 1);
        assert_eq!(fx.store.selected_table(), Some("B001".to_string()));
        assert_eq!(fx.queue.unprocessed_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_settlement_commits_directly() {
        let fx = build_fixture(ConnectionStatus::Online);
        fx.store.select_table("B001").unwrap();
        fx.store.add_line("P1").unwrap();

        let outcome = fx.workflow.settle(request(30000.0)).await.unwrap();

        assert_eq!(outcome.path, CommitPath::Direct);
        assert_eq!(outcome.invoice.subtotal, 25000.0);
        assert_eq!(outcome.invoice.vat, 2500.0);
        assert_eq!(outcome.invoice.change, 2500.0);
        assert_eq!(outcome.invoice.customer, WALK_IN_CUSTOMER);
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].quantity, 1);

        // Header then lines, one call each
        assert_eq!(fx.remote.call_count(entities::INVOICES, Operation::Add), 1);
        assert_eq!(
            fx.remote.call_count(entities::INVOICE_LINES, Operation::Add),
            1
        );
        assert_eq!(fx.queue.unprocessed_count().unwrap(), 0);

        // Finalized: table reset, selection cleared
        assert_eq!(fx.store.selected_table(), None);
        assert!(fx.store.visible_cart().is_empty());
        assert!(fx.store.order_for("B001").is_none());
        assert_eq!(fx.store.table_status("B001"), Some(TableStatus::Available));
    }

    #[tokio::test]
    async fn test_offline_settlement_enqueues_without_error() {
        let fx = build_fixture(ConnectionStatus::Offline);
        fx.store.select_table("B001").unwrap();
        fx.store.add_line("P1").unwrap();

        let outcome = fx.workflow.settle(request(27500.0)).await.unwrap();

        assert_eq!(outcome.path, CommitPath::Queued);
        assert!(fx.remote.calls().is_empty());
        assert_eq!(fx.queue.unprocessed_count().unwrap(), 1);

        // Finalizing runs for queued settlements too
        assert_eq!(fx.store.selected_table(), None);
        assert!(fx.store.order_for("B001").is_none());
        assert_eq!(fx.store.table_status("B001"), Some(TableStatus::Available));
    }

    #[tokio::test]
    async fn test_header_failure_falls_back_to_queue() {
        let fx = build_fixture(ConnectionStatus::Online);
        fx.store.select_table("B001").unwrap();
        fx.store.add_line("P1").unwrap();
        fx.remote.fail_entity(entities::INVOICES);

        let outcome = fx.workflow.settle(request(30000.0)).await.unwrap();

        assert_eq!(outcome.path, CommitPath::Queued);
        let pending = fx.queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].1.processed);
        assert!(!pending[0].1.header_committed);
    }

    #[tokio::test]
    async fn test_lines_failure_after_header_queues_with_substate() {
        let fx = build_fixture(ConnectionStatus::Online);
        fx.store.select_table("B001").unwrap();
        fx.store.add_line("P1").unwrap();
        fx.remote.fail_entity(entities::INVOICE_LINES);

        let outcome = fx.workflow.settle(request(30000.0)).await.unwrap();

        assert_eq!(outcome.path, CommitPath::Queued);
        let pending = fx.queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].1.header_committed);
        assert!(!pending[0].1.processed);
    }

    #[tokio::test]
    async fn test_settlement_finalizes_original_table_after_selection_moved() {
        let fx = build_fixture(ConnectionStatus::Offline);
        fx.store.select_table("B001").unwrap();
        fx.store.add_line("P1").unwrap();

        let outcome = fx.workflow.settle(request(27500.0)).await.unwrap();
        assert_eq!(outcome.invoice.table_id, "B001");

        // Cashier keeps working on another table afterwards
        fx.store.select_table("B002").unwrap();
        fx.store.add_line("P2").unwrap();
        assert_eq!(fx.store.selected_table(), Some("B002".to_string()));
        assert_eq!(fx.store.visible_cart().len(), 1);
    }
}
