//! ActiveOrderStore - per-table cart state
//!
//! Owns the terminal's order working set: the selected table, the visible
//! cart, the table→order map, and a session overlay of table statuses.
//! Constructed once at terminal startup with its storage injected, so
//! tests get a fresh instance each.
//!
//! # Mutation Flow
//!
//! ```text
//! user action
//!     ├─ 1. Resolve product/table snapshot from the reference cache
//!     ├─ 2. Apply the mutation under the state lock
//!     ├─ 3. Mirror the visible cart into the order map
//!     └─ 4. Persist map + snapshot + selection before returning
//! ```
//!
//! The visible cart handed to callers is always a fresh copy, never a
//! shared reference, so mutating one table's cart cannot leak into
//! another's.
//!
//! Two add entry points coexist deliberately: `add_line` (tap-to-add)
//! increments an existing line by one, while `set_line_quantity` (the
//! quantity-control path) overwrites the quantity outright.

use crate::catalog::ReferenceCache;
use crate::storage::{StorageError, TerminalStorage};
use parking_lot::RwLock;
use shared::cart::CartLine;
use shared::models::{DiningTable, TableStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Order state errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("no table selected")]
    NoTableSelected,

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("cannot transfer out of the takeaway table")]
    TakeawaySource,

    #[error("destination table {0} already has an open order")]
    DestinationOccupied(String),

    #[error("table {0} has no order to transfer")]
    NothingToTransfer(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Default)]
struct StoreInner {
    selected: Option<String>,
    cart: Vec<CartLine>,
    orders: HashMap<String, Vec<CartLine>>,
    /// Session overlay over the cached table rows; statuses mutate with
    /// selection and settlement, not with catalog refreshes.
    statuses: HashMap<String, TableStatus>,
}

/// Per-table cart store with synchronous durable persistence
pub struct ActiveOrderStore {
    storage: TerminalStorage,
    catalog: ReferenceCache,
    inner: RwLock<StoreInner>,
}

impl ActiveOrderStore {
    /// Build the store, restoring selection and open orders from storage
    pub fn new(storage: TerminalStorage, catalog: ReferenceCache) -> Result<Self, StorageError> {
        let mut inner = StoreInner::default();

        for (table_id, lines) in storage.active_orders()? {
            inner.orders.insert(table_id, lines);
        }
        inner.selected = storage.selected_table()?;
        if let Some(selected) = &inner.selected {
            inner.cart = match inner.orders.get(selected) {
                Some(lines) => lines.clone(),
                None => storage.cart_snapshot(selected)?.unwrap_or_default(),
            };
        }

        Ok(Self {
            storage,
            catalog,
            inner: RwLock::new(inner),
        })
    }

    // ========== Table Selection ==========

    /// Select a table, stashing the current cart and loading the target's.
    ///
    /// Returns a fresh copy of the now-visible cart. Flips the table from
    /// Available to Occupied unless it is the takeaway table.
    pub fn select_table(&self, table_id: &str) -> Result<Vec<CartLine>, OrderError> {
        let table = self
            .catalog
            .lookup_table(table_id)
            .ok_or_else(|| OrderError::TableNotFound(table_id.to_string()))?;

        let mut inner = self.inner.write();

        if let Some(current) = inner.selected.clone() {
            if current != table_id && !inner.cart.is_empty() {
                let cart = inner.cart.clone();
                inner.orders.insert(current.clone(), cart.clone());
                self.storage.store_order(&current, &cart)?;
            }
        }

        inner.selected = Some(table_id.to_string());
        self.storage.set_selected_table(Some(table_id))?;

        let cart = inner.orders.get(table_id).cloned().unwrap_or_default();
        inner.cart = cart.clone();

        if !table.is_takeaway && status_in(&inner, &table) == TableStatus::Available {
            inner.statuses.insert(table_id.to_string(), TableStatus::Occupied);
        }

        tracing::debug!(table_id = %table_id, lines = cart.len(), "Table selected");
        Ok(cart)
    }

    /// Select the takeaway table when nothing was previously selected.
    ///
    /// Startup convenience; the takeaway table is exempt from status
    /// transitions, so this never flips anything.
    pub fn default_to_takeaway(&self) -> Result<bool, StorageError> {
        let mut inner = self.inner.write();
        if inner.selected.is_some() {
            return Ok(false);
        }
        let Some(table) = self.catalog.takeaway_table() else {
            return Ok(false);
        };

        inner.cart = inner.orders.get(&table.id).cloned().unwrap_or_default();
        inner.selected = Some(table.id.clone());
        self.storage.set_selected_table(Some(&table.id))?;
        tracing::debug!(table_id = %table.id, "Defaulted selection to takeaway table");
        Ok(true)
    }

    // ========== Cart Operations ==========

    /// Tap-to-add: increment an existing line by one, or append a new
    /// line with quantity 1 using the product's catalog snapshot.
    pub fn add_line(&self, product_id: &str) -> Result<(), OrderError> {
        let mut inner = self.inner.write();
        let selected = inner.selected.clone().ok_or(OrderError::NoTableSelected)?;
        let product = self
            .catalog
            .lookup_product(product_id)
            .ok_or_else(|| OrderError::ProductNotFound(product_id.to_string()))?;

        match inner.cart.iter().position(|l| l.product_id == product_id) {
            Some(i) => inner.cart[i].quantity += 1,
            None => inner
                .cart
                .push(CartLine::new(&product.id, &product.name, product.unit_price, 1)),
        }

        self.persist_cart(&mut inner, &selected)
    }

    /// Quantity-control path: set a line's quantity outright.
    ///
    /// Appends the line (with the catalog snapshot) when absent; a
    /// quantity of zero or below removes it.
    pub fn set_line_quantity(&self, product_id: &str, quantity: i32) -> Result<(), OrderError> {
        let mut inner = self.inner.write();
        let selected = inner.selected.clone().ok_or(OrderError::NoTableSelected)?;
        let product = self
            .catalog
            .lookup_product(product_id)
            .ok_or_else(|| OrderError::ProductNotFound(product_id.to_string()))?;

        if quantity <= 0 {
            inner.cart.retain(|l| l.product_id != product_id);
        } else {
            match inner.cart.iter().position(|l| l.product_id == product_id) {
                Some(i) => inner.cart[i].quantity = quantity,
                None => inner.cart.push(CartLine::new(
                    &product.id,
                    &product.name,
                    product.unit_price,
                    quantity,
                )),
            }
        }

        self.persist_cart(&mut inner, &selected)
    }

    /// Adjust a line's quantity by a signed delta; zero or below removes
    /// the line. Adjusting an absent line is a no-op.
    pub fn adjust_quantity(&self, product_id: &str, delta: i32) -> Result<(), OrderError> {
        let mut inner = self.inner.write();
        let selected = inner.selected.clone().ok_or(OrderError::NoTableSelected)?;

        let mut touched = false;
        for line in inner.cart.iter_mut() {
            if line.product_id == product_id {
                line.quantity += delta;
                touched = true;
            }
        }
        if !touched {
            return Ok(());
        }
        inner.cart.retain(|l| l.quantity > 0);

        self.persist_cart(&mut inner, &selected)
    }

    /// Remove a line from the visible cart
    pub fn remove_line(&self, product_id: &str) -> Result<(), OrderError> {
        let mut inner = self.inner.write();
        let selected = inner.selected.clone().ok_or(OrderError::NoTableSelected)?;

        inner.cart.retain(|l| l.product_id != product_id);
        self.persist_cart(&mut inner, &selected)
    }

    /// Empty the visible cart and drop the table's order entry
    pub fn clear_cart(&self) -> Result<(), OrderError> {
        let mut inner = self.inner.write();
        let selected = inner.selected.clone().ok_or(OrderError::NoTableSelected)?;

        inner.cart.clear();
        inner.orders.remove(&selected);
        self.storage.remove_order(&selected)?;
        Ok(())
    }

    // ========== Table Transfer ==========

    /// Move a table's entire order to an empty destination table.
    ///
    /// The source must not be the takeaway table and the destination must
    /// have an empty or absent order. The source becomes Available, the
    /// destination Occupied, and the destination becomes the selection.
    pub fn transfer_table(&self, from_id: &str, to_id: &str) -> Result<(), OrderError> {
        let from = self
            .catalog
            .lookup_table(from_id)
            .ok_or_else(|| OrderError::TableNotFound(from_id.to_string()))?;
        let to = self
            .catalog
            .lookup_table(to_id)
            .ok_or_else(|| OrderError::TableNotFound(to_id.to_string()))?;

        if from.is_takeaway {
            return Err(OrderError::TakeawaySource);
        }

        let mut inner = self.inner.write();

        if inner.orders.get(to_id).is_some_and(|c| !c.is_empty()) {
            return Err(OrderError::DestinationOccupied(to_id.to_string()));
        }

        let cart = if inner.selected.as_deref() == Some(from_id) {
            inner.cart.clone()
        } else {
            inner.orders.get(from_id).cloned().unwrap_or_default()
        };
        if cart.is_empty() {
            return Err(OrderError::NothingToTransfer(from_id.to_string()));
        }

        inner.orders.remove(from_id);
        inner.orders.insert(to_id.to_string(), cart.clone());
        inner.statuses.insert(from_id.to_string(), TableStatus::Available);
        if !to.is_takeaway {
            inner.statuses.insert(to_id.to_string(), TableStatus::Occupied);
        }
        inner.selected = Some(to_id.to_string());
        inner.cart = cart.clone();

        self.storage.move_order(from_id, to_id, &cart)?;

        tracing::info!(from = %from_id, to = %to_id, lines = cart.len(), "Order transferred");
        Ok(())
    }

    // ========== Settlement Hook ==========

    /// Clear a settled table's order and reset its status.
    ///
    /// The selection and visible cart are only cleared if the settled
    /// table is still the selected one; the cashier may have switched
    /// tables while the settlement commit was in flight.
    pub fn finalize_settlement(&self, table_id: &str) -> Result<(), OrderError> {
        let table = self.catalog.lookup_table(table_id);

        let mut inner = self.inner.write();
        inner.orders.remove(table_id);

        let takeaway = table.map(|t| t.is_takeaway).unwrap_or(false);
        if !takeaway {
            inner.statuses.insert(table_id.to_string(), TableStatus::Available);
        }

        if inner.selected.as_deref() == Some(table_id) {
            inner.selected = None;
            inner.cart.clear();
            self.storage.set_selected_table(None)?;
        }

        self.storage.remove_order(table_id)?;
        Ok(())
    }

    // ========== Accessors ==========

    pub fn selected_table(&self) -> Option<String> {
        self.inner.read().selected.clone()
    }

    /// Fresh copy of the visible cart
    pub fn visible_cart(&self) -> Vec<CartLine> {
        self.inner.read().cart.clone()
    }

    /// Fresh copy of a table's stored order, if any
    pub fn order_for(&self, table_id: &str) -> Option<Vec<CartLine>> {
        self.inner.read().orders.get(table_id).cloned()
    }

    pub fn has_order(&self, table_id: &str) -> bool {
        self.inner
            .read()
            .orders
            .get(table_id)
            .is_some_and(|c| !c.is_empty())
    }

    /// A table's effective status: the session overlay when present,
    /// otherwise the cached catalog row.
    pub fn table_status(&self, table_id: &str) -> Option<TableStatus> {
        if let Some(status) = self.inner.read().statuses.get(table_id) {
            return Some(*status);
        }
        self.catalog.lookup_table(table_id).map(|t| t.status)
    }

    fn persist_cart(&self, inner: &mut StoreInner, table_id: &str) -> Result<(), OrderError> {
        let cart = inner.cart.clone();
        inner.orders.insert(table_id.to_string(), cart.clone());
        self.storage.store_order(table_id, &cart)?;
        Ok(())
    }
}

fn status_in(inner: &StoreInner, table: &DiningTable) -> TableStatus {
    inner
        .statuses
        .get(&table.id)
        .copied()
        .unwrap_or(table.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DEFAULT_CACHE_TTL_MS;
    use crate::connectivity::{ConnectionStatus, ConnectivityMonitor};
    use crate::remote::entities;
    use crate::remote::testing::MockRemoteStore;
    use crate::storage::CacheRecord;
    use serde_json::json;
    use std::sync::Arc;

    fn seed_catalog(storage: &TerminalStorage) {
        storage
            .store_cache_record(
                entities::PRODUCTS,
                &CacheRecord {
                    rows: vec![
                        json!({"id": "P1", "name": "Iced Coffee", "unit_price": 25000.0}),
                        json!({"id": "P2", "name": "Green Tea", "unit_price": 18000.0}),
                    ],
                    fetched_at: shared::util::now_millis(),
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
                        json!({"id": "TA", "name": "Takeaway", "capacity": 0, "status": "available", "is_takeaway": true}),
                    ],
                    fetched_at: shared::util::now_millis(),
                },
            )
            .unwrap();
    }

    fn build_store() -> (ActiveOrderStore, TerminalStorage, ReferenceCache) {
        let storage = TerminalStorage::open_in_memory().unwrap();
        seed_catalog(&storage);
        let monitor = ConnectivityMonitor::new(ConnectionStatus::Online);
        let catalog = ReferenceCache::new(
            storage.clone(),
            Arc::new(MockRemoteStore::new()),
            monitor,
            DEFAULT_CACHE_TTL_MS,
        )
        .unwrap();
        let store = ActiveOrderStore::new(storage.clone(), catalog.clone()).unwrap();
        (store, storage, catalog)
    }

    #[test]
    fn test_add_requires_selection() {
        let (store, _, _) = build_store();
        let result = store.add_line("P1");
        assert!(matches!(result, Err(OrderError::NoTableSelected)));
        assert!(store.visible_cart().is_empty());
    }

    #[test]
    fn test_tap_to_add_twice_merges_into_one_line() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();

        store.add_line("P1").unwrap();
        store.add_line("P1").unwrap();

        let cart = store.visible_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 2);
        assert_eq!(cart[0].unit_price, 25000.0);
    }

    #[test]
    fn test_set_quantity_overwrites_instead_of_incrementing() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();

        store.add_line("P1").unwrap();
        store.set_line_quantity("P1", 5).unwrap();
        store.set_line_quantity("P1", 3).unwrap();

        let cart = store.visible_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 3);
    }

    #[test]
    fn test_adjust_to_zero_removes_the_line() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        store.add_line("P1").unwrap();
        store.add_line("P2").unwrap();

        store.adjust_quantity("P1", -2).unwrap();

        let cart = store.visible_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].product_id, "P2");
    }

    #[test]
    fn test_adjust_absent_line_is_noop() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();

        store.adjust_quantity("P9", 1).unwrap();
        assert_eq!(store.visible_cart().len(), 1);
    }

    #[test]
    fn test_select_round_trip_returns_identical_cart() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        store.add_line("P2").unwrap();
        let before = store.visible_cart();

        store.select_table("B002").unwrap();
        assert!(store.visible_cart().is_empty());

        let after = store.select_table("B001").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_carts_do_not_leak_between_tables() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();

        store.select_table("B002").unwrap();
        store.set_line_quantity("P1", 5).unwrap();

        let b001 = store.order_for("B001").unwrap();
        assert_eq!(b001.len(), 1);
        assert_eq!(b001[0].quantity, 1);
    }

    #[test]
    fn test_select_flips_status_except_takeaway() {
        let (store, _, _) = build_store();

        store.select_table("B001").unwrap();
        assert_eq!(store.table_status("B001"), Some(TableStatus::Occupied));

        store.select_table("TA").unwrap();
        assert_eq!(store.table_status("TA"), Some(TableStatus::Available));
    }

    #[test]
    fn test_unknown_table_and_product_are_rejected() {
        let (store, _, _) = build_store();
        assert!(matches!(
            store.select_table("B999"),
            Err(OrderError::TableNotFound(_))
        ));

        store.select_table("B001").unwrap();
        assert!(matches!(
            store.add_line("P999"),
            Err(OrderError::ProductNotFound(_))
        ));
    }

    #[test]
    fn test_clear_cart_drops_order_entry() {
        let (store, storage, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        assert!(store.has_order("B001"));

        store.clear_cart().unwrap();
        assert!(!store.has_order("B001"));
        assert!(storage.active_orders().unwrap().is_empty());
    }

    #[test]
    fn test_transfer_moves_cart_and_statuses_and_selection() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        store.add_line("P2").unwrap();
        let cart = store.visible_cart();

        store.transfer_table("B001", "B002").unwrap();

        assert_eq!(store.selected_table(), Some("B002".to_string()));
        assert_eq!(store.visible_cart(), cart);
        assert!(store.order_for("B001").is_none());
        assert_eq!(store.table_status("B001"), Some(TableStatus::Available));
        assert_eq!(store.table_status("B002"), Some(TableStatus::Occupied));
    }

    #[test]
    fn test_transfer_guards() {
        let (store, _, _) = build_store();

        // Takeaway source is never transferable
        store.select_table("TA").unwrap();
        store.add_line("P1").unwrap();
        assert!(matches!(
            store.transfer_table("TA", "B001"),
            Err(OrderError::TakeawaySource)
        ));

        // Occupied destination is rejected
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        store.select_table("B002").unwrap();
        store.add_line("P2").unwrap();
        assert!(matches!(
            store.transfer_table("B002", "B001"),
            Err(OrderError::DestinationOccupied(_))
        ));

        // Nothing to move is rejected
        store.clear_cart().unwrap();
        store.select_table("B001").unwrap();
        store.clear_cart().unwrap();
        assert!(matches!(
            store.transfer_table("B001", "B002"),
            Err(OrderError::NothingToTransfer(_))
        ));
    }

    #[test]
    fn test_finalize_settlement_resets_table() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();

        store.finalize_settlement("B001").unwrap();

        assert_eq!(store.selected_table(), None);
        assert!(store.visible_cart().is_empty());
        assert!(store.order_for("B001").is_none());
        assert_eq!(store.table_status("B001"), Some(TableStatus::Available));
    }

    #[test]
    fn test_finalize_keeps_selection_when_it_moved() {
        let (store, _, _) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        store.select_table("B002").unwrap();
        store.add_line("P2").unwrap();

        // Settlement of B001 resolves after the cashier moved to B002
        store.finalize_settlement("B001").unwrap();

        assert_eq!(store.selected_table(), Some("B002".to_string()));
        assert_eq!(store.visible_cart().len(), 1);
    }

    #[test]
    fn test_state_survives_restart() {
        let (store, storage, catalog) = build_store();
        store.select_table("B001").unwrap();
        store.add_line("P1").unwrap();
        store.add_line("P1").unwrap();
        drop(store);

        let revived = ActiveOrderStore::new(storage, catalog).unwrap();
        assert_eq!(revived.selected_table(), Some("B001".to_string()));
        let cart = revived.visible_cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 2);
    }

    #[test]
    fn test_default_to_takeaway() {
        let (store, _, _) = build_store();
        assert!(store.default_to_takeaway().unwrap());
        assert_eq!(store.selected_table(), Some("TA".to_string()));

        // Does not override an existing selection
        store.select_table("B001").unwrap();
        assert!(!store.default_to_takeaway().unwrap());
        assert_eq!(store.selected_table(), Some("B001".to_string()));
    }
}
