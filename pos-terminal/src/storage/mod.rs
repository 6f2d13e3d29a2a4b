//! redb-based durable terminal state
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `active_orders` | `table_id` | `Vec<CartLine>` | Per-table open order map |
//! | `cart_snapshots` | `table_id` | `Vec<CartLine>` | Last persisted cart per table |
//! | `pending_transactions` | `sequence` | `PendingTransaction` | Offline settlement log |
//! | `reference_cache` | `entity` | `CacheRecord` | Cached remote reference data |
//! | `meta` | `"selected_table"` | `table_id` | Current table selection |
//! | `sequence_counter` | `"pending_seq"` | `u64` | Pending-transaction ordering |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`, so every mutating operation
//! is persistent as soon as it returns. A terminal crash loses at most the
//! in-flight UI render, never committed cart or queue state.
//!
//! Pending transactions are keyed by a monotonic sequence number, so a
//! plain table iteration yields them in enqueue order. The reconciliation
//! loop depends on this for its strict-ordering guarantee.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use shared::cart::CartLine;
use shared::models::{Invoice, InvoiceLine};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Per-table open orders: key = table_id, value = JSON-serialized Vec<CartLine>
const ACTIVE_ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("active_orders");

/// Last persisted cart per table: key = table_id, value = JSON-serialized Vec<CartLine>
const CART_SNAPSHOTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cart_snapshots");

/// Offline settlement log: key = enqueue sequence, value = JSON-serialized PendingTransaction
const PENDING_TX_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("pending_transactions");

/// Reference data cache: key = entity name, value = JSON-serialized CacheRecord
const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("reference_cache");

/// Small key-value items: currently only the selected table id
const META_TABLE: TableDefinition<&str, &str> = TableDefinition::new("meta");

/// Counters: key = counter name, value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const SELECTED_TABLE_KEY: &str = "selected_table";
const PENDING_SEQ_KEY: &str = "pending_seq";

/// One settlement waiting for (or retained after) remote reconciliation.
///
/// `header_committed` tracks the two-call commit separately: once the
/// invoice header has been accepted, a replay only resends the lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub enqueued_at: i64,
    pub processed: bool,
    #[serde(default)]
    pub header_committed: bool,
}

/// Cached remote rows for one entity type plus their fetch time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub rows: Vec<serde_json::Value>,
    pub fetched_at: i64,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pending transaction not found: sequence={0}")]
    PendingNotFound(u64),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Terminal state storage backed by redb
#[derive(Clone)]
pub struct TerminalStorage {
    db: Arc<Database>,
}

impl TerminalStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables so later read transactions never miss one
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            let _ = write_txn.open_table(CART_SNAPSHOTS_TABLE)?;
            let _ = write_txn.open_table(PENDING_TX_TABLE)?;
            let _ = write_txn.open_table(CACHE_TABLE)?;
            let _ = write_txn.open_table(META_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(PENDING_SEQ_KEY)?.is_none() {
                seq_table.insert(PENDING_SEQ_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Table Selection ==========

    /// Get the persisted selected table id
    pub fn selected_table(&self) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;
        Ok(table
            .get(SELECTED_TABLE_KEY)?
            .map(|guard| guard.value().to_string()))
    }

    /// Persist (or clear) the selected table id
    pub fn set_selected_table(&self, table_id: Option<&str>) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            match table_id {
                Some(id) => {
                    table.insert(SELECTED_TABLE_KEY, id)?;
                }
                None => {
                    table.remove(SELECTED_TABLE_KEY)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // ========== Active Orders ==========

    /// Load all open orders as (table_id, lines) pairs
    pub fn active_orders(&self) -> StorageResult<Vec<(String, Vec<CartLine>)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACTIVE_ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            let lines: Vec<CartLine> = serde_json::from_slice(value.value())?;
            orders.push((key.value().to_string(), lines));
        }
        Ok(orders)
    }

    /// Persist one table's order and its cart snapshot in a single commit
    pub fn store_order(&self, table_id: &str, lines: &[CartLine]) -> StorageResult<()> {
        let value = serde_json::to_vec(lines)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut orders = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            orders.insert(table_id, value.as_slice())?;
            let mut snapshots = write_txn.open_table(CART_SNAPSHOTS_TABLE)?;
            snapshots.insert(table_id, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove one table's order and cart snapshot
    pub fn remove_order(&self, table_id: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut orders = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            orders.remove(table_id)?;
            let mut snapshots = write_txn.open_table(CART_SNAPSHOTS_TABLE)?;
            snapshots.remove(table_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Move an order between tables and re-select the destination, atomically
    pub fn move_order(&self, from: &str, to: &str, lines: &[CartLine]) -> StorageResult<()> {
        let value = serde_json::to_vec(lines)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut orders = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            orders.remove(from)?;
            orders.insert(to, value.as_slice())?;
            let mut snapshots = write_txn.open_table(CART_SNAPSHOTS_TABLE)?;
            snapshots.remove(from)?;
            snapshots.insert(to, value.as_slice())?;
            let mut meta = write_txn.open_table(META_TABLE)?;
            meta.insert(SELECTED_TABLE_KEY, to)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the last persisted cart for a table
    pub fn cart_snapshot(&self, table_id: &str) -> StorageResult<Option<Vec<CartLine>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CART_SNAPSHOTS_TABLE)?;
        match table.get(table_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    // ========== Pending Transactions ==========

    /// Append a transaction to the log, returning its sequence number
    pub fn append_pending(&self, tx: &PendingTransaction) -> StorageResult<u64> {
        let value = serde_json::to_vec(tx)?;
        let write_txn = self.db.begin_write()?;
        let seq = {
            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            let next = seq_table
                .get(PENDING_SEQ_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            seq_table.insert(PENDING_SEQ_KEY, next)?;

            let mut pending = write_txn.open_table(PENDING_TX_TABLE)?;
            pending.insert(next, value.as_slice())?;
            next
        };
        write_txn.commit()?;
        Ok(seq)
    }

    /// Overwrite a logged transaction (processed / header_committed updates)
    pub fn update_pending(&self, seq: u64, tx: &PendingTransaction) -> StorageResult<()> {
        let value = serde_json::to_vec(tx)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut pending = write_txn.open_table(PENDING_TX_TABLE)?;
            if pending.get(seq)?.is_none() {
                return Err(StorageError::PendingNotFound(seq));
            }
            pending.insert(seq, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All logged transactions in enqueue order
    pub fn pending_transactions(&self) -> StorageResult<Vec<(u64, PendingTransaction)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TX_TABLE)?;

        let mut transactions = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            let tx: PendingTransaction = serde_json::from_slice(value.value())?;
            transactions.push((key.value(), tx));
        }
        Ok(transactions)
    }

    /// Count of transactions not yet confirmed by the remote store
    pub fn unprocessed_count(&self) -> StorageResult<usize> {
        Ok(self
            .pending_transactions()?
            .iter()
            .filter(|(_, tx)| !tx.processed)
            .count())
    }

    /// Purge processed transactions enqueued before the cutoff.
    ///
    /// Unprocessed transactions are never purged regardless of age.
    pub fn purge_processed_before(&self, cutoff_millis: i64) -> StorageResult<usize> {
        let expired: Vec<u64> = self
            .pending_transactions()?
            .into_iter()
            .filter(|(_, tx)| tx.processed && tx.enqueued_at < cutoff_millis)
            .map(|(seq, _)| seq)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut pending = write_txn.open_table(PENDING_TX_TABLE)?;
            for seq in &expired {
                pending.remove(*seq)?;
            }
        }
        write_txn.commit()?;
        Ok(expired.len())
    }

    // ========== Reference Cache ==========

    /// Load the cache record for an entity type
    pub fn cache_record(&self, entity: &str) -> StorageResult<Option<CacheRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CACHE_TABLE)?;
        match table.get(entity)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Persist the cache record for an entity type
    pub fn store_cache_record(&self, entity: &str, record: &CacheRecord) -> StorageResult<()> {
        let value = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CACHE_TABLE)?;
            table.insert(entity, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All persisted cache records (startup preload)
    pub fn cache_records(&self) -> StorageResult<Vec<(String, CacheRecord)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CACHE_TABLE)?;

        let mut records = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            let record: CacheRecord = serde_json::from_slice(value.value())?;
            records.push((key.value().to_string(), record));
        }
        Ok(records)
    }
}
