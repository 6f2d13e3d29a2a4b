//! Reference-data cache for products and dining tables
//!
//! Read-through cache over the remote store with a one-hour TTL. Reads
//! return whatever is cached together with a `stale` flag; a refresh is
//! attempted only when the monitor reports online and the record is
//! missing or expired. When offline, stale data is strictly better than
//! none, so expired records keep being served. The remote store is the
//! only writer of reference data from the engine's perspective.
//!
//! Records are mirrored in memory and persisted through
//! [`TerminalStorage`], so a terminal restarted offline still has its
//! last known catalog.

use crate::connectivity::ConnectivityMonitor;
use crate::remote::{entities, Operation, RemoteError, RemoteStore, RequestPayload};
use crate::storage::{CacheRecord, StorageError, TerminalStorage};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::models::{DiningTable, Product};
use shared::util::now_millis;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Default time-to-live for cached reference data (1 hour)
pub const DEFAULT_CACHE_TTL_MS: i64 = 60 * 60 * 1000;

/// Cached rows plus whether they are past their TTL
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub rows: Vec<T>,
    pub stale: bool,
}

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Refresh failed and no previous record exists to fall back on.
    /// The one cache condition surfaced to the user as a blocking error.
    #[error("no cached {entity} data available: {reason}")]
    Unavailable { entity: String, reason: String },

    #[error("refresh failed for {entity}: {source}")]
    Refresh {
        entity: String,
        source: RemoteError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("malformed cached row for {entity}: {source}")]
    Decode {
        entity: String,
        source: serde_json::Error,
    },
}

/// TTL-bounded read-through cache of remote reference data
#[derive(Clone)]
pub struct ReferenceCache {
    storage: TerminalStorage,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    ttl_ms: i64,
    records: Arc<RwLock<HashMap<String, CacheRecord>>>,
}

impl ReferenceCache {
    /// Build the cache, preloading the in-memory mirror from storage
    pub fn new(
        storage: TerminalStorage,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
        ttl_ms: i64,
    ) -> Result<Self, StorageError> {
        let mut records = HashMap::new();
        for (entity, record) in storage.cache_records()? {
            records.insert(entity, record);
        }
        Ok(Self {
            storage,
            remote,
            monitor,
            ttl_ms,
            records: Arc::new(RwLock::new(records)),
        })
    }

    /// Get cached rows for an entity, refreshing when due and online.
    ///
    /// A failed refresh over an existing record is absorbed: the stale
    /// rows are served and the failure is logged. A failed refresh with
    /// nothing cached surfaces as [`CacheError::Unavailable`].
    pub async fn get(&self, entity: &str) -> Result<CachedData<Value>, CacheError> {
        let record = self.records.read().get(entity).cloned();

        if let Some(record) = &record {
            if now_millis() - record.fetched_at < self.ttl_ms {
                return Ok(CachedData {
                    rows: record.rows.clone(),
                    stale: false,
                });
            }
        }

        if !self.monitor.is_online() {
            return match record {
                Some(record) => Ok(CachedData {
                    rows: record.rows,
                    stale: true,
                }),
                None => Err(CacheError::Unavailable {
                    entity: entity.to_string(),
                    reason: "offline and nothing cached".to_string(),
                }),
            };
        }

        match self.refresh(entity).await {
            Ok(rows) => Ok(CachedData { rows, stale: false }),
            Err(CacheError::Refresh { entity, source }) => match record {
                Some(record) => {
                    tracing::warn!(
                        entity = %entity,
                        error = %source,
                        "Refresh failed, serving stale reference data"
                    );
                    Ok(CachedData {
                        rows: record.rows,
                        stale: true,
                    })
                }
                None => Err(CacheError::Unavailable {
                    entity,
                    reason: source.to_string(),
                }),
            },
            Err(other) => Err(other),
        }
    }

    /// Fetch an entity from the remote store and replace its record
    pub async fn refresh(&self, entity: &str) -> Result<Vec<Value>, CacheError> {
        let rows = self
            .remote
            .request(entity, Operation::Find, RequestPayload::find_all(entity))
            .await
            .map_err(|source| CacheError::Refresh {
                entity: entity.to_string(),
                source,
            })?;

        let record = CacheRecord {
            rows: rows.clone(),
            fetched_at: now_millis(),
        };
        self.storage.store_cache_record(entity, &record)?;
        self.records.write().insert(entity.to_string(), record);

        tracing::debug!(entity = %entity, rows = rows.len(), "Reference data refreshed");
        Ok(rows)
    }

    /// Typed read of the product catalog
    pub async fn products(&self) -> Result<CachedData<Product>, CacheError> {
        self.get_typed(entities::PRODUCTS).await
    }

    /// Typed read of the dining table list
    pub async fn dining_tables(&self) -> Result<CachedData<DiningTable>, CacheError> {
        self.get_typed(entities::DINING_TABLES).await
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        entity: &str,
    ) -> Result<CachedData<T>, CacheError> {
        let data = self.get(entity).await?;
        let rows = decode_rows(entity, data.rows)?;
        Ok(CachedData {
            rows,
            stale: data.stale,
        })
    }

    // ========== Synchronous lookups ==========
    //
    // The cart paths need product/table snapshots without ever touching
    // the network, so these read the mirror directly and ignore the TTL.

    pub fn lookup_product(&self, product_id: &str) -> Option<Product> {
        self.lookup(entities::PRODUCTS, |p: &Product| p.id == product_id)
    }

    pub fn lookup_table(&self, table_id: &str) -> Option<DiningTable> {
        self.lookup(entities::DINING_TABLES, |t: &DiningTable| t.id == table_id)
    }

    /// The designated takeaway pseudo-table, if the catalog has one
    pub fn takeaway_table(&self) -> Option<DiningTable> {
        self.lookup(entities::DINING_TABLES, |t: &DiningTable| t.is_takeaway)
    }

    fn lookup<T: DeserializeOwned>(&self, entity: &str, matches: impl Fn(&T) -> bool) -> Option<T> {
        let records = self.records.read();
        let record = records.get(entity)?;
        record
            .rows
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .find(|row| matches(row))
    }
}

fn decode_rows<T: DeserializeOwned>(entity: &str, rows: Vec<Value>) -> Result<Vec<T>, CacheError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|source| CacheError::Decode {
                entity: entity.to_string(),
                source,
            })
        })
        .collect()
}
