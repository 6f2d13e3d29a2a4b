//! POS Terminal Engine — offline-first order capture and settlement
//!
//! The library behind a restaurant point-of-sale terminal. It keeps a
//! live per-table cart, keeps working when the network is unavailable,
//! never loses or duplicates a completed sale, and reconciles locally
//! completed transactions against the remote system of record once
//! connectivity returns. Rendering, printing, and the admin CRUD screens
//! live in the embedding application.
//!
//! # Module structure
//!
//! ```text
//! pos-terminal/src/
//! ├── core/          # Configuration and component wiring
//! ├── storage/       # redb-backed durable terminal state
//! ├── connectivity/  # Online/Offline monitor with reconnect events
//! ├── catalog/       # TTL-bounded reference-data cache
//! ├── orders/        # Per-table cart working set
//! ├── settlement/    # Checkout validation, totals, and commit
//! ├── queue/         # Offline transaction log and reconciliation
//! ├── remote/        # Remote entity-store contract + HTTP client
//! └── utils/         # Logging setup
//! ```
//!
//! # Data Flow
//!
//! 1. User actions mutate the [`orders::ActiveOrderStore`]; every
//!    mutation is durable before it returns
//! 2. Settlement reads the live cart, validates, and commits the invoice
//!    to the remote store, falling back to the offline queue when the
//!    [`connectivity::ConnectivityMonitor`] reports offline
//! 3. The queue drains in enqueue order on reconnect and at startup
//! 4. The reference cache serves products and tables, stale when offline

pub mod catalog;
pub mod connectivity;
pub mod core;
pub mod orders;
pub mod queue;
pub mod remote;
pub mod settlement;
pub mod storage;
pub mod utils;

// Re-export the public surface
pub use catalog::{CacheError, CachedData, ReferenceCache};
pub use connectivity::{ConnectionStatus, ConnectivityMonitor};
pub use crate::core::{TerminalConfig, TerminalState};
pub use orders::{ActiveOrderStore, OrderError};
pub use queue::{FlushSummary, OfflineQueue, QueueWorker};
pub use remote::http::HttpRemoteStore;
pub use remote::{Operation, RemoteError, RemoteStore, RequestPayload};
pub use settlement::{
    CommitPath, SettlementError, SettlementOutcome, SettlementRequest, SettlementWorkflow,
};
pub use storage::{PendingTransaction, StorageError, TerminalStorage};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
