//! Persistent state of the hub
//!
//! - maintenance records with their recording lock ([`MaintenanceStore`](crate::maintenance::MaintenanceStore))
//! - the last-known-status cache ([`StatusCache`])
//!
//! ## Backends
//!
//! - **SQLite** (feature `storage-sqlite`, default): embedded database with
//!   migrations, safe to share between hub replicas
//! - **In-Memory**: no persistence, for tests and single-process setups

pub mod backend;
pub mod error;
pub mod memory;
mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{BackendHealth, StatusCache};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryMaintenanceStore, MemoryStatusCache};
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStore;
