//! geounits-storage: datastore port for the units-of-analysis pipeline
//!
//! Spatial-unit tables (RSU, block, building) live in an external datastore
//! and are only ever referenced by name. This crate defines the handle that is
//! passed to every pipeline step, plus two adapters.
//!
//! ## Adapters
//!
//! - `InMemoryDatastore`: table catalog in process memory
//! - `SqliteDatastore`: rusqlite-backed (feature `sqlite`, on by default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geounits_storage::{Datastore, InMemoryDatastore, TableNamer};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn Datastore> = Arc::new(InMemoryDatastore::new());
//! let rsu_table = TableNamer::new("p1").prefixed("rsu");
//! assert!(!store.table_exists(&rsu_table).await?);
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{is_valid_identifier, Datastore, FieldValue, Row, TableNamer};
pub use infrastructure::InMemoryDatastore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteDatastore;
