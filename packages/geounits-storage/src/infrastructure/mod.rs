//! Infrastructure layer - Datastore adapters

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryDatastore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatastore;
