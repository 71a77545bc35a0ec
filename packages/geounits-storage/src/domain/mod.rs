//! Domain layer for the spatial-unit datastore
//!
//! The pipeline never reads geometry itself. It refers to tables by name and
//! hands a shared [`Datastore`] handle to every process it invokes.
//!
//! # Domain Models
//!
//! - `FieldValue`: a single cell value
//! - `Row`: column name → value
//! - `TableNamer`: prefix-based naming of output tables
//!
//! # Port Trait
//!
//! - `Datastore`: catalog-level access shared by the orchestrator and processes
//!
//! # Examples
//!
//! ```rust,ignore
//! use geounits_storage::{Datastore, TableNamer};
//!
//! async fn example(store: &dyn Datastore) -> geounits_storage::Result<()> {
//!     let namer = TableNamer::new("p1");
//!     let rsu = namer.prefixed("rsu");
//!     if store.table_exists(&rsu).await? {
//!         store.drop_table(&rsu).await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Cell value stored in a spatial-unit table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// One table row, keyed by column name
pub type Row = BTreeMap<String, FieldValue>;

/// Builds output table names from a run prefix
///
/// With a non-empty prefix `p1`, `prefixed("rsu")` is `p1_rsu`.
/// An empty prefix leaves the base name unchanged.
///
/// # Examples
///
/// ```rust
/// use geounits_storage::TableNamer;
///
/// let namer = TableNamer::new("p1");
/// assert_eq!(namer.prefixed("block"), "p1_block");
/// assert_eq!(TableNamer::new("").prefixed("block"), "block");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNamer {
    prefix: String,
}

impl TableNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}_{base}`, or `base` when the prefix is empty
    pub fn prefixed(&self, base: &str) -> String {
        if self.prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}_{}", self.prefix, base)
        }
    }

    /// Prefixed name with a random suffix, for scratch tables
    pub fn unique(&self, base: &str) -> String {
        format!("{}_{}", self.prefixed(base), uuid::Uuid::new_v4().simple())
    }
}

/// Accepts plain SQL identifiers: ASCII letters, digits and `_`, not starting with a digit.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait
// ═══════════════════════════════════════════════════════════════════════════

/// Datastore handle shared by reference across a pipeline run
///
/// The orchestrator only uses catalog operations: checking that input tables
/// exist and dropping intermediate tables. Processes use whatever richer API
/// their concrete backend offers.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Backend name, for logging
    fn backend(&self) -> &'static str;

    /// Whether a table with this name exists
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column names in declaration order
    ///
    /// # Errors
    ///
    /// - `TableNotFound` if the table does not exist
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Number of rows
    ///
    /// # Errors
    ///
    /// - `TableNotFound` if the table does not exist
    async fn row_count(&self, table: &str) -> Result<usize>;

    /// Drop a table; dropping a missing table is a no-op
    async fn drop_table(&self, table: &str) -> Result<()>;
}
