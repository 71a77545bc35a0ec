//! In-memory datastore
//!
//! Table catalog guarded by a `parking_lot::Mutex`. Used by process
//! implementations that keep their tables in process memory, and by tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{is_valid_identifier, Datastore, FieldValue, Row};
use crate::{Result, StorageError};

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Datastore keeping every table in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatastore {
    tables: Arc<Mutex<HashMap<String, MemTable>>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table
    pub fn create_table(&self, table: &str, columns: &[&str]) -> Result<()> {
        if !is_valid_identifier(table) {
            return Err(StorageError::invalid_name(table));
        }
        if let Some(bad) = columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(StorageError::invalid_name(bad));
        }

        let mut tables = self.tables.lock();
        if tables.contains_key(table) {
            return Err(StorageError::table_exists(table));
        }
        tables.insert(
            table.to_string(),
            MemTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append rows; undeclared columns are rejected, missing ones become NULL
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        let mut tables = self.tables.lock();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;

        for mut row in rows {
            if let Some(unknown) = row.keys().find(|k| !target.columns.contains(k)) {
                return Err(StorageError::column_not_found(table, unknown));
            }
            for column in &target.columns {
                row.entry(column.clone()).or_insert(FieldValue::Null);
            }
            target.rows.push(row);
        }
        Ok(())
    }

    /// Copy of all rows, in insertion order
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let tables = self.tables.lock();
        tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| StorageError::table_not_found(table))
    }

    /// Values of a single column, in row order
    pub fn column_values(&self, table: &str, column: &str) -> Result<Vec<FieldValue>> {
        let tables = self.tables.lock();
        let source = tables
            .get(table)
            .ok_or_else(|| StorageError::table_not_found(table))?;
        if !source.columns.iter().any(|c| c == column) {
            return Err(StorageError::column_not_found(table, column));
        }
        Ok(source
            .rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(FieldValue::Null))
            .collect())
    }

    /// Sorted table names
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().contains_key(table))
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let tables = self.tables.lock();
        tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| StorageError::table_not_found(table))
    }

    async fn row_count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.lock();
        tables
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| StorageError::table_not_found(table))
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.tables.lock().remove(table);
        Ok(())
    }
}
