//! SQLite adapter for the Datastore port
//!
//! Catalog queries go through `sqlite_master` and `PRAGMA table_info`.
//! Identifiers are validated before being quoted into SQL.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::domain::{is_valid_identifier, Datastore};
use crate::{Result, StorageError};

pub struct SqliteDatastore {
    conn: Mutex<Connection>,
}

impl SqliteDatastore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run raw SQL (schema setup, process-side statements)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    fn checked(name: &str) -> Result<&str> {
        if is_valid_identifier(name) {
            Ok(name)
        } else {
            Err(StorageError::invalid_name(name))
        }
    }

    /// Catalog type ("table" or "view") of a name, matched the way SQLite
    /// resolves identifiers (case-insensitively)
    fn kind_locked(conn: &Connection, table: &str) -> Result<Option<String>> {
        let kind = conn
            .query_row(
                "SELECT type FROM sqlite_master
                 WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
                params![table],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(kind)
    }

    fn exists_locked(conn: &Connection, table: &str) -> Result<bool> {
        Ok(Self::kind_locked(conn, table)?.is_some())
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.conn.lock();
        Self::exists_locked(&conn, table)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let table = Self::checked(table)?;
        let conn = self.conn.lock();
        if !Self::exists_locked(&conn, table)? {
            return Err(StorageError::table_not_found(table));
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    async fn row_count(&self, table: &str) -> Result<usize> {
        let table = Self::checked(table)?;
        let conn = self.conn.lock();
        if !Self::exists_locked(&conn, table)? {
            return Err(StorageError::table_not_found(table));
        }

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let table = Self::checked(table)?;
        let conn = self.conn.lock();
        let statement = match Self::kind_locked(&conn, table)?.as_deref() {
            Some("view") => "DROP VIEW",
            Some(_) => "DROP TABLE",
            None => return Ok(()),
        };
        conn.execute_batch(&format!("{} \"{}\"", statement, table))?;
        Ok(())
    }
}
