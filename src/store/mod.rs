//! # Store - Persistence boundary of the entity layer
//!
//! Entity classes persist through the `Repository` trait. The bridge never
//! talks to a repository directly; it goes through `EntityClass` and
//! `Entity`, which decide when rows are written.
//!
//! `MemoryStore` is the bundled implementation: one lock-free skip list per
//! table, rows kept in their encoded form so that every read decodes a fresh
//! copy of the persisted state.

mod memory;

pub use memory::MemoryStore;

use crate::value::Attributes;
use crate::Result;

/// Row storage keyed by table name and integer id.
pub trait Repository: Send + Sync {
    /// Stores a new row and returns its id.
    fn insert(&self, table: &str, row: &Attributes) -> Result<i64>;

    /// Replaces an existing row.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if no row has `id`.
    fn update(&self, table: &str, id: i64, row: &Attributes) -> Result<()>;

    /// Reads one row.
    fn load(&self, table: &str, id: i64) -> Result<Option<Attributes>>;

    /// Removes one row; false if it did not exist.
    fn delete(&self, table: &str, id: i64) -> Result<bool>;

    /// Reads every row of a table in ascending id order.
    fn scan(&self, table: &str) -> Result<Vec<(i64, Attributes)>>;

    /// Number of rows in a table.
    fn count(&self, table: &str) -> Result<usize> {
        Ok(self.scan(table)?.len())
    }
}
