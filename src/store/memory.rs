//! In-memory repository backed by crossbeam skip lists.

use super::Repository;
use crate::value::Attributes;
use crate::{Error, Result};
use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// One table: encoded rows ordered by id.
struct Table {
    rows: SkipMap<i64, Bytes>,
    next_id: AtomicI64,
}

impl Table {
    fn new() -> Self {
        Self { rows: SkipMap::new(), next_id: AtomicI64::new(1) }
    }
}

/// A thread-safe in-memory `Repository`.
///
/// # Example
///
/// ```rust
/// use luarecord::store::{MemoryStore, Repository};
/// use luarecord::value::{Attributes, Value};
///
/// # fn main() -> Result<(), luarecord::Error> {
/// let store = MemoryStore::new();
/// let mut row = Attributes::new();
/// row.insert("name".to_string(), Value::from("gear"));
///
/// let id = store.insert("Widget", &row)?;
/// assert_eq!(store.load("Widget", id)?, Some(row));
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self { tables: RwLock::new(HashMap::new()) }
    }

    fn table(&self, name: &str) -> Arc<Table> {
        if let Some(table) = self.tables.read().get(name) {
            return Arc::clone(table);
        }
        let mut tables = self.tables.write();
        Arc::clone(tables.entry(name.to_string()).or_insert_with(|| Arc::new(Table::new())))
    }

    fn existing(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().get(name).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(row: &Attributes) -> Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(row)?))
}

fn decode(bytes: &[u8]) -> Result<Attributes> {
    Ok(bincode::deserialize(bytes)?)
}

impl Repository for MemoryStore {
    fn insert(&self, table: &str, row: &Attributes) -> Result<i64> {
        let encoded = encode(row)?;
        let table_ref = self.table(table);
        let id = table_ref.next_id.fetch_add(1, Ordering::SeqCst);
        table_ref.rows.insert(id, encoded);
        log::trace!("Inserted {}#{}", table, id);
        Ok(id)
    }

    fn update(&self, table: &str, id: i64, row: &Attributes) -> Result<()> {
        let encoded = encode(row)?;
        let table_ref = self
            .existing(table)
            .filter(|t| t.rows.contains_key(&id))
            .ok_or_else(|| Error::RecordNotFound { class: table.to_string(), id })?;
        table_ref.rows.insert(id, encoded);
        Ok(())
    }

    fn load(&self, table: &str, id: i64) -> Result<Option<Attributes>> {
        let bytes = match self.existing(table) {
            Some(table_ref) => table_ref.rows.get(&id).map(|entry| entry.value().clone()),
            None => None,
        };
        match bytes {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, table: &str, id: i64) -> Result<bool> {
        let removed = match self.existing(table) {
            Some(table_ref) => {
                let removed = table_ref.rows.remove(&id);
                removed.is_some()
            }
            None => false,
        };
        Ok(removed)
    }

    fn scan(&self, table: &str) -> Result<Vec<(i64, Attributes)>> {
        let Some(table_ref) = self.existing(table) else {
            return Ok(Vec::new());
        };
        let rows: Result<Vec<_>> =
            table_ref.rows.iter().map(|entry| Ok((*entry.key(), decode(entry.value())?))).collect();
        rows
    }

    fn count(&self, table: &str) -> Result<usize> {
        Ok(self.existing(table).map(|t| t.rows.len()).unwrap_or(0))
    }
}
