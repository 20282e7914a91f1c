//! Lazily evaluated, optionally paginated collections of entities.

use super::{EntityClass, EntityRef};
use crate::sequence::{Collection, Pagination, Sequence, SequenceCache};
use crate::value::Value;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
    number: usize,
    per_page: usize,
}

/// A query over the persisted instances of one class.
///
/// Nothing is read until the rows are first needed; the loaded rows and the
/// sequence wrapper over them are memoized until `reload`.
pub struct Relation {
    class: Arc<EntityClass>,
    filter: Option<(String, Value)>,
    page: Option<Page>,
    rows: RwLock<Option<Arc<Rows>>>,
    wrapper: SequenceCache,
}

/// The materialized result of a relation.
pub struct Rows {
    entities: Vec<EntityRef>,
    pagination: Option<Pagination>,
}

impl Rows {
    /// The loaded entities, in id order.
    pub fn entities(&self) -> &[EntityRef] {
        &self.entities
    }
}

impl Collection for Rows {
    fn len(&self) -> usize {
        self.entities.len()
    }

    fn at(&self, index: usize) -> Value {
        self.entities.get(index).cloned().map(Value::Entity).unwrap_or_default()
    }

    fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }
}

impl Relation {
    pub(crate) fn new(class: Arc<EntityClass>, filter: Option<(String, Value)>) -> Arc<Self> {
        Arc::new(Self { class, filter, page: None, rows: RwLock::new(None), wrapper: SequenceCache::new() })
    }

    /// The class being queried.
    pub fn class(&self) -> &Arc<EntityClass> {
        &self.class
    }

    /// The same query restricted to one page (1-based).
    pub fn paginate(&self, page: usize, per_page: usize) -> Result<Arc<Relation>> {
        if page == 0 || per_page == 0 {
            return Err(Error::invalid_argument(format!(
                "page and per_page must be >= 1, got {} and {}",
                page, per_page
            )));
        }
        Ok(Arc::new(Self {
            class: Arc::clone(&self.class),
            filter: self.filter.clone(),
            page: Some(Page { number: page, per_page }),
            rows: RwLock::new(None),
            wrapper: SequenceCache::new(),
        }))
    }

    /// Returns true once the rows have been read.
    pub fn is_loaded(&self) -> bool {
        self.rows.read().is_some()
    }

    /// Reads the rows on first use and returns the memoized result after.
    pub fn load(&self) -> Result<Arc<Rows>> {
        if let Some(rows) = self.rows.read().as_ref() {
            return Ok(Arc::clone(rows));
        }
        let fetched = Arc::new(self.fetch()?);
        let mut slot = self.rows.write();
        Ok(Arc::clone(slot.get_or_insert(fetched)))
    }

    /// Forgets the loaded rows; the next read queries the repository again.
    pub fn reload(&self) {
        *self.rows.write() = None;
    }

    /// Number of loaded rows (the page size for paginated relations).
    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.entities.len())
    }

    /// Returns true if no rows match.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The loaded entities.
    pub fn entities(&self) -> Result<Vec<EntityRef>> {
        Ok(self.load()?.entities.clone())
    }

    /// The loaded rows as a lazy sequence; identical across calls until the
    /// rows are reloaded.
    pub fn to_sequence(&self) -> Result<Sequence> {
        let rows = self.load()?;
        Ok(self.wrapper.wrap(rows))
    }

    fn fetch(&self) -> Result<Rows> {
        let name = self.class.name();
        let mut matching: Vec<_> = self
            .class
            .repository()
            .scan(name)?
            .into_iter()
            .filter(|(_, row)| match &self.filter {
                Some((key, value)) => row.get(key) == Some(value),
                None => true,
            })
            .collect();
        log::trace!("Relation over {} matched {} rows", name, matching.len());

        let pagination = self.page.map(|page| Pagination {
            current_page: page.number,
            per_page: page.per_page,
            total_entries: matching.len(),
        });
        if let Some(page) = self.page {
            let offset = (page.number - 1).saturating_mul(page.per_page);
            matching = matching.into_iter().skip(offset).take(page.per_page).collect();
        }

        let entities =
            matching.into_iter().map(|(id, row)| self.class.instantiate(id, row)).collect();
        Ok(Rows { entities, pagination })
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("class", &self.class.name())
            .field("filter", &self.filter)
            .field("page", &self.page)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
