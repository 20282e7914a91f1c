//! # Lazy sequences over indexable collections
//!
//! A `Sequence` presents a backing collection as an immutable singly-linked
//! list: `head`, `tail` and `size`. Nodes are created on demand while the
//! list is walked; each node reads its element at most once and builds its
//! tail at most once.
//!
//! ```text
//! backing: [a, b, c]
//!
//! Node(0) --tail--> Node(1) --tail--> Node(2) --tail--> Empty
//!   head=a            head=b            head=c
//! ```
//!
//! An empty range is always `Sequence::Empty`, never a node. `SequenceCache`
//! memoizes the wrapper for a backing collection so that re-wrapping the same
//! collection instance returns the identical node.

use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// An indexable collection a sequence can walk.
pub trait Collection: Send + Sync {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Element at `index`; `Null` when out of range.
    fn at(&self, index: usize) -> Value;

    /// Returns true if the collection has no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Page metadata, for collections produced by a paginated query.
    fn pagination(&self) -> Option<Pagination> {
        None
    }
}

impl Collection for Vec<Value> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn at(&self, index: usize) -> Value {
        self.get(index).cloned().unwrap_or_default()
    }
}

/// Page metadata of a paginated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// The 1-based page number.
    pub current_page: usize,
    /// Items per page.
    pub per_page: usize,
    /// Matching items across all pages.
    pub total_entries: usize,
}

impl Pagination {
    /// Number of pages needed for all entries (0 when there are none).
    pub fn total_pages(&self) -> usize {
        self.total_entries.div_ceil(self.per_page.max(1))
    }
}

/// A lazily walked list over a backing collection.
#[derive(Clone, Default)]
pub enum Sequence {
    /// The canonical empty sequence.
    #[default]
    Empty,
    /// A position in a non-empty backing collection.
    Node(Arc<SeqNode>),
}

/// One position of a sequence.
pub struct SeqNode {
    backing: Arc<dyn Collection>,
    index: usize,
    size0: usize,
    head: OnceLock<Value>,
    tail: OnceLock<Sequence>,
}

impl SeqNode {
    /// The element at this position, read from the backing collection once.
    pub fn head(&self) -> &Value {
        self.head.get_or_init(|| self.backing.at(self.index))
    }

    /// The rest of the sequence, built once.
    pub fn tail(&self) -> &Sequence {
        self.tail.get_or_init(|| {
            if self.size() <= 1 {
                Sequence::Empty
            } else {
                Sequence::Node(Arc::new(SeqNode::new(
                    Arc::clone(&self.backing),
                    self.index + 1,
                    self.size0,
                )))
            }
        })
    }

    /// Remaining elements, this one included.
    pub fn size(&self) -> usize {
        self.size0 - self.index
    }

    /// Page metadata of the backing collection.
    pub fn pagination(&self) -> Option<Pagination> {
        self.backing.pagination()
    }

    fn new(backing: Arc<dyn Collection>, index: usize, size0: usize) -> Self {
        Self { backing, index, size0, head: OnceLock::new(), tail: OnceLock::new() }
    }
}

impl Sequence {
    /// Wraps a collection; empty collections yield `Sequence::Empty`.
    ///
    /// Every call builds a new node; use `SequenceCache` for identity-stable
    /// wrapping.
    pub fn wrap(backing: Arc<dyn Collection>) -> Sequence {
        let size0 = backing.len();
        if size0 == 0 {
            Sequence::Empty
        } else {
            Sequence::Node(Arc::new(SeqNode::new(backing, 0, size0)))
        }
    }

    /// Wraps a list of values.
    pub fn from_values(values: Vec<Value>) -> Sequence {
        Self::wrap(Arc::new(values))
    }

    /// The first element; `Null` for the empty sequence.
    pub fn head(&self) -> Value {
        match self {
            Sequence::Empty => Value::Null,
            Sequence::Node(node) => node.head().clone(),
        }
    }

    /// Everything after the first element; the empty sequence stays empty.
    pub fn tail(&self) -> Sequence {
        match self {
            Sequence::Empty => Sequence::Empty,
            Sequence::Node(node) => node.tail().clone(),
        }
    }

    /// Number of remaining elements.
    pub fn size(&self) -> usize {
        match self {
            Sequence::Empty => 0,
            Sequence::Node(node) => node.size(),
        }
    }

    /// Returns true for the empty sequence.
    pub fn is_empty(&self) -> bool {
        matches!(self, Sequence::Empty)
    }

    /// Page metadata, when the backing collection is paginated.
    pub fn pagination(&self) -> Option<Pagination> {
        match self {
            Sequence::Empty => None,
            Sequence::Node(node) => node.pagination(),
        }
    }

    /// Identity comparison: both empty, or the very same node.
    pub fn same(&self, other: &Sequence) -> bool {
        match (self, other) {
            (Sequence::Empty, Sequence::Empty) => true,
            (Sequence::Node(a), Sequence::Node(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Iterates the remaining elements.
    pub fn iter(&self) -> SequenceIter {
        SequenceIter { current: self.clone() }
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::Empty => write!(f, "()"),
            Sequence::Node(node) => write!(f, "(seq @{} of {})", node.index, node.size0),
        }
    }
}

/// Iterator over the elements of a sequence.
pub struct SequenceIter {
    current: Sequence,
}

impl Iterator for SequenceIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match std::mem::take(&mut self.current) {
            Sequence::Empty => None,
            Sequence::Node(node) => {
                let head = node.head().clone();
                self.current = node.tail().clone();
                Some(head)
            }
        }
    }
}

fn same_backing(a: &Arc<dyn Collection>, b: &Arc<dyn Collection>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
}

/// Memoizes the sequence wrapper of a backing collection.
///
/// The cached wrapper is returned only while the same collection instance is
/// offered again; a different instance replaces it.
#[derive(Default)]
pub struct SequenceCache {
    slot: Mutex<Option<(Arc<dyn Collection>, Sequence)>>,
}

impl SequenceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached wrapper of `backing`, wrapping it on first use.
    pub fn wrap(&self, backing: Arc<dyn Collection>) -> Sequence {
        let mut slot = self.slot.lock();
        if let Some((cached, sequence)) = slot.as_ref() {
            if same_backing(cached, &backing) {
                return sequence.clone();
            }
            log::trace!("Backing collection replaced; rebuilding sequence wrapper");
        }
        let sequence = Sequence::wrap(Arc::clone(&backing));
        *slot = Some((backing, sequence.clone()));
        sequence
    }

    /// Drops the cached wrapper.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}
