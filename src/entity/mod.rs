//! # Entity layer
//!
//! The host-side object model the bridge operates on: entity classes, their
//! instances, the registry that indexes classes by name, and lazily
//! evaluated relations over persisted instances.
//!
//! ## Design
//!
//! - `EntityClass` carries the capability flag, declared columns, tag types,
//!   associations, host methods and the two exposure sets (whitelist and
//!   procedures) read by the attribute resolver
//! - `Entity` is one row-backed instance; its in-memory state is separate
//!   from the persisted row held by the `Repository`
//! - `Registry` is the descendant-lookup index used by the command pipeline
//! - `Relation` defers the repository scan until first use and memoizes its
//!   sequence wrapper

mod class;
mod record;
mod registry;
mod relation;

pub use class::{
    Association, AssociationKind, ClassBuilder, Column, CreateHook, EntityClass, Getter, Method,
    Sanitizer, SetupHook, Validator,
};
pub use record::{Entity, EntityRef};
pub use registry::Registry;
pub use relation::{Relation, Rows};

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, used for `created_at`/`updated_at`.
pub(crate) fn timestamp() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Naive English singular form, enough for tag type names
/// (`tags` -> `tag`, `categories` -> `category`).
pub(crate) fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = word.strip_suffix("ses") {
        format!("{}s", stem)
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word.to_string()
    }
}
