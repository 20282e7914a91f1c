//! # luarecord - Lua scripting over a persistent entity layer
//!
//! luarecord lets Lua scripts create, read, update, delete and enumerate
//! host entities, and lets host entities notify scripts of lifecycle events,
//! without giving scripts direct access to the host object model.
//!
//! ## Architecture
//!
//! - **Command pipeline**: a fixed table of persistence verbs, each run as
//!   capability check, veto, sanitize, doit
//! - **Attribute resolver**: reads a named attribute off an entity by probing
//!   getters, columns, tag types, associations, attachments and exposed
//!   methods in priority order
//! - **Lazy sequences**: present query results as immutable linked lists
//!   with memoized, identity-stable wrapping
//! - **Event hooks**: forward after-save, after-create, after-create-commit
//!   and after-touch to the script runtime at most once per triggering
//!   action, with a per-thread disablement switch
//! - **Script runtime**: an mlua state exposing all of the above
//!
//! ## Example Usage
//!
//! ```rust
//! use luarecord::{Bridge, ClassBuilder, Options, Registry, Value};
//! use luarecord::script::ScriptRuntime;
//!
//! # fn main() -> Result<(), luarecord::Error> {
//! let registry = Registry::in_memory();
//! registry.register(ClassBuilder::new("Widget").uses_bridge().columns(&["name"]))?;
//! registry.register(ClassBuilder::new("Invoice").columns(&["total"]))?;
//!
//! let runtime = ScriptRuntime::new(Bridge::new(registry, Options::default())?)?;
//!
//! let count = runtime.eval(r#"
//!     bridge.create("Widget", { name = "gear" })
//!     bridge.create("Widget", { name = "cog" })
//!     return #bridge.all_instances("Widget")
//! "#)?;
//! assert_eq!(count, Value::Int(2));
//!
//! // Invoice does not use the bridge
//! let err = runtime.execute(r#"bridge.create("Invoice", { total = 1 })"#).unwrap_err();
//! assert_eq!(err.to_string(), "create Invoice : not allowed");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod bridge;
pub mod command;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod resolver;
pub mod script;
pub mod sequence;
pub mod store;
pub mod value;

// Re-exports
pub use bridge::Bridge;
pub use config::Options;
pub use entity::{ClassBuilder, Entity, EntityClass, EntityRef, Registry, Relation};
pub use error::{Error, Result};
pub use event::{hooks_disabled, without_hooks, EventRecord, EventSink, EventTag, HooksDisabled};
pub use sequence::{Collection, Pagination, Sequence, SequenceCache};
pub use store::{MemoryStore, Repository};
pub use value::{Attributes, Value};
