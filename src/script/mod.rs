//! Lua scripting on top of the entity bridge.
//!
//! # Architecture
//!
//! - **ScriptRuntime**: owns the Lua state, installs the verb table and
//!   forwards lifecycle events to the Lua entry point
//! - **marshal**: host value <-> Lua value conversion
//! - **userdata**: entity and sequence handles exposed to scripts
//!
//! # Lua surface
//!
//! ```lua
//! local w = bridge.create("Widget", { name = "gear" })
//! print(w.name, tostring(w))          -- attributes via the resolver
//! bridge.update(w, { name = "cog" })
//!
//! local seq = bridge.all_instances("Widget")  -- nil when empty
//! while seq do
//!   print(seq:head().name)
//!   seq = seq:tail()
//! end
//!
//! function run_event_hooks(tag, entity)  -- called on lifecycle events
//!   print(tag, entity.name)
//! end
//! ```
//!
//! # Example
//!
//! ```rust
//! use luarecord::{Bridge, ClassBuilder, Options, Registry};
//! use luarecord::script::ScriptRuntime;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), luarecord::Error> {
//! let registry = Registry::in_memory();
//! registry.register(ClassBuilder::new("Widget").uses_bridge().columns(&["name"]))?;
//! let options = Options::default().script_timeout(Some(Duration::from_secs(5)));
//! let runtime = ScriptRuntime::new(Bridge::new(registry, options)?)?;
//!
//! runtime.execute(r#"
//!     for i = 1, 3 do
//!         bridge.create("Widget", { name = "widget " .. i })
//!     end
//! "#)?;
//! # Ok(())
//! # }
//! ```

pub mod marshal;
pub mod runtime;
pub mod userdata;

pub use runtime::ScriptRuntime;
pub use userdata::{LuaEntity, LuaSequence};
