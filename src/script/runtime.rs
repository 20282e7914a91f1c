//! ScriptRuntime owns the Lua state and wires it to the bridge.
//!
//! Creating a runtime installs the verb table under the configured namespace
//! and registers a Lua event sink, so lifecycle events of bridge-enabled
//! entities call the configured global entry point.

use super::marshal::{from_lua, to_lua};
use crate::bridge::Bridge;
use crate::command;
use crate::event::{EventRecord, EventSink};
use crate::value::Value;
use crate::{Error, Result};
use mlua::{Function, Lua, MultiValue, Value as LuaValue};
use parking_lot::ReentrantMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Runs Lua code against a bridge.
///
/// The Lua state sits behind a reentrant lock: host threads take turns, and
/// host code running inside a Lua callback (for example a save that fires
/// an event hook) re-enters on the same thread.
///
/// # Example
///
/// ```rust
/// use luarecord::{Bridge, ClassBuilder, Options, Registry, Value};
/// use luarecord::script::ScriptRuntime;
///
/// # fn main() -> Result<(), luarecord::Error> {
/// let registry = Registry::in_memory();
/// registry.register(ClassBuilder::new("Widget").uses_bridge().columns(&["name"]))?;
/// let runtime = ScriptRuntime::new(Bridge::new(registry, Options::default())?)?;
///
/// let name = runtime.eval(r#"
///     local widget = bridge.create("Widget", { name = "gear" })
///     return bridge.find("Widget", widget.id).name
/// "#)?;
/// assert_eq!(name, Value::from("gear"));
/// # Ok(())
/// # }
/// ```
pub struct ScriptRuntime {
    lua: Arc<ReentrantMutex<Lua>>,
    bridge: Arc<Bridge>,

    /// Nesting of `run` calls; only the outermost one owns the timeout hook.
    depth: AtomicUsize,
}

impl ScriptRuntime {
    /// Creates a Lua state with the verb table installed and registers the
    /// Lua event sink on the bridge's registry.
    pub fn new(bridge: Arc<Bridge>) -> Result<Self> {
        let lua = Lua::new();
        install_verbs(&lua, &bridge).map_err(host_error)?;
        let lua = Arc::new(ReentrantMutex::new(lua));

        let sink = LuaEventSink {
            lua: Arc::downgrade(&lua),
            bridge: Arc::downgrade(&bridge),
            entry_point: bridge.options().event_entry_point.clone(),
        };
        bridge.registry().set_event_sink(Some(Arc::new(sink)));

        log::info!(
            "Lua runtime ready: namespace `{}`, event entry point `{}`",
            bridge.options().namespace,
            bridge.options().event_entry_point
        );
        Ok(Self { lua, bridge, depth: AtomicUsize::new(0) })
    }

    /// The bridge scripts talk to.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Executes a chunk for its side effects.
    ///
    /// # Errors
    ///
    /// Host errors raised by bridge calls come back as their original
    /// variant; syntax errors, Lua runtime errors and timeouts are
    /// `Error::Script`.
    pub fn execute(&self, script: &str) -> Result<()> {
        self.run(|lua| lua.load(script).exec())
    }

    /// Evaluates a chunk and converts its (first) result.
    pub fn eval(&self, script: &str) -> Result<Value> {
        self.run(|lua| {
            let value: LuaValue<'_> = lua.load(script).eval()?;
            from_lua(value)
        })
    }

    /// Calls the global Lua function `name` with host arguments.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.run(|lua| {
            let function: Function<'_> = lua.globals().get(name)?;
            let args = args
                .iter()
                .map(|arg| to_lua(lua, &self.bridge, arg))
                .collect::<mlua::Result<Vec<_>>>()?;
            let value: LuaValue<'_> = function.call(MultiValue::from_vec(args))?;
            from_lua(value)
        })
    }

    fn run<T>(&self, f: impl FnOnce(&Lua) -> mlua::Result<T>) -> Result<T> {
        let start_time = Instant::now();
        let lua = self.lua.lock();

        let outermost = self.depth.fetch_add(1, Ordering::SeqCst) == 0;
        let timeout = self.bridge.options().script_timeout.filter(|_| outermost);
        if let Some(timeout) = timeout {
            install_timeout(&lua, start_time, timeout);
        }

        let result = f(&*lua);

        if timeout.is_some() {
            lua.remove_hook();
        }
        self.depth.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(value) => {
                log::info!("Lua script executed successfully in {:?}", start_time.elapsed());
                Ok(value)
            }
            Err(e) => {
                log::warn!("Lua script failed: {}", e);
                Err(host_error(e))
            }
        }
    }
}

fn install_timeout(lua: &Lua, start_time: Instant, timeout: Duration) {
    lua.set_hook(
        mlua::HookTriggers { every_nth_instruction: Some(1000), ..Default::default() },
        move |_lua, _debug| {
            if start_time.elapsed() > timeout {
                Err(mlua::Error::RuntimeError("Script execution timeout".to_string()))
            } else {
                Ok(())
            }
        },
    );
}

/// Builds the namespace table: every verb under its own name, plus an
/// underscore alias for dashed verbs.
fn install_verbs(lua: &Lua, bridge: &Arc<Bridge>) -> mlua::Result<()> {
    let table = lua.create_table()?;
    for &verb in command::VERBS {
        let target = Arc::clone(bridge);
        let function = lua.create_function(move |lua, args: MultiValue<'_>| {
            let args = args.into_iter().map(from_lua).collect::<mlua::Result<Vec<_>>>()?;
            let result = target.invoke(verb, args).map_err(mlua::Error::external)?;
            to_lua(lua, &target, &result)
        })?;
        let alias = verb.replace('-', "_");
        if alias != verb {
            table.set(alias, function.clone())?;
        }
        table.set(verb, function)?;
    }
    lua.globals().set(bridge.options().namespace.as_str(), table)
}

/// Forwards lifecycle events to the Lua entry point.
struct LuaEventSink {
    lua: Weak<ReentrantMutex<Lua>>,
    bridge: Weak<Bridge>,
    entry_point: String,
}

impl EventSink for LuaEventSink {
    fn dispatch(&self, record: &EventRecord) -> Result<()> {
        let (Some(state), Some(bridge)) = (self.lua.upgrade(), self.bridge.upgrade()) else {
            log::debug!("Lua runtime dropped; ignoring {}", record.tag);
            return Ok(());
        };
        let lua = state.lock();

        let entry: LuaValue<'_> =
            lua.globals().get(self.entry_point.as_str()).map_err(host_error)?;
        let LuaValue::Function(entry) = entry else {
            log::debug!("No `{}` function defined; ignoring {}", self.entry_point, record.tag);
            return Ok(());
        };

        let entity = to_lua(&lua, &bridge, &Value::Entity(Arc::clone(&record.entity)))
            .map_err(host_error)?;
        entry.call::<_, ()>((record.tag.as_str(), entity)).map_err(host_error)
    }
}

/// Maps a Lua failure back to the host error that caused it, if any.
pub(crate) fn host_error(err: mlua::Error) -> Error {
    recover(&err).unwrap_or_else(|| Error::script(format!("Lua script failed: {}", err)))
}

fn recover(err: &mlua::Error) -> Option<Error> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<Error>().cloned(),
        mlua::Error::CallbackError { cause, .. } => recover(cause),
        mlua::Error::WithContext { cause, .. } => recover(cause),
        _ => None,
    }
}
