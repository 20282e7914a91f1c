//! The host-side facade scripts talk to.

use crate::command;
use crate::config::Options;
use crate::entity::{EntityRef, Registry};
use crate::resolver;
use crate::value::Value;
use crate::Result;
use std::sync::Arc;

/// Couples an entity registry with the bridge options.
///
/// # Example
///
/// ```rust
/// use luarecord::{Bridge, ClassBuilder, Options, Registry, Value};
/// use luarecord::value::attrs;
/// use serde_json::json;
///
/// # fn main() -> Result<(), luarecord::Error> {
/// let registry = Registry::in_memory();
/// registry.register(ClassBuilder::new("Widget").uses_bridge().columns(&["name"]))?;
/// let bridge = Bridge::new(registry, Options::default())?;
///
/// let widget = bridge.invoke("create", vec!["Widget".into(), attrs(json!({"name": "gear"})).into()])?;
/// assert_eq!(bridge.resolve(widget.as_entity().unwrap(), "name")?, Value::from("gear"));
/// # Ok(())
/// # }
/// ```
pub struct Bridge {
    registry: Arc<Registry>,
    options: Options,
}

impl Bridge {
    /// Creates a bridge over `registry`; fails on invalid options.
    pub fn new(registry: Arc<Registry>, options: Options) -> Result<Arc<Self>> {
        options.validate()?;
        Ok(Arc::new(Self { registry, options }))
    }

    /// The entity registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The bridge options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Runs one verb of the command table.
    pub fn invoke(&self, verb: &str, args: Vec<Value>) -> Result<Value> {
        log::debug!("bridge.{} ({} args)", verb, args.len());
        command::invoke(&self.registry, verb, args)
    }

    /// Reads an attribute of `entity`.
    pub fn resolve(&self, entity: &EntityRef, name: &str) -> Result<Value> {
        resolver::resolve(entity, name)
    }

    /// The diagnostic view of `entity`.
    pub fn inspect(&self, entity: &EntityRef) -> String {
        resolver::inspect(entity, &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ClassBuilder;
    use crate::Error;

    #[test]
    fn test_new_validates_options() {
        let registry = Registry::in_memory();
        let err = Bridge::new(Arc::clone(&registry), Options::default().namespace("not valid"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(Bridge::new(registry, Options::default()).is_ok());
    }

    #[test]
    fn test_inspect_uses_options() {
        let registry = Registry::in_memory();
        let class = registry
            .register(ClassBuilder::new("Widget").uses_bridge().columns(&["name"]))
            .unwrap();
        let bridge = Bridge::new(registry, Options::default().inspect_max_len(5)).unwrap();
        let widget = class.build(crate::value::attrs(serde_json::json!({"name": "abcdefghij"}))).unwrap();
        assert!(bridge.inspect(&widget).contains("ab..."));
    }
}
