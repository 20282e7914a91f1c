//! # Command pipeline
//!
//! The persistence verbs scripts can call. Every verb is a stateless
//! singleton implementing `Command`; `invoke` runs the same stages for all of
//! them:
//!
//! ```text
//! args --> resolve target --> capability check --> veto --> sanitize --> doit
//!          (class by name,    (uses_bridge)        (shape)   (filter)    (host call)
//!           or entity handle)
//! ```
//!
//! Verbs are looked up by exact name; no verb falls through to another.

mod verbs;

pub use verbs::{
    AllInstances, AssignAttributes, Build, Create, Destroy, Find, FindOrCreate, Save, Update,
};

use crate::entity::{EntityClass, EntityRef, Registry};
use crate::value::{Attributes, Value};
use crate::{Error, Result};
use std::sync::Arc;

/// Every verb, in table order.
pub const VERBS: &[&str] = &[
    "create",
    "find",
    "build",
    "find-or-create",
    "update",
    "assign-attributes",
    "destroy",
    "save",
    "all-instances",
];

/// What the first argument of a verb names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// An entity type name, resolved through the registry.
    Class,
    /// An entity handle.
    Instance,
}

/// The resolved subject of a command.
pub enum Target<'a> {
    /// A bridge-enabled class.
    Class(&'a Arc<EntityClass>),
    /// An entity of a bridge-enabled class.
    Instance(&'a EntityRef),
}

impl Target<'_> {
    /// The class of the target.
    pub fn class(&self) -> &Arc<EntityClass> {
        match self {
            Target::Class(class) => *class,
            Target::Instance(entity) => entity.class(),
        }
    }
}

/// One persistence verb.
pub trait Command: Send + Sync {
    /// Verb name used in error messages.
    fn action_name(&self) -> &'static str;

    /// Whether the first argument is a type name or an entity handle.
    fn target_kind(&self) -> TargetKind {
        TargetKind::Class
    }

    /// Structural validation of the payload. Defaults to requiring an
    /// attribute map.
    fn veto(&self, payload: Value) -> Result<Value> {
        veto_attrs(self.action_name(), payload)
    }

    /// Shapes the validated payload for `doit`. Defaults to the class
    /// sanitizer over attribute maps.
    fn sanitize(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        match payload {
            Value::Map(attrs) => Ok(Value::Map(target.class().sanitize(attrs))),
            other => Ok(other),
        }
    }

    /// The host operation.
    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value>;
}

/// Requires `payload` to be an attribute map.
pub fn veto_attrs(action: &str, payload: Value) -> Result<Value> {
    match payload {
        Value::Map(_) => Ok(payload),
        other => Err(Error::invalid_argument(format!(
            "{}: attrs must be a hash, got {}",
            action,
            other.describe()
        ))),
    }
}

pub(crate) fn into_attrs(payload: Value) -> Attributes {
    match payload {
        Value::Map(attrs) => attrs,
        _ => Attributes::new(),
    }
}

/// The command registered under `verb`.
pub fn lookup(verb: &str) -> Option<&'static dyn Command> {
    static CREATE: Create = Create;
    static FIND: Find = Find;
    static BUILD: Build = Build;
    static FIND_OR_CREATE: FindOrCreate = FindOrCreate;
    static UPDATE: Update = Update;
    static ASSIGN_ATTRIBUTES: AssignAttributes = AssignAttributes;
    static DESTROY: Destroy = Destroy;
    static SAVE: Save = Save;
    static ALL_INSTANCES: AllInstances = AllInstances;

    let command: &'static dyn Command = match verb {
        "create" => &CREATE,
        "find" => &FIND,
        "build" => &BUILD,
        "find-or-create" => &FIND_OR_CREATE,
        "update" => &UPDATE,
        "assign-attributes" => &ASSIGN_ATTRIBUTES,
        "destroy" => &DESTROY,
        "save" => &SAVE,
        "all-instances" => &ALL_INSTANCES,
        _ => return None,
    };
    Some(command)
}

/// Runs `verb` with raw host arguments `[subject, payload]`.
///
/// # Errors
///
/// - `InvalidArgument` for an unknown verb or a vetoed payload
/// - `UnknownEntityType` when the type name is not registered
/// - `NotAllowed` when the class does not use the bridge
/// - whatever the host operation raises
pub fn invoke(registry: &Registry, verb: &str, args: Vec<Value>) -> Result<Value> {
    let command = lookup(verb)
        .ok_or_else(|| Error::invalid_argument(format!("unknown command: {}", verb)))?;
    dispatch(command, registry, args)
}

/// Runs an already looked-up command.
pub fn dispatch(command: &dyn Command, registry: &Registry, args: Vec<Value>) -> Result<Value> {
    let action = command.action_name();
    let mut args = args.into_iter();
    let subject = args.next().unwrap_or_default();
    let payload = args.next().unwrap_or_default();

    match command.target_kind() {
        TargetKind::Class => {
            let name = subject.to_string();
            let class = registry.find(&name).ok_or(Error::UnknownEntityType(name))?;
            ensure_allowed(action, &class)?;
            run(command, Target::Class(&class), payload)
        }
        TargetKind::Instance => {
            let entity = match subject {
                Value::Entity(entity) => entity,
                other => {
                    return Err(Error::invalid_argument(format!(
                        "{}: expected an entity, got {}",
                        action,
                        other.describe()
                    )))
                }
            };
            ensure_allowed(action, entity.class())?;
            run(command, Target::Instance(&entity), payload)
        }
    }
}

fn ensure_allowed(action: &str, class: &EntityClass) -> Result<()> {
    if class.uses_bridge() {
        Ok(())
    } else {
        log::debug!("Refused {} on {}: class does not use the bridge", action, class.name());
        Err(Error::not_allowed(action, class.name()))
    }
}

fn run(command: &dyn Command, target: Target<'_>, payload: Value) -> Result<Value> {
    let payload = command.veto(payload)?;
    let payload = command.sanitize(&target, payload)?;
    log::trace!("{} {} with {:?}", command.action_name(), target.class().name(), payload);
    command.doit(&target, payload)
}
