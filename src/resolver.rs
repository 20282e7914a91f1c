//! Attribute resolution and the inspection view.
//!
//! `resolve` maps a symbolic attribute name read by a script onto a host
//! entity. Candidates are tried in a fixed order, first match wins:
//!
//! 1. a getter override registered on the class for the key
//! 2. the id, then a stored column
//! 3. a tag type of the class (`tags` reads `tag_list`)
//! 4. a declared association
//! 5. an attached-file slot (`<key>_file_name` is present)
//! 6. `unwrap`, the entity itself
//! 7. guarded dispatch: exposed procedures and whitelisted host methods
//!
//! Names are normalised first: `first-name` and `first_name` are the same key.

use crate::config::Options;
use crate::entity::{singularize, AssociationKind, EntityRef};
use crate::value::{Attachment, Value};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// An exposed procedure bound to the entity it was read from.
#[derive(Clone)]
pub struct BoundProcedure {
    entity: EntityRef,
    name: String,
}

impl BoundProcedure {
    /// The procedure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The receiving entity.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Calls the procedure. Exposure is checked again at call time.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let class = self.entity.class();
        if !class.uses_bridge() || !class.is_procedure(&self.name) {
            return Err(Error::not_allowed(format!("call {} on", self.name), class.name()));
        }
        let method = class.method(&self.name).ok_or_else(|| {
            Error::host(format!("undefined procedure `{}` for {}", self.name, class.name()))
        })?;
        method(&self.entity, args)
    }
}

impl PartialEq for BoundProcedure {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity) && self.name == other.name
    }
}

impl fmt::Debug for BoundProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<Procedure {}.{}>", self.entity.label(), self.name)
    }
}

/// Reads the attribute `name` of `entity`.
///
/// Unknown names are not an error of the resolver itself: they reach the
/// guarded dispatch, which refuses unexposed host methods with `NotAllowed`
/// and reports names it cannot find as `HostOperationFailed`.
pub fn resolve(entity: &EntityRef, name: &str) -> Result<Value> {
    let key = name.replace('-', "_");
    let class = entity.class();

    if let Some(getter) = class.getter(&key) {
        return getter(entity);
    }

    if key == "id" {
        return Ok(entity.id().map(Value::Int).unwrap_or_default());
    }
    if let Some(value) = entity.get(&key) {
        return Ok(value);
    }

    if class.tag_types().iter().any(|t| *t == key) {
        let list = format!("{}_list", singularize(&key));
        return Ok(entity.get(&list).unwrap_or_else(|| Value::List(Vec::new())));
    }

    if let Some(association) = class.association(&key) {
        let target = class.association_target(association)?;
        return match &association.kind {
            AssociationKind::BelongsTo { foreign_key } => match entity.get(foreign_key) {
                Some(Value::Int(id)) => match target.find(id) {
                    Ok(found) => Ok(Value::Entity(found)),
                    Err(Error::RecordNotFound { .. }) => Ok(Value::Null),
                    Err(e) => Err(e),
                },
                _ => Ok(Value::Null),
            },
            AssociationKind::HasMany { foreign_key } => match entity.id() {
                Some(id) => {
                    let relation = entity
                        .cached_relation(&key, || target.where_eq(foreign_key.clone(), Value::Int(id)));
                    Ok(Value::Relation(relation))
                }
                None => Ok(Value::Null),
            },
        };
    }

    let file_name_key = format!("{}_file_name", key);
    if entity.has_attribute(&file_name_key) {
        let text = |suffix: &str| match entity.get(&format!("{}_{}", key, suffix)) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        return Ok(Value::Attachment(Attachment {
            slot: key.clone(),
            file_name: text("file_name"),
            content_type: text("content_type"),
            file_size: entity.get(&format!("{}_file_size", key)).and_then(|v| v.as_int()),
        }));
    }

    if key == "unwrap" {
        return Ok(Value::Entity(Arc::clone(entity)));
    }

    guarded_send(entity, &key)
}

fn guarded_send(entity: &EntityRef, key: &str) -> Result<Value> {
    let class = entity.class();
    if class.is_procedure(key) {
        return Ok(Value::Procedure(BoundProcedure {
            entity: Arc::clone(entity),
            name: key.to_string(),
        }));
    }
    match class.method(key) {
        Some(method) if class.is_exposed(key) => method(entity, &[]),
        Some(_) => {
            log::debug!("Refused unexposed method {} on {}", key, class.name());
            Err(Error::not_allowed(format!("call {} on", key), class.name()))
        }
        None => Err(Error::host(format!("undefined attribute `{}` for {}", key, class.name()))),
    }
}

/// Renders the diagnostic view of an entity:
/// `(Class#id { key value key value })`.
///
/// Excluded keys and attributes still at their column default are left out.
pub fn inspect(entity: &EntityRef, options: &Options) -> String {
    let class = entity.class();
    let parts: Vec<String> = entity
        .attributes()
        .into_iter()
        .filter(|(key, _)| !options.inspect_exclude.iter().any(|x| x == key))
        .filter(|(key, value)| !is_default(entity, key, value))
        .map(|(key, value)| format!("{} {}", key, inspect_value(&value, options)))
        .collect();
    let id = entity.id().map(|id| id.to_string()).unwrap_or_default();
    format!("({}#{} {{ {} }})", class.name(), id, parts.join(" "))
}

fn is_default(entity: &EntityRef, key: &str, value: &Value) -> bool {
    let default = entity.class().column_default(key);
    *value == default || (default.is_null() && *value == Value::String(String::new()))
}

fn inspect_value(value: &Value, options: &Options) -> String {
    match value {
        Value::String(s) => format!("{:?}", truncate(s, options.inspect_max_len)),
        Value::Decimal(_) => format!("{:?}", value.to_f64().unwrap_or(f64::NAN)),
        Value::Entity(e) => inspect(e, options),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|v| inspect_value(v, options)).collect();
            format!("({})", items.join(" "))
        }
        other => format!("{:?}", other),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
