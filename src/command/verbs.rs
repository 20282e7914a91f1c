//! The verb table entries.

use super::{into_attrs, Command, Target, TargetKind};
use crate::entity::{EntityClass, EntityRef};
use crate::value::Value;
use crate::{Error, Result};
use std::sync::Arc;

fn class_target<'t>(action: &str, target: &'t Target<'_>) -> Result<&'t Arc<EntityClass>> {
    match target {
        Target::Class(class) => Ok(*class),
        Target::Instance(_) => Err(Error::invalid_argument(format!("{}: expected a type name", action))),
    }
}

fn instance_target<'t>(action: &str, target: &'t Target<'_>) -> Result<&'t EntityRef> {
    match target {
        Target::Instance(entity) => Ok(*entity),
        Target::Class(_) => Err(Error::invalid_argument(format!("{}: expected an entity", action))),
    }
}

/// `create`: construct and persist.
pub struct Create;

impl Command for Create {
    fn action_name(&self) -> &'static str {
        "create"
    }

    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let class = class_target(self.action_name(), target)?;
        Ok(Value::Entity(class.create(into_attrs(payload))?))
    }
}

/// Reads the integer prefix of `text` (after leading whitespace and an
/// optional sign); 0 when there is none, so `find` reports not-found.
fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    let magnitude = digits[..end].parse::<i64>().unwrap_or(0);
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// `find`: load by id.
pub struct Find;

impl Command for Find {
    fn action_name(&self) -> &'static str {
        "find"
    }

    fn veto(&self, payload: Value) -> Result<Value> {
        match payload {
            Value::Int(_) | Value::String(_) => Ok(payload),
            other => Err(Error::invalid_argument(format!(
                "find: expected int, got {}",
                other.describe()
            ))),
        }
    }

    fn sanitize(&self, _target: &Target<'_>, payload: Value) -> Result<Value> {
        match payload {
            Value::String(text) => Ok(Value::Int(leading_int(&text))),
            other => Ok(other),
        }
    }

    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let class = class_target(self.action_name(), target)?;
        let id = payload
            .as_int()
            .ok_or_else(|| Error::invalid_argument(format!("find: expected int, got {}", payload.describe())))?;
        Ok(Value::Entity(class.find(id)?))
    }
}

/// `build`: construct without persisting.
pub struct Build;

impl Command for Build {
    fn action_name(&self) -> &'static str {
        "build"
    }

    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let class = class_target(self.action_name(), target)?;
        Ok(Value::Entity(class.build(into_attrs(payload))?))
    }
}

/// `find-or-create`: first match on every given attribute, or a new record.
pub struct FindOrCreate;

impl Command for FindOrCreate {
    fn action_name(&self) -> &'static str {
        "find-or-create"
    }

    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let class = class_target(self.action_name(), target)?;
        Ok(Value::Entity(class.find_or_create(into_attrs(payload))?))
    }
}

/// `update`: assign and persist.
pub struct Update;

impl Command for Update {
    fn action_name(&self) -> &'static str {
        "update"
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::Instance
    }

    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let entity = instance_target(self.action_name(), target)?;
        entity.update(into_attrs(payload))?;
        Ok(Value::Entity(Arc::clone(entity)))
    }
}

/// `assign-attributes`: like `update`, restricted to keys the instance
/// already carries.
pub struct AssignAttributes;

impl Command for AssignAttributes {
    fn action_name(&self) -> &'static str {
        "assign-attributes"
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::Instance
    }

    fn sanitize(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let entity = instance_target(self.action_name(), target)?;
        let mut attrs = entity.class().sanitize(into_attrs(payload));
        attrs.retain(|key, _| {
            let known = entity.has_attribute(key);
            if !known {
                log::debug!("assign-attributes: dropping '{}' for {}", key, entity.label());
            }
            known
        });
        Ok(Value::Map(attrs))
    }

    fn doit(&self, target: &Target<'_>, payload: Value) -> Result<Value> {
        let entity = instance_target(self.action_name(), target)?;
        entity.update(into_attrs(payload))?;
        Ok(Value::Entity(Arc::clone(entity)))
    }
}

/// `destroy`: delete the persisted row.
pub struct Destroy;

impl Command for Destroy {
    fn action_name(&self) -> &'static str {
        "destroy"
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::Instance
    }

    fn veto(&self, payload: Value) -> Result<Value> {
        Ok(payload)
    }

    fn sanitize(&self, _target: &Target<'_>, payload: Value) -> Result<Value> {
        Ok(payload)
    }

    fn doit(&self, target: &Target<'_>, _payload: Value) -> Result<Value> {
        let entity = instance_target(self.action_name(), target)?;
        entity.destroy()?;
        Ok(Value::Entity(Arc::clone(entity)))
    }
}

/// `save`: persist the in-memory state.
pub struct Save;

impl Command for Save {
    fn action_name(&self) -> &'static str {
        "save"
    }

    fn target_kind(&self) -> TargetKind {
        TargetKind::Instance
    }

    fn veto(&self, payload: Value) -> Result<Value> {
        Ok(payload)
    }

    fn sanitize(&self, _target: &Target<'_>, payload: Value) -> Result<Value> {
        Ok(payload)
    }

    fn doit(&self, target: &Target<'_>, _payload: Value) -> Result<Value> {
        let entity = instance_target(self.action_name(), target)?;
        entity.save()?;
        Ok(Value::Entity(Arc::clone(entity)))
    }
}

/// `all-instances`: every persisted instance; the payload is ignored.
pub struct AllInstances;

impl Command for AllInstances {
    fn action_name(&self) -> &'static str {
        "all-instances"
    }

    fn veto(&self, _payload: Value) -> Result<Value> {
        Ok(Value::Null)
    }

    fn sanitize(&self, _target: &Target<'_>, payload: Value) -> Result<Value> {
        Ok(payload)
    }

    fn doit(&self, target: &Target<'_>, _payload: Value) -> Result<Value> {
        let class = class_target(self.action_name(), target)?;
        Ok(Value::Relation(class.all()))
    }
}
