//! Host-side values exchanged between the bridge and the entity layer.
//!
//! `Value` is what attribute maps hold and what every command returns.
//! Plain data variants are serializable (rows are stored encoded); the
//! handle variants (`Entity`, `Relation`, `Attachment`, `Procedure`) live
//! only in memory and refuse serialization.

use crate::entity::{EntityRef, Relation};
use crate::resolver::BoundProcedure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A named set of attribute values.
pub type Attributes = BTreeMap<String, Value>;

/// A host value.
// Handle variants must stay last so the serialized variant indices of the
// data variants do not depend on them.
#[derive(Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value (`nil` in Lua).
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A precise decimal kept in its textual form.
    Decimal(String),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(Attributes),
    /// A live host entity.
    #[serde(skip)]
    Entity(EntityRef),
    /// A lazily evaluated collection of entities.
    #[serde(skip)]
    Relation(Arc<Relation>),
    /// An attached-file slot of an entity.
    #[serde(skip)]
    Attachment(Attachment),
    /// An exposed entity procedure, callable with arguments.
    #[serde(skip)]
    Procedure(BoundProcedure),
}

/// An attached-file slot, read from the `<slot>_file_name`,
/// `<slot>_content_type` and `<slot>_file_size` companion attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// The slot name (e.g. `avatar`).
    pub slot: String,
    /// The stored file name, if a file is attached.
    pub file_name: Option<String>,
    /// The stored content type.
    pub content_type: Option<String>,
    /// The stored size in bytes.
    pub file_size: Option<i64>,
}

impl Attachment {
    /// Returns true when a file is attached to the slot.
    pub fn is_present(&self) -> bool {
        self.file_name.is_some()
    }
}

impl Value {
    /// Short name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Entity(_) => "entity",
            Value::Relation(_) => "relation",
            Value::Attachment(_) => "attachment",
            Value::Procedure(_) => "procedure",
        }
    }

    /// Describes the value as `<type> : <debug form>` for veto messages.
    pub fn describe(&self) -> String {
        format!("{} : {:?}", self.type_name(), self)
    }

    /// Returns true for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string slice of a `Value::String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer of a `Value::Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the entity handle of a `Value::Entity`.
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// Numeric form of `Int`, `Float` and `Decimal` values.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.trim().parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a.same_record(b),
            (Value::Relation(a), Value::Relation(b)) => Arc::ptr_eq(a, b),
            (Value::Attachment(a), Value::Attachment(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Decimal(d) => write!(f, "{}d", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Entity(e) => write!(f, "#<{}>", e.label()),
            Value::Relation(r) => write!(f, "#<Relation {}>", r.class().name()),
            Value::Attachment(a) => write!(f, "#<Attachment {}>", a.slot),
            Value::Procedure(p) => write!(f, "#<Procedure {}>", p.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Decimal(d) => write!(f, "{}", d),
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Attributes> for Value {
    fn from(map: Attributes) -> Self {
        Value::Map(map)
    }
}

impl From<EntityRef> for Value {
    fn from(entity: EntityRef) -> Self {
        Value::Entity(entity)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Builds an attribute map from a JSON object; other JSON values yield an
/// empty map.
pub fn attrs(json: serde_json::Value) -> Attributes {
    match Value::from(json) {
        Value::Map(map) => map,
        _ => Attributes::new(),
    }
}
