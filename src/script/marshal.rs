//! Conversion between host values and Lua values.
//!
//! | host                | Lua                                      |
//! |---------------------|------------------------------------------|
//! | `Null`              | `nil`                                    |
//! | `Int` / `Float`     | integer / number                         |
//! | `Decimal`           | number                                   |
//! | `List` / `Map`      | table (1-based array / string keys)      |
//! | `Entity`            | entity userdata                          |
//! | `Relation`          | sequence userdata, `nil` when empty      |
//! | `Attachment`        | table of file metadata                   |
//! | `Procedure`         | function                                 |

use super::userdata::{sequence_to_lua, LuaEntity, LuaSequence};
use crate::bridge::Bridge;
use crate::sequence::Sequence;
use crate::value::{Attachment, Attributes, Value};
use mlua::{Lua, MultiValue, Table, Value as LuaValue};
use std::sync::Arc;

/// Deepest table nesting accepted from scripts.
const MAX_DEPTH: usize = 32;

/// Converts a host value for use in `lua`.
pub fn to_lua<'lua>(lua: &'lua Lua, bridge: &Arc<Bridge>, value: &Value) -> mlua::Result<LuaValue<'lua>> {
    let converted = match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Int(i) => LuaValue::Integer(*i),
        Value::Float(x) => LuaValue::Number(*x),
        Value::Decimal(_) => LuaValue::Number(value.to_f64().unwrap_or(f64::NAN)),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::List(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, to_lua(lua, bridge, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Map(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.raw_set(key.as_str(), to_lua(lua, bridge, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Entity(entity) => {
            LuaValue::UserData(lua.create_userdata(LuaEntity::new(Arc::clone(entity), Arc::clone(bridge)))?)
        }
        Value::Relation(relation) => {
            let sequence = relation.to_sequence().map_err(mlua::Error::external)?;
            sequence_to_lua(lua, bridge, sequence)?
        }
        Value::Attachment(attachment) => LuaValue::Table(attachment_table(lua, attachment)?),
        Value::Procedure(procedure) => {
            let procedure = procedure.clone();
            let bridge = Arc::clone(bridge);
            let function = lua.create_function(move |lua, args: MultiValue<'_>| {
                let args = args.into_iter().map(from_lua).collect::<mlua::Result<Vec<_>>>()?;
                let result = procedure.call(&args).map_err(mlua::Error::external)?;
                to_lua(lua, &bridge, &result)
            })?;
            LuaValue::Function(function)
        }
    };
    Ok(converted)
}

fn attachment_table<'lua>(lua: &'lua Lua, attachment: &Attachment) -> mlua::Result<Table<'lua>> {
    let table = lua.create_table()?;
    table.set("slot", attachment.slot.as_str())?;
    table.set("file_name", attachment.file_name.as_deref())?;
    table.set("content_type", attachment.content_type.as_deref())?;
    table.set("file_size", attachment.file_size)?;
    table.set("present", attachment.is_present())?;
    Ok(table)
}

/// Converts a Lua value into a host value.
///
/// Tables whose keys are exactly `1..n` become lists, every other table a
/// map keyed by string. Entity userdata converts back to its entity and
/// sequence userdata to the list of its remaining elements.
pub fn from_lua(value: LuaValue<'_>) -> mlua::Result<Value> {
    convert(value, 0)
}

fn convert(value: LuaValue<'_>, depth: usize) -> mlua::Result<Value> {
    match value {
        LuaValue::Nil => Ok(Value::Null),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::Int(i)),
        LuaValue::Number(x) => Ok(Value::Float(x)),
        LuaValue::String(s) => Ok(Value::String(s.to_str()?.to_string())),
        LuaValue::Table(table) => table_to_value(table, depth),
        LuaValue::UserData(ud) => {
            if let Ok(entity) = ud.borrow::<LuaEntity>() {
                return Ok(Value::Entity(Arc::clone(entity.entity())));
            }
            if let Ok(sequence) = ud.borrow::<LuaSequence>() {
                let sequence: Sequence = sequence.sequence();
                return Ok(Value::List(sequence.iter().collect()));
            }
            Err(unconvertible("userdata"))
        }
        other => Err(unconvertible(other.type_name())),
    }
}

fn table_to_value(table: Table<'_>, depth: usize) -> mlua::Result<Value> {
    if depth >= MAX_DEPTH {
        return Err(mlua::Error::RuntimeError(format!(
            "table nesting deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let len = table.raw_len();
    let mut entries = Vec::new();
    for pair in table.clone().pairs::<LuaValue<'_>, LuaValue<'_>>() {
        entries.push(pair?);
    }

    if len > 0 && entries.len() == len {
        let mut items = Vec::with_capacity(len);
        for item in table.sequence_values::<LuaValue<'_>>() {
            items.push(convert(item?, depth + 1)?);
        }
        return Ok(Value::List(items));
    }

    let mut map = Attributes::new();
    for (key, item) in entries {
        let key = match key {
            LuaValue::String(s) => s.to_str()?.to_string(),
            LuaValue::Integer(i) => i.to_string(),
            other => {
                return Err(mlua::Error::FromLuaConversionError {
                    from: other.type_name(),
                    to: "attribute name",
                    message: Some("table keys must be strings".to_string()),
                })
            }
        };
        map.insert(key, convert(item, depth + 1)?);
    }
    Ok(Value::Map(map))
}

fn unconvertible(from: &'static str) -> mlua::Error {
    mlua::Error::FromLuaConversionError { from, to: "host value", message: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::entity::Registry;
    use crate::value::attrs;
    use serde_json::json;

    fn bridge() -> Arc<Bridge> {
        Bridge::new(Registry::in_memory(), Options::default()).unwrap()
    }

    #[test]
    fn test_primitives_cross_unchanged() {
        let lua = Lua::new();
        let bridge = bridge();
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-7),
            Value::Float(2.5),
            Value::from("text"),
        ] {
            let back = from_lua(to_lua(&lua, &bridge, &value).unwrap()).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_tables() {
        let lua = Lua::new();
        let list: LuaValue<'_> = lua.load("return {1, 'two', {x = 3}}").eval().unwrap();
        assert_eq!(
            from_lua(list).unwrap(),
            Value::List(vec![
                Value::Int(1),
                Value::from("two"),
                Value::Map(attrs(json!({"x": 3}))),
            ])
        );

        let empty: LuaValue<'_> = lua.load("return {}").eval().unwrap();
        assert_eq!(from_lua(empty).unwrap(), Value::Map(Attributes::new()));

        let sparse: LuaValue<'_> = lua.load("return {[1] = 'a', [3] = 'c'}").eval().unwrap();
        let Value::Map(map) = from_lua(sparse).unwrap() else { panic!("expected map") };
        assert_eq!(map.get("3"), Some(&Value::from("c")));
    }

    #[test]
    fn test_decimal_becomes_number() {
        let lua = Lua::new();
        let value = to_lua(&lua, &bridge(), &Value::Decimal("1.25".into())).unwrap();
        assert_eq!(from_lua(value).unwrap(), Value::Float(1.25));
    }

    #[test]
    fn test_functions_do_not_convert() {
        let lua = Lua::new();
        let f: LuaValue<'_> = lua.load("return function() end").eval().unwrap();
        assert!(from_lua(f).is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let lua = Lua::new();
        let deep: LuaValue<'_> = lua
            .load("local t = {} for _ = 1, 40 do t = {t} end return t")
            .eval()
            .unwrap();
        assert!(from_lua(deep).is_err());
    }
}
