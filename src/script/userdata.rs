//! Lua userdata wrappers for entities and sequences.

use super::marshal::to_lua;
use crate::bridge::Bridge;
use crate::entity::EntityRef;
use crate::sequence::{SeqNode, Sequence};
use mlua::{AnyUserData, Lua, MetaMethod, UserData, UserDataMethods, Value as LuaValue};
use std::sync::Arc;

/// An entity as seen from Lua.
///
/// Indexing reads attributes through the resolver (`widget.name`,
/// `user.widgets`); `tostring` renders the inspection view; `==` compares
/// records.
pub struct LuaEntity {
    entity: EntityRef,
    bridge: Arc<Bridge>,
}

impl LuaEntity {
    pub(crate) fn new(entity: EntityRef, bridge: Arc<Bridge>) -> Self {
        Self { entity, bridge }
    }

    /// The wrapped entity.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }
}

impl UserData for LuaEntity {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            let value = this.bridge.resolve(&this.entity, &key).map_err(mlua::Error::external)?;
            to_lua(lua, &this.bridge, &value)
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(this.bridge.inspect(&this.entity))
        });

        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData<'_>| {
            let same = match other.borrow::<LuaEntity>() {
                Ok(other) => this.entity.same_record(&other.entity),
                Err(_) => false,
            };
            Ok(same)
        });
    }
}

/// A non-empty sequence node as seen from Lua.
pub struct LuaSequence {
    node: Arc<SeqNode>,
    bridge: Arc<Bridge>,
}

impl LuaSequence {
    /// The sequence starting at this node.
    pub fn sequence(&self) -> Sequence {
        Sequence::Node(Arc::clone(&self.node))
    }
}

/// Wraps a sequence for Lua; the empty sequence is `nil`.
pub(crate) fn sequence_to_lua<'lua>(
    lua: &'lua Lua,
    bridge: &Arc<Bridge>,
    sequence: Sequence,
) -> mlua::Result<LuaValue<'lua>> {
    match sequence {
        Sequence::Empty => Ok(LuaValue::Nil),
        Sequence::Node(node) => Ok(LuaValue::UserData(
            lua.create_userdata(LuaSequence { node, bridge: Arc::clone(bridge) })?,
        )),
    }
}

impl UserData for LuaSequence {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("head", |lua, this, ()| to_lua(lua, &this.bridge, this.node.head()));
        methods.add_method("tail", |lua, this, ()| {
            sequence_to_lua(lua, &this.bridge, this.node.tail().clone())
        });
        methods.add_method("size", |_, this, ()| Ok(this.node.size()));

        methods.add_method("current_page", |_, this, ()| {
            Ok(this.node.pagination().map(|p| p.current_page))
        });
        methods.add_method("per_page", |_, this, ()| Ok(this.node.pagination().map(|p| p.per_page)));
        methods.add_method("total_entries", |_, this, ()| {
            Ok(this.node.pagination().map(|p| p.total_entries))
        });
        methods.add_method("total_pages", |_, this, ()| {
            Ok(this.node.pagination().map(|p| p.total_pages()))
        });

        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.node.size()));
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData<'_>| {
            let same = match other.borrow::<LuaSequence>() {
                Ok(other) => Arc::ptr_eq(&this.node, &other.node),
                Err(_) => false,
            };
            Ok(same)
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("#<sequence size={}>", this.node.size()))
        });
    }
}
