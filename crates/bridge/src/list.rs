//! `ListProxy`: a Lua view of a repeated field.
//!
//! Lua sees 1-based indices; storage is 0-based. Elements cannot be assigned
//! through the proxy; replace the whole field through the owning message.

use std::cell::RefCell;

use mlua::{
    Function, Lua, MetaMethod, MultiValue, Result as LuaResult, UserData, UserDataMethods,
    Value as LuaValue,
};
use prost_reflect::{FieldDescriptor, Value};

use crate::handle::{MessageHandle, Slot};
use crate::value::{self, kind_name, lua_integer, Peeked, Place};

#[derive(Clone)]
pub struct ListProxy {
    owner: MessageHandle,
    field: FieldDescriptor,
    read_only: bool,
}

impl ListProxy {
    pub(crate) fn new(owner: MessageHandle, field: FieldDescriptor, read_only: bool) -> Self {
        Self {
            owner,
            field,
            read_only,
        }
    }

    /// The repeated field this list belongs to.
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn read_only(&self) -> Self {
        Self::new(self.owner.clone(), self.field.clone(), true)
    }

    pub fn len(&self) -> usize {
        self.owner
            .read(|msg| msg.get_field(&self.field).as_list().map_or(0, <[Value]>::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current elements.
    pub fn snapshot(&self) -> Vec<Value> {
        match self.owner.field_snapshot(&self.field) {
            Value::List(items) => items,
            _ => Vec::new(),
        }
    }

    /// Element at 1-based `index`; nil outside `[1, len]`.
    pub fn get(&self, lua: &Lua, index: i64) -> LuaResult<LuaValue> {
        let Some(pos) = usize::try_from(index).ok().and_then(|i| i.checked_sub(1)) else {
            return Ok(LuaValue::Nil);
        };
        let peeked = self.owner.read(|msg| {
            msg.get_field(&self.field)
                .as_list()
                .and_then(|items| items.get(pos))
                .map(value::peek)
        });
        match peeked {
            Some(peeked) => self.element_to_lua(lua, pos, peeked),
            None => Ok(LuaValue::Nil),
        }
    }

    /// A fresh traversal positioned before the first element.
    pub fn enumerate(&self) -> ListEnumeration {
        ListEnumeration {
            list: self.clone(),
            next: 0,
        }
    }

    fn element_to_lua(&self, lua: &Lua, pos: usize, peeked: Peeked) -> LuaResult<LuaValue> {
        let place = Place {
            owner: &self.owner,
            field: &self.field,
            slot: Slot::Index(pos),
        };
        value::to_lua(lua, place, peeked, self.read_only)
    }

    /// Generic-for iterator triple over this list, stepping a fresh
    /// enumeration. The control value is ignored.
    fn pairs(&self, lua: &Lua) -> LuaResult<(Function, LuaValue, LuaValue)> {
        let enumeration = RefCell::new(self.enumerate());
        let step = lua.create_function(move |lua, _: MultiValue| {
            match enumeration.borrow_mut().next_pair(lua)? {
                Some((index, item)) => Ok((LuaValue::Integer(index), item)),
                None => Ok((LuaValue::Nil, LuaValue::Nil)),
            }
        })?;
        Ok((step, LuaValue::Nil, LuaValue::Nil))
    }
}

/// Synchronous pull over a list, reading the live list at each step.
pub struct ListEnumeration {
    list: ListProxy,
    next: usize,
}

impl ListEnumeration {
    /// Next `(1-based index, element)` pair.
    pub fn next_pair(&mut self, lua: &Lua) -> LuaResult<Option<(i64, LuaValue)>> {
        let pos = self.next;
        let peeked = self.list.owner.read(|msg| {
            msg.get_field(&self.list.field)
                .as_list()
                .and_then(|items| items.get(pos))
                .map(value::peek)
        });
        let Some(peeked) = peeked else {
            return Ok(None);
        };
        self.next += 1;
        let element = self.list.element_to_lua(lua, pos, peeked)?;
        Ok(Some((pos as i64 + 1, element)))
    }
}

impl UserData for ListProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // Range() is pairs() spelled as a method, for symmetry with maps.
        methods.add_method("Range", |lua, this, ()| this.pairs(lua));
        methods.add_method("IsReadOnly", |_, this, ()| Ok(this.is_read_only()));
        methods.add_method("ReadOnly", |_, this, ()| Ok(this.read_only()));

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: LuaValue| {
            match lua_integer(&key) {
                Some(index) => this.get(lua, index),
                None => Ok(LuaValue::Nil),
            }
        });
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.len()));
        methods.add_meta_method(MetaMethod::Pairs, |lua, this, ()| this.pairs(lua));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("proto.List<{}>", kind_name(&this.field.kind())))
        });
    }
}
