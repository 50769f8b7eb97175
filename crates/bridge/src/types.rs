//! Schema handles exposed to Lua: message types and fields.
//!
//! Both compare by full name, so handles obtained independently (from an
//! instance, from the registry, from another pool) for the same schema
//! element are equal.

use mlua::{MetaMethod, UserData, UserDataMethods, Value as LuaValue};
use prost_reflect::{FieldDescriptor, MessageDescriptor};

use crate::value::lua_integer;

/// A message type.
#[derive(Clone, Debug)]
pub struct TypeProxy {
    descriptor: MessageDescriptor,
}

impl TypeProxy {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn equal(&self, other: &TypeProxy) -> bool {
        self.descriptor.full_name() == other.descriptor.full_name()
    }

    /// Field by name or number.
    pub fn field(&self, key: &LuaValue) -> Option<FieldHandle> {
        let field = match key {
            LuaValue::String(s) => {
                let name = String::from_utf8_lossy(&s.as_bytes()).into_owned();
                self.descriptor.get_field_by_name(&name)
            }
            other => lua_integer(other)
                .and_then(|n| u32::try_from(n).ok())
                .and_then(|n| self.descriptor.get_field(n)),
        };
        field.map(FieldHandle::new)
    }
}

impl UserData for TypeProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("FullName", |_, this, ()| Ok(this.descriptor.full_name().to_string()));
        methods.add_method("Name", |_, this, ()| Ok(this.descriptor.name().to_string()));
        methods.add_method("Field", |_, this, key: LuaValue| Ok(this.field(&key)));

        methods.add_meta_function(MetaMethod::Eq, |_, (lhs, rhs): (LuaValue, LuaValue)| {
            let as_type = |v: &LuaValue| {
                v.as_userdata()
                    .and_then(|ud| ud.borrow::<TypeProxy>().ok().map(|t| (*t).clone()))
            };
            Ok(match (as_type(&lhs), as_type(&rhs)) {
                (Some(a), Some(b)) => a.equal(&b),
                _ => false,
            })
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("proto.Type<{}>", this.descriptor.full_name()))
        });
    }
}

/// A field of a message type, usable as a message key.
#[derive(Clone, Debug)]
pub struct FieldHandle {
    descriptor: FieldDescriptor,
}

impl FieldHandle {
    pub fn new(descriptor: FieldDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }
}

impl UserData for FieldHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("Name", |_, this, ()| Ok(this.descriptor.name().to_string()));
        methods.add_method("FullName", |_, this, ()| Ok(this.descriptor.full_name().to_string()));
        methods.add_method("Number", |_, this, ()| Ok(this.descriptor.number()));

        methods.add_meta_function(MetaMethod::Eq, |_, (lhs, rhs): (LuaValue, LuaValue)| {
            let full_name = |v: &LuaValue| {
                v.as_userdata().and_then(|ud| {
                    ud.borrow::<FieldHandle>()
                        .ok()
                        .map(|f| f.descriptor.full_name().to_string())
                })
            };
            Ok(match (full_name(&lhs), full_name(&rhs)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            })
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("proto.Field<{}>", this.descriptor.full_name()))
        });
    }
}
