//! `MessageProxy`: a Lua view of one protobuf message.

use mlua::{
    AnyUserData, Lua, MetaMethod, Result as LuaResult, UserData, UserDataMethods,
    Value as LuaValue, Variadic,
};
use prost::Message as _;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, MessageDescriptor, ReflectMessage, Value,
};

use crate::error::ProtoError;
use crate::handle::{MessageHandle, SharedMessage};
use crate::map::MapProxy;
use crate::types::{FieldHandle, TypeProxy};
use crate::value::{self, kind_name, lua_integer, value_kind_name, Peeked, Place};

/// A field key as scripts supply it, resolved against a message schema.
pub(crate) enum FieldKey {
    Field(FieldDescriptor),
    /// Name or number not in the schema.
    Missing(String),
    /// A field handle belonging to another message type.
    Foreign(FieldDescriptor),
    /// A Lua value that cannot name a field at all.
    Invalid(&'static str),
}

/// A (possibly read-only) view of a message.
///
/// Several proxies may view the same instance; mutability belongs to the view.
#[derive(Clone)]
pub struct MessageProxy {
    handle: MessageHandle,
    read_only: bool,
}

impl MessageProxy {
    /// Mutable view of a new root instance.
    pub fn new(msg: DynamicMessage) -> Self {
        Self::from_handle(MessageHandle::new(msg), false)
    }

    /// Mutable view of an instance the host shares with the script.
    pub fn from_shared(root: SharedMessage) -> Self {
        Self::from_handle(MessageHandle::from_shared(root), false)
    }

    pub(crate) fn from_handle(handle: MessageHandle, read_only: bool) -> Self {
        Self { handle, read_only }
    }

    pub fn handle(&self) -> &MessageHandle {
        &self.handle
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        self.handle.descriptor()
    }

    pub fn full_name(&self) -> &str {
        self.descriptor().full_name()
    }

    pub fn name(&self) -> &str {
        self.descriptor().name()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read-only view of the same instance.
    pub fn read_only(&self) -> Self {
        Self::from_handle(self.handle.clone(), true)
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> DynamicMessage {
        self.handle.snapshot()
    }

    pub(crate) fn resolve(&self, key: &LuaValue) -> FieldKey {
        let desc = self.descriptor();
        match key {
            LuaValue::String(s) => {
                let name = String::from_utf8_lossy(&s.as_bytes()).into_owned();
                match desc.get_field_by_name(&name) {
                    Some(field) => FieldKey::Field(field),
                    None => FieldKey::Missing(name),
                }
            }
            LuaValue::Integer(_) | LuaValue::Number(_) => {
                let field = lua_integer(key)
                    .and_then(|n| u32::try_from(n).ok())
                    .and_then(|n| desc.get_field(n));
                match field {
                    Some(field) => FieldKey::Field(field),
                    None => FieldKey::Missing(match key {
                        LuaValue::Integer(n) => n.to_string(),
                        LuaValue::Number(n) => n.to_string(),
                        _ => String::new(),
                    }),
                }
            }
            LuaValue::UserData(ud) => match ud.borrow::<FieldHandle>() {
                Ok(handle) => {
                    let field = handle.descriptor().clone();
                    if field.parent_message().full_name() == desc.full_name() {
                        // Re-resolve so the descriptor belongs to this message's pool.
                        match desc.get_field(field.number()) {
                            Some(own) => FieldKey::Field(own),
                            None => FieldKey::Foreign(field),
                        }
                    } else {
                        FieldKey::Foreign(field)
                    }
                }
                Err(_) => FieldKey::Invalid("userdata"),
            },
            other => FieldKey::Invalid(other.type_name()),
        }
    }

    /// Value of the field named by `key`; nil for unknown keys and unset
    /// fields with explicit presence.
    pub fn get(&self, lua: &Lua, key: &LuaValue) -> LuaResult<LuaValue> {
        let FieldKey::Field(field) = self.resolve(key) else {
            return Ok(LuaValue::Nil);
        };
        match self.peek_field(&field) {
            Some(peeked) => value::to_lua(lua, Place::field(&self.handle, &field), peeked, self.read_only),
            None => Ok(LuaValue::Nil),
        }
    }

    /// Assign `value` to the field named by `key`. Nil clears fields that
    /// support it.
    pub fn set(&self, key: &LuaValue, value: &LuaValue) -> Result<(), ProtoError> {
        if self.read_only {
            return Err(ProtoError::ReadOnlyViolation {
                target: format!("message {}", self.full_name()),
            });
        }
        let field = match self.resolve(key) {
            FieldKey::Field(field) => field,
            FieldKey::Missing(name) => {
                return Err(ProtoError::NoSuchField {
                    message: self.full_name().to_string(),
                    field: name,
                })
            }
            FieldKey::Foreign(field) => {
                return Err(ProtoError::DescriptorMismatch {
                    field: field.full_name().to_string(),
                    message: self.full_name().to_string(),
                })
            }
            FieldKey::Invalid(type_name) => {
                return Err(ProtoError::InvalidArgument(format!("bad index type {type_name}")))
            }
        };

        if value.is_nil() {
            if field.supports_presence() || field.is_list() || field.is_map() {
                return self.handle.write(|msg| msg.clear_field(&field));
            }
            return Err(ProtoError::Presence {
                field: field.name().to_string(),
            });
        }

        // Convert before borrowing: the source may view this same instance.
        let converted = value::from_lua(&field, value)?;
        self.handle
            .write(|msg| msg.try_set_field(&field, converted))?
            .map_err(|e| ProtoError::TypeMismatch {
                field: field.name().to_string(),
                detail: e.to_string(),
            })
    }

    /// Presence of `keys[0]`, then of `keys[1]` within that field's value, and
    /// so on.
    pub fn has(&self, keys: &[LuaValue]) -> Result<bool, ProtoError> {
        let Some((key, rest)) = keys.split_first() else {
            return Err(ProtoError::InvalidArgument("Has expects at least one key".into()));
        };
        let field = match self.resolve(key) {
            FieldKey::Field(field) => field,
            FieldKey::Missing(_) => return Ok(false),
            FieldKey::Foreign(field) => {
                return Err(ProtoError::DescriptorMismatch {
                    field: field.full_name().to_string(),
                    message: self.full_name().to_string(),
                })
            }
            FieldKey::Invalid(type_name) => {
                return Err(ProtoError::InvalidArgument(format!(
                    "invalid field spec type '{type_name}'"
                )))
            }
        };
        let peeked = self.handle.read(|msg| msg.has_field(&field).then(|| value::peek(&msg.get_field(&field))));
        match peeked {
            None => Ok(false),
            Some(_) if rest.is_empty() => Ok(true),
            Some(peeked) => has_within(Place::field(&self.handle, &field), peeked, rest),
        }
    }

    /// Deep structural equality with `other`.
    pub fn equal(&self, other: &MessageProxy) -> bool {
        let lhs = self.snapshot();
        let rhs = other.snapshot();
        messages_equal(&lhs, &rhs)
    }

    /// Wire-format encoding of the current contents.
    pub fn marshal(&self) -> Vec<u8> {
        self.handle.read(|msg| msg.encode_to_vec())
    }

    fn peek_field(&self, field: &FieldDescriptor) -> Option<Peeked> {
        self.handle.read(|msg| {
            if field.supports_presence() && !msg.has_field(field) {
                None
            } else {
                Some(value::peek(&msg.get_field(field)))
            }
        })
    }
}

/// Continue a `Has` chain into the value at `place`, viewed read-only.
pub(crate) fn has_within(place: Place<'_>, peeked: Peeked, rest: &[LuaValue]) -> Result<bool, ProtoError> {
    match peeked {
        Peeked::Message(desc) => {
            let handle = place.owner.child(place.field, place.slot, desc);
            MessageProxy::from_handle(handle, true).has(rest)
        }
        Peeked::Map => MapProxy::new(place.owner.clone(), place.field.clone(), true).has(rest),
        Peeked::List => Err(ProtoError::NotAggregate {
            found: format!("list of {}", kind_name(&place.field.kind())),
        }),
        Peeked::Scalar(v) => Err(ProtoError::NotAggregate {
            found: value_kind_name(&v).to_string(),
        }),
    }
}

/// Structural equality by type name and field contents.
///
/// Unset fields compare equal to fields explicitly set to their default, and
/// two instances of the same type from different registries compare by value.
pub(crate) fn messages_equal(lhs: &DynamicMessage, rhs: &DynamicMessage) -> bool {
    let lhs_desc = lhs.descriptor();
    let rhs_desc = rhs.descriptor();
    if lhs_desc.full_name() != rhs_desc.full_name() {
        return false;
    }
    let equal = lhs_desc.fields().all(|field| {
        let Some(other) = rhs_desc.get_field(field.number()) else {
            return !lhs.has_field(&field);
        };
        if field.supports_presence() && lhs.has_field(&field) != rhs.has_field(&other) {
            return false;
        }
        values_equal(&lhs.get_field(&field), &rhs.get_field(&other))
    });
    equal
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Message(a), Value::Message(b)) => messages_equal(a, b),
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, x)| b.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => lhs == rhs,
    }
}

impl UserData for MessageProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // ====================================================================
        // Has(key, ...) -> presence of a field (and of keys within it)
        // ====================================================================
        methods.add_method("Has", |_, this, keys: Variadic<LuaValue>| Ok(this.has(&keys)?));

        // ====================================================================
        // Marshal(options?) -> wire-format bytes as a string
        // ====================================================================
        methods.add_method("Marshal", |lua, this, options: LuaValue| {
            if !options.is_nil() {
                return Err(ProtoError::Unimplemented("marshalling with options".into()).into());
            }
            lua.create_string(this.marshal())
        });

        methods.add_method("Type", |_, this, ()| Ok(TypeProxy::new(this.descriptor().clone())));
        methods.add_method("FullName", |_, this, ()| Ok(this.full_name().to_string()));
        methods.add_method("Name", |_, this, ()| Ok(this.name().to_string()));
        methods.add_method("IsReadOnly", |_, this, ()| Ok(this.is_read_only()));
        methods.add_method("ReadOnly", |_, this, ()| Ok(this.read_only()));

        // ====================================================================
        // Metamethods
        // ====================================================================
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: LuaValue| this.get(lua, &key));

        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, value): (LuaValue, LuaValue)| Ok(this.set(&key, &value)?),
        );

        methods.add_meta_function(MetaMethod::Eq, |_, (lhs, rhs): (LuaValue, LuaValue)| {
            let (Some(lhs), Some(rhs)) = (as_message(&lhs), as_message(&rhs)) else {
                return Ok(false);
            };
            Ok(lhs.equal(&rhs))
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            let suffix = if this.read_only { " (read-only)" } else { "" };
            Ok(format!("proto.Message<{}>{suffix}", this.full_name()))
        });
    }
}

/// The message proxy inside a Lua value, if there is one.
pub(crate) fn as_message(value: &LuaValue) -> Option<MessageProxy> {
    value
        .as_userdata()
        .and_then(|ud: &AnyUserData| ud.borrow::<MessageProxy>().ok().map(|p| (*p).clone()))
}
