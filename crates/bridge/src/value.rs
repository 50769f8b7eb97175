//! Conversion between reflective protobuf values and Lua values.
//!
//! | protobuf kind                      | Lua                      |
//! |------------------------------------|--------------------------|
//! | bool                               | boolean                  |
//! | (s|u)(fixed)int32/64, enum         | integer                  |
//! | float, double                      | number                   |
//! | string, bytes                      | string (raw bytes)       |
//! | message                            | `MessageProxy` userdata  |
//! | repeated                           | `ListProxy` userdata     |
//! | map                                | `MapProxy` userdata      |
//!
//! The reverse direction is validated against the target field: there is no
//! implicit conversion between kinds, 32-bit kinds are range-checked, and
//! aggregates must come from a proxy with the same element/key/value types.

use mlua::{Lua, Result as LuaResult, Value as LuaValue};
use prost::Message as _;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value,
};

use crate::error::ProtoError;
use crate::handle::{MessageHandle, Slot};
use crate::list::ListProxy;
use crate::map::MapProxy;
use crate::message::MessageProxy;
use crate::types::{FieldHandle, TypeProxy};

/// Where a value being converted lives, so aggregates can be proxied in place.
pub(crate) struct Place<'a> {
    pub owner: &'a MessageHandle,
    pub field: &'a FieldDescriptor,
    pub slot: Slot,
}

impl<'a> Place<'a> {
    pub fn field(owner: &'a MessageHandle, field: &'a FieldDescriptor) -> Self {
        Self {
            owner,
            field,
            slot: Slot::Whole,
        }
    }
}

// ============================================================================
// protobuf -> Lua
// ============================================================================

/// What a reflective value looks like from the outside.
///
/// Scalars are copied out; aggregates are only described, so the caller can
/// release its borrow of the backing instance before building a proxy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Peeked {
    Scalar(Value),
    Message(MessageDescriptor),
    List,
    Map,
}

pub(crate) fn peek(value: &Value) -> Peeked {
    match value {
        Value::Message(m) => Peeked::Message(m.descriptor()),
        Value::List(_) => Peeked::List,
        Value::Map(_) => Peeked::Map,
        scalar => Peeked::Scalar(scalar.clone()),
    }
}

/// Convert a value found at `place` to a Lua value.
///
/// Aggregates become proxies over the same backing instance, carrying
/// `read_only` so a read-only view never hands out a mutable one.
pub(crate) fn to_lua(lua: &Lua, place: Place<'_>, value: Peeked, read_only: bool) -> LuaResult<LuaValue> {
    let converted = match value {
        Peeked::Scalar(scalar) => scalar_to_lua(lua, &scalar)?,
        Peeked::Message(desc) => {
            let handle = place.owner.child(place.field, place.slot, desc);
            LuaValue::UserData(lua.create_userdata(MessageProxy::from_handle(handle, read_only))?)
        }
        Peeked::List => LuaValue::UserData(lua.create_userdata(ListProxy::new(
            place.owner.clone(),
            place.field.clone(),
            read_only,
        ))?),
        Peeked::Map => LuaValue::UserData(lua.create_userdata(MapProxy::new(
            place.owner.clone(),
            place.field.clone(),
            read_only,
        ))?),
    };
    Ok(converted)
}

fn scalar_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    Ok(match value {
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::I32(i) => LuaValue::Integer(i64::from(*i)),
        Value::I64(i) => LuaValue::Integer(*i),
        Value::U32(u) => LuaValue::Integer(i64::from(*u)),
        // Two's-complement reinterpretation, matching the write side.
        Value::U64(u) => LuaValue::Integer(*u as i64),
        Value::F32(f) => LuaValue::Number(f64::from(*f)),
        Value::F64(f) => LuaValue::Number(*f),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Bytes(b) => LuaValue::String(lua.create_string(b)?),
        Value::EnumNumber(n) => LuaValue::Integer(i64::from(*n)),
        Value::Message(_) | Value::List(_) | Value::Map(_) => LuaValue::Nil,
    })
}

/// Short name of a value's kind, for error messages.
pub(crate) fn value_kind_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::I32(_) => "int32",
        Value::I64(_) => "int64",
        Value::U32(_) => "uint32",
        Value::U64(_) => "uint64",
        Value::F32(_) => "float",
        Value::F64(_) => "double",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::EnumNumber(_) => "enum",
        Value::Message(_) => "message",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

/// Map keys are immutable scalars; they never need a place.
pub(crate) fn key_to_lua(lua: &Lua, key: &MapKey) -> LuaResult<LuaValue> {
    Ok(match key {
        MapKey::Bool(b) => LuaValue::Boolean(*b),
        MapKey::I32(i) => LuaValue::Integer(i64::from(*i)),
        MapKey::I64(i) => LuaValue::Integer(*i),
        MapKey::U32(u) => LuaValue::Integer(i64::from(*u)),
        MapKey::U64(u) => LuaValue::Integer(*u as i64),
        MapKey::String(s) => LuaValue::String(lua.create_string(s)?),
    })
}

// ============================================================================
// Lua -> protobuf
// ============================================================================

/// Convert a Lua value into a value assignable to `field`.
pub(crate) fn from_lua(field: &FieldDescriptor, value: &LuaValue) -> Result<Value, ProtoError> {
    if field.is_map() {
        map_from_lua(field, value)
    } else if field.is_list() {
        list_from_lua(field, value)
    } else {
        kind_from_lua(field.name(), &field.kind(), value)
    }
}

/// Convert a Lua key into a key of the map's declared key kind.
///
/// `None` when the Lua type does not match or the number does not fit; a
/// lookup with such a key simply finds nothing.
pub(crate) fn key_from_lua(key_kind: &Kind, value: &LuaValue) -> Option<MapKey> {
    match key_kind {
        Kind::Bool => match value {
            LuaValue::Boolean(b) => Some(MapKey::Bool(*b)),
            _ => None,
        },
        Kind::String => match value {
            LuaValue::String(s) => String::from_utf8(s.as_bytes().to_vec()).ok().map(MapKey::String),
            _ => None,
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            lua_integer(value).and_then(|i| i32::try_from(i).ok()).map(MapKey::I32)
        }
        Kind::Uint32 | Kind::Fixed32 => {
            lua_integer(value).and_then(|i| u32::try_from(i).ok()).map(MapKey::U32)
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => lua_integer(value).map(MapKey::I64),
        Kind::Uint64 | Kind::Fixed64 => lua_integer(value).map(|i| MapKey::U64(i as u64)),
        _ => None,
    }
}

fn kind_from_lua(field: &str, kind: &Kind, value: &LuaValue) -> Result<Value, ProtoError> {
    let mismatch = |expected: &str| ProtoError::TypeMismatch {
        field: field.to_string(),
        detail: format!("expected {expected}, got {}", describe(value)),
    };
    match kind {
        Kind::Bool => match value {
            LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
            _ => Err(mismatch("boolean")),
        },
        Kind::String => match value {
            LuaValue::String(s) => String::from_utf8(s.as_bytes().to_vec())
                .map(Value::String)
                .map_err(|_| ProtoError::TypeMismatch {
                    field: field.to_string(),
                    detail: "string is not valid UTF-8".to_string(),
                }),
            _ => Err(mismatch("string")),
        },
        Kind::Bytes => match value {
            LuaValue::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec().into())),
            _ => Err(mismatch("string")),
        },
        Kind::Enum(enum_desc) => {
            if let Some(i) = lua_integer(value) {
                let n = i32::try_from(i).map_err(|_| out_of_bounds(field, kind, i))?;
                Ok(Value::EnumNumber(n))
            } else if let LuaValue::String(s) = value {
                let name = String::from_utf8_lossy(&s.as_bytes()).into_owned();
                enum_desc
                    .get_value_by_name(&name)
                    .map(|v| Value::EnumNumber(v.number()))
                    .ok_or_else(|| ProtoError::TypeMismatch {
                        field: field.to_string(),
                        detail: format!("enum value '{name}' not found in {}", enum_desc.full_name()),
                    })
            } else {
                Err(mismatch("enum"))
            }
        }
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            let i = lua_integer(value).ok_or_else(|| mismatch("integer"))?;
            i32::try_from(i)
                .map(Value::I32)
                .map_err(|_| out_of_bounds(field, kind, i))
        }
        Kind::Uint32 | Kind::Fixed32 => {
            let i = lua_integer(value).ok_or_else(|| mismatch("integer"))?;
            u32::try_from(i)
                .map(Value::U32)
                .map_err(|_| out_of_bounds(field, kind, i))
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            lua_integer(value).map(Value::I64).ok_or_else(|| mismatch("integer"))
        }
        Kind::Uint64 | Kind::Fixed64 => lua_integer(value)
            .map(|i| Value::U64(i as u64))
            .ok_or_else(|| mismatch("integer")),
        Kind::Float => lua_number(value)
            .map(|f| Value::F32(f as f32))
            .ok_or_else(|| mismatch("number")),
        Kind::Double => lua_number(value).map(Value::F64).ok_or_else(|| mismatch("number")),
        Kind::Message(expected) => {
            let proxy = value
                .as_userdata()
                .and_then(|ud| ud.borrow::<MessageProxy>().ok().map(|p| (*p).clone()))
                .ok_or_else(|| mismatch(&format!("message {}", expected.full_name())))?;
            let msg = proxy.handle().snapshot();
            adopt(field, msg, expected).map(Value::Message)
        }
    }
}

fn list_from_lua(field: &FieldDescriptor, value: &LuaValue) -> Result<Value, ProtoError> {
    let expected = field.kind();
    let list = value
        .as_userdata()
        .and_then(|ud| ud.borrow::<ListProxy>().ok().map(|p| (*p).clone()))
        .ok_or_else(|| ProtoError::TypeMismatch {
            field: field.name().to_string(),
            detail: format!("expects a list, got {}", describe(value)),
        })?;
    let actual = list.field().kind();
    if !same_kind(&expected, &actual) {
        return Err(ProtoError::TypeMismatch {
            field: field.name().to_string(),
            detail: format!(
                "expects list with {} values, got {}",
                kind_name(&expected),
                kind_name(&actual)
            ),
        });
    }
    let items = list.snapshot();
    match &expected {
        Kind::Message(desc) => items
            .into_iter()
            .map(|item| adopt_value(field.name(), item, desc))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        _ => Ok(Value::List(items)),
    }
}

fn map_from_lua(field: &FieldDescriptor, value: &LuaValue) -> Result<Value, ProtoError> {
    let map = value
        .as_userdata()
        .and_then(|ud| ud.borrow::<MapProxy>().ok().map(|p| (*p).clone()))
        .ok_or_else(|| ProtoError::TypeMismatch {
            field: field.name().to_string(),
            detail: format!("expects a map, got {}", describe(value)),
        })?;
    let (want_key, want_value) = map_kinds(field);
    let (got_key, got_value) = map_kinds(map.field());
    if !same_kind(&want_key, &got_key) {
        return Err(ProtoError::TypeMismatch {
            field: field.name().to_string(),
            detail: format!(
                "expects map with {} keys, got {}",
                kind_name(&want_key),
                kind_name(&got_key)
            ),
        });
    }
    if !same_kind(&want_value, &got_value) {
        return Err(ProtoError::TypeMismatch {
            field: field.name().to_string(),
            detail: format!(
                "expects map with {} values, got {}",
                kind_name(&want_value),
                kind_name(&got_value)
            ),
        });
    }
    let entries = map.snapshot();
    match &want_value {
        Kind::Message(desc) => entries
            .into_iter()
            .map(|(k, v)| adopt_value(field.name(), v, desc).map(|v| (k, v)))
            .collect::<Result<_, _>>()
            .map(Value::Map),
        _ => Ok(Value::Map(entries)),
    }
}

/// Re-home `msg` under `expected`.
///
/// Same descriptor: returned as is. Same full name from another pool:
/// transcoded through the wire format. Anything else: type mismatch.
fn adopt(field: &str, msg: DynamicMessage, expected: &MessageDescriptor) -> Result<DynamicMessage, ProtoError> {
    let actual = msg.descriptor();
    if actual == *expected {
        return Ok(msg);
    }
    if actual.full_name() != expected.full_name() {
        return Err(ProtoError::TypeMismatch {
            field: field.to_string(),
            detail: format!(
                "expects message {} values, got {}",
                expected.full_name(),
                actual.full_name()
            ),
        });
    }
    DynamicMessage::decode(expected.clone(), msg.encode_to_vec().as_slice()).map_err(|e| {
        ProtoError::TypeMismatch {
            field: field.to_string(),
            detail: format!("cannot transcode {}: {e}", expected.full_name()),
        }
    })
}

fn adopt_value(field: &str, value: Value, expected: &MessageDescriptor) -> Result<Value, ProtoError> {
    match value {
        Value::Message(m) => adopt(field, m, expected).map(Value::Message),
        other => Ok(other),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Key and value kinds of a map field.
pub(crate) fn map_kinds(field: &FieldDescriptor) -> (Kind, Kind) {
    match field.kind() {
        Kind::Message(entry) if entry.is_map_entry() => (
            entry.map_entry_key_field().kind(),
            entry.map_entry_value_field().kind(),
        ),
        other => (Kind::String, other),
    }
}

/// Same kind, and for enums/messages the same full name.
pub(crate) fn same_kind(a: &Kind, b: &Kind) -> bool {
    match (a, b) {
        (Kind::Message(x), Kind::Message(y)) => x.full_name() == y.full_name(),
        (Kind::Enum(x), Kind::Enum(y)) => x.full_name() == y.full_name(),
        _ => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

pub(crate) fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".into(),
        Kind::Float => "float".into(),
        Kind::Int32 => "int32".into(),
        Kind::Int64 => "int64".into(),
        Kind::Uint32 => "uint32".into(),
        Kind::Uint64 => "uint64".into(),
        Kind::Sint32 => "sint32".into(),
        Kind::Sint64 => "sint64".into(),
        Kind::Fixed32 => "fixed32".into(),
        Kind::Fixed64 => "fixed64".into(),
        Kind::Sfixed32 => "sfixed32".into(),
        Kind::Sfixed64 => "sfixed64".into(),
        Kind::Bool => "bool".into(),
        Kind::String => "string".into(),
        Kind::Bytes => "bytes".into(),
        Kind::Message(m) => format!("message {}", m.full_name()),
        Kind::Enum(e) => format!("enum {}", e.full_name()),
    }
}

/// Lua integer, or a float with an exact integer value (Lua's own rule).
pub(crate) fn lua_integer(value: &LuaValue) -> Option<i64> {
    match value {
        LuaValue::Integer(i) => Some(*i),
        LuaValue::Number(n) if n.fract() == 0.0 && *n >= -(2f64.powi(63)) && *n < 2f64.powi(63) => {
            Some(*n as i64)
        }
        _ => None,
    }
}

fn lua_number(value: &LuaValue) -> Option<f64> {
    match value {
        LuaValue::Integer(i) => Some(*i as f64),
        LuaValue::Number(n) => Some(*n),
        _ => None,
    }
}

fn out_of_bounds(field: &str, kind: &Kind, value: i64) -> ProtoError {
    ProtoError::OutOfBounds {
        field: field.to_string(),
        kind: kind_name(kind),
        value,
    }
}

/// Human-readable type of a Lua value, naming proxy kinds.
pub(crate) fn describe(value: &LuaValue) -> String {
    if let Some(ud) = value.as_userdata() {
        if let Ok(m) = ud.borrow::<MessageProxy>() {
            return format!("message {}", m.descriptor().full_name());
        }
        if let Ok(l) = ud.borrow::<ListProxy>() {
            return format!("list of {}", kind_name(&l.field().kind()));
        }
        if ud.is::<MapProxy>() {
            return "map".to_string();
        }
        if ud.is::<TypeProxy>() {
            return "message type".to_string();
        }
        if ud.is::<FieldHandle>() {
            return "field descriptor".to_string();
        }
    }
    value.type_name().to_string()
}
