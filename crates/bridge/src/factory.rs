//! Message construction from a type name, type URL or type handle.

use log::debug;
use mlua::Value as LuaValue;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};

use crate::error::ProtoError;
use crate::types::TypeProxy;

/// What a script may pass to `proto.new`.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    /// Full name (`pkg.Msg`) or type URL (`type.googleapis.com/pkg.Msg`).
    Name(String),
    /// A type handle, possibly from a pool other than the registry.
    Descriptor(MessageDescriptor),
}

impl TypeSpec {
    pub fn from_lua(value: &LuaValue) -> Result<Self, ProtoError> {
        match value {
            LuaValue::String(s) => Ok(Self::Name(
                String::from_utf8_lossy(&s.as_bytes()).into_owned(),
            )),
            LuaValue::UserData(ud) => ud
                .borrow::<TypeProxy>()
                .map(|t| Self::Descriptor(t.descriptor().clone()))
                .map_err(|_| ProtoError::InvalidArgument("cannot create message from userdata".into())),
            other => Err(ProtoError::InvalidArgument(format!(
                "invalid argument type {}",
                other.type_name()
            ))),
        }
    }
}

/// Resolve `spec` to a message type.
///
/// Names resolve against `registry` by full name, then as a type URL. A
/// handle resolves to the registry's type of the same name when there is one,
/// and otherwise stands for itself.
pub fn resolve(registry: &DescriptorPool, spec: &TypeSpec) -> Result<MessageDescriptor, ProtoError> {
    match spec {
        TypeSpec::Name(name) => registry
            .get_message_by_name(name)
            .or_else(|| {
                let (_, full_name) = name.rsplit_once('/')?;
                registry.get_message_by_name(full_name)
            })
            .ok_or_else(|| ProtoError::UnknownType(name.clone())),
        TypeSpec::Descriptor(desc) => Ok(registry
            .get_message_by_name(desc.full_name())
            .unwrap_or_else(|| {
                debug!("{} not in registry; using its own descriptor", desc.full_name());
                desc.clone()
            })),
    }
}

/// A fresh, zero-valued instance of `spec`.
pub fn new_message(registry: &DescriptorPool, spec: &TypeSpec) -> Result<DynamicMessage, ProtoError> {
    let desc = resolve(registry, spec)?;
    if desc.is_map_entry() {
        return Err(ProtoError::Construction(desc.full_name().to_string()));
    }
    Ok(DynamicMessage::new(desc))
}

/// An instance of `spec` decoded from wire-format `bytes`.
pub fn decode_message(
    registry: &DescriptorPool,
    spec: &TypeSpec,
    bytes: &[u8],
) -> Result<DynamicMessage, ProtoError> {
    let desc = resolve(registry, spec)?;
    if desc.is_map_entry() {
        return Err(ProtoError::Construction(desc.full_name().to_string()));
    }
    DynamicMessage::decode(desc.clone(), bytes).map_err(|e| ProtoError::Decode {
        message: desc.full_name().to_string(),
        reason: e.to_string(),
    })
}
