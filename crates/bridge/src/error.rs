use std::fmt;

/// Failure of a proxy or factory operation.
///
/// "Absent" results (unknown field on read, missing map key, out-of-range
/// list index, unset optional field) are not errors and never show up here.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoError {
    /// A type name or URL did not resolve against the registry.
    UnknownType(String),
    /// The type system could not synthesize an instance of the type.
    Construction(String),
    /// Field name or number is not part of the message schema.
    NoSuchField { message: String, field: String },
    /// A field handle was used on a message type it does not belong to.
    DescriptorMismatch { field: String, message: String },
    /// Value incompatible with the field's kind, element kind, key kind,
    /// or enum/message identity.
    TypeMismatch { field: String, detail: String },
    /// Number outside the field kind's representable range.
    OutOfBounds { field: String, kind: String, value: i64 },
    /// nil assigned to a field without explicit presence.
    Presence { field: String },
    /// Mutation attempted through a read-only view.
    ReadOnlyViolation { target: String },
    /// Feature exists in the surface but is not implemented.
    Unimplemented(String),
    /// Chained `Has` reached a value that is not a message or map.
    NotAggregate { found: String },
    /// Write through a nested view whose target has been removed.
    Detached { message: String },
    /// Wire bytes could not be decoded.
    Decode { message: String, reason: String },
    /// The resource budget cannot cover the requested reservation.
    BudgetExhausted { requested: u64, available: u64 },
    /// A background producer thread could not be started.
    Spawn(String),
    /// Argument of a dynamic type the operation does not accept.
    InvalidArgument(String),
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(spec) => write!(f, "no such message type: {spec}"),
            Self::Construction(name) => {
                write!(f, "unable to create message of type '{name}'")
            }
            Self::NoSuchField { message, field } => {
                write!(f, "no such field '{field}' in message '{message}'")
            }
            Self::DescriptorMismatch { field, message } => write!(
                f,
                "field descriptor '{field}' does not belong to message type '{message}'"
            ),
            Self::TypeMismatch { field, detail } => write!(f, "field '{field}': {detail}"),
            Self::OutOfBounds { field, kind, value } => {
                write!(f, "field '{field}': {kind} value out of bounds: {value}")
            }
            Self::Presence { field } => write!(f, "nil value not allowed for field '{field}'"),
            Self::ReadOnlyViolation { target } => write!(f, "{target} is read-only"),
            Self::Unimplemented(what) => write!(f, "not implemented: {what}"),
            Self::NotAggregate { found } => {
                write!(f, "cannot check presence within {found} value: not a message or map")
            }
            Self::Detached { message } => {
                write!(f, "message '{message}' is no longer attached to its parent")
            }
            Self::Decode { message, reason } => {
                write!(f, "cannot decode '{message}': {reason}")
            }
            Self::BudgetExhausted { requested, available } => write!(
                f,
                "resource budget exhausted: requested {requested} bytes, {available} available"
            ),
            Self::Spawn(reason) => write!(f, "cannot start enumeration: {reason}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<ProtoError> for mlua::Error {
    fn from(err: ProtoError) -> Self {
        mlua::Error::external(err)
    }
}

/// Recover the typed error from an `mlua` error chain.
///
/// Errors raised inside callbacks arrive wrapped in `CallbackError` (possibly
/// several layers deep when proxies call into each other).
pub fn as_proto_error(err: &mlua::Error) -> Option<&ProtoError> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<ProtoError>(),
        mlua::Error::CallbackError { cause, .. } => as_proto_error(cause),
        mlua::Error::WithContext { cause, .. } => as_proto_error(cause),
        _ => None,
    }
}
