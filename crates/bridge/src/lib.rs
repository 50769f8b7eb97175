//! Protobuf messages for Lua scripts.
//!
//! Scripts see reflective protobuf values ([`prost_reflect::DynamicMessage`])
//! as native-feeling userdata:
//!
//! - [`MessageProxy`]: `m.field`, `m[3]`, `m[fieldHandle]`, assignment,
//!   `==`, `m:Has(...)`, `m:Marshal()`, `m:Type()`, `m:ReadOnly()`
//! - [`ListProxy`]: `l[i]` (1-based), `#l`, `pairs(l)`, `l:Range()`
//! - [`MapProxy`]: `t[k]`, `#t`, `t:Has(...)`, `for k, v in t:Range()`
//! - [`TypeProxy`] / [`FieldHandle`]: schema handles that compare by name
//!
//! Nested aggregates are views into the same backing instance, and a
//! read-only view only ever yields read-only views. Map enumeration runs a
//! producer thread per traversal, reserving its overhead from a shared
//! [`ResourceBudget`].
//!
//! ```no_run
//! use protolua_bridge::{ProtoLib, RuntimeLimits, ScriptRuntime};
//! # fn pool() -> prost_reflect::DescriptorPool { unimplemented!() }
//! let rt = ScriptRuntime::new(&ProtoLib::new(pool()), RuntimeLimits::default()).unwrap();
//! let result = rt.eval(r#"local m = proto.new("pkg.Msg"); m.name = "x"; return m:Marshal()"#);
//! ```

pub mod budget;
pub mod error;
pub mod factory;
pub mod handle;
pub mod iter;
pub mod list;
pub mod loader;
pub mod map;
pub mod message;
pub mod runtime;
pub mod types;
mod value;

#[cfg(test)]
mod fixtures;

pub use budget::{Reservation, ResourceBudget, DEFAULT_PRODUCER_OVERHEAD};
pub use error::{as_proto_error, ProtoError};
pub use factory::TypeSpec;
pub use handle::{MessageHandle, SharedMessage};
pub use list::{ListEnumeration, ListProxy};
pub use loader::{unwrap, wrap, wrap_shared, ProtoLib};
pub use map::{MapEnumeration, MapProxy};
pub use message::MessageProxy;
pub use runtime::{CancelToken, RuntimeLimits, ScriptResult, ScriptRuntime};
pub use types::{FieldHandle, TypeProxy};
