//! The `proto` Lua module and host-side wrap/unwrap helpers.

use log::debug;
use mlua::{AnyUserData, Lua, Result as LuaResult, Table, Value as LuaValue};
use prost_reflect::{DescriptorPool, DynamicMessage};

use crate::budget::ResourceBudget;
use crate::factory::{self, TypeSpec};
use crate::handle::SharedMessage;
use crate::message::{as_message, MessageProxy};
use crate::types::TypeProxy;

/// The `proto` module: a type registry plus the budget map enumeration
/// reserves from.
#[derive(Clone, Debug)]
pub struct ProtoLib {
    registry: DescriptorPool,
    budget: ResourceBudget,
}

impl ProtoLib {
    pub fn new(registry: DescriptorPool) -> Self {
        Self {
            registry,
            budget: ResourceBudget::unlimited(),
        }
    }

    pub fn with_budget(mut self, budget: ResourceBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn registry(&self) -> &DescriptorPool {
        &self.registry
    }

    pub fn budget(&self) -> &ResourceBudget {
        &self.budget
    }

    /// Build the module table without touching globals.
    pub fn load(&self, lua: &Lua) -> LuaResult<Table> {
        let module = lua.create_table()?;

        // ====================================================================
        // proto.new(spec) -> fresh, zero-valued, mutable message
        // ====================================================================
        let registry = self.registry.clone();
        module.set(
            "new",
            lua.create_function(move |_, spec: LuaValue| {
                let spec = TypeSpec::from_lua(&spec)?;
                Ok(MessageProxy::new(factory::new_message(&registry, &spec)?))
            })?,
        )?;

        // ====================================================================
        // proto.unmarshal(spec, bytes) -> message decoded from wire format
        // ====================================================================
        let registry = self.registry.clone();
        module.set(
            "unmarshal",
            lua.create_function(move |_, (spec, bytes): (LuaValue, mlua::String)| {
                let spec = TypeSpec::from_lua(&spec)?;
                let raw = bytes.as_bytes();
                Ok(MessageProxy::new(factory::decode_message(&registry, &spec, &raw)?))
            })?,
        )?;

        // ====================================================================
        // proto.type(spec) -> type handle
        // ====================================================================
        let registry = self.registry.clone();
        module.set(
            "type",
            lua.create_function(move |_, spec: LuaValue| {
                let spec = TypeSpec::from_lua(&spec)?;
                Ok(TypeProxy::new(factory::resolve(&registry, &spec)?))
            })?,
        )?;

        Ok(module)
    }

    /// Install the module as global `proto` and make the budget available to
    /// map enumeration.
    pub fn register(&self, lua: &Lua) -> LuaResult<()> {
        let module = self.load(lua)?;
        lua.globals().set("proto", module)?;
        lua.set_app_data(self.budget.clone());
        debug!(
            "proto module registered ({} message types)",
            self.registry.all_messages().count()
        );
        Ok(())
    }
}

/// Hand `msg` to a script as a mutable message.
pub fn wrap(lua: &Lua, msg: DynamicMessage) -> LuaResult<AnyUserData> {
    lua.create_userdata(MessageProxy::new(msg))
}

/// Hand a host-owned instance to a script; script mutations are visible to
/// the host through `root`.
pub fn wrap_shared(lua: &Lua, root: SharedMessage) -> LuaResult<AnyUserData> {
    lua.create_userdata(MessageProxy::from_shared(root))
}

/// Copy of the message inside a Lua value, if it holds one.
pub fn unwrap(value: &LuaValue) -> Option<DynamicMessage> {
    as_message(value).map(|proxy| proxy.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{as_proto_error, ProtoError};
    use crate::fixtures;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn lua_with_proto() -> Lua {
        let lua = Lua::new();
        ProtoLib::new(fixtures::pool()).register(&lua).unwrap();
        lua
    }

    #[test]
    fn test_new_and_unwrap() {
        let lua = lua_with_proto();
        let value: LuaValue = lua
            .load(r#"local m = proto.new("test.T"); m.name = "x"; return m"#)
            .eval()
            .unwrap();
        let msg = unwrap(&value).unwrap();
        assert_eq!(msg.get_field_by_name("name").unwrap().as_str(), Some("x"));
        assert!(unwrap(&LuaValue::Integer(1)).is_none());
    }

    #[test]
    fn test_new_unknown_type() {
        let lua = lua_with_proto();
        let err = lua.load(r#"proto.new("pkg.Unknown")"#).exec().unwrap_err();
        assert_eq!(
            as_proto_error(&err),
            Some(&ProtoError::UnknownType("pkg.Unknown".into()))
        );
        let err = lua.load("proto.new({})").exec().unwrap_err();
        assert!(matches!(as_proto_error(&err), Some(ProtoError::InvalidArgument(_))));
    }

    #[test]
    fn test_marshal_unmarshal_from_lua() {
        let lua = lua_with_proto();
        let same: bool = lua
            .load(
                r#"
                local m = proto.new("test.T")
                m.name = "wire"
                local copy = proto.unmarshal("test.T", m:Marshal())
                return copy == m and copy.name == "wire"
                "#,
            )
            .eval()
            .unwrap();
        assert!(same);
    }

    #[test]
    fn test_wrap_shared_aliases_host_instance() {
        let lua = lua_with_proto();
        let desc = fixtures::pool().get_message_by_name("test.T").unwrap();
        let root: SharedMessage = Rc::new(RefCell::new(DynamicMessage::new(desc)));
        lua.globals()
            .set("host", wrap_shared(&lua, root.clone()).unwrap())
            .unwrap();
        lua.load(r#"host.name = "from script""#).exec().unwrap();
        assert_eq!(
            root.borrow().get_field_by_name("name").unwrap().as_str(),
            Some("from script")
        );
    }

    #[test]
    fn test_type_handles_compare_by_name() {
        let lua = lua_with_proto();
        let (same, different): (bool, bool) = lua
            .load(
                r#"
                local a = proto.new("test.T"):Type()
                local b = proto.type("test.T")
                return a == b, a == proto.type("test.Inner")
                "#,
            )
            .eval()
            .unwrap();
        assert!(same);
        assert!(!different);
    }

    #[test]
    fn test_register_installs_budget() {
        let lua = Lua::new();
        let budget = ResourceBudget::new(Some(1), 1);
        ProtoLib::new(fixtures::pool())
            .with_budget(budget.clone())
            .register(&lua)
            .unwrap();
        let installed = lua.app_data_ref::<ResourceBudget>().unwrap();
        assert_eq!(installed.available(), Some(1));
    }
}
