//! `MapProxy`: a Lua view of a map field.
//!
//! Lookups convert the Lua key to the declared key kind; a key of the wrong
//! type simply finds nothing. Enumeration runs a producer thread over the
//! key set (see [`crate::iter`]) and is exposed to Lua only through `Range()`,
//! which hands the generic-for a to-be-closed value so `break` stops the
//! producer at once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use mlua::{Lua, MetaMethod, MultiValue, Result as LuaResult, UserData, UserDataMethods, Value as LuaValue};
use prost_reflect::{FieldDescriptor, Kind, MapKey, Value};

use crate::budget::ResourceBudget;
use crate::error::ProtoError;
use crate::handle::{MessageHandle, Slot};
use crate::iter::{ProducerExit, Rendezvous};
use crate::message::has_within;
use crate::value::{self, key_from_lua, key_to_lua, kind_name, map_kinds, Peeked, Place};

#[derive(Clone)]
pub struct MapProxy {
    owner: MessageHandle,
    field: FieldDescriptor,
    read_only: bool,
}

impl MapProxy {
    pub(crate) fn new(owner: MessageHandle, field: FieldDescriptor, read_only: bool) -> Self {
        Self {
            owner,
            field,
            read_only,
        }
    }

    /// The map field this table belongs to.
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
            .read(|msg| msg.get_field(&self.field).as_map().map_or(0, HashMap::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> HashMap<MapKey, Value> {
        match self.owner.field_snapshot(&self.field) {
            Value::Map(entries) => entries,
            _ => HashMap::new(),
        }
    }

    fn key_kind(&self) -> Kind {
        map_kinds(&self.field).0
    }

    fn peek_entry(&self, key: &MapKey) -> Option<Peeked> {
        self.owner.read(|msg| {
            msg.get_field(&self.field)
                .as_map()
                .and_then(|entries| entries.get(key))
                .map(value::peek)
        })
    }

    fn entry_to_lua(&self, lua: &Lua, key: MapKey, peeked: Peeked, read_only: bool) -> LuaResult<LuaValue> {
        let place = Place {
            owner: &self.owner,
            field: &self.field,
            slot: Slot::Key(key),
        };
        value::to_lua(lua, place, peeked, read_only)
    }

    /// Value at `key`; nil if the key has the wrong type or is not present.
    pub fn get(&self, lua: &Lua, key: &LuaValue) -> LuaResult<LuaValue> {
        let Some(key) = key_from_lua(&self.key_kind(), key) else {
            return Ok(LuaValue::Nil);
        };
        match self.peek_entry(&key) {
            Some(peeked) => self.entry_to_lua(lua, key, peeked, self.read_only),
            None => Ok(LuaValue::Nil),
        }
    }

    /// Presence of `keys[0]`, then of the rest of the chain within its value.
    ///
    /// Values visited along the chain are always viewed read-only.
    pub fn has(&self, keys: &[LuaValue]) -> Result<bool, ProtoError> {
        let Some((key, rest)) = keys.split_first() else {
            return Err(ProtoError::InvalidArgument("Has expects at least one key".into()));
        };
        let Some(key) = key_from_lua(&self.key_kind(), key) else {
            return Ok(false);
        };
        match self.peek_entry(&key) {
            None => Ok(false),
            Some(_) if rest.is_empty() => Ok(true),
            Some(peeked) => {
                let place = Place {
                    owner: &self.owner,
                    field: &self.field,
                    slot: Slot::Key(key),
                };
                has_within(place, peeked, rest)
            }
        }
    }

    /// Start walking the entries, reserving the producer's overhead from
    /// `budget`.
    pub fn enumerate(&self, budget: &ResourceBudget) -> Result<MapEnumeration, ProtoError> {
        let keys: Vec<MapKey> = self.owner.read(|msg| {
            msg.get_field(&self.field)
                .as_map()
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default()
        });
        Ok(MapEnumeration {
            map: self.clone(),
            producer: Rendezvous::spawn(keys, budget)?,
        })
    }
}

/// An in-flight map enumeration.
///
/// The producer walks the key set as it was when the enumeration started;
/// values are read when each key is accepted. Keys removed in the meantime
/// are skipped. Dropping the enumeration stops the producer.
pub struct MapEnumeration {
    map: MapProxy,
    producer: Rendezvous<MapKey>,
}

impl MapEnumeration {
    /// Next `(key, value)` pair, or `None` once the walk is over.
    pub fn next_pair(&mut self, lua: &Lua) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        while let Some(key) = self.producer.next() {
            let Some(peeked) = self.map.peek_entry(&key) else {
                continue;
            };
            let lua_key = key_to_lua(lua, &key)?;
            let lua_value = self.map.entry_to_lua(lua, key, peeked, self.map.read_only)?;
            return Ok(Some((lua_key, lua_value)));
        }
        Ok(None)
    }

    /// Stop the producer early and wait for it. Idempotent.
    pub fn close(&mut self) -> Option<ProducerExit> {
        self.producer.close()
    }
}

type SharedEnumeration = Rc<RefCell<Option<MapEnumeration>>>;

/// To-be-closed value handed to the generic-for by `Range()`.
struct RangeCloser {
    enumeration: SharedEnumeration,
}

impl UserData for RangeCloser {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Close, |_, this, _: MultiValue| {
            if let Ok(mut slot) = this.enumeration.try_borrow_mut() {
                if let Some(mut enumeration) = slot.take() {
                    enumeration.close();
                }
            }
            Ok(())
        });
    }
}

fn range(lua: &Lua, map: &MapProxy) -> LuaResult<(mlua::Function, LuaValue, LuaValue, RangeCloser)> {
    let budget = lua
        .app_data_ref::<ResourceBudget>()
        .map(|b| (*b).clone())
        .unwrap_or_default();
    let enumeration: SharedEnumeration = Rc::new(RefCell::new(Some(map.enumerate(&budget)?)));

    let state = enumeration.clone();
    let step = lua.create_function(move |lua, _: MultiValue| {
        let mut slot = state.borrow_mut();
        let Some(current) = slot.as_mut() else {
            return Ok((LuaValue::Nil, LuaValue::Nil));
        };
        match current.next_pair(lua)? {
            Some(pair) => Ok(pair),
            None => {
                // Finished: dropping joins the producer.
                slot.take();
                Ok((LuaValue::Nil, LuaValue::Nil))
            }
        }
    })?;

    Ok((step, LuaValue::Nil, LuaValue::Nil, RangeCloser { enumeration }))
}

impl UserData for MapProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("Has", |_, this, keys: mlua::Variadic<LuaValue>| Ok(this.has(&keys)?));

        // ====================================================================
        // Range() -> iterator, nil, nil, closer (for k, v in m:Range() do)
        // ====================================================================
        methods.add_method("Range", |lua, this, ()| range(lua, this));

        methods.add_method("IsReadOnly", |_, this, ()| Ok(this.is_read_only()));
        methods.add_method("ReadOnly", |_, this, ()| Ok(this.read_only()));

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: LuaValue| this.get(lua, &key));
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.len()));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            let (key, value) = map_kinds(&this.field);
            Ok(format!("proto.Map<{}, {}>", kind_name(&key), kind_name(&value)))
        });
    }
}
