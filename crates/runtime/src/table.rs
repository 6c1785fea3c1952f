//! Table handles and the per-state table registry.
//!
//! A `Table` is a reference, not a copy: the data lives on the engine heap
//! and the handle only remembers where to find it on the owning state's
//! stack. Handles are valid as long as the owning state is alive and the
//! referenced slot has not been removed; handles to the two sentinels are
//! valid for the state's whole lifetime.

use core::ffi::c_int;
use std::collections::HashMap;

use lunet_sys as ffi;

use crate::error::{Error, Result};
use crate::stack::{self, Stack};
use crate::state::RawHandle;
use crate::value::{TableKey, TableRef, Value, ValueType};

/// Handle to one table, addressed by an absolute (or sentinel) stack index
/// on its owning state.
pub struct Table<'l> {
    handle: &'l RawHandle,
    index: c_int,
}

impl<'l> Table<'l> {
    pub(crate) fn new(handle: &'l RawHandle, index: c_int) -> Self {
        Self { handle, index }
    }

    /// Stack index identifying this table.
    pub fn index(&self) -> c_int {
        self.index
    }

    /// Plain-data reference form of this handle, as the decoder produces.
    pub fn to_ref(&self) -> Result<TableRef> {
        Ok(TableRef {
            state: self.handle.get()?,
            index: self.index,
        })
    }

    /// Live state pointer, verified to still hold a table at our index.
    fn raw_checked(&self) -> Result<*mut ffi::lua_State> {
        let raw = self.handle.get()?;
        let tag = unsafe { ffi::lua_type(raw, self.index) };
        if tag != ffi::LUA_TTABLE {
            let found = unsafe { stack::type_name(raw, tag) };
            return Err(Error::Type(format!(
                "stack index {} holds a {found}, not a table",
                self.index
            )));
        }
        Ok(raw)
    }

    /// Binds the two topmost slots into the table as a `(key, value)` pair.
    /// The caller must have pushed the key first, then the value.
    pub fn set_table(&self) -> Result<()> {
        let raw = self.raw_checked()?;
        if unsafe { ffi::lua_gettop(raw) } < 2 {
            return Err(Error::Argument(
                "set_table needs a key and a value on the stack".into(),
            ));
        }
        if unsafe { ffi::lua_type(raw, -2) } == ffi::LUA_TNIL {
            return Err(Error::Argument("table key must not be nil".into()));
        }
        unsafe { ffi::lua_settable(raw, self.index) };
        Ok(())
    }

    /// Binds `key` to `value`. A nil value removes the key; a nil key is an
    /// argument error.
    pub fn set_value(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if key.is_nil() {
            return Err(Error::Argument("table key must not be nil".into()));
        }
        let stack = Stack::new(self.handle);
        stack.push_value(&key)?;
        if let Err(e) = stack.push_value(&value.into()) {
            let _ = stack.pop(1);
            return Err(e);
        }
        self.set_table()
    }

    /// Replaces the top slot (a key) with the value bound to it; nil when
    /// the key is absent.
    pub fn get_table(&self) -> Result<()> {
        let raw = self.raw_checked()?;
        if unsafe { ffi::lua_gettop(raw) } < 1 {
            return Err(Error::Argument("get_table needs a key on the stack".into()));
        }
        unsafe { ffi::lua_gettable(raw, self.index) };
        Ok(())
    }

    /// Looks `key` up and leaves the result on the stack. A table result
    /// comes back as a new handle at the resulting slot; tables are never
    /// flattened into a host composite.
    pub fn get_value(&self, key: impl Into<Value>) -> Result<Value> {
        let stack = Stack::new(self.handle);
        stack.push_value(&key.into())?;
        self.get_table()?;
        stack.get(-1)
    }

    /// [`Table::get_value`] that also removes the resulting slot. Use when
    /// the result does not need to stay addressable on the stack.
    pub fn pop(&self, key: impl Into<Value>) -> Result<Value> {
        let value = self.get_value(key)?;
        Stack::new(self.handle).pop(1)?;
        Ok(value)
    }

    /// Traverses every `(key, value)` pair into a host map using the
    /// engine's stateful next-key iteration, seeded with nil.
    ///
    /// Mutating the table during traversal is undefined and disallowed, and
    /// iteration order is unspecified. Table- and thread-valued entries
    /// decode to references whose slots are popped as iteration advances;
    /// anchor such values elsewhere before traversing if their handles must
    /// stay valid afterwards.
    pub fn to_map(&self) -> Result<HashMap<TableKey, Value>> {
        let raw = self.raw_checked()?;
        let base = unsafe { ffi::lua_gettop(raw) };
        let mut map = HashMap::new();
        unsafe { ffi::lua_pushnil(raw) };
        while unsafe { ffi::lua_next(raw, self.index) } != 0 {
            // Key at -2, value at -1. Pop exactly the value and keep the
            // key for the next iteration step; any other discipline
            // corrupts the traversal.
            let key = unsafe { stack::read_table_key(raw, -2) };
            let value = unsafe { stack::decode(raw, -1) };
            match (key, value) {
                (Ok(key), Ok(value)) => {
                    map.insert(key, value);
                    unsafe { ffi::lua_pop(raw, 1) };
                }
                (key, value) => {
                    unsafe { ffi::lua_settop(raw, base) };
                    return Err(key.err().or(value.err()).unwrap_or(Error::UnknownTypeTag(-2)));
                }
            }
        }
        Ok(map)
    }
}

/// The per-state table registry: the two permanently-addressable sentinel
/// handles plus factory operations for ad-hoc tables.
pub struct Tables<'l> {
    handle: &'l RawHandle,
}

impl<'l> Tables<'l> {
    pub(crate) fn new(handle: &'l RawHandle) -> Self {
        Self { handle }
    }

    /// Handle to the global namespace sentinel.
    pub fn global(&self) -> Table<'l> {
        Table::new(self.handle, ffi::LUA_GLOBALSINDEX)
    }

    /// Handle to the private registry sentinel, for values the host wants
    /// anchored outside any script-visible namespace.
    pub fn registry(&self) -> Table<'l> {
        Table::new(self.handle, ffi::LUA_REGISTRYINDEX)
    }

    /// Pushes a brand-new empty table and returns a handle to it.
    pub fn add(&self) -> Result<Table<'l>> {
        let raw = self.handle.get()?;
        unsafe { ffi::lua_newtable(raw) };
        Ok(Table::new(self.handle, unsafe { ffi::lua_gettop(raw) }))
    }

    /// Creates a table and moves it to position `index`.
    pub fn insert(&self, index: c_int) -> Result<Table<'l>> {
        let raw = self.handle.get()?;
        self.add()?;
        let top = unsafe { ffi::lua_gettop(raw) };
        let destination = if index > 0 { index } else { top + 1 + index };
        Stack::new(self.handle).insert(index)?;
        Ok(Table::new(self.handle, destination))
    }

    /// Removes the table at `index`, shifting slots above it down. Fails
    /// with a type error when the slot holds something else.
    pub fn remove(&self, index: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        if index <= ffi::LUA_REGISTRYINDEX {
            return Err(Error::Argument("sentinel tables cannot be removed".into()));
        }
        let ty = ValueType::from_tag(unsafe { ffi::lua_type(raw, index) }, index)?;
        if ty != ValueType::Table {
            return Err(Error::Type(format!(
                "stack index {index} does not hold a table"
            )));
        }
        Stack::new(self.handle).remove(index)
    }

    /// Rehydrates a decoded table reference into a handle, checking that it
    /// belongs to this state.
    pub fn from_ref(&self, reference: TableRef) -> Result<Table<'l>> {
        let raw = self.handle.get()?;
        if reference.state != raw {
            return Err(Error::Argument(
                "table reference belongs to a different state".into(),
            ));
        }
        Ok(Table::new(self.handle, reference.index))
    }
}
