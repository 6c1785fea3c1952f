//! Stack view and the value codec.
//!
//! All data exchange with the engine happens through the per-state value
//! stack. Positive indices address slots from the bottom (1-based),
//! negative indices from the top (-1 is the topmost slot); anything at or
//! below the registry sentinel is a pseudo-index owned by the engine.
//!
//! The codec at the top of this module is the single translation point
//! between host values and stack slots: `encode` pushes exactly one slot,
//! `decode` reads one slot without disturbing it.

use core::ffi::c_int;
use std::ffi::CStr;

use lunet_sys as ffi;

use crate::error::{Error, Result};
use crate::state::RawHandle;
use crate::value::{FunctionRef, TableKey, TableRef, ThreadRef, Value, ValueType};

/// Pushes `value` as exactly one new slot.
///
/// Dispatch is on the runtime variant: composites that only exist on the
/// engine heap (tables, threads, script function references) cannot be
/// re-encoded from the host side and fail with a type error.
///
/// # Safety
/// `raw` must be a live state with at least one free stack slot.
pub(crate) unsafe fn encode(raw: *mut ffi::lua_State, value: &Value) -> Result<()> {
    match value {
        Value::Nil => unsafe { ffi::lua_pushnil(raw) },
        Value::Boolean(b) => unsafe { ffi::lua_pushboolean(raw, c_int::from(*b)) },
        Value::Number(n) => unsafe { ffi::lua_pushnumber(raw, *n) },
        Value::Str(s) => unsafe { ffi::lua_pushlstring(raw, s.as_ptr().cast(), s.len()) },
        Value::Function(FunctionRef::Native(f)) => unsafe { ffi::lua_pushcfunction(raw, *f) },
        Value::Function(FunctionRef::Script(_)) => {
            return Err(Error::Type(
                "script function references cannot be re-encoded; only the native \
                 callback signature is supported"
                    .into(),
            ));
        }
        Value::LightUserdata(p) => unsafe { ffi::lua_pushlightuserdata(raw, *p) },
        Value::Table(_) | Value::Thread(_) => {
            return Err(Error::Type(
                "engine-heap references (tables, threads) cannot be pushed as host values".into(),
            ));
        }
    }
    Ok(())
}

/// Reads the slot at `index` without removing it.
///
/// Tables decode to an index-based reference at the slot's absolute
/// position, not to a copy.
///
/// # Safety
/// `raw` must be a live state.
pub(crate) unsafe fn decode(raw: *mut ffi::lua_State, index: c_int) -> Result<Value> {
    let tag = unsafe { ffi::lua_type(raw, index) };
    let ty = ValueType::from_tag(tag, index)?;
    Ok(match ty {
        ValueType::Nil => Value::Nil,
        ValueType::Boolean => Value::Boolean(unsafe { ffi::lua_toboolean(raw, index) } != 0),
        ValueType::Number => Value::Number(unsafe { ffi::lua_tonumber(raw, index) }),
        ValueType::String => Value::Str(unsafe { read_string(raw, index) }.unwrap_or_default()),
        ValueType::Function => match unsafe { ffi::lua_tocfunction(raw, index) } {
            Some(f) => Value::Function(FunctionRef::Native(f)),
            None => Value::Function(FunctionRef::Script(unsafe { ffi::lua_topointer(raw, index) })),
        },
        ValueType::Table => Value::Table(TableRef {
            state: raw,
            index: unsafe { absolute(raw, index) },
        }),
        ValueType::Userdata | ValueType::LightUserdata => {
            Value::LightUserdata(unsafe { ffi::lua_touserdata(raw, index) })
        }
        ValueType::Thread => Value::Thread(ThreadRef(unsafe { ffi::lua_tothread(raw, index) })),
    })
}

/// Copies out the string at `index`. Returns `None` when the slot is not a
/// string; never coerces, since in-place coercion would corrupt an ongoing
/// table traversal.
pub(crate) unsafe fn read_string(raw: *mut ffi::lua_State, index: c_int) -> Option<String> {
    if unsafe { ffi::lua_type(raw, index) } != ffi::LUA_TSTRING {
        return None;
    }
    let mut len = 0usize;
    let ptr = unsafe { ffi::lua_tolstring(raw, index, &mut len) };
    if ptr.is_null() {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// Projects the key slot of a traversal step into a hashable key.
/// Composites are keyed by identity pointer rather than decoded.
pub(crate) unsafe fn read_table_key(raw: *mut ffi::lua_State, index: c_int) -> Result<TableKey> {
    let tag = unsafe { ffi::lua_type(raw, index) };
    let ty = ValueType::from_tag(tag, index)?;
    Ok(match ty {
        ValueType::Boolean => TableKey::Boolean(unsafe { ffi::lua_toboolean(raw, index) } != 0),
        ValueType::Number => TableKey::from_number(unsafe { ffi::lua_tonumber(raw, index) }),
        ValueType::String => {
            TableKey::Str(unsafe { read_string(raw, index) }.unwrap_or_default())
        }
        // Nil keys cannot occur mid-traversal; everything else is keyed by
        // identity.
        _ => TableKey::Identity(unsafe { ffi::lua_topointer(raw, index) } as usize),
    })
}

/// Converts a relative index to an absolute one; pseudo-indices pass
/// through unchanged.
pub(crate) unsafe fn absolute(raw: *mut ffi::lua_State, index: c_int) -> c_int {
    if index > 0 || index <= ffi::LUA_REGISTRYINDEX {
        index
    } else {
        (unsafe { ffi::lua_gettop(raw) }) + 1 + index
    }
}

/// A borrowed, index-addressed view over one state's value stack.
///
/// The view holds a reference to the owning handle, never a copy: once the
/// owner is closed every operation fails with a lifecycle error.
#[derive(Clone, Copy)]
pub struct Stack<'l> {
    handle: &'l RawHandle,
}

impl<'l> Stack<'l> {
    pub(crate) fn new(handle: &'l RawHandle) -> Self {
        Self { handle }
    }

    /// Index of the topmost slot; 0 on an empty stack.
    pub fn top_index(&self) -> Result<c_int> {
        let raw = self.handle.get()?;
        Ok(unsafe { ffi::lua_gettop(raw) })
    }

    /// Decoded value of the topmost slot. Fails with an index error on an
    /// empty stack.
    pub fn top_value(&self) -> Result<Value> {
        self.get(self.top_index()?)
    }

    /// Shrinks (or keeps) the stack so that `index` becomes the top.
    /// Only shrinking targets are accepted; the stack grows through `push`.
    pub fn set_top(&self, index: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        let top = unsafe { ffi::lua_gettop(raw) };
        let target = if index >= 0 { index } else { top + 1 + index };
        if target < 0 || target > top {
            return Err(Error::Index(index));
        }
        unsafe { ffi::lua_settop(raw, target) };
        Ok(())
    }

    /// Reserves room for `count` more slots. Fails with a resource error if
    /// the engine cannot grow the stack. Does not change the top index.
    pub fn grow(&self, count: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        if unsafe { ffi::lua_checkstack(raw, count) } == 0 {
            return Err(Error::Resource("not enough memory to grow the stack"));
        }
        Ok(())
    }

    /// Removes the `count` topmost slots. Popping more slots than the stack
    /// holds removes what is there; an empty stack is a no-op, not an
    /// underflow.
    pub fn pop(&self, count: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        let top = unsafe { ffi::lua_gettop(raw) };
        let count = count.min(top);
        if count > 0 {
            unsafe { ffi::lua_pop(raw, count) };
        }
        Ok(())
    }

    /// Discards every slot.
    pub fn clear(&self) -> Result<()> {
        let raw = self.handle.get()?;
        unsafe { ffi::lua_settop(raw, 0) };
        Ok(())
    }

    /// Moves the top slot into position `index`, shifting slots up.
    pub fn insert(&self, index: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        let index = unsafe { checked_slot(raw, index) }?;
        unsafe { ffi::lua_insert(raw, index) };
        Ok(())
    }

    /// Pops the top slot into position `index`, overwriting it.
    pub fn replace(&self, index: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        let index = unsafe { checked_slot(raw, index) }?;
        unsafe { ffi::lua_replace(raw, index) };
        Ok(())
    }

    /// Removes the slot at `index`, shifting slots above it down.
    pub fn remove(&self, index: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        let index = unsafe { checked_slot(raw, index) }?;
        unsafe { ffi::lua_remove(raw, index) };
        Ok(())
    }

    /// Pushes a copy of the slot at `index` (sentinel pseudo-indices
    /// included) and returns the copy's index.
    pub fn push_slot(&self, index: c_int) -> Result<c_int> {
        let raw = self.handle.get()?;
        if index > ffi::LUA_REGISTRYINDEX {
            unsafe { checked_slot(raw, index) }?;
        }
        unsafe { ffi::lua_pushvalue(raw, index) };
        Ok(unsafe { ffi::lua_gettop(raw) })
    }

    /// Classifies the slot at `index`. Fails with an index error when the
    /// engine reports no value there.
    pub fn type_of(&self, index: c_int) -> Result<ValueType> {
        let raw = self.handle.get()?;
        ValueType::from_tag(unsafe { ffi::lua_type(raw, index) }, index)
    }

    /// Compares two slots. With `raw` set, primitive comparison only;
    /// otherwise user-level equality metamethods may run.
    pub fn equal(&self, index1: c_int, index2: c_int, raw_compare: bool) -> Result<bool> {
        let raw = self.handle.get()?;
        let res = if raw_compare {
            unsafe { ffi::lua_rawequal(raw, index1, index2) }
        } else {
            unsafe { ffi::lua_equal(raw, index1, index2) }
        };
        Ok(res != 0)
    }

    /// Decoded value of the slot at `index`; tables come back as handles,
    /// never copies.
    pub fn get(&self, index: c_int) -> Result<Value> {
        let raw = self.handle.get()?;
        unsafe { decode(raw, index) }
    }

    /// Encodes `value` onto the stack and returns the new top index, i.e.
    /// the pushed slot's absolute position.
    pub fn push(&self, value: impl Into<Value>) -> Result<c_int> {
        self.push_value(&value.into())
    }

    /// Non-consuming variant of [`Stack::push`].
    pub fn push_value(&self, value: &Value) -> Result<c_int> {
        let raw = self.handle.get()?;
        unsafe { encode(raw, value) }?;
        Ok(unsafe { ffi::lua_gettop(raw) })
    }

    /// Pops the `count` topmost slots and pushes their concatenation as one
    /// string slot. Every popped slot must be a string or a number.
    pub fn concat(&self, count: c_int) -> Result<()> {
        let raw = self.handle.get()?;
        if count < 0 {
            return Err(Error::Argument("concat count must not be negative".into()));
        }
        let top = unsafe { ffi::lua_gettop(raw) };
        if count > top {
            return Err(Error::Argument(format!(
                "cannot concatenate {count} slots, only {top} on the stack"
            )));
        }
        for offset in 0..count {
            let index = -1 - offset;
            match self.type_of(index)? {
                ValueType::String | ValueType::Number => {}
                other => {
                    return Err(Error::Type(format!(
                        "slot {index} holds a {other:?}, which cannot be concatenated"
                    )));
                }
            }
        }
        unsafe { ffi::lua_concat(raw, count) };
        Ok(())
    }

    /// Transfers the `count` topmost slots to `destination`, which must
    /// share this stack's engine instance. Order is preserved.
    pub fn move_to(&self, destination: &Stack<'_>, count: c_int) -> Result<()> {
        let from = self.handle.get()?;
        let to = destination.handle.get()?;
        if count < 0 {
            return Err(Error::Argument("move count must not be negative".into()));
        }
        let top = unsafe { ffi::lua_gettop(from) };
        if count > top {
            return Err(Error::Argument(format!(
                "cannot move {count} slots, only {top} on the stack"
            )));
        }
        unsafe { ffi::lua_xmove(from, to, count) };
        Ok(())
    }

    /// Renders the whole stack as one human-readable line, bottom first.
    /// The error handler appends this to its diagnostics.
    pub fn render(&self) -> Result<String> {
        let raw = self.handle.get()?;
        Ok(unsafe { render_stack(raw) })
    }
}

/// Raw-pointer form of [`Stack::render`], usable from inside callbacks.
pub(crate) unsafe fn render_stack(raw: *mut ffi::lua_State) -> String {
    let top = unsafe { ffi::lua_gettop(raw) };
    let mut out = String::from("[");
    for index in 1..=top {
        if index > 1 {
            out.push(',');
        }
        out.push(' ');
        match unsafe { decode(raw, index) } {
            Ok(Value::Nil) => out.push_str("(nil)"),
            Ok(Value::Boolean(b)) => out.push_str(if b { "true" } else { "false" }),
            Ok(Value::Number(n)) => out.push_str(&n.to_string()),
            Ok(Value::Str(s)) => out.push_str(&s),
            Ok(Value::Table(_)) => out.push_str("(table)"),
            Ok(Value::Function(_)) => out.push_str("(function)"),
            Ok(Value::LightUserdata(_)) => out.push_str("(userdata)"),
            Ok(Value::Thread(_)) => out.push_str("(thread)"),
            Err(_) => out.push_str("(unknown)"),
        }
    }
    out.push_str(" ]");
    out
}

/// Validates that `index` addresses an existing ordinary slot (not a
/// pseudo-index) and returns its absolute form.
unsafe fn checked_slot(raw: *mut ffi::lua_State, index: c_int) -> Result<c_int> {
    if index <= ffi::LUA_REGISTRYINDEX {
        return Err(Error::Index(index));
    }
    let abs = unsafe { absolute(raw, index) };
    let top = unsafe { ffi::lua_gettop(raw) };
    if abs < 1 || abs > top {
        return Err(Error::Index(index));
    }
    Ok(abs)
}

/// Human-readable name of an engine type, for diagnostics.
pub(crate) unsafe fn type_name(raw: *mut ffi::lua_State, tag: c_int) -> String {
    let ptr = unsafe { ffi::lua_typename(raw, tag) };
    if ptr.is_null() {
        return "unknown".to_owned();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
