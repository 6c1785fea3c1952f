//! Read-only call-stack introspection.
//!
//! A `DebugInfo` is a snapshot of one frame, taken at construction; its
//! fields do not refresh if the underlying frame changes. Levels count from
//! the currently executing function (0) up through the caller chain.

use core::ffi::{c_char, c_int};
use std::ffi::CStr;

use lunet_sys as ffi;

use crate::error::{Error, Result};
use crate::state::{Interp, RawHandle};
use crate::table::Table;
use crate::value::ValueType;

pub struct DebugInfo<'l> {
    handle: &'l RawHandle,
    level: Option<c_int>,
    source: String,
    short_source: String,
    current_line: c_int,
    line_defined: c_int,
    what: String,
    name: Option<String>,
    name_what: String,
    upvalues: c_int,
}

impl<'l> DebugInfo<'l> {
    /// Snapshot of the active frame at `level`: 0 is the currently
    /// executing function, increasing levels walk the caller chain. Fails
    /// with an index error once the chain is exhausted.
    pub fn from_level(state: &'l Interp, level: c_int) -> Result<Self> {
        Self::at_level(&state.handle, level)
    }

    /// Snapshot of a non-active function resolved from `table` by name.
    /// Active-frame fields (like the current line) are meaningless here,
    /// and the snapshot has no level to walk callers from.
    pub fn from_function(state: &'l Interp, name: &str, table: &Table<'_>) -> Result<Self> {
        let raw = state.handle.get()?;
        if table.to_ref()?.state != raw {
            return Err(Error::Argument(
                "table belongs to a different state".into(),
            ));
        }
        let stack = state.stack();
        stack.push(name)?;
        table.get_table()?;
        if stack.type_of(-1)? != ValueType::Function {
            stack.pop(1)?;
            return Err(Error::Type(format!("'{name}' does not resolve to a function")));
        }
        let mut record: ffi::lua_Debug = unsafe { std::mem::zeroed() };
        // The '>' prefix makes the query consume the function on top of the
        // stack instead of addressing an active frame.
        if unsafe { ffi::lua_getinfo(raw, c">nSlu".as_ptr(), &mut record) } == 0 {
            return Err(Error::Runtime(
                "error while retrieving debug information".into(),
            ));
        }
        Ok(Self::from_record(&state.handle, None, &record))
    }

    fn at_level(handle: &'l RawHandle, level: c_int) -> Result<Self> {
        let raw = handle.get()?;
        let mut record: ffi::lua_Debug = unsafe { std::mem::zeroed() };
        if unsafe { ffi::lua_getstack(raw, level, &mut record) } == 0 {
            // Called with a depth greater than the call-stack depth.
            return Err(Error::Index(level));
        }
        if unsafe { ffi::lua_getinfo(raw, c"nSlu".as_ptr(), &mut record) } == 0 {
            return Err(Error::Runtime(
                "error while retrieving debug information".into(),
            ));
        }
        Ok(Self::from_record(handle, Some(level), &record))
    }

    fn from_record(handle: &'l RawHandle, level: Option<c_int>, record: &ffi::lua_Debug) -> Self {
        Self {
            handle,
            level,
            source: owned_cstr(record.source).unwrap_or_default(),
            short_source: owned_cstr(record.short_src.as_ptr()).unwrap_or_default(),
            current_line: record.currentline,
            line_defined: record.linedefined,
            what: owned_cstr(record.what).unwrap_or_default(),
            name: owned_cstr(record.name),
            name_what: owned_cstr(record.namewhat).unwrap_or_default(),
            upvalues: record.nups,
        }
    }

    /// Name of the chunk the function came from: the chunk name for string
    /// chunks, `@` plus the file name for file chunks.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shortened, printable version of [`DebugInfo::source`].
    pub fn short_source(&self) -> &str {
        &self.short_source
    }

    /// Line currently executing; -1 for a non-active snapshot.
    pub fn current_line(&self) -> c_int {
        self.current_line
    }

    /// Line where the function's definition starts.
    pub fn line_defined(&self) -> c_int {
        self.line_defined
    }

    /// Function kind tag: "Lua", "C", "main", or "tail".
    pub fn what(&self) -> &str {
        &self.what
    }

    /// A reasonable name for the function, when the engine can infer one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// How [`DebugInfo::name`] was inferred: "global", "local", "method",
    /// "field", or empty.
    pub fn name_what(&self) -> &str {
        &self.name_what
    }

    /// Number of upvalues of the function.
    pub fn upvalue_count(&self) -> c_int {
        self.upvalues
    }

    /// Level this snapshot was taken from; absent for non-active functions.
    pub fn level(&self) -> Option<c_int> {
        self.level
    }

    /// Probes whether the snapshot's frame has a caller, without disturbing
    /// the snapshot.
    pub fn has_caller(&self) -> bool {
        let Some(level) = self.level else {
            return false;
        };
        let Ok(raw) = self.handle.get() else {
            return false;
        };
        let mut record: ffi::lua_Debug = unsafe { std::mem::zeroed() };
        (unsafe { ffi::lua_getstack(raw, level + 1, &mut record) }) == 1
    }

    /// Snapshot of the caller's frame, one level up. Fails when this
    /// snapshot was constructed from a non-active function.
    pub fn caller(&self) -> Result<DebugInfo<'l>> {
        let level = self.level.ok_or(Error::Argument(
            "debug info was constructed from a non-active function".into(),
        ))?;
        Self::at_level(self.handle, level + 1)
    }
}

fn owned_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}
