//! Garbage-collector control surface.
//!
//! The engine exposes its collector through a single command word; this
//! view wraps the three controls the host needs: the allocated count, the
//! cycle pause, and a forced full pass. One collector serves a root state
//! and all coroutine threads spawned from it.

use core::ffi::c_int;

use lunet_sys as ffi;

use crate::error::Result;
use crate::state::RawHandle;

pub struct Gc<'l> {
    handle: &'l RawHandle,
}

impl<'l> Gc<'l> {
    pub(crate) fn new(handle: &'l RawHandle) -> Self {
        Self { handle }
    }

    /// Memory currently in use by the engine, in KiB.
    pub fn total_memory(&self) -> Result<c_int> {
        let raw = self.handle.get()?;
        Ok(unsafe { ffi::lua_gc(raw, ffi::LUA_GCCOUNT, 0) })
    }

    /// Sets the collector pause (how much allocation growth the collector
    /// waits for before starting a new cycle, in percent) and returns the
    /// previous value.
    pub fn set_pause(&self, pause: c_int) -> Result<c_int> {
        let raw = self.handle.get()?;
        Ok(unsafe { ffi::lua_gc(raw, ffi::LUA_GCSETPAUSE, pause) })
    }

    /// Runs a full collection cycle immediately.
    pub fn collect(&self) -> Result<()> {
        let raw = self.handle.get()?;
        unsafe { ffi::lua_gc(raw, ffi::LUA_GCCOLLECT, 0) };
        Ok(())
    }
}
