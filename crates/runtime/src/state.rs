//! Interpreter state ownership and protected execution.
//!
//! `Interp` is the single owner of one engine handle. The stack view, the
//! table registry, and the GC surface are borrowed views bound to it; they
//! hold a reference to the handle cell, never a copy, so closing the state
//! makes every outstanding operation fail with a lifecycle error instead of
//! touching freed engine memory.

use core::cell::Cell;
use core::ffi::c_int;
use std::ffi::{CStr, CString};

use lunet_sys as ffi;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::gc::Gc;
use crate::stack::{self, Stack};
use crate::table::Tables;
use crate::value::{Callback, Value};

/// Shared cell holding the native handle. Transitions non-null to null
/// exactly once, at close.
pub(crate) struct RawHandle {
    ptr: Cell<*mut ffi::lua_State>,
}

impl RawHandle {
    pub(crate) fn new(ptr: *mut ffi::lua_State) -> Self {
        Self { ptr: Cell::new(ptr) }
    }

    /// Live handle, or a lifecycle error once the owner has been closed.
    pub(crate) fn get(&self) -> Result<*mut ffi::lua_State> {
        let ptr = self.ptr.get();
        if ptr.is_null() {
            Err(Error::Lifecycle("operation on a closed state"))
        } else {
            Ok(ptr)
        }
    }

    fn invalidate(&self) -> *mut ffi::lua_State {
        self.ptr.replace(std::ptr::null_mut())
    }
}

/// One interpreter state: the owning handle for an engine instance, plus
/// the stack-resident protected-call error handler.
pub struct Interp {
    pub(crate) handle: RawHandle,
    owned: bool,
    handler: Cell<c_int>,
}

impl Interp {
    /// Opens a fresh engine instance, loads the standard library set and
    /// the bundled `std` host library, and installs the error handler.
    pub fn new() -> Result<Self> {
        let raw = unsafe { ffi::luaL_newstate() };
        if raw.is_null() {
            return Err(Error::Init);
        }
        let interp = Interp {
            handle: RawHandle::new(raw),
            owned: true,
            handler: Cell::new(0),
        };
        unsafe { ffi::luaL_openlibs(raw) };
        crate::stdlib::install(&interp)?;
        interp.register_error_handler()?;
        debug!(state = ?raw, "opened interpreter state");
        Ok(interp)
    }

    /// Opens a fresh state and loads (without running) the given file.
    pub fn open_file(path: &str) -> Result<Self> {
        let interp = Self::new()?;
        interp.load_file(path)?;
        Ok(interp)
    }

    /// Adopts an already-open engine handle. Nothing is loaded and no error
    /// handler is installed unless [`Interp::register_error_handler`] is
    /// called explicitly. The wrapper is non-owning: dropping or closing it
    /// never closes the engine.
    ///
    /// # Safety
    /// `raw` must be a live engine handle that outlives the wrapper.
    pub unsafe fn from_raw(raw: *mut ffi::lua_State) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::Argument("state must not be null".into()));
        }
        Ok(Interp {
            handle: RawHandle::new(raw),
            owned: false,
            handler: Cell::new(0),
        })
    }

    /// Pushes the host-side error interceptor onto the stack, records its
    /// index as the default protected-call error handler, and installs it
    /// as the engine's panic handler. Returns the handler's stack index.
    pub fn register_error_handler(&self) -> Result<c_int> {
        let raw = self.handle.get()?;
        let index = self.stack().push(error_handler as Callback)?;
        self.handler.set(index);
        unsafe { ffi::lua_atpanic(raw, error_handler) };
        Ok(index)
    }

    /// Stack index of the installed error handler; 0 when none.
    pub fn error_handler_index(&self) -> c_int {
        self.handler.get()
    }

    /// The native engine handle, usable with any other engine API.
    pub fn raw(&self) -> Result<*mut ffi::lua_State> {
        self.handle.get()
    }

    /// The value stack of this state.
    pub fn stack(&self) -> Stack<'_> {
        Stack::new(&self.handle)
    }

    /// The table registry of this state.
    pub fn tables(&self) -> Tables<'_> {
        Tables::new(&self.handle)
    }

    /// The garbage-collector control surface of this state.
    pub fn gc(&self) -> Gc<'_> {
        Gc::new(&self.handle)
    }

    /// Compiles `source` as a chunk named `chunk_name` and leaves the
    /// resulting function on the stack, without running it.
    pub fn load(&self, source: &str, chunk_name: &str) -> Result<()> {
        trace!(chunk_name, "loading chunk");
        load_chunk(&self.handle, source, chunk_name)
    }

    /// Compiles the file at `path` and leaves the resulting function on the
    /// stack, without running it.
    pub fn load_file(&self, path: &str) -> Result<()> {
        trace!(path, "loading chunk from file");
        load_chunk_file(&self.handle, path)
    }

    /// Pushes each argument and runs the function below them (usually the
    /// chunk a preceding `load` produced) under the installed error
    /// handler, expecting `return_count` results.
    pub fn execute(&self, return_count: c_int, arguments: &[Value]) -> Result<()> {
        let raw = self.handle.get()?;
        let stack = self.stack();
        let base = stack.top_index()?;
        for value in arguments {
            if let Err(e) = stack.push_value(value) {
                // Do not leave a partial argument list behind.
                let _ = stack.set_top(base);
                return Err(e);
            }
        }
        let status = unsafe {
            ffi::lua_pcall(raw, arguments.len() as c_int, return_count, self.handler.get())
        };
        check_call_status(raw, status)
    }

    /// Resolves `name` in the global namespace and calls it. The resolution
    /// is a presence check only; anything non-nil is handed to the
    /// protected call as-is.
    pub fn call(&self, name: &str, return_count: c_int, arguments: &[Value]) -> Result<()> {
        let resolved = self.tables().global().get_value(name)?;
        if resolved.is_nil() {
            // Drop the nil the lookup left behind before raising.
            self.stack().pop(1)?;
            return Err(Error::Argument(format!(
                "the function '{name}' does not exist in the global namespace"
            )));
        }
        self.execute(return_count, arguments)
    }

    /// Binds a single callback into the global namespace under `name`.
    pub fn register(&self, name: &str, callback: Callback) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Argument("callback name must not be empty".into()));
        }
        self.tables().global().set_value(name, callback)
    }

    /// Reads a global by key, removing the lookup result from the stack.
    pub fn get_global(&self, key: impl Into<Value>) -> Result<Value> {
        self.tables().global().pop(key)
    }

    /// Writes a global; writing nil removes the key.
    pub fn set_global(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        self.tables().global().set_value(key, value)
    }

    /// Closes the state. The handle transitions to closed exactly once and
    /// every later operation fails with a lifecycle error; a second close
    /// is a no-op. Closing an adopted wrapper only invalidates the wrapper.
    pub fn close(&mut self) {
        let ptr = self.handle.invalidate();
        if !ptr.is_null() && self.owned {
            debug!(state = ?ptr, "closing interpreter state");
            unsafe { ffi::lua_close(ptr) };
        }
    }
}

impl Drop for Interp {
    fn drop(&mut self) {
        self.close();
    }
}

/// Compiles a text chunk onto the given state's stack.
pub(crate) fn load_chunk(handle: &RawHandle, source: &str, chunk_name: &str) -> Result<()> {
    let raw = handle.get()?;
    let name = CString::new(chunk_name)
        .map_err(|_| Error::Argument("chunk name must not contain NUL bytes".into()))?;
    let status = unsafe {
        ffi::luaL_loadbuffer(raw, source.as_ptr().cast(), source.len(), name.as_ptr())
    };
    check_load_status(raw, status)
}

/// Compiles a file chunk onto the given state's stack.
pub(crate) fn load_chunk_file(handle: &RawHandle, path: &str) -> Result<()> {
    let raw = handle.get()?;
    let path = CString::new(path)
        .map_err(|_| Error::Argument("file path must not contain NUL bytes".into()))?;
    let status = unsafe { ffi::luaL_loadfile(raw, path.as_ptr()) };
    check_load_status(raw, status)
}

/// Classifies a chunk-load status. A failed load leaves its message on the
/// stack; it is popped here after extraction so the stack ends consistent.
fn check_load_status(raw: *mut ffi::lua_State, status: c_int) -> Result<()> {
    match status {
        ffi::LUA_OK => Ok(()),
        ffi::LUA_ERRSYNTAX => Err(Error::Syntax(take_error_message(raw))),
        ffi::LUA_ERRMEM => {
            let _ = take_error_message(raw);
            Err(Error::Resource("allocation failure while loading a chunk"))
        }
        ffi::LUA_ERRFILE => Err(Error::Runtime(take_error_message(raw))),
        other => Err(Error::UnknownStatus(other)),
    }
}

/// Classifies a protected-call status. On failure the state itself remains
/// usable; only the in-flight call is abandoned.
fn check_call_status(raw: *mut ffi::lua_State, status: c_int) -> Result<()> {
    trace!(status, "protected call finished");
    match status {
        ffi::LUA_OK => Ok(()),
        ffi::LUA_ERRRUN | ffi::LUA_ERRERR => Err(Error::Runtime(take_error_message(raw))),
        ffi::LUA_ERRMEM => {
            let _ = take_error_message(raw);
            Err(Error::Resource("allocation failure during a protected call"))
        }
        ffi::LUA_ERRSYNTAX => Err(Error::Syntax(take_error_message(raw))),
        other => Err(Error::UnknownStatus(other)),
    }
}

/// Pops the engine's error message off the stack when it left one.
pub(crate) fn take_error_message(raw: *mut ffi::lua_State) -> String {
    unsafe {
        if ffi::lua_type(raw, -1) == ffi::LUA_TSTRING {
            let message = stack::read_string(raw, -1).unwrap_or_default();
            ffi::lua_pop(raw, 1);
            message
        } else {
            "the subsystem caused an unknown error".to_owned()
        }
    }
}

/// Host-side error interceptor. As a protected-call handler it replaces the
/// error message with message-plus-call-stack-snapshot; as the panic
/// handler it logs that text before the engine gives up.
unsafe extern "C" fn error_handler(raw: *mut ffi::lua_State) -> c_int {
    let message = unsafe { describe_error(raw) };
    error!(%message, "script error intercepted");
    unsafe { ffi::lua_pushlstring(raw, message.as_ptr().cast(), message.len()) };
    1
}

/// Formats the error object at slot 1, the value stack, and a walk of the
/// script call stack.
unsafe fn describe_error(raw: *mut ffi::lua_State) -> String {
    let mut message = unsafe { stack::read_string(raw, 1) }
        .unwrap_or_else(|| "(non-string error object)".to_owned());
    message.push_str("\nstack: ");
    message.push_str(&unsafe { stack::render_stack(raw) });
    message.push_str("\nstack traceback:");
    let mut level = 0;
    loop {
        let mut ar: ffi::lua_Debug = unsafe { std::mem::zeroed() };
        if unsafe { ffi::lua_getstack(raw, level, &mut ar) } == 0 {
            break;
        }
        if unsafe { ffi::lua_getinfo(raw, c"Sl".as_ptr(), &mut ar) } != 0 {
            let short = unsafe { CStr::from_ptr(ar.short_src.as_ptr()) }
                .to_string_lossy()
                .into_owned();
            message.push_str(&format!("\n\t{short}:{}", ar.currentline));
        }
        level += 1;
        if level > 32 {
            // Runaway recursion; the first frames are the interesting ones.
            message.push_str("\n\t...");
            break;
        }
    }
    message
}
