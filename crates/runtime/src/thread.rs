//! Cooperative thread (coroutine) bridge.
//!
//! A coroutine is an interpreter-state variant: a secondary execution
//! context spawned from a root state, sharing its global environment and
//! collector but owning a separate value stack. Only one context in the
//! family runs at a time; `resume` blocks the caller until the target
//! yields, returns, or errors.
//!
//! The state machine is tracked host-side: suspended → running →
//! suspended (yield) or dead (return/error). There is no way out of dead.

use core::cell::Cell;
use core::ffi::c_int;
use core::marker::PhantomData;

use lunet_sys as ffi;
use tracing::trace;

use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::state::{self, Interp, RawHandle};
use crate::table::Tables;
use crate::value::{ThreadRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStatus {
    /// Never resumed, or suspended at a yield.
    Suspended,
    /// Inside a resume call.
    Running,
    /// Returned without yielding, or raised an error. Final.
    Dead,
}

/// A coroutine thread. Holds a non-owning reference to the engine family;
/// the root state stays the single owner and must outlive the coroutine
/// (enforced by the borrow).
pub struct Coroutine<'l> {
    handle: RawHandle,
    status: Cell<CoroutineStatus>,
    _parent: PhantomData<&'l Interp>,
}

impl<'l> Coroutine<'l> {
    /// Spawns a new thread from `parent`. The thread object is left
    /// anchored on the parent's stack, which keeps it alive for the
    /// collector; do not remove that slot while the coroutine is in use.
    pub fn new(parent: &'l Interp) -> Result<Self> {
        let raw = parent.raw()?;
        let thread = unsafe { ffi::lua_newthread(raw) };
        trace!(parent = ?raw, thread = ?thread, "spawned coroutine thread");
        Ok(Self {
            handle: RawHandle::new(thread),
            status: Cell::new(CoroutineStatus::Suspended),
            _parent: PhantomData,
        })
    }

    /// Wraps an already-running thread decoded from `parent`'s stack.
    pub fn from_ref(parent: &'l Interp, reference: ThreadRef) -> Result<Self> {
        parent.raw()?;
        unsafe { Self::from_raw(reference.raw()) }
    }

    /// Wraps the thread handle a callback was entered with, so the callback
    /// can yield through it. Non-owning, like every thread wrapper.
    ///
    /// # Safety
    /// `raw` must be a live thread handle that outlives the wrapper.
    pub unsafe fn from_raw(raw: *mut ffi::lua_State) -> Result<Coroutine<'static>> {
        if raw.is_null() {
            return Err(Error::Argument("thread reference must not be null".into()));
        }
        let status = match unsafe { ffi::lua_status(raw) } {
            ffi::LUA_OK | ffi::LUA_YIELD => CoroutineStatus::Suspended,
            _ => CoroutineStatus::Dead,
        };
        Ok(Coroutine {
            handle: RawHandle::new(raw),
            status: Cell::new(status),
            _parent: PhantomData,
        })
    }

    /// Raw engine handle of this thread.
    pub fn raw(&self) -> Result<*mut ffi::lua_State> {
        self.handle.get()
    }

    /// This thread's own value stack.
    pub fn stack(&self) -> Stack<'_> {
        Stack::new(&self.handle)
    }

    /// Table registry over this thread's stack. The sentinels address the
    /// same global environment and registry the parent sees.
    pub fn tables(&self) -> Tables<'_> {
        Tables::new(&self.handle)
    }

    /// Compiles a chunk onto this thread's stack; resume then runs it.
    pub fn load(&self, source: &str, chunk_name: &str) -> Result<()> {
        state::load_chunk(&self.handle, source, chunk_name)
    }

    /// Current position in the thread state machine.
    pub fn status(&self) -> CoroutineStatus {
        self.status.get()
    }

    /// Transfers control to this thread, handing it the `argument_count`
    /// topmost values of its stack. Blocks until the thread yields (result:
    /// suspended), returns (result: dead), or errors. Resuming a dead
    /// coroutine is a lifecycle error.
    pub fn resume(&self, argument_count: c_int) -> Result<CoroutineStatus> {
        if self.status.get() == CoroutineStatus::Dead {
            return Err(Error::Lifecycle("cannot resume a dead coroutine"));
        }
        let raw = self.handle.get()?;
        self.status.set(CoroutineStatus::Running);
        let status = unsafe { ffi::lua_resume(raw, argument_count) };
        trace!(status, "coroutine resume finished");
        match status {
            ffi::LUA_OK => {
                self.status.set(CoroutineStatus::Dead);
                Ok(CoroutineStatus::Dead)
            }
            ffi::LUA_YIELD => {
                self.status.set(CoroutineStatus::Suspended);
                Ok(CoroutineStatus::Suspended)
            }
            _ => {
                self.status.set(CoroutineStatus::Dead);
                // A string on top of the thread stack is the error message;
                // pop and raise it, otherwise raise unclassified.
                Err(Error::Runtime(state::take_error_message(raw)))
            }
        }
    }

    /// Pushes `arguments` onto the thread stack, then resumes with them.
    pub fn resume_with(&self, arguments: &[Value]) -> Result<CoroutineStatus> {
        let stack = self.stack();
        for value in arguments {
            stack.push_value(value)?;
        }
        self.resume(arguments.len() as c_int)
    }

    /// Suspends this thread, returning the `result_count` topmost stack
    /// values to the caller of resume. The returned status code must itself
    /// be returned by the enclosing callback: suspension only takes effect
    /// once it propagates through the native call boundary. Only valid
    /// while executing inside this thread's resume.
    pub fn yield_n(&self, result_count: c_int) -> Result<c_int> {
        let raw = self.handle.get()?;
        Ok(unsafe { ffi::lua_yield(raw, result_count) })
    }

    /// Pushes `results`, then yields them. Same propagation contract as
    /// [`Coroutine::yield_n`].
    pub fn yield_values(&self, results: &[Value]) -> Result<c_int> {
        let stack = self.stack();
        for value in results {
            stack.push_value(value)?;
        }
        self.yield_n(results.len() as c_int)
    }
}

/// Transfers the top `count` values from `source`'s stack to
/// `destination`'s, preserving order. Both threads must belong to the same
/// engine instance.
pub fn move_values(
    source: &Coroutine<'_>,
    destination: &Coroutine<'_>,
    count: c_int,
) -> Result<()> {
    source.stack().move_to(&destination.stack(), count)
}
