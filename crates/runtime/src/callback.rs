//! Per-invocation callback adapter.
//!
//! A callback receives nothing but the raw state handle. `FunctionArgs`
//! turns that into something workable: it adopts the state, snapshots the
//! incoming arguments into an ordered sequence, collects pending return
//! values, and serializes them back onto the stack at `finish`. One adapter
//! lives for exactly one invocation and must never be kept beyond it.

use core::ffi::c_int;

use lunet_sys as ffi;

use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::state::Interp;
use crate::value::{Value, ValueType};

pub struct FunctionArgs {
    state: Interp,
    args: Vec<Value>,
    returns: Vec<Value>,
}

impl FunctionArgs {
    /// Builds the adapter from the handle the callback was entered with.
    ///
    /// Adoption registers the error handler on the callback frame (the one
    /// case where an adopted state requests it), so the handler occupies
    /// the top slot and the snapshot below it, slots `1..top-1`, is
    /// exactly the caller-supplied argument list.
    ///
    /// # Safety
    /// `raw` must be the live state handle passed to the enclosing
    /// callback, and the adapter must not outlive that invocation.
    pub unsafe fn new(raw: *mut ffi::lua_State) -> Result<Self> {
        let state = unsafe { Interp::from_raw(raw) }?;
        state.register_error_handler()?;
        let stack = state.stack();
        let top = stack.top_index()?;
        let mut args = Vec::with_capacity(top.saturating_sub(1) as usize);
        for index in 1..top {
            args.push(stack.get(index)?);
        }
        Ok(Self {
            state,
            args,
            returns: Vec::new(),
        })
    }

    /// The adopted state, for stack or table access during the call.
    pub fn state(&self) -> &Interp {
        &self.state
    }

    /// The calling frame's stack.
    pub fn stack(&self) -> Stack<'_> {
        self.state.stack()
    }

    /// Number of captured arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Captured argument at `index` (0-based). Out-of-range access is an
    /// index error.
    pub fn get(&self, index: usize) -> Result<&Value> {
        self.args.get(index).ok_or(Error::Index(index as c_int))
    }

    /// Type of the captured argument at `index`.
    pub fn arg_type(&self, index: usize) -> Result<ValueType> {
        self.get(index).map(Value::type_of)
    }

    /// Queues a value to be returned to the script.
    pub fn add_return(&mut self, value: impl Into<Value>) {
        self.returns.push(value.into());
    }

    /// Pushes every pending return value in insertion order and returns the
    /// count, which the enclosing callback must itself return to the
    /// engine.
    pub fn finish(self) -> Result<c_int> {
        let stack = self.state.stack();
        for value in &self.returns {
            stack.push_value(value)?;
        }
        Ok(self.returns.len() as c_int)
    }
}
