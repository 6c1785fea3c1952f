//! Lunet runtime: a safe embedding layer over the Lua scripting engine.
//!
//! Key design principles:
//! - Value: the tagged union the host exchanges with stack slots; engine
//!   composites stay references, never deep copies
//! - Stack: a borrowed, index-addressed view over one state's value stack
//! - Interp: the single owner of one engine handle; tables, the GC surface,
//!   and coroutines borrow from it and cannot outlive it
//!
//! One engine family (a root state plus its coroutine threads) is a single
//! logical thread of control: nothing here is `Send`, and callers provide
//! mutual exclusion per engine instance, not per operation.

pub mod callback;
pub mod debug;
pub mod error;
pub mod gc;
pub mod library;
pub mod stack;
pub mod state;
mod stdlib;
pub mod table;
pub mod thread;
pub mod value;

// Re-export key types
pub use callback::FunctionArgs;
pub use debug::DebugInfo;
pub use error::{Error, Result};
pub use gc::Gc;
pub use library::{Library, LibraryDescriptor, Version};
pub use stack::Stack;
pub use state::Interp;
pub use table::{Table, Tables};
pub use thread::{Coroutine, CoroutineStatus, move_values};
pub use value::{Callback, FunctionRef, TableKey, TableRef, ThreadRef, Value, ValueType};

/// Raw engine surface, for use alongside [`Interp::raw`].
pub use lunet_sys as sys;
