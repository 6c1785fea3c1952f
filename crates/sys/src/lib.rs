//! Raw FFI surface of the embedded Lua 5.1 engine.
//!
//! This crate declares exactly the low-level call surface the runtime crate
//! consumes: state open/close, chunk loading, protected calls, the stack
//! primitives, table access, the garbage-collector command word, coroutine
//! create/resume/yield/move, and the stack-frame info query. The engine
//! itself is vendored and compiled by the build script; nothing here links
//! against a system Lua.
//!
//! Everything is a direct transliteration of `lua.h`/`lauxlib.h`; the few
//! C macros the runtime needs (`lua_pop`, `lua_newtable`,
//! `lua_pushcfunction`) are provided as inline functions at the bottom.

#![allow(non_camel_case_types, non_snake_case)]
#![allow(clippy::missing_safety_doc)]

use core::ffi::{c_char, c_int, c_void};
use core::marker::{PhantomData, PhantomPinned};

/// Opaque engine state. Only ever handled behind a raw pointer.
#[repr(C)]
pub struct lua_State {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// The engine's single numeric representation.
pub type lua_Number = f64;
pub type lua_Integer = isize;

/// A C function callable from the engine: takes the calling state, leaves
/// its results on that state's stack, and returns how many it left.
pub type lua_CFunction = unsafe extern "C" fn(L: *mut lua_State) -> c_int;

/// Option for "no more results" / `lua_pcall` result counts.
pub const LUA_MULTRET: c_int = -1;

// Pseudo-indices. Anything at or below `LUA_REGISTRYINDEX` addresses one of
// the engine's permanent tables rather than a stack slot.
pub const LUA_REGISTRYINDEX: c_int = -10000;
pub const LUA_ENVIRONINDEX: c_int = -10001;
pub const LUA_GLOBALSINDEX: c_int = -10002;

// Thread / call status words.
pub const LUA_OK: c_int = 0;
pub const LUA_YIELD: c_int = 1;
pub const LUA_ERRRUN: c_int = 2;
pub const LUA_ERRSYNTAX: c_int = 3;
pub const LUA_ERRMEM: c_int = 4;
pub const LUA_ERRERR: c_int = 5;
/// Reported by `luaL_loadfile` when the file cannot be opened or read.
pub const LUA_ERRFILE: c_int = LUA_ERRERR + 1;

// Type tags as reported by `lua_type`.
pub const LUA_TNONE: c_int = -1;
pub const LUA_TNIL: c_int = 0;
pub const LUA_TBOOLEAN: c_int = 1;
pub const LUA_TLIGHTUSERDATA: c_int = 2;
pub const LUA_TNUMBER: c_int = 3;
pub const LUA_TSTRING: c_int = 4;
pub const LUA_TTABLE: c_int = 5;
pub const LUA_TFUNCTION: c_int = 6;
pub const LUA_TUSERDATA: c_int = 7;
pub const LUA_TTHREAD: c_int = 8;

/// Free stack slots guaranteed to a C function on entry.
pub const LUA_MINSTACK: c_int = 20;

// Garbage-collector command word for `lua_gc`.
pub const LUA_GCSTOP: c_int = 0;
pub const LUA_GCRESTART: c_int = 1;
pub const LUA_GCCOLLECT: c_int = 2;
pub const LUA_GCCOUNT: c_int = 3;
pub const LUA_GCCOUNTB: c_int = 4;
pub const LUA_GCSTEP: c_int = 5;
pub const LUA_GCSETPAUSE: c_int = 6;
pub const LUA_GCSETSTEPMUL: c_int = 7;

/// Size of the `short_src` buffer in [`lua_Debug`].
pub const LUA_IDSIZE: usize = 60;

/// Stack-frame information record filled by `lua_getstack`/`lua_getinfo`.
/// Field layout must match the engine's `lua_Debug` exactly.
#[repr(C)]
pub struct lua_Debug {
    pub event: c_int,
    pub name: *const c_char,
    pub namewhat: *const c_char,
    pub what: *const c_char,
    pub source: *const c_char,
    pub currentline: c_int,
    pub nups: c_int,
    pub linedefined: c_int,
    pub lastlinedefined: c_int,
    pub short_src: [c_char; LUA_IDSIZE],
    /// Engine-private active-function cursor; never meaningful to hosts.
    pub i_ci: c_int,
}

unsafe extern "C" {
    // State manipulation
    pub fn lua_close(L: *mut lua_State);
    pub fn lua_newthread(L: *mut lua_State) -> *mut lua_State;
    pub fn lua_atpanic(L: *mut lua_State, panicf: lua_CFunction) -> Option<lua_CFunction>;

    // Basic stack manipulation
    pub fn lua_gettop(L: *mut lua_State) -> c_int;
    pub fn lua_settop(L: *mut lua_State, idx: c_int);
    pub fn lua_pushvalue(L: *mut lua_State, idx: c_int);
    pub fn lua_remove(L: *mut lua_State, idx: c_int);
    pub fn lua_insert(L: *mut lua_State, idx: c_int);
    pub fn lua_replace(L: *mut lua_State, idx: c_int);
    pub fn lua_checkstack(L: *mut lua_State, sz: c_int) -> c_int;
    pub fn lua_xmove(from: *mut lua_State, to: *mut lua_State, n: c_int);

    // Access functions (stack -> host)
    pub fn lua_type(L: *mut lua_State, idx: c_int) -> c_int;
    pub fn lua_typename(L: *mut lua_State, tp: c_int) -> *const c_char;
    pub fn lua_equal(L: *mut lua_State, idx1: c_int, idx2: c_int) -> c_int;
    pub fn lua_rawequal(L: *mut lua_State, idx1: c_int, idx2: c_int) -> c_int;
    pub fn lua_tonumber(L: *mut lua_State, idx: c_int) -> lua_Number;
    pub fn lua_toboolean(L: *mut lua_State, idx: c_int) -> c_int;
    pub fn lua_tolstring(L: *mut lua_State, idx: c_int, len: *mut usize) -> *const c_char;
    pub fn lua_tocfunction(L: *mut lua_State, idx: c_int) -> Option<lua_CFunction>;
    pub fn lua_touserdata(L: *mut lua_State, idx: c_int) -> *mut c_void;
    pub fn lua_tothread(L: *mut lua_State, idx: c_int) -> *mut lua_State;
    pub fn lua_topointer(L: *mut lua_State, idx: c_int) -> *const c_void;

    // Push functions (host -> stack)
    pub fn lua_pushnil(L: *mut lua_State);
    pub fn lua_pushnumber(L: *mut lua_State, n: lua_Number);
    pub fn lua_pushlstring(L: *mut lua_State, s: *const c_char, l: usize);
    pub fn lua_pushstring(L: *mut lua_State, s: *const c_char);
    pub fn lua_pushcclosure(L: *mut lua_State, f: lua_CFunction, n: c_int);
    pub fn lua_pushboolean(L: *mut lua_State, b: c_int);
    pub fn lua_pushlightuserdata(L: *mut lua_State, p: *mut c_void);

    // Tables
    pub fn lua_gettable(L: *mut lua_State, idx: c_int);
    pub fn lua_settable(L: *mut lua_State, idx: c_int);
    pub fn lua_createtable(L: *mut lua_State, narr: c_int, nrec: c_int);
    pub fn lua_next(L: *mut lua_State, idx: c_int) -> c_int;

    // Calls and errors
    pub fn lua_call(L: *mut lua_State, nargs: c_int, nresults: c_int);
    pub fn lua_pcall(L: *mut lua_State, nargs: c_int, nresults: c_int, errfunc: c_int) -> c_int;
    pub fn lua_error(L: *mut lua_State) -> c_int;
    pub fn lua_concat(L: *mut lua_State, n: c_int);

    // Coroutines
    pub fn lua_yield(L: *mut lua_State, nresults: c_int) -> c_int;
    pub fn lua_resume(L: *mut lua_State, narg: c_int) -> c_int;
    pub fn lua_status(L: *mut lua_State) -> c_int;

    // Garbage collector
    pub fn lua_gc(L: *mut lua_State, what: c_int, data: c_int) -> c_int;

    // Debug interface
    pub fn lua_getstack(L: *mut lua_State, level: c_int, ar: *mut lua_Debug) -> c_int;
    pub fn lua_getinfo(L: *mut lua_State, what: *const c_char, ar: *mut lua_Debug) -> c_int;

    // Auxiliary library
    pub fn luaL_newstate() -> *mut lua_State;
    pub fn luaL_openlibs(L: *mut lua_State);
    pub fn luaL_loadbuffer(
        L: *mut lua_State,
        buff: *const c_char,
        sz: usize,
        name: *const c_char,
    ) -> c_int;
    pub fn luaL_loadfile(L: *mut lua_State, filename: *const c_char) -> c_int;
}

/// `lua_pop` macro equivalent: drops the `n` topmost slots.
#[inline]
pub unsafe fn lua_pop(L: *mut lua_State, n: c_int) {
    unsafe { lua_settop(L, -n - 1) }
}

/// `lua_newtable` macro equivalent: pushes a fresh empty table.
#[inline]
pub unsafe fn lua_newtable(L: *mut lua_State) {
    unsafe { lua_createtable(L, 0, 0) }
}

/// `lua_pushcfunction` macro equivalent: pushes a C function with no
/// upvalues.
#[inline]
pub unsafe fn lua_pushcfunction(L: *mut lua_State, f: lua_CFunction) {
    unsafe { lua_pushcclosure(L, f, 0) }
}
