//! Debug info accessor behavior: level walks, non-active snapshots, and
//! caller probing.

use core::ffi::c_int;

use lunet_runtime::{DebugInfo, Error, FunctionArgs, Interp, Value, sys};

fn fresh() -> Interp {
    Interp::new().expect("interpreter opens")
}

#[test]
fn test_non_active_function_snapshot() {
    let lua = fresh();
    lua.load("function greet(name)\n  return 'hi ' .. name\nend", "greetings")
        .unwrap();
    lua.execute(0, &[]).unwrap();

    let tables = lua.tables();
    let global = tables.global();
    let info = DebugInfo::from_function(&lua, "greet", &global).unwrap();

    assert_eq!(info.what(), "Lua");
    assert_eq!(info.line_defined(), 1);
    // No active frame, so no current line and no level to walk from.
    assert_eq!(info.current_line(), -1);
    assert_eq!(info.level(), None);
    assert!(!info.has_caller());
    assert!(matches!(info.caller(), Err(Error::Argument(_))));
    assert!(info.short_source().contains("greetings"));
    assert_eq!(info.upvalue_count(), 0);
}

#[test]
fn test_from_function_rejects_non_functions() {
    let lua = fresh();
    let tables = lua.tables();
    let global = tables.global();
    let base = lua.stack().top_index().unwrap();
    assert!(matches!(
        DebugInfo::from_function(&lua, "no_such_fn", &global),
        Err(Error::Type(_))
    ));
    // The failed lookup left nothing behind.
    assert_eq!(lua.stack().top_index().unwrap(), base);
}

#[test]
fn test_from_level_fails_when_nothing_is_executing() {
    let lua = fresh();
    assert!(matches!(
        DebugInfo::from_level(&lua, 0),
        Err(Error::Index(0))
    ));
}

unsafe extern "C" fn probe(raw: *mut sys::lua_State) -> c_int {
    let Ok(mut args) = (unsafe { FunctionArgs::new(raw) }) else {
        return 0;
    };
    let report = (|| -> lunet_runtime::Result<(String, bool, String)> {
        let current = DebugInfo::from_level(args.state(), 0)?;
        let has_caller = current.has_caller();
        let caller = current.caller()?;
        Ok((current.what().to_owned(), has_caller, caller.what().to_owned()))
    })();
    if let Ok((what, has_caller, caller_what)) = report {
        args.add_return(what);
        args.add_return(has_caller);
        args.add_return(caller_what);
    }
    args.finish().unwrap_or(0)
}

#[test]
fn test_level_walk_from_inside_a_callback() {
    let lua = fresh();
    lua.register("probe", probe).unwrap();
    lua.load("return probe()", "prober").unwrap();
    lua.execute(3, &[]).unwrap();

    let stack = lua.stack();
    // Level 0 is the callback itself, its caller is the main chunk.
    assert_eq!(stack.get(-3).unwrap(), Value::Str("C".into()));
    assert_eq!(stack.get(-2).unwrap(), Value::Boolean(true));
    assert_eq!(stack.get(-1).unwrap(), Value::Str("main".into()));
}

#[test]
fn test_exhausted_caller_chains_report_no_such_level() {
    let lua = fresh();
    lua.load("function noop() end", "levels").unwrap();
    lua.execute(0, &[]).unwrap();
    // Outside any call the chain is empty at every level.
    assert!(matches!(
        DebugInfo::from_level(&lua, 5),
        Err(Error::Index(5))
    ));
}
