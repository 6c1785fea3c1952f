//! Coroutine bridge behavior: the suspended/running/dead state machine,
//! yield round-trips, and cross-thread value transfer.

use core::ffi::c_int;

use lunet_runtime::{
    Coroutine, CoroutineStatus, Error, FunctionArgs, Interp, Value, move_values, sys,
};

fn fresh() -> Interp {
    Interp::new().expect("interpreter opens")
}

#[test]
fn test_yield_round_trips_a_value_unchanged() {
    let lua = fresh();
    let co = Coroutine::new(&lua).unwrap();
    co.load(
        "local first = ...\nlocal second = coroutine.yield(first)\nreturn second",
        "echo",
    )
    .unwrap();
    assert_eq!(co.status(), CoroutineStatus::Suspended);

    // First resume runs until the yield; the yielded value arrives on the
    // thread's stack unchanged.
    let status = co.resume_with(&[Value::from(42)]).unwrap();
    assert_eq!(status, CoroutineStatus::Suspended);
    assert_eq!(co.stack().top_value().unwrap(), Value::Number(42.0));

    // Second resume feeds the yield's result and runs to completion.
    co.stack().pop(1).unwrap();
    let status = co.resume_with(&[Value::from("done")]).unwrap();
    assert_eq!(status, CoroutineStatus::Dead);
    assert_eq!(co.stack().top_value().unwrap(), Value::Str("done".into()));
}

#[test]
fn test_resuming_a_dead_coroutine_is_a_lifecycle_error() {
    let lua = fresh();
    let co = Coroutine::new(&lua).unwrap();
    co.load("return 'immediate'", "short").unwrap();

    assert_eq!(co.resume(0).unwrap(), CoroutineStatus::Dead);
    assert!(matches!(co.resume(0), Err(Error::Lifecycle(_))));
}

#[test]
fn test_coroutine_errors_pop_the_message_and_kill_the_thread() {
    let lua = fresh();
    let co = Coroutine::new(&lua).unwrap();
    co.load("error('boom')", "failing").unwrap();

    let err = co.resume(0).unwrap_err();
    let Error::Runtime(message) = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert!(message.contains("boom"), "message was: {message}");
    assert_eq!(co.status(), CoroutineStatus::Dead);
    assert!(matches!(co.resume(0), Err(Error::Lifecycle(_))));
}

#[test]
fn test_threads_share_the_parent_global_environment() {
    let lua = fresh();
    lua.set_global("shared", 99).unwrap();

    let co = Coroutine::new(&lua).unwrap();
    co.load("return shared", "reader").unwrap();
    assert_eq!(co.resume(0).unwrap(), CoroutineStatus::Dead);
    assert_eq!(co.stack().top_value().unwrap(), Value::Number(99.0));

    // Writes made by the thread are visible to the parent too.
    let co = Coroutine::new(&lua).unwrap();
    co.load("written_by_thread = 7", "writer").unwrap();
    assert_eq!(co.resume(0).unwrap(), CoroutineStatus::Dead);
    assert_eq!(lua.get_global("written_by_thread").unwrap(), Value::Number(7.0));
}

#[test]
fn test_move_values_preserves_order() {
    let lua = fresh();
    let source = Coroutine::new(&lua).unwrap();
    let destination = Coroutine::new(&lua).unwrap();

    for n in 1..=3 {
        source.stack().push(n).unwrap();
    }
    move_values(&source, &destination, 2).unwrap();

    assert_eq!(source.stack().top_index().unwrap(), 1);
    assert_eq!(destination.stack().top_index().unwrap(), 2);
    assert_eq!(destination.stack().get(1).unwrap(), Value::Number(2.0));
    assert_eq!(destination.stack().get(2).unwrap(), Value::Number(3.0));

    assert!(matches!(
        move_values(&source, &destination, 5),
        Err(Error::Argument(_))
    ));
}

/// Callback that echoes its first argument through a yield. The yield
/// status must be returned verbatim: suspension only takes effect once it
/// propagates through the native call boundary.
unsafe extern "C" fn echo_cb(raw: *mut sys::lua_State) -> c_int {
    let Ok(args) = (unsafe { FunctionArgs::new(raw) }) else {
        return 0;
    };
    let value = args.get(0).ok().cloned().unwrap_or(Value::Nil);
    let Ok(this) = (unsafe { Coroutine::from_raw(raw) }) else {
        return 0;
    };
    this.yield_values(&[value]).unwrap_or(0)
}

#[test]
fn test_callbacks_yield_by_returning_the_status() {
    let lua = fresh();
    lua.register("echo", echo_cb).unwrap();

    let co = Coroutine::new(&lua).unwrap();
    co.load("local v = echo(...)\nreturn v", "echoing").unwrap();

    // The yield inside the callback suspends the whole thread, handing the
    // echoed value to the resumer.
    let status = co.resume_with(&[Value::from(42)]).unwrap();
    assert_eq!(status, CoroutineStatus::Suspended);
    assert_eq!(co.stack().top_value().unwrap(), Value::Number(42.0));

    // The next resume finishes the interrupted callback call: the resume
    // argument becomes the callback's result inside the script.
    co.stack().pop(1).unwrap();
    let status = co.resume_with(&[Value::from("bye")]).unwrap();
    assert_eq!(status, CoroutineStatus::Dead);
    assert_eq!(co.stack().top_value().unwrap(), Value::Str("bye".into()));
}

#[test]
fn test_root_stack_transfers_into_a_thread() {
    let lua = fresh();
    let co = Coroutine::new(&lua).unwrap();

    lua.stack().push("payload").unwrap();
    lua.stack().move_to(&co.stack(), 1).unwrap();
    assert_eq!(co.stack().top_value().unwrap(), Value::Str("payload".into()));
}
