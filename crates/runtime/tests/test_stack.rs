//! Stack view laws: push/pop/top accounting and the value codec round-trip.
//!
//! These exercise the FFI boundary through the public surface to catch
//! regressions in index bookkeeping and slot encoding.

use core::ffi::c_int;

use lunet_runtime::{Callback, Error, FunctionRef, Interp, Value, ValueType, sys};

fn fresh() -> Interp {
    Interp::new().expect("interpreter opens")
}

#[test]
fn test_push_returns_strictly_increasing_top_index() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    let values = [Value::Nil, Value::from(true), Value::from(42), Value::from("hello")];
    for (i, value) in values.into_iter().enumerate() {
        let index = stack.push(value).unwrap();
        assert_eq!(index, i as c_int + 1);
        assert_eq!(stack.top_index().unwrap(), index);
    }
}

#[test]
fn test_codec_round_trip_for_primitives() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    stack.push(true).unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Boolean(true));

    stack.push(false).unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Boolean(false));

    stack.push("hello world").unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Str("hello world".into()));

    stack.push(-7i32).unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Number(-7.0));

    stack.push(Value::Nil).unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Nil);
}

#[test]
fn test_integers_round_trip_exactly_up_to_53_bits() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    let exact = 1i64 << 53;
    stack.push(exact).unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Number(9007199254740992.0));

    // One past the exact range collapses onto its neighbour: the documented
    // lossy boundary of the single double representation.
    stack.push(exact + 1).unwrap();
    assert_eq!(stack.top_value().unwrap(), Value::Number(9007199254740992.0));
}

#[test]
fn test_pop_accounting() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    for n in 0..3 {
        stack.push(n).unwrap();
    }
    stack.pop(2).unwrap();
    assert_eq!(stack.top_index().unwrap(), 1);
    stack.pop(1).unwrap();
    assert_eq!(stack.top_index().unwrap(), 0);

    // Popping an empty stack is a no-op, not an underflow.
    stack.pop(1).unwrap();
    assert_eq!(stack.top_index().unwrap(), 0);

    // Popping more than the stack holds removes what is there.
    stack.push(1).unwrap();
    stack.push(2).unwrap();
    stack.pop(10).unwrap();
    assert_eq!(stack.top_index().unwrap(), 0);
}

#[test]
fn test_clear_discards_everything() {
    let lua = fresh();
    let stack = lua.stack();
    stack.push(1).unwrap();
    stack.push("two").unwrap();
    stack.clear().unwrap();
    assert_eq!(stack.top_index().unwrap(), 0);
    assert!(matches!(stack.top_value(), Err(Error::Index(0))));
}

#[test]
fn test_insert_remove_replace_shift_slots() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();
    for n in 1..=3 {
        stack.push(n).unwrap();
    }

    // Move the top into position 1: [1, 2, 3] -> [3, 1, 2].
    stack.insert(1).unwrap();
    assert_eq!(stack.get(1).unwrap(), Value::Number(3.0));
    assert_eq!(stack.get(2).unwrap(), Value::Number(1.0));
    assert_eq!(stack.get(3).unwrap(), Value::Number(2.0));

    // Remove the middle: [3, 1, 2] -> [3, 2].
    stack.remove(2).unwrap();
    assert_eq!(stack.top_index().unwrap(), 2);
    assert_eq!(stack.get(2).unwrap(), Value::Number(2.0));

    // Replace the bottom with a fresh top: [3, 2, 9] -> [9, 2].
    stack.push(9).unwrap();
    stack.replace(1).unwrap();
    assert_eq!(stack.get(1).unwrap(), Value::Number(9.0));
    assert_eq!(stack.top_index().unwrap(), 2);
}

#[test]
fn test_slot_indices_are_validated() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();
    stack.push(1).unwrap();

    assert!(matches!(stack.insert(5), Err(Error::Index(5))));
    assert!(matches!(stack.remove(0), Err(Error::Index(0))));
    assert!(matches!(stack.replace(-9), Err(Error::Index(-9))));
    assert!(matches!(stack.type_of(99), Err(Error::Index(99))));
}

#[test]
fn test_grow_reserves_and_reports_exhaustion() {
    let lua = fresh();
    let stack = lua.stack();
    stack.grow(64).unwrap();
    // The engine refuses absurd reservations with an allocation failure.
    assert!(matches!(stack.grow(1_000_000), Err(Error::Resource(_))));
}

#[test]
fn test_concat_pops_and_pushes_one_string() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    stack.push("foo").unwrap();
    stack.push(42).unwrap();
    stack.concat(2).unwrap();
    assert_eq!(stack.top_index().unwrap(), 1);
    assert_eq!(stack.top_value().unwrap(), Value::Str("foo42".into()));

    stack.push(true).unwrap();
    stack.push("x").unwrap();
    assert!(matches!(stack.concat(2), Err(Error::Type(_))));
}

#[test]
fn test_equality_modes() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    stack.push(1).unwrap();
    stack.push(1.0f64).unwrap();
    stack.push("1").unwrap();
    assert!(stack.equal(1, 2, false).unwrap());
    assert!(stack.equal(1, 2, true).unwrap());
    // No number/string coercion in equality.
    assert!(!stack.equal(2, 3, false).unwrap());
}

#[test]
fn test_push_slot_copies_and_compares_identical() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();

    stack.push(42).unwrap();
    let copy = stack.push_slot(1).unwrap();
    assert_eq!(copy, 2);
    assert!(stack.equal(1, 2, true).unwrap());
}

#[test]
fn test_set_top_only_shrinks() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();
    for n in 0..3 {
        stack.push(n).unwrap();
    }

    stack.set_top(1).unwrap();
    assert_eq!(stack.top_index().unwrap(), 1);
    assert!(matches!(stack.set_top(5), Err(Error::Index(5))));
    stack.set_top(0).unwrap();
    assert_eq!(stack.top_index().unwrap(), 0);
}

#[test]
fn test_native_callbacks_round_trip_by_identity() {
    unsafe extern "C" fn nop(_raw: *mut sys::lua_State) -> c_int {
        0
    }

    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();
    stack.push(nop as Callback).unwrap();
    assert_eq!(stack.type_of(1).unwrap(), ValueType::Function);
    assert_eq!(
        stack.top_value().unwrap(),
        Value::Function(FunctionRef::Native(nop))
    );
}

#[test]
fn test_render_shows_values() {
    let lua = fresh();
    let stack = lua.stack();
    stack.clear().unwrap();
    stack.push(42).unwrap();
    stack.push("mid").unwrap();
    stack.push(Value::Nil).unwrap();
    let rendered = stack.render().unwrap();
    assert!(rendered.contains("42"));
    assert!(rendered.contains("mid"));
    assert!(rendered.contains("(nil)"));
}
