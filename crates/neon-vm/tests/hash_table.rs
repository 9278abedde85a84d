//! Hash table integration tests
//!
//! Exercises the table through the public API with the VM's string pool as
//! key context, the way globals, fields and dicts use it.

use neon_vm::runtime::HashTable;
use neon_vm::{Value, Vm};

fn num(n: usize) -> Value {
    Value::Number(n as f64)
}

/// Load factor 3/4 must hold right after any insert.
fn assert_load_invariant(table: &HashTable) {
    let capacity = table.capacity();
    assert!(capacity == 0 || capacity.is_power_of_two(), "capacity {}", capacity);
    assert!((table.len() + table.tombstones()) * 4 <= capacity * 3);
}

#[test]
fn test_round_trip_with_interleaved_removes() {
    let vm = Vm::new();
    let ctx = vm.heap().strings();
    let mut table = HashTable::new();

    for i in 0..200 {
        assert!(table.set(ctx, num(i), num(i * 10)));
        assert_load_invariant(&table);
    }
    for i in (0..200).step_by(3) {
        assert!(table.remove(ctx, num(i)));
    }
    for i in 0..200 {
        let expected = if i % 3 == 0 { None } else { Some(num(i * 10)) };
        assert_eq!(table.get(ctx, num(i)), expected, "key {}", i);
    }

    // overwrite survivors, re-add removed keys
    for i in 0..200 {
        let created = table.set(ctx, num(i), num(i + 1));
        assert_eq!(created, i % 3 == 0);
        assert_load_invariant(&table);
    }
    for i in 0..200 {
        assert_eq!(table.get(ctx, num(i)), Some(num(i + 1)));
    }
    assert_eq!(table.len(), 200);
}

#[test]
fn test_remove_missing_key() {
    let vm = Vm::new();
    let ctx = vm.heap().strings();
    let mut table = HashTable::new();
    assert!(!table.remove(ctx, num(1)));
    table.set(ctx, num(1), Value::Bool(true));
    assert!(!table.remove(ctx, num(2)));
    assert!(table.remove(ctx, num(1)));
    assert!(!table.remove(ctx, num(1)));
    assert_eq!(table.get(ctx, num(1)), None);
}

#[test]
fn test_tombstones_reclaimed_without_growth() {
    let vm = Vm::new();
    let ctx = vm.heap().strings();
    let mut table = HashTable::new();

    let n = 48;
    for i in 0..n {
        table.set(ctx, num(i), Value::Nil);
    }
    let capacity = table.capacity();
    for i in 0..n {
        table.remove(ctx, num(i));
    }
    assert!(table.is_empty());
    assert_eq!(table.tombstones(), n);

    for i in n..2 * n {
        table.set(ctx, num(i), Value::Nil);
        assert_load_invariant(&table);
    }
    assert_eq!(table.capacity(), capacity);
    assert_eq!(table.len(), n);
}

#[test]
fn test_churn_keeps_capacity_bounded() {
    let vm = Vm::new();
    let ctx = vm.heap().strings();
    let mut table = HashTable::new();

    // one live key at a time, many distinct keys over time
    for i in 0..10_000 {
        table.set(ctx, num(i), Value::Nil);
        table.remove(ctx, num(i));
    }
    assert!(table.capacity() <= 8);
    assert!(table.is_empty());
}

#[test]
fn test_interned_and_fresh_strings_share_entries() {
    let mut vm = Vm::new();
    let first = vm.intern("answer");
    let again = vm.intern("answer");
    let other = vm.intern("question");
    let ctx = vm.heap().strings();

    let mut table = HashTable::new();
    table.set(ctx, first, num(42));
    assert_eq!(table.get(ctx, again), Some(num(42)));
    assert_eq!(table.get(ctx, other), None);
    assert_eq!(table.get_str(ctx, "answer").map(|entry| entry.value), Some(num(42)));
    assert!(table.get_str(ctx, "answe").is_none());
}

#[test]
fn test_heterogeneous_keys() {
    let mut vm = Vm::new();
    let one = vm.intern("1");
    let ctx = vm.heap().strings();

    let mut table = HashTable::new();
    table.set(ctx, one, Value::Bool(true));
    table.set(ctx, num(1), Value::Bool(false));
    table.set(ctx, Value::Bool(true), Value::Nil);

    assert_eq!(table.len(), 3);
    assert_eq!(table.get(ctx, one), Some(Value::Bool(true)));
    assert_eq!(table.get(ctx, num(1)), Some(Value::Bool(false)));
    assert_eq!(table.get(ctx, Value::Bool(true)), Some(Value::Nil));
    assert_eq!(table.get(ctx, Value::Bool(false)), None);
}

#[test]
fn test_add_all_copies_live_entries_only() {
    let vm = Vm::new();
    let ctx = vm.heap().strings();
    let mut from = HashTable::new();
    for i in 0..10 {
        from.set(ctx, num(i), num(i));
    }
    from.remove(ctx, num(0));

    let mut to = HashTable::new();
    to.set(ctx, num(5), num(500));
    to.set(ctx, num(99), num(99));
    to.add_all(ctx, &from);

    assert_eq!(to.len(), 10);
    assert_eq!(to.get(ctx, num(0)), None);
    assert_eq!(to.get(ctx, num(5)), Some(num(5)));
    assert_eq!(to.get(ctx, num(99)), Some(num(99)));
}
