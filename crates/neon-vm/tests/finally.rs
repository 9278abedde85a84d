//! Finally blocks run exactly once on every exit path

use neon_vm::{BlobBuilder, Error, FunctionProto, OpCode, Outcome, Value, Vm};

fn quiet_vm() -> Vm {
    let mut vm = Vm::new();
    vm.set_error_output(std::io::sink());
    vm.define_global("runs", Value::Number(0.0));
    vm
}

fn returned(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Returned(value) => value,
        Outcome::Halted(status) => panic!("unexpected halt {}", status),
    }
}

/// `runs = runs + 1; END_FINALLY`
fn emit_counting_finally(vm: &mut Vm, b: &mut BlobBuilder) {
    let runs = vm.intern("runs");
    b.op_const(OpCode::GlobalGet, runs)
        .op(OpCode::PushOne)
        .op(OpCode::Add)
        .op_const(OpCode::GlobalSet, runs)
        .op(OpCode::Pop)
        .op(OpCode::EndFinally);
}

/// `throw Exception(text)`
fn emit_throw(vm: &mut Vm, b: &mut BlobBuilder, text: &str) {
    let root = vm.intern("Exception");
    let text = vm.intern(text);
    b.op_const(OpCode::GlobalGet, root)
        .push(text)
        .op_byte(OpCode::Call, 1)
        .op(OpCode::Throw);
}

#[test]
fn test_finally_runs_once_on_normal_exit() {
    let mut vm = quiet_vm();
    let runs = vm.intern("runs");
    let mut b = BlobBuilder::new();
    let nil = b.constant(Value::Nil);

    let region = b.try_region(nil);
    b.push(Value::Number(1.0)).op(OpCode::Pop).op(OpCode::PopTry);
    let done = b.jump(OpCode::Jump);
    b.patch_finally(region);
    emit_counting_finally(&mut vm, &mut b);
    b.patch_jump(done);
    b.op_const(OpCode::GlobalGet, runs).op(OpCode::Return);

    assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(1.0));
}

#[test]
fn test_finally_runs_once_before_handler() {
    let mut vm = quiet_vm();
    let runs = vm.intern("runs");
    let caught = vm.intern("caught");
    let message = vm.intern("message");
    let mut b = BlobBuilder::new();
    let nil = b.constant(Value::Nil);

    let region = b.try_region(nil);
    emit_throw(&mut vm, &mut b, "boom");
    b.op(OpCode::PopTry);
    let done = b.jump(OpCode::Jump);
    b.patch_finally(region);
    emit_counting_finally(&mut vm, &mut b);
    b.patch_handler(region);
    b.op_const(OpCode::PropertyGet, message)
        .op_const(OpCode::GlobalDefine, caught);
    b.patch_jump(done);
    b.op_const(OpCode::GlobalGet, runs).op(OpCode::Return);

    assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(1.0));
    let caught = vm.global("caught").unwrap();
    assert_eq!(vm.string_of(caught), Some("boom"));
}

#[test]
fn test_finally_runs_once_while_propagating_out_of_a_frame() {
    let mut vm = quiet_vm();
    let runs = vm.intern("runs");
    let risky = vm.intern("risky");
    let caught = vm.intern("caught");
    let message = vm.intern("message");

    // fn risky() { try { throw Exception("deep") } finally { runs += 1 } }
    let mut body = BlobBuilder::new();
    let nil = body.constant(Value::Nil);
    let region = body.try_region(nil);
    emit_throw(&mut vm, &mut body, "deep");
    body.op(OpCode::PopTry);
    let after = body.jump(OpCode::Jump);
    body.patch_finally(region);
    emit_counting_finally(&mut vm, &mut body);
    body.patch_jump(after);
    body.op(OpCode::PushNil).op(OpCode::Return);
    let function = vm.make_function(FunctionProto::new("risky", body.finish()));

    let mut b = BlobBuilder::new();
    let function = b.constant(function);
    let nil = b.constant(Value::Nil);
    b.closure(function, &[]).op_const(OpCode::GlobalDefine, risky);
    let region = b.try_region(nil);
    b.op_const(OpCode::GlobalGet, risky)
        .op_byte(OpCode::Call, 0)
        .op(OpCode::Pop)
        .op(OpCode::PopTry);
    let done = b.jump(OpCode::Jump);
    b.patch_handler(region);
    b.op_const(OpCode::PropertyGet, message)
        .op_const(OpCode::GlobalDefine, caught);
    b.patch_jump(done);
    b.op_const(OpCode::GlobalGet, runs).op(OpCode::Return);

    assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(1.0));
    let caught = vm.global("caught").unwrap();
    assert_eq!(vm.string_of(caught), Some("deep"));
}

#[test]
fn test_finally_runs_once_on_return() {
    let mut vm = quiet_vm();
    let runs = vm.intern("runs");

    // fn early() { try { return 42 } finally { runs += 1 } return nil }
    let mut body = BlobBuilder::new();
    let nil = body.constant(Value::Nil);
    let region = body.try_region(nil);
    body.push(Value::Number(42.0)).op(OpCode::Return).op(OpCode::PopTry);
    let after = body.jump(OpCode::Jump);
    body.patch_finally(region);
    emit_counting_finally(&mut vm, &mut body);
    body.patch_jump(after);
    body.op(OpCode::PushNil).op(OpCode::Return);
    let function = vm.make_function(FunctionProto::new("early", body.finish()));

    let mut b = BlobBuilder::new();
    let function = b.constant(function);
    b.closure(function, &[])
        .op_byte(OpCode::Call, 0)
        .op_const(OpCode::GlobalGet, runs)
        .op_short(OpCode::MakeArray, 2)
        .op(OpCode::Return);

    let value = returned(vm.run(b.finish()).unwrap());
    assert_eq!(vm.render(value), "[42, 1]");
}

#[test]
fn test_finally_runs_once_when_unhandled() {
    let mut vm = quiet_vm();
    let mut b = BlobBuilder::new();
    let nil = b.constant(Value::Nil);

    let region = b.try_region(nil);
    emit_throw(&mut vm, &mut b, "escapes");
    b.op(OpCode::PopTry);
    let done = b.jump(OpCode::Jump);
    b.patch_finally(region);
    emit_counting_finally(&mut vm, &mut b);
    b.patch_jump(done);
    b.op(OpCode::PushNil).op(OpCode::Return);

    match vm.run(b.finish()).unwrap_err() {
        Error::Unhandled { class, message, .. } => {
            assert_eq!(class, "Exception");
            assert_eq!(message, "escapes");
        }
        other => panic!("Expected unhandled exception, got {:?}", other),
    }
    assert_eq!(vm.global("runs"), Some(Value::Number(1.0)));
}

#[test]
fn test_nested_finally_blocks_each_run_once() {
    let mut vm = quiet_vm();
    let runs = vm.intern("runs");
    let mut b = BlobBuilder::new();
    let nil = b.constant(Value::Nil);

    // try { try { throw } finally { runs += 1 } } catch { } finally { runs += 1 }
    let outer = b.try_region(nil);
    let inner = b.try_region(nil);
    emit_throw(&mut vm, &mut b, "twice wrapped");
    b.op(OpCode::PopTry);
    let inner_done = b.jump(OpCode::Jump);
    b.patch_finally(inner);
    emit_counting_finally(&mut vm, &mut b);
    b.patch_jump(inner_done);
    b.op(OpCode::PopTry);
    let outer_done = b.jump(OpCode::Jump);
    b.patch_finally(outer);
    emit_counting_finally(&mut vm, &mut b);
    b.patch_handler(outer);
    b.op(OpCode::Pop);
    b.patch_jump(outer_done);
    b.op_const(OpCode::GlobalGet, runs).op(OpCode::Return);

    assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(2.0));
}
