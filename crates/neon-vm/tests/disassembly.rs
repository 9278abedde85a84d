//! Disassembler and decoder integration tests

use neon_vm::bytecode::{Capture, Operands, decode, instructions};
use neon_vm::disasm::{disassemble, disassemble_instruction};
use neon_vm::{Blob, BlobBuilder, FunctionProto, OpCode, Value, Vm};

/// A blob touching every operand layout.
fn sample_blob(vm: &mut Vm) -> Blob {
    let mut inner = BlobBuilder::new();
    inner.op_short(OpCode::UpvalueGet, 0).op(OpCode::Return);
    let inner = vm.make_function(FunctionProto::new("inner", inner.finish()).with_upvalues(2));
    let name = vm.intern("name");

    let mut b = BlobBuilder::new();
    let name_index = b.constant(name);
    let nil = b.constant(Value::Nil);
    let function = b.constant(inner);

    b.line(1).push(Value::Number(1.5)).op(OpCode::PushNil);
    let start = b.offset();
    b.line(2)
        .op_short(OpCode::LocalGet, 1)
        .op_byte(OpCode::IndexGet, 0)
        .op(OpCode::Pop);
    let skip = b.jump(OpCode::JumpIfFalse);
    b.loop_to(start);
    b.patch_jump(skip);
    let region = b.try_region(nil);
    b.line(3)
        .invoke(OpCode::Invoke, name_index, 2)
        .property_define(name_index, true)
        .closure(
            function,
            &[
                Capture { is_local: true, index: 1 },
                Capture { is_local: false, index: 0 },
            ],
        )
        .op(OpCode::PopTry);
    b.patch_handler(region);
    b.op_byte(OpCode::Halt, 0);
    b.finish()
}

#[test]
fn test_decoding_covers_blob_exactly() {
    let mut vm = Vm::new();
    let blob = sample_blob(&mut vm);

    let mut expected_offset = 0;
    let mut total = 0;
    for decoded in instructions(&blob, vm.heap()) {
        let decoded = decoded.unwrap();
        assert_eq!(decoded.offset, expected_offset);
        assert!(decoded.width > 0);
        expected_offset = decoded.next_offset();
        total += decoded.width;
    }
    assert_eq!(total, blob.len());
}

#[test]
fn test_listing_advances_strictly() {
    let mut vm = Vm::new();
    let blob = sample_blob(&mut vm);

    let mut offset = 0;
    let mut count = 0;
    while offset < blob.len() {
        let (_, next) = disassemble_instruction(vm.heap(), &blob, offset);
        assert!(next > offset);
        offset = next;
        count += 1;
    }
    assert_eq!(offset, blob.len());
    assert_eq!(instructions(&blob, vm.heap()).count(), count);
}

#[test]
fn test_jump_targets() {
    let vm = Vm::new();
    let mut b = BlobBuilder::new();
    b.op(OpCode::PushNil);
    let start = b.offset();
    let forward = b.jump(OpCode::Jump);
    b.op(OpCode::Pop).op(OpCode::Pop);
    b.patch_jump(forward);
    let loop_at = b.offset();
    b.loop_to(start);
    let blob = b.finish();

    let jump = decode(&blob, start, vm.heap()).unwrap();
    match jump.operands {
        Operands::Jump { displacement, target } => {
            assert_eq!(displacement, 2);
            assert_eq!(target, (start + 3 + 2) as isize);
            assert_eq!(target, loop_at as isize);
        }
        other => panic!("Expected jump operands, got {:?}", other),
    }

    let back = decode(&blob, loop_at, vm.heap()).unwrap();
    match back.operands {
        Operands::Jump { displacement, target } => {
            assert_eq!(target, loop_at as isize + 3 - displacement as isize);
            assert_eq!(target, start as isize);
        }
        other => panic!("Expected jump operands, got {:?}", other),
    }
}

#[test]
fn test_listing_format() {
    let mut vm = Vm::new();
    let greeting = vm.intern("hi");
    let mut b = BlobBuilder::new();
    b.line(4).push(greeting).op(OpCode::Echo);
    b.line(5).op(OpCode::PushNil).op(OpCode::Return);
    let listing = disassemble(vm.heap(), &b.finish(), "greet");

    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines[0], "== greet ==");
    assert!(lines[1].starts_with("00000000        4 PUSH_CONST"));
    assert!(lines[1].ends_with("0 \"hi\""));
    assert_eq!(lines[2], "00000003        | ECHO");
    assert_eq!(lines[3], "00000004        5 PUSH_NIL");
    assert_eq!(lines[4], "00000005        | RETURN");
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_closure_listing_shows_captures() {
    let mut vm = Vm::new();
    let blob = sample_blob(&mut vm);
    let listing = disassemble(vm.heap(), &blob, "sample");
    assert!(listing.contains("MAKE_CLOSURE"));
    assert!(listing.contains("local 1"));
    assert!(listing.contains("upvalue 0"));
    assert!(listing.contains("(static)"));
    assert!(listing.contains("(2 args)"));
}
