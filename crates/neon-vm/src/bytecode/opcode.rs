// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Operation codes and their operand layouts.
//!
//! [`OpCode::layout`] is the single source of truth for how many bytes
//! follow each opcode. The decoder, the disassembler, blob validation and
//! the interpreter's operand reads all derive their widths from it.

/// Direction of a jump displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpDirection {
    /// target = offset after operand + displacement
    Forward,
    /// target = offset after operand - displacement
    Backward,
}

/// Operand encoding of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    /// No operand (1 byte total)
    None,
    /// One byte (2 bytes total)
    Byte,
    /// One big-endian u16 (3 bytes total)
    Short,
    /// A u16 constant-pool index (3 bytes total)
    Const,
    /// A u16 displacement (3 bytes total)
    Jump(JumpDirection),
    /// Exception-type constant, handler address, finally address (7 bytes total)
    Try,
    /// Method-name constant plus argument count (4 bytes total)
    Invoke,
    /// Function constant, then per upvalue an is-local byte and a u16 index
    Closure,
    /// A constant index plus a flag byte (4 bytes total)
    ConstByte,
}

impl OperandLayout {
    /// Width in bytes of the whole instruction, opcode included.
    ///
    /// Closure creation depends on the upvalue count of the function it
    /// builds, so its width is `3 + 3 * upvalues`.
    #[inline]
    pub fn width(self, upvalues: usize) -> usize {
        match self {
            OperandLayout::None => 1,
            OperandLayout::Byte => 2,
            OperandLayout::Short | OperandLayout::Const | OperandLayout::Jump(_) => 3,
            OperandLayout::Invoke | OperandLayout::ConstByte => 4,
            OperandLayout::Try => 7,
            OperandLayout::Closure => 3 + 3 * upvalues,
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $display:literal, $layout:expr; )*) => {
        /// Operation codes for the VM.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $( $(#[$doc])* $name, )*
        }

        impl OpCode {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$name, )* ];

            /// Display name used by the disassembler.
            pub fn name(self) -> &'static str {
                match self {
                    $( OpCode::$name => $display, )*
                }
            }

            /// Operand layout of this opcode.
            pub fn layout(self) -> OperandLayout {
                use JumpDirection::*;
                use OperandLayout::*;
                match self {
                    $( OpCode::$name => $layout, )*
                }
            }
        }
    };
}

opcodes! {
    // Stack operations
    /// Push a constant
    PushConst = "PUSH_CONST", Const;
    /// Push nil
    PushNil = "PUSH_NIL", None;
    /// Push the empty marker (nil)
    PushEmpty = "PUSH_EMPTY", None;
    /// Push true
    PushTrue = "PUSH_TRUE", None;
    /// Push false
    PushFalse = "PUSH_FALSE", None;
    /// Push the number 1
    PushOne = "PUSH_ONE", None;
    /// Pop the top value
    Pop = "POP", None;
    /// Pop N values
    PopN = "POP_N", Short;
    /// Duplicate the top value
    Dup = "DUP", None;

    // Variables
    /// Bind the popped value to a global name
    GlobalDefine = "GLOBAL_DEFINE", Const;
    /// Push a global
    GlobalGet = "GLOBAL_GET", Const;
    /// Assign an existing global, keeping the value on the stack
    GlobalSet = "GLOBAL_SET", Const;
    /// Push a local slot
    LocalGet = "LOCAL_GET", Short;
    /// Store into a local slot, keeping the value on the stack
    LocalSet = "LOCAL_SET", Short;
    /// Replace a nil parameter slot with the default on top of the stack
    FuncArgOptional = "FUNC_ARG_OPTIONAL", Short;
    /// Push an upvalue
    UpvalueGet = "UPVALUE_GET", Short;
    /// Store into an upvalue, keeping the value on the stack
    UpvalueSet = "UPVALUE_SET", Short;
    /// Close the upvalue over the top slot and pop it
    CloseUpvalue = "CLOSE_UPVALUE", None;

    // Arithmetic
    /// Add (numbers), concatenate (strings, arrays)
    Add = "ADD", None;
    /// Subtract
    Sub = "SUB", None;
    /// Multiply (numbers), repeat (strings, arrays)
    Mul = "MUL", None;
    /// Divide
    Div = "DIV", None;
    /// Floor division
    FloorDiv = "FLOOR_DIV", None;
    /// Floored modulo
    Mod = "MOD", None;
    /// Exponentiation
    Pow = "POW", None;
    /// Unary minus
    Negate = "NEGATE", None;
    /// Logical not
    Not = "NOT", None;
    /// Bitwise not
    BitNot = "BIT_NOT", None;
    /// Bitwise and
    BitAnd = "BIT_AND", None;
    /// Bitwise or
    BitOr = "BIT_OR", None;
    /// Bitwise xor
    BitXor = "BIT_XOR", None;
    /// Left shift
    ShiftLeft = "SHIFT_LEFT", None;
    /// Right shift
    ShiftRight = "SHIFT_RIGHT", None;

    // Comparison
    /// Equality
    Equal = "EQUAL", None;
    /// Greater than
    Greater = "GREATER", None;
    /// Less than
    Less = "LESS", None;

    // Control flow
    /// Unconditional forward jump
    Jump = "JUMP", Jump(Forward);
    /// Pop and jump forward if falsy
    JumpIfFalse = "JUMP_IF_FALSE", Jump(Forward);
    /// Unconditional backward jump
    Loop = "LOOP", Jump(Backward);

    // Calls
    /// Call the value below the arguments
    Call = "CALL", Byte;
    /// Invoke a named method on the receiver below the arguments
    Invoke = "INVOKE", Invoke;
    /// Invoke a method on `this`, private names allowed
    InvokeSelf = "INVOKE_SELF", Invoke;
    /// Invoke a method of the superclass on top of the stack
    InvokeSuper = "INVOKE_SUPER", Invoke;
    /// Run the superclass constructor on `this`
    InvokeSuperSelf = "INVOKE_SUPER_SELF", Byte;
    /// Create a closure from a function constant
    MakeClosure = "MAKE_CLOSURE", Closure;
    /// Return from the current function
    Return = "RETURN", None;

    // Classes
    /// Create a class
    MakeClass = "MAKE_CLASS", Const;
    /// Bind the closure on top into the class below it
    MakeMethod = "MAKE_METHOD", Const;
    /// Define an instance default or static property
    PropertyDefine = "PROPERTY_DEFINE", ConstByte;
    /// Inherit from the superclass below the subclass
    Inherit = "INHERIT", None;
    /// Bind a superclass method to `this`
    GetSuper = "GET_SUPER", Const;
    /// Read a property
    PropertyGet = "PROPERTY_GET", Const;
    /// Read a property of `this`, private names allowed
    PropertyGetSelf = "PROPERTY_GET_SELF", Const;
    /// Write a property, keeping the value on the stack
    PropertySet = "PROPERTY_SET", Const;

    // Containers
    /// Build an array from N stack values
    MakeArray = "MAKE_ARRAY", Short;
    /// Build a dict from N key/value pairs
    MakeDict = "MAKE_DICT", Short;
    /// Build a range from two numbers
    MakeRange = "MAKE_RANGE", None;
    /// Indexed read
    IndexGet = "INDEX_GET", Byte;
    /// Sliced read
    IndexGetRanged = "INDEX_GET_RANGED", Byte;
    /// Indexed write, keeping the value on the stack
    IndexSet = "INDEX_SET", None;

    // Exceptions
    /// Enter a try region
    Try = "TRY", Try;
    /// Leave the innermost try region normally
    PopTry = "POP_TRY", None;
    /// End of a finally block: resume the pending completion
    EndFinally = "END_FINALLY", None;
    /// Throw the exception on top of the stack
    Throw = "THROW", None;

    // Misc
    /// Multi-way jump through a switch table constant
    Switch = "SWITCH", Const;
    /// Push the type name of the popped value
    TypeOf = "TYPEOF", None;
    /// Render the top value to a string
    Stringify = "STRINGIFY", None;
    /// Class-chain membership test
    InstanceOf = "INSTANCE_OF", None;
    /// Print the popped value
    Echo = "ECHO", None;
    /// Raise AssertionError when the condition is falsy
    Assert = "ASSERT", None;
    /// Stop the loop with an exit status
    Halt = "HALT", Byte;
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
