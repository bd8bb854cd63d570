//! Symbolic CIL.
//!
//! Generated bodies are kept symbolic: opcodes carry typed operands that reference declared
//! entities directly, and branch operands are indices into the body's instruction list. A
//! consumer writing a real module maps them to tokens and byte offsets.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::metadata::{FieldRc, MethodRc, TypeRc};

/// The subset of CIL opcodes the generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum CilOpCode {
    /// No operation
    #[strum(serialize = "nop")]
    Nop,
    /// Load argument
    #[strum(serialize = "ldarg")]
    Ldarg,
    /// Load argument address
    #[strum(serialize = "ldarga")]
    Ldarga,
    /// Store argument
    #[strum(serialize = "starg")]
    Starg,
    /// Load local
    #[strum(serialize = "ldloc")]
    Ldloc,
    /// Load local address
    #[strum(serialize = "ldloca")]
    Ldloca,
    /// Store local
    #[strum(serialize = "stloc")]
    Stloc,
    /// Load 32-bit constant
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    /// Load 64-bit constant
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    /// Load string literal
    #[strum(serialize = "ldstr")]
    Ldstr,
    /// Load instance field
    #[strum(serialize = "ldfld")]
    Ldfld,
    /// Load instance field address
    #[strum(serialize = "ldflda")]
    Ldflda,
    /// Store instance field
    #[strum(serialize = "stfld")]
    Stfld,
    /// Load static field
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    /// Load static field address
    #[strum(serialize = "ldsflda")]
    Ldsflda,
    /// Store static field
    #[strum(serialize = "stsfld")]
    Stsfld,
    /// Load metadata token
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    /// Call method
    #[strum(serialize = "call")]
    Call,
    /// Allocate and construct object
    #[strum(serialize = "newobj")]
    Newobj,
    /// Return
    #[strum(serialize = "ret")]
    Ret,
    /// Unconditional branch
    #[strum(serialize = "br")]
    Br,
    /// Branch if true
    #[strum(serialize = "brtrue")]
    Brtrue,
    /// Throw exception
    #[strum(serialize = "throw")]
    Throw,
    /// Discard top of stack
    #[strum(serialize = "pop")]
    Pop,
    /// `+`
    #[strum(serialize = "add")]
    Add,
    /// `-`
    #[strum(serialize = "sub")]
    Sub,
    /// `*`
    #[strum(serialize = "mul")]
    Mul,
    /// `/`
    #[strum(serialize = "div")]
    Div,
    /// `<<`
    #[strum(serialize = "shl")]
    Shl,
    /// `>>`
    #[strum(serialize = "shr")]
    Shr,
    /// `&`
    #[strum(serialize = "and")]
    And,
    /// `|`
    #[strum(serialize = "or")]
    Or,
    /// `^`
    #[strum(serialize = "xor")]
    Xor,
    /// `~`
    #[strum(serialize = "not")]
    Not,
    /// unary `-`
    #[strum(serialize = "neg")]
    Neg,
    /// `==`
    #[strum(serialize = "ceq")]
    Ceq,
    /// `>`
    #[strum(serialize = "cgt")]
    Cgt,
    /// `<`
    #[strum(serialize = "clt")]
    Clt,
    /// Zero-extend to unsigned 64-bit
    #[strum(serialize = "conv.u8")]
    ConvU8,
}

impl CilOpCode {
    /// Returns `true` for branch opcodes, whose operand is a label.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(self, CilOpCode::Br | CilOpCode::Brtrue)
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub const fn ends_flow(self) -> bool {
        matches!(self, CilOpCode::Br | CilOpCode::Ret | CilOpCode::Throw)
    }
}

/// Framework members the generated code calls.
///
/// They are not part of the decompiled module, so they are named symbolically and
/// imported by whoever writes the body into a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ImportedMember {
    /// Prints runtime diagnostics
    #[strum(serialize = "void System.Console::WriteLine(string)")]
    ConsoleWriteLine,
    /// Constructs the exception thrown by stub bodies
    #[strum(serialize = "instance void System.Exception::.ctor(string)")]
    ExceptionCtor,
    /// Turns an `ldtoken` handle into a `System.Type`
    #[strum(serialize = "System.Type System.Type::GetTypeFromHandle(System.RuntimeTypeHandle)")]
    GetTypeFromHandle,
}

impl ImportedMember {
    /// `(pops, pushes)` of calling the member.
    #[must_use]
    pub const fn stack_effect(self) -> (u8, u8) {
        match self {
            ImportedMember::ConsoleWriteLine => (1, 0),
            ImportedMember::ExceptionCtor | ImportedMember::GetTypeFromHandle => (1, 1),
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum CilOperand {
    /// 32-bit immediate
    Int32(i32),
    /// 64-bit immediate
    Int64(i64),
    /// String literal
    String(String),
    /// Local slot
    Local(u16),
    /// Argument index, the receiver being argument 0 of an instance method
    Argument(u16),
    /// Declared field
    Field(FieldRc),
    /// Declared method
    Method(MethodRc),
    /// Declared type
    Type(TypeRc),
    /// Framework member
    Import(ImportedMember),
    /// Index of the target instruction in the body
    Label(usize),
}

impl fmt::Display for CilOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CilOperand::Int32(value) => write!(f, "{value}"),
            CilOperand::Int64(value) => write!(f, "{value}"),
            CilOperand::String(text) => write!(f, "{text:?}"),
            CilOperand::Local(slot) => write!(f, "V_{slot}"),
            CilOperand::Argument(index) => write!(f, "A_{index}"),
            CilOperand::Field(field) => write!(f, "{field}"),
            CilOperand::Method(method) => write!(f, "{method}"),
            CilOperand::Type(ty) => write!(f, "{}", ty.full_name()),
            CilOperand::Import(member) => write!(f, "{member}"),
            CilOperand::Label(target) => write!(f, "IL_{target:04x}"),
        }
    }
}

/// One CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct CilInstruction {
    /// The operation
    pub opcode: CilOpCode,
    /// Its operand, if the opcode takes one
    pub operand: Option<CilOperand>,
}

impl CilInstruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(opcode: CilOpCode, operand: Option<CilOperand>) -> Self {
        CilInstruction { opcode, operand }
    }

    /// The branch target, for branches resolved to an instruction index.
    #[must_use]
    pub fn label(&self) -> Option<usize> {
        match self.operand {
            Some(CilOperand::Label(target)) => Some(target),
            _ => None,
        }
    }

    /// `(pops, pushes)` on the evaluation stack.
    ///
    /// Calls are derived from the callee's signature. `ret` is reported as neutral; the
    /// emitter clears the stack after every instruction that ends flow.
    #[must_use]
    pub fn stack_effect(&self) -> (u8, u8) {
        match self.opcode {
            CilOpCode::Nop | CilOpCode::Ret | CilOpCode::Br => (0, 0),
            CilOpCode::Ldarg
            | CilOpCode::Ldarga
            | CilOpCode::Ldloc
            | CilOpCode::Ldloca
            | CilOpCode::LdcI4
            | CilOpCode::LdcI8
            | CilOpCode::Ldstr
            | CilOpCode::Ldsfld
            | CilOpCode::Ldsflda
            | CilOpCode::Ldtoken => (0, 1),
            CilOpCode::Starg
            | CilOpCode::Stloc
            | CilOpCode::Stsfld
            | CilOpCode::Brtrue
            | CilOpCode::Throw
            | CilOpCode::Pop => (1, 0),
            CilOpCode::Ldfld | CilOpCode::Ldflda | CilOpCode::Not | CilOpCode::Neg | CilOpCode::ConvU8 => (1, 1),
            CilOpCode::Stfld => (2, 0),
            CilOpCode::Add
            | CilOpCode::Sub
            | CilOpCode::Mul
            | CilOpCode::Div
            | CilOpCode::Shl
            | CilOpCode::Shr
            | CilOpCode::And
            | CilOpCode::Or
            | CilOpCode::Xor
            | CilOpCode::Ceq
            | CilOpCode::Cgt
            | CilOpCode::Clt => (2, 1),
            CilOpCode::Call | CilOpCode::Newobj => match &self.operand {
                Some(CilOperand::Import(member)) => member.stack_effect(),
                Some(CilOperand::Method(method)) => {
                    let receiver = usize::from(!method.is_static());
                    let pops = u8::try_from(method.parameters.len() + receiver).unwrap_or(u8::MAX);
                    let pushes = u8::from(method.returns_value() || self.opcode == CilOpCode::Newobj);
                    if self.opcode == CilOpCode::Newobj {
                        (pops.saturating_sub(1), pushes)
                    } else {
                        (pops, pushes)
                    }
                }
                _ => (0, 0),
            },
        }
    }
}

impl fmt::Display for CilInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{} {}", self.opcode, operand),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// A declared local slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CilLocal {
    /// Declared type, `None` for `object`
    pub ty: Option<TypeRc>,
}

impl fmt::Display for CilLocal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{}", ty.full_name()),
            None => write!(f, "object"),
        }
    }
}

/// A generated method body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CilBody {
    /// Local slots, indexed by [`CilOperand::Local`]
    pub locals: Vec<CilLocal>,
    /// Instruction stream; labels index into it
    pub instructions: Vec<CilInstruction>,
    /// Deepest evaluation stack reached
    pub max_stack: u16,
}

impl CilBody {
    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The opcodes in order, for quick comparisons.
    #[must_use]
    pub fn opcodes(&self) -> Vec<CilOpCode> {
        self.instructions.iter().map(|instruction| instruction.opcode).collect()
    }
}

impl fmt::Display for CilBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.locals.is_empty() {
            let locals: Vec<String> = self.locals.iter().map(ToString::to_string).collect();
            writeln!(f, ".locals ({})", locals.join(", "))?;
        }
        writeln!(f, ".maxstack {}", self.max_stack)?;
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "IL_{index:04x}: {instruction}")?;
        }
        Ok(())
    }
}
