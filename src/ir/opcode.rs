//! The opcode catalogue.
//!
//! [`OpCode`] is the flat, closed list of operations. Instructions do not store it; they
//! carry a typed [`crate::ir::InstructionKind`] whose variant fixes the operand tuple, and
//! report their opcode on demand. Arithmetic, unary and comparison families share a
//! variant each and are told apart by [`BinaryOp`], [`UnaryOp`] and [`CompareOp`].

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Every operation of the lifted instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
pub enum OpCode {
    /// Front-end could not classify the native instruction
    Unknown,
    /// No operation
    Nop,
    /// `dest = src`
    Move,
    /// `dest = &src`
    LoadAddress,
    /// `dest = phi(sources...)`
    Phi,
    /// `dest = target(args...)`
    Call,
    /// `target(args...)`
    CallVoid,
    /// `dest = target(args...)`, abandoning the caller's frame
    TailCall,
    /// `target(args...)`, abandoning the caller's frame
    TailCallVoid,
    /// `return value`
    Return,
    /// `return`
    ReturnVoid,
    /// `goto target`
    Jump,
    /// `if condition goto target`
    ConditionalJump,
    /// Adjusts the implicit stack pointer
    ShiftStack,
    /// `dest = lhs + rhs`
    Add,
    /// `dest = lhs - rhs`
    Subtract,
    /// `dest = lhs * rhs`
    Multiply,
    /// `dest = lhs / rhs`
    Divide,
    /// `dest = lhs << rhs`
    ShiftLeft,
    /// `dest = lhs >> rhs`
    ShiftRight,
    /// `dest = lhs & rhs`
    And,
    /// `dest = lhs | rhs`
    Or,
    /// `dest = lhs ^ rhs`
    Xor,
    /// `dest = ~src`
    Not,
    /// `dest = -src`
    Negate,
    /// `dest = lhs == rhs`
    CheckEqual,
    /// `dest = lhs > rhs`
    CheckGreater,
    /// `dest = lhs < rhs`
    CheckLess,
}

impl OpCode {
    /// Returns `true` for the four call variants.
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(
            self,
            OpCode::Call | OpCode::CallVoid | OpCode::TailCall | OpCode::TailCallVoid
        )
    }

    /// Returns `true` for the two tail call variants.
    #[must_use]
    pub const fn is_tail_call(self) -> bool {
        matches!(self, OpCode::TailCall | OpCode::TailCallVoid)
    }

    /// Returns `true` for operations that end a basic block during graph construction.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::ConditionalJump
                | OpCode::Return
                | OpCode::ReturnVoid
                | OpCode::Unknown
        ) || self.is_call()
    }
}

/// Two-operand arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
}

impl BinaryOp {
    /// The catalogue entry for this operation.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Subtract => OpCode::Subtract,
            BinaryOp::Multiply => OpCode::Multiply,
            BinaryOp::Divide => OpCode::Divide,
            BinaryOp::ShiftLeft => OpCode::ShiftLeft,
            BinaryOp::ShiftRight => OpCode::ShiftRight,
            BinaryOp::And => OpCode::And,
            BinaryOp::Or => OpCode::Or,
            BinaryOp::Xor => OpCode::Xor,
        }
    }
}

/// One-operand operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum UnaryOp {
    /// `~`
    Not,
    /// unary `-`
    Negate,
}

impl UnaryOp {
    /// The catalogue entry for this operation.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            UnaryOp::Not => OpCode::Not,
            UnaryOp::Negate => OpCode::Negate,
        }
    }
}

/// Comparisons producing `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `>`
    Greater,
    /// `<`
    Less,
}

impl CompareOp {
    /// The catalogue entry for this operation.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            CompareOp::Equal => OpCode::CheckEqual,
            CompareOp::Greater => OpCode::CheckGreater,
            CompareOp::Less => OpCode::CheckLess,
        }
    }
}
