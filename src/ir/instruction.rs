//! Lifted instructions.
//!
//! Each [`InstructionKind`] variant carries exactly the operands its operation needs, so
//! an instruction can never hold the wrong number or the wrong role of operands. The flat
//! views the passes work with (sources, destination, operand lists) are derived from the
//! variant.
//!
//! # Operand roles
//!
//! | Kind | Destination | Sources |
//! |------|-------------|---------|
//! | `Move`, `LoadAddress`, `Unary` | `dest` | `src` |
//! | `Binary`, `Compare` | `dest` | `lhs`, `rhs` |
//! | `Phi` | `dest` | `sources` |
//! | `Call`, `TailCall` | `dest` | `args` |
//! | `CallVoid`, `TailCallVoid` | - | `args` |
//! | `Return` | - | `value` |
//! | `ConditionalJump` | - | `condition` |
//!
//! A destination that is itself constant (a raw address store) is not reported as a
//! destination, matching how constants are excluded from sources.

use std::fmt;

use crate::{
    analysis::cfg::BlockId,
    ir::{
        opcode::{BinaryOp, CompareOp, OpCode, UnaryOp},
        operand::Operand,
    },
    metadata::MethodRc,
};

/// Where a branch goes.
///
/// The front end refers to instruction indices. Graph construction rewrites every target
/// to the block that now begins with that instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    /// Index of the target instruction
    Instruction(usize),
    /// Block starting at the target
    Block(BlockId),
}

impl BranchTarget {
    /// The target block, once resolved.
    #[must_use]
    pub fn block(&self) -> Option<BlockId> {
        match self {
            BranchTarget::Block(block) => Some(*block),
            BranchTarget::Instruction(_) => None,
        }
    }
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchTarget::Instruction(index) => write!(f, "@{index}"),
            BranchTarget::Block(block) => write!(f, "{block}"),
        }
    }
}

/// An operation together with its typed operands.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// Unclassified native instruction, kept as a diagnostic
    Unknown {
        /// Text shown to the user in place of the instruction
        text: String,
    },
    /// No operation
    Nop,
    /// `dest = src`
    Move {
        /// Written operand
        dest: Operand,
        /// Read operand
        src: Operand,
    },
    /// `dest = &src`
    LoadAddress {
        /// Written operand
        dest: Operand,
        /// Operand whose address is taken
        src: Operand,
    },
    /// `dest = phi(sources...)`, one source per predecessor in predecessor order
    Phi {
        /// Merged value
        dest: Operand,
        /// Incoming values
        sources: Vec<Operand>,
    },
    /// `dest = target(args...)`
    Call {
        /// Receives the return value
        dest: Operand,
        /// Called method
        target: MethodRc,
        /// Arguments, receiver first for instance methods
        args: Vec<Operand>,
    },
    /// `target(args...)`
    CallVoid {
        /// Called method
        target: MethodRc,
        /// Arguments, receiver first for instance methods
        args: Vec<Operand>,
    },
    /// `dest = target(args...)` abandoning the caller's frame
    TailCall {
        /// Receives the return value
        dest: Operand,
        /// Called method
        target: MethodRc,
        /// Arguments, receiver first for instance methods
        args: Vec<Operand>,
    },
    /// `target(args...)` abandoning the caller's frame
    TailCallVoid {
        /// Called method
        target: MethodRc,
        /// Arguments, receiver first for instance methods
        args: Vec<Operand>,
    },
    /// `return value`
    Return {
        /// Returned operand
        value: Operand,
    },
    /// `return`
    ReturnVoid,
    /// `goto target`
    Jump {
        /// Destination
        target: BranchTarget,
    },
    /// `if condition goto target`, falls through otherwise
    ConditionalJump {
        /// Destination when taken
        target: BranchTarget,
        /// Taken when truthy
        condition: Operand,
    },
    /// Moves the implicit stack pointer by `delta` bytes
    ShiftStack {
        /// Signed adjustment
        delta: i32,
    },
    /// `dest = lhs op rhs`
    Binary {
        /// Operation
        op: BinaryOp,
        /// Result
        dest: Operand,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
    /// `dest = op src`
    Unary {
        /// Operation
        op: UnaryOp,
        /// Result
        dest: Operand,
        /// Operand
        src: Operand,
    },
    /// `dest = lhs op rhs` as 0 or 1
    Compare {
        /// Comparison
        op: CompareOp,
        /// Result
        dest: Operand,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
}

/// A lifted instruction.
///
/// The index identifies the instruction for branch resolution and diagnostics; it is not
/// an address. Instructions synthesized by passes (phis, phi-resolving moves) have none.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Position in the front end's instruction list
    pub index: Option<usize>,
    /// Operation and operands
    pub kind: InstructionKind,
}

impl Instruction {
    /// Creates an instruction that came from the front end.
    #[must_use]
    pub fn new(index: usize, kind: InstructionKind) -> Self {
        Instruction {
            index: Some(index),
            kind,
        }
    }

    /// Creates an instruction produced by a pass.
    #[must_use]
    pub fn synthetic(kind: InstructionKind) -> Self {
        Instruction { index: None, kind }
    }

    /// `dest = src`
    #[must_use]
    pub fn mov(index: usize, dest: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::new(
            index,
            InstructionKind::Move {
                dest: dest.into(),
                src: src.into(),
            },
        )
    }

    /// `goto @target`
    #[must_use]
    pub fn jump(index: usize, target: usize) -> Self {
        Self::new(
            index,
            InstructionKind::Jump {
                target: BranchTarget::Instruction(target),
            },
        )
    }

    /// `if condition goto @target`
    #[must_use]
    pub fn branch_if(index: usize, target: usize, condition: impl Into<Operand>) -> Self {
        Self::new(
            index,
            InstructionKind::ConditionalJump {
                target: BranchTarget::Instruction(target),
                condition: condition.into(),
            },
        )
    }

    /// `return value`
    #[must_use]
    pub fn ret(index: usize, value: impl Into<Operand>) -> Self {
        Self::new(
            index,
            InstructionKind::Return {
                value: value.into(),
            },
        )
    }

    /// `return`
    #[must_use]
    pub fn ret_void(index: usize) -> Self {
        Self::new(index, InstructionKind::ReturnVoid)
    }

    /// `dest = lhs op rhs`
    #[must_use]
    pub fn binary(
        index: usize,
        op: BinaryOp,
        dest: impl Into<Operand>,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Self {
        Self::new(
            index,
            InstructionKind::Binary {
                op,
                dest: dest.into(),
                lhs: lhs.into(),
                rhs: rhs.into(),
            },
        )
    }

    /// Stack pointer adjustment by `delta`
    #[must_use]
    pub fn shift_stack(index: usize, delta: i32) -> Self {
        Self::new(index, InstructionKind::ShiftStack { delta })
    }

    /// The catalogue opcode of this instruction.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        match &self.kind {
            InstructionKind::Unknown { .. } => OpCode::Unknown,
            InstructionKind::Nop => OpCode::Nop,
            InstructionKind::Move { .. } => OpCode::Move,
            InstructionKind::LoadAddress { .. } => OpCode::LoadAddress,
            InstructionKind::Phi { .. } => OpCode::Phi,
            InstructionKind::Call { .. } => OpCode::Call,
            InstructionKind::CallVoid { .. } => OpCode::CallVoid,
            InstructionKind::TailCall { .. } => OpCode::TailCall,
            InstructionKind::TailCallVoid { .. } => OpCode::TailCallVoid,
            InstructionKind::Return { .. } => OpCode::Return,
            InstructionKind::ReturnVoid => OpCode::ReturnVoid,
            InstructionKind::Jump { .. } => OpCode::Jump,
            InstructionKind::ConditionalJump { .. } => OpCode::ConditionalJump,
            InstructionKind::ShiftStack { .. } => OpCode::ShiftStack,
            InstructionKind::Binary { op, .. } => op.opcode(),
            InstructionKind::Unary { op, .. } => op.opcode(),
            InstructionKind::Compare { op, .. } => op.opcode(),
        }
    }

    /// Returns `true` for any call variant.
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.opcode().is_call()
    }

    /// Returns `true` for tail calls.
    #[must_use]
    pub fn is_tail_call(&self) -> bool {
        self.opcode().is_tail_call()
    }

    /// Returns `true` for `Nop`.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        matches!(self.kind, InstructionKind::Nop)
    }

    /// Returns `true` for instructions after which control never falls through.
    #[must_use]
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Jump { .. } | InstructionKind::Return { .. } | InstructionKind::ReturnVoid
        )
    }

    /// Degrades the instruction to `Nop`, dropping its operands.
    pub fn make_nop(&mut self) {
        self.kind = InstructionKind::Nop;
    }

    /// The called method of a call variant.
    #[must_use]
    pub fn call_target(&self) -> Option<&MethodRc> {
        match &self.kind {
            InstructionKind::Call { target, .. }
            | InstructionKind::CallVoid { target, .. }
            | InstructionKind::TailCall { target, .. }
            | InstructionKind::TailCallVoid { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The branch target of a jump.
    #[must_use]
    pub fn branch_target(&self) -> Option<&BranchTarget> {
        match &self.kind {
            InstructionKind::Jump { target } | InstructionKind::ConditionalJump { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Mutable branch target of a jump.
    pub fn branch_target_mut(&mut self) -> Option<&mut BranchTarget> {
        match &mut self.kind {
            InstructionKind::Jump { target } | InstructionKind::ConditionalJump { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The destination slot, whether or not it holds a constant.
    #[must_use]
    pub fn destination_slot(&self) -> Option<&Operand> {
        match &self.kind {
            InstructionKind::Move { dest, .. }
            | InstructionKind::LoadAddress { dest, .. }
            | InstructionKind::Phi { dest, .. }
            | InstructionKind::Call { dest, .. }
            | InstructionKind::TailCall { dest, .. }
            | InstructionKind::Binary { dest, .. }
            | InstructionKind::Unary { dest, .. }
            | InstructionKind::Compare { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// Mutable destination slot.
    pub fn destination_mut(&mut self) -> Option<&mut Operand> {
        match &mut self.kind {
            InstructionKind::Move { dest, .. }
            | InstructionKind::LoadAddress { dest, .. }
            | InstructionKind::Phi { dest, .. }
            | InstructionKind::Call { dest, .. }
            | InstructionKind::TailCall { dest, .. }
            | InstructionKind::Binary { dest, .. }
            | InstructionKind::Unary { dest, .. }
            | InstructionKind::Compare { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// The written operand, unless the instruction writes nothing or writes a constant.
    #[must_use]
    pub fn destination(&self) -> Option<&Operand> {
        self.destination_slot().filter(|dest| !dest.is_constant())
    }

    /// Every read operand, literals included, in operand order.
    #[must_use]
    pub fn sources_and_constants(&self) -> Vec<&Operand> {
        match &self.kind {
            InstructionKind::Move { src, .. }
            | InstructionKind::LoadAddress { src, .. }
            | InstructionKind::Unary { src, .. } => vec![src],
            InstructionKind::Binary { lhs, rhs, .. } | InstructionKind::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstructionKind::Phi { sources, .. } => sources.iter().collect(),
            InstructionKind::Call { args, .. }
            | InstructionKind::CallVoid { args, .. }
            | InstructionKind::TailCall { args, .. }
            | InstructionKind::TailCallVoid { args, .. } => args.iter().collect(),
            InstructionKind::Return { value } => vec![value],
            InstructionKind::ConditionalJump { condition, .. } => vec![condition],
            InstructionKind::Unknown { .. }
            | InstructionKind::Nop
            | InstructionKind::ReturnVoid
            | InstructionKind::Jump { .. }
            | InstructionKind::ShiftStack { .. } => Vec::new(),
        }
    }

    /// Every read operand that is not a constant.
    #[must_use]
    pub fn sources(&self) -> Vec<&Operand> {
        self.sources_and_constants()
            .into_iter()
            .filter(|operand| !operand.is_constant())
            .collect()
    }

    /// Mutable read slots, literals included.
    pub fn sources_mut(&mut self) -> Vec<&mut Operand> {
        match &mut self.kind {
            InstructionKind::Move { src, .. }
            | InstructionKind::LoadAddress { src, .. }
            | InstructionKind::Unary { src, .. } => vec![src],
            InstructionKind::Binary { lhs, rhs, .. } | InstructionKind::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstructionKind::Phi { sources, .. } => sources.iter_mut().collect(),
            InstructionKind::Call { args, .. }
            | InstructionKind::CallVoid { args, .. }
            | InstructionKind::TailCall { args, .. }
            | InstructionKind::TailCallVoid { args, .. } => args.iter_mut().collect(),
            InstructionKind::Return { value } => vec![value],
            InstructionKind::ConditionalJump { condition, .. } => vec![condition],
            InstructionKind::Unknown { .. }
            | InstructionKind::Nop
            | InstructionKind::ReturnVoid
            | InstructionKind::Jump { .. }
            | InstructionKind::ShiftStack { .. } => Vec::new(),
        }
    }

    /// All operand slots, destination first.
    #[must_use]
    pub fn operands(&self) -> Vec<&Operand> {
        let mut operands: Vec<&Operand> = self.destination_slot().into_iter().collect();
        operands.extend(self.sources_and_constants());
        operands
    }

    /// All mutable operand slots, destination first.
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match &mut self.kind {
            InstructionKind::Move { dest, src }
            | InstructionKind::LoadAddress { dest, src }
            | InstructionKind::Unary { dest, src, .. } => vec![dest, src],
            InstructionKind::Binary { dest, lhs, rhs, .. }
            | InstructionKind::Compare { dest, lhs, rhs, .. } => vec![dest, lhs, rhs],
            InstructionKind::Phi { dest, sources } => {
                std::iter::once(dest).chain(sources.iter_mut()).collect()
            }
            InstructionKind::Call { dest, args, .. } | InstructionKind::TailCall { dest, args, .. } => {
                std::iter::once(dest).chain(args.iter_mut()).collect()
            }
            InstructionKind::CallVoid { args, .. } | InstructionKind::TailCallVoid { args, .. } => {
                args.iter_mut().collect()
            }
            InstructionKind::Return { value } => vec![value],
            InstructionKind::ConditionalJump { condition, .. } => vec![condition],
            InstructionKind::Unknown { .. }
            | InstructionKind::Nop
            | InstructionKind::ReturnVoid
            | InstructionKind::Jump { .. }
            | InstructionKind::ShiftStack { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{index:04} {}", self.opcode())?,
            None => write!(f, "---- {}", self.opcode())?,
        }

        let mut parts: Vec<String> = Vec::new();
        match &self.kind {
            InstructionKind::Unknown { text } => parts.push(format!("{text:?}")),
            InstructionKind::ShiftStack { delta } => parts.push(delta.to_string()),
            InstructionKind::Jump { target } => parts.push(target.to_string()),
            InstructionKind::ConditionalJump { target, condition } => {
                parts.push(target.to_string());
                parts.push(condition.to_string());
            }
            InstructionKind::Call { dest, target, args } | InstructionKind::TailCall { dest, target, args } => {
                parts.push(dest.to_string());
                parts.push(target.full_name());
                parts.extend(args.iter().map(ToString::to_string));
            }
            InstructionKind::CallVoid { target, args } | InstructionKind::TailCallVoid { target, args } => {
                parts.push(target.full_name());
                parts.extend(args.iter().map(ToString::to_string));
            }
            _ => parts.extend(self.operands().iter().map(ToString::to_string)),
        }

        if !parts.is_empty() {
            write!(f, " {}", parts.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::{MemoryAddress, Register};
    use crate::metadata::{MethodDefinition, Token, TypeDefinition};

    fn r(n: u32) -> Operand {
        Operand::Register(Register::new(n))
    }

    #[test]
    fn test_sources_exclude_constants() {
        let add = Instruction::binary(0, BinaryOp::Add, r(0), r(1), 4);
        assert_eq!(add.sources(), vec![&r(1)]);
        assert_eq!(add.sources_and_constants(), vec![&r(1), &Operand::Int(4)]);
        assert_eq!(add.destination(), Some(&r(0)));
        assert_eq!(add.opcode(), OpCode::Add);
    }

    #[test]
    fn test_constant_destination_is_not_reported() {
        let store = Instruction::mov(0, MemoryAddress::absolute(0x4000), r(2));
        assert!(store.destination().is_none());
        assert!(store.destination_slot().is_some());

        let computed = Instruction::mov(1, MemoryAddress::based(Register::new(3), 8), r(2));
        assert!(computed.destination().is_some());
    }

    #[test]
    fn test_call_roles() {
        let ty = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "", "T");
        let callee = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 1), "F", &ty).build();
        let call = Instruction::new(
            3,
            InstructionKind::Call {
                dest: r(0),
                target: callee.clone(),
                args: vec![r(1), Operand::Int(2)],
            },
        );
        assert!(call.is_call());
        assert_eq!(call.destination(), Some(&r(0)));
        assert_eq!(call.sources(), vec![&r(1)]);
        assert_eq!(call.call_target(), Some(&callee));
        assert_eq!(call.to_string(), "0003 Call r0, T.F, r1, 2");

        let void = Instruction::new(4, InstructionKind::CallVoid { target: callee, args: vec![] });
        assert!(void.destination().is_none());
        assert!(void.operands().is_empty());
    }

    #[test]
    fn test_make_nop_clears_operands() {
        let mut mov = Instruction::mov(7, r(0), r(1));
        mov.make_nop();
        assert!(mov.is_nop());
        assert!(mov.operands().is_empty());
        assert_eq!(mov.index, Some(7));
    }

    #[test]
    fn test_branch_targets() {
        let mut jump = Instruction::branch_if(2, 9, r(0));
        assert_eq!(jump.branch_target(), Some(&BranchTarget::Instruction(9)));
        if let Some(target) = jump.branch_target_mut() {
            *target = BranchTarget::Block(BlockId::new(4));
        }
        assert_eq!(jump.branch_target().and_then(BranchTarget::block), Some(BlockId::new(4)));
        assert_eq!(jump.to_string(), "0002 ConditionalJump B4, r0");
        assert!(!jump.is_unconditional_transfer());
        assert!(Instruction::jump(3, 0).is_unconditional_transfer());
    }
}
