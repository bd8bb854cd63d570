//! The lifted intermediate representation.
//!
//! The front end hands the decompiler one flat, address-ordered list of [`Instruction`]s per
//! method. Operands start out as registers, stack offsets and memory addresses recovered
//! from native code; the passes progressively turn them into [`LocalVariable`]s, declared
//! fields and declared types.
//!
//! # Key Components
//!
//! - [`operand`] - The [`Operand`] sum type and its register/memory building blocks
//! - [`opcode`] - The closed [`OpCode`] catalogue
//! - [`instruction`] - Typed [`InstructionKind`] variants and their operand-role views
//! - [`local`] - Recovered locals and their arena ids

pub mod instruction;
pub mod local;
pub mod opcode;
pub mod operand;

pub use instruction::{BranchTarget, Instruction, InstructionKind};
pub use local::{LocalId, LocalVariable};
pub use opcode::{BinaryOp, CompareOp, OpCode, UnaryOp};
pub use operand::{AddressPart, MemoryAddress, Operand, Register};
