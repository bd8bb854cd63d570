//! # dotlift Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotlift library. Import this module to get quick access to everything needed
//! to describe a method and decompile it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotlift operations
pub use crate::Error;

/// The result type used throughout dotlift
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Pipeline driver and its configuration
pub use crate::{Decompiler, DecompilerConfig};

/// A lifted method
pub use crate::Method;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Instructions and their typed kinds
pub use crate::ir::{BranchTarget, Instruction, InstructionKind};

/// Operands and their building blocks
pub use crate::ir::{AddressPart, MemoryAddress, Operand, Register};

/// Operation catalogue
pub use crate::ir::{BinaryOp, CompareOp, OpCode, UnaryOp};

/// Recovered locals
pub use crate::ir::{LocalId, LocalVariable};

// ================================================================================================
// Metadata
// ================================================================================================

/// Declared entities
pub use crate::metadata::{
    FieldDefinition, FieldFlags, FieldRc, MethodDefinition, MethodFlags, MethodRc, ParameterDefinition,
    TypeDefinition, TypeRc,
};

/// Metadata token type
pub use crate::metadata::Token;

/// Address and offset resolution
pub use crate::metadata::{NullContext, ResolutionContext, TableContext};

// ================================================================================================
// Analysis and Transforms
// ================================================================================================

/// Control flow graph
pub use crate::analysis::{Block, BlockId, ControlFlowGraph, Dominance};

/// Pass interface
pub use crate::transforms::Transform;

// ================================================================================================
// Code Generation
// ================================================================================================

/// Symbolic CIL output
pub use crate::codegen::{CilBody, CilInstruction, CilLocal, CilOpCode, CilOperand, CodeGenerator, ImportedMember};
