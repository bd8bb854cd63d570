//! CIL generation.
//!
//! The last stage of the pipeline turns a fully processed [`crate::Method`] into a symbolic
//! CIL body.
//!
//! # Key Components
//!
//! - [`cil`] - Opcodes, operands and the [`CilBody`] result
//! - [`emitter`] - Instruction emission, label fixups and stack depth tracking
//! - [`generator`] - The per-instruction lowering in [`CodeGenerator`]

pub mod cil;
pub mod emitter;
pub mod generator;

pub use cil::{CilBody, CilInstruction, CilLocal, CilOpCode, CilOperand, ImportedMember};
pub use emitter::{CilEmitter, CodeLabel, LabelFixup};
pub use generator::CodeGenerator;
