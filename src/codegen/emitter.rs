//! Instruction emission with label fixups.
//!
//! Branches are emitted against symbolic [`CodeLabel`]s before the code at the target
//! exists. [`CilEmitter::finalize`] resolves every fixup to an instruction index. A label
//! that was never defined, or that points past the last instruction, resolves to the first
//! instruction instead of failing: the body stays loadable and the fallback is reported.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotlift::codegen::{CilEmitter, CilOpCode, CodeLabel};
//!
//! let mut emitter = CilEmitter::new();
//! emitter.emit_branch(CilOpCode::Br, CodeLabel::Epilogue)?;
//! emitter.define_label(CodeLabel::Epilogue)?;
//! emitter.emit(CilOpCode::Ret, None)?;
//! let (body, unresolved) = emitter.finalize(Vec::new());
//! ```

use std::{collections::HashMap, fmt};

use log::warn;

use crate::{
    analysis::BlockId,
    codegen::cil::{CilBody, CilInstruction, CilLocal, CilOpCode, CilOperand},
    Error, Result,
};

/// A branch destination known before its code is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeLabel {
    /// First instruction emitted for a block
    Block(BlockId),
    /// The trailing default return
    Epilogue,
    /// A front-end instruction index that never became a block
    Unresolved(usize),
}

impl fmt::Display for CodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeLabel::Block(block) => write!(f, "{block}"),
            CodeLabel::Epilogue => write!(f, "epilogue"),
            CodeLabel::Unresolved(index) => write!(f, "@{index}"),
        }
    }
}

/// A branch waiting for its label.
#[derive(Debug, Clone)]
pub struct LabelFixup {
    /// The target label
    pub label: CodeLabel,
    /// Index of the branch instruction
    pub instruction: usize,
}

/// Builds an instruction stream and tracks stack depth.
///
/// Every label starts with an empty evaluation stack, which holds for the generator's
/// output where each lifted instruction leaves the stack as it found it.
#[derive(Debug, Default)]
pub struct CilEmitter {
    /// Emitted instructions
    instructions: Vec<CilInstruction>,
    /// Defined labels (label -> instruction index)
    labels: HashMap<CodeLabel, usize>,
    /// Branches awaiting resolution
    fixups: Vec<LabelFixup>,
    /// Items currently on the evaluation stack
    current_stack_depth: i32,
    /// Deepest stack reached
    max_stack_depth: u16,
}

impl CilEmitter {
    /// Creates an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a non-branch instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodegenError`] for branch opcodes, which go through
    /// [`CilEmitter::emit_branch`], and on stack underflow.
    pub fn emit(&mut self, opcode: CilOpCode, operand: Option<CilOperand>) -> Result<()> {
        if opcode.is_branch() {
            return Err(Error::CodegenError(format!("'{opcode}' needs a label")));
        }
        self.push(CilInstruction::new(opcode, operand))
    }

    /// Appends a call whose stack effect is given by its argument count.
    ///
    /// The lifted call site is authoritative over the callee's signature: the generator
    /// pushes exactly the arguments it has.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodegenError`] on stack underflow.
    pub fn emit_call(&mut self, operand: CilOperand, arguments: usize, returns: bool) -> Result<()> {
        let pops = i32::try_from(arguments).map_err(|_| Error::CodegenError("too many arguments".to_string()))?;
        self.instructions.push(CilInstruction::new(CilOpCode::Call, Some(operand)));
        self.update_stack_depth(pops, i32::from(returns))
    }

    /// Appends a branch to `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodegenError`] if `opcode` is not a branch, and on stack underflow.
    pub fn emit_branch(&mut self, opcode: CilOpCode, label: CodeLabel) -> Result<()> {
        if !opcode.is_branch() {
            return Err(Error::CodegenError(format!("'{opcode}' is not a branch instruction")));
        }
        self.fixups.push(LabelFixup {
            label,
            instruction: self.instructions.len(),
        });
        self.push(CilInstruction::new(opcode, Some(CilOperand::Label(0))))
    }

    /// Binds `label` to the next instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodegenError`] if the label is already defined.
    pub fn define_label(&mut self, label: CodeLabel) -> Result<()> {
        if self.labels.contains_key(&label) {
            return Err(Error::CodegenError(format!("label {label} defined twice")));
        }
        self.labels.insert(label, self.instructions.len());
        self.current_stack_depth = 0;
        Ok(())
    }

    /// Index the next instruction will get.
    #[must_use]
    pub fn current_position(&self) -> usize {
        self.instructions.len()
    }

    /// Index a label is bound to, if defined.
    #[must_use]
    pub fn label_position(&self, label: CodeLabel) -> Option<usize> {
        self.labels.get(&label).copied()
    }

    /// Deepest stack reached so far.
    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Resolves all fixups and produces the body.
    ///
    /// # Returns
    ///
    /// The body and the labels that fell back to the first instruction.
    #[must_use]
    pub fn finalize(mut self, locals: Vec<CilLocal>) -> (CilBody, Vec<CodeLabel>) {
        let end = self.instructions.len();
        let mut unresolved = Vec::new();

        for fixup in std::mem::take(&mut self.fixups) {
            let target = match self.labels.get(&fixup.label) {
                Some(position) if *position < end => *position,
                _ => {
                    warn!("branch to {} has no target, using IL_0000", fixup.label);
                    if !unresolved.contains(&fixup.label) {
                        unresolved.push(fixup.label);
                    }
                    0
                }
            };
            if let Some(instruction) = self.instructions.get_mut(fixup.instruction) {
                instruction.operand = Some(CilOperand::Label(target));
            }
        }

        let body = CilBody {
            locals,
            instructions: self.instructions,
            max_stack: self.max_stack_depth,
        };
        (body, unresolved)
    }

    fn push(&mut self, instruction: CilInstruction) -> Result<()> {
        let (pops, pushes) = instruction.stack_effect();
        let ends_flow = instruction.opcode.ends_flow();
        self.instructions.push(instruction);
        self.update_stack_depth(i32::from(pops), i32::from(pushes))?;
        if ends_flow {
            self.current_stack_depth = 0;
        }
        Ok(())
    }

    fn update_stack_depth(&mut self, pops: i32, pushes: i32) -> Result<()> {
        self.current_stack_depth -= pops;
        if self.current_stack_depth < 0 {
            return Err(Error::CodegenError(format!(
                "stack underflow at IL_{:04x}",
                self.instructions.len().saturating_sub(1)
            )));
        }
        self.current_stack_depth += pushes;

        let depth = u16::try_from(self.current_stack_depth)
            .map_err(|_| Error::CodegenError("stack depth exceeds u16 range".to_string()))?;
        self.max_stack_depth = self.max_stack_depth.max(depth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_backward_labels() -> Result<()> {
        let head = CodeLabel::Block(BlockId::new(2));
        let mut emitter = CilEmitter::new();

        emitter.define_label(head)?;
        emitter.emit(CilOpCode::LdcI4, Some(CilOperand::Int32(1)))?;
        emitter.emit_branch(CilOpCode::Brtrue, CodeLabel::Epilogue)?;
        emitter.emit_branch(CilOpCode::Br, head)?;
        emitter.define_label(CodeLabel::Epilogue)?;
        emitter.emit(CilOpCode::Ret, None)?;

        let (body, unresolved) = emitter.finalize(Vec::new());
        assert!(unresolved.is_empty());
        assert_eq!(body.instructions[1].label(), Some(3));
        assert_eq!(body.instructions[2].label(), Some(0));
        assert_eq!(body.max_stack, 1);
        Ok(())
    }

    #[test]
    fn test_missing_label_falls_back_to_first_instruction() -> Result<()> {
        let mut emitter = CilEmitter::new();
        emitter.emit(CilOpCode::Nop, None)?;
        emitter.emit_branch(CilOpCode::Br, CodeLabel::Unresolved(40))?;
        emitter.define_label(CodeLabel::Epilogue)?;

        let (body, unresolved) = emitter.finalize(Vec::new());
        assert_eq!(body.instructions[1].label(), Some(0));
        assert_eq!(unresolved, vec![CodeLabel::Unresolved(40)]);
        Ok(())
    }

    #[test]
    fn test_misuse_is_rejected() -> Result<()> {
        let mut emitter = CilEmitter::new();
        assert!(emitter.emit(CilOpCode::Br, None).is_err());
        assert!(emitter.emit_branch(CilOpCode::Ret, CodeLabel::Epilogue).is_err());
        assert!(emitter.emit(CilOpCode::Pop, None).is_err());

        emitter.define_label(CodeLabel::Epilogue)?;
        assert!(emitter.define_label(CodeLabel::Epilogue).is_err());
        Ok(())
    }
}
