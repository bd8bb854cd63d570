//! Basic blocks and their identifiers.
//!
//! Blocks live in the arena of their [`crate::analysis::ControlFlowGraph`] and refer to
//! each other by [`BlockId`]. Predecessor and successor lists are plain id lists and own
//! nothing, so the graph can be cyclic without any reference cycles.

use std::fmt;

use crate::ir::{Instruction, InstructionKind, Operand};

/// A strongly-typed identifier for a block within a control flow graph.
///
/// Ids are arena indices. They stay valid for the lifetime of the graph, even after other
/// blocks are removed, and are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a new `BlockId` from a raw arena index.
    ///
    /// Normal usage obtains ids from the graph; this exists for tests and lookups.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Role of a block in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Sentinel every path starts from
    Entry,
    /// Sentinel every path ends in
    Exit,
    /// Holds instructions
    Body,
}

/// A straight-line run of instructions.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) successors: Vec<BlockId>,
    pub(crate) uses: Vec<Operand>,
    pub(crate) defs: Vec<Operand>,
    /// Set while the block's branch edge has not been wired after the linear split
    pub(crate) dirty: bool,
}

impl Block {
    pub(crate) fn new(id: BlockId, kind: BlockKind) -> Self {
        Block {
            id,
            kind,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            uses: Vec::new(),
            defs: Vec::new(),
            dirty: false,
        }
    }

    /// This block's id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Entry, exit or body.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns `true` for the entry and exit sentinels.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.kind != BlockKind::Body
    }

    /// Instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Mutable instructions. Callers changing terminators must keep edges consistent.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Blocks with an edge into this one.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Blocks this one has an edge to.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Non-constant operands read in this block, first occurrence order.
    ///
    /// Current as of the last `BuildUseDefLists` run.
    #[must_use]
    pub fn uses(&self) -> &[Operand] {
        &self.uses
    }

    /// Operands written in this block, first occurrence order.
    #[must_use]
    pub fn defs(&self) -> &[Operand] {
        &self.defs
    }

    /// Returns `true` if the branch edge of this block still awaits wiring.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The last instruction.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Returns `true` if the block ends in a call variant.
    #[must_use]
    pub fn ends_in_call(&self) -> bool {
        self.terminator().is_some_and(Instruction::is_call)
    }

    /// Returns `true` if the block ends in a tail call.
    #[must_use]
    pub fn ends_in_tail_call(&self) -> bool {
        self.terminator().is_some_and(Instruction::is_tail_call)
    }

    /// Position before which code must go to still execute on every outgoing edge.
    ///
    /// That is before a trailing jump, and the end of the block otherwise.
    #[must_use]
    pub fn insertion_point(&self) -> usize {
        match self.terminator().map(|instruction| &instruction.kind) {
            Some(InstructionKind::Jump { .. } | InstructionKind::ConditionalJump { .. }) => {
                self.instructions.len() - 1
            }
            _ => self.instructions.len(),
        }
    }

    pub(crate) fn add_successor(&mut self, successor: BlockId) {
        if !self.successors.contains(&successor) {
            self.successors.push(successor);
        }
    }

    pub(crate) fn add_predecessor(&mut self, predecessor: BlockId) {
        if !self.predecessors.contains(&predecessor) {
            self.predecessors.push(predecessor);
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.kind {
            BlockKind::Entry => " (entry)",
            BlockKind::Exit => " (exit)",
            BlockKind::Body => "",
        };
        let successors: Vec<String> = self.successors.iter().map(ToString::to_string).collect();
        writeln!(f, "{}{role} -> [{}]", self.id, successors.join(", "))?;
        for instruction in &self.instructions {
            writeln!(f, "    {instruction}")?;
        }
        Ok(())
    }
}
