//! Control Flow Graph implementation.
//!
//! This module provides the [`ControlFlowGraph`] the whole pipeline mutates: an arena of
//! [`Block`]s addressed by stable [`BlockId`]s, a layout order fixing how blocks follow each
//! other in the emitted code, and the two sentinels every path starts from and ends in.
//!
//! # Architecture
//!
//! Construction is a linear split followed by a fix-up:
//!
//! 1. Walk the instruction list, closing a block after every jump, return, call and
//!    unknown instruction. Fall-through edges are added immediately; blocks ending in a
//!    jump are marked dirty because their branch edge is not known yet.
//! 2. For every dirty block, locate the branch target instruction. If it is not the head
//!    of its block, split that block right before it. Then add the branch edge.
//! 3. Wire every block without successors to the exit sentinel and rewrite all branch
//!    targets from instruction indices to block ids.
//!
//! A split inserts the tail directly after its head in the layout, so layout order keeps
//! following instruction order and every fall-through edge points at the next block.
//!
//! # Rewrites
//!
//! - [`ControlFlowGraph::merge_call_blocks`] - re-joins straight-line code that was split
//!   only because of a call
//! - [`ControlFlowGraph::remove_nops`] - strips `Nop`s
//! - [`ControlFlowGraph::remove_empty_blocks`] - splices empty blocks out
//! - [`ControlFlowGraph::fix_branches`] - drops jumps to blocks that no longer exist
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotlift::analysis::ControlFlowGraph;
//! use dotlift::ir::{Instruction, Register};
//!
//! let graph = ControlFlowGraph::build(vec![
//!     Instruction::mov(0, Register::new(0), 5),
//!     Instruction::branch_if(1, 3, Register::new(0)),
//!     Instruction::jump(2, 3),
//!     Instruction::ret_void(3),
//! ]);
//! assert_eq!(graph.layout().len(), 3);
//! ```

use std::{collections::VecDeque, fmt};

use log::{trace, warn};

use crate::{
    analysis::cfg::{Block, BlockId, BlockKind, BlockSet},
    ir::{BranchTarget, Instruction, InstructionKind, OpCode},
    Error::GraphError,
    Result,
};

/// A method's control flow graph.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    /// Block arena, `None` for removed blocks
    blocks: Vec<Option<Block>>,
    /// Body blocks in emission order
    layout: Vec<BlockId>,
    entry: BlockId,
    exit: BlockId,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowGraph {
    /// Creates a graph holding only the entry and exit sentinels.
    #[must_use]
    pub fn new() -> Self {
        let entry = BlockId::new(0);
        let exit = BlockId::new(1);
        ControlFlowGraph {
            blocks: vec![
                Some(Block::new(entry, BlockKind::Entry)),
                Some(Block::new(exit, BlockKind::Exit)),
            ],
            layout: Vec::new(),
            entry,
            exit,
        }
    }

    /// Builds the graph of one method body.
    ///
    /// # Arguments
    ///
    /// * `instructions` - The flat, address-ordered instruction list of the method
    ///
    /// # Returns
    ///
    /// A graph in which every branch target is the head of exactly one block and every
    /// body block has at least one successor.
    #[must_use]
    pub fn build(instructions: Vec<Instruction>) -> Self {
        let mut graph = Self::new();

        if instructions.is_empty() {
            graph.add_edge(graph.entry, graph.exit);
            return graph;
        }

        let mut current = graph.add_block();
        graph.add_edge(graph.entry, current);

        let count = instructions.len();
        for (position, instruction) in instructions.into_iter().enumerate() {
            let is_last = position + 1 == count;
            let opcode = instruction.opcode();

            if let Some(block) = graph.block_mut(current) {
                block.instructions.push(instruction);
            }

            if !opcode.ends_block() {
                continue;
            }

            match opcode {
                OpCode::Jump | OpCode::ConditionalJump => graph.set_dirty(current, true),
                OpCode::Return | OpCode::ReturnVoid => graph.add_edge(current, graph.exit),
                _ => {}
            }

            let falls_through = !matches!(opcode, OpCode::Jump | OpCode::Return | OpCode::ReturnVoid);
            if is_last {
                if falls_through {
                    graph.add_edge(current, graph.exit);
                }
                break;
            }

            let next = graph.add_block();
            if falls_through {
                graph.add_edge(current, next);
            }
            current = next;
        }

        graph.resolve_dirty_blocks();

        for id in graph.layout.clone() {
            if graph.successors(id).is_empty() {
                graph.add_edge(id, graph.exit);
            }
        }

        graph.resolve_branch_targets();
        graph
    }

    /// The entry sentinel.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// The exit sentinel.
    #[must_use]
    pub const fn exit(&self) -> BlockId {
        self.exit
    }

    /// Size of the block arena, an upper bound for every [`BlockId`] of this graph.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Number of live blocks, sentinels included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.layout.len() + 2
    }

    /// Returns the block, if it still exists.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the block mutably, if it still exists.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Returns `true` if the block exists.
    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        self.block(id).is_some()
    }

    /// Body blocks in emission order.
    #[must_use]
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    /// Body blocks in emission order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.layout.iter().filter_map(|id| self.block(*id))
    }

    /// Every live block id: entry, body blocks in layout order, exit.
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut ids = Vec::with_capacity(self.layout.len() + 2);
        ids.push(self.entry);
        ids.extend_from_slice(&self.layout);
        ids.push(self.exit);
        ids
    }

    /// Successors of a block, empty for unknown ids.
    #[must_use]
    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        self.block(id).map_or(&[], Block::successors)
    }

    /// Predecessors of a block, empty for unknown ids.
    #[must_use]
    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.block(id).map_or(&[], Block::predecessors)
    }

    /// All instructions in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks().flat_map(|block| block.instructions.iter())
    }

    /// All instructions, mutably, in arena order.
    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.blocks
            .iter_mut()
            .flatten()
            .flat_map(|block| block.instructions.iter_mut())
    }

    /// Total number of instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks().map(|block| block.instructions.len()).sum()
    }

    /// Finds the block and position of the instruction with front-end index `index`.
    #[must_use]
    pub fn locate_instruction(&self, index: usize) -> Option<(BlockId, usize)> {
        self.blocks().find_map(|block| {
            block
                .instructions
                .iter()
                .position(|instruction| instruction.index == Some(index))
                .map(|position| (block.id, position))
        })
    }

    /// Adds the edge `from -> to`. Existing edges are not duplicated.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.contains(from) || !self.contains(to) {
            return;
        }
        if let Some(block) = self.block_mut(from) {
            block.add_successor(to);
        }
        if let Some(block) = self.block_mut(to) {
            block.add_predecessor(from);
        }
    }

    /// Removes the edge `from -> to`, if present.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        if let Some(block) = self.block_mut(from) {
            block.successors.retain(|id| *id != to);
        }
        if let Some(block) = self.block_mut(to) {
            block.predecessors.retain(|id| *id != from);
        }
    }

    /// Appends a new, empty body block to the layout.
    pub fn add_block(&mut self) -> BlockId {
        self.insert_block(self.layout.len())
    }

    fn insert_block(&mut self, layout_position: usize) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Some(Block::new(id, BlockKind::Body)));
        self.layout.insert(layout_position.min(self.layout.len()), id);
        id
    }

    fn layout_position(&self, id: BlockId) -> Option<usize> {
        self.layout.iter().position(|b| *b == id)
    }

    /// Removes a body block and every edge touching it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] for sentinels and unknown ids.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Block> {
        match self.block(id) {
            None => return Err(GraphError(format!("cannot remove missing block {id}"))),
            Some(block) if block.is_sentinel() => {
                return Err(GraphError(format!("cannot remove sentinel block {id}")))
            }
            Some(_) => {}
        }

        let mut removed = self.blocks[id.index()]
            .take()
            .ok_or_else(|| GraphError(format!("cannot remove missing block {id}")))?;

        for predecessor in &removed.predecessors {
            if let Some(block) = self.block_mut(*predecessor) {
                block.successors.retain(|b| *b != id);
            }
        }
        for successor in &removed.successors {
            if let Some(block) = self.block_mut(*successor) {
                block.predecessors.retain(|b| *b != id);
            }
        }

        removed.predecessors.clear();
        removed.successors.clear();
        self.layout.retain(|b| *b != id);
        Ok(removed)
    }

    /// Splits a block right before position `at`.
    ///
    /// The new tail takes over the instructions from `at`, the successors and the dirty
    /// flag; the head gets a single edge to the tail. The tail is placed directly after the
    /// head in the layout.
    ///
    /// # Errors
    ///
    /// Returns an error for sentinels, unknown ids and split points outside `1..len`.
    pub fn split_block(&mut self, id: BlockId, at: usize) -> Result<BlockId> {
        let block = self
            .block_mut(id)
            .ok_or_else(|| GraphError(format!("cannot split missing block {id}")))?;
        if block.is_sentinel() {
            return Err(GraphError(format!("cannot split sentinel block {id}")));
        }
        if at == 0 || at >= block.instructions.len() {
            return Err(malformed_error!(
                "split point {} outside of block {} with {} instructions",
                at,
                id,
                block.instructions.len()
            ));
        }

        let instructions = block.instructions.split_off(at);
        let successors = std::mem::take(&mut block.successors);
        let dirty = std::mem::replace(&mut block.dirty, false);

        let position = self.layout_position(id).map_or(self.layout.len(), |p| p + 1);
        let tail = self.insert_block(position);
        if let Some(tail_block) = self.block_mut(tail) {
            tail_block.instructions = instructions;
            tail_block.successors = successors.clone();
            tail_block.dirty = dirty;
        }

        for successor in successors {
            if let Some(block) = self.block_mut(successor) {
                for predecessor in &mut block.predecessors {
                    if *predecessor == id {
                        *predecessor = tail;
                    }
                }
            }
        }

        self.add_edge(id, tail);
        trace!("split {id} at {at}, tail {tail}");
        Ok(tail)
    }

    /// Places a new block on the edge `from -> to`.
    ///
    /// The new block takes `to`'s place in `from`'s successors and `from`'s place in `to`'s
    /// predecessors, so positional data keyed by predecessor order (phi sources) stays
    /// aligned. When `to` is the fall-through of `from` the block is laid out in between;
    /// otherwise it is appended with an explicit jump and `from`'s branch is retargeted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if the edge does not exist or `to` is the exit.
    pub fn split_edge(&mut self, from: BlockId, to: BlockId) -> Result<BlockId> {
        if !self.successors(from).contains(&to) {
            return Err(GraphError(format!("no edge {from} -> {to} to split")));
        }
        if to == self.exit {
            return Err(GraphError(format!("cannot split edge {from} -> exit")));
        }

        let branches_to_target = self
            .block(from)
            .and_then(Block::terminator)
            .and_then(Instruction::branch_target)
            .is_some_and(|target| *target == BranchTarget::Block(to));

        let middle = if from == self.entry {
            self.insert_block(0)
        } else if branches_to_target {
            let middle = self.add_block();
            if let Some(block) = self.block_mut(middle) {
                block.instructions.push(Instruction::synthetic(InstructionKind::Jump {
                    target: BranchTarget::Block(to),
                }));
            }
            self.retarget_branch(from, to, middle);
            middle
        } else {
            let position = self.layout_position(from).map_or(self.layout.len(), |p| p + 1);
            self.insert_block(position)
        };

        if let Some(block) = self.block_mut(from) {
            for successor in &mut block.successors {
                if *successor == to {
                    *successor = middle;
                }
            }
        }
        if let Some(block) = self.block_mut(to) {
            for predecessor in &mut block.predecessors {
                if *predecessor == from {
                    *predecessor = middle;
                }
            }
        }
        if let Some(block) = self.block_mut(middle) {
            block.predecessors.push(from);
            block.successors.push(to);
        }

        trace!("split edge {from} -> {to} with {middle}");
        Ok(middle)
    }

    /// Retargets `block`'s branch from `old` to `new`.
    pub(crate) fn retarget_branch(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        if let Some(target) = self
            .block_mut(block)
            .and_then(|b| b.instructions.last_mut())
            .and_then(Instruction::branch_target_mut)
        {
            if *target == BranchTarget::Block(old) {
                *target = BranchTarget::Block(new);
            }
        }
    }

    /// The successor reached when a block's branch is not taken.
    ///
    /// `None` for blocks ending in an unconditional transfer.
    #[must_use]
    pub fn fall_through(&self, id: BlockId) -> Option<BlockId> {
        let block = self.block(id)?;
        match block.terminator().map(|instruction| &instruction.kind) {
            Some(InstructionKind::Jump { .. } | InstructionKind::Return { .. } | InstructionKind::ReturnVoid) => None,
            Some(InstructionKind::ConditionalJump { target, .. }) => {
                let taken = target.block();
                block
                    .successors
                    .iter()
                    .copied()
                    .find(|successor| Some(*successor) != taken)
                    .or(taken)
            }
            _ => block.successors.first().copied(),
        }
    }

    /// Blocks reachable from the entry, breadth first.
    #[must_use]
    pub fn reachable(&self) -> BlockSet {
        let mut seen = BlockSet::new(self.capacity());
        let mut queue = VecDeque::from([self.entry]);
        seen.insert(self.entry);

        while let Some(id) = queue.pop_front() {
            for successor in self.successors(id) {
                if seen.insert(*successor) {
                    queue.push_back(*successor);
                }
            }
        }
        seen
    }

    /// Coalesces call-terminated blocks with their successor.
    ///
    /// A block ending in a call is merged with its single successor when that successor is
    /// a body block whose only predecessor is the call block.
    ///
    /// # Returns
    ///
    /// The number of merges performed.
    pub fn merge_call_blocks(&mut self) -> usize {
        let mut merged = 0;
        let mut position = 0;

        while position < self.layout.len() {
            let id = self.layout[position];
            match self.mergeable_call_successor(id) {
                Some(next) => {
                    self.merge_blocks(id, next);
                    merged += 1;
                }
                None => position += 1,
            }
        }

        merged
    }

    fn mergeable_call_successor(&self, id: BlockId) -> Option<BlockId> {
        let block = self.block(id)?;
        if !block.ends_in_call() || block.successors.len() != 1 {
            return None;
        }

        let next = block.successors[0];
        let next_block = self.block(next)?;
        (next != id && !next_block.is_sentinel() && next_block.predecessors == [id]).then_some(next)
    }

    fn merge_blocks(&mut self, id: BlockId, next: BlockId) {
        let Some(next_block) = self.blocks.get_mut(next.index()).and_then(Option::take) else {
            return;
        };
        self.layout.retain(|b| *b != next);

        for successor in &next_block.successors {
            if let Some(block) = self.block_mut(*successor) {
                if block.predecessors.contains(&id) {
                    block.predecessors.retain(|b| *b != next);
                } else {
                    for predecessor in &mut block.predecessors {
                        if *predecessor == next {
                            *predecessor = id;
                        }
                    }
                }
            }
        }

        if let Some(block) = self.block_mut(id) {
            block.instructions.extend(next_block.instructions);
            block.successors = next_block.successors;
        }
        trace!("merged {next} into call block {id}");
    }

    /// Strips every `Nop`. Returns the number removed.
    pub fn remove_nops(&mut self) -> usize {
        let mut removed = 0;
        for block in self.blocks.iter_mut().flatten() {
            let before = block.instructions.len();
            block.instructions.retain(|instruction| !instruction.is_nop());
            removed += before - block.instructions.len();
        }
        removed
    }

    /// Splices empty body blocks out of the graph.
    ///
    /// Each predecessor is connected to each successor, branches that targeted the removed
    /// block are retargeted to its successor and duplicate edges are merged. Edge lists are
    /// edited in place so predecessor order is kept where possible. Blocks leading into a
    /// block that starts with a phi are kept, since the phi's sources are paired with
    /// predecessors by position.
    ///
    /// # Returns
    ///
    /// The number of blocks removed.
    pub fn remove_empty_blocks(&mut self) -> usize {
        let candidates: Vec<BlockId> = self
            .layout
            .iter()
            .copied()
            .filter(|id| self.block(*id).is_some_and(Block::is_empty))
            .collect();

        let mut removed = 0;
        for id in candidates {
            let Some(block) = self.block(id) else {
                continue;
            };
            let predecessors = block.predecessors.clone();
            let successors = block.successors.clone();

            if successors.contains(&id) || successors.iter().any(|s| self.starts_with_phi(*s)) {
                continue;
            }

            for predecessor in &predecessors {
                if let Some(block) = self.block_mut(*predecessor) {
                    splice(&mut block.successors, id, &successors);
                }
                if let [single] = successors.as_slice() {
                    self.retarget_branch(*predecessor, id, *single);
                }
            }
            for successor in &successors {
                if let Some(block) = self.block_mut(*successor) {
                    splice(&mut block.predecessors, id, &predecessors);
                }
            }

            self.blocks[id.index()] = None;
            self.layout.retain(|b| *b != id);
            removed += 1;
            trace!("removed empty block {id}");
        }

        removed
    }

    fn starts_with_phi(&self, id: BlockId) -> bool {
        self.block(id)
            .and_then(|block| block.instructions.first())
            .is_some_and(|instruction| instruction.opcode() == OpCode::Phi)
    }

    /// Drops trailing jumps whose target block no longer exists.
    ///
    /// # Returns
    ///
    /// The number of jumps dropped.
    pub fn fix_branches(&mut self) -> usize {
        let stale: Vec<BlockId> = self
            .blocks()
            .filter(|block| {
                block
                    .terminator()
                    .and_then(Instruction::branch_target)
                    .and_then(BranchTarget::block)
                    .is_some_and(|target| !self.contains(target))
            })
            .map(Block::id)
            .collect();

        for id in &stale {
            if let Some(block) = self.block_mut(*id) {
                block.instructions.pop();
                trace!("dropped stale branch at the end of {id}");
            }
        }
        stale.len()
    }

    fn next_dirty_block(&self) -> Option<BlockId> {
        self.layout
            .iter()
            .copied()
            .find(|id| self.block(*id).is_some_and(Block::is_dirty))
    }

    fn set_dirty(&mut self, id: BlockId, dirty: bool) {
        if let Some(block) = self.block_mut(id) {
            block.dirty = dirty;
        }
    }

    fn resolve_dirty_blocks(&mut self) {
        while let Some(id) = self.next_dirty_block() {
            let target = self
                .block(id)
                .and_then(Block::terminator)
                .and_then(Instruction::branch_target)
                .copied();

            let Some(BranchTarget::Instruction(target_index)) = target else {
                self.set_dirty(id, false);
                continue;
            };

            match self.locate_instruction(target_index) {
                Some((target_block, 0)) => {
                    self.add_edge(id, target_block);
                    self.set_dirty(id, false);
                }
                Some((target_block, position)) => {
                    // The target is now the head of the tail; the next round adds the edge.
                    if self.split_block(target_block, position).is_err() {
                        self.set_dirty(id, false);
                    }
                }
                None => {
                    warn!("branch in {id} targets missing instruction {target_index}");
                    self.add_edge(id, self.exit);
                    self.set_dirty(id, false);
                }
            }
        }
    }

    fn resolve_branch_targets(&mut self) {
        let heads: Vec<(usize, BlockId)> = self
            .blocks()
            .filter_map(|block| {
                block
                    .instructions
                    .first()
                    .and_then(|instruction| instruction.index)
                    .map(|index| (index, block.id))
            })
            .collect();

        for instruction in self.instructions_mut() {
            if let Some(target) = instruction.branch_target_mut() {
                if let BranchTarget::Instruction(index) = *target {
                    if let Some((_, block)) = heads.iter().find(|(head, _)| *head == index) {
                        *target = BranchTarget::Block(*block);
                    }
                }
            }
        }
    }
}

/// Replaces `old` in `list` with the ids of `new` that are not already present, at `old`'s
/// position.
fn splice(list: &mut Vec<BlockId>, old: BlockId, new: &[BlockId]) {
    let Some(position) = list.iter().position(|id| *id == old) else {
        return;
    };
    list.remove(position);

    let mut insert_at = position;
    for id in new {
        if !list.contains(id) {
            list.insert(insert_at, *id);
            insert_at += 1;
        }
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.blocks() {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionKind, Register};

    fn r(n: u32) -> Register {
        Register::new(n)
    }

    fn body_containing(graph: &ControlFlowGraph, index: usize) -> BlockId {
        graph
            .locate_instruction(index)
            .map(|(block, _)| block)
            .expect("instruction should be in the graph")
    }

    #[test]
    fn test_build_empty() {
        let graph = ControlFlowGraph::build(Vec::new());
        assert_eq!(graph.block_count(), 2);
        assert_eq!(graph.successors(graph.entry()), &[graph.exit()]);
    }

    #[test]
    fn test_build_straight_line() {
        let graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, r(0), 1),
            Instruction::mov(1, r(1), r(0)),
            Instruction::ret(2, r(1)),
        ]);

        assert_eq!(graph.layout().len(), 1);
        let body = graph.layout()[0];
        assert_eq!(graph.successors(graph.entry()), &[body]);
        assert_eq!(graph.successors(body), &[graph.exit()]);
        assert_eq!(graph.instruction_count(), 3);
    }

    #[test]
    fn test_build_conditional_branch_has_distinct_fallthrough() {
        // 0: r0 = 5
        // 1: if r0 goto 3
        // 2: goto 3
        // 3: return
        let graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, r(0), 5),
            Instruction::branch_if(1, 3, r(0)),
            Instruction::jump(2, 3),
            Instruction::ret_void(3),
        ]);

        let head = body_containing(&graph, 0);
        let fall = body_containing(&graph, 2);
        let target = body_containing(&graph, 3);

        assert_eq!(graph.layout(), &[head, fall, target]);
        assert_eq!(graph.successors(head), &[fall, target]);
        assert_ne!(fall, target);
        assert_eq!(graph.fall_through(head), Some(fall));
        assert_eq!(graph.successors(fall), &[target]);
        assert_eq!(graph.successors(target), &[graph.exit()]);

        let branch = graph.block(head).and_then(Block::terminator).and_then(Instruction::branch_target);
        assert_eq!(branch, Some(&BranchTarget::Block(target)));
    }

    #[test]
    fn test_build_splits_at_branch_target() {
        // 0: r0 = 0
        // 1: r0 = r0 + 1     <- loop head
        // 2: if r0 goto 1
        // 3: return r0
        let graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, r(0), 0),
            Instruction::binary(1, crate::ir::BinaryOp::Add, r(0), r(0), 1),
            Instruction::branch_if(2, 1, r(0)),
            Instruction::ret(3, r(0)),
        ]);

        let head = body_containing(&graph, 0);
        let loop_head = body_containing(&graph, 1);
        let exit_block = body_containing(&graph, 3);

        assert_ne!(head, loop_head);
        assert_eq!(graph.locate_instruction(1), Some((loop_head, 0)));
        assert_eq!(graph.layout(), &[head, loop_head, exit_block]);
        assert_eq!(graph.successors(head), &[loop_head]);
        assert_eq!(graph.successors(loop_head), &[exit_block, loop_head]);
        assert_eq!(graph.predecessors(loop_head), &[head, loop_head]);
    }

    #[test]
    fn test_branch_targets_are_block_heads() {
        let graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, r(0), 1),
            Instruction::mov(1, r(1), 2),
            Instruction::mov(2, r(2), 3),
            Instruction::branch_if(3, 1, r(0)),
            Instruction::branch_if(4, 2, r(1)),
            Instruction::ret_void(5),
        ]);

        for instruction in graph.instructions() {
            if let Some(target) = instruction.branch_target() {
                let block = target.block().expect("targets are resolved to blocks");
                assert!(graph.contains(block));
            }
        }
        assert_eq!(graph.locate_instruction(1).map(|(_, p)| p), Some(0));
        assert_eq!(graph.locate_instruction(2).map(|(_, p)| p), Some(0));

        for block in graph.blocks() {
            assert!(!block.successors().is_empty(), "{} has no successor", block.id());
        }
    }

    #[test]
    fn test_jump_to_missing_instruction_goes_to_exit() {
        let graph = ControlFlowGraph::build(vec![Instruction::jump(0, 42)]);
        let body = graph.layout()[0];
        assert_eq!(graph.successors(body), &[graph.exit()]);
    }

    #[test]
    fn test_remove_empty_blocks_retargets_branches() {
        // 0: if r0 goto 2
        // 1: return
        // 2: goto 3 (emptied below)
        // 3: return
        let mut graph = ControlFlowGraph::build(vec![
            Instruction::branch_if(0, 2, r(0)),
            Instruction::ret_void(1),
            Instruction::jump(2, 3),
            Instruction::ret_void(3),
        ]);
        let head = body_containing(&graph, 0);
        let empty = body_containing(&graph, 2);
        let last = body_containing(&graph, 3);

        if let Some(block) = graph.block_mut(empty) {
            block.instructions.clear();
        }
        assert_eq!(graph.remove_empty_blocks(), 1);

        assert!(!graph.contains(empty));
        assert!(graph.successors(head).contains(&last));
        assert!(graph.predecessors(last).contains(&head));
        let branch = graph.block(head).and_then(Block::terminator).and_then(Instruction::branch_target);
        assert_eq!(branch, Some(&BranchTarget::Block(last)));
        assert_eq!(graph.fix_branches(), 0);
    }

    #[test]
    fn test_fix_branches_drops_stale_jump() {
        let mut graph = ControlFlowGraph::build(vec![Instruction::jump(0, 1), Instruction::ret_void(1)]);
        let head = body_containing(&graph, 0);
        let target = body_containing(&graph, 1);

        graph.remove_block(target).expect("body block can be removed");
        assert_eq!(graph.fix_branches(), 1);
        assert!(graph.block(head).is_some_and(Block::is_empty));
    }

    #[test]
    fn test_merge_call_blocks() {
        let ty = crate::metadata::TypeDefinition::new(crate::metadata::Token::new(0x02000001), "", "T");
        let callee =
            crate::metadata::MethodDefinition::builder(crate::metadata::Token::new(0x06000001), "F", &ty).build();
        let mut graph = ControlFlowGraph::build(vec![
            Instruction::new(0, InstructionKind::CallVoid { target: callee.clone(), args: vec![] }),
            Instruction::new(1, InstructionKind::CallVoid { target: callee, args: vec![] }),
            Instruction::mov(2, r(0), 1),
            Instruction::ret_void(3),
        ]);
        assert_eq!(graph.layout().len(), 3);

        assert_eq!(graph.merge_call_blocks(), 2);
        assert_eq!(graph.layout().len(), 1);
        let body = graph.layout()[0];
        assert_eq!(graph.block(body).map(|b| b.instructions().len()), Some(4));
        assert_eq!(graph.successors(body), &[graph.exit()]);
        assert_eq!(graph.predecessors(graph.exit()), &[body]);
    }

    #[test]
    fn test_split_edge_keeps_predecessor_position() {
        // 0: if r0 goto 2
        // 1: r1 = 1
        // 2: return
        let mut graph = ControlFlowGraph::build(vec![
            Instruction::branch_if(0, 2, r(0)),
            Instruction::mov(1, r(1), 1),
            Instruction::ret_void(2),
        ]);
        let head = body_containing(&graph, 0);
        let middle = body_containing(&graph, 1);
        let join = body_containing(&graph, 2);
        assert_eq!(graph.predecessors(join), &[middle, head]);

        let taken = graph.split_edge(head, join).expect("edge exists");
        assert_eq!(graph.predecessors(join), &[middle, taken]);
        assert_eq!(graph.successors(head), &[middle, taken]);
        let branch = graph.block(head).and_then(Block::terminator).and_then(Instruction::branch_target);
        assert_eq!(branch, Some(&BranchTarget::Block(taken)));
        assert_eq!(
            graph.block(taken).and_then(Block::terminator).map(Instruction::opcode),
            Some(OpCode::Jump)
        );

        let fall = graph.split_edge(head, middle).expect("edge exists");
        assert_eq!(graph.layout()[1], fall);
        assert_eq!(graph.fall_through(head), Some(fall));
    }
}
