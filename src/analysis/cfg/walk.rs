//! Forward walks over the graph.
//!
//! Liveness queries and forward value replacement both start at a program point and follow
//! every path from there. A walk visits each `(block, start index)` pair at most once, so
//! it terminates on loops, and uses an explicit stack so deep graphs cannot overflow the
//! call stack.

use std::collections::HashSet;

use crate::{
    analysis::cfg::{BlockId, ControlFlowGraph},
    ir::Instruction,
};

/// How a value is read after a program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Not read on any path
    Unused,
    /// Read as an operand
    Direct,
    /// Read through a memory address or a field of it
    ThroughMemory,
}

impl Usage {
    /// Returns `true` unless [`Usage::Unused`].
    #[must_use]
    pub fn is_used(self) -> bool {
        self != Usage::Unused
    }
}

/// Whether a forward rewrite continues past the current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Keep going, including into successors
    Continue,
    /// Stop this path
    Stop,
}

impl ControlFlowGraph {
    /// Finds the first read on any path starting at `start` in `block`.
    ///
    /// `classify` reports how an instruction reads the value in question. The walk stops at
    /// the first instruction that reads it.
    pub fn find_usage_after<F>(&self, block: BlockId, start: usize, classify: F) -> Usage
    where
        F: Fn(&Instruction) -> Usage,
    {
        let mut visited = HashSet::new();
        let mut stack = vec![(block, start)];

        while let Some((id, index)) = stack.pop() {
            if !visited.insert((id, index)) {
                continue;
            }
            let Some(current) = self.block(id) else {
                continue;
            };

            for instruction in current.instructions().iter().skip(index) {
                let usage = classify(instruction);
                if usage.is_used() {
                    return usage;
                }
            }

            stack.extend(current.successors().iter().rev().map(|successor| (*successor, 0)));
        }

        Usage::Unused
    }

    /// Applies `rewrite` to every instruction on every path starting at `start` in `block`.
    ///
    /// A path ends when `rewrite` returns [`WalkControl::Stop`].
    pub fn rewrite_forward<F>(&mut self, block: BlockId, start: usize, mut rewrite: F)
    where
        F: FnMut(&mut Instruction) -> WalkControl,
    {
        let mut visited = HashSet::new();
        let mut stack = vec![(block, start)];

        while let Some((id, index)) = stack.pop() {
            if !visited.insert((id, index)) {
                continue;
            }
            let Some(current) = self.block_mut(id) else {
                continue;
            };

            let mut stopped = false;
            for instruction in current.instructions.iter_mut().skip(index) {
                if rewrite(instruction) == WalkControl::Stop {
                    stopped = true;
                    break;
                }
            }

            if !stopped {
                stack.extend(current.successors.iter().rev().map(|successor| (*successor, 0)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Operand, Register};

    fn reads(number: u32) -> impl Fn(&Instruction) -> Usage {
        move |instruction: &Instruction| {
            if instruction
                .sources()
                .iter()
                .any(|operand| operand.as_register().is_some_and(|r| r.number == number))
            {
                Usage::Direct
            } else {
                Usage::Unused
            }
        }
    }

    #[test]
    fn test_usage_follows_branches() {
        // 0: r0 = 1
        // 1: if r1 goto 3
        // 2: return
        // 3: return r0
        let graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, Register::new(0), 1),
            Instruction::branch_if(1, 3, Register::new(1)),
            Instruction::ret_void(2),
            Instruction::ret(3, Register::new(0)),
        ]);
        let (head, _) = graph.locate_instruction(0).expect("present");

        assert_eq!(graph.find_usage_after(head, 1, reads(0)), Usage::Direct);
        assert_eq!(graph.find_usage_after(head, 1, reads(5)), Usage::Unused);
    }

    #[test]
    fn test_usage_terminates_on_loops() {
        let graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, Register::new(0), 1),
            Instruction::jump(1, 0),
        ]);
        let (head, _) = graph.locate_instruction(0).expect("present");
        assert_eq!(graph.find_usage_after(head, 0, reads(0)), Usage::Unused);
    }

    #[test]
    fn test_rewrite_stops_on_request() {
        let mut graph = ControlFlowGraph::build(vec![
            Instruction::mov(0, Register::new(1), Register::new(0)),
            Instruction::mov(1, Register::new(0), 7),
            Instruction::mov(2, Register::new(2), Register::new(0)),
        ]);
        let (head, _) = graph.locate_instruction(0).expect("present");

        graph.rewrite_forward(head, 0, |instruction| {
            if instruction.destination().is_some_and(|d| d.as_register().is_some_and(|r| r.number == 0)) {
                return WalkControl::Stop;
            }
            for source in instruction.sources_mut() {
                if source.as_register().is_some_and(|r| r.number == 0) {
                    *source = Operand::Int(9);
                }
            }
            WalkControl::Continue
        });

        let sources: Vec<String> = graph.instructions().map(ToString::to_string).collect();
        assert_eq!(sources[0], "0000 Move r1, 9");
        assert_eq!(sources[2], "0002 Move r2, r0");
    }
}
