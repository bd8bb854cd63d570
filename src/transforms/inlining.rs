//! Move inlining.
//!
//! After SSA destruction most locals are short-lived copies. This pass folds them away in
//! two forms:
//!
//! - **Aliases.** `d = s` between two locals: every later read of `d` reads `s` instead,
//!   including memory bases and indices, and the move disappears.
//! - **Constants.** `d = 5`: every later direct read of `d` reads the literal. A local read
//!   through memory keeps its move, a literal cannot be an address part.
//!
//! Aliases run first, constants repeat until nothing changes, then aliases run once more
//! for the copies exposed by the constants.
//!
//! # Safety conditions
//!
//! A move is inlined only when `d` is defined exactly once, is neither a parameter nor a
//! field view, has no field views of its own and never has its address taken. For an
//! alias, `s` must be defined at most once and must not be a field view. Substitution
//! follows every path from the move and stops where `d` or `s` is written. The move is
//! dropped only if no read of `d` is left.
//!
//! # Example
//!
//! ```text
//! // Before                     // After
//! v1 = v0                       Call Log, v0, 3
//! v2 = 3
//! Call Log, v1, v2
//! ```

use std::collections::HashSet;

use log::{debug, trace};

use crate::{
    analysis::{BlockId, Usage, WalkControl},
    ir::{AddressPart, InstructionKind, LocalId, Operand},
    metadata::ResolutionContext,
    transforms::{cleanup, Transform},
    Method, Result,
};

/// Inlines local aliases and single-definition constants.
pub struct Inlining;

impl Default for Inlining {
    fn default() -> Self {
        Self::new()
    }
}

impl Inlining {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A move considered for inlining.
struct Candidate {
    block: BlockId,
    position: usize,
    dest: LocalId,
    src: Operand,
}

/// Literals whose value does not depend on when they are read.
fn is_pure_constant(operand: &Operand) -> bool {
    matches!(
        operand,
        Operand::Int(_)
            | Operand::Long(_)
            | Operand::ULong(_)
            | Operand::Text(_)
            | Operand::Type(_)
            | Operand::Method(_)
    )
}

fn address_taken(method: &Method, id: LocalId) -> bool {
    method.graph().instructions().any(|instruction| {
        matches!(&instruction.kind, InstructionKind::LoadAddress { src, .. } if src.as_local() == Some(id))
    })
}

/// Conditions on the destination shared by both forms.
fn is_inlinable_destination(method: &Method, id: LocalId) -> bool {
    let Some(local) = method.local(id) else {
        return false;
    };
    !local.is_parameter()
        && !local.is_field_view()
        && !method.locals().any(|(_, other)| other.base == Some(id))
        && method.definition_count(id) == 1
        && !address_taken(method, id)
}

fn is_alias_source(method: &Method, dest: LocalId, src: LocalId) -> bool {
    src != dest
        && method.local(src).is_some_and(|local| !local.is_field_view())
        && method.definition_count(src) <= 1
}

fn find_candidate(
    method: &Method,
    attempted: &HashSet<(BlockId, usize)>,
    accept: impl Fn(&Method, &Candidate) -> bool,
) -> Option<Candidate> {
    for block in method.graph().blocks() {
        for (position, instruction) in block.instructions().iter().enumerate() {
            if attempted.contains(&(block.id(), position)) {
                continue;
            }
            let InstructionKind::Move { dest, src } = &instruction.kind else {
                continue;
            };
            let Some(dest) = dest.as_local() else {
                continue;
            };

            let candidate = Candidate {
                block: block.id(),
                position,
                dest,
                src: src.clone(),
            };
            if accept(method, &candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

/// Replaces reads of the candidate's destination on every path from the move.
fn substitute(method: &mut Method, candidate: &Candidate) {
    let dest = Operand::Local(candidate.dest);
    let alias = candidate.src.as_local();
    let replacement = candidate.src.clone();

    method
        .graph_mut()
        .rewrite_forward(candidate.block, candidate.position + 1, |instruction| {
            for source in instruction.sources_mut() {
                if *source == dest {
                    *source = replacement.clone();
                }
            }
            if let Some(alias) = alias {
                for operand in instruction.operands_mut() {
                    if let Operand::Memory(memory) = operand {
                        for part in memory.parts_mut() {
                            if *part == AddressPart::Local(candidate.dest) {
                                *part = AddressPart::Local(alias);
                            }
                        }
                    }
                }
            }

            let written = instruction.destination_slot().and_then(Operand::as_local);
            if written.is_some_and(|id| id == candidate.dest || Some(id) == alias) {
                WalkControl::Stop
            } else {
                WalkControl::Continue
            }
        });
}

/// Drops the move if nothing reads its destination any more.
fn finish(method: &mut Method, candidate: &Candidate) -> bool {
    let references = method
        .graph()
        .instructions()
        .filter(|instruction| {
            instruction
                .operands()
                .iter()
                .any(|operand| operand.references_local(candidate.dest))
        })
        .count();
    if references > 1 {
        return false;
    }

    if let Some(instruction) = method
        .graph_mut()
        .block_mut(candidate.block)
        .and_then(|block| block.instructions_mut().get_mut(candidate.position))
    {
        instruction.make_nop();
    }
    method.try_remove_local(candidate.dest);
    trace!("inlined {} = {}", candidate.dest, candidate.src);
    true
}

fn inline_all(method: &mut Method, accept: impl Fn(&Method, &Candidate) -> bool) -> usize {
    let mut attempted = HashSet::new();
    let mut inlined = 0;

    while let Some(candidate) = find_candidate(method, &attempted, &accept) {
        attempted.insert((candidate.block, candidate.position));
        substitute(method, &candidate);
        if finish(method, &candidate) {
            inlined += 1;
        }
    }
    inlined
}

fn inline_aliases(method: &mut Method) -> usize {
    inline_all(method, |method, candidate| {
        candidate
            .src
            .as_local()
            .is_some_and(|src| is_alias_source(method, candidate.dest, src))
            && is_inlinable_destination(method, candidate.dest)
    })
}

fn inline_constants(method: &mut Method) -> usize {
    inline_all(method, |method, candidate| {
        is_pure_constant(&candidate.src)
            && is_inlinable_destination(method, candidate.dest)
            && method.local_usage_after(candidate.block, candidate.position + 1, candidate.dest) == Usage::Direct
    })
}

impl Transform for Inlining {
    fn name(&self) -> &'static str {
        "inlining"
    }

    fn description(&self) -> &'static str {
        "Inlines local aliases and constants into their uses"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let mut aliases = inline_aliases(method);

        let mut constants = 0;
        loop {
            let inlined = inline_constants(method);
            if inlined == 0 {
                break;
            }
            constants += inlined;
        }

        aliases += inline_aliases(method);
        method.remove_unreferenced_locals();
        cleanup(method.graph_mut());

        debug!(
            "{}: inlined {} aliases and {} constants",
            method.full_name(),
            aliases,
            constants
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Instruction, LocalVariable, MemoryAddress, Register},
        metadata::NullContext,
        transforms::test_support::{listing, method, static_method},
    };

    fn l(index: usize) -> Operand {
        Operand::Local(LocalId::new(index))
    }

    fn with_locals(instructions: Vec<Instruction>, count: usize) -> Method {
        let mut method = method(instructions);
        for i in 0..count {
            method.add_local(LocalVariable::new(format!("v{i}"), Register::new(i as u32)));
        }
        method
    }

    fn log_call(index: usize, args: Vec<Operand>) -> Instruction {
        Instruction::new(
            index,
            InstructionKind::CallVoid {
                target: static_method("Log"),
                args,
            },
        )
    }

    #[test]
    fn test_alias_and_constant_fold_into_call() -> Result<()> {
        let mut method = with_locals(
            vec![
                Instruction::mov(0, l(1), l(0)),
                Instruction::mov(1, l(2), 3),
                log_call(2, vec![l(1), l(2)]),
                Instruction::ret_void(3),
            ],
            3,
        );
        if let Some(local) = method.local_mut(LocalId::new(0)) {
            local.parameter = Some(0);
        }

        Inlining::new().apply(&mut method, &NullContext)?;

        assert_eq!(listing(&method), vec!["CallVoid Game.Player.Log, L0, 3", "ReturnVoid"]);
        assert_eq!(method.local_count(), 1);
        Ok(())
    }

    #[test]
    fn test_constant_used_through_memory_is_kept() -> Result<()> {
        let base = MemoryAddress {
            base: Some(AddressPart::Local(LocalId::new(0))),
            index: None,
            addend: 8,
            scale: 0,
        };
        let mut method = with_locals(
            vec![
                Instruction::mov(0, l(0), 0x1000),
                Instruction::mov(1, l(1), base),
                Instruction::ret(2, l(1)),
            ],
            2,
        );

        Inlining::new().apply(&mut method, &NullContext)?;

        assert_eq!(listing(&method), vec!["Move L0, 4096", "Move L1, [L0+0x8]", "Return L1"]);
        Ok(())
    }

    #[test]
    fn test_alias_rewrites_memory_parts() -> Result<()> {
        let through = |local| MemoryAddress {
            base: Some(AddressPart::Local(LocalId::new(local))),
            index: None,
            addend: 0x10,
            scale: 0,
        };
        let mut method = with_locals(
            vec![
                Instruction::mov(0, l(1), l(0)),
                Instruction::mov(1, through(1), 7),
                Instruction::ret_void(2),
            ],
            2,
        );

        Inlining::new().apply(&mut method, &NullContext)?;

        assert_eq!(listing(&method), vec!["Move [L0+0x10], 7", "ReturnVoid"]);
        Ok(())
    }

    #[test]
    fn test_multiply_defined_destination_is_not_inlined() -> Result<()> {
        // v1 = 1; if v2 goto 3; v1 = 2; return v1
        let mut method = with_locals(
            vec![
                Instruction::mov(0, l(1), 1),
                Instruction::branch_if(1, 3, l(2)),
                Instruction::mov(2, l(1), 2),
                Instruction::ret(3, l(1)),
            ],
            3,
        );

        Inlining::new().apply(&mut method, &NullContext)?;
        assert_eq!(method.instruction_count(), 4);
        Ok(())
    }

    #[test]
    fn test_second_run_changes_nothing() -> Result<()> {
        let mut method = with_locals(
            vec![
                Instruction::mov(0, l(1), l(0)),
                Instruction::mov(1, l(2), 3),
                Instruction::mov(2, l(3), l(2)),
                log_call(3, vec![l(1), l(3)]),
                Instruction::mov(4, l(4), 0x40),
                Instruction::mov(5, MemoryAddress { base: Some(AddressPart::Local(LocalId::new(4))), ..Default::default() }, l(1)),
                Instruction::ret_void(6),
            ],
            5,
        );

        Inlining::new().apply(&mut method, &NullContext)?;
        let once = listing(&method);
        Inlining::new().apply(&mut method, &NullContext)?;
        assert_eq!(listing(&method), once);
        Ok(())
    }
}
