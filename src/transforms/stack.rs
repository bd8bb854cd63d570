//! Stack analysis.
//!
//! The front end models pushes and pops as `ShiftStack` instructions and refers to stack
//! slots as offsets from the stack pointer at that point. This pass computes the stack
//! pointer delta at every instruction, rebases each offset onto the method's entry stack
//! pointer and gives every distinct slot its own register, after which the stack model
//! is gone.
//!
//! # Algorithm
//!
//! 1. Propagate an incoming delta per block from the entry (delta 0). `ShiftStack` adds
//!    its amount, a tail call resets the delta to 0. A successor is revisited whenever the
//!    delta flowing into it differs from the one recorded.
//! 2. Warn if the exit is reached with a non-zero delta.
//! 3. Add each instruction's delta to its `StackOffset` operands and drop the shifts.
//! 4. Map every distinct offset to a fresh register above the highest one in use.
//!
//! # Example
//!
//! ```text
//! // Before
//! ShiftStack -8
//! Move stack[0x0], r1
//! Call r0, F, stack[0x0]
//! ShiftStack 8
//!
//! // After
//! Move stack_-8, r1
//! Call r0, F, stack_-8
//! ```

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::{
    analysis::BlockId,
    ir::{InstructionKind, Operand, Register},
    metadata::ResolutionContext,
    transforms::{cleanup, max_register_number, Transform},
    Error, Method, Result,
};

/// Replaces the implicit operand stack with registers.
pub struct StackAnalysis {
    /// How many times a block may be revisited with a changed delta, `None` for no limit
    pub max_block_visits: Option<usize>,
}

impl Default for StackAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl StackAnalysis {
    /// Creates the pass without a revisit ceiling.
    #[must_use]
    pub fn new() -> Self {
        StackAnalysis { max_block_visits: None }
    }

    /// Creates the pass with a revisit ceiling.
    #[must_use]
    pub fn with_limit(max_block_visits: Option<usize>) -> Self {
        StackAnalysis { max_block_visits }
    }
}

/// Deltas per instruction position, and the delta reaching the exit.
struct StackStates {
    instructions: HashMap<BlockId, Vec<i32>>,
    exit: Option<i32>,
}

impl StackAnalysis {
    fn traverse(&self, method: &Method) -> Result<StackStates> {
        let graph = method.graph();
        let mut incoming: HashMap<BlockId, i32> = HashMap::from([(graph.entry(), 0)]);
        let mut instructions: HashMap<BlockId, Vec<i32>> = HashMap::new();
        let mut queue = VecDeque::from([graph.entry()]);
        let mut revisits = 0usize;

        while let Some(id) = queue.pop_front() {
            let Some(block) = graph.block(id) else {
                continue;
            };
            let mut current = incoming.get(&id).copied().unwrap_or_default();

            let mut states = Vec::with_capacity(block.instructions().len());
            for instruction in block.instructions() {
                states.push(current);
                match instruction.kind {
                    InstructionKind::ShiftStack { delta } => current = current.saturating_add(delta),
                    _ if instruction.is_tail_call() => current = 0,
                    _ => {}
                }
            }
            instructions.insert(id, states);

            for successor in block.successors() {
                match incoming.get(successor) {
                    Some(existing) if *existing == current => {}
                    Some(_) => {
                        revisits += 1;
                        if let Some(limit) = self.max_block_visits {
                            if revisits > limit {
                                return Err(Error::StackNotSettling(limit));
                            }
                        }
                        incoming.insert(*successor, current);
                        queue.push_back(*successor);
                    }
                    None => {
                        incoming.insert(*successor, current);
                        queue.push_back(*successor);
                    }
                }
            }
        }

        Ok(StackStates {
            instructions,
            exit: incoming.get(&graph.exit()).copied(),
        })
    }
}

fn offset_name(offset: i32) -> String {
    if offset < 0 {
        format!("stack_-{:X}", offset.unsigned_abs())
    } else {
        format!("stack_{offset:X}")
    }
}

/// Rebases every `StackOffset` on the entry stack pointer and drops the shifts.
fn correct_offsets(method: &mut Method, states: &StackStates) {
    let ids: Vec<BlockId> = method.graph().layout().to_vec();
    for id in ids {
        let deltas = states.instructions.get(&id);
        let Some(block) = method.graph_mut().block_mut(id) else {
            continue;
        };

        for (position, instruction) in block.instructions_mut().iter_mut().enumerate() {
            if matches!(instruction.kind, InstructionKind::ShiftStack { .. }) {
                instruction.make_nop();
                continue;
            }

            let delta = deltas.and_then(|d| d.get(position)).copied().unwrap_or_default();
            for operand in instruction.operands_mut() {
                if let Operand::StackOffset(offset) = operand {
                    *offset = offset.saturating_add(delta);
                }
            }
        }
    }
}

/// Gives every distinct stack slot its own register.
fn replace_offsets(method: &mut Method) -> usize {
    let mut offsets: Vec<i32> = Vec::new();
    let code = method.graph().instructions().flat_map(|instruction| instruction.operands());
    for operand in code.chain(method.parameters().iter()) {
        if let Operand::StackOffset(offset) = operand {
            if !offsets.contains(offset) {
                offsets.push(*offset);
            }
        }
    }
    if offsets.is_empty() {
        return 0;
    }

    let first = max_register_number(method).unwrap_or(0) + 1;
    let registers: HashMap<i32, Register> = offsets
        .iter()
        .zip(first..)
        .map(|(offset, number)| (*offset, Register::named(number, offset_name(*offset))))
        .collect();

    let replace = |operand: &mut Operand| {
        if let Operand::StackOffset(offset) = operand {
            if let Some(register) = registers.get(offset) {
                *operand = Operand::Register(register.clone());
            }
        }
    };

    for instruction in method.graph_mut().instructions_mut() {
        instruction.operands_mut().into_iter().for_each(replace);
    }
    method.parameters_mut().iter_mut().for_each(replace);

    offsets.len()
}

impl Transform for StackAnalysis {
    fn name(&self) -> &'static str {
        "stack-analysis"
    }

    fn description(&self) -> &'static str {
        "Replaces stack-relative operands with registers"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let states = self.traverse(method)?;

        if let Some(delta) = states.exit.filter(|delta| *delta != 0) {
            method.add_warning(format!(
                "Method ends with non empty stack ({}), the output could be wrong!",
                if delta < 0 {
                    format!("-{:X}", delta.unsigned_abs())
                } else {
                    format!("{delta:X}")
                }
            ));
        }

        correct_offsets(method, &states);
        let slots = replace_offsets(method);

        let graph = method.graph_mut();
        graph.merge_call_blocks();
        cleanup(graph);
        method.rebuild_dominance();

        debug!("{}: {} stack slots turned into registers", method.full_name(), slots);
        Ok(())
    }
}
