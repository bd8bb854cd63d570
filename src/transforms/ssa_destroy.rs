//! SSA destruction.
//!
//! Every phi is lowered to one move per incoming edge, placed at the end of the block that
//! edge leaves. The moves of one edge form a parallel copy: all sources are read before any
//! destination is written. They are ordered so that no move overwrites a value another move
//! still reads, and a cycle is broken with a temporary.
//!
//! An edge leaving a block with several successors (or leaving the entry) is split first,
//! so the moves only run on that edge.
//!
//! # Example
//!
//! ```text
//! // Before                        // After
//! B2: v1 = 1                       B2: v1 = 1
//!     goto B4                          v3 = v1
//! B3: v2 = 2                           goto B4
//! B4: v3 = phi(v2, v1)             B3: v2 = 2
//!     return v3                        v3 = v2
//!                                  B4: return v3
//! ```

use log::{debug, trace};

use crate::{
    analysis::BlockId,
    ir::{Instruction, InstructionKind, LocalVariable, Operand, Register},
    metadata::ResolutionContext,
    transforms::{cleanup, max_register_number, Transform},
    Method, Result,
};

/// Lowers phis to moves on incoming edges.
pub struct RemoveSsaForm;

impl Default for RemoveSsaForm {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoveSsaForm {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// `(dest, sources)` of the phis at the head of a block.
fn phis_of(method: &Method, block: BlockId) -> Vec<(Operand, Vec<Operand>)> {
    let Some(block) = method.graph().block(block) else {
        return Vec::new();
    };
    block
        .instructions()
        .iter()
        .filter_map(|instruction| match &instruction.kind {
            InstructionKind::Phi { dest, sources } => Some((dest.clone(), sources.clone())),
            _ => None,
        })
        .collect()
}

/// Creates a temporary able to hold the value of `like`.
fn temporary(method: &mut Method, like: &Operand) -> Operand {
    match like {
        Operand::Local(local) => {
            let register = method
                .local(*local)
                .map_or_else(|| Register::new(0), |local| local.register.clone());
            let name = format!("phiTmp{}", method.local_count());
            Operand::Local(method.add_local(LocalVariable::new(name, register)))
        }
        _ => {
            let number = max_register_number(method).map_or(0, |max| max + 1);
            Operand::Register(Register::named(number, "phi_tmp"))
        }
    }
}

/// Orders a parallel copy into moves that can run one after another.
fn sequentialize(method: &mut Method, mut pending: Vec<(Operand, Operand)>) -> Vec<Instruction> {
    pending.retain(|(dest, src)| dest != src);

    let mut moves = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready = (0..pending.len()).find(|&i| {
            let dest = &pending[i].0;
            pending
                .iter()
                .enumerate()
                .all(|(j, (_, src))| j == i || src != dest)
        });

        match ready {
            Some(i) => {
                let (dest, src) = pending.remove(i);
                moves.push(Instruction::synthetic(InstructionKind::Move { dest, src }));
            }
            None => {
                let blocked = pending[0].0.clone();
                let temp = temporary(method, &blocked);
                trace!("breaking copy cycle through {blocked} with {temp}");
                moves.push(Instruction::synthetic(InstructionKind::Move {
                    dest: temp.clone(),
                    src: blocked.clone(),
                }));
                for (_, src) in &mut pending {
                    if *src == blocked {
                        *src = temp.clone();
                    }
                }
            }
        }
    }
    moves
}

/// The block that runs only on the edge `from -> to`.
fn edge_host(method: &mut Method, from: BlockId, to: BlockId) -> Result<BlockId> {
    let graph = method.graph_mut();
    if from == graph.entry() || graph.successors(from).len() > 1 {
        graph.split_edge(from, to)
    } else {
        Ok(from)
    }
}

impl Transform for RemoveSsaForm {
    fn name(&self) -> &'static str {
        "remove-ssa-form"
    }

    fn description(&self) -> &'static str {
        "Replaces phis with moves on incoming edges"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let joins: Vec<BlockId> = method.graph().layout().to_vec();
        let mut lowered = 0;

        for join in joins {
            let phis = phis_of(method, join);
            if phis.is_empty() {
                continue;
            }

            let arity = method.graph().predecessors(join).len();
            for position in 0..arity {
                let Some(predecessor) = method.graph().predecessors(join).get(position).copied() else {
                    continue;
                };

                let copies: Vec<(Operand, Operand)> = phis
                    .iter()
                    .filter_map(|(dest, sources)| sources.get(position).map(|src| (dest.clone(), src.clone())))
                    .collect();
                let moves = sequentialize(method, copies);
                if moves.is_empty() {
                    continue;
                }

                let host = edge_host(method, predecessor, join)?;
                if let Some(block) = method.graph_mut().block_mut(host) {
                    let at = block.insertion_point();
                    block.instructions.splice(at..at, moves);
                }
            }

            if let Some(block) = method.graph_mut().block_mut(join) {
                for instruction in &mut block.instructions {
                    if matches!(instruction.kind, InstructionKind::Phi { .. }) {
                        instruction.make_nop();
                        lowered += 1;
                    }
                }
            }
        }

        cleanup(method.graph_mut());
        debug!("{}: lowered {} phis", method.full_name(), lowered);
        Ok(())
    }
}
