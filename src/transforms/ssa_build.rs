//! SSA construction.
//!
//! Registers are put into static single assignment form in two steps:
//!
//! 1. **Phi placement.** For every register number, the blocks defining it are collected
//!    and a phi is placed in each block of their iterated dominance frontier. A phi gets
//!    one source per predecessor, in predecessor order.
//! 2. **Renaming.** A pre-order walk of the dominator tree gives every definition a fresh
//!    version and every use the version on top of that register's stack. Before leaving a
//!    block, the phi sources of its successors at this block's predecessor position are
//!    filled in. Leaving a block pops what it pushed.
//!
//! A use with no reaching definition reads the entry value: the parameter register if one
//! has that number (version 0), the unversioned register otherwise.
//!
//! Memory base and index registers are renamed like any other use.
//!
//! # Example
//!
//! ```text
//! // Before                 // After
//! B1: if r1 goto B3         B1: if r1 goto B3
//! B2: r0 = 1                B2: r0_1 = 1
//!     goto B4                   goto B4
//! B3: r0 = 2                B3: r0_2 = 2
//! B4: return r0             B4: r0_3 = phi(r0_2, r0_1)
//!                               return r0_3
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, trace};

use crate::{
    analysis::BlockId,
    ir::{Instruction, InstructionKind, Operand, Register},
    metadata::ResolutionContext,
    transforms::Transform,
    Method, Result,
};

/// Converts registers into SSA form.
pub struct BuildSsaForm;

impl Default for BuildSsaForm {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildSsaForm {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Blocks defining each register number, with the first register seen for the number.
fn definition_sites(method: &Method) -> BTreeMap<u32, (Register, Vec<BlockId>)> {
    let mut sites: BTreeMap<u32, (Register, Vec<BlockId>)> = BTreeMap::new();
    for block in method.graph().blocks() {
        for instruction in block.instructions() {
            if let Some(Operand::Register(register)) = instruction.destination() {
                let (_, blocks) = sites
                    .entry(register.number)
                    .or_insert_with(|| (register.with_version(Register::UNVERSIONED), Vec::new()));
                if !blocks.contains(&block.id()) {
                    blocks.push(block.id());
                }
            }
        }
    }
    sites
}

fn place_phis(method: &mut Method) -> usize {
    let sites = definition_sites(method);
    let (graph, dominance) = method.graph_and_dominance();
    let (entry, exit) = (graph.entry(), graph.exit());

    let mut placed = 0;
    for (register, blocks) in sites.values() {
        for join in dominance.iterated_frontier(blocks.iter().copied()) {
            if join == entry || join == exit {
                continue;
            }
            let arity = graph.predecessors(join).len();
            let Some(block) = graph.block_mut(join) else {
                continue;
            };

            let position = block
                .instructions
                .iter()
                .take_while(|instruction| matches!(instruction.kind, InstructionKind::Phi { .. }))
                .count();
            block.instructions.insert(
                position,
                Instruction::synthetic(InstructionKind::Phi {
                    dest: Operand::Register(register.clone()),
                    sources: vec![Operand::Register(register.clone()); arity],
                }),
            );
            placed += 1;
            trace!("phi for {register} placed in {join}");
        }
    }
    placed
}

/// Version stacks of the rename walk.
struct Renamer {
    counters: HashMap<u32, i32>,
    stacks: HashMap<u32, Vec<Register>>,
    parameters: HashSet<u32>,
}

impl Renamer {
    fn current(&self, register: &Register) -> Register {
        match self.stacks.get(&register.number).and_then(|stack| stack.last()) {
            Some(top) => top.clone(),
            None if self.parameters.contains(&register.number) => {
                register.with_version(Register::PARAMETER_VERSION)
            }
            None => register.with_version(Register::UNVERSIONED),
        }
    }

    fn define(&mut self, register: &Register) -> Register {
        let counter = self.counters.entry(register.number).or_insert(0);
        *counter += 1;
        let versioned = register.with_version(*counter);
        self.stacks
            .entry(register.number)
            .or_default()
            .push(versioned.clone());
        versioned
    }

    fn pop(&mut self, number: u32) {
        if let Some(stack) = self.stacks.get_mut(&number) {
            stack.pop();
        }
    }

    fn rename_uses(&self, operand: &mut Operand) {
        for register in operand.registers_mut() {
            *register = self.current(register);
        }
    }

    /// Renames one instruction, returning the register number it defined.
    fn rename(&mut self, instruction: &mut Instruction) -> Option<u32> {
        if !matches!(instruction.kind, InstructionKind::Phi { .. }) {
            for source in instruction.sources_mut() {
                self.rename_uses(source);
            }
        }

        match instruction.destination_mut()? {
            Operand::Register(register) => {
                *register = self.define(register);
                Some(register.number)
            }
            other => {
                self.rename_uses(other);
                None
            }
        }
    }
}

enum Frame {
    Enter(BlockId),
    Exit(Vec<u32>),
}

fn rename(method: &mut Method) {
    let parameters: HashSet<u32> = method
        .parameters()
        .iter()
        .filter_map(Operand::as_register)
        .map(|register| register.number)
        .collect();
    let mut renamer = Renamer {
        counters: HashMap::new(),
        stacks: HashMap::new(),
        parameters,
    };

    let (graph, dominance) = method.graph_and_dominance();
    let mut frames = vec![Frame::Enter(dominance.entry())];

    while let Some(frame) = frames.pop() {
        let id = match frame {
            Frame::Exit(pushed) => {
                for number in pushed {
                    renamer.pop(number);
                }
                continue;
            }
            Frame::Enter(id) => id,
        };

        let mut pushed = Vec::new();
        if let Some(block) = graph.block_mut(id) {
            for instruction in &mut block.instructions {
                pushed.extend(renamer.rename(instruction));
            }
        }

        let successors = graph.successors(id).to_vec();
        for successor in successors {
            let Some(position) = graph.predecessors(successor).iter().position(|p| *p == id) else {
                continue;
            };
            let Some(block) = graph.block_mut(successor) else {
                continue;
            };
            for instruction in &mut block.instructions {
                let InstructionKind::Phi { sources, .. } = &mut instruction.kind else {
                    break;
                };
                if let Some(Operand::Register(register)) = sources.get_mut(position) {
                    *register = renamer.current(register);
                }
            }
        }

        frames.push(Frame::Exit(pushed));
        frames.extend(dominance.children(id).iter().rev().map(|child| Frame::Enter(*child)));
    }
}

impl Transform for BuildSsaForm {
    fn name(&self) -> &'static str {
        "build-ssa-form"
    }

    fn description(&self) -> &'static str {
        "Places phis and gives every register definition its own version"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let phis = place_phis(method);
        rename(method);
        debug!("{}: SSA form built with {} phis", method.full_name(), phis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinaryOp, Instruction},
        metadata::NullContext,
        transforms::test_support::{method, r, static_method},
    };

    fn phis_of(method: &Method, block: BlockId) -> Vec<(Operand, Vec<Operand>)> {
        method
            .graph()
            .block(block)
            .map(|block| {
                block
                    .instructions()
                    .iter()
                    .filter_map(|instruction| match &instruction.kind {
                        InstructionKind::Phi { dest, sources } => Some((dest.clone(), sources.clone())),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn v(number: u32, version: i32) -> Operand {
        Operand::Register(Register::new(number).with_version(version))
    }

    #[test]
    fn test_diamond_gets_one_phi() -> Result<()> {
        // 0: if r1 goto 3
        // 1: r0 = 1
        // 2: goto 4
        // 3: r0 = 2
        // 4: return r0
        let mut method = method(vec![
            Instruction::branch_if(0, 3, r(1)),
            Instruction::mov(1, r(0), 1),
            Instruction::jump(2, 4),
            Instruction::mov(3, r(0), 2),
            Instruction::ret(4, r(0)),
        ]);
        let (then_block, _) = method.graph().locate_instruction(1).expect("present");
        let (else_block, _) = method.graph().locate_instruction(3).expect("present");
        let (join, _) = method.graph().locate_instruction(4).expect("present");

        BuildSsaForm::new().apply(&mut method, &NullContext)?;

        let phis = phis_of(&method, join);
        assert_eq!(phis.len(), 1);
        let (dest, sources) = &phis[0];

        let defined_in = |block: BlockId| {
            method.graph().block(block).and_then(|b| b.instructions()[0].destination().cloned())
        };
        let expected: Vec<Operand> = method
            .graph()
            .predecessors(join)
            .iter()
            .filter_map(|pred| defined_in(*pred))
            .collect();
        assert_eq!(sources, &expected);
        assert!(expected.contains(&v(0, 1)) && expected.contains(&v(0, 2)));
        assert_eq!(dest, &v(0, 3));

        let ret = method.graph().block(join).and_then(|b| b.terminator()).expect("return");
        assert_eq!(ret.sources(), vec![&v(0, 3)]);

        assert!(phis_of(&method, then_block).is_empty());
        assert!(phis_of(&method, else_block).is_empty());
        // The condition has no definition and is not a parameter
        assert!(method
            .graph()
            .instructions()
            .any(|i| i.sources() == vec![&Operand::Register(Register::new(1))]));
        Ok(())
    }

    #[test]
    fn test_loop_counter_phi_reads_back_edge() -> Result<()> {
        // 0: r0 = 0
        // 1: r0 = r0 + 1
        // 2: if r0 goto 1
        // 3: return r0
        let mut method = method(vec![
            Instruction::mov(0, r(0), 0),
            Instruction::binary(1, BinaryOp::Add, r(0), r(0), 1),
            Instruction::branch_if(2, 1, r(0)),
            Instruction::ret(3, r(0)),
        ]);
        let (header, _) = method.graph().locate_instruction(1).expect("present");

        BuildSsaForm::new().apply(&mut method, &NullContext)?;

        let phis = phis_of(&method, header);
        assert_eq!(phis.len(), 1);
        let (dest, sources) = &phis[0];
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&v(0, 1)));
        assert!(sources.contains(&v(0, 3)));
        assert_eq!(dest, &v(0, 2));

        let add = &method.graph().block(header).expect("header").instructions()[1];
        assert_eq!(add.sources(), vec![&v(0, 2)]);
        assert_eq!(add.destination(), Some(&v(0, 3)));
        Ok(())
    }

    #[test]
    fn test_parameter_reads_entry_version() -> Result<()> {
        let definition = static_method("Id");
        let mut method = Method::new(
            definition,
            vec![
                Instruction::mov(0, r(0), r(5)),
                Instruction::ret(1, r(0)),
            ],
            vec![r(5)],
        );

        BuildSsaForm::new().apply(&mut method, &NullContext)?;

        let first = method.graph().instructions().next().expect("move");
        assert_eq!(first.sources(), vec![&v(5, Register::PARAMETER_VERSION)]);
        assert_eq!(first.destination(), Some(&v(0, 1)));
        Ok(())
    }

    #[test]
    fn test_memory_parts_are_renamed() -> Result<()> {
        use crate::ir::MemoryAddress;

        let mut method = method(vec![
            Instruction::mov(0, r(1), 0x40),
            Instruction::mov(1, MemoryAddress::based(Register::new(1), 8), r(2)),
            Instruction::ret_void(2),
        ]);

        BuildSsaForm::new().apply(&mut method, &NullContext)?;

        let store = method.graph().instructions().nth(1).expect("store");
        assert_eq!(
            store.destination(),
            Some(&Operand::Memory(MemoryAddress::based(Register::new(1).with_version(1), 8)))
        );
        Ok(())
    }
}
