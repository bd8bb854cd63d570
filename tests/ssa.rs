//! Graph, dominance and SSA integration tests.
//!
//! These tests drive the analysis layer and the SSA passes through the public API:
//! 1. Build a method from a lifted instruction list
//! 2. Check the control flow graph and dominance properties
//! 3. Construct SSA form and check phi placement
//! 4. Destroy SSA form and check that every use still reads the right definition

use dotlift::{
    analysis::{BlockId, ControlFlowGraph, Dominance},
    ir::{BranchTarget, Instruction, InstructionKind, Operand, Register},
    metadata::{MethodDefinition, MethodFlags, NullContext, Token, TypeDefinition},
    transforms::{BuildSsaForm, RemoveSsaForm, Transform},
    Method, Result,
};

fn method(instructions: Vec<Instruction>) -> Method {
    let player = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "Game", "Player");
    let definition = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 1), "Run", &player)
        .flags(MethodFlags::STATIC)
        .build();
    Method::new(definition, instructions, Vec::new())
}

fn r(number: u32) -> Operand {
    Operand::Register(Register::new(number))
}

fn v(number: u32, version: i32) -> Operand {
    Operand::Register(Register::new(number).with_version(version))
}

fn block_of(graph: &ControlFlowGraph, index: usize) -> BlockId {
    graph
        .locate_instruction(index)
        .map(|(block, _)| block)
        .expect("instruction should be in the graph")
}

fn phis(method: &Method, block: BlockId) -> Vec<(Operand, Vec<Operand>)> {
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

/// ```text
/// 0: if r1 goto 3
/// 1: r0 = 1
/// 2: goto 4
/// 3: r0 = 2
/// 4: return r0
/// ```
fn diamond() -> Method {
    method(vec![
        Instruction::branch_if(0, 3, r(1)),
        Instruction::mov(1, r(0), 1),
        Instruction::jump(2, 4),
        Instruction::mov(3, r(0), 2),
        Instruction::ret(4, r(0)),
    ])
}

#[test]
fn test_conditional_jump_graph_shape() {
    let graph = ControlFlowGraph::build(vec![
        Instruction::mov(0, r(0), 5),
        Instruction::branch_if(1, 3, r(0)),
        Instruction::jump(2, 3),
        Instruction::ret_void(3),
    ]);

    let head = block_of(&graph, 0);
    let fall = block_of(&graph, 2);
    let target = block_of(&graph, 3);

    assert_eq!(graph.successors(graph.entry()), &[head]);
    assert_eq!(graph.fall_through(head), Some(fall));
    assert_ne!(fall, target);
    assert!(graph.successors(head).contains(&target));
    assert_eq!(graph.successors(target), &[graph.exit()]);

    for block in graph.blocks() {
        if block.id() != graph.exit() {
            assert!(!block.successors().is_empty(), "{} has no successor", block.id());
        }
    }
    for instruction in graph.instructions() {
        if let Some(BranchTarget::Block(block)) = instruction.branch_target() {
            let head = graph.block(*block).and_then(|b| b.instructions().first());
            assert_eq!(head.and_then(|i| i.index), Some(3));
        }
    }
}

#[test]
fn test_dominance_properties() {
    let method = diamond();
    let graph = method.graph();
    let dominance = Dominance::compute(graph);
    let ids = graph.block_ids();

    for a in &ids {
        assert!(dominance.dominates(graph.entry(), *a));
        for b in &ids {
            if dominance.dominates(*a, *b) && dominance.dominates(*b, *a) {
                assert_eq!(a, b);
            }
            for c in &ids {
                if dominance.dominates(*a, *b) && dominance.dominates(*b, *c) {
                    assert!(dominance.dominates(*a, *c));
                }
            }
        }
    }

    // The dominator tree reaches every block exactly once from the entry
    let mut order = dominance.preorder();
    assert_eq!(order.len(), ids.len());
    order.sort();
    order.dedup();
    assert_eq!(order.len(), ids.len());
}

#[test]
fn test_join_gets_one_phi_per_register() -> Result<()> {
    let mut method = diamond();
    let join = block_of(method.graph(), 4);

    BuildSsaForm::new().apply(&mut method, &NullContext)?;

    let phis = phis(&method, join);
    assert_eq!(phis.len(), 1);
    let (dest, sources) = &phis[0];
    assert_eq!(sources.len(), method.graph().predecessors(join).len());

    for (predecessor, source) in method.graph().predecessors(join).iter().zip(sources) {
        let defined = method
            .graph()
            .block(*predecessor)
            .and_then(|block| block.instructions().first())
            .and_then(Instruction::destination);
        assert_eq!(defined, Some(source));
    }
    assert_eq!(dest, &v(0, 3));
    Ok(())
}

#[test]
fn test_destroy_places_copies_on_incoming_edges() -> Result<()> {
    let mut method = diamond();
    let join = block_of(method.graph(), 4);

    BuildSsaForm::new().apply(&mut method, &NullContext)?;
    RemoveSsaForm::new().apply(&mut method, &NullContext)?;

    assert!(method
        .graph()
        .instructions()
        .all(|instruction| !matches!(instruction.kind, InstructionKind::Phi { .. })));

    let join = method
        .graph()
        .locate_instruction(4)
        .map_or(join, |(block, _)| block);
    let ret = method
        .graph()
        .block(join)
        .and_then(|block| block.terminator())
        .expect("return");
    assert_eq!(ret.sources(), vec![&v(0, 3)]);

    // Every path into the join writes the merged value from its own definition
    for predecessor in method.graph().predecessors(join) {
        let block = method.graph().block(*predecessor).expect("predecessor");
        let copy = block.instructions().iter().find_map(|instruction| match &instruction.kind {
            InstructionKind::Move { dest, src } if *dest == v(0, 3) => Some(src.clone()),
            _ => None,
        });
        let defined = block.instructions().first().and_then(Instruction::destination).cloned();
        assert_eq!(copy, defined);
    }
    Ok(())
}
