//! Benchmarks for the decompiler pipeline.
//!
//! Measures the cost of lifting synthetic methods end to end:
//! - Straight-line code with stack traffic
//! - A chain of diamonds that forces phi insertion and destruction
//! - Graph construction and dominance alone

extern crate dotlift;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dotlift::{
    analysis::{ControlFlowGraph, Dominance},
    ir::{BinaryOp, Instruction, InstructionKind, Operand, Register},
    metadata::{MethodDefinition, MethodFlags, MethodRc, NullContext, Token, TypeDefinition},
    Decompiler, DecompilerConfig, Method,
};
use std::hint::black_box;

fn definition() -> MethodRc {
    let player = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "Game", "Player");
    MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 1), "Tick", &player)
        .flags(MethodFlags::STATIC)
        .returns(&player)
        .build()
}

fn r(number: u32) -> Operand {
    Operand::Register(Register::new(number))
}

/// Pushes, arithmetic and a call per group of instructions.
fn straight_line(groups: usize) -> Vec<Instruction> {
    let callee = definition();
    let mut instructions = Vec::with_capacity(groups * 5 + 1);
    for group in 0..groups {
        let base = instructions.len();
        let value = i32::try_from(group).unwrap_or(i32::MAX);
        instructions.push(Instruction::shift_stack(base, -8));
        instructions.push(Instruction::mov(base + 1, Operand::StackOffset(0), value));
        instructions.push(Instruction::binary(base + 2, BinaryOp::Add, r(0), r(0), Operand::StackOffset(0)));
        instructions.push(Instruction::new(
            base + 3,
            InstructionKind::CallVoid {
                target: callee.clone(),
                args: vec![r(0)],
            },
        ));
        instructions.push(Instruction::shift_stack(base + 4, 8));
    }
    instructions.push(Instruction::ret(instructions.len(), r(0)));
    instructions
}

/// `diamonds` consecutive if/else blocks all writing `r0`.
fn diamonds(diamonds: usize) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(diamonds * 4 + 1);
    for _ in 0..diamonds {
        let base = instructions.len();
        instructions.push(Instruction::branch_if(base, base + 3, r(1)));
        instructions.push(Instruction::mov(base + 1, r(0), 1));
        instructions.push(Instruction::jump(base + 2, base + 4));
        instructions.push(Instruction::binary(base + 3, BinaryOp::Add, r(0), r(0), 2));
    }
    instructions.push(Instruction::ret(instructions.len(), r(0)));
    instructions
}

fn bench_straight_line(c: &mut Criterion) {
    let decompiler = Decompiler::new(DecompilerConfig::unlimited());
    let mut group = c.benchmark_group("pipeline_straight_line");

    for groups in [10, 100, 500] {
        let instructions = straight_line(groups);
        group.bench_with_input(BenchmarkId::from_parameter(groups), &instructions, |b, instructions| {
            b.iter(|| {
                let mut method = Method::new(definition(), instructions.clone(), Vec::new());
                let body = decompiler.decompile_or_stub(&mut method, &NullContext).unwrap();
                black_box(body)
            });
        });
    }
    group.finish();
}

fn bench_diamonds(c: &mut Criterion) {
    let decompiler = Decompiler::new(DecompilerConfig::unlimited());
    let mut group = c.benchmark_group("pipeline_diamonds");

    for count in [10, 50, 200] {
        let instructions = diamonds(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &instructions, |b, instructions| {
            b.iter(|| {
                let mut method = Method::new(definition(), instructions.clone(), Vec::new());
                let body = decompiler.decompile_or_stub(&mut method, &NullContext).unwrap();
                black_box(body)
            });
        });
    }
    group.finish();
}

fn bench_graph_and_dominance(c: &mut Criterion) {
    let instructions = diamonds(200);

    c.bench_function("cfg_dominance_diamonds_200", |b| {
        b.iter(|| {
            let graph = ControlFlowGraph::build(black_box(instructions.clone()));
            let dominance = Dominance::compute(&graph);
            black_box((graph.block_count(), dominance.preorder().len()))
        });
    });
}

criterion_group!(benches, bench_straight_line, bench_diamonds, bench_graph_and_dominance);
criterion_main!(benches);
