//! Pipeline throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vesper_core::ConstantValue;
use vesper_jit::ir::{Children, Graph, Opcode, Payload};
use vesper_jit::{optimize, CodeBlock};

/// A straight-line block of arithmetic with plenty of CSE fodder: pairs
/// of identical adds feeding multiplies.
fn build_arith_block(pairs: u32) -> (Graph, CodeBlock) {
    let mut graph = Graph::new(0, 2);
    let mut code_block = CodeBlock::new(0);

    let var = graph.variables.add(0);
    let c = code_block.add_constant(ConstantValue::Int32(3));
    let init = graph.add_node(Opcode::JSConstant, Children::none(), Payload::Constant(c));
    graph.add_node(Opcode::SetLocal, Children::one(init), Payload::Variable(var));

    let mut acc = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
    for _ in 0..pairs {
        let x = graph.add_node(Opcode::GetLocal, Children::none(), Payload::Variable(var));
        let a1 = graph.add_node(Opcode::ArithAdd, Children::two(acc, x), Payload::None);
        let a2 = graph.add_node(Opcode::ArithAdd, Children::two(acc, x), Payload::None);
        acc = graph.add_node(Opcode::ArithMul, Children::two(a1, a2), Payload::None);
    }
    graph.add_node(Opcode::Return, Children::one(acc), Payload::None);

    let end = graph.len() as u32;
    graph.add_block(0, end);
    (graph, code_block)
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    for pairs in [10u32, 100, 500] {
        group.bench_function(format!("arith_{}_pairs", pairs), |b| {
            b.iter_batched(
                || build_arith_block(pairs),
                |(mut graph, mut code_block)| {
                    black_box(optimize(&mut graph, &mut code_block));
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);
