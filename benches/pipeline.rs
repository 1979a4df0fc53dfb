//! Benchmarks for the compilation pipeline.
//!
//! A generated program with nested loops, calls and high register pressure is
//! compiled with and without optimization, and the register allocator is
//! measured on its own.

extern crate ssaforge;

use criterion::{criterion_group, criterion_main, Criterion};
use ssaforge::{
    backend::{assign_loop_depths, InstructionSelector, RegisterAllocator, RegisterFile},
    compiler::{AllocatorConfig, CompilerContext, EventLog, PipelineConfig},
    ir::{BinaryOp, FuncId, FunctionBuilder, IcmpCond, IrType, Module, Operand, Param},
    ssa::destruct_ssa,
    Compiler,
};
use std::hint::black_box;

/// Builds `count` worker functions, each with a two-level loop nest that keeps
/// many values live, and a `main` that calls all of them.
fn generate(count: usize) -> Module {
    let mut module = Module::new();
    let get = module.function_by_name("getInt").unwrap();
    let print = module.function_by_name("printlnInt").unwrap();

    let mut workers = Vec::new();
    for w in 0..count {
        let id = module.declare_function(
            format!("work{w}"),
            IrType::I32,
            vec![Param::new("n", IrType::I32), Param::new("k", IrType::I32)],
        );
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let acc = b.alloca("acc", IrType::I32);
        let i = b.alloca("i", IrType::I32);
        let j = b.alloca("j", IrType::I32);
        b.store(Operand::int(0), acc);
        b.store(Operand::int(0), i);

        let outer = b.new_block("outer");
        let outer_body = b.new_block("outer_body");
        let inner = b.new_block("inner");
        let inner_body = b.new_block("inner_body");
        let outer_latch = b.new_block("outer_latch");
        let done = b.new_block("done");
        b.jump(outer);

        b.position_at_end(outer);
        let iv = b.load(IrType::I32, i);
        let c = b.icmp(IcmpCond::Slt, iv, Operand::Param(0));
        b.branch(c, outer_body, done);

        b.position_at_end(outer_body);
        b.store(Operand::int(0), j);
        b.jump(inner);

        b.position_at_end(inner);
        let jv = b.load(IrType::I32, j);
        let c = b.icmp(IcmpCond::Slt, jv, Operand::Param(1));
        b.branch(c, inner_body, outer_latch);

        b.position_at_end(inner_body);
        let invariant = b.binary(BinaryOp::Mul, Operand::Param(1), Operand::int(7));
        let mut terms = Vec::new();
        for t in 0..12 {
            let x = b.binary(BinaryOp::Add, jv, Operand::int(t));
            terms.push(b.binary(BinaryOp::Mul, x, iv));
        }
        let mut sum = invariant;
        for t in terms {
            sum = b.binary(BinaryOp::Xor, sum, t);
        }
        let a = b.load(IrType::I32, acc);
        let a = b.binary(BinaryOp::Add, a, sum);
        b.store(a, acc);
        let next = b.binary(BinaryOp::Add, jv, Operand::int(1));
        b.store(next, j);
        b.jump(inner);

        b.position_at_end(outer_latch);
        let next = b.binary(BinaryOp::Add, iv, Operand::int(1));
        b.store(next, i);
        b.jump(outer);

        b.position_at_end(done);
        let out = b.load(IrType::I32, acc);
        b.ret(Some(out));
        b.finish().unwrap();
        workers.push(id);
    }

    let main = module.declare_function("main", IrType::I32, vec![]);
    let mut b = FunctionBuilder::new(module.function_mut(main));
    let n = b.call(get, &IrType::I32, vec![]).unwrap();
    for id in workers {
        let r = b.call(id, &IrType::I32, vec![n, Operand::int(16)]).unwrap();
        b.call(print, &IrType::Void, vec![r]);
    }
    b.ret(Some(Operand::int(0)));
    b.finish().unwrap();
    module
}

/// Benchmark the full pipeline with every pass enabled.
fn bench_compile_optimized(c: &mut Criterion) {
    let module = generate(8);
    let compiler = Compiler::default();
    c.bench_function("pipeline_optimized", |b| {
        b.iter(|| {
            let asm = compiler.compile(black_box(module.clone())).unwrap();
            black_box(asm)
        });
    });
}

/// Benchmark SSA construction, destruction and the backend alone.
fn bench_compile_unoptimized(c: &mut Criterion) {
    let module = generate(8);
    let compiler = Compiler::new(PipelineConfig::unoptimized());
    c.bench_function("pipeline_unoptimized", |b| {
        b.iter(|| {
            let asm = compiler.compile(black_box(module.clone())).unwrap();
            black_box(asm)
        });
    });
}

/// Benchmark register allocation of one selected worker function.
fn bench_register_allocation(c: &mut Criterion) {
    let mut module = generate(1);
    let compiler = Compiler::new(PipelineConfig::unoptimized());
    let ctx = CompilerContext::default();
    compiler.optimize(&mut module, &ctx).unwrap();
    for id in module.defined_functions() {
        let mut func = module.take_function(id);
        destruct_ssa(&mut func, &ctx.events).unwrap();
        module.restore_function(id, func);
    }

    let work: FuncId = module.function_by_name("work0").unwrap();
    let rf = RegisterFile::rv32();
    let mut selected = InstructionSelector::new(&module, &rf).select(work).unwrap();
    assign_loop_depths(&mut selected, module.function(work)).unwrap();
    let config = AllocatorConfig::default();

    c.bench_function("register_allocation", |b| {
        b.iter(|| {
            let events = EventLog::new();
            let mut mf = selected.clone();
            let stats = RegisterAllocator::new(&rf, &config, &events)
                .allocate(black_box(&mut mf))
                .unwrap();
            black_box(stats)
        });
    });
}

criterion_group!(
    benches,
    bench_compile_optimized,
    bench_compile_unoptimized,
    bench_register_allocation
);
criterion_main!(benches);
