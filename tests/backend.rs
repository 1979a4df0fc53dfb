//! Backend integration tests.
//!
//! Programs go through the whole `Compiler` and the checks look at the
//! allocated machine functions and the emitted text.

use ssaforge::{
    backend::{Address, MBlockId, MFunction, MInst, StackSlot},
    compiler::{PassFlags, PipelineConfig},
    ir::{BinaryOp, FunctionBuilder, GlobalInit, IcmpCond, IrType, Module, Operand, Param},
    Assembly, Compiler, Result,
};

fn frame_accesses(func: &MFunction, pred: impl Fn(&StackSlot) -> bool) -> usize {
    func.blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter(|inst| match inst {
            MInst::Load {
                addr: Address::Frame { slot, .. },
                ..
            }
            | MInst::Store {
                addr: Address::Frame { slot, .. },
                ..
            } => pred(slot),
            _ => false,
        })
        .count()
}

fn assert_allocated(asm: &Assembly) {
    for func in asm.functions() {
        assert!(
            func.virtual_regs().is_empty(),
            "virtual registers left in {}",
            func.name
        );
        assert_eq!(func.frame.size() % 16, 0);
    }
    assert!(!asm.to_string().contains("%v"));
}

/// `int sum10(a0..a9)` plus a `main` that calls it with 1..=10.
fn ten_arguments() -> Module {
    let mut module = Module::new();
    let params = (0..10)
        .map(|i| Param::new(format!("p{i}"), IrType::I32))
        .collect();
    let sum = module.declare_function("sum10", IrType::I32, params);
    let mut b = FunctionBuilder::new(module.function_mut(sum));
    let mut acc = Operand::Param(0);
    for i in 1..10 {
        acc = b.binary(BinaryOp::Add, acc, Operand::Param(i));
    }
    b.ret(Some(acc));
    b.finish().expect("builder");

    let main = module.declare_function("main", IrType::I32, vec![]);
    let mut b = FunctionBuilder::new(module.function_mut(main));
    let args = (1..=10).map(Operand::int).collect();
    let r = b.call(sum, &IrType::I32, args).expect("value");
    b.ret(Some(r));
    b.finish().expect("builder");
    module
}

#[test]
fn test_stack_arguments() -> Result<()> {
    let asm = Compiler::new(PipelineConfig::unoptimized()).compile(ten_arguments())?;
    assert_allocated(&asm);

    let main = asm.function("main").expect("main");
    assert!(main.frame.has_calls());
    assert_eq!(
        frame_accesses(main, |s| matches!(s, StackSlot::OutgoingArg(_))),
        2
    );

    let callee = asm.function("sum10").expect("sum10");
    assert!(!callee.frame.has_calls());
    assert_eq!(
        frame_accesses(callee, |s| matches!(s, StackSlot::IncomingArg(_))),
        2
    );

    let text = asm.to_string();
    assert!(text.contains("\tcall\tsum10\n"));
    assert!(text.contains("\tsw\tra, "));
    Ok(())
}

#[test]
fn test_leaf_function_does_not_save_return_address() -> Result<()> {
    let mut module = Module::new();
    let id = module.declare_function("inc", IrType::I32, vec![Param::new("x", IrType::I32)]);
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let v = b.binary(BinaryOp::Add, Operand::Param(0), Operand::int(5));
    b.ret(Some(v));
    b.finish()?;

    let asm = Compiler::new(PipelineConfig::unoptimized()).compile(module)?;
    assert_allocated(&asm);
    let inc = asm.function("inc").expect("inc");
    assert_eq!(inc.frame.size(), 0);

    let text = asm.to_string();
    assert!(!text.contains("ra, "));
    assert!(text.contains("\taddi\t"));
    assert!(text.contains(", 5\n"));
    assert!(text.trim_end().ends_with(".size\tinc, .-inc"));
    Ok(())
}

#[test]
fn test_globals_and_strings() -> Result<()> {
    let mut module = Module::new();
    let print = module.require_function("print")?;
    let counter = module.add_global("counter", IrType::I32, GlobalInit::Int(5));
    let greeting = module.add_string_literal("hello\n");

    let main = module.declare_function("main", IrType::I32, vec![]);
    let mut b = FunctionBuilder::new(module.function_mut(main));
    let c = b.load(IrType::I32, Operand::Global(counter));
    let c = b.binary(BinaryOp::Add, c, Operand::int(1));
    b.store(c, Operand::Global(counter));
    b.call(print, &IrType::Void, vec![Operand::Global(greeting)]);
    b.ret(Some(Operand::int(0)));
    b.finish()?;

    let asm = Compiler::default().compile(module)?;
    assert_allocated(&asm);
    let text = asm.to_string();
    assert!(text.contains("%hi(counter)"));
    assert!(text.contains("%lo(counter)("));
    assert!(text.contains("%hi(.str.0)"));
    assert!(text.contains("\t.section\t.data\n\t.globl\tcounter\n"));
    assert!(text.contains("\t.word\t5\n"));
    assert!(text.contains(".str.0:\n\t.asciz\t\"hello\\n\"\n"));
    assert_eq!(asm.data().len(), 2);
    Ok(())
}

#[test]
fn test_compare_and_branch_fused() -> Result<()> {
    // void count(int n) { for (i = 0; i < n; i++) printInt(i); }
    let mut module = Module::new();
    let print = module.require_function("printInt")?;
    let id = module.declare_function("count", IrType::Void, vec![Param::new("n", IrType::I32)]);
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let i = b.alloca("i", IrType::I32);
    b.store(Operand::int(0), i);
    let header = b.new_block("header");
    let body = b.new_block("body");
    let done = b.new_block("done");
    b.jump(header);
    b.position_at_end(header);
    let iv = b.load(IrType::I32, i);
    let c = b.icmp(IcmpCond::Slt, iv, Operand::Param(0));
    b.branch(c, body, done);
    b.position_at_end(body);
    b.call(print, &IrType::Void, vec![iv]);
    let next = b.binary(BinaryOp::Add, iv, Operand::int(1));
    b.store(next, i);
    b.jump(header);
    b.position_at_end(done);
    b.ret(None);
    b.finish()?;

    let asm = Compiler::new(PipelineConfig::unoptimized()).compile(module)?;
    assert_allocated(&asm);
    let text = asm.to_string();
    assert!(text.contains("\tblt\t"));
    assert!(!text.contains("\tslt\t"));

    // The call sits in a block inside the loop.
    let count = asm.function("count").expect("count");
    assert!(count
        .blocks
        .iter()
        .any(|b| b.loop_depth > 0 && b.insts.iter().any(|i| matches!(i, MInst::Call { .. }))));
    Ok(())
}

#[test]
fn test_peephole_removes_fall_through_jumps() -> Result<()> {
    let module = ten_arguments();
    let config = PipelineConfig::unoptimized().with_passes(PassFlags::PEEPHOLE);
    let asm = Compiler::new(config).compile(module)?;

    for func in asm.functions() {
        for (index, block) in func.blocks.iter().enumerate() {
            assert_ne!(
                block.insts.last(),
                Some(&MInst::Jump {
                    target: MBlockId(index + 1)
                }),
                "{} keeps a jump to the next block",
                block.label
            );
            for inst in &block.insts {
                if let Some((rd, rs)) = inst.as_move() {
                    assert_ne!(rd, rs, "self move in {}", block.label);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_optimized_program_is_smaller() -> Result<()> {
    let plain = Compiler::new(PipelineConfig::unoptimized()).compile(ten_arguments())?;
    let optimized = Compiler::default().compile(ten_arguments())?;
    assert_allocated(&optimized);

    // sum10 is inlined, folded to a constant and removed.
    assert!(optimized.function("sum10").is_none());
    assert!(optimized.instruction_count() < plain.instruction_count());
    assert!(optimized.to_string().contains(", 55\n"));
    Ok(())
}
