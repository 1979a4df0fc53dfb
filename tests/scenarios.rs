//! End-to-end scenarios over the phases of the pipeline.
//!
//! - A: phi placement at a diamond merge
//! - B: preheader reuse and synthesis
//! - C: a `while (false)` loop disappears
//! - D: register pressure beyond the palette forces spills
//! - E: self recursion is unrolled to the configured depth

use ssaforge::{
    analysis::{DominanceInfo, LoopForest},
    backend::{Address, MInst, StackSlot},
    compiler::{CompilerContext, EventKind, PassFlags, PipelineConfig},
    ir::{
        BinaryOp, FuncId, Function, FunctionBuilder, IcmpCond, Inst, IrType, Module, Operand,
        Param,
    },
    ssa::{construct_ssa, verify_ssa},
    Compiler, Result,
};

fn calls_to(func: &Function, target: FuncId) -> usize {
    func.instructions()
        .filter(|&(_, i)| matches!(func.inst(i), Inst::Call { callee, .. } if *callee == target))
        .count()
}

#[test]
fn scenario_a_diamond_gets_one_phi() -> Result<()> {
    // void f(bool c) { int x; if (c) x = 1; else x = 2; printInt(x); }
    let mut module = Module::new();
    let print = module.require_function("printInt")?;
    let id = module.declare_function("f", IrType::Void, vec![Param::new("c", IrType::I1)]);
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let x = b.alloca("x", IrType::I32);
    let left = b.new_block("left");
    let right = b.new_block("right");
    let merge = b.new_block("merge");
    b.branch(Operand::Param(0), left, right);
    b.position_at_end(left);
    b.store(Operand::int(1), x);
    b.jump(merge);
    b.position_at_end(right);
    b.store(Operand::int(2), x);
    b.jump(merge);
    b.position_at_end(merge);
    let v = b.load(IrType::I32, x);
    b.call(print, &IrType::Void, vec![v]);
    b.ret(None);
    b.finish()?;

    let ctx = CompilerContext::default();
    let func = module.function_mut(id);
    construct_ssa(func, &ctx.events)?;
    verify_ssa(func)?;

    let total_phis: usize = func.blocks().iter().map(|&b| func.phis(b).len()).sum();
    assert_eq!(total_phis, 1);
    let phis = func.phis(merge);
    assert_eq!(phis.len(), 1);
    match func.inst(phis[0]) {
        Inst::Phi { incoming, .. } => {
            assert_eq!(incoming.len(), 2);
            assert!(incoming.contains(&(Operand::int(1), left)));
            assert!(incoming.contains(&(Operand::int(2), right)));
        }
        other => panic!("expected phi, got {other:?}"),
    }
    assert_eq!(ctx.events.count_kind(EventKind::PhiInserted), 1);
    Ok(())
}

/// A counting loop. With `second_entry`, the header is also reachable from a
/// conditional block, so it has two outside predecessors.
fn loop_function(module: &mut Module, second_entry: bool) -> FuncId {
    let id = module.declare_function(
        "f",
        IrType::I32,
        vec![Param::new("n", IrType::I32), Param::new("c", IrType::I1)],
    );
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let i = b.alloca("i", IrType::I32);
    b.store(Operand::int(0), i);
    let header = b.new_block("header");
    let body = b.new_block("body");
    let done = b.new_block("done");
    if second_entry {
        let bump = b.new_block("bump");
        b.branch(Operand::Param(1), bump, header);
        b.position_at_end(bump);
        b.store(Operand::int(1), i);
        b.jump(header);
    } else {
        b.jump(header);
    }
    b.position_at_end(header);
    let iv = b.load(IrType::I32, i);
    let c = b.icmp(IcmpCond::Slt, iv, Operand::Param(0));
    b.branch(c, body, done);
    b.position_at_end(body);
    let next = b.binary(BinaryOp::Add, iv, Operand::int(1));
    b.store(next, i);
    b.jump(header);
    b.position_at_end(done);
    b.ret(Some(iv));
    b.finish().expect("builder");
    id
}

#[test]
fn scenario_b_preheader_reused_or_synthesized() -> Result<()> {
    let ctx = CompilerContext::default();

    let mut module = Module::new();
    let id = loop_function(&mut module, false);
    let func = module.function_mut(id);
    construct_ssa(func, &ctx.events)?;
    let blocks = func.blocks().len();
    let dom = DominanceInfo::compute(func)?;
    let mut loops = LoopForest::compute(func, &dom);
    assert_eq!(loops.len(), 1);
    assert!(loops.ensure_preheaders(func).is_empty());
    assert_eq!(func.blocks().len(), blocks);
    assert_eq!(loops.loops()[0].preheader, Some(func.entry()));

    let mut module = Module::new();
    let id = loop_function(&mut module, true);
    let func = module.function_mut(id);
    construct_ssa(func, &ctx.events)?;
    let blocks = func.blocks().len();
    let dom = DominanceInfo::compute(func)?;
    let mut loops = LoopForest::compute(func, &dom);
    let created = loops.ensure_preheaders(func);
    assert_eq!(created.len(), 1);
    assert_eq!(func.blocks().len(), blocks + 1);
    assert_eq!(loops.loops()[0].preheader, Some(created[0]));

    // The header now has the preheader as its only outside predecessor.
    let header = loops.loops()[0].header;
    let outside: Vec<_> = func
        .preds(header)
        .iter()
        .copied()
        .filter(|&p| !loops.loops()[0].contains(p))
        .collect();
    assert_eq!(outside, vec![created[0]]);
    verify_ssa(func)?;
    Ok(())
}

#[test]
fn scenario_c_while_false_removed() -> Result<()> {
    // int main() { while (false) { printInt(1); } return 0; }
    let mut module = Module::new();
    let print = module.require_function("printInt")?;
    let main = module.declare_function("main", IrType::I32, vec![]);
    let mut b = FunctionBuilder::new(module.function_mut(main));
    let cond = b.alloca("cond", IrType::I1);
    b.store(Operand::bool(false), cond);
    let header = b.new_block("header");
    let body = b.new_block("body");
    let done = b.new_block("done");
    b.jump(header);
    b.position_at_end(header);
    let c = b.load(IrType::I1, cond);
    b.branch(c, body, done);
    b.position_at_end(body);
    b.call(print, &IrType::Void, vec![Operand::int(1)]);
    b.jump(header);
    b.position_at_end(done);
    b.ret(Some(Operand::int(0)));
    b.finish()?;

    let config = PipelineConfig::default();
    let ctx = CompilerContext::new(config.clone());
    Compiler::new(config).optimize(&mut module, &ctx)?;

    let f = module.function(main);
    verify_ssa(f)?;
    assert!(f.blocks().iter().all(|&b| f.block_name(b) != "body"));
    assert_eq!(calls_to(f, print), 0);
    assert!(f
        .instructions()
        .all(|(_, i)| !matches!(f.inst(i), Inst::Branch { .. })));
    assert!(ctx.events.has(EventKind::BranchSimplified));
    assert!(ctx.events.has(EventKind::BlockRemoved));
    Ok(())
}

#[test]
fn scenario_d_pressure_forces_spills() -> Result<()> {
    // 40 values read with getInt stay live until they are summed.
    let mut module = Module::new();
    let get = module.require_function("getInt")?;
    let print = module.require_function("printlnInt")?;
    let main = module.declare_function("main", IrType::I32, vec![]);
    let mut b = FunctionBuilder::new(module.function_mut(main));
    let values: Vec<Operand> = (0..40)
        .map(|_| b.call(get, &IrType::I32, vec![]).expect("value"))
        .collect();
    let mut sum = values[0];
    for &v in &values[1..] {
        sum = b.binary(BinaryOp::Add, sum, v);
    }
    b.call(print, &IrType::Void, vec![sum]);
    b.ret(Some(Operand::int(0)));
    b.finish()?;

    let (asm, events) = Compiler::default().compile_with_events(module)?;
    let main = asm.function("main").expect("main");
    assert!(main.virtual_regs().is_empty());
    assert!(main.frame.spill_count() > 0);
    assert!(events.has(EventKind::RegisterSpilled));

    let spill_stores = main
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter(|i| {
            matches!(
                i,
                MInst::Store {
                    addr: Address::Frame {
                        slot: StackSlot::Spill(_),
                        ..
                    },
                    ..
                }
            )
        })
        .count();
    assert!(spill_stores > 0);
    Ok(())
}

/// `int down(int n) { if (n > 0) return down(n - 1); return 0; }` called from
/// `main`.
fn recursive_program() -> (Module, FuncId) {
    let mut module = Module::new();
    let down = module.declare_function("down", IrType::I32, vec![Param::new("n", IrType::I32)]);
    let mut b = FunctionBuilder::new(module.function_mut(down));
    let rec = b.new_block("rec");
    let base = b.new_block("base");
    let c = b.icmp(IcmpCond::Sgt, Operand::Param(0), Operand::int(0));
    b.branch(c, rec, base);
    b.position_at_end(rec);
    let n1 = b.binary(BinaryOp::Sub, Operand::Param(0), Operand::int(1));
    let r = b.call(down, &IrType::I32, vec![n1]).expect("value");
    b.ret(Some(r));
    b.position_at_end(base);
    b.ret(Some(Operand::int(0)));
    b.finish().expect("builder");

    let get = module.function_by_name("getInt").expect("runtime");
    let main = module.declare_function("main", IrType::I32, vec![]);
    let mut b = FunctionBuilder::new(module.function_mut(main));
    let n = b.call(get, &IrType::I32, vec![]).expect("value");
    let r = b.call(down, &IrType::I32, vec![n]).expect("value");
    b.ret(Some(r));
    b.finish().expect("builder");
    (module, down)
}

#[test]
fn scenario_e_recursion_unrolled_to_depth() -> Result<()> {
    let (mut module, down) = recursive_program();
    let config = PipelineConfig::default().with_passes(PassFlags::INLINE);
    let ctx = CompilerContext::new(config.clone());
    Compiler::new(config).optimize(&mut module, &ctx)?;

    let f = module.function(down);
    verify_ssa(f)?;
    assert!(!f.is_not_functional());
    // Three copies are spliced in, the innermost keeps a real call.
    assert_eq!(calls_to(f, down), 1);
    assert_eq!(
        ctx.events
            .filter_kind(EventKind::FunctionInlined)
            .filter(|e| e.function.as_deref() == Some("down"))
            .count(),
        3
    );

    let asm = Compiler::default().compile(recursive_program().0)?;
    assert!(asm.to_string().contains("\tcall\tdown\n"));
    Ok(())
}
