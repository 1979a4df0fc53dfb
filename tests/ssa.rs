//! SSA integration tests.
//!
//! Functions are built in memory form through `FunctionBuilder`, promoted with
//! `construct_ssa` and checked against the dominance properties the optimizer
//! relies on.

use std::collections::BTreeMap;

use ssaforge::{
    analysis::DominanceInfo,
    compiler::{EventKind, EventLog},
    ir::{
        BinaryOp, BlockId, FuncId, Function, FunctionBuilder, IcmpCond, Inst, IrType, Module,
        Operand, Param, RegId,
    },
    ssa::{construct_ssa, destruct_ssa, verify_ssa},
    Result,
};

/// A counting loop whose body branches on the parity of the induction variable.
fn build_nested(module: &mut Module) -> FuncId {
    let id = module.declare_function(
        "nested",
        IrType::I32,
        vec![Param::new("n", IrType::I32), Param::new("k", IrType::I32)],
    );
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let acc = b.alloca("acc", IrType::I32);
    let i = b.alloca("i", IrType::I32);
    b.store(Operand::int(0), acc);
    b.store(Operand::int(0), i);

    let header = b.new_block("header");
    let body = b.new_block("body");
    let odd = b.new_block("odd");
    let even = b.new_block("even");
    let latch = b.new_block("latch");
    let done = b.new_block("done");
    b.jump(header);

    b.position_at_end(header);
    let iv = b.load(IrType::I32, i);
    let c = b.icmp(IcmpCond::Slt, iv, Operand::Param(0));
    b.branch(c, body, done);

    b.position_at_end(body);
    let iv = b.load(IrType::I32, i);
    let bit = b.binary(BinaryOp::And, iv, Operand::int(1));
    let is_odd = b.icmp(IcmpCond::Ne, bit, Operand::int(0));
    b.branch(is_odd, odd, even);

    b.position_at_end(odd);
    let a = b.load(IrType::I32, acc);
    let a = b.binary(BinaryOp::Add, a, Operand::Param(1));
    b.store(a, acc);
    b.jump(latch);

    b.position_at_end(even);
    let a = b.load(IrType::I32, acc);
    let a = b.binary(BinaryOp::Sub, a, Operand::int(1));
    b.store(a, acc);
    b.jump(latch);

    b.position_at_end(latch);
    let iv = b.load(IrType::I32, i);
    let next = b.binary(BinaryOp::Add, iv, Operand::int(1));
    b.store(next, i);
    b.jump(header);

    b.position_at_end(done);
    let out = b.load(IrType::I32, acc);
    b.ret(Some(out));
    b.finish().expect("builder");
    id
}

fn block_named(func: &Function, name: &str) -> BlockId {
    func.blocks()
        .iter()
        .copied()
        .find(|&b| func.block_name(b) == name)
        .expect("block exists")
}

fn count(func: &Function, pred: impl Fn(&Inst) -> bool) -> usize {
    func.instructions().filter(|&(_, i)| pred(func.inst(i))).count()
}

#[test]
fn test_construction_yields_valid_ssa() -> Result<()> {
    let mut module = Module::new();
    let id = build_nested(&mut module);
    let func = module.function_mut(id);
    let events = EventLog::new();

    assert!(construct_ssa(func, &events)?);
    verify_ssa(func)?;

    assert_eq!(count(func, |i| matches!(i, Inst::Alloca { .. })), 0);
    assert_eq!(count(func, |i| matches!(i, Inst::Load { .. } | Inst::Store { .. })), 0);

    // acc and i merge at the loop header, acc merges again at the latch.
    let header = block_named(func, "header");
    let latch = block_named(func, "latch");
    assert_eq!(func.phis(header).len(), 2);
    assert_eq!(func.phis(latch).len(), 1);
    assert!(events.count_kind(EventKind::PhiInserted) >= 3);
    Ok(())
}

#[test]
fn test_construction_is_idempotent() -> Result<()> {
    let mut module = Module::new();
    let id = build_nested(&mut module);
    let func = module.function_mut(id);
    let events = EventLog::new();

    assert!(construct_ssa(func, &events)?);
    let before = func.instruction_count();
    assert!(!construct_ssa(func, &events)?);
    assert_eq!(func.instruction_count(), before);
    verify_ssa(func)
}

#[test]
fn test_dominance_frontier_definition() -> Result<()> {
    let mut module = Module::new();
    let id = build_nested(&mut module);
    let func = module.function(id);
    let dom = DominanceInfo::compute(func)?;

    // x ∈ DF(b) iff b dominates a predecessor of x and does not strictly
    // dominate x.
    for &b in func.blocks() {
        let frontier = dom.frontier(b);
        for &x in func.blocks() {
            let expected = func.preds(x).iter().any(|&p| dom.dominates(b, p))
                && !dom.strictly_dominates(b, x);
            assert_eq!(
                frontier.contains(&x),
                expected,
                "DF({}) membership of {}",
                func.block_name(b),
                func.block_name(x)
            );
        }
    }
    Ok(())
}

#[test]
fn test_strict_dominators_chain_to_entry() -> Result<()> {
    let mut module = Module::new();
    let id = build_nested(&mut module);
    let func = module.function(id);
    let dom = DominanceInfo::compute(func)?;

    let odd = block_named(func, "odd");
    let body = block_named(func, "body");
    let header = block_named(func, "header");
    assert_eq!(dom.idom(odd), Some(body));
    assert_eq!(dom.idom(body), Some(header));

    let strict = dom.strict_dominators(odd);
    assert!(strict.contains(&func.entry()));
    assert!(strict.contains(&header));
    assert!(!strict.contains(&odd));
    assert_eq!(dom.idom(func.entry()), None);
    Ok(())
}

#[test]
fn test_destruction_removes_phis() -> Result<()> {
    let mut module = Module::new();
    let id = build_nested(&mut module);
    let func = module.function_mut(id);
    let events = EventLog::new();

    construct_ssa(func, &events)?;
    assert!(count(func, Inst::is_phi) > 0);
    assert!(destruct_ssa(func, &events)?);

    assert_eq!(count(func, Inst::is_phi), 0);
    assert_eq!(count(func, |i| matches!(i, Inst::ParallelCopy { .. })), 0);
    assert!(count(func, |i| matches!(i, Inst::Move { .. })) > 0);
    assert!(!func.is_not_functional());

    // No critical edges remain.
    for &block in func.blocks() {
        if func.succs(block).len() > 1 {
            for &succ in func.succs(block) {
                assert_eq!(
                    func.preds(succ).len(),
                    1,
                    "critical edge into {}",
                    func.block_name(succ)
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_read_before_write_takes_default() -> Result<()> {
    // int f(int c) { int x; if (c) x = 5; return x; }
    let mut module = Module::new();
    let id = module.declare_function("f", IrType::I32, vec![Param::new("c", IrType::I1)]);
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let x = b.alloca("x", IrType::I32);
    let set = b.new_block("set");
    let join = b.new_block("join");
    b.branch(Operand::Param(0), set, join);
    b.position_at_end(set);
    b.store(Operand::int(5), x);
    b.jump(join);
    b.position_at_end(join);
    let v = b.load(IrType::I32, x);
    b.ret(Some(v));
    b.finish()?;

    let func = module.function_mut(id);
    construct_ssa(func, &EventLog::new())?;
    verify_ssa(func)?;

    let join = block_named(func, "join");
    let phis = func.phis(join);
    assert_eq!(phis.len(), 1);
    match func.inst(phis[0]) {
        Inst::Phi { incoming, .. } => {
            assert!(incoming.contains(&(Operand::int(5), block_named(func, "set"))));
            assert!(incoming.contains(&(Operand::int(0), func.entry())));
        }
        other => panic!("expected phi, got {other:?}"),
    }
    Ok(())
}

fn operand_value(regs: &BTreeMap<RegId, i32>, args: &[i32], op: Operand) -> i32 {
    match op {
        Operand::Reg(r) => *regs.get(&r).expect("register defined before use"),
        Operand::Param(i) => args[i],
        other => other.as_int().expect("integer constant"),
    }
}

/// Runs `func` on integer arguments and returns its result.
///
/// Handles the memory form, SSA form and the moves left by destruction, so
/// the same function can be executed at every stage.
fn execute(func: &Function, args: &[i32]) -> i32 {
    let mut regs: BTreeMap<RegId, i32> = BTreeMap::new();
    let mut memory: BTreeMap<RegId, i32> = BTreeMap::new();
    let mut block = func.entry();
    let mut prev: Option<BlockId> = None;

    for _ in 0..100_000 {
        if let Some(pred) = prev {
            let incoming: Vec<(RegId, i32)> = func
                .phis(block)
                .iter()
                .map(|&phi| match func.inst(phi) {
                    Inst::Phi { dest, incoming } => {
                        let (value, _) = incoming
                            .iter()
                            .find(|(_, b)| *b == pred)
                            .expect("operand for predecessor");
                        (*dest, operand_value(&regs, args, *value))
                    }
                    other => panic!("expected phi, got {other:?}"),
                })
                .collect();
            regs.extend(incoming);
        }

        let mut next = None;
        for &id in func.block_insts(block) {
            match func.inst(id) {
                Inst::Phi { .. } => {}
                Inst::Alloca { dest, .. } => {
                    memory.insert(*dest, 0);
                }
                Inst::Load { dest, ptr } => {
                    let slot = ptr.as_reg().expect("stack slot");
                    let value = memory.get(&slot).copied().unwrap_or(0);
                    regs.insert(*dest, value);
                }
                Inst::Store { value, ptr } => {
                    let value = operand_value(&regs, args, *value);
                    memory.insert(ptr.as_reg().expect("stack slot"), value);
                }
                Inst::Binary { op, dest, lhs, rhs } => {
                    let l = operand_value(&regs, args, *lhs);
                    let r = operand_value(&regs, args, *rhs);
                    regs.insert(*dest, op.fold(l, r).expect("nonzero divisor"));
                }
                Inst::Icmp {
                    cond,
                    dest,
                    lhs,
                    rhs,
                } => {
                    let l = operand_value(&regs, args, *lhs);
                    let r = operand_value(&regs, args, *rhs);
                    let holds = match cond {
                        IcmpCond::Eq => l == r,
                        IcmpCond::Ne => l != r,
                        IcmpCond::Sgt => l > r,
                        IcmpCond::Sge => l >= r,
                        IcmpCond::Slt => l < r,
                        IcmpCond::Sle => l <= r,
                    };
                    regs.insert(*dest, i32::from(holds));
                }
                Inst::Move { dest, src } => {
                    let value = operand_value(&regs, args, *src);
                    regs.insert(*dest, value);
                }
                Inst::Branch {
                    cond,
                    then_bb,
                    else_bb,
                } => {
                    next = Some(if operand_value(&regs, args, *cond) != 0 {
                        *then_bb
                    } else {
                        *else_bb
                    });
                    break;
                }
                Inst::Jump { target } => {
                    next = Some(*target);
                    break;
                }
                Inst::Return { value } => {
                    return value.map_or(0, |v| operand_value(&regs, args, v));
                }
                other => panic!("unexpected instruction {other:?}"),
            }
        }
        prev = Some(block);
        block = next.expect("block ends in a terminator");
    }
    panic!("{} did not terminate", func.name());
}

/// A loop that swaps `a` and `b` on every iteration, so the header phis of
/// the two locals read each other.
fn build_swap(module: &mut Module) -> FuncId {
    let id = module.declare_function("swap", IrType::I32, vec![Param::new("n", IrType::I32)]);
    let mut b = FunctionBuilder::new(module.function_mut(id));
    let a = b.alloca("a", IrType::I32);
    let c = b.alloca("b", IrType::I32);
    let i = b.alloca("i", IrType::I32);
    let acc = b.alloca("acc", IrType::I32);
    b.store(Operand::int(1), a);
    b.store(Operand::int(2), c);
    b.store(Operand::int(0), i);
    b.store(Operand::int(0), acc);

    let header = b.new_block("header");
    let body = b.new_block("body");
    let done = b.new_block("done");
    b.jump(header);

    b.position_at_end(header);
    let iv = b.load(IrType::I32, i);
    let cond = b.icmp(IcmpCond::Slt, iv, Operand::Param(0));
    b.branch(cond, body, done);

    b.position_at_end(body);
    let av = b.load(IrType::I32, a);
    let cv = b.load(IrType::I32, c);
    b.store(cv, a);
    b.store(av, c);
    let term = b.binary(BinaryOp::Mul, av, iv);
    let sum = b.load(IrType::I32, acc);
    let sum = b.binary(BinaryOp::Add, sum, term);
    b.store(sum, acc);
    let next = b.binary(BinaryOp::Add, iv, Operand::int(1));
    b.store(next, i);
    b.jump(header);

    b.position_at_end(done);
    let av = b.load(IrType::I32, a);
    let cv = b.load(IrType::I32, c);
    let sum = b.load(IrType::I32, acc);
    let out = b.binary(BinaryOp::Mul, sum, Operand::int(100));
    let tens = b.binary(BinaryOp::Mul, av, Operand::int(10));
    let out = b.binary(BinaryOp::Add, out, tens);
    let out = b.binary(BinaryOp::Add, out, cv);
    b.ret(Some(out));
    b.finish().expect("builder");
    id
}

/// Results of `func` on every argument list, in memory form, in SSA form and
/// after leaving SSA.
fn results_per_stage(func: &mut Function, inputs: &[Vec<i32>]) -> Result<[Vec<i32>; 3]> {
    let run = |f: &Function| -> Vec<i32> {
        inputs.iter().map(|args| execute(f, args)).collect()
    };
    let events = EventLog::new();
    let memory = run(&*func);
    construct_ssa(func, &events)?;
    verify_ssa(func)?;
    let ssa = run(&*func);
    destruct_ssa(func, &events)?;
    let lowered = run(&*func);
    Ok([memory, ssa, lowered])
}

#[test]
fn test_swap_loop_round_trip() -> Result<()> {
    let mut module = Module::new();
    let id = build_swap(&mut module);
    let inputs: Vec<Vec<i32>> = [0, 1, 2, 5, 8].iter().map(|&n| vec![n]).collect();

    let func = module.function_mut(id);
    let [memory, ssa, lowered] = results_per_stage(func, &inputs)?;
    // n = 0 leaves a = 1, b = 2; one swap gives 21 with nothing accumulated.
    assert_eq!(memory[0], 12);
    assert_eq!(memory[1], 21);
    assert_eq!(ssa, memory);
    assert_eq!(lowered, memory);
    assert_eq!(count(func, Inst::is_phi), 0);
    Ok(())
}

#[test]
fn test_swap_cycle_broken_with_temporary() -> Result<()> {
    let mut module = Module::new();
    let id = build_swap(&mut module);
    let func = module.function_mut(id);
    let events = EventLog::new();

    construct_ssa(func, &events)?;
    let header = block_named(func, "header");
    let phis = func.phis(header).len();
    assert_eq!(phis, 4);

    destruct_ssa(func, &events)?;
    // One move per header phi on the back edge, plus one to save a value of
    // the a/b cycle.
    let body = block_named(func, "body");
    let moves = func
        .block_insts(body)
        .iter()
        .filter(|&&i| matches!(func.inst(i), Inst::Move { .. }))
        .count();
    assert_eq!(moves, phis + 1);
    Ok(())
}

#[test]
fn test_nested_loop_round_trip() -> Result<()> {
    let mut module = Module::new();
    let id = build_nested(&mut module);
    let inputs: Vec<Vec<i32>> = [(0, 3), (1, 3), (4, 2), (7, -5), (10, 1)]
        .iter()
        .map(|&(n, k)| vec![n, k])
        .collect();

    let func = module.function_mut(id);
    let [memory, ssa, lowered] = results_per_stage(func, &inputs)?;
    // Four iterations: two odd (+2 each), two even (-1 each).
    assert_eq!(memory[2], 2);
    assert_eq!(ssa, memory);
    assert_eq!(lowered, memory);
    Ok(())
}
