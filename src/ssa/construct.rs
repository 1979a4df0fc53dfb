//! Promotion of stack slots to SSA registers.
//!
//! This is the classic Cytron construction:
//!
//! 1. **Candidates**: entry-block `alloca`s of a scalar type whose address is
//!    only ever used as the pointer operand of a `load` or `store`.
//! 2. **Phi placement**: for each candidate a phi is inserted at every block of
//!    the iterated dominance frontier of the blocks that store to it.
//! 3. **Renaming**: a depth-first walk of the CFG from the entry carries a
//!    table of the current value of every candidate. A phi receives one
//!    operand per incoming edge from the table at the end of the predecessor;
//!    a candidate with no assignment on that path contributes its type's
//!    default value. A block reached a second time only contributes phi
//!    operands, it is not renamed again.
//!
//! Loads of a candidate are replaced by the current value, stores update the
//! table, and both are deleted together with the `alloca`. Running the
//! construction on a function that is already in SSA form finds no candidate
//! and changes nothing.

use std::collections::BTreeMap;

use crate::{
    analysis::DominanceInfo,
    compiler::{EventKind, EventLog},
    ir::{BlockId, Function, Inst, InstId, IrType, Operand, RegId},
    Result,
};

/// A promotable stack slot.
struct Slot {
    reg: RegId,
    ty: IrType,
    inst: InstId,
}

/// Finds the allocas that can be promoted to registers.
fn promotable_slots(func: &Function) -> Vec<Slot> {
    let uses = func.uses_map();
    let mut slots = Vec::new();

    for &inst in func.block_insts(func.entry()) {
        let Inst::Alloca { dest, ty } = func.inst(inst) else {
            continue;
        };
        if ty.default_value().is_none() {
            continue;
        }
        let ptr = Operand::Reg(*dest);
        let only_memory_uses = uses[dest.index()].iter().all(|&user| match func.inst(user) {
            Inst::Load { ptr: p, .. } => *p == ptr,
            Inst::Store { value, ptr: p } => *p == ptr && *value != ptr,
            _ => false,
        });
        if only_memory_uses {
            slots.push(Slot {
                reg: *dest,
                ty: ty.clone(),
                inst,
            });
        }
    }
    slots
}

/// Promotes the promotable allocas of `func` to SSA registers.
///
/// Returns `true` if any alloca was promoted.
///
/// # Errors
///
/// Returns an invariant violation if the CFG contains unreachable blocks or if
/// a promoted local is read on a path where it was never assigned.
pub fn construct_ssa(func: &mut Function, events: &EventLog) -> Result<bool> {
    let slots = promotable_slots(func);
    if slots.is_empty() {
        return Ok(false);
    }
    let dom = DominanceInfo::compute(func)?;

    let slot_of: BTreeMap<RegId, usize> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| (s.reg, i))
        .collect();

    // Phi placement.
    let mut phi_at: BTreeMap<BlockId, Vec<(usize, RegId, InstId)>> = BTreeMap::new();
    for (index, slot) in slots.iter().enumerate() {
        let mut def_blocks: Vec<BlockId> = Vec::new();
        for (block, inst) in func.instructions() {
            if let Inst::Store { ptr, .. } = func.inst(inst) {
                if *ptr == Operand::Reg(slot.reg) && !def_blocks.contains(&block) {
                    def_blocks.push(block);
                }
            }
        }

        for block in dom.iterated_frontier(&def_blocks) {
            let base = func.reg_name(slot.reg).to_string();
            let dest = func.new_reg(&base, slot.ty.clone());
            let phi = func.insert_phi(
                block,
                Inst::Phi {
                    dest,
                    incoming: Vec::new(),
                },
            );
            phi_at.entry(block).or_default().push((index, dest, phi));
            events
                .record(EventKind::PhiInserted)
                .at(func.name(), block.index())
                .message(format!("phi for '{base}' in '{}'", func.block_name(block)));
        }
    }

    for slot in &slots {
        func.remove_inst(slot.inst);
    }

    let substitution = rename(func, &slots, &slot_of, &phi_at)?;
    apply_substitution(func, &substitution);

    log::trace!(
        "promoted {} slots of '{}' with {} phis",
        slots.len(),
        func.name(),
        phi_at.values().map(Vec::len).sum::<usize>()
    );
    Ok(true)
}

/// Walks the CFG and rewrites loads and stores of promoted slots.
///
/// Returns the register substitution produced by the deleted loads.
fn rename(
    func: &mut Function,
    slots: &[Slot],
    slot_of: &BTreeMap<RegId, usize>,
    phi_at: &BTreeMap<BlockId, Vec<(usize, RegId, InstId)>>,
) -> Result<BTreeMap<RegId, Operand>> {
    let mut substitution = BTreeMap::new();
    let mut out_table: Vec<Option<Vec<Option<Operand>>>> = vec![None; func.block_capacity()];
    let mut stack: Vec<(BlockId, Option<BlockId>)> = vec![(func.entry(), None)];

    while let Some((block, pred)) = stack.pop() {
        let incoming: Vec<Option<Operand>> = match pred {
            Some(p) => out_table[p.index()].clone().unwrap_or_else(|| vec![None; slots.len()]),
            None => vec![None; slots.len()],
        };

        if let (Some(p), Some(phis)) = (pred, phi_at.get(&block)) {
            for &(index, _, phi) in phis {
                let value = incoming[index]
                    .or_else(|| slots[index].ty.default_value().map(Operand::Const))
                    .unwrap_or(Operand::null());
                if let Inst::Phi { incoming, .. } = func.inst_mut(phi) {
                    incoming.push((value, p));
                }
            }
        }

        if out_table[block.index()].is_some() {
            continue;
        }

        let mut table = incoming;
        if let Some(phis) = phi_at.get(&block) {
            for &(index, dest, _) in phis {
                table[index] = Some(Operand::Reg(dest));
            }
        }

        for inst in func.block_insts(block).to_vec() {
            match func.inst(inst).clone() {
                Inst::Load { dest, ptr: Operand::Reg(ptr) } => {
                    let Some(&index) = slot_of.get(&ptr) else {
                        continue;
                    };
                    let Some(value) = table[index] else {
                        return Err(invariant_error!(
                            "'{}' reads local '{}' before any assignment in '{}'",
                            func.name(),
                            func.reg_name(ptr),
                            func.block_name(block)
                        ));
                    };
                    substitution.insert(dest, value);
                    func.remove_inst(inst);
                }
                Inst::Store { value, ptr: Operand::Reg(ptr) } => {
                    if let Some(&index) = slot_of.get(&ptr) {
                        table[index] = Some(value);
                        func.remove_inst(inst);
                    }
                }
                _ => {}
            }
        }

        out_table[block.index()] = Some(table);
        for &succ in func.succs(block).iter().rev() {
            stack.push((succ, Some(block)));
        }
    }

    Ok(substitution)
}

/// Follows substitution chains to the final value.
fn resolve(substitution: &BTreeMap<RegId, Operand>, mut op: Operand) -> Operand {
    while let Operand::Reg(r) = op {
        match substitution.get(&r) {
            Some(&next) => op = next,
            None => break,
        }
    }
    op
}

fn apply_substitution(func: &mut Function, substitution: &BTreeMap<RegId, Operand>) {
    if substitution.is_empty() {
        return;
    }
    let placed: Vec<InstId> = func.instructions().map(|(_, i)| i).collect();
    for inst in placed {
        for op in func.inst_mut(inst).operands_mut() {
            *op = resolve(substitution, *op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, FunctionBuilder, IcmpCond, Module, Param};

    fn count_insts(func: &Function, pred: impl Fn(&Inst) -> bool) -> usize {
        func.instructions().filter(|&(_, i)| pred(func.inst(i))).count()
    }

    #[test]
    fn test_straight_line_promotion() {
        let mut module = Module::new();
        let id = module.declare_function("f", IrType::I32, vec![Param::new("a", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let x = b.alloca("x", IrType::I32);
        b.store(Operand::Param(0), x);
        let v = b.load(IrType::I32, x);
        let w = b.binary(BinaryOp::Add, v, Operand::int(1));
        b.store(w, x);
        let r = b.load(IrType::I32, x);
        b.ret(Some(r));
        b.finish().unwrap();

        let func = module.function_mut(id);
        let events = EventLog::new();
        assert!(construct_ssa(func, &events).unwrap());
        assert_eq!(count_insts(func, |i| matches!(i, Inst::Alloca { .. })), 0);
        assert_eq!(count_insts(func, |i| matches!(i, Inst::Load { .. })), 0);
        assert_eq!(count_insts(func, |i| matches!(i, Inst::Store { .. })), 0);
        assert_eq!(count_insts(func, Inst::is_phi), 0);

        let ret = func.terminator(func.exit()).unwrap();
        match func.inst(ret) {
            Inst::Return { value: Some(Operand::Reg(r)) } => {
                let def = func.reg_def(*r).unwrap();
                assert!(matches!(
                    func.inst(def),
                    Inst::Binary { lhs: Operand::Param(0), .. }
                ));
            }
            other => panic!("unexpected return {other:?}"),
        }
    }

    #[test]
    fn test_loop_gets_header_phi() {
        let mut module = Module::new();
        let id = module.declare_function("count", IrType::I32, vec![Param::new("n", IrType::I32)]);
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
        let iv2 = b.load(IrType::I32, i);
        let next = b.binary(BinaryOp::Add, iv2, Operand::int(1));
        b.store(next, i);
        b.jump(header);
        b.position_at_end(done);
        let out = b.load(IrType::I32, i);
        b.ret(Some(out));
        b.finish().unwrap();

        let func = module.function_mut(id);
        let events = EventLog::new();
        construct_ssa(func, &events).unwrap();

        let phis = func.phis(header);
        assert_eq!(phis.len(), 1);
        match func.inst(phis[0]) {
            Inst::Phi { incoming, .. } => {
                assert_eq!(incoming.len(), 2);
                assert!(incoming.contains(&(Operand::int(0), func.entry())));
            }
            other => panic!("expected phi, got {other:?}"),
        }
        assert!(events.has(EventKind::PhiInserted));
        crate::ssa::verify_ssa(func).unwrap();
    }

    #[test]
    fn test_idempotent() {
        let mut module = Module::new();
        let id = module.declare_function("g", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let x = b.alloca("x", IrType::I32);
        b.store(Operand::int(1), x);
        b.ret(None);
        b.finish().unwrap();

        let func = module.function_mut(id);
        let events = EventLog::new();
        assert!(construct_ssa(func, &events).unwrap());
        assert!(!construct_ssa(func, &events).unwrap());
    }

    #[test]
    fn test_escaping_slot_is_kept() {
        let mut module = Module::new();
        let int_ptr = IrType::pointer_to(IrType::I32);
        let sink = module.declare_function("sink", IrType::Void, vec![Param::new("p", int_ptr)]);
        let id = module.declare_function("h", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let x = b.alloca("x", IrType::I32);
        b.store(Operand::int(1), x);
        b.call(sink, &IrType::Void, vec![x]);
        b.ret(None);
        b.finish().unwrap();

        let func = module.function_mut(id);
        assert!(!construct_ssa(func, &EventLog::new()).unwrap());
        assert_eq!(count_insts(func, |i| matches!(i, Inst::Alloca { .. })), 1);
    }

    #[test]
    fn test_read_before_write_is_rejected() {
        let mut module = Module::new();
        let id = module.declare_function("bad", IrType::I32, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let x = b.alloca("x", IrType::I32);
        let v = b.load(IrType::I32, x);
        b.ret(Some(v));
        b.finish().unwrap();

        assert!(construct_ssa(module.function_mut(id), &EventLog::new()).is_err());
    }
}
