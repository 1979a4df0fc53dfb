//! Phi elimination.
//!
//! Leaving SSA form happens in two steps:
//!
//! 1. **Parallel copies**: for every block with phis, each incoming edge gets a
//!    [`Inst::ParallelCopy`] holding one `dest <- value` pair per phi. The copy
//!    is placed before the terminator of the predecessor; when the predecessor
//!    has several successors the edge is critical and is split by a new block
//!    that carries only the copy and a jump. A block with a single predecessor
//!    needs no copy at all: its phis are replaced by their only operand.
//! 2. **Sequentialization**: every parallel copy is turned into ordinary
//!    `move`s. A move may be emitted once its destination is no longer read by
//!    another pending move; when only cycles remain, one source is first saved
//!    in a fresh temporary.

use crate::{
    compiler::{EventKind, EventLog},
    ir::{BlockId, Function, Inst, InstId, Operand, RegId},
    Result,
};

/// Replaces every phi of `func` by copies and sequentializes them.
///
/// Returns `true` if the function changed.
///
/// # Errors
///
/// Returns an invariant violation if a phi lacks an operand for one of the
/// predecessors of its block.
pub fn destruct_ssa(func: &mut Function, events: &EventLog) -> Result<bool> {
    let mut changed = false;
    for block in func.blocks().to_vec() {
        if !func.phis(block).is_empty() {
            eliminate_phis(func, block, events)?;
            changed = true;
        }
    }

    for block in func.blocks().to_vec() {
        let copies: Vec<InstId> = func
            .block_insts(block)
            .iter()
            .copied()
            .filter(|&i| matches!(func.inst(i), Inst::ParallelCopy { .. }))
            .collect();
        for copy in copies {
            sequentialize(func, copy);
            changed = true;
        }
    }
    Ok(changed)
}

fn phi_value(func: &Function, phi: InstId, pred: BlockId) -> Result<(RegId, Operand)> {
    match func.inst(phi) {
        Inst::Phi { dest, incoming } => incoming
            .iter()
            .find(|(_, b)| *b == pred)
            .map(|(v, _)| (*dest, *v))
            .ok_or_else(|| {
                invariant_error!(
                    "phi {} in '{}' has no operand for predecessor '{}'",
                    func.reg_name(*dest),
                    func.name(),
                    func.block_name(pred)
                )
            }),
        other => Err(invariant_error!("expected phi, found {}", other.mnemonic())),
    }
}

fn eliminate_phis(func: &mut Function, block: BlockId, events: &EventLog) -> Result<()> {
    let phis = func.phis(block);
    let preds = func.preds(block).to_vec();

    if preds.len() == 1 {
        for phi in phis {
            let (dest, value) = phi_value(func, phi, preds[0])?;
            func.remove_inst(phi);
            func.replace_all_uses(Operand::Reg(dest), value);
            events
                .record(EventKind::PhiEliminated)
                .at(func.name(), block.index())
                .message(format!("single-operand phi {}", func.reg_name(dest)));
        }
        return Ok(());
    }

    for pred in preds {
        let mut moves = Vec::with_capacity(phis.len());
        for &phi in &phis {
            moves.push(phi_value(func, phi, pred)?);
        }

        let carrier = if func.succs(pred).len() > 1 {
            let split = func.add_block_before(block, "critical");
            func.retarget(pred, block, split);
            func.append_inst(split, Inst::Jump { target: block });
            func.retarget_phis(block, pred, split);
            events
                .record(EventKind::EdgeSplit)
                .at(func.name(), split.index())
                .message(format!(
                    "split '{}' -> '{}'",
                    func.block_name(pred),
                    func.block_name(block)
                ));
            split
        } else {
            pred
        };

        func.insert_before_terminator(carrier, Inst::ParallelCopy { moves });
    }

    for phi in phis {
        if let Some(dest) = func.inst(phi).def() {
            events
                .record(EventKind::PhiEliminated)
                .at(func.name(), block.index())
                .message(format!("phi {} lowered to copies", func.reg_name(dest)));
        }
        func.remove_inst(phi);
    }
    Ok(())
}

/// Orders the moves of a parallel copy so that no source is overwritten
/// before it is read.
///
/// Returns the sequential moves; cycle-breaking temporaries are allocated in
/// `func`.
fn order_moves(func: &mut Function, mut pending: Vec<(RegId, Operand)>) -> Vec<(RegId, Operand)> {
    pending.retain(|(dest, src)| *src != Operand::Reg(*dest));
    let mut ordered = Vec::with_capacity(pending.len() + 1);

    while !pending.is_empty() {
        let ready = pending.iter().position(|(dest, _)| {
            !pending
                .iter()
                .any(|(_, src)| *src == Operand::Reg(*dest))
        });

        match ready {
            Some(index) => ordered.push(pending.remove(index)),
            None => {
                let (dest, src) = pending[0];
                let ty = func.reg_ty(dest).clone();
                let temp = func.new_reg("cycle", ty);
                ordered.push((temp, src));
                pending[0].1 = Operand::Reg(temp);
            }
        }
    }
    ordered
}

fn sequentialize(func: &mut Function, copy: InstId) {
    let Inst::ParallelCopy { moves } = func.inst(copy).clone() else {
        return;
    };
    for (dest, src) in order_moves(func, moves) {
        func.insert_before(copy, Inst::Move { dest, src });
    }
    func.remove_inst(copy);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IcmpCond, IrType, Param};

    /// entry -> {left, right} -> merge, with a phi in merge.
    fn diamond_with_phi() -> (Function, BlockId, RegId) {
        let mut f = Function::new("d", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let entry = f.add_block("entry");
        let left = f.add_block("left");
        let right = f.add_block("right");
        let merge = f.add_block("merge");
        f.set_entry(entry);
        f.set_exit(merge);
        let c = f.new_reg("c", IrType::I1);
        f.append_inst(
            entry,
            Inst::Icmp {
                cond: IcmpCond::Sgt,
                dest: c,
                lhs: Operand::Param(0),
                rhs: Operand::int(0),
            },
        );
        f.append_inst(
            entry,
            Inst::Branch {
                cond: Operand::Reg(c),
                then_bb: left,
                else_bb: right,
            },
        );
        f.append_inst(left, Inst::Jump { target: merge });
        f.append_inst(right, Inst::Jump { target: merge });
        let p = f.new_reg("p", IrType::I32);
        f.append_inst(
            merge,
            Inst::Phi {
                dest: p,
                incoming: vec![(Operand::int(1), left), (Operand::int(2), right)],
            },
        );
        f.append_inst(
            merge,
            Inst::Return {
                value: Some(Operand::Reg(p)),
            },
        );
        (f, merge, p)
    }

    #[test]
    fn test_phi_becomes_moves_in_predecessors() {
        let (mut f, merge, p) = diamond_with_phi();
        let events = EventLog::new();
        assert!(destruct_ssa(&mut f, &events).unwrap());
        assert!(f.phis(merge).is_empty());

        let moves: Vec<(BlockId, Operand)> = f
            .instructions()
            .filter_map(|(b, i)| match f.inst(i) {
                Inst::Move { dest, src } if *dest == p => Some((b, *src)),
                _ => None,
            })
            .collect();
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().any(|(_, s)| *s == Operand::int(1)));
        assert!(moves.iter().any(|(_, s)| *s == Operand::int(2)));
        assert!(!events.has(EventKind::EdgeSplit));
        assert!(!f.is_not_functional());
    }

    #[test]
    fn test_critical_edge_is_split() {
        let (mut f, merge, _) = diamond_with_phi();
        // Make entry -> merge a critical edge by bypassing `right`.
        let entry = f.entry();
        let right = f.blocks()[2];
        f.retarget(entry, right, merge);
        f.remove_block(right);
        if let Inst::Phi { incoming, .. } = f.inst_mut(f.phis(merge)[0]) {
            incoming.push((Operand::int(2), entry));
        }

        let events = EventLog::new();
        destruct_ssa(&mut f, &events).unwrap();
        assert_eq!(events.count_kind(EventKind::EdgeSplit), 1);
        for &pred in f.preds(merge) {
            assert_eq!(f.succs(pred).len(), 1);
        }
    }

    #[test]
    fn test_swap_cycle_uses_temporary() {
        let mut f = Function::new("s", IrType::Void, vec![]);
        let a = f.new_reg("a", IrType::I32);
        let b = f.new_reg("b", IrType::I32);
        let moves = order_moves(
            &mut f,
            vec![(a, Operand::Reg(b)), (b, Operand::Reg(a))],
        );
        assert_eq!(moves.len(), 3);
        let temp = moves[0].0;
        assert_eq!(moves[0].1, Operand::Reg(b));
        assert_eq!(moves[1], (b, Operand::Reg(a)));
        assert_eq!(moves[2], (a, Operand::Reg(temp)));
    }

    #[test]
    fn test_chain_is_ordered_without_temporary() {
        let mut f = Function::new("c", IrType::Void, vec![]);
        let a = f.new_reg("a", IrType::I32);
        let b = f.new_reg("b", IrType::I32);
        let c = f.new_reg("c", IrType::I32);
        // a <- b, b <- c: b must be read before it is overwritten.
        let moves = order_moves(
            &mut f,
            vec![(b, Operand::Reg(c)), (a, Operand::Reg(b)), (c, Operand::Reg(c))],
        );
        assert_eq!(moves, vec![(a, Operand::Reg(b)), (b, Operand::Reg(c))]);
    }
}
