//! Helpers shared by several passes.

use crate::{
    analysis::FunctionCfg,
    compiler::{EventKind, EventLog},
    ir::{BlockId, Function, Inst, InstId, Operand},
};

/// Deletes every block that cannot be reached from the entry.
///
/// Phi operands flowing out of the deleted blocks are dropped. Returns `true`
/// if any block was removed.
pub(crate) fn remove_unreachable_blocks(func: &mut Function, events: &EventLog) -> bool {
    let reachable = FunctionCfg::new(func).reachable();
    let dead: Vec<BlockId> = func
        .blocks()
        .iter()
        .copied()
        .filter(|b| !reachable.get(b.index()).copied().unwrap_or(false))
        .collect();

    for &block in &dead {
        events
            .record(EventKind::BlockRemoved)
            .at(func.name(), block.index())
            .message(format!("unreachable block '{}'", func.block_name(block)));
        func.remove_block(block);
    }
    !dead.is_empty()
}

/// Rewrites a conditional branch on a constant into a jump.
///
/// The untaken successor loses its phi operands from `block`. Returns `true`
/// if the terminator was rewritten.
pub(crate) fn fold_constant_branch(func: &mut Function, block: BlockId, events: &EventLog) -> bool {
    let Some(term) = func.terminator(block) else {
        return false;
    };
    let Inst::Branch {
        cond,
        then_bb,
        else_bb,
    } = *func.inst(term)
    else {
        return false;
    };

    let (taken, untaken) = if then_bb == else_bb {
        (then_bb, None)
    } else {
        match cond.as_int() {
            Some(0) => (else_bb, Some(then_bb)),
            Some(_) => (then_bb, Some(else_bb)),
            None => return false,
        }
    };

    func.set_terminator(block, Inst::Jump { target: taken });
    if let Some(untaken) = untaken {
        func.remove_phi_incoming(untaken, block);
    }
    events
        .record(EventKind::BranchSimplified)
        .at(func.name(), block.index())
        .message(format!(
            "branch in '{}' now jumps to '{}'",
            func.block_name(block),
            func.block_name(taken)
        ));
    true
}

/// The single value a phi always produces, ignoring references to itself.
///
/// Returns `None` when the phi merges different values.
pub(crate) fn trivial_phi_value(func: &Function, phi: InstId) -> Option<Operand> {
    let Inst::Phi { dest, incoming } = func.inst(phi) else {
        return None;
    };
    let own = Operand::Reg(*dest);
    let mut unique = None;
    for (value, _) in incoming {
        if *value == own {
            continue;
        }
        match unique {
            None => unique = Some(*value),
            Some(seen) if seen == *value => {}
            Some(_) => return None,
        }
    }
    unique
}

/// Returns `true` for instructions that only compute a register from their
/// operands and can be duplicated, moved or dropped freely.
pub(crate) fn is_pure(inst: &Inst) -> bool {
    match inst {
        Inst::Binary { op, rhs, .. } => !op.may_trap() || rhs.as_int().is_some_and(|v| v != 0),
        Inst::Icmp { .. } | Inst::Gep { .. } | Inst::BitCast { .. } => true,
        _ => false,
    }
}
