//! Structural checks of SSA form.

use std::collections::BTreeSet;

use crate::{
    analysis::DominanceInfo,
    ir::{BlockId, Function, Inst, Operand},
    Result,
};

/// Checks that `func` is in well-formed SSA form.
///
/// The following must hold:
///
/// - every block ends in exactly one terminator
/// - phis appear only at the head of a block, with exactly one operand per
///   predecessor
/// - every register is defined by at most one placed instruction
/// - every use is dominated by its definition (for phi operands, the
///   definition dominates the end of the incoming predecessor)
///
/// # Errors
///
/// Returns an invariant violation describing the first broken property.
pub fn verify_ssa(func: &Function) -> Result<()> {
    let dom = DominanceInfo::compute(func)?;
    let mut def_site: Vec<Option<(BlockId, usize)>> = vec![None; func.reg_count()];

    for &block in func.blocks() {
        let insts = func.block_insts(block);
        let Some(&last) = insts.last() else {
            return Err(invariant_error!(
                "block '{}' of '{}' is empty",
                func.block_name(block),
                func.name()
            ));
        };
        if !func.inst(last).is_terminator() {
            return Err(invariant_error!(
                "block '{}' of '{}' does not end in a terminator",
                func.block_name(block),
                func.name()
            ));
        }

        let mut in_phi_prefix = true;
        for (pos, &inst) in insts.iter().enumerate() {
            let data = func.inst(inst);
            if data.is_terminator() && pos + 1 != insts.len() {
                return Err(invariant_error!(
                    "terminator in the middle of '{}'",
                    func.block_name(block)
                ));
            }
            if data.is_phi() {
                if !in_phi_prefix {
                    return Err(invariant_error!(
                        "phi after a non-phi instruction in '{}'",
                        func.block_name(block)
                    ));
                }
                check_phi_edges(func, block, data)?;
            } else {
                in_phi_prefix = false;
            }

            for def in data.defs() {
                if def_site[def.index()].is_some() {
                    return Err(invariant_error!(
                        "register {} of '{}' is defined more than once",
                        func.reg_name(def),
                        func.name()
                    ));
                }
                def_site[def.index()] = Some((block, pos));
            }
        }
    }

    for &block in func.blocks() {
        for (pos, &inst) in func.block_insts(block).iter().enumerate() {
            match func.inst(inst) {
                Inst::Phi { incoming, .. } => {
                    for (value, pred) in incoming {
                        if let Operand::Reg(r) = value {
                            let Some((def_block, _)) = def_site[r.index()] else {
                                return Err(undefined(func, *r));
                            };
                            if !dom.dominates(def_block, *pred) {
                                return Err(invariant_error!(
                                    "phi operand {} does not reach the edge from '{}'",
                                    func.reg_name(*r),
                                    func.block_name(*pred)
                                ));
                            }
                        }
                    }
                }
                other => {
                    for r in other.used_regs() {
                        let Some((def_block, def_pos)) = def_site[r.index()] else {
                            return Err(undefined(func, r));
                        };
                        let dominated = if def_block == block {
                            def_pos < pos
                        } else {
                            dom.dominates(def_block, block)
                        };
                        if !dominated {
                            return Err(invariant_error!(
                                "use of {} in '{}' is not dominated by its definition",
                                func.reg_name(r),
                                func.block_name(block)
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn undefined(func: &Function, reg: crate::ir::RegId) -> crate::Error {
    invariant_error!(
        "register {} of '{}' is used but never defined",
        func.reg_name(reg),
        func.name()
    )
}

fn check_phi_edges(func: &Function, block: BlockId, phi: &Inst) -> Result<()> {
    let Inst::Phi { incoming, .. } = phi else {
        return Ok(());
    };
    let preds: BTreeSet<BlockId> = func.preds(block).iter().copied().collect();
    let sources: BTreeSet<BlockId> = incoming.iter().map(|(_, b)| *b).collect();
    if incoming.len() != preds.len() || sources != preds {
        return Err(invariant_error!(
            "phi in '{}' of '{}' has {} operands for {} predecessors",
            func.block_name(block),
            func.name(),
            incoming.len(),
            preds.len()
        ));
    }
    Ok(())
}
