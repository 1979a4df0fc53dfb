//! Control flow simplification.
//!
//! Repeats three local rewrites until none applies:
//!
//! 1. **Branch folding**: a conditional branch whose targets coincide, or whose
//!    condition is a constant, becomes an unconditional jump. The untaken
//!    successor loses the phi operands contributed by the block.
//! 2. **Unreachable block removal**: every block no longer reachable from the
//!    entry is deleted together with its phi contributions.
//! 3. **Block merging**: a block ending in a jump to a successor that has no
//!    other predecessor absorbs that successor.
//!
//! ```text
//! entry:                         entry:
//!     br true, then, else            x = add a, 1
//! then:                   =>         ret x
//!     x = add a, 1
//!     jump exit
//! else: ...
//! ```
//!
//! The pass iterates internally, so a second run over its own output reports
//! no change.

use crate::{
    compiler::{
        context::CompilerContext,
        passes::utils::{fold_constant_branch, remove_unreachable_blocks},
        pass::SsaPass,
        EventKind, EventLog,
    },
    ir::{BlockId, FuncId, Function, Inst, Module, Operand},
    Result,
};

/// Branch folding, block merging and unreachable block removal.
pub struct ControlFlowSimplificationPass;

impl Default for ControlFlowSimplificationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowSimplificationPass {
    /// Creates a new control flow simplification pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Simplifies `func` to a fixpoint.
    ///
    /// Exposed separately because the driver runs it once before SSA
    /// construction, where dominance requires every block to be reachable.
    ///
    /// # Returns
    ///
    /// `true` if anything changed.
    pub fn simplify(func: &mut Function, events: &EventLog) -> bool {
        let mut changed = false;
        loop {
            let mut round = false;
            for block in func.blocks().to_vec() {
                if func.is_live_block(block) {
                    round |= fold_constant_branch(func, block, events);
                }
            }
            round |= remove_unreachable_blocks(func, events);
            round |= Self::merge_blocks(func, events);

            if !round {
                break;
            }
            changed = true;
        }
        changed
    }

    /// The block `block` can absorb, if any.
    fn merge_candidate(func: &Function, block: BlockId) -> Option<BlockId> {
        let term = func.terminator(block)?;
        let Inst::Jump { target } = *func.inst(term) else {
            return None;
        };
        let mergeable = target != block
            && target != func.entry()
            && func.preds(target).len() == 1
            && func.preds(target)[0] == block;
        mergeable.then_some(target)
    }

    /// Merges every single-predecessor successor into its predecessor.
    fn merge_blocks(func: &mut Function, events: &EventLog) -> bool {
        let mut changed = false;
        for block in func.blocks().to_vec() {
            if !func.is_live_block(block) {
                continue;
            }
            while let Some(succ) = Self::merge_candidate(func, block) {
                Self::absorb(func, block, succ);
                events
                    .record(EventKind::BlockMerged)
                    .at(func.name(), block.index())
                    .message(format!("merged bb{} into '{}'", succ.index(), func.block_name(block)));
                changed = true;
            }
        }
        changed
    }

    /// Moves the instructions of `succ` to the end of `block` and deletes `succ`.
    fn absorb(func: &mut Function, block: BlockId, succ: BlockId) {
        // With a single predecessor every phi has a single operand.
        for phi in func.phis(succ) {
            if let Inst::Phi { dest, incoming } = func.inst(phi).clone() {
                func.remove_inst(phi);
                if let Some(&(value, _)) = incoming.first() {
                    func.replace_all_uses(Operand::Reg(dest), value);
                }
            }
        }

        if let Some(jump) = func.terminator(block) {
            func.remove_inst(jump);
        }
        for next in func.succs(succ).to_vec() {
            func.retarget_phis(next, succ, block);
        }
        for inst in func.block_insts(succ).to_vec() {
            func.move_before_terminator(inst, block);
        }
        func.refresh_edges(block);
        func.remove_block(succ);

        if func.exit() == succ {
            func.set_exit(block);
        }
    }
}

impl SsaPass for ControlFlowSimplificationPass {
    fn name(&self) -> &'static str {
        "cfg-simplification"
    }

    fn description(&self) -> &'static str {
        "Folds constant branches, merges straight-line blocks and removes unreachable blocks"
    }

    fn run_on_function(
        &self,
        func: &mut Function,
        _id: FuncId,
        _module: &Module,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        Ok(Self::simplify(func, &ctx.events))
    }
}
