//! Liveness analysis over machine IR.
//!
//! Classic backward dataflow on bit sets indexed by [`Reg::index`]:
//!
//! ```text
//! LiveOut(b) = ∪ LiveIn(s) for s in succ(b)
//! LiveIn(b)  = UEVar(b) ∪ (LiveOut(b) − VarKill(b))
//! ```
//!
//! Blocks are visited in reverse layout order until no set changes. Physical
//! registers take part like any other register, so the implicit uses and
//! definitions of calls and returns shape the live ranges.

use crate::{
    backend::{
        mir::{MFunction, Reg},
        target::RegisterFile,
    },
    utils::BitSet,
};

/// Per-block live-in and live-out sets.
#[derive(Debug, Clone)]
pub struct Liveness {
    live_in: Vec<BitSet>,
    live_out: Vec<BitSet>,
}

impl Liveness {
    /// Computes liveness for every block of `func`.
    ///
    /// `func` must have up-to-date successor lists.
    #[must_use]
    pub fn compute(func: &MFunction, rf: &RegisterFile) -> Self {
        let space = func.reg_space();
        let count = func.blocks.len();
        let mut ue_var = vec![BitSet::new(space); count];
        let mut var_kill = vec![BitSet::new(space); count];

        for (index, block) in func.blocks.iter().enumerate() {
            for inst in &block.insts {
                for reg in inst.uses(rf) {
                    if !var_kill[index].contains(reg.index()) {
                        ue_var[index].insert(reg.index());
                    }
                }
                for reg in inst.defs(rf) {
                    var_kill[index].insert(reg.index());
                }
            }
        }

        let mut live_in = ue_var.clone();
        let mut live_out = vec![BitSet::new(space); count];
        let mut changed = true;
        let mut rounds = 0usize;
        while changed {
            changed = false;
            rounds += 1;
            for index in (0..count).rev() {
                let mut out = BitSet::new(space);
                for succ in &func.blocks[index].succs {
                    out.union_with(&live_in[succ.0]);
                }
                if out != live_out[index] {
                    let mut inn = out.clone();
                    inn.difference_with(&var_kill[index]);
                    inn.union_with(&ue_var[index]);
                    live_in[index] = inn;
                    live_out[index] = out;
                    changed = true;
                }
            }
        }
        log::trace!("liveness of '{}' converged after {rounds} rounds", func.name);

        Self { live_in, live_out }
    }

    /// Registers live on entry to block `index`.
    #[must_use]
    pub fn live_in(&self, index: usize) -> &BitSet {
        &self.live_in[index]
    }

    /// Registers live on exit from block `index`.
    #[must_use]
    pub fn live_out(&self, index: usize) -> &BitSet {
        &self.live_out[index]
    }

    /// Returns `true` if `reg` is live on exit from block `index`.
    #[must_use]
    pub fn is_live_out(&self, index: usize, reg: Reg) -> bool {
        self.live_out[index].contains(reg.index())
    }
}
