//! Peephole cleanup of allocated machine code.
//!
//! Three local rewrites, applied until none fires:
//!
//! - a `j` to the block that follows in layout is dropped
//! - a `mv` whose source and destination coincide is dropped
//! - a load reading the address the previous instruction stored to becomes a
//!   `mv` from the stored register, or disappears if the registers coincide
//!
//! Forwarding is limited to word accesses: `lb` sign-extends, so a byte
//! reload may differ from the register that was stored.

use crate::{
    backend::mir::{MBlockId, MFunction, MInst, Width},
    compiler::{EventKind, EventLog},
};

/// Applies the peephole rewrites to `func` and returns how many fired.
pub fn run_peephole(func: &mut MFunction, events: &EventLog) -> usize {
    let mut total = 0;
    loop {
        let applied = forward_stores(func) + remove_self_moves(func) + drop_fall_through(func);
        if applied == 0 {
            break;
        }
        total += applied;
    }
    if total > 0 {
        log::trace!("peephole rewrote {total} instructions in '{}'", func.name);
        events
            .record(EventKind::PeepholeApplied)
            .function(func.name.clone())
            .message(format!("{total} peephole rewrites"));
    }
    total
}

fn drop_fall_through(func: &mut MFunction) -> usize {
    let mut count = 0;
    for index in 0..func.blocks.len() {
        let next = MBlockId(index + 1);
        let block = &mut func.blocks[index];
        if block.insts.last() == Some(&MInst::Jump { target: next }) {
            block.insts.pop();
            count += 1;
        }
    }
    count
}

fn remove_self_moves(func: &mut MFunction) -> usize {
    let mut count = 0;
    for block in &mut func.blocks {
        let before = block.insts.len();
        block
            .insts
            .retain(|inst| !matches!(inst.as_move(), Some((rd, rs)) if rd == rs));
        count += before - block.insts.len();
    }
    count
}

fn forward_stores(func: &mut MFunction) -> usize {
    let mut count = 0;
    for block in &mut func.blocks {
        for i in 1..block.insts.len() {
            let forwarded = match (&block.insts[i - 1], &block.insts[i]) {
                (
                    MInst::Store {
                        width: sw,
                        rs,
                        addr: stored,
                    },
                    MInst::Load {
                        width: lw,
                        rd,
                        addr: loaded,
                    },
                ) if *sw == Width::Word && *lw == Width::Word && stored == loaded => {
                    Some(MInst::Mv { rd: *rd, rs: *rs })
                }
                _ => None,
            };
            if let Some(mv) = forwarded {
                block.insts[i] = mv;
                count += 1;
            }
        }
    }
    count
}
