//! Stack frame layout.
//!
//! Frames grow downward and `sp` stays fixed for the body of the function.
//! Offsets are relative to `sp` after the prologue:
//!
//! ```text
//!   high  ┌───────────────────────┐  sp + size + 4*(i-8)  incoming arg i
//!         ├───────────────────────┤  sp + size
//!         │ saved ra (with calls) │
//!         ├───────────────────────┤
//!         │ locals                │  one slot per alloca
//!         ├───────────────────────┤
//!         │ spills                │  one word per spilled register
//!         ├───────────────────────┤
//!         │ outgoing args         │  args past a7 of any call
//!   low   └───────────────────────┘  sp
//! ```
//!
//! The total size is rounded up to 16 bytes.

use crate::backend::{
    mir::{is_imm12, Address, AluImmOp, AluOp, Imm, MFunction, MInst, Reg, StackSlot, Width},
    target::PhysReg,
};

/// Stack alignment required by the calling convention.
pub const STACK_ALIGN: u32 = 16;

/// Stack objects of one function.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    locals: Vec<u32>,
    spills: usize,
    outgoing_args: usize,
    has_calls: bool,
}

impl Frame {
    /// Reserves a stack object of `size` bytes for an `alloca`.
    pub fn add_local(&mut self, size: u32) -> StackSlot {
        self.locals.push(size.max(1).div_ceil(4) * 4);
        StackSlot::Local(self.locals.len() - 1)
    }

    /// Reserves a word for a spilled register.
    pub fn add_spill(&mut self) -> StackSlot {
        self.spills += 1;
        StackSlot::Spill(self.spills - 1)
    }

    /// Records a call site passing `args` arguments.
    pub fn note_call(&mut self, args: usize) {
        self.has_calls = true;
        self.outgoing_args = self
            .outgoing_args
            .max(args.saturating_sub(super::target::ARG_REGS));
    }

    /// Returns `true` if the function contains a call.
    #[must_use]
    pub fn has_calls(&self) -> bool {
        self.has_calls
    }

    /// Number of spill slots.
    #[must_use]
    pub fn spill_count(&self) -> usize {
        self.spills
    }

    fn outgoing_bytes(&self) -> u32 {
        u32::try_from(self.outgoing_args * 4).unwrap_or(u32::MAX)
    }

    fn spill_bytes(&self) -> u32 {
        u32::try_from(self.spills * 4).unwrap_or(u32::MAX)
    }

    fn local_bytes(&self) -> u32 {
        self.locals.iter().sum()
    }

    fn ra_offset(&self) -> u32 {
        self.outgoing_bytes() + self.spill_bytes() + self.local_bytes()
    }

    /// Frame size in bytes, a multiple of [`STACK_ALIGN`].
    #[must_use]
    pub fn size(&self) -> u32 {
        let used = self.ra_offset() + if self.has_calls { 4 } else { 0 };
        used.div_ceil(STACK_ALIGN) * STACK_ALIGN
    }

    /// `sp`-relative offset of a slot.
    #[must_use]
    pub fn offset(&self, slot: StackSlot) -> i32 {
        let offset = match slot {
            StackSlot::OutgoingArg(i) => 4 * i as u32,
            StackSlot::Spill(i) => self.outgoing_bytes() + 4 * i as u32,
            StackSlot::Local(i) => {
                self.outgoing_bytes() + self.spill_bytes() + self.locals[..i].iter().sum::<u32>()
            }
            StackSlot::ReturnAddress => self.ra_offset(),
            StackSlot::IncomingArg(i) => self.size() + 4 * i as u32,
        };
        i32::try_from(offset).unwrap_or(i32::MAX)
    }
}

/// Adds the stack adjustment and the return address save to an allocated
/// function.
///
/// The prologue goes to the top of the entry block and an epilogue before
/// every `ret`. Frames too large for a 12-bit immediate adjust `sp` through
/// `t0`, which carries no value at either point.
pub fn insert_prologue_epilogue(func: &mut MFunction) {
    let size = i32::try_from(func.frame.size()).unwrap_or(i32::MAX);
    let has_calls = func.frame.has_calls();
    let ra_slot = Address::Frame {
        slot: StackSlot::ReturnAddress,
        offset: 0,
    };

    let mut prologue = adjust_sp(-size);
    if has_calls {
        prologue.push(MInst::Store {
            width: Width::Word,
            rs: Reg::Phys(PhysReg::RA),
            addr: ra_slot.clone(),
        });
    }
    let mut epilogue = Vec::new();
    if has_calls {
        epilogue.push(MInst::Load {
            width: Width::Word,
            rd: Reg::Phys(PhysReg::RA),
            addr: ra_slot,
        });
    }
    epilogue.extend(adjust_sp(size));

    for block in &mut func.blocks {
        let mut insts = Vec::with_capacity(block.insts.len() + epilogue.len());
        for inst in block.insts.drain(..) {
            if matches!(inst, MInst::Ret { .. }) {
                insts.extend(epilogue.iter().cloned());
            }
            insts.push(inst);
        }
        block.insts = insts;
    }
    if let Some(entry) = func.blocks.first_mut() {
        entry.insts.splice(0..0, prologue);
    }
}

fn adjust_sp(amount: i32) -> Vec<MInst> {
    let sp = Reg::Phys(PhysReg::SP);
    if amount == 0 {
        Vec::new()
    } else if is_imm12(amount) {
        vec![MInst::AluImm {
            op: AluImmOp::Addi,
            rd: sp,
            rs1: sp,
            imm: Imm::Int(amount),
        }]
    } else {
        let t0 = Reg::Phys(PhysReg::T0);
        vec![
            MInst::Li { rd: t0, imm: amount },
            MInst::Alu {
                op: AluOp::Add,
                rd: sp,
                rs1: sp,
                rs2: t0,
            },
        ]
    }
}
