//! RV32 register file description.
//!
//! The register file is an immutable value built once per compilation and
//! passed explicitly to instruction selection and register allocation.
//!
//! # Register Classes
//!
//! | Registers      | ABI role                        | Allocatable | Saved by |
//! |----------------|---------------------------------|-------------|----------|
//! | `zero`         | hard-wired zero                 | no          | -        |
//! | `ra`           | return address                  | yes         | caller   |
//! | `sp`, `gp`, `tp` | stack, global and thread pointers | no      | -        |
//! | `t0`-`t6`      | temporaries                     | yes         | caller   |
//! | `a0`-`a7`      | arguments, `a0` holds results   | yes         | caller   |
//! | `s0`-`s11`     | saved registers                 | yes         | callee   |
//!
//! This leaves 28 allocatable registers. Caller-saved registers come first in
//! allocation order so that short-lived values avoid the save cost of the
//! callee-saved set.

use std::fmt;

/// Number of integer argument registers.
pub const ARG_REGS: usize = 8;

/// A physical RV32 integer register, `x0` to `x31`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysReg(u8);

const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

impl PhysReg {
    /// Hard-wired zero.
    pub const ZERO: PhysReg = PhysReg(0);
    /// Return address.
    pub const RA: PhysReg = PhysReg(1);
    /// Stack pointer.
    pub const SP: PhysReg = PhysReg(2);
    /// Global pointer.
    pub const GP: PhysReg = PhysReg(3);
    /// Thread pointer.
    pub const TP: PhysReg = PhysReg(4);
    /// First temporary.
    pub const T0: PhysReg = PhysReg(5);
    /// First argument and return value register.
    pub const A0: PhysReg = PhysReg(10);

    /// Register `x{index}`. Returns `None` past `x31`.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().filter(|&i| i < 32).map(PhysReg)
    }

    /// Hardware index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// ABI name, as printed in assembly.
    #[must_use]
    pub fn name(self) -> &'static str {
        ABI_NAMES[self.index()]
    }

    /// Argument register `a{n}`.
    #[must_use]
    pub fn arg(n: usize) -> Option<Self> {
        (n < ARG_REGS).then(|| PhysReg(10 + n as u8))
    }
}

impl fmt::Debug for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register partitions of the target ABI.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    allocatable: Vec<PhysReg>,
    caller_saved: Vec<PhysReg>,
    callee_saved: Vec<PhysReg>,
}

impl RegisterFile {
    /// The standard RV32 integer register file.
    #[must_use]
    pub fn rv32() -> Self {
        let regs = |names: &[&str]| -> Vec<PhysReg> {
            names
                .iter()
                .filter_map(|n| ABI_NAMES.iter().position(|a| a == n))
                .filter_map(PhysReg::from_index)
                .collect()
        };
        let caller_saved = regs(&[
            "t0", "t1", "t2", "t3", "t4", "t5", "t6", "a0", "a1", "a2", "a3", "a4", "a5", "a6",
            "a7", "ra",
        ]);
        let callee_saved = regs(&[
            "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
        ]);
        let allocatable = caller_saved.iter().chain(&callee_saved).copied().collect();
        Self {
            allocatable,
            caller_saved,
            callee_saved,
        }
    }

    /// Registers available to the allocator, caller-saved first.
    #[must_use]
    pub fn allocatable(&self) -> &[PhysReg] {
        &self.allocatable
    }

    /// Registers a call may clobber.
    #[must_use]
    pub fn caller_saved(&self) -> &[PhysReg] {
        &self.caller_saved
    }

    /// Registers a function must preserve for its caller.
    #[must_use]
    pub fn callee_saved(&self) -> &[PhysReg] {
        &self.callee_saved
    }

    /// Returns `true` if the allocator may assign `reg`.
    #[must_use]
    pub fn is_allocatable(&self, reg: PhysReg) -> bool {
        self.allocatable.contains(&reg)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::rv32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rv32_partitions() {
        let rf = RegisterFile::rv32();
        assert_eq!(rf.allocatable().len(), 28);
        assert_eq!(rf.caller_saved().len(), 16);
        assert_eq!(rf.callee_saved().len(), 12);
        assert_eq!(rf.allocatable()[0].name(), "t0");
        for reserved in [PhysReg::ZERO, PhysReg::SP, PhysReg::GP, PhysReg::TP] {
            assert!(!rf.is_allocatable(reserved));
        }
    }

    #[test]
    fn test_argument_registers() {
        assert_eq!(PhysReg::arg(0), Some(PhysReg::A0));
        assert_eq!(PhysReg::arg(7).map(PhysReg::name), Some("a7"));
        assert_eq!(PhysReg::arg(8), None);
    }
}
