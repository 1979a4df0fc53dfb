//! Pre-SSA function construction.
//!
//! [`FunctionBuilder`] produces functions in the shape a frontend emits: locals live
//! in `alloca` slots accessed through loads and stores, and every `return` funnels
//! into one exit block. SSA construction later promotes the slots to registers.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ssaforge::ir::{FunctionBuilder, IrType, Module, Operand, Param, BinaryOp};
//!
//! let mut module = Module::new();
//! let id = module.declare_function("inc", IrType::I32, vec![Param::new("x", IrType::I32)]);
//! let mut b = FunctionBuilder::new(module.function_mut(id));
//! let sum = b.binary(BinaryOp::Add, Operand::Param(0), Operand::int(1));
//! b.ret(Some(sum));
//! b.finish()?;
//! ```

use crate::{
    ir::{BinaryOp, BlockId, FuncId, Function, IcmpCond, Inst, IrType, Operand, RegId},
    Result,
};

/// Builds the body of a [`Function`].
pub struct FunctionBuilder<'a> {
    func: &'a mut Function,
    current: BlockId,
    entry: BlockId,
    exit: BlockId,
    retval: Option<RegId>,
}

impl<'a> FunctionBuilder<'a> {
    /// Starts building `func`, creating its entry and exit blocks.
    pub fn new(func: &'a mut Function) -> Self {
        let entry = func.add_block("entry");
        let exit = func.add_block("exit");
        func.set_entry(entry);
        func.set_exit(exit);

        let ret_ty = func.ret_ty().clone();
        let mut builder = FunctionBuilder {
            func,
            current: entry,
            entry,
            exit,
            retval: None,
        };
        if !ret_ty.is_void() {
            let slot = builder.alloca("retval", ret_ty);
            builder.retval = slot.as_reg();
        }
        builder
    }

    /// The function under construction.
    #[must_use]
    pub fn function(&self) -> &Function {
        self.func
    }

    /// Block receiving new instructions.
    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Entry block.
    #[must_use]
    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// Creates a new block placed before the exit block.
    pub fn new_block(&mut self, name: &str) -> BlockId {
        self.func.add_block_before(self.exit, name)
    }

    /// Directs subsequent instructions to the end of `block`.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Returns `true` if the current block already ends in a terminator.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.func.terminator(self.current).is_some()
    }

    fn emit(&mut self, inst: Inst) {
        self.func.append_inst(self.current, inst);
    }

    fn defining(&mut self, name: &str, ty: IrType, make: impl FnOnce(RegId) -> Inst) -> Operand {
        let dest = self.func.new_reg(name, ty);
        let inst = make(dest);
        self.emit(inst);
        Operand::Reg(dest)
    }

    /// Allocates a stack slot of type `ty` in the entry block and returns its address.
    pub fn alloca(&mut self, name: &str, ty: IrType) -> Operand {
        let dest = self.func.new_reg(name, IrType::pointer_to(ty.clone()));
        let pos = self
            .func
            .block_insts(self.entry)
            .iter()
            .take_while(|&&i| matches!(self.func.inst(i), Inst::Alloca { .. }))
            .count();
        self.func
            .insert_inst(self.entry, pos, Inst::Alloca { dest, ty });
        Operand::Reg(dest)
    }

    /// `load ty, ptr`
    pub fn load(&mut self, ty: IrType, ptr: Operand) -> Operand {
        self.defining("ld", ty, |dest| Inst::Load { dest, ptr })
    }

    /// `store value, ptr`
    pub fn store(&mut self, value: Operand, ptr: Operand) {
        self.emit(Inst::Store { value, ptr });
    }

    /// Integer binary operation.
    pub fn binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand) -> Operand {
        self.defining(&op.to_string(), IrType::I32, |dest| Inst::Binary {
            op,
            dest,
            lhs,
            rhs,
        })
    }

    /// Integer or pointer comparison.
    pub fn icmp(&mut self, cond: IcmpCond, lhs: Operand, rhs: Operand) -> Operand {
        self.defining(&cond.to_string(), IrType::I1, |dest| Inst::Icmp {
            cond,
            dest,
            lhs,
            rhs,
        })
    }

    /// Address computation producing a value of type `result_ty`.
    pub fn gep(&mut self, result_ty: IrType, ptr: Operand, indices: Vec<Operand>) -> Operand {
        self.defining("gep", result_ty, |dest| Inst::Gep { dest, ptr, indices })
    }

    /// Pointer reinterpretation.
    pub fn bitcast(&mut self, ty: IrType, src: Operand) -> Operand {
        self.defining("cast", ty, |dest| Inst::BitCast { dest, src })
    }

    /// Explicit phi, for callers that emit SSA directly.
    pub fn phi(&mut self, ty: IrType, incoming: Vec<(Operand, BlockId)>) -> Operand {
        let dest = self.func.new_reg("phi", ty);
        self.func
            .insert_phi(self.current, Inst::Phi { dest, incoming });
        Operand::Reg(dest)
    }

    /// Call returning `ret_ty`. Yields the result operand for non-void calls.
    pub fn call(&mut self, callee: FuncId, ret_ty: &IrType, args: Vec<Operand>) -> Option<Operand> {
        if ret_ty.is_void() {
            self.emit(Inst::Call {
                dest: None,
                callee,
                args,
            });
            None
        } else {
            Some(self.defining("call", ret_ty.clone(), |dest| Inst::Call {
                dest: Some(dest),
                callee,
                args,
            }))
        }
    }

    /// Conditional branch.
    pub fn branch(&mut self, cond: Operand, then_bb: BlockId, else_bb: BlockId) {
        self.emit(Inst::Branch {
            cond,
            then_bb,
            else_bb,
        });
    }

    /// Unconditional branch.
    pub fn jump(&mut self, target: BlockId) {
        self.emit(Inst::Jump { target });
    }

    /// Returns from the function through the merged exit block.
    pub fn ret(&mut self, value: Option<Operand>) {
        if let (Some(slot), Some(value)) = (self.retval, value) {
            self.store(value, Operand::Reg(slot));
        }
        self.jump(self.exit);
    }

    /// Completes the exit block and checks that every block is terminated.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if a block other than the exit block does
    /// not end in a terminator.
    pub fn finish(mut self) -> Result<()> {
        let exit = self.exit;
        let value = match self.retval {
            Some(slot) => {
                let ty = self.func.ret_ty().clone();
                let dest = self.func.new_reg("ret", ty);
                self.func.append_inst(
                    exit,
                    Inst::Load {
                        dest,
                        ptr: Operand::Reg(slot),
                    },
                );
                Some(Operand::Reg(dest))
            }
            None => None,
        };
        self.func.append_inst(exit, Inst::Return { value });

        for &block in self.func.blocks() {
            if self.func.terminator(block).is_none() {
                return Err(invariant_error!(
                    "block '{}' of '{}' has no terminator",
                    self.func.block_name(block),
                    self.func.name()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Module, Param};

    #[test]
    fn test_builder_single_exit() {
        let mut module = Module::new();
        let id = module.declare_function("abs", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let neg = b.new_block("neg");
        let pos = b.new_block("pos");
        let c = b.icmp(IcmpCond::Slt, Operand::Param(0), Operand::int(0));
        b.branch(c, neg, pos);
        b.position_at_end(neg);
        let n = b.binary(BinaryOp::Sub, Operand::int(0), Operand::Param(0));
        b.ret(Some(n));
        b.position_at_end(pos);
        b.ret(Some(Operand::Param(0)));
        b.finish().unwrap();

        let f = module.function(id);
        assert!(!f.is_not_functional());
        assert_eq!(*f.blocks().last().unwrap(), f.exit());
        assert_eq!(f.preds(f.exit()).len(), 2);
    }

    #[test]
    fn test_builder_rejects_open_block() {
        let mut module = Module::new();
        let id = module.declare_function("open", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let dangling = b.new_block("dangling");
        b.jump(dangling);
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_allocas_grouped_in_entry() {
        let mut module = Module::new();
        let id = module.declare_function("f", IrType::I32, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let x = b.alloca("x", IrType::I32);
        b.store(Operand::int(3), x);
        let y = b.alloca("y", IrType::I32);
        b.store(Operand::int(4), y);
        b.ret(Some(Operand::int(0)));
        b.finish().unwrap();

        let f = module.function(id);
        let entry = f.block_insts(f.entry());
        for inst in &entry[..3] {
            assert!(matches!(f.inst(*inst), Inst::Alloca { .. }));
        }
    }
}
