//! Interprocedural side-effect analysis.
//!
//! Every value of the module is classified on a small scope lattice:
//!
//! | Scope       | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `Undefined` | Not computed yet (only during the fixpoint)               |
//! | `Local`     | Cannot address memory visible outside the function        |
//! | `Outer`     | May address memory visible to callers (globals, params)   |
//!
//! Pointer parameters and globals are outer, stack slots are local and derived
//! pointers (`getelementptr`, `bitcast`, pointer loads) inherit the scope of
//! their base. A phi is outer as soon as one incoming value is outer. Call
//! results take the return scope of the callee, which is itself computed to a
//! fixpoint over the module.
//!
//! A function has a side effect when it stores through an outer pointer, loads
//! through one (unless loads are ignored), calls an I/O builtin (unless I/O is
//! ignored) or calls a function that has a side effect.

use std::collections::BTreeSet;

use crate::ir::{Constant, FuncId, Function, Inst, Module, Operand, RegId};

/// Memory scope of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Not determined yet.
    Undefined,
    /// Addresses only memory private to the function (or no memory at all).
    Local,
    /// May address memory that outlives the function.
    Outer,
}

/// Configurable side-effect checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SideEffectChecker {
    /// Treat calls to I/O builtins as pure.
    pub ignore_io: bool,
    /// Treat loads through outer pointers as pure.
    pub ignore_load: bool,
}

impl SideEffectChecker {
    /// Creates a checker with the given relaxations.
    #[must_use]
    pub fn new(ignore_io: bool, ignore_load: bool) -> Self {
        Self {
            ignore_io,
            ignore_load,
        }
    }

    /// Analyzes every defined function of `module`.
    #[must_use]
    pub fn analyze(&self, module: &Module) -> SideEffectInfo {
        let capacity = module.function_capacity();
        let mut info = SideEffectInfo {
            scopes: vec![Vec::new(); capacity],
            return_scope: vec![Scope::Local; capacity],
            side_effect: vec![false; capacity],
        };

        let defined = module.defined_functions();
        for &id in &defined {
            let func = module.function(id);
            info.scopes[id.index()] = vec![Scope::Undefined; func.reg_count()];
            if func.ret_ty().is_pointer() {
                info.return_scope[id.index()] = Scope::Outer;
            }
        }

        // Return scopes only ever drop from outer to local, so this terminates.
        loop {
            let mut changed = false;
            for &id in &defined {
                let func = module.function(id);
                info.compute_function_scopes(id, func);
                if info.return_scope[id.index()] == Scope::Outer && info.returns_local(id, func) {
                    info.return_scope[id.index()] = Scope::Local;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        self.propagate_side_effects(module, &defined, &mut info);
        info
    }

    fn propagate_side_effects(&self, module: &Module, defined: &[FuncId], info: &mut SideEffectInfo) {
        let mut callers: Vec<BTreeSet<FuncId>> = vec![BTreeSet::new(); info.side_effect.len()];
        let mut worklist = Vec::new();

        if !self.ignore_io {
            for id in module.function_ids() {
                if module.is_io_builtin(id) {
                    info.side_effect[id.index()] = true;
                    worklist.push(id);
                }
            }
        }

        for &id in defined {
            let func = module.function(id);
            let mut effect = false;
            for (_, inst) in func.instructions() {
                match func.inst(inst) {
                    Inst::Store { ptr, .. } => effect |= info.is_outer(id, func, *ptr),
                    Inst::Load { ptr, .. } if !self.ignore_load => {
                        effect |= info.is_outer(id, func, *ptr);
                    }
                    Inst::Call { callee, .. } => {
                        callers[callee.index()].insert(id);
                    }
                    _ => {}
                }
            }
            if effect && !info.side_effect[id.index()] {
                info.side_effect[id.index()] = true;
                worklist.push(id);
            }
        }

        while let Some(callee) = worklist.pop() {
            for &caller in &callers[callee.index()] {
                if !info.side_effect[caller.index()] {
                    info.side_effect[caller.index()] = true;
                    worklist.push(caller);
                }
            }
        }
    }
}

/// Result of [`SideEffectChecker::analyze`], a snapshot of the module.
#[derive(Debug, Clone)]
pub struct SideEffectInfo {
    scopes: Vec<Vec<Scope>>,
    return_scope: Vec<Scope>,
    side_effect: Vec<bool>,
}

impl SideEffectInfo {
    /// Returns `true` if calling `func` may have an observable effect.
    #[must_use]
    pub fn has_side_effect(&self, func: FuncId) -> bool {
        self.side_effect.get(func.index()).copied().unwrap_or(true)
    }

    /// Scope of the value returned by `func`.
    #[must_use]
    pub fn return_scope(&self, func: FuncId) -> Scope {
        self.return_scope
            .get(func.index())
            .copied()
            .unwrap_or(Scope::Outer)
    }

    /// Scope of an operand of `func` (whose handle is `id`).
    ///
    /// Registers created after the analysis ran are reported as outer.
    #[must_use]
    pub fn scope(&self, id: FuncId, func: &Function, op: Operand) -> Scope {
        match self.operand_scope(id, func, op) {
            Scope::Undefined => Scope::Outer,
            scope => scope,
        }
    }

    /// Returns `true` if `op` may address memory visible outside `func`.
    #[must_use]
    pub fn is_outer(&self, id: FuncId, func: &Function, op: Operand) -> bool {
        !matches!(op, Operand::Const(Constant::Null)) && self.scope(id, func, op) == Scope::Outer
    }

    fn operand_scope(&self, id: FuncId, func: &Function, op: Operand) -> Scope {
        match op {
            Operand::Param(i) => {
                if func.params().get(i).is_some_and(|p| p.ty.is_pointer()) {
                    Scope::Outer
                } else {
                    Scope::Local
                }
            }
            Operand::Global(_) => Scope::Outer,
            Operand::Const(_) => Scope::Local,
            Operand::Reg(r) => self
                .scopes
                .get(id.index())
                .and_then(|regs| regs.get(r.index()))
                .copied()
                .unwrap_or(Scope::Undefined),
        }
    }

    fn result_scope(&self, id: FuncId, func: &Function, dest: RegId, inst: &Inst) -> Scope {
        if !func.reg_ty(dest).is_pointer() {
            return Scope::Local;
        }
        match inst {
            Inst::Alloca { .. } => Scope::Local,
            Inst::Gep { ptr: base, .. }
            | Inst::BitCast { src: base, .. }
            | Inst::Move { src: base, .. }
            | Inst::Load { ptr: base, .. } => self.operand_scope(id, func, *base),
            Inst::Phi { incoming, .. } => {
                let mut scope = Scope::Undefined;
                for (value, _) in incoming {
                    match self.operand_scope(id, func, *value) {
                        Scope::Outer => return Scope::Outer,
                        Scope::Local => scope = Scope::Local,
                        Scope::Undefined => {}
                    }
                }
                scope
            }
            Inst::Call { callee, .. } => self.return_scope(*callee),
            _ => Scope::Local,
        }
    }

    fn compute_function_scopes(&mut self, id: FuncId, func: &Function) {
        self.scopes[id.index()].fill(Scope::Undefined);
        loop {
            let mut changed = false;
            for &block in func.blocks() {
                for &inst in func.block_insts(block) {
                    let data = func.inst(inst);
                    for dest in data.defs() {
                        let scope = match data {
                            Inst::ParallelCopy { moves } => moves
                                .iter()
                                .find(|(d, _)| *d == dest)
                                .map_or(Scope::Outer, |(_, src)| {
                                    self.operand_scope(id, func, *src)
                                }),
                            other => self.result_scope(id, func, dest, other),
                        };
                        // Scopes only rise within one round.
                        let slot = &mut self.scopes[id.index()][dest.index()];
                        if scope > *slot {
                            *slot = scope;
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        for slot in &mut self.scopes[id.index()] {
            if *slot == Scope::Undefined {
                *slot = Scope::Local;
            }
        }
    }

    fn returns_local(&self, id: FuncId, func: &Function) -> bool {
        let Some(term) = func.terminator(func.exit()) else {
            return false;
        };
        match func.inst(term) {
            Inst::Return { value: None } => true,
            Inst::Return { value: Some(v) } => self.operand_scope(id, func, *v) == Scope::Local,
            _ => false,
        }
    }
}
