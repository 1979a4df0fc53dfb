//! Andersen-style inclusion-based points-to analysis.
//!
//! The analysis is flow- and context-insensitive and covers the whole module.
//! Every pointer-typed register, parameter, function return value and global
//! address gets a node; abstract memory objects (one per `alloca`, one per
//! global, one per call site of an external pointer-returning function) get a
//! node as well, so that pointers stored in memory are tracked too.
//!
//! # Constraints
//!
//! | Instruction            | Constraint              |
//! |------------------------|-------------------------|
//! | `p = alloca`           | `pts(p) ⊇ {obj}`        |
//! | `p = gep q` / `bitcast` / `move` / `phi` | `q ⊆ p` |
//! | `p = load q`           | `*q ⊆ p`                |
//! | `store v, q`           | `v ⊆ *q`                |
//! | `r = call f(a...)`     | `a_i ⊆ param_i(f)`, `ret(f) ⊆ r` |
//! | `ret v`                | `v ⊆ ret(f)`            |
//!
//! The constraint graph is solved with a worklist: dereference constraints
//! add inclusion edges as points-to sets grow, and sets are propagated along
//! inclusion edges until nothing changes. Sets are [`BitSet`]s and all maps are
//! ordered, so the result does not depend on hashing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    ir::{FuncId, Function, GlobalId, Inst, IrType, Module, Operand, RegId},
    utils::BitSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NodeKey {
    Reg(FuncId, RegId),
    Param(FuncId, usize),
    Ret(FuncId),
    Global(GlobalId),
    GlobalObject(GlobalId),
    StackObject(FuncId, RegId),
    HeapObject(FuncId, RegId),
}

#[derive(Debug, Default)]
struct Constraints {
    base: Vec<(usize, usize)>,
    copy: Vec<(usize, usize)>,
    load: Vec<(usize, usize)>,
    store: Vec<(usize, usize)>,
}

/// Solved points-to sets of a module.
#[derive(Debug, Clone)]
pub struct Andersen {
    nodes: BTreeMap<NodeKey, usize>,
    points_to: Vec<BitSet>,
    global_tys: Vec<IrType>,
}

impl Andersen {
    /// Builds and solves the constraint system of `module`.
    #[must_use]
    pub fn analyze(module: &Module) -> Self {
        let mut analysis = Self {
            nodes: BTreeMap::new(),
            points_to: Vec::new(),
            global_tys: module.globals().iter().map(|g| g.ty.clone()).collect(),
        };

        analysis.collect_nodes(module);
        let constraints = analysis.collect_constraints(module);
        analysis.solve(&constraints);

        log::trace!(
            "points-to analysis: {} nodes, {} copy constraints",
            analysis.nodes.len(),
            constraints.copy.len()
        );
        analysis
    }

    fn add_node(&mut self, key: NodeKey) -> usize {
        let next = self.nodes.len();
        *self.nodes.entry(key).or_insert(next)
    }

    fn collect_nodes(&mut self, module: &Module) {
        for index in 0..module.globals().len() {
            let global = GlobalId::new(index);
            self.add_node(NodeKey::Global(global));
            self.add_node(NodeKey::GlobalObject(global));
        }

        for id in module.defined_functions() {
            let func = module.function(id);
            for (i, param) in func.params().iter().enumerate() {
                if param.ty.is_pointer() {
                    self.add_node(NodeKey::Param(id, i));
                }
            }
            if func.ret_ty().is_pointer() {
                self.add_node(NodeKey::Ret(id));
            }
            for (_, inst) in func.instructions() {
                let data = func.inst(inst);
                for dest in data.defs() {
                    if func.reg_ty(dest).is_pointer() {
                        self.add_node(NodeKey::Reg(id, dest));
                    }
                }
                match data {
                    Inst::Alloca { dest, .. } => {
                        self.add_node(NodeKey::StackObject(id, *dest));
                    }
                    Inst::Call {
                        dest: Some(dest),
                        callee,
                        ..
                    } if module.function(*callee).is_external()
                        && func.reg_ty(*dest).is_pointer() =>
                    {
                        self.add_node(NodeKey::HeapObject(id, *dest));
                    }
                    _ => {}
                }
            }
        }
    }

    fn operand_node(&self, id: FuncId, op: Operand) -> Option<usize> {
        let key = match op {
            Operand::Reg(r) => NodeKey::Reg(id, r),
            Operand::Param(i) => NodeKey::Param(id, i),
            Operand::Global(g) => NodeKey::Global(g),
            Operand::Const(_) => return None,
        };
        self.nodes.get(&key).copied()
    }

    fn collect_constraints(&self, module: &Module) -> Constraints {
        let mut c = Constraints::default();
        let node = |key: NodeKey| self.nodes.get(&key).copied();

        for index in 0..module.globals().len() {
            let global = GlobalId::new(index);
            if let (Some(p), Some(o)) = (
                node(NodeKey::Global(global)),
                node(NodeKey::GlobalObject(global)),
            ) {
                c.base.push((p, o));
            }
        }

        for id in module.defined_functions() {
            let func = module.function(id);
            let copy = |c: &mut Constraints, src: Operand, dest: Option<usize>| {
                if let (Some(s), Some(d)) = (self.operand_node(id, src), dest) {
                    c.copy.push((s, d));
                }
            };

            for (_, inst) in func.instructions() {
                match func.inst(inst) {
                    Inst::Alloca { dest, .. } => {
                        if let (Some(p), Some(o)) =
                            (node(NodeKey::Reg(id, *dest)), node(NodeKey::StackObject(id, *dest)))
                        {
                            c.base.push((p, o));
                        }
                    }
                    Inst::Gep { dest, ptr: src, .. }
                    | Inst::BitCast { dest, src }
                    | Inst::Move { dest, src } => copy(&mut c, *src, node(NodeKey::Reg(id, *dest))),
                    Inst::Phi { dest, incoming } => {
                        for (value, _) in incoming {
                            copy(&mut c, *value, node(NodeKey::Reg(id, *dest)));
                        }
                    }
                    Inst::ParallelCopy { moves } => {
                        for (dest, src) in moves {
                            copy(&mut c, *src, node(NodeKey::Reg(id, *dest)));
                        }
                    }
                    Inst::Load { dest, ptr } => {
                        if let (Some(q), Some(p)) =
                            (self.operand_node(id, *ptr), node(NodeKey::Reg(id, *dest)))
                        {
                            c.load.push((q, p));
                        }
                    }
                    Inst::Store { value, ptr } => {
                        if let (Some(v), Some(q)) =
                            (self.operand_node(id, *value), self.operand_node(id, *ptr))
                        {
                            c.store.push((v, q));
                        }
                    }
                    Inst::Call { dest, callee, args } => {
                        let result = dest.and_then(|d| node(NodeKey::Reg(id, d)));
                        if module.function(*callee).is_external() {
                            if let (Some(r), Some(d)) = (result, *dest) {
                                if let Some(o) = node(NodeKey::HeapObject(id, d)) {
                                    c.base.push((r, o));
                                }
                            }
                            continue;
                        }
                        for (i, arg) in args.iter().enumerate() {
                            copy(&mut c, *arg, node(NodeKey::Param(*callee, i)));
                        }
                        if let (Some(ret), Some(r)) = (node(NodeKey::Ret(*callee)), result) {
                            c.copy.push((ret, r));
                        }
                    }
                    Inst::Return { value: Some(value) } => {
                        copy(&mut c, *value, node(NodeKey::Ret(id)));
                    }
                    _ => {}
                }
            }
        }
        c
    }

    fn solve(&mut self, constraints: &Constraints) {
        let count = self.nodes.len();
        self.points_to = vec![BitSet::new(count); count];
        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
        let mut deref_load: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut deref_store: Vec<Vec<usize>> = vec![Vec::new(); count];

        for &(p, o) in &constraints.base {
            self.points_to[p].insert(o);
        }
        for &(src, dest) in &constraints.copy {
            edges[src].insert(dest);
        }
        for &(q, p) in &constraints.load {
            deref_load[q].push(p);
        }
        for &(v, q) in &constraints.store {
            deref_store[q].push(v);
        }

        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut queued = vec![false; count];
        for n in 0..count {
            if !self.points_to[n].is_empty() {
                queue.push_back(n);
                queued[n] = true;
            }
        }

        while let Some(n) = queue.pop_front() {
            queued[n] = false;
            let targets: Vec<usize> = self.points_to[n].iter().collect();
            for o in targets {
                for &lhs in &deref_load[n] {
                    if edges[o].insert(lhs) && !queued[o] {
                        queue.push_back(o);
                        queued[o] = true;
                    }
                }
                for &rhs in &deref_store[n] {
                    if edges[rhs].insert(o) && !queued[rhs] {
                        queue.push_back(rhs);
                        queued[rhs] = true;
                    }
                }
            }

            let source = self.points_to[n].clone();
            for &m in &edges[n] {
                if self.points_to[m].union_with(&source) && !queued[m] {
                    queue.push_back(m);
                    queued[m] = true;
                }
            }
        }
    }

    fn operand_ty(&self, func: &Function, op: Operand) -> Option<IrType> {
        match op {
            Operand::Global(g) => self
                .global_tys
                .get(g.index())
                .map(|ty| IrType::pointer_to(ty.clone())),
            other => func.operand_ty(other),
        }
    }

    /// Number of abstract locations `op` may point to; `None` if unknown.
    #[must_use]
    pub fn points_to_count(&self, id: FuncId, op: Operand) -> Option<usize> {
        self.operand_node(id, op)
            .map(|n| self.points_to[n].count())
    }

    /// Returns `true` unless `a` and `b` provably address disjoint memory.
    ///
    /// `id` is the handle of `func`. Null never aliases anything and pointers
    /// of different types are assumed disjoint. A pointer created after the
    /// analysis ran, or one with an empty points-to set, may alias anything.
    ///
    /// The type test relies on the frontend's type system: it is unsound for
    /// code that `bitcast`s a pointer to a different pointee type.
    #[must_use]
    pub fn may_alias(&self, id: FuncId, func: &Function, a: Operand, b: Operand) -> bool {
        if a.is_null() || b.is_null() {
            return false;
        }
        if let (Some(ta), Some(tb)) = (self.operand_ty(func, a), self.operand_ty(func, b)) {
            if ta != tb {
                return false;
            }
        }
        match (self.operand_node(id, a), self.operand_node(id, b)) {
            (Some(na), Some(nb)) => {
                let (pa, pb) = (&self.points_to[na], &self.points_to[nb]);
                pa.is_empty() || pb.is_empty() || pa.intersects(pb)
            }
            _ => true,
        }
    }
}
