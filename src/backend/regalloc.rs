//! Graph-coloring register allocation.
//!
//! Iterated Chaitin-Briggs allocation with conservative coalescing, in the
//! worklist formulation of Appel's *Modern Compiler Implementation*:
//!
//! ```text
//!          ┌──────────────────────────────────────────────┐
//!          ▼                                              │
//!   liveness → build → simplify/coalesce/freeze/spill     │
//!                         → select → actual spills? ──yes─┘ (rewrite)
//!                                        │ no
//!                                        ▼
//!                               apply colors, drop coalesced moves
//! ```
//!
//! Allocatable physical registers appear in the graph as precolored nodes, so
//! calling-convention constraints (argument registers, call clobbers, the
//! callee-saved set read by returns) become ordinary interference edges.
//!
//! # Heuristics
//!
//! - **Coalescing** merges a move's operands when George's test or Briggs'
//!   test succeeds. George alone is used against a precolored node, which has
//!   no adjacency list.
//! - **Spill choice** minimizes `cost / degree`, where each def or use adds
//!   `10^loop_depth` to the cost. Registers introduced by an earlier spill
//!   rewrite have infinite cost.
//! - **Color choice** takes the first free register in allocation order,
//!   which lists caller-saved registers first.

use std::collections::BTreeSet;

use crate::{
    backend::{
        mir::{Address, MFunction, MInst, Reg, Width},
        target::{PhysReg, RegisterFile},
    },
    compiler::{AllocatorConfig, EventKind, EventLog},
    Error, Result,
};

use super::liveness::Liveness;

/// Summary of one allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Build-color rounds, including the final successful one.
    pub rounds: usize,
    /// Registers rewritten to stack slots.
    pub spilled: usize,
    /// Moves removed by coalescing.
    pub coalesced: usize,
    /// Registers left uncolored by each round; the last entry is 0.
    pub spills_per_round: Vec<usize>,
}

/// Assigns physical registers to the virtual registers of a function.
pub struct RegisterAllocator<'a> {
    rf: &'a RegisterFile,
    config: &'a AllocatorConfig,
    events: &'a EventLog,
}

impl<'a> RegisterAllocator<'a> {
    /// Creates an allocator.
    #[must_use]
    pub fn new(rf: &'a RegisterFile, config: &'a AllocatorConfig, events: &'a EventLog) -> Self {
        Self { rf, config, events }
    }

    /// Rewrites every virtual register of `func` to a physical register.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterAllocation`] if coloring still needs spills
    /// after `max_spill_iterations` rounds.
    pub fn allocate(&self, func: &mut MFunction) -> Result<AllocationStats> {
        let mut stats = AllocationStats::default();
        let mut temps: BTreeSet<Reg> = BTreeSet::new();

        loop {
            stats.rounds += 1;
            if stats.rounds > self.config.max_spill_iterations {
                return Err(Error::RegisterAllocation(format!(
                    "'{}' still spills after {} rounds",
                    func.name, self.config.max_spill_iterations
                )));
            }

            let graph = self.color(func, &temps);
            stats.spills_per_round.push(graph.spilled.len());

            if graph.spilled.is_empty() {
                stats.coalesced += self.apply(func, &graph);
                log::debug!(
                    "allocated '{}' in {} round(s): {} spilled, {} moves coalesced",
                    func.name,
                    stats.rounds,
                    stats.spilled,
                    stats.coalesced
                );
                return Ok(stats);
            }

            for &node in &graph.spilled {
                let reg = Reg::from_index(node);
                log::trace!("spilling {reg} in '{}' (cost {})", func.name, graph.cost[node]);
                self.events
                    .record(EventKind::RegisterSpilled)
                    .function(func.name.clone())
                    .message(format!("spilled {reg}"));
                temps.extend(rewrite_spilled(func, self.rf, reg));
                stats.spilled += 1;
            }
        }
    }

    /// One build-color round over the current code of `func`.
    fn color(&self, func: &mut MFunction, temps: &BTreeSet<Reg>) -> Coloring<'a> {
        func.compute_cfg();
        let liveness = Liveness::compute(func, self.rf);
        let mut graph = Coloring::new(self.rf, self.config.colors, func.reg_space());
        graph.build(func, &liveness, temps);
        graph.make_worklists();
        graph.run();
        graph.assign_colors();
        graph
    }

    fn apply(&self, func: &mut MFunction, graph: &Coloring<'_>) -> usize {
        // Drop coalesced moves first; their positions refer to the colored code.
        let mut sites: Vec<(usize, usize)> = graph
            .coalesced_moves
            .iter()
            .map(|&m| (graph.moves[m].block, graph.moves[m].index))
            .collect();
        sites.sort_unstable();
        for &(block, index) in sites.iter().rev() {
            func.blocks[block].insts.remove(index);
        }
        if !sites.is_empty() {
            self.events
                .record(EventKind::MoveCoalesced)
                .function(func.name.clone())
                .message(format!("{} moves coalesced", sites.len()));
        }

        for block in &mut func.blocks {
            for inst in &mut block.insts {
                inst.for_each_reg_mut(|r| {
                    if let Reg::Virt(_) = r {
                        if let Some(color) = graph.color[graph.alias_of(r.index())] {
                            *r = Reg::Phys(color);
                        }
                    }
                });
            }
        }
        sites.len()
    }
}

/// Inserts a load before each use and a store after each def of `reg`.
///
/// Returns the fresh registers, each live only across a single instruction.
fn rewrite_spilled(func: &mut MFunction, rf: &RegisterFile, reg: Reg) -> Vec<Reg> {
    let slot = func.frame.add_spill();
    let addr = Address::Frame { slot, offset: 0 };
    let mut temps = Vec::new();

    for b in 0..func.blocks.len() {
        let old = std::mem::take(&mut func.blocks[b].insts);
        let mut insts = Vec::with_capacity(old.len());
        for mut inst in old {
            let used = inst.uses(rf).contains(&reg);
            let defined = inst.explicit_def() == Some(reg);
            if !used && !defined {
                insts.push(inst);
                continue;
            }
            let temp = func.new_vreg();
            temps.push(temp);
            if used {
                insts.push(MInst::Load {
                    width: Width::Word,
                    rd: temp,
                    addr: addr.clone(),
                });
                inst.replace_use(reg, temp);
            }
            if defined {
                inst.replace_def(reg, temp);
                insts.push(inst);
                insts.push(MInst::Store {
                    width: Width::Word,
                    rs: temp,
                    addr: addr.clone(),
                });
            } else {
                insts.push(inst);
            }
        }
        func.blocks[b].insts = insts;
    }
    temps
}

struct MoveSite {
    block: usize,
    index: usize,
    dst: usize,
    src: usize,
}

const PRECOLORED: usize = 32;

struct Coloring<'a> {
    rf: &'a RegisterFile,
    k: usize,
    palette: Vec<PhysReg>,

    adj_set: BTreeSet<(usize, usize)>,
    adj_list: Vec<BTreeSet<usize>>,
    degree: Vec<usize>,
    move_list: Vec<BTreeSet<usize>>,
    moves: Vec<MoveSite>,
    alias: Vec<usize>,
    color: Vec<Option<PhysReg>>,
    cost: Vec<f64>,

    initial: BTreeSet<usize>,
    simplify_wl: BTreeSet<usize>,
    freeze_wl: BTreeSet<usize>,
    spill_wl: BTreeSet<usize>,
    spilled: BTreeSet<usize>,
    coalesced_nodes: BTreeSet<usize>,
    colored: BTreeSet<usize>,
    select_stack: Vec<usize>,
    on_stack: Vec<bool>,

    worklist_moves: BTreeSet<usize>,
    active_moves: BTreeSet<usize>,
    coalesced_moves: BTreeSet<usize>,
    constrained_moves: BTreeSet<usize>,
    frozen_moves: BTreeSet<usize>,
}

impl<'a> Coloring<'a> {
    fn new(rf: &'a RegisterFile, colors: usize, space: usize) -> Self {
        let palette: Vec<PhysReg> = rf.allocatable().iter().copied().take(colors).collect();
        let mut degree = vec![0; space];
        let mut color = vec![None; space];
        for (index, slot) in color.iter_mut().enumerate().take(PRECOLORED) {
            *slot = PhysReg::from_index(index);
            degree[index] = usize::MAX / 2;
        }
        Self {
            rf,
            k: palette.len(),
            palette,
            adj_set: BTreeSet::new(),
            adj_list: vec![BTreeSet::new(); space],
            degree,
            move_list: vec![BTreeSet::new(); space],
            moves: Vec::new(),
            alias: (0..space).collect(),
            color,
            cost: vec![0.0; space],
            initial: BTreeSet::new(),
            simplify_wl: BTreeSet::new(),
            freeze_wl: BTreeSet::new(),
            spill_wl: BTreeSet::new(),
            spilled: BTreeSet::new(),
            coalesced_nodes: BTreeSet::new(),
            colored: BTreeSet::new(),
            select_stack: Vec::new(),
            on_stack: vec![false; space],
            worklist_moves: BTreeSet::new(),
            active_moves: BTreeSet::new(),
            coalesced_moves: BTreeSet::new(),
            constrained_moves: BTreeSet::new(),
            frozen_moves: BTreeSet::new(),
        }
    }

    /// Graph node of a register; `None` for registers outside allocation.
    fn node(&self, reg: Reg) -> Option<usize> {
        match reg {
            Reg::Virt(_) => Some(reg.index()),
            Reg::Phys(p) if self.rf.is_allocatable(p) => Some(p.index()),
            Reg::Phys(_) => None,
        }
    }

    fn is_precolored(node: usize) -> bool {
        node < PRECOLORED
    }

    // ── Build ───────────────────────────────────────────────────────────

    fn build(&mut self, func: &MFunction, liveness: &Liveness, temps: &BTreeSet<Reg>) {
        for (b, block) in func.blocks.iter().enumerate() {
            let weight = 10f64.powi(i32::try_from(block.loop_depth).unwrap_or(i32::MAX).min(16));
            let mut live = liveness.live_out(b).clone();
            for (index, inst) in block.insts.iter().enumerate().rev() {
                let uses: Vec<usize> = inst.uses(self.rf).into_iter().filter_map(|r| self.node(r)).collect();
                let defs: Vec<usize> = inst.defs(self.rf).into_iter().filter_map(|r| self.node(r)).collect();

                for &n in uses.iter().chain(&defs) {
                    if !Self::is_precolored(n) {
                        self.initial.insert(n);
                        self.cost[n] += weight;
                    }
                }

                if let Some((dst, src)) = inst.as_move() {
                    if let (Some(d), Some(s)) = (self.node(dst), self.node(src)) {
                        live.remove(s);
                        let id = self.moves.len();
                        self.moves.push(MoveSite {
                            block: b,
                            index,
                            dst: d,
                            src: s,
                        });
                        self.move_list[d].insert(id);
                        self.move_list[s].insert(id);
                        self.worklist_moves.insert(id);
                    }
                }

                for &d in &defs {
                    live.insert(d);
                }
                for &d in &defs {
                    let live_now: Vec<usize> = live.iter().collect();
                    for l in live_now {
                        if self.node(Reg::from_index(l)).is_some() {
                            self.add_edge(l, d);
                        }
                    }
                }
                for &d in &defs {
                    live.remove(d);
                }
                for &u in &uses {
                    live.insert(u);
                }
            }
        }

        for temp in temps {
            if temp.index() < self.cost.len() {
                self.cost[temp.index()] = f64::INFINITY;
            }
        }
    }

    fn add_edge(&mut self, u: usize, v: usize) {
        if u == v || self.adj_set.contains(&(u, v)) {
            return;
        }
        self.adj_set.insert((u, v));
        self.adj_set.insert((v, u));
        if !Self::is_precolored(u) {
            self.adj_list[u].insert(v);
            self.degree[u] += 1;
        }
        if !Self::is_precolored(v) {
            self.adj_list[v].insert(u);
            self.degree[v] += 1;
        }
    }

    fn make_worklists(&mut self) {
        for n in std::mem::take(&mut self.initial) {
            if self.degree[n] >= self.k {
                self.spill_wl.insert(n);
            } else if self.move_related(n) {
                self.freeze_wl.insert(n);
            } else {
                self.simplify_wl.insert(n);
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    fn adjacent(&self, n: usize) -> Vec<usize> {
        self.adj_list[n]
            .iter()
            .copied()
            .filter(|&m| !self.on_stack[m] && !self.coalesced_nodes.contains(&m))
            .collect()
    }

    fn node_moves(&self, n: usize) -> Vec<usize> {
        self.move_list[n]
            .iter()
            .copied()
            .filter(|m| self.active_moves.contains(m) || self.worklist_moves.contains(m))
            .collect()
    }

    fn move_related(&self, n: usize) -> bool {
        !self.node_moves(n).is_empty()
    }

    fn alias_of(&self, mut n: usize) -> usize {
        while self.coalesced_nodes.contains(&n) {
            n = self.alias[n];
        }
        n
    }

    // ── Main loop ───────────────────────────────────────────────────────

    fn run(&mut self) {
        loop {
            if let Some(n) = self.simplify_wl.pop_first() {
                self.simplify(n);
            } else if let Some(m) = self.worklist_moves.pop_first() {
                self.coalesce(m);
            } else if let Some(n) = self.freeze_wl.pop_first() {
                self.freeze(n);
            } else if !self.spill_wl.is_empty() {
                self.select_spill();
            } else {
                break;
            }
        }
    }

    fn simplify(&mut self, n: usize) {
        self.select_stack.push(n);
        self.on_stack[n] = true;
        for m in self.adjacent(n) {
            self.decrement_degree(m);
        }
    }

    fn decrement_degree(&mut self, m: usize) {
        if Self::is_precolored(m) {
            return;
        }
        let d = self.degree[m];
        self.degree[m] = d.saturating_sub(1);
        if d == self.k {
            let mut nodes = self.adjacent(m);
            nodes.push(m);
            self.enable_moves(&nodes);
            self.spill_wl.remove(&m);
            if self.move_related(m) {
                self.freeze_wl.insert(m);
            } else {
                self.simplify_wl.insert(m);
            }
        }
    }

    fn enable_moves(&mut self, nodes: &[usize]) {
        for &n in nodes {
            for m in self.node_moves(n) {
                if self.active_moves.remove(&m) {
                    self.worklist_moves.insert(m);
                }
            }
        }
    }

    fn add_worklist(&mut self, u: usize) {
        if !Self::is_precolored(u) && !self.move_related(u) && self.degree[u] < self.k {
            self.freeze_wl.remove(&u);
            self.simplify_wl.insert(u);
        }
    }

    /// George: every neighbor of `v` is harmless to `u`.
    fn george(&self, u: usize, v: usize) -> bool {
        self.adjacent(v).into_iter().all(|t| {
            self.degree[t] < self.k || Self::is_precolored(t) || self.adj_set.contains(&(t, u))
        })
    }

    /// Briggs: the merged node has fewer than `k` significant neighbors.
    fn briggs(&self, u: usize, v: usize) -> bool {
        let nodes: BTreeSet<usize> = self.adjacent(u).into_iter().chain(self.adjacent(v)).collect();
        nodes.into_iter().filter(|&n| self.degree[n] >= self.k).count() < self.k
    }

    fn coalesce(&mut self, m: usize) {
        let x = self.alias_of(self.moves[m].dst);
        let y = self.alias_of(self.moves[m].src);
        let (u, v) = if Self::is_precolored(y) { (y, x) } else { (x, y) };

        if u == v {
            self.coalesced_moves.insert(m);
            self.add_worklist(u);
        } else if Self::is_precolored(v) || self.adj_set.contains(&(u, v)) {
            self.constrained_moves.insert(m);
            self.add_worklist(u);
            self.add_worklist(v);
        } else if (Self::is_precolored(u) && self.george(u, v))
            || (!Self::is_precolored(u) && (self.george(u, v) || self.briggs(u, v)))
        {
            self.coalesced_moves.insert(m);
            self.combine(u, v);
            self.add_worklist(u);
        } else {
            self.active_moves.insert(m);
        }
    }

    fn combine(&mut self, u: usize, v: usize) {
        if !self.freeze_wl.remove(&v) {
            self.spill_wl.remove(&v);
        }
        self.coalesced_nodes.insert(v);
        self.alias[v] = u;
        let moves = self.move_list[v].clone();
        self.move_list[u].extend(moves);
        self.enable_moves(&[v]);
        for t in self.adjacent(v) {
            self.add_edge(t, u);
            self.decrement_degree(t);
        }
        if self.degree[u] >= self.k && self.freeze_wl.remove(&u) {
            self.spill_wl.insert(u);
        }
    }

    fn freeze(&mut self, u: usize) {
        self.simplify_wl.insert(u);
        self.freeze_moves(u);
    }

    fn freeze_moves(&mut self, u: usize) {
        for m in self.node_moves(u) {
            let (x, y) = (self.moves[m].dst, self.moves[m].src);
            let v = if self.alias_of(y) == self.alias_of(u) {
                self.alias_of(x)
            } else {
                self.alias_of(y)
            };
            self.active_moves.remove(&m);
            self.worklist_moves.remove(&m);
            self.frozen_moves.insert(m);
            if !Self::is_precolored(v) && !self.move_related(v) && self.degree[v] < self.k {
                self.freeze_wl.remove(&v);
                self.simplify_wl.insert(v);
            }
        }
    }

    fn select_spill(&mut self) {
        let candidate = self
            .spill_wl
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let ka = self.cost[a] / self.degree[a].max(1) as f64;
                let kb = self.cost[b] / self.degree[b].max(1) as f64;
                ka.total_cmp(&kb)
            });
        if let Some(m) = candidate {
            self.spill_wl.remove(&m);
            self.simplify_wl.insert(m);
            self.freeze_moves(m);
        }
    }

    // ── Select ──────────────────────────────────────────────────────────

    fn assign_colors(&mut self) {
        while let Some(n) = self.select_stack.pop() {
            self.on_stack[n] = false;
            let mut taken = BTreeSet::new();
            for &w in &self.adj_list[n] {
                let a = self.alias_of(w);
                if Self::is_precolored(a) || self.colored.contains(&a) {
                    if let Some(c) = self.color[a] {
                        taken.insert(c);
                    }
                }
            }
            match self.palette.iter().find(|c| !taken.contains(c)) {
                Some(&c) => {
                    self.colored.insert(n);
                    self.color[n] = Some(c);
                }
                None => {
                    self.spilled.insert(n);
                }
            }
        }
        for &n in &self.coalesced_nodes.clone() {
            let a = self.alias_of(n);
            self.color[n] = self.color[a];
        }
    }
}
