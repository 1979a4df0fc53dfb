//! Module call graph.
//!
//! Nodes are function slots of the module (removed slots stay isolated) and an
//! edge `f -> g` means `f` contains at least one call to `g`. Call sites are
//! recorded separately so that inlining can find every `call` instruction that
//! targets a given callee.

use std::collections::BTreeSet;

use crate::{
    ir::{FuncId, Inst, InstId, Module},
    utils::graph::{algorithms::dfs, AdjacencyGraph, NodeId, Predecessors, Successors},
};

/// Call relation between the functions of a module.
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: AdjacencyGraph,
    sites: Vec<Vec<(FuncId, InstId)>>,
}

impl CallGraph {
    /// Builds the call graph of `module`.
    #[must_use]
    pub fn build(module: &Module) -> Self {
        let capacity = module.function_capacity();
        let entry = module
            .function_by_name("main")
            .map_or(NodeId::new(0), NodeId::from);
        let mut graph = AdjacencyGraph::new(capacity, entry);
        let mut sites = vec![Vec::new(); capacity];

        for caller in module.defined_functions() {
            let func = module.function(caller);
            for (_, inst) in func.instructions() {
                if let Inst::Call { callee, .. } = func.inst(inst) {
                    graph.add_edge(NodeId::from(caller), NodeId::from(*callee));
                    sites[callee.index()].push((caller, inst));
                }
            }
        }

        Self { graph, sites }
    }

    /// Functions called by `func`, in first-call order.
    #[must_use]
    pub fn callees(&self, func: FuncId) -> Vec<FuncId> {
        self.graph
            .successors(NodeId::from(func))
            .map(FuncId::from)
            .collect()
    }

    /// Functions calling `func`.
    #[must_use]
    pub fn callers(&self, func: FuncId) -> Vec<FuncId> {
        self.graph
            .predecessors(NodeId::from(func))
            .map(FuncId::from)
            .collect()
    }

    /// Every call instruction targeting `callee`, with the calling function.
    #[must_use]
    pub fn call_sites(&self, callee: FuncId) -> &[(FuncId, InstId)] {
        self.sites.get(callee.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if `func` calls itself directly.
    #[must_use]
    pub fn calls_self(&self, func: FuncId) -> bool {
        self.graph.has_edge(NodeId::from(func), NodeId::from(func))
    }

    /// Returns `true` if `func` can reach itself through any call chain.
    #[must_use]
    pub fn is_recursive(&self, func: FuncId) -> bool {
        self.callees(func)
            .into_iter()
            .any(|callee| self.reachable_from(callee).contains(&func))
    }

    /// Functions reachable from `root` over call edges, `root` included.
    #[must_use]
    pub fn reachable_from(&self, root: FuncId) -> BTreeSet<FuncId> {
        dfs(&self.graph, NodeId::from(root))
            .map(FuncId::from)
            .collect()
    }
}
