use crate::analyzer::GraphAnalyzer;
use docgraph_core::{ModuleId, SccId};
use std::collections::HashMap;

/// Directed graph over modules, nodes keyed by a dense integer index and
/// the SCC partition stored as a second array, matching the "arena of
/// indices, no owning cross-references" design.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<ModuleId>,
    index_of: HashMap<ModuleId, usize>,
    /// Local (in-codebase) dependency edges, by node index.
    local_deps: Vec<Vec<usize>>,
    /// External dependencies dropped from the local graph but kept for
    /// reference (e.g. "only external deps" boundary case).
    external_deps: Vec<Vec<ModuleId>>,
    scc_of: Vec<SccId>,
    sccs: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph from a `GraphAnalyzer`, computing the SCC partition
    /// via Tarjan's algorithm. SCC collapsing is this crate's job, not the
    /// analyzer's: the analyzer only supplies raw module/dependency data.
    pub fn build(analyzer: &dyn GraphAnalyzer) -> Self {
        let nodes = analyzer.modules();
        let index_of: HashMap<ModuleId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, m)| (m.clone(), i))
            .collect();

        let mut local_deps = vec![Vec::new(); nodes.len()];
        let mut external_deps = vec![Vec::new(); nodes.len()];
        for (i, module) in nodes.iter().enumerate() {
            for dep in analyzer.dependencies(module) {
                match index_of.get(&dep) {
                    Some(&dep_idx) => local_deps[i].push(dep_idx),
                    None => external_deps[i].push(dep),
                }
            }
        }

        let (scc_of, sccs) = crate::tarjan::strongly_connected_components(&local_deps);

        Self {
            nodes,
            index_of,
            local_deps,
            external_deps,
            scc_of,
            sccs,
        }
    }

    pub fn modules(&self) -> &[ModuleId] {
        &self.nodes
    }

    pub fn deps(&self, m: &ModuleId) -> Vec<ModuleId> {
        match self.index_of.get(m) {
            Some(&i) => self.local_deps[i].iter().map(|&j| self.nodes[j].clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn external_deps(&self, m: &ModuleId) -> Vec<ModuleId> {
        match self.index_of.get(m) {
            Some(&i) => self.external_deps[i].clone(),
            None => Vec::new(),
        }
    }

    pub fn scc_of(&self, m: &ModuleId) -> Option<SccId> {
        self.index_of.get(m).map(|&i| self.scc_of[i])
    }

    pub fn all_sccs(&self) -> Vec<Vec<ModuleId>> {
        self.sccs
            .iter()
            .map(|members| members.iter().map(|&i| self.nodes[i].clone()).collect())
            .collect()
    }

    /// Dependencies of `m` excluding modules in the same SCC as `m`, per the
    /// invariant that a module only waits on *out-of-SCC* dependencies.
    pub fn deps_outside_scc(&self, m: &ModuleId) -> Vec<ModuleId> {
        let scc = self.scc_of(m);
        self.deps(m)
            .into_iter()
            .filter(|d| self.scc_of(d) != scc)
            .collect()
    }

    /// Topological order over SCC super-nodes, independent-first: an SCC
    /// appears only after every SCC it (collectively) depends on.
    pub fn topo_order_independent_first(&self) -> Vec<SccId> {
        let n = self.sccs.len();
        let mut scc_deps: Vec<std::collections::HashSet<usize>> = vec![Default::default(); n];
        for (node_idx, deps) in self.local_deps.iter().enumerate() {
            let from_scc = self.scc_of[node_idx].0;
            for &dep_idx in deps {
                let to_scc = self.scc_of[dep_idx].0;
                if to_scc != from_scc {
                    scc_deps[from_scc].insert(to_scc);
                }
            }
        }

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (scc, deps) in scc_deps.iter().enumerate() {
            in_degree[scc] = deps.len();
            for &dep in deps {
                dependents[dep].push(scc);
            }
        }

        let mut queue: std::collections::VecDeque<usize> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(scc) = queue.pop_front() {
            order.push(SccId(scc));
            for &dependent in &dependents[scc] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::InMemoryGraphAnalyzer;

    fn m(s: &str) -> ModuleId {
        ModuleId::new(s)
    }

    #[test]
    fn linear_chain_has_three_singleton_sccs() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("a"), vec![]);
        analyzer.add_module(m("b"), vec![m("a")]);
        analyzer.add_module(m("c"), vec![m("b")]);
        let graph = DependencyGraph::build(&analyzer);

        assert_eq!(graph.all_sccs().len(), 3);
        assert_eq!(graph.deps(&m("c")), vec![m("b")]);
        assert_eq!(graph.deps_outside_scc(&m("c")), vec![m("b")]);
    }

    #[test]
    fn two_cycle_collapses_to_one_scc() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("x"), vec![m("y")]);
        analyzer.add_module(m("y"), vec![m("x")]);
        let graph = DependencyGraph::build(&analyzer);

        let sccs = graph.all_sccs();
        assert_eq!(sccs.len(), 1);
        assert_eq!(graph.scc_of(&m("x")), graph.scc_of(&m("y")));
        assert!(graph.deps_outside_scc(&m("x")).is_empty());
    }

    #[test]
    fn external_only_dependency_has_no_local_deps() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("leaf"), vec![m("numpy")]);
        let graph = DependencyGraph::build(&analyzer);

        assert!(graph.deps(&m("leaf")).is_empty());
        assert_eq!(graph.external_deps(&m("leaf")), vec![m("numpy")]);
    }

    #[test]
    fn topo_order_is_independent_first() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("a"), vec![]);
        analyzer.add_module(m("b"), vec![m("a")]);
        analyzer.add_module(m("c"), vec![m("b")]);
        let graph = DependencyGraph::build(&analyzer);

        let order = graph.topo_order_independent_first();
        let pos = |scc_id: SccId| order.iter().position(|s| *s == scc_id).unwrap();
        assert!(pos(graph.scc_of(&m("a")).unwrap()) < pos(graph.scc_of(&m("b")).unwrap()));
        assert!(pos(graph.scc_of(&m("b")).unwrap()) < pos(graph.scc_of(&m("c")).unwrap()));
    }
}
