use std::collections::HashSet;
use std::hash::Hash;

/// Organize `nodes` into dependency-respecting wavefronts: each wavefront is
/// the maximal set of not-yet-dispatched nodes whose `local_deps` are all in
/// the completed set. Used both for the module dependency graph (§4.3) and
/// for the plan's section DAG (§4.4), with a node id type supplied by the
/// caller (`ModuleId` or a section id string).
///
/// If no wavefront can be computed while nodes remain — which should only
/// happen when the upstream analyzer produced an inconsistent dependency
/// set — the remainder is force-dispatched as one final wavefront and a
/// warning is logged, per the documented safety fallback.
pub fn organize_wavefronts<Id, F>(nodes: &[Id], local_deps: F) -> Vec<Vec<Id>>
where
    Id: Eq + Hash + Clone,
    F: Fn(&Id) -> Vec<Id>,
{
    let mut completed: HashSet<Id> = HashSet::new();
    let mut remaining: Vec<Id> = nodes.to_vec();
    let mut wavefronts: Vec<Vec<Id>> = Vec::new();

    while !remaining.is_empty() {
        let (available, still_remaining): (Vec<Id>, Vec<Id>) = remaining.into_iter().partition(
            |id| local_deps(id).iter().all(|d| completed.contains(d)),
        );

        if available.is_empty() {
            tracing::warn!(
                remaining = still_remaining.len(),
                "no wavefront computable; force-dispatching remaining nodes (analyzer may have \
                 produced an inconsistent dependency set)"
            );
            for id in &still_remaining {
                completed.insert(id.clone());
            }
            wavefronts.push(still_remaining);
            break;
        }

        for id in &available {
            completed.insert(id.clone());
        }
        wavefronts.push(available);
        remaining = still_remaining;
    }

    wavefronts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_produces_three_singleton_wavefronts() {
        let nodes = vec!["a", "b", "c"];
        let deps = |id: &&str| -> Vec<&str> {
            match *id {
                "b" => vec!["a"],
                "c" => vec!["b"],
                _ => vec![],
            }
        };
        let waves = organize_wavefronts(&nodes, deps);
        assert_eq!(waves, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn diamond_runs_b_and_c_concurrently() {
        let nodes = vec!["a", "b", "c", "d"];
        let deps = |id: &&str| -> Vec<&str> {
            match *id {
                "b" => vec!["a"],
                "c" => vec!["a"],
                "d" => vec!["b", "c"],
                _ => vec![],
            }
        };
        let waves = organize_wavefronts(&nodes, deps);
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["a"]);
        let mut wave2 = waves[1].clone();
        wave2.sort();
        assert_eq!(wave2, vec!["b", "c"]);
        assert_eq!(waves[2], vec!["d"]);
    }

    #[test]
    fn inconsistent_deps_force_dispatch_remainder() {
        // "a" depends on "missing", which never appears in `nodes` or
        // becomes completed — no wavefront is ever computable for it.
        let nodes = vec!["a"];
        let deps = |id: &&str| -> Vec<&str> {
            match *id {
                "a" => vec!["missing"],
                _ => vec![],
            }
        };
        let waves = organize_wavefronts(&nodes, deps);
        assert_eq!(waves, vec![vec!["a"]]);
    }
}
