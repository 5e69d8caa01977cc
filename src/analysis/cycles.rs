// Cycle detector - finds groups of pruned members that only reference each other
//
// A pruned cycle is a strongly connected component of two or more members,
// none of which is retained. They are reported so that a caller can spot
// large clusters of dead code that keep each other "alive" by reference.

use super::RetainedSet;
use crate::graph::ReferenceGraph;
use petgraph::algo::tarjan_scc;
use serde::Serialize;
use tracing::debug;

/// A strongly connected group of pruned members
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunedCycle {
    /// Member paths in archive order
    pub members: Vec<String>,
    pub size: usize,
}

/// Detector for reference cycles among pruned members
pub struct CycleDetector;

impl CycleDetector {
    pub fn new() -> Self {
        Self
    }

    /// Find every cycle made up entirely of pruned members
    ///
    /// Returns cycles sorted by size (largest first), ties broken by the
    /// archive position of their first member.
    pub fn find_pruned_cycles(&self, graph: &ReferenceGraph, retained: &RetainedSet) -> Vec<PrunedCycle> {
        let inner = graph.inner();
        let mut cycles: Vec<(usize, PrunedCycle)> = Vec::new();

        for mut scc in tarjan_scc(inner) {
            // Single-node components are not cycles; self edges are never added
            if scc.len() < 2 {
                continue;
            }

            // A component is retained or pruned as a whole
            if scc.iter().any(|&node| retained.contains(graph.path(node))) {
                continue;
            }

            scc.sort_by_key(|node| node.index());
            let members: Vec<String> = scc.iter().map(|&node| graph.path(node).to_string()).collect();

            debug!("Found pruned cycle with {} members: {:?}", members.len(), members);

            cycles.push((
                scc[0].index(),
                PrunedCycle {
                    size: members.len(),
                    members,
                },
            ));
        }

        cycles.sort_by(|(a_pos, a), (b_pos, b)| b.size.cmp(&a.size).then(a_pos.cmp(b_pos)));
        cycles.into_iter().map(|(_, cycle)| cycle).collect()
    }
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self::new()
    }
}
