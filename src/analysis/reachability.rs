use super::KeepSet;
use crate::archive::{ArchiveIndex, ArchiveMember};
use crate::graph::ReferenceGraph;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Member paths to keep, in the order they were discovered
#[derive(Debug, Clone, Default)]
pub struct RetainedSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl RetainedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns false if it was already present
    pub fn insert(&mut self, path: &str) -> bool {
        if !self.members.insert(path.to_string()) {
            return false;
        }
        self.order.push(path.to_string());
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.members.contains(path)
    }

    /// Paths in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<String> for RetainedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = RetainedSet::new();
        for path in iter {
            set.insert(&path);
        }
        set
    }
}

/// Computes the closure of members reachable from the keep set
pub struct ReachabilityResolver;

impl ReachabilityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Breadth-first search from every root at once
    ///
    /// Roots are enqueued in keep-set order and successors in edge
    /// insertion order, so the discovery order is stable across runs.
    pub fn resolve(&self, graph: &ReferenceGraph, keep: &KeepSet) -> RetainedSet {
        let mut visited = vec![false; graph.member_count()];
        let mut queue = VecDeque::new();
        let mut retained = RetainedSet::new();

        for root in keep.roots() {
            let Some(node) = graph.node_index(root) else {
                debug!("Root {} is not an archive member", root);
                continue;
            };
            if !visited[node.index()] {
                visited[node.index()] = true;
                queue.push_back(node);
            }
        }

        while let Some(node) = queue.pop_front() {
            retained.insert(graph.path(node));

            for next in graph.successors(node) {
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    queue.push_back(next);
                }
            }
        }

        info!(
            "Retained {} of {} members from {} roots",
            retained.len(),
            graph.member_count(),
            keep.len()
        );
        retained
    }

    /// Members of `index` not in `retained`, in archive order
    pub fn find_pruned<'a>(&self, index: &'a ArchiveIndex, retained: &RetainedSet) -> Vec<&'a ArchiveMember> {
        index
            .members()
            .iter()
            .filter(|m| !retained.contains(&m.path))
            .collect()
    }
}

impl Default for ReachabilityResolver {
    fn default() -> Self {
        Self::new()
    }
}
