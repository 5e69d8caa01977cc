//! Member reference graph
//!
//! One node per archive member, one edge per distinct "A needs B" fact.

mod builder;
pub mod reference;

pub use builder::{
    is_service_file, service_providers, Extraction, ExtractionOptions, GraphBuilder,
    MalformedClassPolicy, ResourceMatching, SERVICES_DIR,
};
pub use reference::ReferenceKind;

use crate::archive::ArchiveIndex;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Directed graph over archive members
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    /// Nodes are member paths, edges the first kind of reference seen
    inner: DiGraph<String, ReferenceKind>,

    /// Map from member path to node index
    node_map: HashMap<String, NodeIndex>,

    /// Endpoints of every edge, for constant-time deduplication
    edges: HashSet<(NodeIndex, NodeIndex)>,
}

impl ReferenceGraph {
    /// Create a graph with one node per member, in archive order
    pub fn new(index: &ArchiveIndex) -> Self {
        let mut inner = DiGraph::with_capacity(index.len(), index.len() * 4);
        let mut node_map = HashMap::with_capacity(index.len());

        for member in index.members() {
            let node = inner.add_node(member.path.clone());
            node_map.insert(member.path.clone(), node);
        }

        Self {
            inner,
            node_map,
            edges: HashSet::new(),
        }
    }

    /// Add an edge between two members
    ///
    /// Unknown endpoints, self references and repeats of an existing edge
    /// are ignored. Returns whether an edge was added.
    pub fn add_reference(&mut self, from: &str, to: &str, kind: ReferenceKind) -> bool {
        let (Some(&from_idx), Some(&to_idx)) = (self.node_map.get(from), self.node_map.get(to)) else {
            return false;
        };
        if from_idx == to_idx || !self.edges.insert((from_idx, to_idx)) {
            return false;
        }
        self.inner.add_edge(from_idx, to_idx, kind);
        true
    }

    pub fn node_index(&self, path: &str) -> Option<NodeIndex> {
        self.node_map.get(path).copied()
    }

    /// Member path of a node
    pub fn path(&self, node: NodeIndex) -> &str {
        &self.inner[node]
    }

    /// Direct successors of a node in the order their edges were added
    pub fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut targets: Vec<NodeIndex> = self.inner.edges(node).map(|e| e.target()).collect();
        // petgraph yields outgoing edges newest first
        targets.reverse();
        targets
    }

    /// Outgoing references of a member as `(target path, kind)`, in insertion order
    pub fn references_from(&self, path: &str) -> Vec<(&str, ReferenceKind)> {
        let Some(node) = self.node_index(path) else {
            return Vec::new();
        };

        let mut refs: Vec<(&str, ReferenceKind)> = self
            .inner
            .edges(node)
            .map(|e| (self.inner[e.target()].as_str(), *e.weight()))
            .collect();
        refs.reverse();
        refs
    }

    pub fn member_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn reference_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Underlying petgraph graph
    pub fn inner(&self) -> &DiGraph<String, ReferenceKind> {
        &self.inner
    }
}
