//! Forward and reverse import adjacency over the full closure of a package

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use tracing::debug;

use crate::error::Result;
use crate::model::{DependencyNode, PackageId, PackageMetadata, DEFAULT_MAX_DEPTH};
use crate::tree::TreeBuilder;

/// Import graph with edges pointing from importer to imported package.
///
/// Unlike a [`DependencyNode`] tree this is not depth-bounded, so it can answer
/// "what imports P" for anything reachable from the root.
pub struct RelationIndex {
    root: PackageId,
    inner: StableDiGraph<Arc<PackageMetadata>, ()>,
    nodes: HashMap<PackageId, NodeIndex>,
}

impl std::fmt::Debug for RelationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationIndex")
            .field("root", &self.root)
            .field("package_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl RelationIndex {
    /// Breadth-first closure over every import reachable from `root`.
    ///
    /// Standard-distribution packages and `"C"` are left out. Packages are fetched as needed,
    /// exactly as during a tree build, and any failure aborts the closure.
    pub async fn build(builder: &TreeBuilder, root: &PackageId) -> Result<Self> {
        let mut index = RelationIndex {
            root: root.clone(),
            inner: StableDiGraph::new(),
            nodes: HashMap::new(),
        };

        let mut seen: HashSet<PackageId> = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(root.clone());
        queue.push_back(root.clone());

        while let Some(id) = queue.pop_front() {
            if id.is_cgo() {
                continue;
            }
            let metadata = builder.ensure(&id).await?;
            if metadata.standard {
                continue;
            }

            for import in &metadata.imports {
                if seen.insert(import.clone()) {
                    queue.push_back(import.clone());
                }
            }
            let idx = index.inner.add_node(metadata);
            index.nodes.insert(id, idx);
        }

        let edges: Vec<(NodeIndex, NodeIndex)> = index
            .nodes
            .values()
            .flat_map(|&from| {
                index.inner[from]
                    .imports
                    .iter()
                    .filter_map(|import| index.nodes.get(import))
                    .map(move |&to| (from, to))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (from, to) in edges {
            index.inner.add_edge(from, to, ());
        }

        debug!("{:?}", index);
        Ok(index)
    }

    pub fn root(&self) -> &PackageId {
        &self.root
    }

    pub fn package_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn contains(&self, id: &PackageId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct imports of `id` inside the closure, sorted.
    pub fn imports(&self, id: &PackageId) -> Vec<PackageId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Packages in the closure that import `id` directly, sorted.
    pub fn importers(&self, id: &PackageId) -> Vec<PackageId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Forward subtree rooted at `id`.
    pub fn lookup(&self, id: &PackageId) -> Option<DependencyNode> {
        self.subtree(id, Direction::Outgoing, DEFAULT_MAX_DEPTH)
    }

    /// Tree whose children are importers rather than imports.
    pub fn reverse_tree(&self, id: &PackageId, max_depth: usize) -> Option<DependencyNode> {
        self.subtree(id, Direction::Incoming, max_depth)
    }

    fn neighbors(&self, id: &PackageId, direction: Direction) -> Vec<PackageId> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<PackageId> = self
            .inner
            .neighbors_directed(idx, direction)
            .map(|n| self.inner[n].id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn subtree(&self, id: &PackageId, direction: Direction, max_depth: usize) -> Option<DependencyNode> {
        if !self.contains(id) {
            return None;
        }
        let mut path = Vec::new();
        Some(self.walk(id, direction, 0, max_depth, &mut path))
    }

    /// Packages already on the current path are not expanded again.
    fn walk(
        &self,
        id: &PackageId,
        direction: Direction,
        depth: usize,
        max_depth: usize,
        path: &mut Vec<PackageId>,
    ) -> DependencyNode {
        let mut node = DependencyNode::new(id.clone());
        if let Some(&idx) = self.nodes.get(id) {
            node.attach_files(&self.inner[idx]);
        }
        if depth >= max_depth || path.contains(id) {
            return node;
        }

        path.push(id.clone());
        for next in self.neighbors(id, direction) {
            node.add_child(self.walk(&next, direction, depth + 1, max_depth, path));
        }
        path.pop();
        node
    }
}
