use std::collections::VecDeque;
use std::sync::Arc;

use lockstep_core::{format_id_and_range, Framework, LibraryRange, LibraryType};

use crate::context::GraphItem;

pub type NodeId = usize;

const NODE_ARROW: &str = " -> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Acceptable,
    Rejected,
    Accepted,
    PotentiallyDowngraded,
    Cycle,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acceptable => "acceptable",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
            Self::PotentiallyDowngraded => "potentially-downgraded",
            Self::Cycle => "cycle",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: LibraryRange,
    /// Missing for cycle and downgrade markers, which are never resolved.
    pub item: Option<Arc<GraphItem>>,
    pub disposition: Disposition,
    outer: Option<NodeId>,
    inner: Vec<NodeId>,
}

impl GraphNode {
    pub fn outer(&self) -> Option<NodeId> {
        self.outer
    }

    pub fn inner(&self) -> &[NodeId] {
        &self.inner
    }

    /// The resolved name when there is one, the requested name otherwise.
    pub fn id(&self) -> &str {
        self.item
            .as_ref()
            .map(|item| item.key.name.as_str())
            .unwrap_or(&self.key.name)
    }

    fn is_package(&self) -> bool {
        match &self.item {
            Some(item) if item.key.library_type == LibraryType::Package => true,
            Some(item) if item.key.library_type != LibraryType::Unresolved => false,
            _ => self.key.type_constraint.allows_packages(),
        }
    }

    fn id_and_range(&self) -> String {
        if !self.is_package() {
            return self.id().to_string();
        }
        let range = self
            .key
            .version_range
            .as_ref()
            .map(|range| range.to_non_snapshot_range());
        format_id_and_range(self.id(), range.as_ref())
    }

    fn id_and_version_or_range(&self) -> String {
        if !self.is_package() {
            return self.id().to_string();
        }
        match self.item.as_ref().and_then(|item| item.key.version.as_ref()) {
            Some(version) => format!("{} {}", self.id(), version),
            None => self.id_and_range(),
        }
    }
}

/// Owned tree produced by the walker before it is laid out in an arena.
#[derive(Debug)]
pub(crate) struct WalkNode {
    pub key: LibraryRange,
    pub item: Option<Arc<GraphItem>>,
    pub disposition: Disposition,
    pub children: Vec<WalkNode>,
}

/// One walked graph, stored as an arena. Node ids follow breadth-first order
/// from the root, so id order is also the order every analysis pass visits
/// nodes in. Detached nodes keep their parent link for path reporting.
#[derive(Debug, Clone)]
pub struct DependencyTree {
    framework: Framework,
    runtime_identifier: Option<String>,
    nodes: Vec<GraphNode>,
}

impl DependencyTree {
    pub(crate) fn from_walk(
        framework: Framework,
        runtime_identifier: Option<String>,
        root: WalkNode,
    ) -> Self {
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut queue = VecDeque::from([(root, None::<NodeId>)]);
        while let Some((walked, outer)) = queue.pop_front() {
            let id = nodes.len();
            nodes.push(GraphNode {
                key: walked.key,
                item: walked.item,
                disposition: walked.disposition,
                outer,
                inner: Vec::new(),
            });
            if let Some(parent) = outer {
                nodes[parent].inner.push(id);
            }
            for child in walked.children {
                queue.push_back((child, Some(id)));
            }
        }
        Self {
            framework,
            runtime_identifier,
            nodes,
        }
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn runtime_identifier(&self) -> Option<&str> {
        self.runtime_identifier.as_deref()
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id]
    }

    /// Every node ever created, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes still attached to the root, breadth first.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root()]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.nodes[id].inner.iter().copied());
        }
        order
    }

    /// Parent, grandparent and so on up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id].outer, move |current| self.nodes[*current].outer)
    }

    pub(crate) fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].outer {
            self.nodes[parent].inner.retain(|child| *child != id);
        }
    }

    /// Breadth-first walk that threads a state from each node to its
    /// children.
    pub(crate) fn for_each_with_state<S, F>(&mut self, initial: S, mut visit: F)
    where
        S: Copy,
        F: FnMut(NodeId, &mut GraphNode, S) -> S,
    {
        let mut queue = VecDeque::from([(self.root(), initial)]);
        while let Some((id, state)) = queue.pop_front() {
            let next = visit(id, &mut self.nodes[id], state);
            for child in &self.nodes[id].inner {
                queue.push_back((*child, next));
            }
        }
    }

    /// `A 1.0.0 -> B 1.0.0 -> C 2.0.0`
    pub fn path(&self, id: NodeId) -> String {
        let mut parts: Vec<String> = self
            .ancestors(id)
            .map(|ancestor| self.nodes[ancestor].id_and_version_or_range())
            .collect();
        parts.reverse();
        parts.push(self.nodes[id].id_and_version_or_range());
        parts.join(NODE_ARROW)
    }

    /// `A 1.0.0 -> B 1.0.0 -> C (>= 2.0.0)`
    pub fn path_with_last_range(&self, id: NodeId) -> String {
        let mut parts: Vec<String> = self
            .ancestors(id)
            .map(|ancestor| self.nodes[ancestor].id_and_version_or_range())
            .collect();
        parts.reverse();
        parts.push(self.nodes[id].id_and_range());
        parts.join(NODE_ARROW)
    }
}
