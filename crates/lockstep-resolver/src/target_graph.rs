use std::collections::HashSet;
use std::sync::Arc;

use lockstep_core::{Framework, LibraryIdentity, LibraryRange, VersionRange};

use crate::analyze::{analyze, AnalyzeResult};
use crate::context::GraphItem;
use crate::graph::{DependencyTree, Disposition, NodeId};

/// One walked edge: what `parent` asked for and what it ended up with.
/// Edges that were eclipsed or detached during analysis have no key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedDependencyKey {
    pub parent: LibraryIdentity,
    pub range: Option<VersionRange>,
    pub child: LibraryIdentity,
}

impl ResolvedDependencyKey {
    pub fn new(parent: LibraryIdentity, range: Option<VersionRange>, child: LibraryIdentity) -> Self {
        Self {
            parent,
            range,
            child,
        }
    }
}

/// The analyzed graph of one project for one framework, optionally for one
/// runtime identifier.
#[derive(Debug, Clone)]
pub struct RestoreTargetGraph {
    name: String,
    tree: DependencyTree,
    analyze_result: AnalyzeResult,
    flattened: Vec<Arc<GraphItem>>,
    unresolved: Vec<LibraryRange>,
    resolved_dependencies: Vec<ResolvedDependencyKey>,
}

impl RestoreTargetGraph {
    /// `net46`, or `net46/win-x64` for a runtime specific graph.
    pub fn graph_name(framework: &Framework, runtime_identifier: Option<&str>) -> String {
        match runtime_identifier {
            Some(runtime_identifier) if !runtime_identifier.is_empty() => {
                format!("{framework}/{runtime_identifier}")
            }
            _ => framework.to_string(),
        }
    }

    pub fn create(mut tree: DependencyTree) -> Self {
        let analyze_result = analyze(&mut tree);
        let name = Self::graph_name(tree.framework(), tree.runtime_identifier());

        let mut flattened: Vec<Arc<GraphItem>> = Vec::new();
        let mut unresolved: Vec<LibraryRange> = Vec::new();
        let mut resolved_dependencies: Vec<ResolvedDependencyKey> = Vec::new();
        let mut seen_dependencies = HashSet::new();
        for id in tree.reachable() {
            let node = tree.node(id);
            if node.disposition == Disposition::Rejected {
                continue;
            }
            let Some(item) = &node.item else {
                continue;
            };
            if item.is_unresolved() {
                if !unresolved.contains(&node.key) {
                    unresolved.push(node.key.clone());
                }
                continue;
            }

            let parent = node
                .outer()
                .and_then(|outer| tree.node(outer).item.as_ref());
            if let Some(parent) = parent {
                let key = ResolvedDependencyKey::new(
                    parent.key.clone(),
                    node.key.version_range.clone(),
                    item.key.clone(),
                );
                if seen_dependencies.insert(key.clone()) {
                    resolved_dependencies.push(key);
                }
            }
            if !flattened.iter().any(|known| known.key == item.key) {
                flattened.push(Arc::clone(item));
            }
        }

        Self {
            name,
            tree,
            analyze_result,
            flattened,
            unresolved,
            resolved_dependencies,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn framework(&self) -> &Framework {
        self.tree.framework()
    }

    pub fn runtime_identifier(&self) -> Option<&str> {
        self.tree.runtime_identifier()
    }

    pub fn tree(&self) -> &DependencyTree {
        &self.tree
    }

    pub fn analyze_result(&self) -> &AnalyzeResult {
        &self.analyze_result
    }

    /// Resolved libraries in walk order, each listed once. The root is
    /// included.
    pub fn flattened(&self) -> &[Arc<GraphItem>] {
        &self.flattened
    }

    /// Accepted libraries other than the root, sorted by name.
    pub fn libraries(&self) -> Vec<Arc<GraphItem>> {
        let root = self.root_item().map(|item| item.key.clone());
        let mut libraries: Vec<Arc<GraphItem>> = self
            .flattened
            .iter()
            .filter(|item| Some(&item.key) != root.as_ref())
            .cloned()
            .collect();
        libraries.sort_by(|a, b| a.key.cmp(&b.key));
        libraries
    }

    pub fn root_item(&self) -> Option<&Arc<GraphItem>> {
        self.tree.node(self.tree.root()).item.as_ref()
    }

    pub fn unresolved(&self) -> &[LibraryRange] {
        &self.unresolved
    }

    /// Edges between accepted nodes, in walk order.
    pub fn resolved_dependencies(&self) -> &[ResolvedDependencyKey] {
        &self.resolved_dependencies
    }

    pub fn conflicts(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.analyze_result
            .version_conflicts
            .iter()
            .map(|conflict| (conflict.selected, conflict.conflicting))
    }

    pub fn in_conflict(&self) -> bool {
        !self.analyze_result.version_conflicts.is_empty() || !self.analyze_result.converged
    }

    pub fn has_cycles(&self) -> bool {
        !self.analyze_result.cycles.is_empty()
    }

    /// Whether this graph on its own resolved cleanly.
    pub fn is_success(&self) -> bool {
        self.unresolved.is_empty() && !self.in_conflict() && !self.has_cycles()
    }
}
