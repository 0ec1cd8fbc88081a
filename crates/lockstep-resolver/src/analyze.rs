use std::collections::BTreeMap;

use lockstep_core::{LibraryIdentity, LibraryType};
use tracing::{debug, warn};

use crate::graph::{DependencyTree, Disposition, NodeId};
use crate::walker::is_greater_than_or_equal;

const PATIENCE: usize = 1000;

/// A nearer request for a lower version won over a farther request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DowngradeResult {
    pub downgraded_from: NodeId,
    pub downgraded_to: NodeId,
}

/// An accepted library whose version a sibling request does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionConflictResult {
    pub selected: NodeId,
    pub conflicting: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeResult {
    pub cycles: Vec<NodeId>,
    pub downgrades: Vec<DowngradeResult>,
    pub version_conflicts: Vec<VersionConflictResult>,
    /// False when conflict resolution gave up before every node was decided.
    pub converged: bool,
}

/// Detaches cycle and downgrade markers, then accepts or rejects every
/// remaining node. Node ids in the result refer to `tree`.
pub fn analyze(tree: &mut DependencyTree) -> AnalyzeResult {
    let mut result = AnalyzeResult::default();
    check_cycles_and_nearest_wins(tree, &mut result);
    result.converged = resolve_conflicts(tree, &mut result);
    debug!(
        framework = %tree.framework(),
        cycles = result.cycles.len(),
        downgrades = result.downgrades.len(),
        conflicts = result.version_conflicts.len(),
        converged = result.converged,
        "analyzed dependency graph"
    );
    result
}

impl DependencyTree {
    /// A downgrade worth reporting: the winner was accepted and every library
    /// that asked for the higher version was accepted too.
    pub fn is_relevant_downgrade(&self, downgrade: &DowngradeResult) -> bool {
        self.node(downgrade.downgraded_to).disposition == Disposition::Accepted
            && self
                .ancestors(downgrade.downgraded_from)
                .all(|ancestor| self.node(ancestor).disposition == Disposition::Accepted)
    }
}

fn check_cycles_and_nearest_wins(tree: &mut DependencyTree, result: &mut AnalyzeResult) {
    let mut downgrades: BTreeMap<NodeId, NodeId> = BTreeMap::new();

    for id in tree.reachable() {
        match tree.node(id).disposition {
            Disposition::Cycle => {
                result.cycles.push(id);
                tree.detach(id);
            }
            Disposition::PotentiallyDowngraded => {
                let name = tree.node(id).key.name.clone();
                let ancestors: Vec<NodeId> = tree.ancestors(id).collect();
                for ancestor in ancestors {
                    for &side in tree.node(ancestor).inner() {
                        if side == id || !tree.node(side).key.name.eq_ignore_ascii_case(&name) {
                            continue;
                        }
                        let node_range = tree.node(id).key.version_range.as_ref();
                        let side_range = tree.node(side).key.version_range.as_ref();
                        let (Some(node_range), Some(side_range)) = (node_range, side_range) else {
                            downgrades.remove(&id);
                            continue;
                        };
                        if is_greater_than_or_equal(side_range, node_range) {
                            downgrades.remove(&id);
                            continue;
                        }

                        // No lower version was available, so the nearer
                        // request was bumped into this range after all.
                        let resolved = tree
                            .node(side)
                            .item
                            .as_ref()
                            .and_then(|item| item.key.version.as_ref());
                        if resolved.is_some_and(|version| node_range.satisfies(version)) {
                            continue;
                        }
                        downgrades.insert(id, side);
                    }
                }
                tree.detach(id);
            }
            _ => {}
        }
    }

    result.downgrades = downgrades
        .into_iter()
        .map(|(downgraded_from, downgraded_to)| DowngradeResult {
            downgraded_from,
            downgraded_to,
        })
        .collect();
}

#[derive(Debug, Default)]
struct TrackerEntry {
    items: Vec<LibraryIdentity>,
    ambiguous: bool,
}

/// Every distinct library seen per name during one resolution pass.
#[derive(Debug, Default)]
struct Tracker {
    entries: BTreeMap<String, TrackerEntry>,
}

impl Tracker {
    fn entry(&mut self, item: &LibraryIdentity) -> &mut TrackerEntry {
        self.entries.entry(item.name_key()).or_default()
    }

    fn track(&mut self, item: &LibraryIdentity) {
        let entry = self.entry(item);
        if !entry.items.contains(item) {
            entry.items.push(item.clone());
        }
    }

    fn is_disputed(&self, item: &LibraryIdentity) -> bool {
        self.entries
            .get(&item.name_key())
            .is_some_and(|entry| entry.items.len() > 1)
    }

    fn is_ambiguous(&self, item: &LibraryIdentity) -> bool {
        self.entries
            .get(&item.name_key())
            .is_some_and(|entry| entry.ambiguous)
    }

    fn mark_ambiguous(&mut self, item: &LibraryIdentity) {
        self.entry(item).ambiguous = true;
    }

    fn is_best_version(&self, item: &LibraryIdentity) -> bool {
        self.entries.get(&item.name_key()).map_or(true, |entry| {
            entry
                .items
                .iter()
                .all(|known| item.version >= known.version)
        })
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Walking,
    Rejected,
    Ambiguous,
}

/// Repeats accept/reject passes until no node is left undecided. Returns
/// false when patience runs out first.
fn resolve_conflicts(tree: &mut DependencyTree, result: &mut AnalyzeResult) -> bool {
    let mut accepted: BTreeMap<String, NodeId> = BTreeMap::new();
    let mut tracker = Tracker::default();
    let mut incomplete = true;
    let mut passes = 0;

    while incomplete && passes < PATIENCE {
        passes += 1;

        // Children of rejected nodes are rejected; everything else is tracked.
        tree.for_each_with_state(true, |_, node, walking| {
            if !walking || node.disposition == Disposition::Rejected {
                node.disposition = Disposition::Rejected;
                return false;
            }
            if let Some(item) = &node.item {
                tracker.track(&item.key);
            }
            true
        });

        // Anything below a disputed library cannot be decided this pass.
        tree.for_each_with_state(WalkState::Walking, |_, node, state| {
            if node.disposition == Disposition::Rejected {
                return WalkState::Rejected;
            }
            let Some(item) = &node.item else {
                return state;
            };
            if state == WalkState::Walking && tracker.is_disputed(&item.key) {
                return WalkState::Ambiguous;
            }
            if state == WalkState::Ambiguous {
                tracker.mark_ambiguous(&item.key);
            }
            state
        });

        tree.for_each_with_state(true, |id, node, walking| {
            if !walking || node.disposition == Disposition::Rejected {
                return false;
            }
            let Some(item) = &node.item else {
                return false;
            };
            if tracker.is_ambiguous(&item.key) {
                return false;
            }
            if node.disposition == Disposition::Acceptable {
                if tracker.is_best_version(&item.key) {
                    node.disposition = Disposition::Accepted;
                    accepted.insert(node.key.name.to_ascii_lowercase(), id);
                } else {
                    node.disposition = Disposition::Rejected;
                }
            }
            node.disposition == Disposition::Accepted
        });

        incomplete = tree
            .reachable()
            .into_iter()
            .any(|id| tree.node(id).disposition == Disposition::Acceptable);
        tracker.clear();
    }

    if incomplete {
        warn!(
            framework = %tree.framework(),
            passes, "conflict resolution did not converge"
        );
    }

    detect_conflicts(tree, &accepted, result);
    !incomplete
}

fn detect_conflicts(
    tree: &DependencyTree,
    accepted: &BTreeMap<String, NodeId>,
    result: &mut AnalyzeResult,
) {
    for id in tree.reachable() {
        if tree.node(id).disposition != Disposition::Accepted {
            continue;
        }
        for &child in tree.node(id).inner() {
            let child_node = tree.node(child);
            let Some(&selected) = accepted.get(&child_node.key.name.to_ascii_lowercase()) else {
                continue;
            };
            if selected == child {
                continue;
            }
            let Some(range) = child_node.key.version_range.as_ref() else {
                continue;
            };
            let Some(selected_item) = tree.node(selected).item.as_ref() else {
                continue;
            };
            let Some(version) = selected_item.key.version.as_ref() else {
                continue;
            };

            // A project overriding a package request is not a conflict.
            let selected_type = selected_item.key.library_type;
            if selected_type.is_project() || selected_type == LibraryType::Unresolved {
                continue;
            }
            if !child_node.key.type_constraint.allows(selected_type) {
                continue;
            }
            if !range.satisfies(version) {
                result.version_conflicts.push(VersionConflictResult {
                    selected,
                    conflicting: child,
                });
            }
        }
    }
}
