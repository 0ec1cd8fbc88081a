//! Warnings and errors derived from finished target graphs. Nothing here
//! changes what was resolved.

use std::collections::BTreeSet;

use lockstep_core::{
    format_id_and_range, has_missing_lower_bound, merge_on_target_graph, LibraryDependency,
    LibraryType, LogCode, PackageSpec, RestoreLogMessage,
};
use lockstep_resolver::{ResolvedDependencyKey, RestoreTargetGraph};

/// Whether the version picked for an edge is not the lower bound that was
/// asked for. Edges from or to projects are never approximate.
pub fn dependency_range_has_missing_exact_match(key: &ResolvedDependencyKey) -> bool {
    if key.parent.library_type.is_project() || key.child.library_type.is_project() {
        return false;
    }
    if key.child.library_type == LibraryType::Reference {
        return false;
    }
    let Some(min) = key.range.as_ref().and_then(|range| range.min_version()) else {
        return true;
    };
    if !key.range.as_ref().is_some_and(|range| range.is_min_inclusive()) {
        return true;
    }
    match &key.child.version {
        Some(version) => version.identity_key() != min.identity_key(),
        None => true,
    }
}

/// NU1604 for package references of the project that declare no version.
pub fn project_dependencies_missing_version(project: &PackageSpec) -> Vec<RestoreLogMessage> {
    project_package_dependencies(project)
        .into_iter()
        .filter(|(dependency, _)| dependency.version_range().is_none())
        .map(|(dependency, frameworks)| {
            RestoreLogMessage::warning(
                LogCode::NU1604,
                format!(
                    "Project dependency '{}' does not specify a version. Include a version for the dependency to ensure consistent restore results.",
                    dependency.name()
                ),
            )
            .with_library_id(dependency.name())
            .with_target_graphs(frameworks)
        })
        .collect()
}

/// NU1604 for package references of the project whose range has no
/// inclusive lower bound.
pub fn project_missing_lower_bounds(project: &PackageSpec) -> Vec<RestoreLogMessage> {
    project_package_dependencies(project)
        .into_iter()
        .filter(|(dependency, _)| {
            dependency.version_range().is_some()
                && has_missing_lower_bound(dependency.version_range())
        })
        .map(|(dependency, frameworks)| {
            RestoreLogMessage::warning(
                LogCode::NU1604,
                format!(
                    "Project dependency {} does not contain an inclusive lower bound. Include a lower bound in the dependency version to ensure consistent restore results.",
                    format_id_and_range(dependency.name(), dependency.version_range())
                ),
            )
            .with_library_id(dependency.name())
            .with_target_graphs(frameworks)
        })
        .collect()
}

/// NU1601 for direct package references that resolved to something other
/// than their lower bound.
pub fn bumped_up_dependencies(
    graphs: &[RestoreTargetGraph],
    project: &PackageSpec,
    ignore: &BTreeSet<String>,
) -> Vec<RestoreLogMessage> {
    let mut messages = Vec::new();
    for graph in graphs {
        for dependency in project.dependencies_for(graph.framework()) {
            if !dependency.library_range.type_constraint.allows_packages()
                || ignore.contains(&dependency.name().to_ascii_lowercase())
            {
                continue;
            }
            let Some(range) = dependency.version_range() else {
                continue;
            };
            let Some(min) = range.min_version() else {
                continue;
            };
            let Some(resolved) = graph.flattened().iter().find(|item| {
                item.key.library_type == LibraryType::Package
                    && item.key.name.eq_ignore_ascii_case(dependency.name())
            }) else {
                continue;
            };
            let bumped = resolved
                .key
                .version
                .as_ref()
                .is_some_and(|version| version.identity_key() != min.identity_key());
            if bumped {
                messages.push(
                    RestoreLogMessage::warning(
                        LogCode::NU1601,
                        format!(
                            "Dependency specified was {} but ended up with {}.",
                            format_id_and_range(dependency.name(), Some(range)),
                            resolved.key
                        ),
                    )
                    .with_library_id(dependency.name())
                    .with_target_graphs([graph.name()]),
                );
            }
        }
    }
    messages
}

/// NU1602 and NU1603 for graph edges that resolved to an approximate match.
/// NU1603 is left out in locked mode, where the lock decides versions.
pub fn graph_missing_lower_bounds(
    graphs: &[RestoreTargetGraph],
    ignore: &BTreeSet<String>,
    locked_mode: bool,
) -> Vec<RestoreLogMessage> {
    let mut messages = Vec::new();
    for graph in graphs {
        for key in graph.resolved_dependencies() {
            if ignore.contains(&key.child.name_key()) || !dependency_range_has_missing_exact_match(key)
            {
                continue;
            }
            let range = key.range.as_ref();
            let message = if has_missing_lower_bound(range) {
                RestoreLogMessage::warning(
                    LogCode::NU1602,
                    format!(
                        "{} does not provide an inclusive lower bound for dependency {}. An approximate best match of {} was resolved.",
                        key.parent,
                        format_id_and_range(&key.child.name, range),
                        key.child
                    ),
                )
            } else if locked_mode {
                continue;
            } else {
                let min = range
                    .and_then(|range| range.min_version())
                    .map(ToString::to_string)
                    .unwrap_or_default();
                RestoreLogMessage::warning(
                    LogCode::NU1603,
                    format!(
                        "{} depends on {} but {} {min} was not found. An approximate best match of {} was resolved.",
                        key.parent,
                        format_id_and_range(&key.child.name, range),
                        key.child.name,
                        key.child
                    ),
                )
            };
            messages.push(
                message
                    .with_library_id(key.child.name.clone())
                    .with_target_graphs([graph.name()]),
            );
        }
    }
    messages
}

/// NU1608 for declared dependencies whose upper bound the version finally
/// chosen for that name exceeds. Eclipsed declarations count too.
pub fn dependencies_above_upper_bounds(graphs: &[RestoreTargetGraph]) -> Vec<RestoreLogMessage> {
    let mut messages = Vec::new();
    for graph in graphs {
        let flattened = graph.flattened();
        for parent in flattened {
            if parent.key.library_type.is_project() {
                continue;
            }
            for dependency in &parent.dependencies {
                let Some(range) = dependency.version_range() else {
                    continue;
                };
                if !range.has_upper_bound() {
                    continue;
                }
                let Some(child) = flattened.iter().find(|item| {
                    item.key.library_type == LibraryType::Package
                        && item.key.name.eq_ignore_ascii_case(dependency.name())
                }) else {
                    continue;
                };
                let Some(version) = child.key.version.as_ref() else {
                    continue;
                };
                let above = range.max_version().is_some_and(|max| version >= max);
                if range.satisfies(version) || !above {
                    continue;
                }
                messages.push(
                    RestoreLogMessage::warning(
                        LogCode::NU1608,
                        format!(
                            "Detected package version outside of dependency constraint: {} requires {} but version {} was resolved.",
                            parent.key,
                            format_id_and_range(dependency.name(), Some(range)),
                            child.key
                        ),
                    )
                    .with_library_id(child.key.name.clone())
                    .with_target_graphs([graph.name()]),
                );
            }
        }
    }
    messages
}

/// All dependency warnings for a project, merged across target graphs. A
/// library reported as bumped or missing a project-level bound is not
/// reported again for its graph edges.
pub fn unexpected_dependency_messages(
    graphs: &[RestoreTargetGraph],
    project: &PackageSpec,
    locked_mode: bool,
) -> Vec<RestoreLogMessage> {
    let mut messages = Vec::new();
    let mut ignore: BTreeSet<String> = BTreeSet::new();

    let missing_bounds = project_missing_lower_bounds(project);
    ignore.extend(library_ids(&missing_bounds));
    messages.extend(missing_bounds);
    messages.extend(project_dependencies_missing_version(project));

    let bumped = bumped_up_dependencies(graphs, project, &ignore);
    ignore.extend(library_ids(&bumped));
    messages.extend(bumped);

    messages.extend(graph_missing_lower_bounds(graphs, &ignore, locked_mode));
    messages.extend(dependencies_above_upper_bounds(graphs));

    merge_on_target_graph(messages)
}

/// NU1100 for every range the graph could not resolve.
pub fn unresolved_messages(graph: &RestoreTargetGraph) -> Vec<RestoreLogMessage> {
    graph
        .unresolved()
        .iter()
        .map(|range| {
            let range_text = if range.type_constraint.allows_packages() {
                format_id_and_range(&range.name, range.version_range.as_ref())
            } else {
                range.name.clone()
            };
            RestoreLogMessage::error(
                LogCode::NU1100,
                format!("Unable to resolve {range_text} for {}.", graph.name()),
            )
            .with_library_id(range.name.clone())
            .with_target_graphs([graph.name()])
        })
        .collect()
}

/// NU1108 for every cycle, with the path that closes it.
pub fn cycle_messages(graph: &RestoreTargetGraph) -> Vec<RestoreLogMessage> {
    let tree = graph.tree();
    graph
        .analyze_result()
        .cycles
        .iter()
        .map(|&cycle| {
            RestoreLogMessage::error(
                LogCode::NU1108,
                format!("Cycle detected.\n  {}", tree.path(cycle)),
            )
            .with_library_id(tree.node(cycle).id())
            .with_target_graphs([graph.name()])
        })
        .collect()
}

/// NU1107 for every accepted library a sibling request does not allow.
pub fn conflict_messages(graph: &RestoreTargetGraph, project: &PackageSpec) -> Vec<RestoreLogMessage> {
    let tree = graph.tree();
    graph
        .analyze_result()
        .version_conflicts
        .iter()
        .map(|conflict| {
            let selected = tree.node(conflict.selected);
            let name = selected.id();
            let version = selected
                .item
                .as_ref()
                .and_then(|item| item.key.version.as_ref())
                .map(|version| format!(" {version}"))
                .unwrap_or_default();
            RestoreLogMessage::error(
                LogCode::NU1107,
                format!(
                    "Version conflict detected for {name}. Reference {name}{version} directly from project {} to resolve this issue.\n {}\n {}",
                    project.name,
                    tree.path_with_last_range(conflict.selected),
                    tree.path_with_last_range(conflict.conflicting)
                ),
            )
            .with_library_id(name)
            .with_target_graphs([graph.name()])
        })
        .collect()
}

/// NU1605 for every downgrade that survived conflict resolution.
pub fn downgrade_messages(graph: &RestoreTargetGraph) -> Vec<RestoreLogMessage> {
    let tree = graph.tree();
    graph
        .analyze_result()
        .downgrades
        .iter()
        .filter(|downgrade| tree.is_relevant_downgrade(downgrade))
        .map(|downgrade| {
            let from = tree.node(downgrade.downgraded_from);
            let to = tree.node(downgrade.downgraded_to);
            let from_version = from
                .key
                .version_range
                .as_ref()
                .and_then(|range| range.min_version())
                .map(ToString::to_string)
                .unwrap_or_default();
            let to_version = to
                .item
                .as_ref()
                .and_then(|item| item.key.version.as_ref())
                .map(ToString::to_string)
                .unwrap_or_default();
            RestoreLogMessage::warning(
                LogCode::NU1605,
                format!(
                    "Detected package downgrade: {} from {from_version} to {to_version}. Reference the package directly from the project to select a different version.\n {}\n {}",
                    to.id(),
                    tree.path_with_last_range(downgrade.downgraded_from),
                    tree.path(downgrade.downgraded_to)
                ),
            )
            .with_library_id(to.id())
            .with_target_graphs([graph.name()])
        })
        .collect()
}

/// NU1106 when conflict resolution gave up before settling every node.
pub fn convergence_messages(graph: &RestoreTargetGraph) -> Vec<RestoreLogMessage> {
    if graph.analyze_result().converged {
        return Vec::new();
    }
    vec![RestoreLogMessage::error(
        LogCode::NU1106,
        format!(
            "Unable to satisfy conflicting requests for {}. Dependency conflict resolution did not settle.",
            graph.name()
        ),
    )
    .with_target_graphs([graph.name()])]
}

/// Every error and warning a single graph produces on its own.
pub fn graph_messages(graph: &RestoreTargetGraph, project: &PackageSpec) -> Vec<RestoreLogMessage> {
    let mut messages = unresolved_messages(graph);
    messages.extend(cycle_messages(graph));
    messages.extend(conflict_messages(graph, project));
    messages.extend(convergence_messages(graph));
    messages.extend(downgrade_messages(graph));
    messages
}

/// Package references of the project, each listed once with the target
/// graphs it applies to.
fn project_package_dependencies(
    project: &PackageSpec,
) -> Vec<(LibraryDependency, Vec<String>)> {
    let mut found: Vec<(LibraryDependency, Vec<String>)> = Vec::new();
    for framework in project.frameworks() {
        for dependency in project.dependencies_for(&framework) {
            if !dependency.library_range.type_constraint.allows_packages()
                || dependency.auto_referenced
            {
                continue;
            }
            match found.iter_mut().find(|(known, _)| known == &dependency) {
                Some((_, frameworks)) => frameworks.push(framework.to_string()),
                None => found.push((dependency, vec![framework.to_string()])),
            }
        }
    }
    found
}

fn library_ids(messages: &[RestoreLogMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|message| message.library_id.as_deref())
        .map(str::to_ascii_lowercase)
        .collect()
}
