use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use lockstep_core::{FloatBehavior, Framework, LibraryRange, VersionRange};
use tracing::debug;

use crate::context::{GraphItem, RemoteWalkContext};
use crate::error::ResolverError;
use crate::graph::{DependencyTree, Disposition, WalkNode};

/// Link in the chain of libraries above the node being expanded. `via` is
/// the index of the dependency that leads down from `item`.
struct Ancestor {
    item: Arc<GraphItem>,
    via: usize,
    parent: Option<Arc<Ancestor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyResult {
    Acceptable,
    Eclipsed,
    PotentiallyDowngraded,
    Cycle,
}

/// Expands a root library into the full tree of what it depends on for one
/// framework. Dependencies are expanded in declaration order; siblings are
/// resolved concurrently.
pub struct RemoteDependencyWalker<'a> {
    context: &'a RemoteWalkContext,
}

impl<'a> RemoteDependencyWalker<'a> {
    pub fn new(context: &'a RemoteWalkContext) -> Self {
        Self { context }
    }

    pub async fn walk(
        &self,
        root: LibraryRange,
        framework: &Framework,
        runtime_identifier: Option<&str>,
    ) -> Result<DependencyTree, ResolverError> {
        debug!(root = %root, %framework, runtime_identifier, "walking dependency graph");
        let walked = self.create_node(root, framework, None).await?;
        Ok(DependencyTree::from_walk(
            framework.clone(),
            runtime_identifier.map(str::to_string),
            walked,
        ))
    }

    fn create_node<'f>(
        &'f self,
        range: LibraryRange,
        framework: &'f Framework,
        chain: Option<Arc<Ancestor>>,
    ) -> BoxFuture<'f, Result<WalkNode, ResolverError>> {
        async move {
            let item = self.context.find_library(&range, framework).await?;
            let is_root = chain.is_none();

            let mut pending: Vec<BoxFuture<'f, Result<WalkNode, ResolverError>>> = Vec::new();
            for (index, dependency) in item.dependencies.iter().enumerate() {
                // A dependency that keeps all its assets private stops the walk
                // below the root.
                if !is_root && dependency.suppresses_parent() {
                    continue;
                }

                let child_range = dependency.library_range.clone();
                match evaluate(chain.as_ref(), &child_range) {
                    DependencyResult::Acceptable => {
                        let child_chain = Arc::new(Ancestor {
                            item: Arc::clone(&item),
                            via: index,
                            parent: chain.clone(),
                        });
                        pending.push(self.create_node(child_range, framework, Some(child_chain)));
                    }
                    DependencyResult::Eclipsed => {}
                    result @ (DependencyResult::Cycle | DependencyResult::PotentiallyDowngraded) => {
                        let disposition = if result == DependencyResult::Cycle {
                            Disposition::Cycle
                        } else {
                            Disposition::PotentiallyDowngraded
                        };
                        let marker = WalkNode {
                            key: child_range,
                            item: None,
                            disposition,
                            children: Vec::new(),
                        };
                        pending.push(future::ready(Ok(marker)).boxed());
                    }
                }
            }

            let children = future::try_join_all(pending).await?;
            Ok(WalkNode {
                key: range,
                item: Some(item),
                disposition: Disposition::Acceptable,
                children,
            })
        }
        .boxed()
    }
}

/// Decides what to do with `range` given the libraries above it: a name
/// already on the path is a cycle, and a nearer declaration of the same name
/// eclipses it or, when the nearer one asks for less, marks a possible
/// downgrade.
fn evaluate(chain: Option<&Arc<Ancestor>>, range: &LibraryRange) -> DependencyResult {
    let mut current = chain;
    while let Some(ancestor) = current {
        if ancestor.item.key.name.eq_ignore_ascii_case(&range.name) {
            return DependencyResult::Cycle;
        }

        for (index, sibling) in ancestor.item.dependencies.iter().enumerate() {
            if index == ancestor.via || !range.is_eclipsed_by(&sibling.library_range) {
                continue;
            }
            if let (Some(near), Some(far)) = (sibling.version_range(), range.version_range.as_ref()) {
                if !is_greater_than_or_equal(near, far) {
                    return DependencyResult::PotentiallyDowngraded;
                }
            }
            return DependencyResult::Eclipsed;
        }

        current = ancestor.parent.as_ref();
    }
    DependencyResult::Acceptable
}

/// Whether the nearer range asks for at least as much as the farther one,
/// judged by lower bounds. Floating ranges compare by the highest version
/// they could float to, then by release prefix.
pub fn is_greater_than_or_equal(near: &VersionRange, far: &VersionRange) -> bool {
    if !near.has_lower_bound() {
        return true;
    }
    if !far.has_lower_bound() {
        return false;
    }
    if !near.is_floating() && !far.is_floating() {
        return match (near.min_version(), far.min_version()) {
            (Some(near_min), Some(far_min)) => near_min >= far_min,
            _ => true,
        };
    }

    if floats_over_everything(near) {
        return true;
    }
    if floats_over_everything(far) {
        return false;
    }

    match release_free_ceiling(near).cmp(&release_free_ceiling(far)) {
        Ordering::Equal => {}
        ordering => return ordering == Ordering::Greater,
    }

    let near_release = release_prefix(near);
    let far_release = release_prefix(far);
    if near_release.is_empty() {
        return true;
    }
    if far_release.is_empty() {
        return false;
    }
    let length = near_release.chars().count().min(far_release.chars().count());
    near_release
        .chars()
        .take(length)
        .ge(far_release.chars().take(length))
}

fn floats_over_everything(range: &VersionRange) -> bool {
    range
        .float()
        .is_some_and(|float| float.is_floating() && float.behavior() == FloatBehavior::Major)
}

fn release_free_ceiling(range: &VersionRange) -> [u64; 4] {
    let Some(min) = range.min_version() else {
        return [0; 4];
    };
    let behavior = range
        .float()
        .filter(|float| float.is_floating())
        .map(|float| float.behavior())
        .unwrap_or(FloatBehavior::None);
    match behavior {
        FloatBehavior::Major => [u64::MAX; 4],
        FloatBehavior::Minor => [min.major(), u64::MAX, u64::MAX, u64::MAX],
        FloatBehavior::Patch => [min.major(), min.minor(), u64::MAX, u64::MAX],
        FloatBehavior::Revision => [min.major(), min.minor(), min.patch(), u64::MAX],
        _ => [min.major(), min.minor(), min.patch(), min.revision()],
    }
}

fn release_prefix(range: &VersionRange) -> String {
    let release = match range.float().filter(|float| float.is_floating()) {
        Some(float) => float
            .release_prefix()
            .map(str::to_string)
            .unwrap_or_else(|| float.min_version().release()),
        None => range
            .min_version()
            .map(|min| min.release())
            .unwrap_or_default(),
    };
    release.trim_matches('-').to_ascii_lowercase()
}
