mod analyze;
mod context;
mod error;
mod graph;
mod memory;
mod provider;
mod source;
mod target_graph;
mod walker;

pub use analyze::{analyze, AnalyzeResult, DowngradeResult, VersionConflictResult};
pub use context::{GraphItem, RemoteWalkContext};
pub use error::ResolverError;
pub use graph::{DependencyTree, Disposition, GraphNode, NodeId};
pub use memory::MemoryPackageSource;
pub use provider::{DependencyGraphSpecProvider, ProjectLibrary, ProjectLibraryProvider};
pub use source::{
    DependencyGroup, FrameworkReferenceGroup, PackageDependencyInfo, PackageSource,
    SourceCacheContext,
};
pub use target_graph::{ResolvedDependencyKey, RestoreTargetGraph};
pub use walker::{is_greater_than_or_equal, RemoteDependencyWalker};
