use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use lockstep_core::{Framework, LibraryDependency, LibraryIdentity, PackageVersion};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ResolverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    pub target_framework: Framework,
    pub dependencies: Vec<LibraryDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkReferenceGroup {
    pub target_framework: Framework,
    pub references: Vec<String>,
}

/// What a source knows about one package version: its dependencies per
/// framework and the files it ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDependencyInfo {
    pub identity: LibraryIdentity,
    pub dependency_groups: Vec<DependencyGroup>,
    pub framework_reference_groups: Vec<FrameworkReferenceGroup>,
    pub files: Vec<String>,
}

impl PackageDependencyInfo {
    pub fn new(identity: LibraryIdentity) -> Self {
        Self {
            identity,
            dependency_groups: Vec::new(),
            framework_reference_groups: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn with_dependencies(
        mut self,
        target_framework: Framework,
        dependencies: Vec<LibraryDependency>,
    ) -> Self {
        self.dependency_groups.push(DependencyGroup {
            target_framework,
            dependencies,
        });
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    /// Dependencies of the group nearest to `framework`. A package without a
    /// compatible group has no dependencies for that framework.
    pub fn dependencies_for(&self, framework: &Framework) -> Vec<LibraryDependency> {
        let nearest = framework.nearest(
            self.dependency_groups
                .iter()
                .map(|group| &group.target_framework),
        );
        let Some(nearest) = nearest else {
            return Vec::new();
        };
        self.dependency_groups
            .iter()
            .find(|group| &group.target_framework == nearest)
            .map(|group| group.dependencies.clone())
            .unwrap_or_default()
    }
}

/// A feed the walker can query. Implementations do the I/O; caching and
/// request coalescing happen in [`SourceCacheContext`].
#[async_trait]
pub trait PackageSource: Send + Sync {
    fn name(&self) -> &str;

    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<PackageVersion>, ResolverError>;

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &PackageVersion,
        token: &CancellationToken,
    ) -> Result<Option<PackageDependencyInfo>, ResolverError>;
}

type VersionsCell = Arc<OnceCell<Arc<Vec<PackageVersion>>>>;
type DependencyInfoCell = Arc<OnceCell<Option<Arc<PackageDependencyInfo>>>>;

/// Scoped cache shared by every walk of a restore operation. Each key is
/// fetched at most once; concurrent callers for the same key wait on the
/// single in-flight request. Failed fetches are not cached.
#[derive(Default)]
pub struct SourceCacheContext {
    versions: DashMap<(String, String), VersionsCell>,
    dependency_info: DashMap<(String, String, String), DependencyInfoCell>,
    hits: AtomicU64,
    fetches: AtomicU64,
}

impl SourceCacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_all_versions(
        &self,
        source: &dyn PackageSource,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Arc<Vec<PackageVersion>>, ResolverError> {
        if token.is_cancelled() {
            return Err(ResolverError::Cancelled);
        }

        let key = (source.name().to_ascii_lowercase(), id.to_ascii_lowercase());
        let cell = self.versions.entry(key).or_default().clone();
        if let Some(versions) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(versions));
        }

        let fetch = cell.get_or_try_init(|| async {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            debug!(source = source.name(), id, "listing package versions");
            let mut versions = source.get_all_versions(id, token).await?;
            versions.sort();
            versions.dedup();
            Ok::<_, ResolverError>(Arc::new(versions))
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ResolverError::Cancelled),
            result = fetch => result.map(Arc::clone),
        }
    }

    pub async fn get_dependency_info(
        &self,
        source: &dyn PackageSource,
        id: &str,
        version: &PackageVersion,
        token: &CancellationToken,
    ) -> Result<Option<Arc<PackageDependencyInfo>>, ResolverError> {
        if token.is_cancelled() {
            return Err(ResolverError::Cancelled);
        }

        let key = (
            source.name().to_ascii_lowercase(),
            id.to_ascii_lowercase(),
            version.identity_key(),
        );
        let cell = self.dependency_info.entry(key).or_default().clone();
        if let Some(info) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(info.clone());
        }

        let fetch = cell.get_or_try_init(|| async {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            debug!(source = source.name(), id, %version, "reading package dependency info");
            let info = source.get_dependency_info(id, version, token).await?;
            Ok::<_, ResolverError>(info.map(Arc::new))
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ResolverError::Cancelled),
            result = fetch => result.cloned(),
        }
    }

    /// Lookups answered without waiting on a fetch.
    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SourceCacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCacheContext")
            .field("versions", &self.versions.len())
            .field("dependency_info", &self.dependency_info.len())
            .field("hits", &self.cache_hits())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

impl Drop for SourceCacheContext {
    fn drop(&mut self) {
        debug!(
            versions = self.versions.len(),
            dependency_info = self.dependency_info.len(),
            fetches = self.fetch_count(),
            "released source cache context"
        );
    }
}
