use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::try_join_all;
use lockstep_core::{
    Framework, LibraryDependency, LibraryIdentity, LibraryRange, PackageVersion, TypeConstraint,
    VersionRange,
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ResolverError;
use crate::provider::ProjectLibraryProvider;
use crate::source::{PackageDependencyInfo, PackageSource, SourceCacheContext};

/// A library chosen for a range, with the dependencies it declares for the
/// framework being walked. Shared between every node that resolved to it.
#[derive(Debug, Clone)]
pub struct GraphItem {
    pub key: LibraryIdentity,
    pub dependencies: Vec<LibraryDependency>,
    /// Name of the package source that supplied the package.
    pub source: Option<String>,
    pub path: Option<PathBuf>,
    pub project_frameworks: Vec<Framework>,
    pub package: Option<Arc<PackageDependencyInfo>>,
}

impl GraphItem {
    fn unresolved(range: &LibraryRange) -> Self {
        Self {
            key: LibraryIdentity::unresolved(
                range.name.clone(),
                range
                    .version_range
                    .as_ref()
                    .and_then(|version_range| version_range.min_version().cloned()),
            ),
            dependencies: Vec::new(),
            source: None,
            path: None,
            project_frameworks: Vec::new(),
            package: None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.key.is_unresolved()
    }
}

impl PartialEq for GraphItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for GraphItem {}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FindLibraryKey {
    name: String,
    range: String,
    type_constraint: TypeConstraint,
    framework: Framework,
}

impl FindLibraryKey {
    fn new(range: &LibraryRange, framework: &Framework) -> Self {
        Self {
            name: range.name.to_ascii_lowercase(),
            range: range
                .version_range
                .as_ref()
                .map(|version_range| version_range.to_string().to_ascii_lowercase())
                .unwrap_or_default(),
            type_constraint: range.type_constraint,
            framework: framework.clone(),
        }
    }
}

/// Everything a walk needs from its surroundings: package sources, project
/// providers, the shared source cache and the cancellation token.
///
/// A range is looked up once per framework; later nodes with the same range
/// share the first answer, floating ranges included.
pub struct RemoteWalkContext {
    cache: Arc<SourceCacheContext>,
    sources: Vec<Arc<dyn PackageSource>>,
    project_providers: Vec<Arc<dyn ProjectLibraryProvider>>,
    token: CancellationToken,
    find_library_cache: DashMap<FindLibraryKey, Arc<OnceCell<Arc<GraphItem>>>>,
}

impl RemoteWalkContext {
    pub fn new(cache: Arc<SourceCacheContext>, token: CancellationToken) -> Self {
        Self {
            cache,
            sources: Vec::new(),
            project_providers: Vec::new(),
            token,
            find_library_cache: DashMap::new(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn PackageSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PackageSource>>,
    {
        self.sources.extend(sources);
        self
    }

    pub fn with_project_provider(mut self, provider: Arc<dyn ProjectLibraryProvider>) -> Self {
        self.project_providers.push(provider);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cache(&self) -> &Arc<SourceCacheContext> {
        &self.cache
    }

    pub async fn find_library(
        &self,
        range: &LibraryRange,
        framework: &Framework,
    ) -> Result<Arc<GraphItem>, ResolverError> {
        if self.token.is_cancelled() {
            return Err(ResolverError::Cancelled);
        }

        let key = FindLibraryKey::new(range, framework);
        let cell = self.find_library_cache.entry(key).or_default().clone();
        let item = cell
            .get_or_try_init(|| async {
                self.find_library_uncached(range, framework)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(item))
    }

    async fn find_library_uncached(
        &self,
        range: &LibraryRange,
        framework: &Framework,
    ) -> Result<GraphItem, ResolverError> {
        if range.type_constraint.allows_projects() {
            for provider in &self.project_providers {
                if let Some(library) = provider.get_library(range, framework) {
                    debug!(name = %library.identity.name, %framework, "resolved project");
                    return Ok(GraphItem {
                        key: library.identity,
                        dependencies: library.dependencies,
                        source: None,
                        path: library.path,
                        project_frameworks: library.frameworks,
                        package: None,
                    });
                }
            }
        }

        if range.type_constraint.allows_packages() {
            if let Some((source, version)) = self.find_best_package(range).await? {
                let info = self
                    .cache
                    .get_dependency_info(source.as_ref(), &range.name, &version, &self.token)
                    .await?;
                if let Some(info) = info {
                    debug!(
                        name = %info.identity.name,
                        %version,
                        source = source.name(),
                        "resolved package"
                    );
                    return Ok(GraphItem {
                        key: LibraryIdentity::package(info.identity.name.clone(), version),
                        dependencies: info.dependencies_for(framework),
                        source: Some(source.name().to_string()),
                        path: None,
                        project_frameworks: Vec::new(),
                        package: Some(info),
                    });
                }
            }
        }

        debug!(range = %range, %framework, "unable to resolve");
        Ok(GraphItem::unresolved(range))
    }

    /// Best version across all sources. The earlier source wins a tie.
    async fn find_best_package(
        &self,
        range: &LibraryRange,
    ) -> Result<Option<(Arc<dyn PackageSource>, PackageVersion)>, ResolverError> {
        let version_range = range
            .version_range
            .clone()
            .unwrap_or_else(VersionRange::all);

        let listings = try_join_all(self.sources.iter().map(|source| async move {
            self.cache
                .get_all_versions(source.as_ref(), &range.name, &self.token)
                .await
                .map(|versions| (source, versions))
        }))
        .await?;

        let mut best: Option<(&Arc<dyn PackageSource>, PackageVersion)> = None;
        for (source, versions) in &listings {
            let Some(candidate) = version_range.find_best_match(versions.iter()) else {
                continue;
            };
            let current = best.as_ref().map(|(_, version)| version);
            if version_range.is_better(current, candidate) {
                best = Some((*source, candidate.clone()));
            }
        }
        Ok(best.map(|(source, version)| (Arc::clone(source), version)))
    }
}
