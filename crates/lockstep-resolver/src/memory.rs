use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use lockstep_core::{Framework, LibraryDependency, LibraryIdentity, PackageVersion};
use tokio_util::sync::CancellationToken;

use crate::error::ResolverError;
use crate::source::{PackageDependencyInfo, PackageSource};

/// A package feed held in memory. Counts every call it receives so callers
/// can check what reached the feed and what was served from a cache.
#[derive(Debug, Default)]
pub struct MemoryPackageSource {
    name: String,
    packages: BTreeMap<String, BTreeMap<PackageVersion, PackageDependencyInfo>>,
    latency: Option<Duration>,
    failing: bool,
    version_calls: DashMap<String, usize>,
    info_calls: DashMap<String, usize>,
}

impl MemoryPackageSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_package(mut self, info: PackageDependencyInfo) -> Self {
        self.add_package(info);
        self
    }

    /// Adds `id version` with `dependencies` for every framework.
    pub fn with_simple_package(
        self,
        id: &str,
        version: PackageVersion,
        dependencies: Vec<LibraryDependency>,
    ) -> Self {
        self.with_package(
            PackageDependencyInfo::new(LibraryIdentity::package(id, version))
                .with_dependencies(Framework::any(), dependencies),
        )
    }

    /// Delays every answer, which keeps concurrent requests in flight together.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every call fail with a source error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn add_package(&mut self, info: PackageDependencyInfo) {
        let Some(version) = info.identity.version.clone() else {
            return;
        };
        self.packages
            .entry(info.identity.name_key())
            .or_default()
            .insert(version, info);
    }

    pub fn version_calls(&self, id: &str) -> usize {
        self.version_calls
            .get(&id.to_ascii_lowercase())
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn dependency_info_calls(&self, id: &str) -> usize {
        self.info_calls
            .get(&id.to_ascii_lowercase())
            .map(|count| *count)
            .unwrap_or(0)
    }

    async fn answer(&self, id: &str, token: &CancellationToken) -> Result<(), ResolverError> {
        if let Some(latency) = self.latency {
            tokio::select! {
                _ = token.cancelled() => return Err(ResolverError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if self.failing {
            return Err(ResolverError::source_failure(
                &self.name,
                id,
                "the source is unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PackageSource for MemoryPackageSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<PackageVersion>, ResolverError> {
        *self
            .version_calls
            .entry(id.to_ascii_lowercase())
            .or_insert(0) += 1;
        self.answer(id, token).await?;

        Ok(self
            .packages
            .get(&id.to_ascii_lowercase())
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &PackageVersion,
        token: &CancellationToken,
    ) -> Result<Option<PackageDependencyInfo>, ResolverError> {
        *self.info_calls.entry(id.to_ascii_lowercase()).or_insert(0) += 1;
        self.answer(id, token).await?;

        Ok(self
            .packages
            .get(&id.to_ascii_lowercase())
            .and_then(|versions| versions.get(version))
            .cloned())
    }
}
