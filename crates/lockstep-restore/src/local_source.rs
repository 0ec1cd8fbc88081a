use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use lockstep_core::{
    Framework, IncludeFlags, LibraryDependency, LibraryIdentity, PackageVersion, VersionRange,
};
use lockstep_resolver::{
    DependencyGroup, FrameworkReferenceGroup, PackageDependencyInfo, PackageSource, ResolverError,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A feed on disk laid out as `<root>/<id lowercase>/<version>.toml`.
#[derive(Debug, Clone)]
pub struct LocalFolderSource {
    name: String,
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageManifest {
    id: String,
    version: PackageVersion,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    dependency_groups: Vec<ManifestDependencyGroup>,
    #[serde(default)]
    framework_references: Vec<ManifestFrameworkReferences>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDependencyGroup {
    #[serde(default = "Framework::any")]
    target_framework: Framework,
    #[serde(default)]
    dependencies: Vec<ManifestDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDependency {
    id: String,
    #[serde(default)]
    version: Option<VersionRange>,
    #[serde(default)]
    exclude: IncludeFlags,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFrameworkReferences {
    target_framework: Framework,
    #[serde(default)]
    references: Vec<String>,
}

impl LocalFolderSource {
    /// Opens a feed named after its directory.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self { name, root }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, id: &str) -> PathBuf {
        self.root.join(id.to_ascii_lowercase())
    }

    async fn list_versions(&self, id: &str) -> Result<Vec<PackageVersion>> {
        let package_dir = self.package_dir(id);
        if !tokio::fs::try_exists(&package_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        let mut entries = tokio::fs::read_dir(&package_dir)
            .await
            .with_context(|| format!("failed to read package directory: {}", package_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|v| v.to_str()) else {
                continue;
            };
            match PackageVersion::parse(stem) {
                Ok(version) => versions.push(version),
                Err(err) => debug!(path = %path.display(), "skipping manifest: {err}"),
            }
        }

        versions.sort();
        Ok(versions)
    }

    async fn read_manifest(
        &self,
        id: &str,
        version: &PackageVersion,
    ) -> Result<Option<PackageDependencyInfo>> {
        let Some(path) = self.manifest_path(id, version).await? else {
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed reading manifest: {}", path.display()))?;
        let manifest: PackageManifest = toml::from_str(&content)
            .with_context(|| format!("failed parsing manifest: {}", path.display()))?;
        if manifest.version != *version {
            anyhow::bail!(
                "manifest {} declares version {} instead of {version}",
                path.display(),
                manifest.version
            );
        }
        Ok(Some(manifest.into_dependency_info()))
    }

    /// File names may use any spelling of the version, so `1.0` and
    /// `1.0.0.toml` refer to the same manifest.
    async fn manifest_path(&self, id: &str, version: &PackageVersion) -> Result<Option<PathBuf>> {
        let package_dir = self.package_dir(id);
        let direct = package_dir.join(format!("{}.toml", version.normalized()));
        if tokio::fs::try_exists(&direct).await.unwrap_or(false) {
            return Ok(Some(direct));
        }
        if !tokio::fs::try_exists(&package_dir).await.unwrap_or(false) {
            return Ok(None);
        }

        let mut entries = tokio::fs::read_dir(&package_dir)
            .await
            .with_context(|| format!("failed to read package directory: {}", package_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("toml") {
                continue;
            }
            let matches = path
                .file_stem()
                .and_then(|v| v.to_str())
                .and_then(|stem| PackageVersion::parse(stem).ok())
                .is_some_and(|candidate| candidate == *version);
            if matches {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

impl PackageManifest {
    fn into_dependency_info(self) -> PackageDependencyInfo {
        let mut info = PackageDependencyInfo::new(LibraryIdentity::package(self.id, self.version))
            .with_files(self.files);
        info.dependency_groups = self
            .dependency_groups
            .into_iter()
            .map(|group| DependencyGroup {
                target_framework: group.target_framework,
                dependencies: group
                    .dependencies
                    .into_iter()
                    .map(ManifestDependency::into_library_dependency)
                    .collect(),
            })
            .collect();
        info.framework_reference_groups = self
            .framework_references
            .into_iter()
            .map(|group| FrameworkReferenceGroup {
                target_framework: group.target_framework,
                references: group.references,
            })
            .collect();
        info
    }
}

impl ManifestDependency {
    fn into_library_dependency(self) -> LibraryDependency {
        let range = self.version.unwrap_or_else(VersionRange::all);
        let mut dependency = LibraryDependency::package(&self.id, range);
        dependency.exclude = self.exclude;
        dependency
    }
}

#[async_trait]
impl PackageSource for LocalFolderSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<PackageVersion>, ResolverError> {
        if token.is_cancelled() {
            return Err(ResolverError::Cancelled);
        }
        self.list_versions(id)
            .await
            .map_err(|err| ResolverError::source_failure(&self.name, id, format!("{err:#}")))
    }

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &PackageVersion,
        token: &CancellationToken,
    ) -> Result<Option<PackageDependencyInfo>, ResolverError> {
        if token.is_cancelled() {
            return Err(ResolverError::Cancelled);
        }
        self.read_manifest(id, version)
            .await
            .map_err(|err| ResolverError::source_failure(&self.name, id, format!("{err:#}")))
    }
}
