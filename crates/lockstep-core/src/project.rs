use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::framework::Framework;
use crate::library::{IncludeFlags, LibraryDependency, LibraryRange, TypeConstraint};
use crate::logging::LogCode;
use crate::version::PackageVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectStyle {
    #[default]
    PackageReference,
    DotnetToolReference,
    Standalone,
}

impl ProjectStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageReference => "PackageReference",
            Self::DotnetToolReference => "DotnetToolReference",
            Self::Standalone => "Standalone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFrameworkInformation {
    pub framework: Framework,
    #[serde(default)]
    pub target_alias: String,
    #[serde(default)]
    pub dependencies: Vec<LibraryDependency>,
    /// Legacy package target fallback frameworks.
    #[serde(default)]
    pub imports: Vec<Framework>,
    #[serde(default)]
    pub asset_target_fallback: Vec<Framework>,
}

impl TargetFrameworkInformation {
    pub fn new(framework: Framework) -> Self {
        Self {
            target_alias: framework.short_folder_name(),
            framework,
            dependencies: Vec::new(),
            imports: Vec::new(),
            asset_target_fallback: Vec::new(),
        }
    }

    pub fn uses_asset_target_fallback(&self) -> bool {
        !self.asset_target_fallback.is_empty()
    }

    pub fn fallback_frameworks(&self) -> &[Framework] {
        if self.uses_asset_target_fallback() {
            &self.asset_target_fallback
        } else {
            &self.imports
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRestoreReference {
    pub project_unique_name: String,
    #[serde(default)]
    pub project_path: PathBuf,
    #[serde(default = "IncludeFlags::all")]
    pub include_assets: IncludeFlags,
    #[serde(default)]
    pub exclude_assets: IncludeFlags,
    #[serde(default = "IncludeFlags::default_suppress_parent")]
    pub private_assets: IncludeFlags,
}

impl ProjectRestoreReference {
    pub fn new(project_unique_name: impl Into<String>) -> Self {
        let project_unique_name = project_unique_name.into();
        Self {
            project_path: PathBuf::from(&project_unique_name),
            project_unique_name,
            include_assets: IncludeFlags::all(),
            exclude_assets: IncludeFlags::none(),
            private_assets: IncludeFlags::default_suppress_parent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRestoreMetadataFrameworkInfo {
    pub framework: Framework,
    #[serde(default)]
    pub project_references: Vec<ProjectRestoreReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarningProperties {
    #[serde(default)]
    pub all_warnings_as_errors: bool,
    #[serde(default)]
    pub warnings_as_errors: BTreeSet<LogCode>,
    #[serde(default)]
    pub no_warn: BTreeSet<LogCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRestoreMetadata {
    pub project_unique_name: String,
    pub project_name: String,
    pub project_path: PathBuf,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub project_style: ProjectStyle,
    #[serde(default)]
    pub original_target_frameworks: Vec<String>,
    #[serde(default)]
    pub target_frameworks: Vec<ProjectRestoreMetadataFrameworkInfo>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub restore_locked_mode: bool,
    #[serde(default)]
    pub validate_runtime_assets: bool,
    #[serde(default)]
    pub warning_properties: WarningProperties,
}

impl ProjectRestoreMetadata {
    pub fn new(
        project_unique_name: impl Into<String>,
        project_name: impl Into<String>,
        project_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_unique_name: project_unique_name.into(),
            project_name: project_name.into(),
            project_path: project_path.into(),
            output_path: None,
            project_style: ProjectStyle::PackageReference,
            original_target_frameworks: Vec::new(),
            target_frameworks: Vec::new(),
            sources: Vec::new(),
            restore_locked_mode: false,
            validate_runtime_assets: false,
            warning_properties: WarningProperties::default(),
        }
    }
}

fn default_project_version() -> PackageVersion {
    PackageVersion::new(1, 0, 0)
}

/// Restore input for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default = "default_project_version")]
    pub version: PackageVersion,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Dependencies shared by every target framework.
    #[serde(default)]
    pub dependencies: Vec<LibraryDependency>,
    #[serde(default, rename = "frameworks")]
    pub target_frameworks: Vec<TargetFrameworkInformation>,
    #[serde(default)]
    pub runtime_identifiers: Vec<String>,
    #[serde(default)]
    pub restore_metadata: Option<ProjectRestoreMetadata>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_project_version(),
            file_path: None,
            dependencies: Vec::new(),
            target_frameworks: Vec::new(),
            runtime_identifiers: Vec::new(),
            restore_metadata: None,
        }
    }

    pub fn unique_name(&self) -> &str {
        self.restore_metadata
            .as_ref()
            .map(|metadata| metadata.project_unique_name.as_str())
            .unwrap_or(&self.name)
    }

    pub fn project_path(&self) -> Option<PathBuf> {
        self.restore_metadata
            .as_ref()
            .map(|metadata| metadata.project_path.clone())
            .or_else(|| self.file_path.clone())
    }

    pub fn target_framework(&self, framework: &Framework) -> Option<&TargetFrameworkInformation> {
        self.target_frameworks
            .iter()
            .find(|info| &info.framework == framework)
    }

    pub fn frameworks(&self) -> Vec<Framework> {
        self.target_frameworks
            .iter()
            .map(|info| info.framework.clone())
            .collect()
    }

    /// Package dependencies that apply to `framework`. Framework specific
    /// declarations override shared ones with the same name.
    pub fn dependencies_for(&self, framework: &Framework) -> Vec<LibraryDependency> {
        let specific = self
            .target_framework(framework)
            .map(|info| info.dependencies.as_slice())
            .unwrap_or_default();
        let mut dependencies: Vec<LibraryDependency> = self
            .dependencies
            .iter()
            .filter(|shared| {
                !specific
                    .iter()
                    .any(|dependency| dependency.name().eq_ignore_ascii_case(shared.name()))
            })
            .cloned()
            .collect();
        dependencies.extend(specific.iter().cloned());
        dependencies
    }

    pub fn project_references_for(&self, framework: &Framework) -> Vec<ProjectRestoreReference> {
        self.restore_metadata
            .as_ref()
            .and_then(|metadata| {
                metadata
                    .target_frameworks
                    .iter()
                    .find(|info| &info.framework == framework)
            })
            .map(|info| info.project_references.clone())
            .unwrap_or_default()
    }

    /// The range used to walk this project as the root of a graph.
    pub fn root_range(&self) -> LibraryRange {
        LibraryRange::new(
            self.name.clone(),
            Some(crate::range::VersionRange::exact(self.version.clone())),
            TypeConstraint::Project,
        )
    }

    pub fn is_locked_mode(&self) -> bool {
        self.restore_metadata
            .as_ref()
            .is_some_and(|metadata| metadata.restore_locked_mode)
    }

    pub fn warning_properties(&self) -> WarningProperties {
        self.restore_metadata
            .as_ref()
            .map(|metadata| metadata.warning_properties.clone())
            .unwrap_or_default()
    }
}
