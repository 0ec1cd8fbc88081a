use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::dgspec::DependencyGraphSpec;
use crate::logging::{LogCode, RestoreLogMessage};
use crate::project::{PackageSpec, ProjectStyle};

/// A malformed restore input. Raised once, when a dependency graph spec is
/// sealed, before any graph walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecValidationError {
    pub message: String,
    pub property: Option<String>,
    pub project_path: Option<PathBuf>,
}

impl SpecValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            property: None,
            project_path: None,
        }
    }

    fn for_project(message: impl Into<String>, property: &str, project: &PackageSpec) -> Self {
        Self {
            message: message.into(),
            property: Some(property.to_string()),
            project_path: project.project_path(),
        }
    }
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid restore input. {}", self.message)?;
        if let Some(path) = &self.project_path {
            write!(f, " Input files: {}.", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for SpecValidationError {}

pub fn validate_dependency_graph_spec(spec: &DependencyGraphSpec) -> Result<(), SpecValidationError> {
    if spec.restore().is_empty() {
        return Err(SpecValidationError::new(
            "Restore request does not contain any projects to restore.",
        ));
    }

    let mut validated = BTreeSet::new();
    for entry in spec.restore() {
        let Some(project) = spec.project(entry) else {
            return Err(SpecValidationError::new(format!(
                "Missing project '{entry}' referenced by a restore entry."
            )));
        };
        for closure_project in spec.closure(project.unique_name()) {
            if validated.insert(closure_project.unique_name().to_ascii_lowercase()) {
                validate_project_spec(closure_project)?;
            }
        }
    }
    Ok(())
}

pub fn validate_project_spec(project: &PackageSpec) -> Result<(), SpecValidationError> {
    if project.name.trim().is_empty() {
        return Err(SpecValidationError::for_project(
            "Missing required property 'Name'.",
            "Name",
            project,
        ));
    }

    let Some(metadata) = &project.restore_metadata else {
        return Err(SpecValidationError::for_project(
            "Missing required property 'RestoreMetadata'.",
            "RestoreMetadata",
            project,
        ));
    };
    for (property, value) in [
        ("ProjectUniqueName", metadata.project_unique_name.as_str()),
        ("ProjectName", metadata.project_name.as_str()),
    ] {
        if value.trim().is_empty() {
            return Err(SpecValidationError::for_project(
                format!("Missing required property '{property}'."),
                property,
                project,
            ));
        }
    }
    if metadata.project_path.as_os_str().is_empty() {
        return Err(SpecValidationError::for_project(
            "Missing required property 'ProjectPath'.",
            "ProjectPath",
            project,
        ));
    }
    if metadata.project_style == ProjectStyle::PackageReference && metadata.output_path.is_none() {
        return Err(SpecValidationError::for_project(
            "Missing required property 'OutputPath'.",
            "OutputPath",
            project,
        ));
    }

    if project.target_frameworks.is_empty() {
        return Err(SpecValidationError::for_project(
            "Missing required property 'TargetFrameworks'.",
            "TargetFrameworks",
            project,
        ));
    }

    let mut seen = BTreeSet::new();
    for info in &project.target_frameworks {
        if info.framework.is_unsupported() {
            return Err(SpecValidationError::for_project(
                format!("Invalid target framework '{}'.", info.framework),
                "TargetFrameworks",
                project,
            ));
        }
        if !seen.insert(info.framework.clone()) {
            return Err(SpecValidationError::for_project(
                format!("Duplicate frameworks found: '{}'.", info.framework),
                "TargetFrameworks",
                project,
            ));
        }
        for dependency in &info.dependencies {
            if dependency.name().trim().is_empty() {
                return Err(SpecValidationError::for_project(
                    format!("Dependency with an empty id declared for '{}'.", info.framework),
                    "Dependencies",
                    project,
                ));
            }
        }
    }

    if !metadata.original_target_frameworks.is_empty()
        && metadata.original_target_frameworks.len() != project.target_frameworks.len()
    {
        return Err(SpecValidationError::for_project(
            format!(
                "Project has {} original target frameworks but {} target frameworks.",
                metadata.original_target_frameworks.len(),
                project.target_frameworks.len()
            ),
            "OriginalTargetFrameworks",
            project,
        ));
    }

    for info in &metadata.target_frameworks {
        if project.target_framework(&info.framework).is_none() {
            return Err(SpecValidationError::for_project(
                format!(
                    "Project references are declared for '{}' which is not a target framework of the project.",
                    info.framework
                ),
                "ProjectReferences",
                project,
            ));
        }
    }

    match metadata.project_style {
        ProjectStyle::DotnetToolReference => validate_tool_project(project),
        ProjectStyle::PackageReference | ProjectStyle::Standalone => Ok(()),
    }
}

fn validate_tool_project(project: &PackageSpec) -> Result<(), SpecValidationError> {
    let style = ProjectStyle::DotnetToolReference.as_str();
    if project.target_frameworks.len() != 1 {
        return Err(SpecValidationError::for_project(
            format!("{style} projects must declare exactly one target framework."),
            "TargetFrameworks",
            project,
        ));
    }
    let dependency_count: usize = project.dependencies.len()
        + project
            .target_frameworks
            .iter()
            .map(|info| info.dependencies.len())
            .sum::<usize>();
    if dependency_count != 1 {
        return Err(SpecValidationError::for_project(
            format!("{style} projects must declare exactly one package dependency."),
            "Dependencies",
            project,
        ));
    }
    let has_references = project
        .restore_metadata
        .as_ref()
        .is_some_and(|metadata| {
            metadata
                .target_frameworks
                .iter()
                .any(|info| !info.project_references.is_empty())
        });
    if has_references {
        return Err(SpecValidationError::for_project(
            format!("'ProjectReferences' is not allowed for {style} projects."),
            "ProjectReferences",
            project,
        ));
    }
    Ok(())
}

/// NU1003 for every target framework that sets both fallback lists.
pub fn validate_fallback_frameworks(project: &PackageSpec) -> Vec<RestoreLogMessage> {
    project
        .target_frameworks
        .iter()
        .filter(|info| !info.imports.is_empty() && !info.asset_target_fallback.is_empty())
        .map(|info| {
            RestoreLogMessage::error(
                LogCode::NU1003,
                "PackageTargetFallback and AssetTargetFallback cannot be used together. \
                 PackageTargetFallback is deprecated, remove PackageTargetFallback references \
                 from the project environment.",
            )
            .with_library_id(project.name.clone())
            .with_target_graphs([info.framework.to_string()])
            .with_file_path(project.project_path())
        })
        .collect()
}
