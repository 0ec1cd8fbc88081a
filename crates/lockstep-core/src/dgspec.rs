use std::collections::BTreeSet;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::project::PackageSpec;
use crate::validation::{validate_dependency_graph_spec, SpecValidationError};

/// A sealed, validated set of projects plus the entry points to restore.
/// Only [`DependencyGraphSpecBuilder::build`] produces one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyGraphSpec {
    restore: Vec<String>,
    projects: Vec<PackageSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct DependencyGraphSpecDocument {
    #[serde(default)]
    restore: Vec<String>,
    #[serde(default)]
    projects: Vec<PackageSpec>,
}

impl DependencyGraphSpec {
    pub fn builder() -> DependencyGraphSpecBuilder {
        DependencyGraphSpecBuilder::default()
    }

    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let document: DependencyGraphSpecDocument =
            toml::from_str(input).context("failed to parse dependency graph spec")?;
        let mut builder = Self::builder();
        for project in document.projects {
            builder = builder.add_project(project);
        }
        for entry in document.restore {
            builder = builder.add_restore(entry);
        }
        Ok(builder.build()?)
    }

    /// Restore entry points in declaration order. Duplicates are kept.
    pub fn restore(&self) -> &[String] {
        &self.restore
    }

    pub fn projects(&self) -> &[PackageSpec] {
        &self.projects
    }

    pub fn project(&self, unique_name: &str) -> Option<&PackageSpec> {
        self.projects
            .iter()
            .find(|project| project.unique_name().eq_ignore_ascii_case(unique_name))
    }

    /// The project followed by every project it reaches through project
    /// references, each listed once.
    pub fn closure(&self, unique_name: &str) -> Vec<&PackageSpec> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut stack = vec![unique_name.to_string()];

        while let Some(name) = stack.pop() {
            if !seen.insert(name.to_ascii_lowercase()) {
                continue;
            }
            let Some(project) = self.project(&name) else {
                continue;
            };
            ordered.push(project);

            let mut references: Vec<String> = project
                .restore_metadata
                .iter()
                .flat_map(|metadata| metadata.target_frameworks.iter())
                .flat_map(|info| info.project_references.iter())
                .map(|reference| reference.project_unique_name.clone())
                .collect();
            references.sort_by_key(|name| name.to_ascii_lowercase());
            references.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
            stack.extend(references.into_iter().rev());
        }
        ordered
    }

    /// A spec restricted to one entry point and its project closure.
    pub fn with_project_closure(&self, unique_name: &str) -> Self {
        let projects: Vec<PackageSpec> = self
            .closure(unique_name)
            .into_iter()
            .cloned()
            .collect();
        let restore = projects
            .first()
            .map(|project| vec![project.unique_name().to_string()])
            .unwrap_or_default();
        Self { restore, projects }
    }

    /// Hex SHA-256 over the project closure of `unique_name`. Used to detect
    /// unchanged inputs between restores.
    pub fn hash_for(&self, unique_name: &str) -> anyhow::Result<String> {
        let closure = self.closure(unique_name);
        let bytes = serde_json::to_vec(&closure)
            .with_context(|| format!("failed to serialize closure of '{unique_name}'"))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Accumulates projects and restore entries. Nothing can be queried until
/// [`build`](Self::build) validates the whole set.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraphSpecBuilder {
    restore: Vec<String>,
    projects: Vec<PackageSpec>,
}

impl DependencyGraphSpecBuilder {
    /// Adds a project, replacing any earlier project with the same unique name.
    pub fn add_project(mut self, project: PackageSpec) -> Self {
        self.projects.retain(|existing| {
            !existing
                .unique_name()
                .eq_ignore_ascii_case(project.unique_name())
        });
        self.projects.push(project);
        self
    }

    pub fn add_restore(mut self, unique_name: impl Into<String>) -> Self {
        self.restore.push(unique_name.into());
        self
    }

    pub fn build(self) -> Result<DependencyGraphSpec, SpecValidationError> {
        let spec = DependencyGraphSpec {
            restore: self.restore,
            projects: self.projects,
        };
        validate_dependency_graph_spec(&spec)?;
        tracing::debug!(
            projects = spec.projects.len(),
            restore = spec.restore.len(),
            "sealed dependency graph spec"
        );
        Ok(spec)
    }
}
