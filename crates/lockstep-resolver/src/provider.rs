use std::path::PathBuf;
use std::sync::Arc;

use lockstep_core::{
    DependencyGraphSpec, Framework, LibraryDependency, LibraryIdentity, LibraryRange,
    TypeConstraint,
};

/// A project found by a [`ProjectLibraryProvider`], with the dependencies it
/// declares for the requested framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLibrary {
    pub identity: LibraryIdentity,
    pub dependencies: Vec<LibraryDependency>,
    pub path: Option<PathBuf>,
    pub frameworks: Vec<Framework>,
}

pub trait ProjectLibraryProvider: Send + Sync {
    fn get_library(&self, range: &LibraryRange, framework: &Framework) -> Option<ProjectLibrary>;
}

/// Serves the projects of a dependency graph spec, including their project
/// references as dependencies.
#[derive(Debug, Clone)]
pub struct DependencyGraphSpecProvider {
    spec: Arc<DependencyGraphSpec>,
}

impl DependencyGraphSpecProvider {
    pub fn new(spec: Arc<DependencyGraphSpec>) -> Self {
        Self { spec }
    }
}

impl ProjectLibraryProvider for DependencyGraphSpecProvider {
    fn get_library(&self, range: &LibraryRange, framework: &Framework) -> Option<ProjectLibrary> {
        let project = self.spec.projects().iter().find(|project| {
            project.name.eq_ignore_ascii_case(&range.name)
                || project.unique_name().eq_ignore_ascii_case(&range.name)
        })?;

        let frameworks = project.frameworks();
        let Some(nearest) = framework.nearest(&frameworks).cloned() else {
            // Incompatible projects still join the graph so the compatibility
            // check can name them.
            return Some(ProjectLibrary {
                identity: LibraryIdentity::project(&project.name, project.version.clone()),
                dependencies: Vec::new(),
                path: project.project_path(),
                frameworks,
            });
        };

        let mut dependencies = project.dependencies_for(&nearest);
        for reference in project.project_references_for(&nearest) {
            let name = self
                .spec
                .project(&reference.project_unique_name)
                .map(|referenced| referenced.name.clone())
                .unwrap_or_else(|| reference.project_unique_name.clone());
            let mut dependency = LibraryDependency::new(LibraryRange::new(
                name,
                None,
                TypeConstraint::ProjectOrExternal,
            ));
            dependency.include = reference.include_assets.clone();
            dependency.exclude = reference.exclude_assets.clone();
            dependency.private_assets = reference.private_assets.clone();
            dependencies.push(dependency);
        }

        Some(ProjectLibrary {
            identity: LibraryIdentity::project(&project.name, project.version.clone()),
            dependencies,
            path: project.project_path(),
            frameworks,
        })
    }
}
