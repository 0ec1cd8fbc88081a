use std::collections::{BTreeMap, BTreeSet};

use lockstep_core::{
    AssetKind, Framework, IncludeFlags, LibraryIdentity, LibraryType, LogCode, PackageSpec,
    RestoreLogMessage,
};
use lockstep_resolver::RestoreTargetGraph;
use tracing::debug;

use crate::assets::{has_assembly_folders, package_frameworks};
use crate::lockfile::{LockFile, LockFileTargetLibrary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityIssueKind {
    /// A referenced project targets nothing the graph framework can use.
    IncompatibleProject,
    /// A package ships assemblies, none of them for the graph framework.
    IncompatiblePackage,
    /// A compile-time reference assembly has no runtime implementation for
    /// the graph's runtime identifier in any package of the graph.
    ReferenceAssemblyNotImplemented,
}

impl CompatibilityIssueKind {
    pub fn code(self) -> LogCode {
        match self {
            Self::IncompatibleProject => LogCode::NU1201,
            Self::IncompatiblePackage => LogCode::NU1202,
            Self::ReferenceAssemblyNotImplemented => LogCode::NU1203,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityIssue {
    pub kind: CompatibilityIssueKind,
    pub package: LibraryIdentity,
    pub assembly_name: Option<String>,
    pub framework: Framework,
    pub runtime_identifier: Option<String>,
    pub available_frameworks: Vec<Framework>,
}

impl CompatibilityIssue {
    pub fn format(&self) -> String {
        let target = describe_target(&self.framework, self.runtime_identifier.as_deref());
        let package = &self.package;
        match self.kind {
            CompatibilityIssueKind::IncompatibleProject => format!(
                "Project {} is not compatible with {target}. Project {} supports: {}",
                package.name,
                package.name,
                describe_frameworks(&self.available_frameworks)
            ),
            CompatibilityIssueKind::IncompatiblePackage => {
                if self.available_frameworks.is_empty() {
                    format!(
                        "Package {package} is not compatible with {target}. Package {package} does not support any target frameworks."
                    )
                } else {
                    format!(
                        "Package {package} is not compatible with {target}. Package {package} supports: {}",
                        describe_frameworks(&self.available_frameworks)
                    )
                }
            }
            CompatibilityIssueKind::ReferenceAssemblyNotImplemented => format!(
                "{package} provides a compile-time reference assembly for {} on {}, but there is no run-time assembly compatible with {}.",
                self.assembly_name.as_deref().unwrap_or_default(),
                describe_framework(&self.framework),
                self.runtime_identifier.as_deref().unwrap_or_default()
            ),
        }
    }

    pub fn to_log_message(&self, graph_name: &str) -> RestoreLogMessage {
        RestoreLogMessage::error(self.kind.code(), self.format())
            .with_library_id(self.package.name.clone())
            .with_target_graphs([graph_name])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityCheckResult {
    pub graph_name: String,
    pub issues: Vec<CompatibilityIssue>,
    pub success: bool,
}

impl CompatibilityCheckResult {
    fn new(graph_name: impl Into<String>, issues: Vec<CompatibilityIssue>) -> Self {
        Self {
            graph_name: graph_name.into(),
            success: issues.is_empty(),
            issues,
        }
    }
}

/// Post-resolution check of every library in a graph against the assets the
/// lock file selected for it. It never changes the graph.
pub struct CompatibilityChecker<'a> {
    lock_file: &'a LockFile,
    validate_runtime_assets: bool,
}

impl<'a> CompatibilityChecker<'a> {
    pub fn new(lock_file: &'a LockFile, validate_runtime_assets: bool) -> Self {
        Self {
            lock_file,
            validate_runtime_assets,
        }
    }

    pub fn check(
        &self,
        graph: &RestoreTargetGraph,
        project: &PackageSpec,
        include_flags: &BTreeMap<String, IncludeFlags>,
    ) -> CompatibilityCheckResult {
        let mut issues = Vec::new();
        let target = self.lock_file.target(graph.name());
        let check_runtime = self.validate_runtime_assets
            && graph.runtime_identifier().is_some_and(|rid| !rid.is_empty());

        let mut compile_assemblies: BTreeMap<String, LibraryIdentity> = BTreeMap::new();
        let mut runtime_assemblies: BTreeSet<String> = BTreeSet::new();

        for item in graph.libraries() {
            debug!(
                project = %project.name,
                library = %item.key,
                graph = graph.name(),
                "checking compatibility"
            );
            if item.key.library_type.is_project() {
                if graph.framework().nearest(&item.project_frameworks).is_none() {
                    issues.push(CompatibilityIssue {
                        kind: CompatibilityIssueKind::IncompatibleProject,
                        package: item.key.clone(),
                        assembly_name: None,
                        framework: graph.framework().clone(),
                        runtime_identifier: graph.runtime_identifier().map(str::to_string),
                        available_frameworks: item.project_frameworks.clone(),
                    });
                }
                continue;
            }
            if item.key.library_type != LibraryType::Package {
                continue;
            }

            let flags = include_flags
                .get(&item.key.name_key())
                .cloned()
                .unwrap_or_else(IncludeFlags::all);
            if !flags.contains(AssetKind::Compile) && !flags.contains(AssetKind::Runtime) {
                continue;
            }

            let files = item
                .package
                .as_ref()
                .map(|package| package.files.as_slice())
                .unwrap_or_default();
            let target_library = target.and_then(|target| target.library(&item.key.name));
            let has_assets = target_library.is_some_and(LockFileTargetLibrary::has_assets);
            if !has_assets && has_assembly_folders(files) {
                issues.push(CompatibilityIssue {
                    kind: CompatibilityIssueKind::IncompatiblePackage,
                    package: item.key.clone(),
                    assembly_name: None,
                    framework: graph.framework().clone(),
                    runtime_identifier: graph.runtime_identifier().map(str::to_string),
                    available_frameworks: package_frameworks(files),
                });
            }

            if check_runtime && flags.contains(AssetKind::Runtime) {
                if let Some(target_library) = target_library {
                    collect_assemblies(
                        target_library,
                        &item.key,
                        &mut compile_assemblies,
                        &mut runtime_assemblies,
                    );
                }
            }
        }

        if check_runtime {
            for (assembly_name, package) in compile_assemblies {
                issues.push(CompatibilityIssue {
                    kind: CompatibilityIssueKind::ReferenceAssemblyNotImplemented,
                    package,
                    assembly_name: Some(assembly_name),
                    framework: graph.framework().clone(),
                    runtime_identifier: graph.runtime_identifier().map(str::to_string),
                    available_frameworks: Vec::new(),
                });
            }
        }

        CompatibilityCheckResult::new(graph.name(), issues)
    }
}

/// Tracks reference assemblies still waiting for a runtime implementation.
/// A runtime assembly from any package of the graph satisfies one, so the
/// order packages are visited in does not matter.
fn collect_assemblies(
    library: &LockFileTargetLibrary,
    package: &LibraryIdentity,
    compile_assemblies: &mut BTreeMap<String, LibraryIdentity>,
    runtime_assemblies: &mut BTreeSet<String>,
) {
    for name in library.compile.iter().filter_map(|path| assembly_name(path)) {
        if !runtime_assemblies.contains(&name) {
            compile_assemblies
                .entry(name)
                .or_insert_with(|| package.clone());
        }
    }
    for name in library.runtime.iter().filter_map(|path| assembly_name(path)) {
        // Native images implement the assembly they were generated from.
        if let Some(stem) = name.strip_suffix(".ni") {
            compile_assemblies.remove(stem);
            runtime_assemblies.insert(stem.to_string());
        }
        compile_assemblies.remove(&name);
        runtime_assemblies.insert(name);
    }
}

fn assembly_name(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next()?;
    let lower = file_name.to_ascii_lowercase();
    lower.strip_suffix(".dll").map(str::to_string)
}

fn describe_framework(framework: &Framework) -> String {
    format!("{} ({})", framework, framework.dotnet_framework_name())
}

fn describe_target(framework: &Framework, runtime_identifier: Option<&str>) -> String {
    match runtime_identifier {
        Some(rid) if !rid.is_empty() => format!("{} / {rid}", describe_framework(framework)),
        _ => describe_framework(framework),
    }
}

fn describe_frameworks(frameworks: &[Framework]) -> String {
    frameworks
        .iter()
        .map(describe_framework)
        .collect::<Vec<_>>()
        .join(", ")
}
