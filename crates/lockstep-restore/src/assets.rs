use std::collections::BTreeMap;

use lockstep_core::{AssetKind, Framework, IncludeFlags, LibraryType};
use lockstep_resolver::{GraphItem, PackageDependencyInfo};

use crate::lockfile::LockFileTargetLibrary;

/// Marks a folder that is compatible but intentionally ships nothing.
pub const EMPTY_FOLDER_PLACEHOLDER: &str = "_._";

/// Assets picked for one package and one target graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAssets {
    pub library: LockFileTargetLibrary,
    /// Set when no asset matched the target framework and one of the
    /// fallback frameworks supplied them instead.
    pub fallback_framework: Option<Framework>,
}

/// Picks the compile, runtime and resource items of `info` for `framework`
/// and, on a runtime graph, `runtime_identifier`. Fallback frameworks are
/// tried in order only when the target framework matches nothing.
pub fn select_assets(
    info: &PackageDependencyInfo,
    framework: &Framework,
    runtime_identifier: Option<&str>,
    fallback_frameworks: &[Framework],
    include: &IncludeFlags,
) -> SelectedAssets {
    let layout = PackageLayout::new(&info.files, runtime_identifier);

    let mut selected = layout.select(framework);
    let mut fallback_framework = None;
    if !selected.has_assets() {
        for fallback in fallback_frameworks {
            let candidate = layout.select(fallback);
            if candidate.has_assets() {
                selected = candidate;
                fallback_framework = Some(fallback.clone());
                break;
            }
        }
    }

    let mut library = LockFileTargetLibrary::new(
        info.identity.name.clone(),
        info.identity.version.clone(),
        LibraryType::Package,
    );
    library.framework = selected.framework;
    library.compile = selected.compile;
    library.runtime = selected.runtime;
    library.resource = selected.resource;

    let reference_framework = library.framework.clone().unwrap_or_else(|| framework.clone());
    library.framework_references = framework_references(info, &reference_framework);
    library.dependencies = info
        .dependencies_for(&reference_framework)
        .into_iter()
        .map(|dependency| {
            let range = dependency
                .version_range()
                .map(ToString::to_string)
                .unwrap_or_default();
            (dependency.name().to_string(), range)
        })
        .collect();

    if !include.contains(AssetKind::Compile) {
        library.compile.clear();
    }
    if !include.contains(AssetKind::Runtime) {
        library.runtime.clear();
        library.resource.clear();
    }

    SelectedAssets {
        library,
        fallback_framework,
    }
}

/// Target library entry for a project reference. Projects contribute their
/// build output, not files from a package.
pub fn project_target_library(item: &GraphItem, framework: &Framework) -> LockFileTargetLibrary {
    let mut library = LockFileTargetLibrary::new(
        item.key.name.clone(),
        item.key.version.clone(),
        item.key.library_type,
    );
    library.framework = framework.nearest(&item.project_frameworks).cloned();
    if library.framework.is_some() {
        let output = format!("bin/placeholder/{}.dll", item.key.name);
        library.compile = vec![output.clone()];
        library.runtime = vec![output];
    }
    library.dependencies = item
        .dependencies
        .iter()
        .map(|dependency| {
            let range = dependency
                .version_range()
                .map(ToString::to_string)
                .unwrap_or_default();
            (dependency.name().to_string(), range)
        })
        .collect();
    library
}

/// Frameworks a package ships `lib/` or `ref/` assets for.
pub fn package_frameworks(files: &[String]) -> Vec<Framework> {
    let mut frameworks: Vec<Framework> = ["lib/", "ref/"]
        .into_iter()
        .flat_map(|prefix| group_by_framework(files, prefix).into_keys())
        .collect();
    frameworks.sort();
    frameworks.dedup();
    frameworks
}

/// Whether the package ships any assembly folder at all.
pub fn has_assembly_folders(files: &[String]) -> bool {
    files.iter().any(|file| {
        let lower = file.to_ascii_lowercase();
        lower.starts_with("lib/") || lower.starts_with("ref/")
    })
}

#[derive(Debug, Default)]
struct FrameworkSelection {
    framework: Option<Framework>,
    compile: Vec<String>,
    runtime: Vec<String>,
    resource: Vec<String>,
}

impl FrameworkSelection {
    fn has_assets(&self) -> bool {
        !self.compile.is_empty() || !self.runtime.is_empty() || !self.resource.is_empty()
    }
}

struct PackageLayout<'a> {
    lib: BTreeMap<Framework, Vec<&'a str>>,
    reference: BTreeMap<Framework, Vec<&'a str>>,
    runtime: BTreeMap<Framework, Vec<&'a str>>,
}

impl<'a> PackageLayout<'a> {
    fn new(files: &'a [String], runtime_identifier: Option<&str>) -> Self {
        let runtime = match runtime_identifier {
            Some(rid) if !rid.is_empty() => {
                group_by_framework(files, &format!("runtimes/{}/lib/", rid.to_ascii_lowercase()))
            }
            _ => BTreeMap::new(),
        };
        Self {
            lib: group_by_framework(files, "lib/"),
            reference: group_by_framework(files, "ref/"),
            runtime,
        }
    }

    fn select(&self, framework: &Framework) -> FrameworkSelection {
        let mut selection = FrameworkSelection::default();

        let lib = nearest_group(&self.lib, framework);
        if let Some((lib_framework, files)) = lib {
            selection.framework = Some(lib_framework.clone());
            selection.runtime = direct_assemblies(files);
            selection.resource = files
                .iter()
                .filter(|file| is_resource_assembly(file))
                .map(|file| file.to_string())
                .collect();
        }

        // ref/ takes over compile; lib/ serves both when there is no ref/.
        match nearest_group(&self.reference, framework) {
            Some((ref_framework, files)) => {
                selection.framework.get_or_insert_with(|| ref_framework.clone());
                selection.compile = direct_assemblies(files);
            }
            None => selection.compile = selection.runtime.clone(),
        }

        if let Some((runtime_framework, files)) = nearest_group(&self.runtime, framework) {
            selection.framework.get_or_insert_with(|| runtime_framework.clone());
            selection.runtime = direct_assemblies(files);
        }

        selection
    }
}

fn nearest_group<'m, 'a>(
    groups: &'m BTreeMap<Framework, Vec<&'a str>>,
    framework: &Framework,
) -> Option<(&'m Framework, &'m Vec<&'a str>)> {
    let nearest = framework.nearest(groups.keys())?;
    groups.get_key_value(nearest)
}

/// Files under `prefix` grouped by the framework folder that follows it.
/// Folders that do not name a framework are ignored.
fn group_by_framework<'a>(files: &'a [String], prefix: &str) -> BTreeMap<Framework, Vec<&'a str>> {
    let mut groups: BTreeMap<Framework, Vec<&'a str>> = BTreeMap::new();
    for file in files {
        let lower = file.to_ascii_lowercase();
        let Some(rest) = lower.strip_prefix(prefix) else {
            continue;
        };
        let Some((folder, _)) = rest.split_once('/') else {
            continue;
        };
        let framework = Framework::parse(folder);
        if framework.is_unsupported() {
            continue;
        }
        groups.entry(framework).or_default().push(file.as_str());
    }
    groups
}

/// Position of the file name inside a `<prefix>/<tfm>/<file>` path.
fn depth_below_framework(file: &str) -> usize {
    let lower = file.to_ascii_lowercase();
    let prefix_depth = if lower.starts_with("runtimes/") { 4 } else { 2 };
    file.split('/').count().saturating_sub(prefix_depth)
}

fn direct_assemblies(files: &[&str]) -> Vec<String> {
    files
        .iter()
        .filter(|file| depth_below_framework(file) == 1)
        .filter(|file| {
            let name = file.rsplit('/').next().unwrap_or_default();
            name == EMPTY_FOLDER_PLACEHOLDER || name.to_ascii_lowercase().ends_with(".dll")
        })
        .map(|file| file.to_string())
        .collect()
}

fn is_resource_assembly(file: &str) -> bool {
    depth_below_framework(file) == 2 && file.to_ascii_lowercase().ends_with(".resources.dll")
}

fn framework_references(info: &PackageDependencyInfo, framework: &Framework) -> Vec<String> {
    let nearest = framework.nearest(
        info.framework_reference_groups
            .iter()
            .map(|group| &group.target_framework),
    );
    let Some(nearest) = nearest else {
        return Vec::new();
    };
    info.framework_reference_groups
        .iter()
        .filter(|group| &group.target_framework == nearest)
        .flat_map(|group| group.references.iter().cloned())
        .collect()
}
