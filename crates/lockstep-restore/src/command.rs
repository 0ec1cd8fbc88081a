use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::join_all;
use lockstep_core::{
    format_id_and_range, merge_on_target_graph, validate_fallback_frameworks, CollectorLogger,
    DependencyGraphSpec, Framework, IncludeFlags, LibraryIdentity, LibraryType, LogCode, LogLevel,
    PackageSpec, RestoreLogMessage, RestoreLogger, WarningProperties,
};
use lockstep_resolver::{
    DependencyGraphSpecProvider, GraphItem, PackageSource, RemoteDependencyWalker,
    RemoteWalkContext, ResolverError, RestoreTargetGraph, SourceCacheContext,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assets::{project_target_library, select_assets};
use crate::compat::{CompatibilityCheckResult, CompatibilityChecker};
use crate::diagnostics::{graph_messages, unexpected_dependency_messages};
use crate::error::RestoreError;
use crate::lockfile::{
    LockFile, LockFileFormat, LockFileLibrary, LockFileTarget, LockFileTargetLibrary,
    NoOpCacheFile, ProjectFileDependencyGroup, CACHE_FILE_NAME, LOCK_FILE_NAME,
};
use crate::settings::RestoreSettings;

/// Everything needed to restore one project.
pub struct RestoreRequest {
    pub project: PackageSpec,
    /// The project and every project it references.
    pub spec: Arc<DependencyGraphSpec>,
    pub sources: Vec<Arc<dyn PackageSource>>,
    pub cache: Arc<SourceCacheContext>,
    pub token: CancellationToken,
    pub force: bool,
    pub locked_mode: bool,
    pub validate_runtime_assets: bool,
    pub warnings_as_errors: BTreeSet<LogCode>,
    pub no_warn: BTreeSet<LogCode>,
    pub logger: Arc<dyn RestoreLogger>,
}

impl RestoreRequest {
    pub fn new(
        project: PackageSpec,
        spec: Arc<DependencyGraphSpec>,
        cache: Arc<SourceCacheContext>,
        token: CancellationToken,
    ) -> Self {
        Self {
            project,
            spec,
            sources: Vec::new(),
            cache,
            token,
            force: false,
            locked_mode: false,
            validate_runtime_assets: false,
            warnings_as_errors: BTreeSet::new(),
            no_warn: BTreeSet::new(),
            logger: Arc::new(CollectorLogger::new()),
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

    pub fn with_logger(mut self, logger: Arc<dyn RestoreLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_settings(mut self, settings: &RestoreSettings) -> Self {
        self.force |= settings.force;
        self.locked_mode |= settings.locked_mode;
        self.validate_runtime_assets |= settings.validate_runtime_assets;
        self.warnings_as_errors
            .extend(settings.warnings_as_errors.iter().copied());
        self.no_warn.extend(settings.no_warn.iter().copied());
        self
    }

    /// Directory the lock and cache files go to. Without restore metadata
    /// the result cannot be committed.
    pub fn output_path(&self) -> Option<PathBuf> {
        let metadata = self.project.restore_metadata.as_ref()?;
        metadata.output_path.clone().or_else(|| {
            metadata
                .project_path
                .parent()
                .map(|directory| directory.join("obj"))
        })
    }

    pub fn lock_file_path(&self) -> Option<PathBuf> {
        self.output_path().map(|path| path.join(LOCK_FILE_NAME))
    }

    pub fn cache_file_path(&self) -> Option<PathBuf> {
        self.output_path().map(|path| path.join(CACHE_FILE_NAME))
    }

    fn is_locked_mode(&self) -> bool {
        self.locked_mode || self.project.is_locked_mode()
    }

    fn validates_runtime_assets(&self) -> bool {
        self.validate_runtime_assets
            || self
                .project
                .restore_metadata
                .as_ref()
                .is_some_and(|metadata| metadata.validate_runtime_assets)
    }

    fn warning_properties(&self) -> WarningProperties {
        let mut properties = self.project.warning_properties();
        properties
            .warnings_as_errors
            .extend(self.warnings_as_errors.iter().copied());
        properties.no_warn.extend(self.no_warn.iter().copied());
        properties
    }
}

/// The outcome of restoring one project. Nothing is written until
/// [`commit`](Self::commit) is called.
#[derive(Debug)]
pub struct RestoreResult {
    pub project_name: String,
    pub success: bool,
    /// The inputs matched the last successful restore and no walk ran.
    pub no_op: bool,
    pub lock_file: LockFile,
    pub previous_lock_file: Option<LockFile>,
    pub lock_file_path: Option<PathBuf>,
    pub cache_file: NoOpCacheFile,
    pub cache_file_path: Option<PathBuf>,
    pub graphs: Vec<RestoreTargetGraph>,
    pub compatibility: Vec<CompatibilityCheckResult>,
    pub log_messages: Vec<RestoreLogMessage>,
    pub elapsed: Duration,
}

impl RestoreResult {
    pub fn errors(&self) -> impl Iterator<Item = &RestoreLogMessage> {
        self.log_messages.iter().filter(|message| message.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RestoreLogMessage> {
        self.log_messages.iter().filter(|message| message.is_warning())
    }

    pub fn graph(&self, name: &str) -> Option<&RestoreTargetGraph> {
        self.graphs.iter().find(|graph| graph.name() == name)
    }

    /// Writes the cache file and, when it changed, the lock file. Returns
    /// whether the lock file was written.
    pub fn commit(&self) -> Result<bool> {
        if self.no_op {
            debug!(project = %self.project_name, "no-op restore, nothing to commit");
            return Ok(false);
        }

        if let Some(path) = &self.cache_file_path {
            self.cache_file.write(path)?;
        }

        let Some(path) = &self.lock_file_path else {
            return Ok(false);
        };
        if path.is_file() && self.previous_lock_file.as_ref() == Some(&self.lock_file) {
            debug!(path = %path.display(), "lock file unchanged");
            return Ok(false);
        }

        LockFileFormat::write(path, &self.lock_file)?;
        info!(path = %path.display(), "wrote lock file");
        Ok(true)
    }
}

pub struct RestoreCommand {
    request: RestoreRequest,
}

impl RestoreCommand {
    pub fn new(request: RestoreRequest) -> Self {
        Self { request }
    }

    pub async fn execute(self) -> Result<RestoreResult, RestoreError> {
        let started = Instant::now();
        let request = self.request;
        let project = &request.project;
        if request.token.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }
        info!(project = %project.name, "restoring project");

        let dgspec_hash = request.spec.hash_for(project.unique_name())?;
        let lock_file_path = request.lock_file_path();
        let cache_file_path = request.cache_file_path();
        let previous_lock_file = lock_file_path
            .as_deref()
            .and_then(LockFileFormat::read_if_valid);

        let fallback_errors = validate_fallback_frameworks(project);
        if !fallback_errors.is_empty() {
            let log_messages = finish_messages(&request, fallback_errors);
            let lock_file = LockFile {
                project_file_dependency_groups: project_file_dependency_groups(project),
                logs: log_messages.clone(),
                dgspec_hash: dgspec_hash.clone(),
                ..LockFile::default()
            };
            info!(project = %project.name, "restore failed before walking");
            return Ok(RestoreResult {
                project_name: project.name.clone(),
                success: false,
                no_op: false,
                lock_file,
                previous_lock_file,
                lock_file_path,
                cache_file: NoOpCacheFile::new(dgspec_hash, false, project.project_path()),
                cache_file_path,
                graphs: Vec::new(),
                compatibility: Vec::new(),
                log_messages,
                elapsed: started.elapsed(),
            });
        }

        if !request.force {
            if let Some(result) = no_op_result(
                &request,
                &dgspec_hash,
                previous_lock_file.as_ref(),
                lock_file_path.clone(),
                cache_file_path.clone(),
                started,
            ) {
                return Ok(result);
            }
        }

        let provider = Arc::new(DependencyGraphSpecProvider::new(Arc::clone(&request.spec)));
        let context = RemoteWalkContext::new(Arc::clone(&request.cache), request.token.clone())
            .with_sources(request.sources.iter().cloned())
            .with_project_provider(provider);
        let walker = RemoteDependencyWalker::new(&context);
        let root = project.root_range();

        let targets = restore_targets(project);
        let walks = join_all(targets.iter().map(|(framework, runtime_identifier)| {
            walker.walk(root.clone(), framework, runtime_identifier.as_deref())
        }))
        .await;

        let mut graphs = Vec::new();
        let mut messages = Vec::new();
        for ((framework, runtime_identifier), walked) in targets.iter().zip(walks) {
            match walked {
                Ok(tree) => graphs.push(RestoreTargetGraph::create(tree)),
                Err(ResolverError::Cancelled) => return Err(RestoreError::Cancelled),
                Err(err) => {
                    let graph_name =
                        RestoreTargetGraph::graph_name(framework, runtime_identifier.as_deref());
                    messages.push(
                        RestoreLogMessage::error(LogCode::NU1301, err.to_string())
                            .with_target_graphs([graph_name]),
                    );
                }
            }
        }

        for graph in &graphs {
            messages.extend(graph_messages(graph, project));
        }

        let include_flags: Vec<BTreeMap<String, IncludeFlags>> =
            graphs.iter().map(include_flags_by_library).collect();
        let (mut lock_file, asset_messages) =
            build_lock_file(project, &graphs, &include_flags, &dgspec_hash);
        messages.extend(asset_messages);

        let checker = CompatibilityChecker::new(&lock_file, request.validates_runtime_assets());
        let compatibility: Vec<CompatibilityCheckResult> = graphs
            .iter()
            .zip(&include_flags)
            .map(|(graph, flags)| checker.check(graph, project, flags))
            .collect();
        for result in &compatibility {
            messages.extend(
                result
                    .issues
                    .iter()
                    .map(|issue| issue.to_log_message(&result.graph_name)),
            );
        }

        messages.extend(unexpected_dependency_messages(
            &graphs,
            project,
            request.is_locked_mode(),
        ));

        let log_messages = finish_messages(&request, messages);
        lock_file.logs = log_messages.clone();

        let success = graphs.len() == targets.len()
            && graphs.iter().all(RestoreTargetGraph::is_success)
            && compatibility.iter().all(|result| result.success)
            && !log_messages.iter().any(RestoreLogMessage::is_error);
        info!(
            project = %project.name,
            success,
            graphs = graphs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "restore finished"
        );

        Ok(RestoreResult {
            project_name: project.name.clone(),
            success,
            no_op: false,
            lock_file,
            previous_lock_file,
            lock_file_path,
            cache_file: NoOpCacheFile::new(dgspec_hash, success, project.project_path()),
            cache_file_path,
            graphs,
            compatibility,
            log_messages,
            elapsed: started.elapsed(),
        })
    }
}

fn no_op_result(
    request: &RestoreRequest,
    dgspec_hash: &str,
    previous_lock_file: Option<&LockFile>,
    lock_file_path: Option<PathBuf>,
    cache_file_path: Option<PathBuf>,
    started: Instant,
) -> Option<RestoreResult> {
    let path = cache_file_path.as_deref()?;
    let cache_file = match NoOpCacheFile::read(path) {
        Ok(cache_file) => cache_file?,
        Err(err) => {
            debug!(path = %path.display(), "ignoring cache file: {err:#}");
            return None;
        }
    };
    if !cache_file.is_valid_for(dgspec_hash) {
        return None;
    }
    let previous = previous_lock_file?;
    if previous.dgspec_hash != dgspec_hash {
        return None;
    }

    info!(project = %request.project.name, "inputs unchanged, skipping restore");
    for message in &previous.logs {
        request.logger.log(message);
    }
    Some(RestoreResult {
        project_name: request.project.name.clone(),
        success: true,
        no_op: true,
        lock_file: previous.clone(),
        previous_lock_file: Some(previous.clone()),
        lock_file_path,
        cache_file,
        cache_file_path,
        graphs: Vec::new(),
        compatibility: Vec::new(),
        log_messages: previous.logs.clone(),
        elapsed: started.elapsed(),
    })
}

/// Every declared framework, then every framework and runtime pair.
fn restore_targets(project: &PackageSpec) -> Vec<(Framework, Option<String>)> {
    let frameworks = project.frameworks();
    let mut targets: Vec<(Framework, Option<String>)> = frameworks
        .iter()
        .map(|framework| (framework.clone(), None))
        .collect();
    for framework in &frameworks {
        for runtime_identifier in &project.runtime_identifiers {
            targets.push((framework.clone(), Some(runtime_identifier.clone())));
        }
    }
    targets
}

/// Asset kinds each library flows with, keyed by lowercase name. A library
/// declared more than once gets the union of its declarations.
fn include_flags_by_library(graph: &RestoreTargetGraph) -> BTreeMap<String, IncludeFlags> {
    let mut flags: BTreeMap<String, IncludeFlags> = BTreeMap::new();
    for item in graph.flattened() {
        for dependency in &item.dependencies {
            let name = dependency.name().to_ascii_lowercase();
            let declared = dependency.include_flags();
            flags
                .entry(name)
                .and_modify(|existing| *existing = existing.union(&declared))
                .or_insert(declared);
        }
    }
    flags
}

fn build_lock_file(
    project: &PackageSpec,
    graphs: &[RestoreTargetGraph],
    include_flags: &[BTreeMap<String, IncludeFlags>],
    dgspec_hash: &str,
) -> (LockFile, Vec<RestoreLogMessage>) {
    let mut messages = Vec::new();
    let mut targets = Vec::new();
    let mut libraries: BTreeMap<(String, String), LockFileLibrary> = BTreeMap::new();

    for (graph, flags) in graphs.iter().zip(include_flags) {
        let framework = graph.framework();
        let target_info = project.target_framework(framework);
        let fallback_frameworks = target_info
            .map(|info| info.fallback_frameworks())
            .unwrap_or_default();
        let warns_on_fallback = target_info.is_some_and(|info| info.uses_asset_target_fallback());

        let mut target_libraries = Vec::new();
        for item in graph.libraries() {
            let target_library = match (&item.package, item.key.library_type) {
                (_, library_type) if library_type.is_project() => {
                    project_target_library(&item, framework)
                }
                (Some(package), LibraryType::Package) => {
                    let include = flags
                        .get(&item.key.name_key())
                        .cloned()
                        .unwrap_or_else(IncludeFlags::all);
                    let selected = select_assets(
                        package,
                        framework,
                        graph.runtime_identifier(),
                        fallback_frameworks,
                        &include,
                    );
                    if warns_on_fallback && selected.fallback_framework.is_some() {
                        messages.push(fallback_warning(
                            &item.key,
                            fallback_frameworks,
                            framework,
                            graph.name(),
                        ));
                    }
                    selected.library
                }
                _ => LockFileTargetLibrary::new(
                    item.key.name.clone(),
                    item.key.version.clone(),
                    item.key.library_type,
                ),
            };
            target_libraries.push(target_library);

            let version_key = item
                .key
                .version
                .as_ref()
                .map(|version| version.normalized())
                .unwrap_or_default();
            libraries
                .entry((item.key.name_key(), version_key))
                .or_insert_with(|| lock_file_library(&item));
        }

        targets.push(LockFileTarget {
            name: graph.name().to_string(),
            framework: framework.clone(),
            runtime_identifier: graph.runtime_identifier().map(str::to_string),
            libraries: target_libraries,
        });
    }

    let lock_file = LockFile {
        targets,
        libraries: libraries.into_values().collect(),
        project_file_dependency_groups: project_file_dependency_groups(project),
        dgspec_hash: dgspec_hash.to_string(),
        ..LockFile::default()
    };
    (lock_file, messages)
}

fn lock_file_library(item: &GraphItem) -> LockFileLibrary {
    let key = &item.key;
    let path = if key.library_type.is_project() {
        item.path.as_ref().map(|path| path.display().to_string())
    } else {
        key.version
            .as_ref()
            .map(|version| format!("{}/{}", key.name_key(), version.normalized()))
    };
    let mut files = item
        .package
        .as_ref()
        .map(|package| package.files.clone())
        .unwrap_or_default();
    files.sort();
    LockFileLibrary {
        name: key.name.clone(),
        version: key.version.clone(),
        library_type: key.library_type,
        path,
        files,
    }
}

fn fallback_warning(
    package: &LibraryIdentity,
    fallback_frameworks: &[Framework],
    framework: &Framework,
    graph_name: &str,
) -> RestoreLogMessage {
    let fallbacks = fallback_frameworks
        .iter()
        .map(Framework::dotnet_framework_name)
        .collect::<Vec<_>>()
        .join(", ");
    RestoreLogMessage::warning(
        LogCode::NU1701,
        format!(
            "Package '{package}' was restored using '{fallbacks}' instead of the project target framework '{}'. This package may not be fully compatible with your project.",
            framework.dotnet_framework_name()
        ),
    )
    .with_library_id(package.name.clone())
    .with_target_graphs([graph_name])
}

fn project_file_dependency_groups(project: &PackageSpec) -> Vec<ProjectFileDependencyGroup> {
    project
        .frameworks()
        .iter()
        .map(|framework| {
            let mut dependencies: Vec<String> = project
                .dependencies_for(framework)
                .iter()
                .filter(|dependency| dependency.library_range.type_constraint.allows_packages())
                .map(|dependency| format_id_and_range(dependency.name(), dependency.version_range()))
                .collect();
            dependencies.sort_by_key(|entry| entry.to_ascii_lowercase());
            ProjectFileDependencyGroup {
                framework: framework.to_string(),
                dependencies,
            }
        })
        .collect()
}

/// Applies the warning policy, merges messages that differ only by target
/// graph and hands each one to the logger.
fn finish_messages(
    request: &RestoreRequest,
    messages: Vec<RestoreLogMessage>,
) -> Vec<RestoreLogMessage> {
    let properties = request.warning_properties();
    let package_no_warn = package_no_warn(&request.project);

    let filtered: Vec<RestoreLogMessage> = messages
        .into_iter()
        .filter_map(|message| apply_warning_policy(message, &properties, &package_no_warn))
        .collect();
    let merged = merge_on_target_graph(filtered);
    for message in &merged {
        request.logger.log(message);
    }
    merged
}

fn apply_warning_policy(
    mut message: RestoreLogMessage,
    properties: &WarningProperties,
    package_no_warn: &BTreeMap<String, BTreeSet<LogCode>>,
) -> Option<RestoreLogMessage> {
    if message.level != LogLevel::Warning {
        return Some(message);
    }
    if properties.no_warn.contains(&message.code) {
        return None;
    }
    let suppressed_for_package = message
        .library_id
        .as_ref()
        .and_then(|id| package_no_warn.get(&id.to_ascii_lowercase()))
        .is_some_and(|codes| codes.contains(&message.code));
    if suppressed_for_package {
        return None;
    }
    if properties.all_warnings_as_errors || properties.warnings_as_errors.contains(&message.code) {
        message.level = LogLevel::Error;
    }
    Some(message)
}

/// Codes suppressed on individual package references, keyed by lowercase id.
fn package_no_warn(project: &PackageSpec) -> BTreeMap<String, BTreeSet<LogCode>> {
    let mut codes: BTreeMap<String, BTreeSet<LogCode>> = BTreeMap::new();
    for framework in project.frameworks() {
        for dependency in project.dependencies_for(&framework) {
            if dependency.no_warn.is_empty() {
                continue;
            }
            codes
                .entry(dependency.name().to_ascii_lowercase())
                .or_default()
                .extend(dependency.no_warn.iter().copied());
        }
    }
    codes
}
