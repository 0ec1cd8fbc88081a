use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lockstep_core::{DependencyGraphSpec, LogCode, PackageVersion, RestoreLogMessage};
use lockstep_resolver::{PackageSource, SourceCacheContext};
use lockstep_restore::{
    LocalFolderSource, RestoreResult, RestoreRunner, RestoreSettings, RestoreSummary,
    RestoreSummaryEntry, SETTINGS_FILE_NAME,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Restore flags given on the command line. Switches only ever turn a
/// setting on; sources and parallelism replace the file values when given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RestoreOverrides {
    pub sources: Vec<PathBuf>,
    pub force: bool,
    pub locked_mode: bool,
    pub disable_parallel: bool,
    pub max_parallel: Option<usize>,
    pub validate_runtime_assets: bool,
    pub dry_run: bool,
    pub warnings_as_errors: Vec<LogCode>,
    pub no_warn: Vec<LogCode>,
}

impl RestoreOverrides {
    pub(crate) fn apply(self, mut settings: RestoreSettings) -> RestoreSettings {
        if !self.sources.is_empty() {
            settings.sources = self.sources;
        }
        if self.max_parallel.is_some() {
            settings.max_parallel = self.max_parallel;
        }
        settings.force |= self.force;
        settings.locked_mode |= self.locked_mode;
        settings.disable_parallel |= self.disable_parallel;
        settings.validate_runtime_assets |= self.validate_runtime_assets;
        settings.dry_run |= self.dry_run;
        settings.warnings_as_errors.extend(self.warnings_as_errors);
        settings.no_warn.extend(self.no_warn);
        settings
    }
}

#[derive(Debug)]
pub(crate) struct RestoreOutcome {
    pub summary: RestoreSummary,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceListing {
    pub source: String,
    pub versions: Vec<PackageVersion>,
}

pub(crate) fn parse_log_code(value: &str) -> Result<LogCode, String> {
    LogCode::parse(value).ok_or_else(|| format!("unknown log code '{value}'"))
}

/// An explicit settings file must exist. The implicit one next to the graph file
/// is optional.
pub(crate) fn load_settings(spec_path: &Path, explicit: Option<&Path>) -> Result<RestoreSettings> {
    match explicit {
        Some(path) => RestoreSettings::load(path),
        None => {
            let path = spec_path
                .parent()
                .map(|dir| dir.join(SETTINGS_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_NAME));
            RestoreSettings::load_or_default(&path)
        }
    }
}

pub(crate) fn load_spec(path: &Path) -> Result<DependencyGraphSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read dependency graph spec: {}", path.display()))?;
    DependencyGraphSpec::from_toml_str(&content)
        .with_context(|| format!("invalid dependency graph spec: {}", path.display()))
}

pub(crate) fn open_sources(dirs: &[PathBuf]) -> Result<Vec<Arc<dyn PackageSource>>> {
    if dirs.is_empty() {
        anyhow::bail!("no package sources configured; pass --source or list sources in {SETTINGS_FILE_NAME}");
    }
    dirs.iter()
        .map(|dir| {
            if !dir.is_dir() {
                anyhow::bail!("package source is not a directory: {}", dir.display());
            }
            debug!(source = %dir.display(), "using local feed");
            Ok(Arc::new(LocalFolderSource::open(dir)) as Arc<dyn PackageSource>)
        })
        .collect()
}

pub(crate) async fn run_restore_command(
    spec_path: &Path,
    settings_path: Option<&Path>,
    overrides: RestoreOverrides,
    token: CancellationToken,
) -> Result<RestoreOutcome> {
    let spec = load_spec(spec_path)?;
    let settings = overrides.apply(load_settings(spec_path, settings_path)?);
    let sources = open_sources(&settings.sources)?;
    let cache = Arc::new(SourceCacheContext::new());

    let summary = RestoreRunner::run(&spec, &settings, sources, cache, token)
        .await
        .with_context(|| format!("restore of {} did not complete", spec_path.display()))?;
    Ok(RestoreOutcome {
        summary,
        dry_run: settings.dry_run,
    })
}

pub(crate) async fn run_versions_command(
    id: &str,
    sources: &[PathBuf],
    settings_path: Option<&Path>,
    token: &CancellationToken,
) -> Result<Vec<SourceListing>> {
    let dirs = if sources.is_empty() {
        let settings = match settings_path {
            Some(path) => RestoreSettings::load(path)?,
            None => RestoreSettings::load_or_default(Path::new(SETTINGS_FILE_NAME))?,
        };
        settings.sources
    } else {
        sources.to_vec()
    };
    if dirs.is_empty() {
        anyhow::bail!("no package sources configured; pass --source or list sources in {SETTINGS_FILE_NAME}");
    }

    let mut listings = Vec::new();
    for dir in dirs {
        let source = LocalFolderSource::open(&dir);
        let versions = source
            .get_all_versions(id, token)
            .await
            .with_context(|| format!("failed to list versions of {id}"))?;
        listings.push(SourceListing {
            source: source.name().to_string(),
            versions,
        });
    }
    Ok(listings)
}

/// One status and line per distinct restore result, each followed by the
/// diagnostics it recorded.
pub(crate) fn format_restore_summary_lines(outcome: &RestoreOutcome) -> Vec<(&'static str, String)> {
    let mut lines = Vec::new();
    let mut seen: Vec<&Arc<RestoreResult>> = Vec::new();
    for entry in &outcome.summary.entries {
        if seen.iter().any(|known| Arc::ptr_eq(known, &entry.result)) {
            continue;
        }
        seen.push(&entry.result);
        lines.push(result_line(entry, outcome.dry_run));
        lines.extend(entry.result.log_messages.iter().map(log_message_line));
    }
    lines
}

pub(crate) fn format_versions_lines(id: &str, listings: &[SourceListing]) -> Vec<String> {
    if listings.iter().all(|listing| listing.versions.is_empty()) {
        return vec![format!("No package found: {id}")];
    }
    let mut lines = vec![format!("Package: {id}")];
    for listing in listings {
        for version in &listing.versions {
            lines.push(format!("- {version} ({})", listing.source));
        }
    }
    lines
}

fn result_line(entry: &RestoreSummaryEntry, dry_run: bool) -> (&'static str, String) {
    let result = &entry.result;
    let targets = result.lock_file.targets.len();
    let libraries = result.lock_file.libraries.len();
    if result.no_op {
        return (
            "skip",
            format!(
                "{}: up to date ({targets} targets, {libraries} libraries)",
                result.project_name
            ),
        );
    }
    if !result.success {
        let errors = result.errors().count();
        let warnings = result.warnings().count();
        return (
            "err",
            format!(
                "failed to restore {}: {errors} errors, {warnings} warnings",
                result.project_name
            ),
        );
    }

    if let Some(error) = &entry.commit_error {
        return (
            "err",
            format!("failed to write restore output for {}: {error}", result.project_name),
        );
    }

    let suffix = if dry_run {
        " (dry run)"
    } else if !entry.written {
        " (lock file unchanged)"
    } else {
        ""
    };
    (
        "ok",
        format!(
            "restored {}: {targets} targets, {libraries} libraries in {}{suffix}",
            result.project_name,
            format_elapsed(result.elapsed)
        ),
    )
}

fn log_message_line(message: &RestoreLogMessage) -> (&'static str, String) {
    let status = if message.is_error() { "err" } else { "warn" };
    let graphs = if message.target_graphs.is_empty() {
        String::new()
    } else {
        format!(
            " [{}]",
            message
                .target_graphs
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    (
        status,
        format!(
            "{}{graphs}: {}",
            message.code,
            message.message.replace('\n', "\n    ")
        ),
    )
}

pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}
