use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use lockstep_core::DependencyGraphSpec;
use lockstep_resolver::{PackageSource, SourceCacheContext};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::{RestoreCommand, RestoreRequest, RestoreResult};
use crate::error::RestoreError;
use crate::settings::RestoreSettings;

/// One restore entry of the dependency graph spec and the result it maps
/// to. Entries naming the same project share one result.
#[derive(Debug, Clone)]
pub struct RestoreSummaryEntry {
    pub unique_name: String,
    pub result: Arc<RestoreResult>,
    /// Whether the commit wrote a lock file.
    pub written: bool,
    /// Why writing the lock or cache file failed, if it did.
    pub commit_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    pub entries: Vec<RestoreSummaryEntry>,
}

impl RestoreSummary {
    pub fn success(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.result.success && entry.commit_error.is_none())
    }

    pub fn result(&self, unique_name: &str) -> Option<&Arc<RestoreResult>> {
        self.entries
            .iter()
            .find(|entry| entry.unique_name.eq_ignore_ascii_case(unique_name))
            .map(|entry| &entry.result)
    }

    /// Each distinct result once, in restore order.
    pub fn results(&self) -> Vec<Arc<RestoreResult>> {
        let mut results: Vec<Arc<RestoreResult>> = Vec::new();
        for entry in &self.entries {
            if !results.iter().any(|known| Arc::ptr_eq(known, &entry.result)) {
                results.push(Arc::clone(&entry.result));
            }
        }
        results
    }
}

/// Restores every entry of a dependency graph spec.
pub struct RestoreRunner;

impl RestoreRunner {
    /// Projects restore concurrently up to the configured parallelism, or
    /// one at a time when parallel restore is disabled. Results are
    /// committed unless the settings ask for a dry run.
    pub async fn run(
        spec: &DependencyGraphSpec,
        settings: &RestoreSettings,
        sources: Vec<Arc<dyn PackageSource>>,
        cache: Arc<SourceCacheContext>,
        token: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError> {
        let mut unique: Vec<String> = Vec::new();
        for entry in spec.restore() {
            if !unique.iter().any(|known| known.eq_ignore_ascii_case(entry)) {
                unique.push(entry.clone());
            }
        }

        let parallelism = settings.parallelism();
        info!(
            projects = unique.len(),
            requested = spec.restore().len(),
            parallelism,
            "starting restore"
        );

        let completed: Vec<Option<(String, Arc<RestoreResult>, Commit)>> = stream::iter(unique)
            .map(|unique_name| {
                let sources = sources.clone();
                let cache = Arc::clone(&cache);
                let token = token.clone();
                async move {
                    let Some(project) = spec.project(&unique_name) else {
                        warn!(project = %unique_name, "restore entry names no project");
                        return Ok(None);
                    };
                    let closure = Arc::new(spec.with_project_closure(&unique_name));
                    let request = RestoreRequest::new(project.clone(), closure, cache, token)
                        .with_sources(sources)
                        .with_settings(settings);
                    let result = RestoreCommand::new(request).execute().await?;
                    let commit = if settings.dry_run {
                        Commit::default()
                    } else {
                        match result.commit() {
                            Ok(written) => Commit {
                                written,
                                error: None,
                            },
                            Err(err) => {
                                let error = format!("{err:#}");
                                warn!(project = %unique_name, %error, "failed to commit restore");
                                Commit {
                                    written: false,
                                    error: Some(error),
                                }
                            }
                        }
                    };
                    Ok::<_, RestoreError>(Some((unique_name, Arc::new(result), commit)))
                }
            })
            .buffered(parallelism)
            .try_collect()
            .await?;

        let shared: BTreeMap<String, (Arc<RestoreResult>, Commit)> = completed
            .into_iter()
            .flatten()
            .map(|(name, result, commit)| (name.to_ascii_lowercase(), (result, commit)))
            .collect();

        let entries = spec
            .restore()
            .iter()
            .filter_map(|unique_name| {
                let (result, commit) = shared.get(&unique_name.to_ascii_lowercase())?;
                Some(RestoreSummaryEntry {
                    unique_name: unique_name.clone(),
                    result: Arc::clone(result),
                    written: commit.written,
                    commit_error: commit.error.clone(),
                })
            })
            .collect();

        let summary = RestoreSummary { entries };
        info!(success = summary.success(), "restore complete");
        Ok(summary)
    }
}

#[derive(Debug, Default)]
struct Commit {
    written: bool,
    error: Option<String>,
}
