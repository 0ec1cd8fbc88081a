mod assets;
mod command;
mod compat;
pub mod diagnostics;
mod error;
mod local_source;
mod lockfile;
mod runner;
mod settings;

pub use assets::{
    has_assembly_folders, package_frameworks, project_target_library, select_assets,
    SelectedAssets, EMPTY_FOLDER_PLACEHOLDER,
};
pub use command::{RestoreCommand, RestoreRequest, RestoreResult};
pub use compat::{
    CompatibilityCheckResult, CompatibilityChecker, CompatibilityIssue, CompatibilityIssueKind,
};
pub use diagnostics::{
    bumped_up_dependencies, dependencies_above_upper_bounds,
    dependency_range_has_missing_exact_match, graph_missing_lower_bounds,
    project_dependencies_missing_version, project_missing_lower_bounds,
    unexpected_dependency_messages,
};
pub use error::RestoreError;
pub use local_source::LocalFolderSource;
pub use lockfile::{
    LockFile, LockFileFormat, LockFileLibrary, LockFileTarget, LockFileTargetLibrary,
    NoOpCacheFile, ProjectFileDependencyGroup, CACHE_FILE_NAME, LOCK_FILE_NAME,
    LOCK_FILE_VERSION,
};
pub use runner::{RestoreRunner, RestoreSummary, RestoreSummaryEntry};
pub use settings::{RestoreSettings, SETTINGS_FILE_NAME};

#[cfg(test)]
mod tests;
