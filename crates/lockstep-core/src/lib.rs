mod dgspec;
mod framework;
mod library;
mod logging;
mod project;
mod range;
mod validation;
mod version;

pub use dgspec::{DependencyGraphSpec, DependencyGraphSpecBuilder};
pub use framework::{Framework, FrameworkFamily};
pub use library::{
    AssetKind, IncludeFlags, LibraryDependency, LibraryIdentity, LibraryRange, LibraryType,
    TypeConstraint,
};
pub use logging::{
    merge_on_target_graph, CollectorLogger, LogCode, LogLevel, RestoreLogMessage, RestoreLogger,
};
pub use project::{
    PackageSpec, ProjectRestoreMetadata, ProjectRestoreMetadataFrameworkInfo,
    ProjectRestoreReference, ProjectStyle, TargetFrameworkInformation, WarningProperties,
};
pub use range::{
    format_expected_identity, format_id_and_range, has_missing_lower_bound, FloatBehavior,
    FloatRange, VersionRange,
};
pub use validation::{
    validate_dependency_graph_spec, validate_fallback_frameworks, validate_project_spec,
    SpecValidationError,
};
pub use version::{PackageVersion, VersionError};
