use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lockstep_core::{
    AssetKind, CollectorLogger, DependencyGraphSpec, Framework, IncludeFlags, LibraryDependency,
    LibraryIdentity, LibraryRange, LibraryType, LogCode, LogLevel, PackageSpec, PackageVersion,
    ProjectRestoreMetadata, ProjectRestoreMetadataFrameworkInfo, ProjectRestoreReference,
    RestoreLogger, TargetFrameworkInformation, TypeConstraint, VersionRange,
};
use lockstep_resolver::{
    MemoryPackageSource, PackageDependencyInfo, PackageSource, ResolvedDependencyKey,
    ResolverError, SourceCacheContext,
};
use tokio_util::sync::CancellationToken;

use super::*;

#[tokio::test]
async fn direct_dependency_wins_and_restores_cleanly() {
    let source = feed()
        .with_simple_package("A", version("1.0.0"), vec![dependency("B", "1.0.0")])
        .with_simple_package("B", version("1.0.0"), Vec::new())
        .with_simple_package("B", version("2.0.0"), Vec::new());

    let result = restore_single(
        project("Project", vec![dependency("A", "1.0.0"), dependency("B", "2.0.0")]),
        source,
    )
    .await;

    assert!(result.success);
    assert_eq!(library_names(&result), ["A 1.0.0", "B 2.0.0"]);
    assert!(result.log_messages.is_empty());
}

#[tokio::test]
async fn dependency_declared_by_the_parent_package_wins_over_deeper_request() {
    let source = feed()
        .with_simple_package(
            "A",
            version("1.0.0"),
            vec![dependency("B", "1.0.0"), dependency("C", "2.0.0")],
        )
        .with_simple_package("B", version("1.0.0"), vec![dependency("C", "1.0.0")])
        .with_simple_package("C", version("1.0.0"), Vec::new())
        .with_simple_package("C", version("2.0.0"), Vec::new());

    let result = restore_single(project("Project", vec![dependency("A", "1.0.0")]), source).await;

    assert!(result.success);
    assert_eq!(library_names(&result), ["A 1.0.0", "B 1.0.0", "C 2.0.0"]);
}

#[tokio::test]
async fn downgrade_is_reported_exactly_once() {
    let source = feed()
        .with_simple_package(
            "A",
            version("1.0.0"),
            vec![dependency("B", "1.0.0"), dependency("C", "1.0.0")],
        )
        .with_simple_package("B", version("1.0.0"), vec![dependency("C", "2.0.0")])
        .with_simple_package("C", version("1.0.0"), Vec::new())
        .with_simple_package("C", version("2.0.0"), Vec::new());

    let result = restore_single(project("Project", vec![dependency("A", "1.0.0")]), source).await;

    assert_eq!(library_names(&result), ["A 1.0.0", "B 1.0.0", "C 1.0.0"]);
    assert_eq!(result.log_messages.len(), 1);
    let message = &result.log_messages[0];
    assert_eq!(message.code, LogCode::NU1605);
    assert_eq!(message.level, LogLevel::Warning);
    assert!(message
        .message
        .starts_with("Detected package downgrade: C from 2.0.0 to 1.0.0."));
    assert!(result.success);
}

#[tokio::test]
async fn package_depending_on_the_root_project_name_fails_with_cycle() {
    let source = feed().with_simple_package(
        "X",
        version("1.0.0"),
        vec![dependency("projectA", "1.0.0")],
    );

    let result = restore_single(project("projectA", vec![dependency("X", "1.0.0")]), source).await;

    assert!(!result.success);
    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, LogCode::NU1108);
    assert!(errors[0].message.contains("Cycle detected"));
    assert!(errors[0]
        .message
        .contains("projectA -> X 1.0.0 -> projectA (>= 1.0.0)"));
}

#[tokio::test]
async fn unresolved_package_is_an_error() {
    let result = restore_single(
        project("Project", vec![dependency("Missing", "1.0.0")]),
        feed(),
    )
    .await;

    assert!(!result.success);
    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, LogCode::NU1100);
    assert_eq!(
        errors[0].message,
        "Unable to resolve Missing (>= 1.0.0) for net46."
    );
}

#[tokio::test]
async fn conflicting_exact_ranges_fail_the_restore() {
    let source = feed()
        .with_simple_package("B", version("1.0.0"), vec![dependency("D", "[1.0.0]")])
        .with_simple_package("C", version("1.0.0"), vec![dependency("D", "[2.0.0]")])
        .with_simple_package("D", version("1.0.0"), Vec::new())
        .with_simple_package("D", version("2.0.0"), Vec::new());

    let result = restore_single(
        project("Project", vec![dependency("B", "1.0.0"), dependency("C", "1.0.0")]),
        source,
    )
    .await;

    assert!(!result.success);
    let conflict = result
        .errors()
        .find(|message| message.code == LogCode::NU1107)
        .expect("conflict should be reported");
    assert!(conflict
        .message
        .starts_with("Version conflict detected for D. Reference D 2.0.0 directly from project Project"));
}

#[tokio::test]
async fn bumped_direct_dependency_warns_once_across_frameworks() {
    let source = feed().with_simple_package("A", version("2.0.0"), Vec::new());
    let mut spec = project("Project", Vec::new());
    spec.dependencies.push(dependency("A", "1.0.0"));
    add_framework(&mut spec, "net47");

    let result = restore_single(spec, source).await;

    assert!(result.success);
    assert_eq!(result.log_messages.len(), 1);
    let message = &result.log_messages[0];
    assert_eq!(message.code, LogCode::NU1601);
    assert_eq!(
        message.message,
        "Dependency specified was A (>= 1.0.0) but ended up with A 2.0.0."
    );
    let graphs: Vec<&str> = message.target_graphs.iter().map(String::as_str).collect();
    assert_eq!(graphs, ["net46", "net47"]);
}

#[tokio::test]
async fn approximate_transitive_match_warns_unless_locked() {
    let source = || {
        feed()
            .with_simple_package("A", version("1.0.0"), vec![dependency("B", "1.0.0")])
            .with_simple_package("B", version("1.5.0"), Vec::new())
    };

    let result = restore_single(project("Project", vec![dependency("A", "1.0.0")]), source()).await;
    assert_eq!(codes(&result), [LogCode::NU1603]);
    assert_eq!(
        result.log_messages[0].message,
        "A 1.0.0 depends on B (>= 1.0.0) but B 1.0.0 was not found. An approximate best match of B 1.5.0 was resolved."
    );

    let mut locked = request_for(
        project("Project", vec![dependency("A", "1.0.0")]),
        Arc::new(source()),
    );
    locked.locked_mode = true;
    let result = RestoreCommand::new(locked)
        .execute()
        .await
        .expect("restore should run");
    assert!(result.log_messages.is_empty());
}

#[tokio::test]
async fn exclusive_lower_bound_on_transitive_dependency_warns() {
    let source = feed()
        .with_simple_package("A", version("1.0.0"), vec![dependency("B", "(1.0.0, )")])
        .with_simple_package("B", version("1.0.0"), Vec::new())
        .with_simple_package("B", version("1.5.0"), Vec::new());

    let result = restore_single(project("Project", vec![dependency("A", "1.0.0")]), source).await;

    assert_eq!(codes(&result), [LogCode::NU1602]);
    assert_eq!(
        result.log_messages[0].message,
        "A 1.0.0 does not provide an inclusive lower bound for dependency B (> 1.0.0). An approximate best match of B 1.5.0 was resolved."
    );
}

#[tokio::test]
async fn project_references_without_lower_bound_or_version_warn() {
    let source = feed()
        .with_simple_package("A", version("1.0.0"), Vec::new())
        .with_simple_package("A", version("3.0.0"), Vec::new())
        .with_simple_package("B", version("1.0.0"), Vec::new());
    let unversioned = LibraryDependency::new(LibraryRange::new("B", None, TypeConstraint::Package));

    let result = restore_single(
        project("Project", vec![dependency("A", "(, 2.0.0]"), unversioned]),
        source,
    )
    .await;

    assert_eq!(codes(&result), [LogCode::NU1604, LogCode::NU1604]);
    assert!(result.log_messages[0]
        .message
        .starts_with("Project dependency A (<= 2.0.0) does not contain an inclusive lower bound."));
    assert!(result.log_messages[1]
        .message
        .starts_with("Project dependency 'B' does not specify a version."));
}

#[tokio::test]
async fn version_above_a_declared_upper_bound_warns() {
    let source = feed()
        .with_simple_package("A", version("1.0.0"), vec![dependency("B", "[1.0.0, 2.0.0)")])
        .with_simple_package("B", version("1.0.0"), Vec::new())
        .with_simple_package("B", version("2.0.0"), Vec::new());

    let result = restore_single(
        project("Project", vec![dependency("A", "1.0.0"), dependency("B", "2.0.0")]),
        source,
    )
    .await;

    assert_eq!(codes(&result), [LogCode::NU1608]);
    assert_eq!(
        result.log_messages[0].message,
        "Detected package version outside of dependency constraint: A 1.0.0 requires B (>= 1.0.0 && < 2.0.0) but version B 2.0.0 was resolved."
    );
    assert!(result.success);
}

#[tokio::test]
async fn no_warn_and_warnings_as_errors_shape_the_log() {
    let source = || feed().with_simple_package("A", version("2.0.0"), Vec::new());

    let mut suppressed = request_for(
        project("Project", vec![dependency("A", "1.0.0")]),
        Arc::new(source()),
    );
    suppressed.no_warn.insert(LogCode::NU1601);
    let result = RestoreCommand::new(suppressed)
        .execute()
        .await
        .expect("restore should run");
    assert!(result.log_messages.is_empty());
    assert!(result.success);

    let mut promoted = request_for(
        project("Project", vec![dependency("A", "1.0.0")]),
        Arc::new(source()),
    );
    promoted.warnings_as_errors.insert(LogCode::NU1601);
    let result = RestoreCommand::new(promoted)
        .execute()
        .await
        .expect("restore should run");
    assert_eq!(codes(&result), [LogCode::NU1601]);
    assert_eq!(result.log_messages[0].level, LogLevel::Error);
    assert!(!result.success);

    let mut quiet_reference = dependency("A", "1.0.0");
    quiet_reference.no_warn.push(LogCode::NU1601);
    let result = restore_single(project("Project", vec![quiet_reference]), source()).await;
    assert!(result.log_messages.is_empty());

    let mut strict = project("Project", vec![dependency("A", "1.0.0")]);
    if let Some(metadata) = strict.restore_metadata.as_mut() {
        metadata.warning_properties.all_warnings_as_errors = true;
    }
    let result = restore_single(strict, source()).await;
    assert!(!result.success);
    assert!(result.errors().all(|message| message.code == LogCode::NU1601));
}

#[tokio::test]
async fn both_fallback_kinds_fail_before_any_walk() {
    let source = Arc::new(feed().with_simple_package("A", version("1.0.0"), Vec::new()));
    let mut spec = project("Project", vec![dependency("A", "1.0.0")]);
    spec.target_frameworks[0].imports.push(Framework::parse("net45"));
    spec.target_frameworks[0]
        .asset_target_fallback
        .push(Framework::parse("net45"));

    let request = request_for(spec, Arc::clone(&source));
    let result = RestoreCommand::new(request)
        .execute()
        .await
        .expect("restore should run");

    assert!(!result.success);
    assert_eq!(codes(&result), [LogCode::NU1003]);
    assert!(result.log_messages[0]
        .message
        .contains("PackageTargetFallback is deprecated"));
    assert!(result.graphs.is_empty());
    assert_eq!(source.version_calls("A"), 0);
}

#[tokio::test]
async fn failing_source_is_reported_per_graph() {
    let result = restore_single(
        project("Project", vec![dependency("A", "1.0.0")]),
        feed().failing(),
    )
    .await;

    assert!(!result.success);
    assert_eq!(codes(&result), [LogCode::NU1301]);
    assert!(result.log_messages[0]
        .message
        .contains("the source is unavailable"));
}

#[tokio::test]
async fn cancelled_restore_is_an_error_not_a_log_message() {
    let source = Arc::new(feed().with_simple_package("A", version("1.0.0"), Vec::new()));
    let mut request = request_for(project("Project", vec![dependency("A", "1.0.0")]), source);
    request.token.cancel();

    let err = RestoreCommand::new(request)
        .execute()
        .await
        .expect_err("cancelled restore must fail");
    assert!(err.is_cancelled());
}

#[test]
fn resolver_errors_map_onto_restore_errors() {
    let cancelled = RestoreError::from(ResolverError::Cancelled);
    assert!(cancelled.is_cancelled());

    let failure = RestoreError::from(ResolverError::source_failure(
        "feed", "A", "offline",
    ));
    assert_eq!(
        failure.to_string(),
        "package source 'feed' is unusable: A: offline"
    );
}

#[tokio::test]
async fn project_references_become_project_libraries() {
    let source = feed().with_simple_package("A", version("1.0.0"), Vec::new());
    let mut app = project("App", Vec::new());
    add_reference(&mut app, "Lib");
    let lib = project("Lib", vec![dependency("A", "1.0.0")]);
    let spec = seal(vec![app.clone(), lib]);

    let request = RestoreRequest::new(
        app,
        spec,
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .with_source(Arc::new(source) as Arc<dyn PackageSource>);
    let result = RestoreCommand::new(request)
        .execute()
        .await
        .expect("restore should run");

    assert!(result.success);
    let target = result.lock_file.target("net46").expect("net46 target");
    let lib = target.library("Lib").expect("project library");
    assert_eq!(lib.library_type, LibraryType::Project);
    assert_eq!(lib.compile, ["bin/placeholder/Lib.dll"]);
    assert_eq!(lib.dependencies.get("A").map(String::as_str), Some("[1.0.0, )"));
    assert!(target.library("A").is_some());
}

#[tokio::test]
async fn lock_file_records_targets_libraries_and_dependency_groups() {
    let source = feed()
        .with_package(
            PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
                .with_dependencies(Framework::parse("net45"), vec![dependency("B", "1.0.0")])
                .with_files(["lib/net45/A.dll", "lib/net45/fr/A.resources.dll", "A.nuspec"]),
        )
        .with_package(
            PackageDependencyInfo::new(LibraryIdentity::package("B", version("1.0.0")))
                .with_files(["lib/net45/_._"]),
        );
    let mut spec = project("Project", vec![dependency("A", "1.0.0")]);
    spec.runtime_identifiers.push("win-x64".to_string());

    let result = restore_single(spec, source).await;

    assert!(result.success);
    let names: Vec<&str> = result
        .lock_file
        .targets
        .iter()
        .map(|target| target.name.as_str())
        .collect();
    assert_eq!(names, ["net46", "net46/win-x64"]);

    let a = result
        .lock_file
        .target("net46")
        .and_then(|target| target.library("A"))
        .expect("A in target");
    assert_eq!(a.framework, Some(Framework::parse("net45")));
    assert_eq!(a.compile, ["lib/net45/A.dll"]);
    assert_eq!(a.runtime, ["lib/net45/A.dll"]);
    assert_eq!(a.resource, ["lib/net45/fr/A.resources.dll"]);
    assert_eq!(a.dependencies.get("B").map(String::as_str), Some("[1.0.0, )"));

    let b = result
        .lock_file
        .target("net46")
        .and_then(|target| target.library("B"))
        .expect("B in target");
    assert_eq!(b.compile, ["lib/net45/_._"]);

    let library = result
        .lock_file
        .library("A", Some(&version("1.0.0")))
        .expect("A library");
    assert_eq!(library.path.as_deref(), Some("a/1.0.0"));
    assert_eq!(library.files.len(), 3);

    assert_eq!(result.lock_file.project_file_dependency_groups.len(), 1);
    assert_eq!(
        result.lock_file.project_file_dependency_groups[0].dependencies,
        ["A (>= 1.0.0)"]
    );
    assert!(!result.lock_file.dgspec_hash.is_empty());
}

#[tokio::test]
async fn excluded_assets_are_left_out_of_the_target() {
    let source = feed().with_package(
        PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
            .with_files(["lib/net45/A.dll"]),
    );
    let mut reference = dependency("A", "1.0.0");
    reference.exclude = IncludeFlags::of(&[AssetKind::Compile]);

    let result = restore_single(project("Project", vec![reference]), source).await;

    let a = result
        .lock_file
        .target("net46")
        .and_then(|target| target.library("A"))
        .expect("A in target");
    assert!(a.compile.is_empty());
    assert_eq!(a.runtime, ["lib/net45/A.dll"]);
    assert!(result.success);
}

#[tokio::test]
async fn package_without_compatible_assets_is_incompatible() {
    let source = feed().with_package(
        PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
            .with_files(["lib/net48/A.dll"]),
    );

    let result = restore_single(project("Project", vec![dependency("A", "1.0.0")]), source).await;

    assert!(!result.success);
    assert_eq!(codes(&result), [LogCode::NU1202]);
    let message = &result.log_messages[0].message;
    assert!(message.starts_with("Package A 1.0.0 is not compatible with net46"));
    assert!(message.contains("Package A 1.0.0 supports: net48"));
    assert_eq!(result.compatibility.len(), 1);
    assert!(!result.compatibility[0].success);
}

#[tokio::test]
async fn reference_assembly_without_runtime_assembly_fails_runtime_graph() {
    let source = Arc::new(feed().with_package(
        PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
            .with_files(["ref/net46/A.dll"]),
    ));
    let mut spec = project("Project", vec![dependency("A", "1.0.0")]);
    spec.runtime_identifiers.push("win-x64".to_string());

    let mut request = request_for(spec, source);
    request.validate_runtime_assets = true;
    let result = RestoreCommand::new(request)
        .execute()
        .await
        .expect("restore should run");

    assert!(!result.success);
    assert_eq!(codes(&result), [LogCode::NU1203]);
    let message = &result.log_messages[0];
    assert!(message
        .message
        .ends_with("but there is no run-time assembly compatible with win-x64."));
    let graphs: Vec<&str> = message.target_graphs.iter().map(String::as_str).collect();
    assert_eq!(graphs, ["net46/win-x64"]);
}

#[tokio::test]
async fn asset_target_fallback_supplies_assets_with_a_warning() {
    let source = feed().with_package(
        PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
            .with_files(["lib/net45/A.dll"]),
    );
    let core = Framework::parse("netcoreapp3.1");
    let mut info = TargetFrameworkInformation::new(core.clone());
    info.dependencies.push(dependency("A", "1.0.0"));
    info.asset_target_fallback.push(net46());
    let mut spec = project("Project", Vec::new());
    spec.target_frameworks = vec![info];
    if let Some(metadata) = spec.restore_metadata.as_mut() {
        metadata.target_frameworks[0].framework = core;
    }

    let result = restore_single(spec, source).await;

    assert!(result.success);
    assert_eq!(codes(&result), [LogCode::NU1701]);
    assert!(result.log_messages[0]
        .message
        .starts_with("Package 'A 1.0.0' was restored using '.NETFramework,Version=v4.6'"));
    let a = result
        .lock_file
        .target("netcoreapp3.1")
        .and_then(|target| target.library("A"))
        .expect("A in target");
    assert_eq!(a.runtime, ["lib/net45/A.dll"]);
}

#[test]
fn selects_reference_and_runtime_specific_assemblies() {
    let info = PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
        .with_files([
            "lib/net46/A.dll",
            "ref/net46/A.dll",
            "runtimes/win-x64/lib/net46/A.dll",
            "lib/net46/A.xml",
        ]);

    let portable = select_assets(&info, &net46(), None, &[], &IncludeFlags::all());
    assert_eq!(portable.library.compile, ["ref/net46/A.dll"]);
    assert_eq!(portable.library.runtime, ["lib/net46/A.dll"]);
    assert!(portable.fallback_framework.is_none());

    let windows = select_assets(&info, &net46(), Some("win-x64"), &[], &IncludeFlags::all());
    assert_eq!(windows.library.compile, ["ref/net46/A.dll"]);
    assert_eq!(windows.library.runtime, ["runtimes/win-x64/lib/net46/A.dll"]);
}

#[test]
fn fallback_frameworks_are_only_consulted_without_primary_assets() {
    let info = PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
        .with_files(["lib/net45/A.dll", "lib/netstandard1.3/A.dll"]);
    let core = Framework::parse("netcoreapp3.1");

    let selected = select_assets(&info, &core, None, &[net46()], &IncludeFlags::all());
    assert_eq!(selected.library.framework, Some(Framework::parse("netstandard1.3")));
    assert!(selected.fallback_framework.is_none());

    let info = PackageDependencyInfo::new(LibraryIdentity::package("A", version("1.0.0")))
        .with_files(["lib/net45/A.dll"]);
    let selected = select_assets(&info, &core, None, &[net46()], &IncludeFlags::all());
    assert_eq!(selected.fallback_framework, Some(net46()));
    assert_eq!(selected.library.compile, ["lib/net45/A.dll"]);
}

#[test]
fn lists_frameworks_a_package_ships_assemblies_for() {
    let files = [
        "lib/net45/A.dll".to_string(),
        "ref/netstandard2.0/A.dll".to_string(),
        "lib/unknown-folder/A.dll".to_string(),
        "content/readme.txt".to_string(),
    ];
    assert_eq!(
        package_frameworks(&files),
        [Framework::parse("net45"), Framework::parse("netstandard2.0")]
    );
    assert!(has_assembly_folders(&files));
    assert!(!has_assembly_folders(&files[3..]));
}

#[test]
fn exact_match_check_compares_lower_bound_with_resolved_version() {
    let a = LibraryIdentity::package("A", version("1.0.0"));
    let key = |range_text: &str, resolved: &str| {
        ResolvedDependencyKey::new(
            a.clone(),
            Some(range(range_text)),
            LibraryIdentity::package("B", version(resolved)),
        )
    };

    assert!(!dependency_range_has_missing_exact_match(&key("1.0.0", "1.0.0")));
    assert!(!dependency_range_has_missing_exact_match(&key("1.0", "1.0.0")));
    assert!(dependency_range_has_missing_exact_match(&key("1.0.0", "1.5.0")));
    assert!(dependency_range_has_missing_exact_match(&key("(1.0.0, )", "1.5.0")));
    assert!(dependency_range_has_missing_exact_match(&key("[1.0.0-beta.1]", "1.0.0-beta-1")));
    assert!(dependency_range_has_missing_exact_match(&ResolvedDependencyKey::new(
        a.clone(),
        None,
        LibraryIdentity::package("B", version("1.0.0")),
    )));

    let from_project = ResolvedDependencyKey::new(
        LibraryIdentity::project("App", version("1.0.0")),
        Some(range("1.0.0")),
        LibraryIdentity::package("B", version("2.0.0")),
    );
    assert!(!dependency_range_has_missing_exact_match(&from_project));
}

#[tokio::test]
async fn commit_writes_only_changed_lock_files_and_skips_unchanged_inputs() {
    let root = test_root("commit");
    let feed_with_a = || feed().with_simple_package("A", version("1.0.0"), Vec::new());
    let spec = project_in(&root, "App", vec![dependency("A", "1.0.0")]);

    let first = restore_single(spec.clone(), feed_with_a()).await;
    assert!(first.commit().expect("first commit"));
    let lock_path = root.join("App").join("obj").join(LOCK_FILE_NAME);
    let cache_path = root.join("App").join("obj").join(CACHE_FILE_NAME);
    assert!(lock_path.is_file());
    let written = LockFileFormat::read(&lock_path).expect("lock file should parse");
    assert_eq!(written, first.lock_file);
    let cache = NoOpCacheFile::read(&cache_path)
        .expect("cache file should parse")
        .expect("cache file exists");
    assert!(cache.success);
    assert_eq!(cache.dgspec_hash, first.lock_file.dgspec_hash);

    let untouched = Arc::new(feed_with_a());
    let second = RestoreCommand::new(request_for(spec.clone(), Arc::clone(&untouched)))
        .execute()
        .await
        .expect("restore should run");
    assert!(second.no_op);
    assert!(second.success);
    assert_eq!(second.lock_file, first.lock_file);
    assert_eq!(untouched.version_calls("A"), 0);
    assert!(!second.commit().expect("no-op commit"));

    let mut forced = request_for(spec, Arc::new(feed_with_a()));
    forced.force = true;
    let third = RestoreCommand::new(forced)
        .execute()
        .await
        .expect("restore should run");
    assert!(!third.no_op);
    assert_eq!(third.lock_file, first.lock_file);
    assert!(!third.commit().expect("unchanged commit"));

    let changed_feed = feed()
        .with_simple_package("A", version("1.0.0"), Vec::new())
        .with_simple_package("B", version("1.0.0"), Vec::new());
    let changed = project_in(
        &root,
        "App",
        vec![dependency("A", "1.0.0"), dependency("B", "1.0.0")],
    );
    let fourth = restore_single(changed, changed_feed).await;
    assert!(!fourth.no_op);
    assert_ne!(fourth.lock_file.dgspec_hash, first.lock_file.dgspec_hash);
    assert!(fourth.commit().expect("changed commit"));
    let rewritten = LockFileFormat::read(&lock_path).expect("lock file should parse");
    assert!(rewritten.library("B", Some(&version("1.0.0"))).is_some());

    let _ = fs::remove_dir_all(&root);
}

#[tokio::test]
async fn failed_restore_is_never_a_no_op() {
    let root = test_root("failed");
    let spec = project_in(&root, "App", vec![dependency("Missing", "1.0.0")]);

    let first = restore_single(spec.clone(), feed()).await;
    assert!(!first.success);
    assert!(first.commit().expect("commit"));

    let second = restore_single(spec, feed()).await;
    assert!(!second.no_op);
    assert!(!second.success);

    let _ = fs::remove_dir_all(&root);
}

#[tokio::test]
async fn runner_shares_results_between_duplicate_entries() {
    let source = feed().with_simple_package("A", version("1.0.0"), Vec::new());
    let spec = DependencyGraphSpec::builder()
        .add_project(project("App", vec![dependency("A", "1.0.0")]))
        .add_project(project("Tool", Vec::new()))
        .add_restore("App")
        .add_restore("Tool")
        .add_restore("app")
        .build()
        .expect("spec should validate");
    let settings = RestoreSettings {
        dry_run: true,
        ..RestoreSettings::default()
    };

    let summary = RestoreRunner::run(
        &spec,
        &settings,
        vec![Arc::new(source) as Arc<dyn PackageSource>],
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .await
    .expect("restore should run");

    assert_eq!(summary.entries.len(), 3);
    assert_eq!(summary.results().len(), 2);
    assert!(Arc::ptr_eq(
        &summary.entries[0].result,
        &summary.entries[2].result
    ));
    assert!(summary.entries.iter().all(|entry| !entry.written));
    assert!(summary.success());
    assert_eq!(
        summary.result("TOOL").map(|result| result.project_name.as_str()),
        Some("Tool")
    );
}

#[tokio::test]
async fn runner_keeps_other_results_when_one_commit_fails() {
    let root = test_root("commit-failure");
    fs::create_dir_all(&root).expect("test root should be created");
    let blocker = root.join("blocker");
    fs::write(&blocker, "not a directory").expect("blocker file should be written");

    let source = feed().with_simple_package("A", version("1.0.0"), Vec::new());
    let spec = DependencyGraphSpec::builder()
        .add_project(project_in(&root, "App", vec![dependency("A", "1.0.0")]))
        .add_project(project_with_output(
            "Broken",
            vec![dependency("A", "1.0.0")],
            blocker.clone(),
        ))
        .add_restore("App")
        .add_restore("Broken")
        .build()
        .expect("spec should validate");

    let summary = RestoreRunner::run(
        &spec,
        &RestoreSettings::default(),
        vec![Arc::new(source) as Arc<dyn PackageSource>],
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .await
    .expect("restore should run");

    assert_eq!(summary.entries.len(), 2);
    assert!(!summary.success());

    let app = &summary.entries[0];
    assert!(app.result.success);
    assert!(app.written);
    assert_eq!(app.commit_error, None);
    assert!(root.join("App").join("obj").join(LOCK_FILE_NAME).is_file());

    let broken = &summary.entries[1];
    assert!(broken.result.success);
    assert!(!broken.written);
    let error = broken.commit_error.as_deref().expect("commit should fail");
    assert!(error.contains("failed to"));

    let _ = fs::remove_dir_all(&root);
}

#[tokio::test]
async fn sequential_and_parallel_runs_agree() {
    let source = || {
        Arc::new(
            feed()
                .with_simple_package(
                    "A",
                    version("1.0.0"),
                    vec![dependency("B", "1.0.0"), dependency("C", "1.0.0")],
                )
                .with_simple_package("B", version("1.0.0"), vec![dependency("C", "2.0.0")])
                .with_simple_package("C", version("1.0.0"), Vec::new())
                .with_simple_package("C", version("2.0.0"), Vec::new())
                .with_latency(Duration::from_millis(2)),
        ) as Arc<dyn PackageSource>
    };
    let mut app = project("App", vec![dependency("A", "1.0.0")]);
    add_framework(&mut app, "net48");
    let spec = DependencyGraphSpec::builder()
        .add_project(app)
        .add_project(project("Other", vec![dependency("C", "2.0.0")]))
        .add_restore("App")
        .add_restore("Other")
        .build()
        .expect("spec should validate");

    let sequential = RestoreSettings {
        disable_parallel: true,
        dry_run: true,
        ..RestoreSettings::default()
    };
    let parallel = RestoreSettings {
        max_parallel: Some(4),
        dry_run: true,
        ..RestoreSettings::default()
    };

    let first = RestoreRunner::run(
        &spec,
        &sequential,
        vec![source()],
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .await
    .expect("sequential restore");
    let second = RestoreRunner::run(
        &spec,
        &parallel,
        vec![source()],
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .await
    .expect("parallel restore");

    assert_eq!(first.entries.len(), second.entries.len());
    for (left, right) in first.entries.iter().zip(&second.entries) {
        assert_eq!(left.unique_name, right.unique_name);
        assert_eq!(left.result.lock_file, right.result.lock_file);
        assert_eq!(left.result.log_messages, right.result.log_messages);
    }
}

#[tokio::test]
async fn runner_stops_on_cancellation() {
    let spec = DependencyGraphSpec::builder()
        .add_project(project("App", Vec::new()))
        .add_restore("App")
        .build()
        .expect("spec should validate");
    let token = CancellationToken::new();
    token.cancel();

    let err = RestoreRunner::run(
        &spec,
        &RestoreSettings::default(),
        Vec::new(),
        Arc::new(SourceCacheContext::new()),
        token,
    )
    .await
    .expect_err("cancelled run must fail");
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn logger_receives_every_recorded_message() {
    let logger = Arc::new(CollectorLogger::new());
    let source = Arc::new(feed().with_simple_package("A", version("2.0.0"), Vec::new()));
    let request = request_for(project("Project", vec![dependency("A", "1.0.0")]), source)
        .with_logger(Arc::clone(&logger) as Arc<dyn RestoreLogger>);

    let result = RestoreCommand::new(request)
        .execute()
        .await
        .expect("restore should run");

    assert_eq!(logger.messages(), result.log_messages);
    assert_eq!(logger.warnings().len(), 1);
}

#[tokio::test]
async fn local_folder_source_reads_manifests_from_disk() {
    let root = test_root("feed");
    write_manifest(
        &root,
        "A",
        "1.0.0",
        r#"id = "A"
version = "1.0.0"
files = ["lib/net45/A.dll"]

[[dependency_groups]]
target_framework = "net45"
dependencies = [{ id = "B", version = "[1.0.0, )", exclude = ["compile"] }]

[[framework_references]]
target_framework = "net45"
references = ["System.Net.Http"]
"#,
    );
    write_manifest(&root, "A", "2.0.0-beta", "id = \"A\"\nversion = \"2.0.0-beta\"\n");
    write_manifest(&root, "B", "1.0.0", "id = \"B\"\nversion = \"1.0.0\"\n");
    fs::write(root.join("a").join("notes.txt"), "ignored").expect("must write note");

    let source = LocalFolderSource::open(&root).with_name("local");
    let token = CancellationToken::new();

    let versions = source
        .get_all_versions("a", &token)
        .await
        .expect("versions should list");
    assert_eq!(versions, [version("1.0.0"), version("2.0.0-beta")]);
    assert!(source
        .get_all_versions("missing", &token)
        .await
        .expect("missing package lists nothing")
        .is_empty());

    let info = source
        .get_dependency_info("A", &version("1.0"), &token)
        .await
        .expect("manifest should load")
        .expect("manifest exists");
    assert_eq!(info.files, ["lib/net45/A.dll"]);
    let dependencies = info.dependencies_for(&net46());
    assert_eq!(dependencies.len(), 1);
    assert_eq!(dependencies[0].name(), "B");
    assert!(!dependencies[0].include_flags().contains(AssetKind::Compile));
    assert_eq!(info.framework_reference_groups[0].references, ["System.Net.Http"]);

    assert!(source
        .get_dependency_info("A", &version("3.0.0"), &token)
        .await
        .expect("lookup should run")
        .is_none());

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = source
        .get_all_versions("A", &cancelled)
        .await
        .expect_err("cancelled lookup must fail");
    assert!(err.is_cancelled());

    let _ = fs::remove_dir_all(&root);
}

#[tokio::test]
async fn local_folder_source_reports_broken_manifests() {
    let root = test_root("broken");
    write_manifest(&root, "A", "1.0.0", "id = \"A\"\nversion = [\n");

    let source = LocalFolderSource::open(&root).with_name("local");
    let err = source
        .get_dependency_info("A", &version("1.0.0"), &CancellationToken::new())
        .await
        .expect_err("broken manifest must fail");
    assert!(err.to_string().contains("failed parsing manifest"));
    assert!(err.to_string().contains("source 'local'"));

    let _ = fs::remove_dir_all(&root);
}

#[tokio::test]
async fn restores_from_a_local_folder_feed() {
    let root = test_root("local-restore");
    let feed_root = root.join("feed");
    write_manifest(
        &feed_root,
        "A",
        "1.0.0",
        "id = \"A\"\nversion = \"1.0.0\"\nfiles = [\"lib/net45/A.dll\"]\n\n[[dependency_groups]]\ntarget_framework = \"net45\"\ndependencies = [{ id = \"B\", version = \"1.0.0\" }]\n",
    );
    write_manifest(
        &feed_root,
        "B",
        "1.0.0",
        "id = \"B\"\nversion = \"1.0.0\"\nfiles = [\"lib/net45/B.dll\"]\n",
    );
    let spec = DependencyGraphSpec::builder()
        .add_project(project_in(&root, "App", vec![dependency("A", "1.0.0")]))
        .add_restore("App")
        .build()
        .expect("spec should validate");

    let summary = RestoreRunner::run(
        &spec,
        &RestoreSettings::default(),
        vec![Arc::new(LocalFolderSource::open(&feed_root)) as Arc<dyn PackageSource>],
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .await
    .expect("restore should run");

    assert!(summary.success());
    assert!(summary.entries[0].written);
    let lock_file = LockFileFormat::read(&root.join("App").join("obj").join(LOCK_FILE_NAME))
        .expect("lock file should parse");
    let target = lock_file.target("net46").expect("net46 target");
    assert_eq!(
        target
            .libraries
            .iter()
            .map(|library| library.name.as_str())
            .collect::<Vec<_>>(),
        ["A", "B"]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn settings_resolve_feed_paths_and_parallelism() {
    let root = test_root("settings");
    fs::create_dir_all(&root).expect("must create settings dir");
    let path = root.join(SETTINGS_FILE_NAME);
    fs::write(
        &path,
        "sources = [\"feed\", \"/opt/feed\"]\nmax_parallel = 3\nno_warn = [\"NU1603\"]\nwarnings_as_errors = [\"NU1605\"]\n",
    )
    .expect("must write settings");

    let settings = RestoreSettings::load(&path).expect("settings should load");
    assert_eq!(settings.sources, [root.join("feed"), PathBuf::from("/opt/feed")]);
    assert_eq!(settings.parallelism(), 3);
    assert!(settings.no_warn.contains(&LogCode::NU1603));
    assert!(settings.warnings_as_errors.contains(&LogCode::NU1605));

    let sequential = RestoreSettings {
        disable_parallel: true,
        max_parallel: Some(8),
        ..RestoreSettings::default()
    };
    assert_eq!(sequential.parallelism(), 1);

    assert!(RestoreSettings::parse("unknown = true").is_err());
    let defaults = RestoreSettings::load_or_default(&root.join("absent.toml"))
        .expect("missing settings fall back to defaults");
    assert_eq!(defaults, RestoreSettings::default());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn lock_file_rejects_other_format_versions() {
    let rendered = LockFileFormat::render(&LockFile::default()).expect("render");
    assert!(rendered.ends_with('\n'));
    assert_eq!(
        LockFileFormat::parse(&rendered).expect("parse"),
        LockFile::default()
    );

    let err = LockFileFormat::parse(r#"{ "version": 1 }"#).expect_err("old format must fail");
    assert!(err.to_string().contains("unsupported lock file version 1"));
}

fn version(input: &str) -> PackageVersion {
    PackageVersion::parse(input).expect("version should parse")
}

fn range(input: &str) -> VersionRange {
    VersionRange::parse(input).expect("range should parse")
}

fn dependency(id: &str, version_range: &str) -> LibraryDependency {
    LibraryDependency::package(id, range(version_range))
}

fn net46() -> Framework {
    Framework::parse("net46")
}

fn feed() -> MemoryPackageSource {
    MemoryPackageSource::new("memory")
}

fn codes(result: &RestoreResult) -> Vec<LogCode> {
    result
        .log_messages
        .iter()
        .map(|message| message.code)
        .collect()
}

fn library_names(result: &RestoreResult) -> Vec<String> {
    result
        .graphs
        .first()
        .map(|graph| {
            graph
                .libraries()
                .iter()
                .map(|item| item.key.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn test_root(label: &str) -> PathBuf {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "lockstep-restore-tests-{label}-{}-{}-{}",
        std::process::id(),
        nanos,
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

fn write_manifest(root: &Path, id: &str, version: &str, content: &str) {
    let package_dir = root.join(id.to_ascii_lowercase());
    fs::create_dir_all(&package_dir).expect("must create package dir");
    fs::write(package_dir.join(format!("{version}.toml")), content).expect("must write manifest");
}

fn project(name: &str, dependencies: Vec<LibraryDependency>) -> PackageSpec {
    project_with_output(
        name,
        dependencies,
        PathBuf::from(format!("/nonexistent/lockstep/{name}/obj")),
    )
}

fn project_in(root: &Path, name: &str, dependencies: Vec<LibraryDependency>) -> PackageSpec {
    project_with_output(name, dependencies, root.join(name).join("obj"))
}

fn project_with_output(
    name: &str,
    dependencies: Vec<LibraryDependency>,
    output_path: PathBuf,
) -> PackageSpec {
    let mut info = TargetFrameworkInformation::new(net46());
    info.dependencies = dependencies;

    let mut metadata =
        ProjectRestoreMetadata::new(name, name, format!("/src/{name}/{name}.csproj"));
    metadata.output_path = Some(output_path);
    metadata
        .target_frameworks
        .push(ProjectRestoreMetadataFrameworkInfo {
            framework: net46(),
            project_references: Vec::new(),
        });

    let mut spec = PackageSpec::new(name);
    spec.target_frameworks.push(info);
    spec.restore_metadata = Some(metadata);
    spec
}

fn add_framework(project: &mut PackageSpec, framework: &str) {
    let mut info = TargetFrameworkInformation::new(Framework::parse(framework));
    info.dependencies = project.target_frameworks[0].dependencies.clone();
    project.target_frameworks.push(info);
}

fn add_reference(project: &mut PackageSpec, reference: &str) {
    if let Some(metadata) = project.restore_metadata.as_mut() {
        metadata.target_frameworks[0]
            .project_references
            .push(ProjectRestoreReference::new(reference));
    }
}

fn seal(projects: Vec<PackageSpec>) -> Arc<DependencyGraphSpec> {
    let restore = projects[0].name.clone();
    let mut builder = DependencyGraphSpec::builder();
    for project in projects {
        builder = builder.add_project(project);
    }
    Arc::new(
        builder
            .add_restore(restore)
            .build()
            .expect("spec should validate"),
    )
}

fn request_for(project: PackageSpec, source: Arc<MemoryPackageSource>) -> RestoreRequest {
    let spec = seal(vec![project.clone()]);
    RestoreRequest::new(
        project,
        spec,
        Arc::new(SourceCacheContext::new()),
        CancellationToken::new(),
    )
    .with_source(source as Arc<dyn PackageSource>)
}

async fn restore_single(project: PackageSpec, source: MemoryPackageSource) -> RestoreResult {
    RestoreCommand::new(request_for(project, Arc::new(source)))
        .execute()
        .await
        .expect("restore should run")
}
