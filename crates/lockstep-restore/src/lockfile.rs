use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lockstep_core::{Framework, LibraryType, PackageVersion, RestoreLogMessage};
use serde::{Deserialize, Serialize};

pub const LOCK_FILE_VERSION: u32 = 3;
pub const LOCK_FILE_NAME: &str = "project.assets.json";
pub const CACHE_FILE_NAME: &str = "project.lockstep.cache";

/// The restore output for one project: what was selected for every target
/// graph, every library involved, and what was reported along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFile {
    pub version: u32,
    #[serde(default)]
    pub targets: Vec<LockFileTarget>,
    #[serde(default)]
    pub libraries: Vec<LockFileLibrary>,
    #[serde(default)]
    pub project_file_dependency_groups: Vec<ProjectFileDependencyGroup>,
    #[serde(default)]
    pub logs: Vec<RestoreLogMessage>,
    #[serde(default)]
    pub dgspec_hash: String,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: LOCK_FILE_VERSION,
            targets: Vec::new(),
            libraries: Vec::new(),
            project_file_dependency_groups: Vec::new(),
            logs: Vec::new(),
            dgspec_hash: String::new(),
        }
    }
}

impl LockFile {
    pub fn target(&self, name: &str) -> Option<&LockFileTarget> {
        self.targets.iter().find(|target| target.name == name)
    }

    pub fn library(&self, name: &str, version: Option<&PackageVersion>) -> Option<&LockFileLibrary> {
        self.libraries.iter().find(|library| {
            library.name.eq_ignore_ascii_case(name) && library.version.as_ref() == version
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFileTarget {
    /// `net46` or `net46/win-x64`.
    pub name: String,
    pub framework: Framework,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_identifier: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LockFileTargetLibrary>,
}

impl LockFileTarget {
    pub fn library(&self, name: &str) -> Option<&LockFileTargetLibrary> {
        self.libraries
            .iter()
            .find(|library| library.name.eq_ignore_ascii_case(name))
    }
}

/// One library as seen by one target graph, with the asset groups chosen
/// for that graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFileTargetLibrary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<PackageVersion>,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
    /// Framework the assets were selected for. Differs from the target
    /// framework when a fallback framework supplied them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compile: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub framework_references: Vec<String>,
}

impl LockFileTargetLibrary {
    pub fn new(name: impl Into<String>, version: Option<PackageVersion>, library_type: LibraryType) -> Self {
        Self {
            name: name.into(),
            version,
            library_type,
            framework: None,
            dependencies: BTreeMap::new(),
            compile: Vec::new(),
            runtime: Vec::new(),
            resource: Vec::new(),
            framework_references: Vec::new(),
        }
    }

    pub fn has_assets(&self) -> bool {
        !self.compile.is_empty()
            || !self.runtime.is_empty()
            || !self.resource.is_empty()
            || !self.framework_references.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFileLibrary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<PackageVersion>,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Direct dependencies of the project for one framework, as `id range`
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFileDependencyGroup {
    pub framework: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

pub struct LockFileFormat;

impl LockFileFormat {
    pub fn parse(content: &str) -> Result<LockFile> {
        let lock_file: LockFile =
            serde_json::from_str(content).context("failed to parse lock file")?;
        if lock_file.version != LOCK_FILE_VERSION {
            anyhow::bail!(
                "unsupported lock file version {} (expected {LOCK_FILE_VERSION})",
                lock_file.version
            );
        }
        Ok(lock_file)
    }

    pub fn render(lock_file: &LockFile) -> Result<String> {
        let mut rendered =
            serde_json::to_string_pretty(lock_file).context("failed to serialize lock file")?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn read(path: &Path) -> Result<LockFile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read lock file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid lock file: {}", path.display()))
    }

    /// Reads the lock file when one exists. A missing or unreadable file is
    /// treated as absent.
    pub fn read_if_valid(path: &Path) -> Option<LockFile> {
        if !path.is_file() {
            return None;
        }
        match Self::read(path) {
            Ok(lock_file) => Some(lock_file),
            Err(err) => {
                tracing::debug!(path = %path.display(), "ignoring previous lock file: {err:#}");
                None
            }
        }
    }

    pub fn write(path: &Path, lock_file: &LockFile) -> Result<()> {
        let rendered = Self::render(lock_file)?;
        write_atomically(path, rendered.as_bytes())
            .with_context(|| format!("failed to write lock file: {}", path.display()))
    }
}

/// Marker written next to the lock file. A restore whose inputs hash to the
/// same value as a successful previous one has nothing to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoOpCacheFile {
    pub version: u32,
    pub dgspec_hash: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_file_path: Option<PathBuf>,
}

impl NoOpCacheFile {
    pub const VERSION: u32 = 1;

    pub fn new(dgspec_hash: impl Into<String>, success: bool, project_file_path: Option<PathBuf>) -> Self {
        Self {
            version: Self::VERSION,
            dgspec_hash: dgspec_hash.into(),
            success,
            project_file_path,
        }
    }

    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cache file: {}", path.display()));
            }
        };
        let cache: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache file: {}", path.display()))?;
        if cache.version != Self::VERSION {
            return Ok(None);
        }
        Ok(Some(cache))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let rendered =
            serde_json::to_string_pretty(self).context("failed to serialize cache file")?;
        write_atomically(path, rendered.as_bytes())
            .with_context(|| format!("failed to write cache file: {}", path.display()))
    }

    /// Whether a restore with `dgspec_hash` can reuse the previous result.
    pub fn is_valid_for(&self, dgspec_hash: &str) -> bool {
        self.success && self.dgspec_hash == dgspec_hash
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let staged = path.with_extension("tmp");
    fs::write(&staged, bytes)
        .with_context(|| format!("failed to write {}", staged.display()))?;
    fs::rename(&staged, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            staged.display(),
            path.display()
        )
    })
}
