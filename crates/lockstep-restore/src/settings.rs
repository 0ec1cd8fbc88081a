use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lockstep_core::LogCode;
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE_NAME: &str = "lockstep.toml";

/// Restore options read from `lockstep.toml`. Command line flags are applied
/// on top by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreSettings {
    /// Local feed directories, searched in order.
    pub sources: Vec<PathBuf>,
    pub disable_parallel: bool,
    pub max_parallel: Option<usize>,
    /// Restore even when the inputs are unchanged since the last success.
    pub force: bool,
    pub locked_mode: bool,
    pub validate_runtime_assets: bool,
    /// Compute results without writing lock or cache files.
    pub dry_run: bool,
    pub warnings_as_errors: BTreeSet<LogCode>,
    pub no_warn: BTreeSet<LogCode>,
}

impl RestoreSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let mut settings = Self::parse(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;

        // Relative feed paths are relative to the settings file.
        if let Some(base) = path.parent() {
            settings.sources = settings
                .sources
                .into_iter()
                .map(|source| {
                    if source.is_relative() {
                        base.join(source)
                    } else {
                        source
                    }
                })
                .collect();
        }
        Ok(settings)
    }

    /// Loads `path` when it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid restore settings")
    }

    /// How many projects may restore at once.
    pub fn parallelism(&self) -> usize {
        if self.disable_parallel {
            return 1;
        }
        self.max_parallel
            .filter(|max| *max > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(usize::from)
                    .unwrap_or(1)
            })
    }
}
