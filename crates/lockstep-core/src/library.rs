use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::logging::LogCode;
use crate::range::VersionRange;
use crate::version::PackageVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LibraryType {
    Package,
    Project,
    ExternalProject,
    Reference,
    Unresolved,
}

impl LibraryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Project => "project",
            Self::ExternalProject => "externalProject",
            Self::Reference => "reference",
            Self::Unresolved => "unresolved",
        }
    }

    pub fn is_project(self) -> bool {
        matches!(self, Self::Project | Self::ExternalProject)
    }
}

/// Which kinds of library may satisfy a dependency. The combinations that
/// occur in practice are spelled out as variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeConstraint {
    None,
    Package,
    Project,
    ExternalProject,
    Reference,
    WinMd,
    ProjectOrExternal,
    #[default]
    Default,
    All,
}

impl TypeConstraint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Package => "package",
            Self::Project => "project",
            Self::ExternalProject => "externalProject",
            Self::Reference => "reference",
            Self::WinMd => "winMd",
            Self::ProjectOrExternal => "projectOrExternal",
            Self::Default => "default",
            Self::All => "all",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "package" => Some(Self::Package),
            "project" => Some(Self::Project),
            "externalproject" => Some(Self::ExternalProject),
            "reference" => Some(Self::Reference),
            "winmd" => Some(Self::WinMd),
            "projectorexternal" | "project,externalproject" => Some(Self::ProjectOrExternal),
            "default" | "package,project,externalproject" => Some(Self::Default),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn allows(self, library_type: LibraryType) -> bool {
        match library_type {
            LibraryType::Package => matches!(self, Self::Package | Self::Default | Self::All),
            LibraryType::Project => matches!(
                self,
                Self::Project | Self::ProjectOrExternal | Self::Default | Self::All
            ),
            LibraryType::ExternalProject => matches!(
                self,
                Self::ExternalProject | Self::ProjectOrExternal | Self::Default | Self::All
            ),
            LibraryType::Reference => matches!(self, Self::Reference | Self::All),
            LibraryType::Unresolved => false,
        }
    }

    pub fn allows_packages(self) -> bool {
        self.allows(LibraryType::Package)
    }

    pub fn allows_projects(self) -> bool {
        self.allows(LibraryType::Project) || self.allows(LibraryType::ExternalProject)
    }

    fn allows_winmd(self) -> bool {
        matches!(self, Self::WinMd | Self::All)
    }

    pub fn overlaps(self, other: Self) -> bool {
        const KINDS: [LibraryType; 4] = [
            LibraryType::Package,
            LibraryType::Project,
            LibraryType::ExternalProject,
            LibraryType::Reference,
        ];
        KINDS
            .iter()
            .any(|kind| self.allows(*kind) && other.allows(*kind))
            || (self.allows_winmd() && other.allows_winmd())
    }

    /// Prefix used when a range is displayed, and therefore in range equality.
    pub fn display_bucket(self) -> Option<&'static str> {
        match self {
            Self::Reference => Some("Reference"),
            Self::ExternalProject => Some("ExternalProject"),
            Self::Project | Self::ProjectOrExternal => Some("Project"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Compile,
    Runtime,
    Build,
    BuildTransitive,
    Native,
    ContentFiles,
    Analyzers,
}

impl AssetKind {
    pub const ALL: [AssetKind; 7] = [
        AssetKind::Compile,
        AssetKind::Runtime,
        AssetKind::Build,
        AssetKind::BuildTransitive,
        AssetKind::Native,
        AssetKind::ContentFiles,
        AssetKind::Analyzers,
    ];

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "compile" => Some(Self::Compile),
            "runtime" => Some(Self::Runtime),
            "build" => Some(Self::Build),
            "buildtransitive" => Some(Self::BuildTransitive),
            "native" => Some(Self::Native),
            "contentfiles" => Some(Self::ContentFiles),
            "analyzers" => Some(Self::Analyzers),
            _ => None,
        }
    }
}

/// A set of asset kinds. Serialized as `"all"`, `"none"` or a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct IncludeFlags(BTreeSet<AssetKind>);

impl IncludeFlags {
    pub fn all() -> Self {
        Self(AssetKind::ALL.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of(kinds: &[AssetKind]) -> Self {
        Self(kinds.iter().copied().collect())
    }

    /// Private assets applied to package references unless stated otherwise.
    pub fn default_suppress_parent() -> Self {
        Self::of(&[AssetKind::ContentFiles, AssetKind::Analyzers, AssetKind::Build])
    }

    pub fn contains(&self, kind: AssetKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_all(&self) -> bool {
        AssetKind::ALL.iter().all(|kind| self.0.contains(kind))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn without(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = AssetKind> + '_ {
        self.0.iter().copied()
    }
}

impl Serialize for IncludeFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_all() {
            return serializer.serialize_str("all");
        }
        if self.is_none() {
            return serializer.serialize_str("none");
        }
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IncludeFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Keyword(String),
            Kinds(Vec<String>),
        }

        let kinds = match Raw::deserialize(deserializer)? {
            Raw::Keyword(keyword) => keyword
                .split([';', ','])
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Raw::Kinds(kinds) => kinds,
        };

        let mut flags = Self::none();
        for kind in kinds {
            match kind.trim().to_ascii_lowercase().as_str() {
                "" | "none" => {}
                "all" => flags = Self::all(),
                other => {
                    let parsed = AssetKind::parse(other).ok_or_else(|| {
                        serde::de::Error::custom(format!("unknown asset kind '{kind}'"))
                    })?;
                    flags.0.insert(parsed);
                }
            }
        }
        Ok(flags)
    }
}

/// A request for a library by name, version range and type constraint.
///
/// Equality is defined on the display form: floating markers are stripped
/// and the type constraint collapses to its display bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRange {
    #[serde(rename = "id")]
    pub name: String,
    #[serde(default, rename = "version", skip_serializing_if = "Option::is_none")]
    pub version_range: Option<VersionRange>,
    #[serde(default, rename = "target")]
    pub type_constraint: TypeConstraint,
}

impl LibraryRange {
    pub fn new(
        name: impl Into<String>,
        version_range: Option<VersionRange>,
        type_constraint: TypeConstraint,
    ) -> Self {
        Self {
            name: name.into(),
            version_range,
            type_constraint,
        }
    }

    pub fn package(name: impl Into<String>, version_range: VersionRange) -> Self {
        Self::new(name, Some(version_range), TypeConstraint::Package)
    }

    pub fn is_eclipsed_by(&self, other: &LibraryRange) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.type_constraint.overlaps(other.type_constraint)
    }

    pub fn pretty_range(&self) -> String {
        self.version_range
            .as_ref()
            .map(|range| range.to_non_snapshot_range().pretty_print())
            .unwrap_or_default()
    }
}

impl fmt::Display for LibraryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bucket) = self.type_constraint.display_bucket() {
            write!(f, "{bucket}/")?;
        }
        f.write_str(&self.name)?;
        let pretty = self.pretty_range();
        if !pretty.is_empty() {
            write!(f, " {pretty}")?;
        }
        Ok(())
    }
}

impl PartialEq for LibraryRange {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq_ignore_ascii_case(&other.to_string())
    }
}

impl Eq for LibraryRange {}

impl Hash for LibraryRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().to_ascii_lowercase().hash(state);
    }
}

/// A concrete library: name, resolved version and kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIdentity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<PackageVersion>,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
}

impl LibraryIdentity {
    pub fn new(
        name: impl Into<String>,
        version: Option<PackageVersion>,
        library_type: LibraryType,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            library_type,
        }
    }

    pub fn package(name: impl Into<String>, version: PackageVersion) -> Self {
        Self::new(name, Some(version), LibraryType::Package)
    }

    pub fn project(name: impl Into<String>, version: PackageVersion) -> Self {
        Self::new(name, Some(version), LibraryType::Project)
    }

    pub fn unresolved(name: impl Into<String>, version: Option<PackageVersion>) -> Self {
        Self::new(name, version, LibraryType::Unresolved)
    }

    pub fn is_unresolved(&self) -> bool {
        self.library_type == LibraryType::Unresolved
    }

    pub fn name_key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.version, self.library_type) {
            (Some(version), LibraryType::Package | LibraryType::Reference) => {
                write!(f, "{} {}", self.name, version)
            }
            _ => f.write_str(&self.name),
        }
    }
}

impl PartialEq for LibraryIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LibraryIdentity {}

impl Hash for LibraryIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name_key().hash(state);
        self.version.hash(state);
        self.library_type.hash(state);
    }
}

impl Ord for LibraryIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name_key()
            .cmp(&other.name_key())
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.library_type.cmp(&other.library_type))
    }
}

impl PartialOrd for LibraryIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A declared dependency together with its asset flow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDependency {
    #[serde(flatten)]
    pub library_range: LibraryRange,
    #[serde(default = "IncludeFlags::all")]
    pub include: IncludeFlags,
    #[serde(default)]
    pub exclude: IncludeFlags,
    #[serde(default = "IncludeFlags::default_suppress_parent")]
    pub private_assets: IncludeFlags,
    #[serde(default)]
    pub auto_referenced: bool,
    #[serde(default)]
    pub no_warn: Vec<LogCode>,
}

impl LibraryDependency {
    pub fn new(library_range: LibraryRange) -> Self {
        Self {
            library_range,
            include: IncludeFlags::all(),
            exclude: IncludeFlags::none(),
            private_assets: IncludeFlags::default_suppress_parent(),
            auto_referenced: false,
            no_warn: Vec::new(),
        }
    }

    pub fn package(name: &str, version_range: VersionRange) -> Self {
        Self::new(LibraryRange::package(name, version_range))
    }

    pub fn name(&self) -> &str {
        &self.library_range.name
    }

    pub fn version_range(&self) -> Option<&VersionRange> {
        self.library_range.version_range.as_ref()
    }

    pub fn include_flags(&self) -> IncludeFlags {
        self.include.without(&self.exclude)
    }

    /// Whether walking should stop at the declaring library.
    pub fn suppresses_parent(&self) -> bool {
        self.private_assets.is_all()
    }
}
