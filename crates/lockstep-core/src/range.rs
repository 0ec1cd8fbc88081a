use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{PackageVersion, VersionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatBehavior {
    None,
    Prerelease,
    Revision,
    Patch,
    Minor,
    Major,
    AbsoluteLatest,
}

/// A floating request such as `1.*` or `2.0.0-beta*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FloatRange {
    behavior: FloatBehavior,
    min_version: PackageVersion,
    release_prefix: Option<String>,
}

impl FloatRange {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFloat(input.to_string());
        let trimmed = input.trim();

        if trimmed == "*" {
            return Ok(Self {
                behavior: FloatBehavior::Major,
                min_version: PackageVersion::new(0, 0, 0),
                release_prefix: None,
            });
        }
        if trimmed == "*-*" {
            return Ok(Self {
                behavior: FloatBehavior::AbsoluteLatest,
                min_version: PackageVersion::new(0, 0, 0).with_release("0")?,
                release_prefix: Some(String::new()),
            });
        }

        let Some(head) = trimmed.strip_suffix('*') else {
            if trimmed.contains('*') {
                return Err(invalid());
            }
            return Ok(Self {
                behavior: FloatBehavior::None,
                min_version: PackageVersion::parse(trimmed)?,
                release_prefix: None,
            });
        };
        if head.contains('*') {
            return Err(invalid());
        }

        if let Some((stable, prefix)) = head.split_once('-') {
            let text = if prefix.is_empty() {
                format!("{stable}-0")
            } else if prefix.ends_with('.') {
                format!("{stable}-{prefix}0")
            } else {
                format!("{stable}-{prefix}")
            };
            let min_version = PackageVersion::parse(&text).map_err(|_| invalid())?;
            return Ok(Self {
                behavior: FloatBehavior::Prerelease,
                min_version,
                release_prefix: Some(prefix.to_string()),
            });
        }

        let Some(numbers) = head.strip_suffix('.') else {
            return Err(invalid());
        };
        let behavior = match numbers.split('.').count() {
            1 => FloatBehavior::Minor,
            2 => FloatBehavior::Patch,
            3 => FloatBehavior::Revision,
            _ => return Err(invalid()),
        };
        let min_version = PackageVersion::parse(&format!("{numbers}.0")).map_err(|_| invalid())?;
        Ok(Self {
            behavior,
            min_version,
            release_prefix: None,
        })
    }

    pub fn behavior(&self) -> FloatBehavior {
        self.behavior
    }

    pub fn min_version(&self) -> &PackageVersion {
        &self.min_version
    }

    pub fn release_prefix(&self) -> Option<&str> {
        self.release_prefix.as_deref()
    }

    pub fn is_floating(&self) -> bool {
        self.behavior != FloatBehavior::None
    }

    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let min = &self.min_version;
        match self.behavior {
            FloatBehavior::AbsoluteLatest => true,
            FloatBehavior::Major => !version.is_prerelease(),
            FloatBehavior::Minor => min.major() == version.major() && !version.is_prerelease(),
            FloatBehavior::Patch => {
                min.major() == version.major()
                    && min.minor() == version.minor()
                    && !version.is_prerelease()
            }
            FloatBehavior::Revision => {
                min.major() == version.major()
                    && min.minor() == version.minor()
                    && min.patch() == version.patch()
                    && !version.is_prerelease()
            }
            FloatBehavior::Prerelease => {
                if min.stable() != version.stable() {
                    return false;
                }
                if !version.is_prerelease() {
                    return true;
                }
                let prefix = self.release_prefix.as_deref().unwrap_or_default();
                version
                    .release()
                    .to_ascii_lowercase()
                    .starts_with(&prefix.to_ascii_lowercase())
            }
            FloatBehavior::None => min == version,
        }
    }

    /// The version a snapshot request pins to once floating is removed.
    fn non_snapshot_version(&self) -> PackageVersion {
        if self.behavior != FloatBehavior::Prerelease {
            return self.min_version.clone();
        }
        let prefix = self
            .release_prefix
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches(['-', '.']);
        if prefix.is_empty() {
            return self.min_version.stable();
        }
        self.min_version
            .stable()
            .with_release(prefix)
            .unwrap_or_else(|_| self.min_version.clone())
    }
}

impl fmt::Display for FloatRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = &self.min_version;
        match self.behavior {
            FloatBehavior::None => write!(f, "{min}"),
            FloatBehavior::Major => f.write_str("*"),
            FloatBehavior::AbsoluteLatest => f.write_str("*-*"),
            FloatBehavior::Minor => write!(f, "{}.*", min.major()),
            FloatBehavior::Patch => write!(f, "{}.{}.*", min.major(), min.minor()),
            FloatBehavior::Revision => {
                write!(f, "{}.{}.{}.*", min.major(), min.minor(), min.patch())
            }
            FloatBehavior::Prerelease => write!(
                f,
                "{}-{}*",
                min.stable(),
                self.release_prefix.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// A version interval with optional floating lower bound.
#[derive(Debug, Clone)]
pub struct VersionRange {
    min: Option<PackageVersion>,
    max: Option<PackageVersion>,
    include_min: bool,
    include_max: bool,
    float: Option<FloatRange>,
}

impl VersionRange {
    pub fn new(
        min: Option<PackageVersion>,
        include_min: bool,
        max: Option<PackageVersion>,
        include_max: bool,
    ) -> Self {
        Self {
            min,
            max,
            include_min,
            include_max,
            float: None,
        }
    }

    /// The unbounded range.
    pub fn all() -> Self {
        Self::new(None, true, None, true)
    }

    pub fn at_least(version: PackageVersion) -> Self {
        Self::new(Some(version), true, None, false)
    }

    pub fn exact(version: PackageVersion) -> Self {
        Self::new(Some(version.clone()), true, Some(version), true)
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidRange(input.to_string());
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if !trimmed.starts_with(['[', '(']) {
            if trimmed.contains('*') {
                let float = FloatRange::parse(trimmed)?;
                return Ok(Self {
                    min: Some(float.min_version().clone()),
                    max: None,
                    include_min: true,
                    include_max: false,
                    float: Some(float),
                });
            }
            return Ok(Self::at_least(PackageVersion::parse(trimmed)?));
        }

        let include_min = trimmed.starts_with('[');
        let include_max = match trimmed.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid()),
        };
        if trimmed.len() < 2 {
            return Err(invalid());
        }
        let inner = &trimmed[1..trimmed.len() - 1];
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();

        let range = match parts.as_slice() {
            [single] => {
                if !include_min || !include_max || single.is_empty() {
                    return Err(invalid());
                }
                Self::exact(PackageVersion::parse(single).map_err(|_| invalid())?)
            }
            [lower, upper] => {
                let (min, float) = if lower.is_empty() {
                    (None, None)
                } else if lower.contains('*') {
                    let float = FloatRange::parse(lower)?;
                    (Some(float.min_version().clone()), Some(float))
                } else {
                    (
                        Some(PackageVersion::parse(lower).map_err(|_| invalid())?),
                        None,
                    )
                };
                let max = if upper.is_empty() {
                    None
                } else {
                    Some(PackageVersion::parse(upper).map_err(|_| invalid())?)
                };
                Self {
                    min,
                    max,
                    include_min,
                    include_max,
                    float,
                }
            }
            _ => return Err(invalid()),
        };

        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            if min > max {
                return Err(invalid());
            }
        }
        Ok(range)
    }

    pub fn min_version(&self) -> Option<&PackageVersion> {
        self.min.as_ref()
    }

    pub fn max_version(&self) -> Option<&PackageVersion> {
        self.max.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.min.is_some() && self.include_min
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.max.is_some() && self.include_max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_some()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_some()
    }

    pub fn has_lower_and_upper_bounds(&self) -> bool {
        self.has_lower_bound() && self.has_upper_bound()
    }

    pub fn float(&self) -> Option<&FloatRange> {
        self.float.as_ref()
    }

    pub fn is_floating(&self) -> bool {
        self.float.as_ref().is_some_and(FloatRange::is_floating)
    }

    pub fn is_exact(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => self.include_min && self.include_max && min == max,
            _ => false,
        }
    }

    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        if let Some(min) = &self.min {
            match version.cmp(min) {
                Ordering::Less => return false,
                Ordering::Equal if !self.include_min => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(max) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.include_max => return false,
                _ => {}
            }
        }
        true
    }

    /// Drops floating markers so the range can be compared as a plain interval.
    pub fn to_non_snapshot_range(&self) -> Self {
        let Some(float) = &self.float else {
            return self.clone();
        };
        let min = match &self.min {
            Some(min) if min.is_prerelease() => Some(float.non_snapshot_version()),
            other => other.clone(),
        };
        Self {
            min,
            max: self.max.clone(),
            include_min: self.include_min,
            include_max: self.include_max,
            float: None,
        }
    }

    /// Human readable form used in log messages, e.g. `(>= 1.0.0)`. Empty for
    /// the unbounded range.
    pub fn pretty_print(&self) -> String {
        let min = self.min_display();
        match (&min, &self.max) {
            (None, None) => String::new(),
            (Some(min), None) => {
                format!("({} {min})", if self.include_min { ">=" } else { ">" })
            }
            (None, Some(max)) => {
                format!("({} {max})", if self.include_max { "<=" } else { "<" })
            }
            (Some(_), Some(max)) if self.is_exact() => format!("(= {max})"),
            (Some(min), Some(max)) => format!(
                "({} {min} && {} {max})",
                if self.include_min { ">=" } else { ">" },
                if self.include_max { "<=" } else { "<" }
            ),
        }
    }

    fn min_display(&self) -> Option<String> {
        match (&self.float, &self.min) {
            (Some(float), Some(_)) if float.is_floating() => Some(float.to_string()),
            (_, Some(min)) => Some(min.to_string()),
            (_, None) => None,
        }
    }

    /// Chooses the version a resolver should pick for this range: the lowest
    /// satisfying version, or the highest one a floating range admits.
    pub fn find_best_match<'a, I>(&self, versions: I) -> Option<&'a PackageVersion>
    where
        I: IntoIterator<Item = &'a PackageVersion>,
    {
        let mut best = None;
        for version in versions {
            if self.is_better(best, version) {
                best = Some(version);
            }
        }
        best
    }

    pub fn is_better(&self, current: Option<&PackageVersion>, considering: &PackageVersion) -> bool {
        if !self.satisfies(considering) {
            return false;
        }
        let Some(current) = current else {
            return true;
        };
        if current == considering {
            return false;
        }

        match self.float.as_ref().filter(|float| float.is_floating()) {
            Some(float) => match (float.satisfies(current), float.satisfies(considering)) {
                (false, true) => true,
                (true, true) => considering > current,
                (false, false) => considering < current,
                (true, false) => false,
            },
            None => considering < current,
        }
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min
            && self.max == other.max
            && self.is_min_inclusive() == other.is_min_inclusive()
            && self.is_max_inclusive() == other.is_max_inclusive()
            && self.float.as_ref().map(FloatRange::behavior)
                == other.float.as_ref().map(FloatRange::behavior)
    }
}

impl Eq for VersionRange {}

impl Hash for VersionRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min.hash(state);
        self.max.hash(state);
        self.is_min_inclusive().hash(state);
        self.is_max_inclusive().hash(state);
        self.float.as_ref().map(FloatRange::behavior).hash(state);
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(float) = &self.float {
            if float.is_floating() && self.max.is_none() && self.include_min {
                return write!(f, "{float}");
            }
        }
        if self.is_exact() {
            if let Some(min) = &self.min {
                return write!(f, "[{min}]");
            }
        }
        write!(
            f,
            "{}{}, {}{}",
            if self.is_min_inclusive() { '[' } else { '(' },
            self.min_display().unwrap_or_default(),
            self.max.as_ref().map(ToString::to_string).unwrap_or_default(),
            if self.is_max_inclusive() { ']' } else { ')' }
        )
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A missing range counts as missing a lower bound, as does an exclusive one.
pub fn has_missing_lower_bound(range: Option<&VersionRange>) -> bool {
    match range {
        Some(range) => !range.is_min_inclusive(),
        None => true,
    }
}

/// `id min` when the range pins an inclusive lower bound, otherwise just `id`.
pub fn format_expected_identity(id: &str, range: Option<&VersionRange>) -> String {
    match range {
        Some(range) if range.is_min_inclusive() => match range.min_version() {
            Some(min) => format!("{id} {min}"),
            None => id.to_string(),
        },
        _ => id.to_string(),
    }
}

/// `id (>= 1.0.0)`, or just `id` for unbounded ranges.
pub fn format_id_and_range(id: &str, range: Option<&VersionRange>) -> String {
    let pretty = range.map(VersionRange::pretty_print).unwrap_or_default();
    if pretty.is_empty() {
        id.to_string()
    } else {
        format!("{id} {pretty}")
    }
}
