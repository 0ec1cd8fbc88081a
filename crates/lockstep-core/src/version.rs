use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("'{0}' is not a valid version string")]
    InvalidVersion(String),
    #[error("'{0}' is not a valid version range")]
    InvalidRange(String),
    #[error("'{0}' is not a valid floating version")]
    InvalidFloat(String),
}

/// A package version with up to four numeric parts, optional dot separated
/// release labels and optional build metadata.
///
/// Build metadata is carried for display only: it never takes part in
/// ordering, equality or hashing. Release labels compare case-insensitively.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release_labels: Vec<String>,
    metadata: Option<String>,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release_labels: Vec::new(),
            metadata: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidVersion(input.to_string());
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (rest, metadata) = match trimmed.split_once('+') {
            Some((rest, metadata)) => {
                if !metadata.split('.').all(is_valid_label) {
                    return Err(invalid());
                }
                (rest, Some(metadata.to_string()))
            }
            None => (trimmed, None),
        };

        let (numbers, release) = match rest.split_once('-') {
            Some((numbers, release)) => (numbers, Some(release)),
            None => (rest, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 4 {
            return Err(invalid());
        }
        let mut values = [0_u64; 4];
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            values[index] = part.parse().map_err(|_| invalid())?;
        }

        let release_labels = match release {
            Some(release) => {
                let labels: Vec<String> = release.split('.').map(str::to_string).collect();
                if !labels.iter().all(|label| is_valid_label(label)) {
                    return Err(invalid());
                }
                labels
            }
            None => Vec::new(),
        };

        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            revision: values[3],
            release_labels,
            metadata,
        })
    }

    pub fn with_release(mut self, release: &str) -> Result<Self, VersionError> {
        let labels: Vec<String> = release.split('.').map(str::to_string).collect();
        if !labels.iter().all(|label| is_valid_label(label)) {
            return Err(VersionError::InvalidVersion(format!("{self}-{release}")));
        }
        self.release_labels = labels;
        Ok(self)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn release_labels(&self) -> &[String] {
        &self.release_labels
    }

    pub fn release(&self) -> String {
        self.release_labels.join(".")
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release_labels.is_empty()
    }

    /// The same numeric version without release labels or metadata.
    pub fn stable(&self) -> Self {
        Self {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            revision: self.revision,
            release_labels: Vec::new(),
            metadata: None,
        }
    }

    pub fn normalized(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if self.is_prerelease() {
            out.push('-');
            out.push_str(&self.release());
        }
        if let Some(metadata) = &self.metadata {
            out.push('+');
            out.push_str(metadata);
        }
        out
    }

    /// Normalized form without metadata, lowercased. Two versions are equal
    /// exactly when their identity keys are equal.
    pub fn identity_key(&self) -> String {
        let mut out = format!(
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.revision
        );
        for (index, label) in self.release_labels.iter().enumerate() {
            out.push(if index == 0 { '-' } else { '.' });
            if label.chars().all(|c| c.is_ascii_digit()) {
                let trimmed = label.trim_start_matches('0');
                out.push_str(if trimmed.is_empty() { "0" } else { trimmed });
            } else {
                out.push_str(&label.to_ascii_lowercase());
            }
        }
        out
    }

    fn numbers(&self) -> [u64; 4] {
        [self.major, self.minor, self.patch, self.revision]
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn compare_labels(left: &[String], right: &[String]) -> Ordering {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    for (a, b) in left.iter().zip(right.iter()) {
        let ordering = compare_label(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

fn compare_label(a: &str, b: &str) -> Ordering {
    let a_numeric = a.chars().all(|c| c.is_ascii_digit());
    let b_numeric = b.chars().all(|c| c.is_ascii_digit());
    match (a_numeric, b_numeric) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers()
            .cmp(&other.numbers())
            .then_with(|| compare_labels(&self.release_labels, &other.release_labels))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_key().hash(state);
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized())
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
