use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameworkFamily {
    NetFramework,
    NetStandard,
    NetCoreApp,
    Any,
    Unsupported,
}

impl FrameworkFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetFramework => ".NETFramework",
            Self::NetStandard => ".NETStandard",
            Self::NetCoreApp => ".NETCoreApp",
            Self::Any => "Any",
            Self::Unsupported => "Unsupported",
        }
    }
}

/// A target framework moniker such as `net46` or `netstandard2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Framework {
    family: FrameworkFamily,
    version: [u32; 3],
    original: Option<String>,
}

impl Framework {
    pub fn new(family: FrameworkFamily, major: u32, minor: u32, build: u32) -> Self {
        Self {
            family,
            version: [major, minor, build],
            original: None,
        }
    }

    pub fn any() -> Self {
        Self::new(FrameworkFamily::Any, 0, 0, 0)
    }

    /// Parses a short folder name (`net46`, `netcoreapp3.1`, `net8.0`) or a
    /// long name (`.NETFramework,Version=v4.6`). Unknown input yields an
    /// unsupported framework rather than an error.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        parse_framework(trimmed).unwrap_or_else(|| Self {
            family: FrameworkFamily::Unsupported,
            version: [0, 0, 0],
            original: Some(trimmed.to_string()),
        })
    }

    pub fn family(&self) -> FrameworkFamily {
        self.family
    }

    pub fn version(&self) -> [u32; 3] {
        self.version
    }

    pub fn is_unsupported(&self) -> bool {
        self.family == FrameworkFamily::Unsupported
    }

    pub fn is_any(&self) -> bool {
        self.family == FrameworkFamily::Any
    }

    pub fn short_folder_name(&self) -> String {
        let [major, minor, build] = self.version;
        match self.family {
            FrameworkFamily::NetFramework => {
                if build > 0 {
                    format!("net{major}{minor}{build}")
                } else {
                    format!("net{major}{minor}")
                }
            }
            FrameworkFamily::NetStandard => format!("netstandard{major}.{minor}"),
            FrameworkFamily::NetCoreApp if major >= 5 => format!("net{major}.{minor}"),
            FrameworkFamily::NetCoreApp => format!("netcoreapp{major}.{minor}"),
            FrameworkFamily::Any => "any".to_string(),
            FrameworkFamily::Unsupported => self
                .original
                .clone()
                .unwrap_or_else(|| "unsupported".to_string()),
        }
    }

    pub fn dotnet_framework_name(&self) -> String {
        let [major, minor, build] = self.version;
        match self.family {
            FrameworkFamily::Any | FrameworkFamily::Unsupported => self.family.as_str().to_string(),
            family if build > 0 => format!("{},Version=v{major}.{minor}.{build}", family.as_str()),
            family => format!("{},Version=v{major}.{minor}", family.as_str()),
        }
    }

    /// Whether a project targeting `self` can consume assets built for `candidate`.
    pub fn is_compatible_with(&self, candidate: &Framework) -> bool {
        if self.is_unsupported() || candidate.is_unsupported() {
            return false;
        }
        if candidate.is_any() {
            return true;
        }
        if self.family == candidate.family {
            return candidate.version <= self.version;
        }
        if candidate.family == FrameworkFamily::NetStandard {
            return self
                .max_netstandard()
                .is_some_and(|max| candidate.version <= max);
        }
        false
    }

    fn max_netstandard(&self) -> Option<[u32; 3]> {
        let version = self.version;
        match self.family {
            FrameworkFamily::NetFramework => {
                if version >= [4, 6, 1] {
                    Some([2, 0, 0])
                } else if version >= [4, 6, 0] {
                    Some([1, 3, 0])
                } else if version >= [4, 5, 1] {
                    Some([1, 2, 0])
                } else if version >= [4, 5, 0] {
                    Some([1, 1, 0])
                } else {
                    None
                }
            }
            FrameworkFamily::NetCoreApp => {
                if version >= [3, 0, 0] {
                    Some([2, 1, 0])
                } else if version >= [2, 0, 0] {
                    Some([2, 0, 0])
                } else {
                    Some([1, 6, 0])
                }
            }
            FrameworkFamily::NetStandard => Some(version),
            _ => None,
        }
    }

    /// Picks the most specific compatible candidate: same family first, then
    /// the highest version.
    pub fn nearest<'a, I>(&self, candidates: I) -> Option<&'a Framework>
    where
        I: IntoIterator<Item = &'a Framework>,
    {
        candidates
            .into_iter()
            .filter(|candidate| self.is_compatible_with(candidate))
            .max_by_key(|candidate| {
                let rank = if candidate.family == self.family {
                    2
                } else if candidate.is_any() {
                    0
                } else {
                    1
                };
                (rank, candidate.version)
            })
    }
}

fn parse_framework(input: &str) -> Option<Framework> {
    let lower = input.to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower == "any" {
        return Some(Framework::any());
    }

    if let Some((identifier, version)) = lower.split_once(",version=v") {
        let family = match identifier {
            ".netframework" => FrameworkFamily::NetFramework,
            ".netstandard" => FrameworkFamily::NetStandard,
            ".netcoreapp" => FrameworkFamily::NetCoreApp,
            _ => return None,
        };
        return dotted_version(version).map(|version| Framework {
            family,
            version,
            original: None,
        });
    }

    let (family, version) = if let Some(rest) = lower.strip_prefix("netstandard") {
        (FrameworkFamily::NetStandard, dotted_version(rest)?)
    } else if let Some(rest) = lower.strip_prefix("netcoreapp") {
        (FrameworkFamily::NetCoreApp, dotted_version(rest)?)
    } else if let Some(rest) = lower.strip_prefix("net") {
        if rest.contains('.') {
            let version = dotted_version(rest)?;
            if version[0] < 5 {
                return None;
            }
            (FrameworkFamily::NetCoreApp, version)
        } else {
            (FrameworkFamily::NetFramework, compact_version(rest)?)
        }
    } else {
        return None;
    };

    Some(Framework {
        family,
        version,
        original: None,
    })
}

fn dotted_version(input: &str) -> Option<[u32; 3]> {
    if input.is_empty() {
        return None;
    }
    if !input.contains('.') {
        return compact_version(input);
    }
    let mut version = [0_u32; 3];
    for (index, part) in input.split('.').enumerate() {
        if index >= 3 {
            return None;
        }
        version[index] = part.parse().ok()?;
    }
    Some(version)
}

fn compact_version(input: &str) -> Option<[u32; 3]> {
    if input.is_empty() || input.len() > 3 || !input.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut version = [0_u32; 3];
    for (index, digit) in input.chars().enumerate() {
        version[index] = digit.to_digit(10)?;
    }
    Some(version)
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_folder_name())
    }
}

impl Serialize for Framework {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.short_folder_name())
    }
}

impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
