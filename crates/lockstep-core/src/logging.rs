use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogCode {
    NU1000,
    NU1003,
    NU1100,
    NU1106,
    NU1107,
    NU1108,
    NU1201,
    NU1202,
    NU1203,
    NU1301,
    NU1601,
    NU1602,
    NU1603,
    NU1604,
    NU1605,
    NU1608,
    NU1701,
}

impl LogCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NU1000 => "NU1000",
            Self::NU1003 => "NU1003",
            Self::NU1100 => "NU1100",
            Self::NU1106 => "NU1106",
            Self::NU1107 => "NU1107",
            Self::NU1108 => "NU1108",
            Self::NU1201 => "NU1201",
            Self::NU1202 => "NU1202",
            Self::NU1203 => "NU1203",
            Self::NU1301 => "NU1301",
            Self::NU1601 => "NU1601",
            Self::NU1602 => "NU1602",
            Self::NU1603 => "NU1603",
            Self::NU1604 => "NU1604",
            Self::NU1605 => "NU1605",
            Self::NU1608 => "NU1608",
            Self::NU1701 => "NU1701",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "NU1000" => Some(Self::NU1000),
            "NU1003" => Some(Self::NU1003),
            "NU1100" => Some(Self::NU1100),
            "NU1106" => Some(Self::NU1106),
            "NU1107" => Some(Self::NU1107),
            "NU1108" => Some(Self::NU1108),
            "NU1201" => Some(Self::NU1201),
            "NU1202" => Some(Self::NU1202),
            "NU1203" => Some(Self::NU1203),
            "NU1301" => Some(Self::NU1301),
            "NU1601" => Some(Self::NU1601),
            "NU1602" => Some(Self::NU1602),
            "NU1603" => Some(Self::NU1603),
            "NU1604" => Some(Self::NU1604),
            "NU1605" => Some(Self::NU1605),
            "NU1608" => Some(Self::NU1608),
            "NU1701" => Some(Self::NU1701),
            _ => None,
        }
    }
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Verbose,
    Information,
    Minimal,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreLogMessage {
    pub code: LogCode,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub target_graphs: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl RestoreLogMessage {
    pub fn new(code: LogCode, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            code,
            level,
            message: message.into(),
            library_id: None,
            target_graphs: BTreeSet::new(),
            file_path: None,
        }
    }

    pub fn error(code: LogCode, message: impl Into<String>) -> Self {
        Self::new(code, LogLevel::Error, message)
    }

    pub fn warning(code: LogCode, message: impl Into<String>) -> Self {
        Self::new(code, LogLevel::Warning, message)
    }

    pub fn with_library_id(mut self, library_id: impl Into<String>) -> Self {
        self.library_id = Some(library_id.into());
        self
    }

    pub fn with_target_graphs<I, S>(mut self, target_graphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_graphs
            .extend(target_graphs.into_iter().map(Into::into));
        self
    }

    pub fn with_file_path(mut self, file_path: Option<PathBuf>) -> Self {
        self.file_path = file_path;
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }

    pub fn is_warning(&self) -> bool {
        self.level == LogLevel::Warning
    }
}

impl fmt::Display for RestoreLogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Collapses messages with the same code and text into one, keeping the
/// first occurrence's position and the union of their target graphs.
pub fn merge_on_target_graph(messages: Vec<RestoreLogMessage>) -> Vec<RestoreLogMessage> {
    let mut merged: Vec<RestoreLogMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        match merged
            .iter_mut()
            .find(|existing| existing.code == message.code && existing.message == message.message)
        {
            Some(existing) => {
                existing.target_graphs.extend(message.target_graphs);
                if existing.level < message.level {
                    existing.level = message.level;
                }
            }
            None => merged.push(message),
        }
    }
    merged
}

pub trait RestoreLogger: Send + Sync {
    fn log(&self, message: &RestoreLogMessage);
}

/// Keeps every message it sees and mirrors it to `tracing`.
#[derive(Debug, Default)]
pub struct CollectorLogger {
    messages: Mutex<Vec<RestoreLogMessage>>,
}

impl CollectorLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<RestoreLogMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn errors(&self) -> Vec<RestoreLogMessage> {
        self.messages()
            .into_iter()
            .filter(RestoreLogMessage::is_error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<RestoreLogMessage> {
        self.messages()
            .into_iter()
            .filter(RestoreLogMessage::is_warning)
            .collect()
    }
}

impl RestoreLogger for CollectorLogger {
    fn log(&self, message: &RestoreLogMessage) {
        match message.level {
            LogLevel::Error => tracing::error!(code = %message.code, "{}", message.message),
            LogLevel::Warning => tracing::warn!(code = %message.code, "{}", message.message),
            _ => tracing::debug!(code = %message.code, "{}", message.message),
        }
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
    }
}
