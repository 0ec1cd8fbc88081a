use thiserror::Error;

/// Failures the walker cannot turn into an unresolved node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("the operation was cancelled")]
    Cancelled,

    #[error("failed to retrieve information about '{id}' from source '{source_name}': {message}")]
    Source {
        source_name: String,
        id: String,
        message: String,
    },
}

impl ResolverError {
    pub fn source_failure(
        source_name: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Source {
            source_name: source_name.into(),
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
