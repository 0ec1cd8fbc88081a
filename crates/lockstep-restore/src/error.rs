use lockstep_core::SpecValidationError;
use lockstep_resolver::ResolverError;
use thiserror::Error;

/// Failures that stop a restore outright. Resolution problems are not
/// errors; they become log messages on an unsuccessful [`crate::RestoreResult`].
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("the restore was cancelled")]
    Cancelled,
    #[error(transparent)]
    Validation(#[from] SpecValidationError),
    #[error("package source '{source_name}' is unusable: {message}")]
    Source {
        source_name: String,
        message: String,
    },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl RestoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ResolverError> for RestoreError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::Cancelled => Self::Cancelled,
            ResolverError::Source {
                source_name,
                id,
                message,
            } => Self::Source {
                source_name,
                message: format!("{id}: {message}"),
            },
        }
    }
}
