use thiserror::Error;

use crate::ach::AchError;
use crate::achclient::AchClientError;
use crate::agent::AgentError;
use crate::depository::DepositoryError;
use crate::metrics::ErrorKind;
use crate::repository::RepositoryError;
use crate::store::StoreError;
use crate::transfers::TransferError;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Malformed ACH file: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No file transfer config for routing number {0}")]
    MissingConfig(String),

    #[error("Missing depository: {0}")]
    MissingDepository(String),

    #[error("ACH service error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] AgentError),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ControllerError {
    /// The metrics bucket this error counts under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Malformed(_) => ErrorKind::Malformed,
            ControllerError::Io(_)
            | ControllerError::Transport(_)
            | ControllerError::Persistence(_) => ErrorKind::Io,
            ControllerError::MissingConfig(_) => ErrorKind::MissingConfig,
            ControllerError::MissingDepository(_) => ErrorKind::MissingDepository,
            ControllerError::Upstream(_) => ErrorKind::Upstream,
            ControllerError::Validation(_) => ErrorKind::Validation,
        }
    }
}

impl From<AchError> for ControllerError {
    fn from(e: AchError) -> Self {
        match e {
            AchError::Io(io) => ControllerError::Io(io),
            other => ControllerError::Malformed(other.to_string()),
        }
    }
}

impl From<StoreError> for ControllerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(io) => ControllerError::Io(io),
            StoreError::InvalidSequence(s) => {
                ControllerError::Validation(format!("invalid file sequence: {}", s))
            }
            other => ControllerError::Malformed(other.to_string()),
        }
    }
}

impl From<AchClientError> for ControllerError {
    fn from(e: AchClientError) -> Self {
        ControllerError::Upstream(e.to_string())
    }
}

impl From<RepositoryError> for ControllerError {
    fn from(e: RepositoryError) -> Self {
        ControllerError::Persistence(e.to_string())
    }
}

impl From<DepositoryError> for ControllerError {
    fn from(e: DepositoryError) -> Self {
        ControllerError::Persistence(e.to_string())
    }
}

impl From<TransferError> for ControllerError {
    fn from(e: TransferError) -> Self {
        ControllerError::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ControllerError::Malformed("x".into()).kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            ControllerError::MissingConfig("987654320".into()).kind(),
            ErrorKind::MissingConfig
        );
        assert_eq!(
            ControllerError::Upstream("x".into()).kind(),
            ErrorKind::Upstream
        );
        assert_eq!(
            ControllerError::Persistence("x".into()).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err: ControllerError = StoreError::InvalidSequence("!".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
