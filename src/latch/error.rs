use super::access::ACCESS_ENDPOINT;
use super::oracle::OracleError;
use std::fmt;
use thiserror::Error;

/// Access credentials are missing or unusable.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(
        "latch access credentials haven't been configured, configure them at the '{path}' endpoint",
        path = ACCESS_ENDPOINT
    )]
    NotConfigured,
    #[error(
        "stored latch access credentials could not be decoded, rewrite them at the '{path}' endpoint: {0}",
        path = ACCESS_ENDPOINT
    )]
    Undecodable(#[source] serde_json::Error),
}

/// Which half of a remote+local sequence failed to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistencyStage {
    /// The oracle paired the account but the binding was not stored.
    PairedNotStored,
    /// The oracle unpaired the account but the binding was not deleted.
    UnpairedNotDeleted,
}

impl InconsistencyStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PairedNotStored => "paired_not_stored",
            Self::UnpairedNotDeleted => "unpaired_not_deleted",
        }
    }
}

impl fmt::Display for InconsistencyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("could not read username for latch verification")]
    MissingUsername,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("latch oracle request failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    /// Remote state changed but the local write or delete did not follow.
    /// Operators reconcile these by hand; nothing is retried automatically.
    #[error(
        "latch state for user '{username}' is inconsistent ({stage}, account {account_id}): {cause:#}"
    )]
    Inconsistency {
        username: String,
        account_id: String,
        stage: InconsistencyStage,
        cause: anyhow::Error,
    },
}

impl LatchError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
