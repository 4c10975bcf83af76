//! Remote push-approval oracle seam.
//!
//! The oracle is opaque to this crate: it pairs one-time tokens into account ids,
//! unpairs accounts, and reports whether an account's latch is open. Clients are
//! built per operation from the stored credentials through an [`OracleConnector`].

use super::access::AccessCredentials;
use async_trait::async_trait;
use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
    #[error("oracle rejected the request ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("oracle unreachable: {0}")]
    Transport(String),
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Exchange a one-time pairing token for a fresh account id.
    async fn pair(&self, token: &str) -> Result<String, OracleError>;
    async fn unpair(&self, account_id: &str) -> Result<(), OracleError>;
    /// `true` when the account's latch is open and the login may proceed.
    async fn status_is_on(&self, account_id: &str) -> Result<bool, OracleError>;
}

/// Builds oracle clients from stored credentials.
pub trait OracleConnector: Send + Sync {
    /// # Errors
    /// Returns an error if a client cannot be built for these credentials.
    fn connect(&self, credentials: &AccessCredentials) -> Result<Box<dyn Oracle>, OracleError>;
}

/// An oracle client bounded by a per-call timeout.
///
/// Obtained from [`AccessStore::client`](super::AccessStore::client); never cached.
pub struct OracleClient {
    inner: Box<dyn Oracle>,
    timeout: Duration,
}

impl std::fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OracleClient {
    #[must_use]
    pub fn new(inner: Box<dyn Oracle>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// # Errors
    /// Returns an error if the oracle rejects the token, fails, or times out.
    pub async fn pair(&self, token: &str) -> Result<String, OracleError> {
        let span = info_span!("latch.oracle.pair");
        self.bounded(self.inner.pair(token)).instrument(span).await
    }

    /// # Errors
    /// Returns an error if the oracle rejects the account, fails, or times out.
    pub async fn unpair(&self, account_id: &str) -> Result<(), OracleError> {
        let span = info_span!("latch.oracle.unpair", account_id);
        self.bounded(self.inner.unpair(account_id))
            .instrument(span)
            .await
    }

    /// # Errors
    /// Returns an error if the oracle fails or times out.
    pub async fn status_is_on(&self, account_id: &str) -> Result<bool, OracleError> {
        let span = info_span!("latch.oracle.status", account_id);
        self.bounded(self.inner.status_is_on(account_id))
            .instrument(span)
            .await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, OracleError>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("oracle call timed out after {:?}", self.timeout);
                Err(OracleError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latch::testing::FakeOracle;

    #[tokio::test]
    async fn passes_results_through() {
        let fake = FakeOracle::new();
        fake.add_token("T1", "acc-1");
        fake.set_status("acc-1", true);
        let client = OracleClient::new(Box::new(fake.clone()), DEFAULT_ORACLE_TIMEOUT);

        assert_eq!(client.pair("T1").await, Ok("acc-1".to_string()));
        assert_eq!(client.status_is_on("acc-1").await, Ok(true));
        assert_eq!(client.unpair("acc-1").await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_times_out() {
        let fake = FakeOracle::new();
        fake.set_delay(Duration::from_secs(60));
        let timeout = Duration::from_secs(1);
        let client = OracleClient::new(Box::new(fake), timeout);

        assert_eq!(
            client.status_is_on("acc-1").await,
            Err(OracleError::Timeout(timeout))
        );
    }
}
