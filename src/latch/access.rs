//! Access configuration store.
//!
//! Holds the application credentials (`app_id`/`app_secret`) used to build an
//! oracle client. The record is a singleton that is only ever overwritten;
//! invalid credentials are discovered when the oracle rejects a later call.

use super::{
    error::{ConfigurationError, LatchError},
    oracle::{OracleClient, OracleConnector},
    storage::{Storage, StorageEntry},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument};

pub const ACCESS_KEY: &str = "latch/access";

/// Administrative endpoint used to configure the credentials.
pub const ACCESS_ENDPOINT: &str = "/v1/latch/access";

#[derive(Clone, Serialize, Deserialize)]
pub struct AccessCredentials {
    pub app_id: String,
    #[serde(serialize_with = "expose_secret", deserialize_with = "secret_string")]
    pub app_secret: SecretString,
}

impl AccessCredentials {
    #[must_use]
    pub fn new(app_id: String, app_secret: SecretString) -> Self {
        Self { app_id, app_secret }
    }
}

impl std::fmt::Debug for AccessCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .finish()
    }
}

fn expose_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn secret_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Clone)]
pub struct AccessStore {
    storage: Arc<dyn Storage>,
    connector: Arc<dyn OracleConnector>,
    timeout: Duration,
}

impl std::fmt::Debug for AccessStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AccessStore {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        connector: Arc<dyn OracleConnector>,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            connector,
            timeout,
        }
    }

    /// Persist the credentials, replacing whatever was stored before.
    ///
    /// # Errors
    /// Returns `InvalidRequest` for empty fields and `Storage` if the write fails.
    #[instrument(skip(self, credentials), fields(app_id = %credentials.app_id))]
    pub async fn set_access(&self, credentials: AccessCredentials) -> Result<(), LatchError> {
        if credentials.app_id.is_empty() {
            return Err(LatchError::invalid("app_id must not be empty"));
        }
        if credentials.app_secret.expose_secret().is_empty() {
            return Err(LatchError::invalid("app_secret must not be empty"));
        }

        let entry = StorageEntry::json(ACCESS_KEY, &credentials).map_err(LatchError::Storage)?;
        self.storage.put(entry).await.map_err(LatchError::Storage)?;

        info!("latch access credentials updated");
        Ok(())
    }

    /// Load the stored credentials.
    ///
    /// # Errors
    /// Returns `Configuration` when absent or undecodable, `Storage` if the read fails.
    pub async fn credentials(&self) -> Result<AccessCredentials, LatchError> {
        let entry = self
            .storage
            .get(ACCESS_KEY)
            .await
            .map_err(LatchError::Storage)?
            .ok_or(ConfigurationError::NotConfigured)?;

        entry
            .decode_json::<AccessCredentials>()
            .map_err(|err| ConfigurationError::Undecodable(err).into())
    }

    /// Build a fresh oracle client from the stored credentials.
    ///
    /// # Errors
    /// Returns `Configuration` when the credentials are missing or undecodable,
    /// `Oracle` if the connector cannot build a client.
    #[instrument(skip(self))]
    pub async fn client(&self) -> Result<OracleClient, LatchError> {
        let credentials = self.credentials().await?;
        let oracle = self.connector.connect(&credentials)?;
        Ok(OracleClient::new(oracle, self.timeout))
    }
}
