//! Latch REST client.
//!
//! Speaks the v1 resource shapes:
//! - `GET /api/1.0/pair/{token}` -> `{"data": {"accountId": "..."}}`
//! - `GET /api/1.0/unpair/{accountId}` -> `{}`
//! - `GET /api/1.0/status/{accountId}` -> `{"data": {"operations": {"<app_id>": {"status": "on"}}}}`
//!
//! Any response carrying `{"error": {"code", "message"}}` is a rejection.
//! Credentials are sent with HTTP basic auth; vendor request signing is not done here.

use super::{
    access::AccessCredentials,
    oracle::{Oracle, OracleConnector, OracleError},
};
use crate::APP_USER_AGENT;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;

const API_VERSION_SEGMENTS: [&str; 2] = ["api", "1.0"];

/// Builds an [`HttpOracle`] per operation.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: Url,
    request_timeout: Duration,
}

impl HttpConnector {
    /// # Errors
    /// Returns an error if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => anyhow::bail!("unsupported oracle URL scheme: {scheme}"),
        }
        if base_url.cannot_be_a_base() {
            anyhow::bail!("oracle URL cannot be used as a base: {base_url}");
        }
        Ok(Self {
            base_url,
            request_timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl OracleConnector for HttpConnector {
    fn connect(&self, credentials: &AccessCredentials) -> Result<Box<dyn Oracle>, OracleError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        Ok(Box::new(HttpOracle {
            client,
            base_url: self.base_url.clone(),
            app_id: credentials.app_id.clone(),
            app_secret: credentials.app_secret.clone(),
            request_timeout: self.request_timeout,
        }))
    }
}

pub struct HttpOracle {
    client: Client,
    base_url: Url,
    app_id: String,
    app_secret: SecretString,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    message: String,
}

impl HttpOracle {
    fn endpoint(&self, action: &str, argument: &str) -> Result<Url, OracleError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| OracleError::Transport(format!("invalid oracle URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(API_VERSION_SEGMENTS)
            .push(action)
            .push(argument);
        Ok(url)
    }

    async fn call(&self, action: &'static str, argument: &str) -> Result<Option<Value>, OracleError> {
        let url = self.endpoint(action, argument)?;
        let span = info_span!(
            "latch.http",
            http.method = "GET",
            latch.action = action,
        );

        let response = self
            .client
            .get(url)
            .basic_auth(&self.app_id, Some(self.app_secret.expose_secret()))
            .send()
            .instrument(span)
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    OracleError::Timeout(self.request_timeout)
                } else {
                    OracleError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| OracleError::Transport(err.to_string()))?;
        debug!("latch {action} answered {status}");

        let envelope = if body.trim().is_empty() {
            Envelope {
                data: None,
                error: None,
            }
        } else {
            match serde_json::from_str::<Envelope>(&body) {
                Ok(envelope) => envelope,
                Err(err) if status.is_success() => {
                    return Err(OracleError::InvalidResponse(err.to_string()));
                }
                Err(_) => {
                    return Err(OracleError::Rejected {
                        code: i64::from(status.as_u16()),
                        message: body,
                    });
                }
            }
        };

        if let Some(error) = envelope.error {
            return Err(OracleError::Rejected {
                code: error.code,
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(OracleError::Rejected {
                code: i64::from(status.as_u16()),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn pair(&self, token: &str) -> Result<String, OracleError> {
        let data = self.call("pair", token).await?;
        data.as_ref()
            .and_then(|data| data.get("accountId"))
            .and_then(Value::as_str)
            .filter(|account_id| !account_id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| OracleError::InvalidResponse("pair response has no accountId".to_string()))
    }

    async fn unpair(&self, account_id: &str) -> Result<(), OracleError> {
        self.call("unpair", account_id).await.map(|_| ())
    }

    async fn status_is_on(&self, account_id: &str) -> Result<bool, OracleError> {
        let data = self.call("status", account_id).await?;
        let status = data
            .as_ref()
            .and_then(|data| data.get("operations"))
            .and_then(|operations| operations.get(&self.app_id))
            .and_then(|operation| operation.get("status"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OracleError::InvalidResponse(format!(
                    "status response has no operation for application {}",
                    self.app_id
                ))
            })?;
        Ok(status == "on")
    }
}
