//! Request/response payloads shared between handlers and `OpenAPI` generation.

use crate::latch::UserBinding;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct AccessRequest {
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for AccessRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessRequest")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnrollRequest {
    /// One-time pairing token shown by the user's latch app.
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BindingResponse {
    pub username: String,
    pub account_id: String,
}

impl From<UserBinding> for BindingResponse {
    fn from(binding: UserBinding) -> Self {
        Self {
            username: binding.username,
            account_id: binding.account_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
