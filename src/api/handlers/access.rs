use super::{required, types::AccessRequest, types::ErrorResponse};
use crate::latch::{AccessCredentials, AccessStore, LatchError};
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
};
use secrecy::SecretString;

#[utoipa::path(
    put,
    path = "/v1/latch/access",
    request_body = AccessRequest,
    responses(
        (status = 204, description = "Credentials stored, replacing any previous ones."),
        (status = 400, description = "Missing app_id or app_secret.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API token.", body = ErrorResponse),
        (status = 500, description = "Storage failure.", body = ErrorResponse),
    ),
    security(("api_token" = [])),
    tag = "latch"
)]
/// Stores the application credentials used for every later oracle call.
/// They are not checked against the oracle here.
pub async fn set_access(
    access: Extension<AccessStore>,
    Json(request): Json<AccessRequest>,
) -> Result<StatusCode, LatchError> {
    let app_id = required("app_id", &request.app_id)?;
    let app_secret = required("app_secret", &request.app_secret)?;

    access
        .set_access(AccessCredentials::new(
            app_id.to_string(),
            SecretString::from(app_secret.to_string()),
        ))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
