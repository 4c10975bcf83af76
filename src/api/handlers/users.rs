//! Per-user pairing endpoints.

use super::{
    checked_username, required,
    types::{BindingResponse, EnrollRequest, ErrorResponse},
};
use crate::latch::{BindingRegistry, LatchError, UnenrollOutcome};
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

#[utoipa::path(
    get,
    path = "/v1/latch/users/{username}",
    params(("username" = String, Path, description = "Username, case-insensitive")),
    responses(
        (status = 200, description = "The user's binding.", body = BindingResponse),
        (status = 400, description = "Invalid username.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API token.", body = ErrorResponse),
        (status = 404, description = "The user is not enrolled.", body = ErrorResponse),
    ),
    security(("api_token" = [])),
    tag = "latch"
)]
pub async fn lookup(
    registry: Extension<BindingRegistry>,
    Path(username): Path<String>,
) -> Result<Response, LatchError> {
    let username = checked_username(&username)?;

    Ok(match registry.lookup(username).await? {
        Some(binding) => Json(BindingResponse::from(binding)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "user '{username}' is not enrolled"
            ))),
        )
            .into_response(),
    })
}

#[utoipa::path(
    put,
    path = "/v1/latch/users/{username}",
    params(("username" = String, Path, description = "Username, case-insensitive")),
    request_body = EnrollRequest,
    responses(
        (status = 200, description = "Paired; the binding was stored.", body = BindingResponse),
        (status = 400, description = "Invalid username or empty token.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API token.", body = ErrorResponse),
        (status = 409, description = "Paired remotely but the binding was not stored.", body = ErrorResponse),
        (status = 412, description = "Access credentials are not configured.", body = ErrorResponse),
        (status = 502, description = "The oracle rejected the token or failed.", body = ErrorResponse),
        (status = 504, description = "The oracle did not answer in time.", body = ErrorResponse),
    ),
    security(("api_token" = [])),
    tag = "latch"
)]
/// Pairs the user with the token and stores the binding. Re-enrolling replaces
/// the previous binding without unpairing the earlier account.
pub async fn enroll(
    registry: Extension<BindingRegistry>,
    Path(username): Path<String>,
    Json(request): Json<EnrollRequest>,
) -> Result<Json<BindingResponse>, LatchError> {
    let username = checked_username(&username)?;
    let token = required("token", &request.token)?;

    let binding = registry.enroll(username, token).await?;
    Ok(Json(binding.into()))
}

#[utoipa::path(
    delete,
    path = "/v1/latch/users/{username}",
    params(("username" = String, Path, description = "Username, case-insensitive")),
    responses(
        (status = 204, description = "Unpaired, or the user was never enrolled."),
        (status = 400, description = "Invalid username.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API token.", body = ErrorResponse),
        (status = 409, description = "Unpaired remotely but the binding was not deleted.", body = ErrorResponse),
        (status = 412, description = "Access credentials are not configured.", body = ErrorResponse),
        (status = 502, description = "The oracle refused to unpair; the binding is kept.", body = ErrorResponse),
        (status = 504, description = "The oracle did not answer in time.", body = ErrorResponse),
    ),
    security(("api_token" = [])),
    tag = "latch"
)]
pub async fn unenroll(
    registry: Extension<BindingRegistry>,
    Path(username): Path<String>,
) -> Result<StatusCode, LatchError> {
    let username = checked_username(&username)?;

    match registry.unenroll(username).await? {
        UnenrollOutcome::Unpaired { account_id } => debug!(%account_id, "unpaired"),
        UnenrollOutcome::NotEnrolled => debug!("nothing to unpair"),
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/latch/users/{username}/local",
    params(("username" = String, Path, description = "Username, case-insensitive")),
    responses(
        (status = 204, description = "Local binding removed; the oracle was not contacted."),
        (status = 400, description = "Invalid username.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API token.", body = ErrorResponse),
        (status = 500, description = "Storage failure.", body = ErrorResponse),
    ),
    security(("api_token" = [])),
    tag = "latch"
)]
/// Drops the local binding only. Meant for cleaning up after an unenroll that
/// unpaired the account but could not delete the binding.
pub async fn forget(
    registry: Extension<BindingRegistry>,
    Path(username): Path<String>,
) -> Result<StatusCode, LatchError> {
    let username = checked_username(&username)?;
    registry.forget(username).await?;
    Ok(StatusCode::NO_CONTENT)
}
