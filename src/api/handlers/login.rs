use super::types::ErrorResponse;
use crate::latch::{ChallengeEvaluator, LatchError, Verdict};
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

/// Where the primary backend puts the authenticated username.
pub const USERNAME_POINTER: &str = "/auth/metadata/username";

/// Username from a completed primary login response, if present.
#[must_use]
pub fn primary_username(primary: &Value) -> Option<&str> {
    primary.pointer(USERNAME_POINTER).and_then(Value::as_str)
}

#[utoipa::path(
    post,
    path = "/v1/latch/login",
    request_body(
        content = serde_json::Value,
        description = "The primary backend's completed login response; \
            `auth.metadata.username` names the user."
    ),
    responses(
        (status = 200, description = "Login may proceed; the request body is returned unchanged.", body = serde_json::Value),
        (status = 400, description = "The response carries no username.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API token.", body = ErrorResponse),
        (status = 403, description = "The user's latch is closed.", body = ErrorResponse),
        (status = 412, description = "The user is enrolled but credentials are not configured.", body = ErrorResponse),
        (status = 502, description = "The oracle failed for an enrolled user.", body = ErrorResponse),
        (status = 504, description = "The oracle did not answer in time for an enrolled user.", body = ErrorResponse),
    ),
    security(("api_token" = [])),
    tag = "latch"
)]
/// Second-factor check run after the primary login succeeded.
pub async fn login(
    evaluator: Extension<ChallengeEvaluator>,
    Json(primary): Json<Value>,
) -> Result<Response, LatchError> {
    let username = primary_username(&primary).map(str::to_string);

    Ok(match evaluator.evaluate(primary, username.as_deref()).await? {
        Verdict::Unenrolled(primary) | Verdict::Approved(primary) => Json(primary).into_response(),
        Verdict::Denied { reason } => {
            (StatusCode::FORBIDDEN, Json(ErrorResponse::new(reason))).into_response()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn username_from_primary_response() {
        let primary = json!({
            "auth": { "metadata": { "username": "Bob" }, "policies": ["default"] },
            "lease_duration": 0
        });
        assert_eq!(primary_username(&primary), Some("Bob"));
    }

    #[test]
    fn missing_or_non_string_username() {
        assert_eq!(primary_username(&json!({})), None);
        assert_eq!(primary_username(&json!({ "auth": null })), None);
        assert_eq!(
            primary_username(&json!({ "auth": { "metadata": { "username": 7 } } })),
            None
        );
    }
}
