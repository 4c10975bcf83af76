use crate::latch::{AccessStore, BindingRegistry, ChallengeEvaluator, OracleConnector, Storage};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;

pub use handlers::auth::ApiToken;
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// The latch components shared by every request.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn Storage>,
    pub access: AccessStore,
    pub registry: BindingRegistry,
    pub evaluator: ChallengeEvaluator,
}

impl Services {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        connector: Arc<dyn OracleConnector>,
        oracle_timeout: Duration,
    ) -> Self {
        let access = AccessStore::new(storage.clone(), connector, oracle_timeout);
        let registry = BindingRegistry::new(storage.clone(), access.clone());
        let evaluator = ChallengeEvaluator::new(registry.clone(), access.clone());

        Self {
            storage,
            access,
            registry,
            evaluator,
        }
    }
}

/// Wire the documented routes with request ids, tracing and shared state.
#[must_use]
pub fn app(services: Services, api_token: ApiToken) -> Router {
    let (router, _openapi) = router().split_for_parts();

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(api_token))
            .layer(Extension(services.storage))
            .layer(Extension(services.access))
            .layer(Extension(services.registry))
            .layer(Extension(services.evaluator)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, services: Services, api_token: ApiToken) -> Result<()> {
    let app = app(services, api_token);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
