use axum::{extract::DefaultBodyLimit, middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AppState;
use crate::logging::request_logger;
use crate::routes::api_router;
use crate::VERSION;

/// Headroom above the advertised chunk size.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

#[derive(Serialize)]
struct HealthcheckResponse {
    status: String,
    version: String,
}

async fn healthcheck() -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
    })
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(state.config.share.chunk_size)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    let api_routes = Router::new()
        .route("/healthcheck", get(healthcheck))
        .merge(api_router());

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
