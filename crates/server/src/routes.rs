//! Route configuration.

use crate::auth::api_key_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Push, delete and relist require the API key when one is configured.
    let write_routes = Router::new()
        .route("/api/v2/package", put(handlers::push_package))
        .route(
            "/api/v2/package/{id}/{version}",
            axum::routing::delete(handlers::delete_package).post(handlers::relist_package),
        )
        .layer(DefaultBodyLimit::max(state.config.server.max_package_size_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ));

    let read_routes = Router::new()
        .route("/v3/index.json", get(handlers::service_index))
        .route(
            "/v3/package/{id}/index.json",
            get(handlers::get_package_versions),
        )
        .route(
            "/v3/package/{id}/{version}/{file}",
            get(handlers::get_package_file),
        )
        .route(
            "/v3/registration/{id}/index.json",
            get(handlers::get_registration_index),
        )
        .route("/v3/search", get(handlers::search))
        .route("/v3/autocomplete", get(handlers::autocomplete))
        // Unauthenticated for load balancer health checks.
        .route("/health", get(handlers::health_check));

    let mut router = Router::new().merge(write_routes).merge(read_routes);

    // When enabled, this endpoint should be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
