//! HTTP route table.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::AppState;

/// Build the service router.
///
/// CORS is left permissive so the operator panel can be served from a
/// different origin.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::latest_readings))
        .route("/version", get(handlers::version_page))
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::service_status))
        .route("/aux/read", get(handlers::aux_read))
        .route("/aux/readbyte", get(handlers::aux_read_byte))
        .route("/aux/write", get(handlers::aux_write))
        .route("/aux/current", get(handlers::aux_current))
        .route("/aux/voltage", get(handlers::aux_voltage))
        .route("/aux/charge", get(handlers::aux_charge))
        .route("/aux/temperature", get(handlers::aux_temperature))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
