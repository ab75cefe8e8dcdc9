//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the in-memory lending stack shared by every handler
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use stationlend_infra::InMemoryStack;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over a fresh in-memory stack.
pub fn build_app(admin_token: String) -> Router {
    let services = Arc::new(services::AppServices::new(InMemoryStack::new()));
    router(services, &admin_token)
}

/// Router over existing services; `main.rs` keeps a handle for background
/// reconciliation.
pub fn router(services: Arc<services::AppServices>, admin_token: &str) -> Router {
    let admin = Router::new()
        .nest("/admin", routes::admin::router())
        .layer(axum::middleware::from_fn_with_state(
            middleware::AdminState::new(admin_token),
            middleware::admin_middleware,
        ));

    let tenant_scoped =
        routes::router().layer(axum::middleware::from_fn(middleware::caller_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(tenant_scoped)
        .merge(admin)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
