use axum::Router;

pub mod admin;
pub mod events;
pub mod inventory;
pub mod loans;
pub mod system;
pub mod tenants;

/// Router for every tenant-scoped endpoint. Callers authenticate per
/// request through the credentials they present.
pub fn router() -> Router {
    Router::new()
        .nest("/loans", loans::router())
        .nest(
            "/tenants",
            tenants::router()
                .merge(inventory::router())
                .merge(events::router()),
        )
}
