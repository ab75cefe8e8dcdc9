//! Platform administration: onboarding and retiring tenants.
//!
//! Mounted behind `admin_middleware`; none of these routes accept tenant
//! credentials.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::routes::tenants::parse_tenant;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::AdminContext;

pub fn router() -> Router {
    Router::new()
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route("/tenants/:id/deactivate", post(deactivate_tenant))
        .route("/tenants/:id/reactivate", post(reactivate_tenant))
        .route("/reconciliation", post(reconcile_all))
}

pub async fn create_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_admin): Extension<AdminContext>,
    Json(body): Json<dto::CreateTenantRequest>,
) -> axum::response::Response {
    match services.lending().create_tenant(
        &body.display_name,
        body.kind,
        body.mode,
        &body.credential,
    ) {
        Ok(tenant) => {
            tracing::info!(tenant_id = %tenant.id_typed(), "tenant created");
            (StatusCode::CREATED, Json(dto::TenantView::from(&tenant))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_tenants(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_admin): Extension<AdminContext>,
) -> axum::response::Response {
    match services.lending().tenants().list() {
        Ok(tenants) => {
            let views: Vec<dto::TenantView> = tenants.iter().map(dto::TenantView::from).collect();
            Json(views).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn deactivate_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_admin): Extension<AdminContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.lending().deactivate_tenant(tenant_id) {
        Ok(tenant) => {
            tracing::info!(tenant_id = %tenant_id, "tenant deactivated");
            Json(dto::TenantView::from(&tenant)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reactivate_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_admin): Extension<AdminContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.lending().tenants().reactivate(tenant_id) {
        Ok(tenant) => {
            tracing::info!(tenant_id = %tenant_id, "tenant reactivated");
            Json(dto::TenantView::from(&tenant)).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /admin/reconciliation
///
/// Verify every tenant now; only tenants with drift appear in the report.
pub async fn reconcile_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_admin): Extension<AdminContext>,
) -> axum::response::Response {
    match services.reconciliation().verify_all() {
        Ok(report) => {
            let report: serde_json::Map<String, serde_json::Value> = report
                .into_iter()
                .map(|(tenant_id, found)| {
                    (
                        tenant_id.to_string(),
                        serde_json::to_value(found).unwrap_or_default(),
                    )
                })
                .collect();
            Json(serde_json::json!({ "tenants": report })).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
