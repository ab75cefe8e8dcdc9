//! Tenant-scoped manager endpoints: listings, the approval queue,
//! diagnostics and tenant settings.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};

use stationlend_auth::Intent;
use stationlend_core::TenantId;
use stationlend_infra::TenantSettings;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_tenant))
        .route("/:id/loans", get(list_loans))
        .route("/:id/queue", get(list_queue))
        .route("/:id/reconciliation", get(diagnose))
        .route("/:id/mode", put(set_mode))
        .route("/:id/credential", put(set_credential))
        .route("/:id/settings", put(configure))
        .route("/:id/managers", post(add_manager))
        .route("/:id/managers/:label", delete(remove_manager))
}

pub(crate) fn parse_tenant(raw: &str) -> Result<TenantId, axum::response::Response> {
    errors::parse_id::<TenantId>(raw, "tenant")
}

pub async fn get_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .authorize(tenant_id, caller.presented(), Intent::ViewDiagnostics)
    {
        Ok((tenant, _)) => Json(dto::TenantView::from(&tenant)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /tenants/:id/loans?status=borrowed
pub async fn list_loans(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match query.parse() {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .list_loans(tenant_id, caller.presented(), status)
    {
        Ok(loans) => Json(loans).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /tenants/:id/queue?status=pending_approval
///
/// Loans awaiting a manager's decision, oldest first.
pub async fn list_queue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match query.parse() {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.queue().list(tenant_id, caller.presented(), status) {
        Ok(loans) => Json(loans).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /tenants/:id/reconciliation
///
/// Drift report; an empty list means the ledger matches the open loans.
pub async fn diagnose(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .reconciliation()
        .diagnose(tenant_id, caller.presented())
    {
        Ok(found) => Json(serde_json::json!({
            "tenant_id": tenant_id,
            "discrepancies": found,
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn set_mode(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetModeRequest>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .set_mode(tenant_id, caller.presented(), body.mode)
    {
        Ok(tenant) => Json(dto::TenantView::from(&tenant)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /tenants/:id/credential
///
/// Rotates the primary full-access secret.
pub async fn set_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetCredentialRequest>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .set_credential(tenant_id, caller.presented(), &body.secret)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn configure(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SettingsRequest>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .configure(tenant_id, caller.presented(), &TenantSettings::from(body))
    {
        Ok(tenant) => Json(dto::TenantView::from(&tenant)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn add_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddManagerRequest>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.lending().add_manager(
        tenant_id,
        caller.presented(),
        &body.label,
        &body.secret,
        body.tier,
    ) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(dto::ManagerView {
                label: body.label,
                tier: body.tier,
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((id, label)): Path<(String, String)>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .remove_manager(tenant_id, caller.presented(), &label)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
