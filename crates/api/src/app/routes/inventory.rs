use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stationlend_core::ItemId;
use stationlend_inventory::{NewCountedItem, NewUnitItem, RepairAction};

use crate::app::routes::tenants::parse_tenant;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id/inventory", get(list_inventory))
        .route("/:id/items/counted", post(add_counted_item))
        .route("/:id/items/units", post(add_unit_item))
        .route("/:id/items/:item/status", post(set_status))
        .route("/:id/items/:item/restock", post(restock))
        .route("/:id/items/:item/repair", post(repair))
}

fn parse_item(raw: &str) -> Result<ItemId, axum::response::Response> {
    errors::parse_id::<ItemId>(raw, "item")
}

/// GET /tenants/:id/inventory
///
/// Public: borrowers browse what is on the shelf.
pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.lending().inventory(tenant_id, caller.presented()) {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn add_counted_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<NewCountedItem>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .add_counted_item(tenant_id, caller.presented(), body)
    {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn add_unit_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<NewUnitItem>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .lending()
        .add_unit_item(tenant_id, caller.presented(), body)
    {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<dto::SetStatusRequest>,
) -> axum::response::Response {
    let (tenant_id, item_id) = match (parse_tenant(&id), parse_item(&item)) {
        (Ok(t), Ok(i)) => (t, i),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match services
        .lending()
        .set_item_status(tenant_id, caller.presented(), item_id, body.status)
    {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /tenants/:id/items/:item/restock
///
/// Counted items only; a negative delta writes stock off.
pub async fn restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<dto::RestockRequest>,
) -> axum::response::Response {
    let (tenant_id, item_id) = match (parse_tenant(&id), parse_item(&item)) {
        (Ok(t), Ok(i)) => (t, i),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match services
        .lending()
        .restock(tenant_id, caller.presented(), item_id, body.delta)
    {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /tenants/:id/items/:item/repair
///
/// Operator correction after reviewing a reconciliation report.
pub async fn repair(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<RepairAction>,
) -> axum::response::Response {
    let (tenant_id, item_id) = match (parse_tenant(&id), parse_item(&item)) {
        (Ok(t), Ok(i)) => (t, i),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match services
        .lending()
        .repair(tenant_id, caller.presented(), item_id, &body)
    {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
