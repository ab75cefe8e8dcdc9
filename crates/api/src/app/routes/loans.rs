use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stationlend_lending::LoanId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_loan))
        .route("/:id", get(get_loan).delete(delete_loan))
        .route("/:id/decide", post(decide))
        .route("/:id/return", post(return_loan))
        .route("/:id/decide-return", post(decide_return))
        .route("/:id/sign", post(sign))
}

/// POST /loans
///
/// Borrow or request depending on the tenant's operating mode.
pub async fn create_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<dto::CreateLoanRequest>,
) -> axum::response::Response {
    let (tenant_id, open, presented) = match body.into_parts() {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };
    let presented = caller.with_body(presented);

    match services.lending().open_loan(tenant_id, &presented, open) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let loan_id = match errors::parse_id::<LoanId>(&id, "loan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.lending().get_loan(loan_id, caller.presented()) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /loans/:id/decide
///
/// Approve or reject whatever the loan is waiting on.
pub async fn decide(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DecideRequest>,
) -> axum::response::Response {
    let loan_id = match errors::parse_id::<LoanId>(&id, "loan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let presented = caller.with_body(body.auth.into());

    match services.queue().decide(loan_id, body.decision, &presented) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /loans/:id/return
///
/// Marks the loan returned, or submits the return for approval when the
/// tenant requires it and the caller lacks full access.
pub async fn return_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReturnRequest>>,
) -> axum::response::Response {
    let loan_id = match errors::parse_id::<LoanId>(&id, "loan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let (details, presented) = body.into_parts();
    let presented = caller.with_body(presented);

    match services.lending().return_loan(loan_id, &presented, details) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn decide_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DecideRequest>,
) -> axum::response::Response {
    let loan_id = match errors::parse_id::<LoanId>(&id, "loan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let presented = caller.with_body(body.auth.into());

    match services
        .queue()
        .decide_return(loan_id, body.decision, &presented)
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn sign(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::BodyCredentials>>,
) -> axum::response::Response {
    let loan_id = match errors::parse_id::<LoanId>(&id, "loan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let presented = caller.with_body(body.into());

    match services.lending().sign(loan_id, &presented) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// DELETE /loans/:id
///
/// Removes a closed loan from history; open loans are refused.
pub async fn delete_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let loan_id = match errors::parse_id::<LoanId>(&id, "loan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.lending().delete(loan_id, caller.presented()) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
