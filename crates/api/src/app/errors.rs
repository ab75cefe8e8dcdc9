use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stationlend_core::DomainError;
use stationlend_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
        ServiceError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        ServiceError::Projection(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "projection_error",
            e.to_string(),
        ),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    let (status, code) = match err {
        DomainError::TenantNotFound => (StatusCode::NOT_FOUND, "tenant_not_found"),
        DomainError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::TenantInactive => (StatusCode::CONFLICT, "tenant_inactive"),
        DomainError::InsufficientQuantity { .. } => {
            (StatusCode::CONFLICT, "insufficient_quantity")
        }
        DomainError::UnitUnavailable => (StatusCode::CONFLICT, "unit_unavailable"),
        DomainError::IllegalTransition { .. } => (StatusCode::CONFLICT, "illegal_transition"),
        DomainError::WrongMode { .. } => (StatusCode::CONFLICT, "wrong_mode"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
        DomainError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        DomainError::OverRelease { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "over_release"),
        DomainError::InvariantViolation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation")
        }
    };
    json_error(status, code, message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
{
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}
