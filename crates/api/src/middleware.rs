use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stationlend_auth::{CredentialDigest, Presentation};

use crate::context::{AdminContext, CallerContext};

/// Header carrying the tenant's access code for end-user intents.
pub const ACCESS_CODE_HEADER: &str = "x-access-code";

/// Collect whatever the caller presented. Never rejects: whether a request
/// needs a credential depends on the intent, which the service decides.
pub async fn caller_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let headers = req.headers();
    let presented = Presentation {
        credential: extract_bearer(headers).ok().map(str::to_string),
        access_code: headers
            .get(ACCESS_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    };

    req.extensions_mut().insert(CallerContext::new(presented));
    next.run(req).await
}

#[derive(Clone)]
pub struct AdminState {
    pub token: Arc<CredentialDigest>,
}

impl AdminState {
    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::new(CredentialDigest::of(token)),
        }
    }
}

pub async fn admin_middleware(
    State(state): State<AdminState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;
    if !state.token.matches(token) {
        tracing::warn!("admin token rejected");
        return Err(StatusCode::UNAUTHORIZED);
    }

    req.extensions_mut().insert(AdminContext);
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
