//! Live loan events over Server-Sent Events.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use stationlend_auth::Intent;

use crate::app::errors;
use crate::app::routes::tenants::parse_tenant;
use crate::app::services::{self, AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/:id/events", get(stream_events))
}

/// GET /tenants/:id/events
///
/// Each committed loan event of the tenant as an SSE message named after the
/// event type, with a `heartbeat` message when the stream is idle.
pub async fn stream_events(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match parse_tenant(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(e) = services
        .lending()
        .authorize(tenant_id, caller.presented(), Intent::ViewDiagnostics)
    {
        return errors::service_error_to_response(e);
    }

    services::tenant_sse_stream(services, tenant_id).into_response()
}
