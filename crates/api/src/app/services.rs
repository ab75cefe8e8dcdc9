use std::convert::Infallible;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use stationlend_core::TenantId;
use stationlend_events::{EventBus, EventEnvelope, TenantScoped};
use stationlend_infra::{
    InMemoryApprovalQueue, InMemoryLendingService, InMemoryStack, ReconciliationEngine,
};

const POLL_INTERVAL: Duration = Duration::from_millis(1000);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Shared handles for every route.
pub struct AppServices {
    stack: InMemoryStack,
}

impl AppServices {
    pub fn new(stack: InMemoryStack) -> Self {
        Self { stack }
    }

    pub fn lending(&self) -> &InMemoryLendingService {
        &self.stack.service
    }

    pub fn queue(&self) -> &InMemoryApprovalQueue {
        &self.stack.queue
    }

    pub fn reconciliation(&self) -> &ReconciliationEngine {
        &self.stack.reconciliation
    }

    pub fn stack(&self) -> &InMemoryStack {
        &self.stack
    }
}

/// Forward one tenant's committed loan events to an SSE client.
///
/// Each connection owns a bus subscription drained on a blocking thread; the
/// thread exits once the client goes away.
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<UnboundedReceiverStream<Result<SseEvent, Infallible>>> {
    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();
    let subscription = services.stack.sink.subscribe();

    tokio::task::spawn_blocking(move || {
        let mut last_sent = Instant::now();
        loop {
            if tx.is_closed() {
                break;
            }
            match subscription.recv_timeout(POLL_INTERVAL) {
                Ok(envelope) => {
                    if !envelope.belongs_to(tenant_id) {
                        continue;
                    }
                    let Some(event) = to_sse(&envelope) else {
                        continue;
                    };
                    if tx.send(Ok(event)).is_err() {
                        break;
                    }
                    last_sent = Instant::now();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if last_sent.elapsed() >= HEARTBEAT_INTERVAL {
                        let heartbeat = SseEvent::default().event("heartbeat").data("{}");
                        if tx.send(Ok(heartbeat)).is_err() {
                            break;
                        }
                        last_sent = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!(tenant_id = %tenant_id, "event stream closed");
    });

    Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL))
}

fn to_sse(envelope: &EventEnvelope<JsonValue>) -> Option<SseEvent> {
    let data = serde_json::json!({
        "event_id": envelope.event_id().to_string(),
        "tenant_id": envelope.tenant_id().to_string(),
        "loan_id": envelope.aggregate_id().to_string(),
        "sequence_number": envelope.sequence_number(),
        "event_type": envelope.event_type(),
        "occurred_at": envelope.occurred_at().to_rfc3339(),
        "payload": envelope.payload(),
    });
    let json = serde_json::to_string(&data).ok()?;
    Some(SseEvent::default().event(envelope.event_type()).data(json))
}
