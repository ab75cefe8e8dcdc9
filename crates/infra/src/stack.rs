//! In-memory wiring of the lending core.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use stationlend_core::{Clock, SystemClock, TenantId};
use stationlend_events::{EventEnvelope, InMemoryEventBus};

use crate::dispatcher::TransitionDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::InMemoryEventStore;
use crate::gate::TransitionGates;
use crate::ledger::InventoryLedger;
use crate::projections::LoanDirectoryProjection;
use crate::queue::ApprovalQueue;
use crate::read_model::InMemoryReadModelStore;
use crate::reconciliation::ReconciliationEngine;
use crate::service::LendingService;
use crate::tenants::TenantStore;

pub type EventSink = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type InMemoryLendingService = LendingService<Arc<InMemoryEventStore>, EventSink>;
pub type InMemoryApprovalQueue = ApprovalQueue<Arc<InMemoryEventStore>, EventSink>;

/// Every component over shared in-memory stores.
pub struct InMemoryStack {
    pub store: Arc<InMemoryEventStore>,
    pub sink: EventSink,
    pub service: Arc<InMemoryLendingService>,
    pub queue: InMemoryApprovalQueue,
    pub reconciliation: ReconciliationEngine,
}

impl InMemoryStack {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let sink: EventSink = Arc::new(InMemoryEventBus::new());

        let service = Arc::new(LendingService::new(
            Arc::new(TenantStore::new()),
            Arc::new(InventoryLedger::new()),
            Arc::new(LoanDirectoryProjection::new(Arc::new(
                InMemoryReadModelStore::new(),
            ))),
            Arc::new(TransitionGates::new()),
            TransitionDispatcher::new(store.clone(), sink.clone()),
            clock,
        ));

        Self {
            queue: ApprovalQueue::new(service.clone()),
            reconciliation: ReconciliationEngine::for_service(&service),
            store,
            sink,
            service,
        }
    }

    /// Replay a tenant's loan streams into a fresh directory.
    pub fn rebuild_directory(&self, tenant_id: TenantId) -> ServiceResult<()> {
        self.service.gates().with(tenant_id, || {
            let history = self.store.tenant_history(tenant_id)?;
            self.service.loans().rebuild(tenant_id, &history)?;
            Ok::<_, ServiceError>(())
        })?
    }
}

impl Default for InMemoryStack {
    fn default() -> Self {
        Self::new()
    }
}
