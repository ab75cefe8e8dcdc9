use stationlend_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one tenant.
///
/// Subscribers that serve a single tenant (e.g. a station's SSE stream) use
/// this to drop everything else.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;

    fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}
