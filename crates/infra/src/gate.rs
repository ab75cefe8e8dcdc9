//! Per-tenant transition gates.
//!
//! A loan transition spans several stores (loan stream, ledger rows, loan
//! directory). Holding the tenant's gate across all of them means no reader
//! that also takes the gate, such as reconciliation, can observe one without
//! the other. Tenants never share a gate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stationlend_core::{DomainError, TenantId};

#[derive(Debug, Default)]
pub struct TransitionGates {
    gates: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl TransitionGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding `tenant_id`'s gate.
    pub fn with<R>(&self, tenant_id: TenantId, f: impl FnOnce() -> R) -> Result<R, DomainError> {
        let gate = {
            let mut gates = self
                .gates
                .lock()
                .map_err(|_| DomainError::invariant("transition gate table poisoned"))?;
            gates.entry(tenant_id).or_default().clone()
        };

        // The gate guards no data of its own; poisoning is ignored.
        let _held = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f())
    }
}
