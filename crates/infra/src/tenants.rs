//! Tenant registry.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use stationlend_core::{DomainError, DomainResult, TenantId};
use stationlend_tenancy::{OperatingMode, Tenant, TenantKind};

/// In-memory tenant registry.
///
/// Tenants are never removed; `deactivate` is the only way to retire one.
#[derive(Debug, Default)]
pub struct TenantStore {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

fn poisoned() -> DomainError {
    DomainError::invariant("tenant store lock poisoned")
}

impl TenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        display_name: &str,
        kind: TenantKind,
        mode: OperatingMode,
        at: DateTime<Utc>,
    ) -> DomainResult<Tenant> {
        let tenant = Tenant::new(TenantId::new(), display_name, kind, mode, at)?;
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        tenants.insert(tenant.id_typed(), tenant.clone());
        tracing::info!(tenant_id = %tenant.id_typed(), kind = ?kind, mode = %mode, "tenant created");
        Ok(tenant)
    }

    pub fn get(&self, tenant_id: TenantId) -> DomainResult<Tenant> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        tenants
            .get(&tenant_id)
            .cloned()
            .ok_or(DomainError::TenantNotFound)
    }

    /// Like [`get`](Self::get), but also refuses inactive tenants.
    pub fn get_active(&self, tenant_id: TenantId) -> DomainResult<Tenant> {
        let tenant = self.get(tenant_id)?;
        tenant.ensure_active()?;
        Ok(tenant)
    }

    pub fn list(&self) -> DomainResult<Vec<Tenant>> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        let mut all: Vec<_> = tenants.values().cloned().collect();
        all.sort_by_key(|t| (t.created_at(), t.id_typed()));
        Ok(all)
    }

    /// Apply a change to one tenant atomically.
    pub fn update<R>(
        &self,
        tenant_id: TenantId,
        change: impl FnOnce(&mut Tenant) -> DomainResult<R>,
    ) -> DomainResult<R> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        let tenant = tenants
            .get_mut(&tenant_id)
            .ok_or(DomainError::TenantNotFound)?;

        // Work on a copy so a failed change leaves the tenant untouched.
        let mut draft = tenant.clone();
        let out = change(&mut draft)?;
        *tenant = draft;
        Ok(out)
    }

    /// Settings changes require an active tenant.
    fn update_active<R>(
        &self,
        tenant_id: TenantId,
        change: impl FnOnce(&mut Tenant) -> DomainResult<R>,
    ) -> DomainResult<R> {
        self.update(tenant_id, |t| {
            t.ensure_active()?;
            change(t)
        })
    }

    pub fn set_mode(&self, tenant_id: TenantId, mode: OperatingMode) -> DomainResult<Tenant> {
        let tenant = self.update_active(tenant_id, |t| {
            t.set_mode(mode);
            Ok(t.clone())
        })?;
        tracing::info!(tenant_id = %tenant_id, mode = %mode, "operating mode changed");
        Ok(tenant)
    }

    /// Replace the primary full-access credential.
    pub fn set_credential(&self, tenant_id: TenantId, secret: &str) -> DomainResult<()> {
        self.update_active(tenant_id, |t| t.set_primary_credential(secret))?;
        tracing::info!(tenant_id = %tenant_id, "primary credential replaced");
        Ok(())
    }

    pub fn verify_credential(&self, tenant_id: TenantId, presented: &str) -> DomainResult<bool> {
        Ok(self.get(tenant_id)?.verify_credential(presented))
    }

    pub fn deactivate(&self, tenant_id: TenantId) -> DomainResult<Tenant> {
        let tenant = self.update(tenant_id, |t| {
            t.deactivate();
            Ok(t.clone())
        })?;
        tracing::info!(tenant_id = %tenant_id, "tenant deactivated");
        Ok(tenant)
    }

    pub fn reactivate(&self, tenant_id: TenantId) -> DomainResult<Tenant> {
        let tenant = self.update(tenant_id, |t| {
            t.reactivate();
            Ok(t.clone())
        })?;
        tracing::info!(tenant_id = %tenant_id, "tenant reactivated");
        Ok(tenant)
    }

    pub fn configure(&self, tenant_id: TenantId, settings: &TenantSettings) -> DomainResult<Tenant> {
        self.update_active(tenant_id, |t| {
            if let Some(name) = &settings.display_name {
                t.set_display_name(name.as_str())?;
            }
            if let Some(code) = &settings.access_code {
                t.set_access_code(code.as_deref())?;
            }
            if let Some(required) = settings.require_caller_id {
                t.set_require_caller_id(required);
            }
            if let Some(policy) = settings.return_approval {
                t.set_return_approval(policy);
            }
            Ok(t.clone())
        })
    }
}

/// Partial settings update. `None` leaves a field unchanged; the nested
/// options clear a value (`access_code: Some(None)` removes the code).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantSettings {
    pub display_name: Option<String>,
    pub access_code: Option<Option<String>>,
    pub require_caller_id: Option<bool>,
    pub return_approval: Option<Option<bool>>,
}
