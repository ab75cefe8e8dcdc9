use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stationlend_auth::{AccessTier, CredentialDigest, TenantCredentials};
use stationlend_core::{DomainError, DomainResult, Entity, TenantId};

/// Label of the credential replaced by `Tenant::set_primary_credential`.
pub const PRIMARY_CREDENTIAL: &str = "primary";

/// Tenant kind: a city (umbrella) or a single station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantKind {
    City,
    Station,
}

/// How loans are opened.
///
/// - `Direct`: a manager hands the item over; the loan starts `borrowed`.
/// - `Request`: the end user files a request that waits in the approval queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Direct,
    Request,
}

impl core::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OperatingMode::Direct => f.write_str("direct"),
            OperatingMode::Request => f.write_str("request"),
        }
    }
}

/// A named manager secret with its tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerCredential {
    pub label: String,
    pub digest: CredentialDigest,
    pub tier: AccessTier,
}

/// Tenant configuration record.
///
/// # Invariants
/// - Never removed while it owns loan history; `deactivate` is the only way out.
/// - Manager labels are unique within the tenant.
/// - An inactive tenant rejects every mutating intent (`ensure_active`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    id: TenantId,
    display_name: String,
    kind: TenantKind,
    active: bool,
    mode: OperatingMode,
    managers: Vec<ManagerCredential>,
    access_code: Option<CredentialDigest>,
    require_caller_id: bool,
    return_approval: Option<bool>,
    created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(
        id: TenantId,
        display_name: impl Into<String>,
        kind: TenantKind,
        mode: OperatingMode,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }
        Ok(Self {
            id,
            display_name,
            kind,
            active: true,
            mode,
            managers: Vec::new(),
            access_code: None,
            require_caller_id: false,
            return_approval: None,
            created_at,
        })
    }

    pub fn id_typed(&self) -> TenantId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> TenantKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn require_caller_id(&self) -> bool {
        self.require_caller_id
    }

    pub fn has_access_code(&self) -> bool {
        self.access_code.is_some()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn managers(&self) -> impl Iterator<Item = (&str, AccessTier)> {
        self.managers.iter().map(|m| (m.label.as_str(), m.tier))
    }

    /// Whether a borrower's return must be approved before the loan closes.
    ///
    /// Explicit setting wins; otherwise request-mode tenants review returns and
    /// direct-mode tenants do not.
    pub fn requires_return_approval(&self) -> bool {
        self.return_approval
            .unwrap_or(self.mode == OperatingMode::Request)
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(DomainError::TenantInactive)
        }
    }

    /// Borrower identity rules: a name is always required; a phone number
    /// only when the tenant asks for caller identity.
    pub fn check_caller_identity(&self, name: &str, phone: Option<&str>) -> DomainResult<()> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("borrower name cannot be empty"));
        }
        if self.require_caller_id && phone.is_none_or(|p| p.trim().is_empty()) {
            return Err(DomainError::validation(
                "borrower phone is required by this tenant",
            ));
        }
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn reactivate(&mut self) {
        self.active = true;
    }

    pub fn set_mode(&mut self, mode: OperatingMode) {
        self.mode = mode;
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) -> DomainResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }
        self.display_name = name;
        Ok(())
    }

    pub fn set_require_caller_id(&mut self, required: bool) {
        self.require_caller_id = required;
    }

    pub fn set_return_approval(&mut self, required: Option<bool>) {
        self.return_approval = required;
    }

    /// Set or clear the end-user access code.
    pub fn set_access_code(&mut self, code: Option<&str>) -> DomainResult<()> {
        self.access_code = match code {
            None => None,
            Some(c) if c.trim().is_empty() => {
                return Err(DomainError::validation("access code cannot be empty"));
            }
            Some(c) => Some(CredentialDigest::of(c)),
        };
        Ok(())
    }

    /// Replace the primary full-access credential.
    pub fn set_primary_credential(&mut self, secret: &str) -> DomainResult<()> {
        self.upsert_manager(PRIMARY_CREDENTIAL, secret, AccessTier::FullAccess)
    }

    /// Add a manager credential, or replace the one with the same label.
    pub fn upsert_manager(&mut self, label: &str, secret: &str, tier: AccessTier) -> DomainResult<()> {
        if label.trim().is_empty() {
            return Err(DomainError::validation("credential label cannot be empty"));
        }
        if secret.len() < 4 {
            return Err(DomainError::validation(
                "credential secret must be at least 4 characters",
            ));
        }
        let credential = ManagerCredential {
            label: label.to_string(),
            digest: CredentialDigest::of(secret),
            tier,
        };
        match self.managers.iter_mut().find(|m| m.label == label) {
            Some(existing) => *existing = credential,
            None => self.managers.push(credential),
        }
        Ok(())
    }

    pub fn remove_manager(&mut self, label: &str) -> DomainResult<()> {
        let before = self.managers.len();
        self.managers.retain(|m| m.label != label);
        if self.managers.len() == before {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    /// `verifyCredential`: does the presented secret match any manager?
    pub fn verify_credential(&self, presented: &str) -> bool {
        self.resolve_manager(presented).is_some()
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantCredentials for Tenant {
    fn resolve_manager(&self, presented: &str) -> Option<(String, AccessTier)> {
        self.managers
            .iter()
            .find(|m| m.digest.matches(presented))
            .map(|m| (m.label.clone(), m.tier))
    }

    fn access_code(&self) -> Option<&CredentialDigest> {
        self.access_code.as_ref()
    }
}
