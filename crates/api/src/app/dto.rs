use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stationlend_auth::{AccessTier, Presentation};
use stationlend_core::{ItemId, TenantId};
use stationlend_infra::{ItemSelector, OpenLoan, QueueDecision, ReturnDetails, TenantSettings};
use stationlend_inventory::{ItemStatus, UnitQuery};
use stationlend_lending::{Borrower, Deposit, Evidence, FaultReport, LoanId, LoanStatus};
use stationlend_tenancy::{OperatingMode, Tenant, TenantKind};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Credentials may ride along in any JSON body.
#[derive(Deserialize, Default)]
pub struct BodyCredentials {
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub access_code: Option<String>,
}

impl From<BodyCredentials> for Presentation {
    fn from(value: BodyCredentials) -> Self {
        Presentation {
            credential: value.credential,
            access_code: value.access_code,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateLoanRequest {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub loan_id: Option<LoanId>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    /// Pick a unit by attributes instead of by id.
    #[serde(default)]
    pub unit_query: Option<UnitQuery>,
    #[serde(default)]
    pub quantity: Option<u32>,
    pub borrower_name: String,
    #[serde(default)]
    pub borrower_phone: Option<String>,
    #[serde(default)]
    pub expected_return_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deposit: Option<Deposit>,
    #[serde(flatten)]
    pub auth: BodyCredentials,
}

impl CreateLoanRequest {
    pub fn into_parts(self) -> Result<(TenantId, OpenLoan, Presentation), axum::response::Response> {
        let item = match (self.item_id, self.unit_query) {
            (Some(id), None) => ItemSelector::Item(id),
            (None, Some(query)) => ItemSelector::Matching(query),
            _ => {
                return Err(errors::json_error(
                    axum::http::StatusCode::BAD_REQUEST,
                    "validation_error",
                    "exactly one of item_id or unit_query is required",
                ));
            }
        };
        let open = OpenLoan {
            loan_id: self.loan_id,
            item,
            quantity: self.quantity,
            borrower: Borrower {
                name: self.borrower_name,
                phone: self.borrower_phone,
            },
            expected_return_date: self.expected_return_date,
            deposit: self.deposit,
        };
        Ok((self.tenant_id, open, self.auth.into()))
    }
}

#[derive(Deserialize)]
pub struct DecideRequest {
    #[serde(flatten)]
    pub decision: QueueDecision,
    #[serde(flatten)]
    pub auth: BodyCredentials,
}

#[derive(Deserialize, Default)]
pub struct ReturnRequest {
    #[serde(default)]
    pub fault: Option<FaultReport>,
    #[serde(default)]
    pub evidence: Option<Evidence>,
    #[serde(flatten)]
    pub auth: BodyCredentials,
}

impl ReturnRequest {
    pub fn into_parts(self) -> (ReturnDetails, Presentation) {
        (
            ReturnDetails {
                fault: self.fault,
                evidence: self.evidence,
            },
            self.auth.into(),
        )
    }
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

impl StatusQuery {
    pub fn parse(&self) -> Result<Option<LoanStatus>, axum::response::Response> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                errors::json_error(
                    axum::http::StatusCode::BAD_REQUEST,
                    "invalid_status",
                    "status must be one of: pending, borrowed, pending_approval, returned, rejected",
                )
            }),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateTenantRequest {
    pub display_name: String,
    pub kind: TenantKind,
    pub mode: OperatingMode,
    /// Primary full-access secret.
    pub credential: String,
}

#[derive(Deserialize)]
pub struct SetModeRequest {
    pub mode: OperatingMode,
}

#[derive(Deserialize)]
pub struct SetCredentialRequest {
    pub secret: String,
}

/// `null` clears `access_code` / `return_approval`; an absent field is left
/// unchanged.
#[derive(Deserialize, Default)]
pub struct SettingsRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub access_code: Option<Option<String>>,
    #[serde(default)]
    pub require_caller_id: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub return_approval: Option<Option<bool>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<SettingsRequest> for TenantSettings {
    fn from(value: SettingsRequest) -> Self {
        TenantSettings {
            display_name: value.display_name,
            access_code: value.access_code,
            require_caller_id: value.require_caller_id,
            return_approval: value.return_approval,
        }
    }
}

#[derive(Deserialize)]
pub struct AddManagerRequest {
    pub label: String,
    pub secret: String,
    pub tier: AccessTier,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: ItemStatus,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub delta: i64,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Serialize)]
pub struct ManagerView {
    pub label: String,
    pub tier: AccessTier,
}

/// Tenant as shown to managers; credential digests never leave the server.
#[derive(Serialize)]
pub struct TenantView {
    pub id: TenantId,
    pub display_name: String,
    pub kind: TenantKind,
    pub mode: OperatingMode,
    pub active: bool,
    pub has_access_code: bool,
    pub require_caller_id: bool,
    pub requires_return_approval: bool,
    pub managers: Vec<ManagerView>,
    pub created_at: DateTime<Utc>,
}

impl From<&Tenant> for TenantView {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id_typed(),
            display_name: t.display_name().to_string(),
            kind: t.kind(),
            mode: t.mode(),
            active: t.is_active(),
            has_access_code: t.has_access_code(),
            require_caller_id: t.require_caller_id(),
            requires_return_approval: t.requires_return_approval(),
            managers: t
                .managers()
                .map(|(label, tier)| ManagerView {
                    label: label.to_string(),
                    tier,
                })
                .collect(),
            created_at: t.created_at(),
        }
    }
}
