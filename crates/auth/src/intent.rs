use serde::{Deserialize, Serialize};

use crate::AccessTier;

/// Caller intents the guard knows about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Request,
    Borrow,
    Approve,
    Reject,
    Return,
    SubmitReturn,
    ApproveReturn,
    RejectReturn,
    Sign,
    DeleteHistory,
    ManageInventory,
    ManageTenant,
    ViewDiagnostics,
}

/// What an intent demands from the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// End-user intent; gated only by the tenant's access code, if one is set.
    Public,
    /// A manager credential of at least this tier.
    Tier(AccessTier),
}

impl Intent {
    pub fn requirement(self) -> Requirement {
        match self {
            Intent::Request | Intent::SubmitReturn | Intent::Sign => Requirement::Public,
            Intent::Approve | Intent::Reject | Intent::ApproveReturn | Intent::RejectReturn => {
                Requirement::Tier(AccessTier::ApproveRequests)
            }
            Intent::ViewDiagnostics => Requirement::Tier(AccessTier::ViewOnly),
            Intent::Borrow
            | Intent::Return
            | Intent::DeleteHistory
            | Intent::ManageInventory
            | Intent::ManageTenant => Requirement::Tier(AccessTier::FullAccess),
        }
    }

    pub fn is_mutating(self) -> bool {
        !matches!(self, Intent::ViewDiagnostics)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Request => "request",
            Intent::Borrow => "borrow",
            Intent::Approve => "approve",
            Intent::Reject => "reject",
            Intent::Return => "return",
            Intent::SubmitReturn => "submit-return",
            Intent::ApproveReturn => "approve-return",
            Intent::RejectReturn => "reject-return",
            Intent::Sign => "sign",
            Intent::DeleteHistory => "delete",
            Intent::ManageInventory => "manage-inventory",
            Intent::ManageTenant => "manage-tenant",
            Intent::ViewDiagnostics => "view-diagnostics",
        }
    }
}

impl core::fmt::Display for Intent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
