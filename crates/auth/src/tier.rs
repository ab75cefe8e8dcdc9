use serde::{Deserialize, Serialize};

/// Permission tier attached to a manager credential.
///
/// Ordered: `ViewOnly < ApproveRequests < FullAccess`. A credential satisfies
/// a requirement when its tier is greater than or equal to the required one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    ViewOnly,
    ApproveRequests,
    FullAccess,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::ViewOnly => "view_only",
            AccessTier::ApproveRequests => "approve_requests",
            AccessTier::FullAccess => "full_access",
        }
    }

    pub fn satisfies(self, required: AccessTier) -> bool {
        self >= required
    }
}

impl core::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AccessTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view_only" => Ok(AccessTier::ViewOnly),
            "approve_requests" => Ok(AccessTier::ApproveRequests),
            "full_access" => Ok(AccessTier::FullAccess),
            other => Err(format!("unknown access tier '{other}'")),
        }
    }
}
