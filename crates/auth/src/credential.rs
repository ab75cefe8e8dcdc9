use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 digest (hex) of a manager secret or access code.
///
/// Secrets are never stored in clear; verification hashes the presented value
/// and compares digests in constant time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialDigest(String);

impl CredentialDigest {
    pub fn of(secret: &str) -> Self {
        Self(hex::encode(Sha256::digest(secret.as_bytes())))
    }

    pub fn matches(&self, presented: &str) -> bool {
        let candidate = Self::of(presented);
        candidate.0.as_bytes().ct_eq(self.0.as_bytes()).into()
    }
}

impl core::fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("CredentialDigest(..)")
    }
}

/// What a caller presents alongside an intent.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Presentation {
    /// Manager secret.
    #[serde(default)]
    pub credential: Option<String>,
    /// Tenant access code (cabinet code) for public intents.
    #[serde(default)]
    pub access_code: Option<String>,
}

impl Presentation {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn manager(secret: impl Into<String>) -> Self {
        Self {
            credential: Some(secret.into()),
            access_code: None,
        }
    }

    pub fn access_code(code: impl Into<String>) -> Self {
        Self {
            credential: None,
            access_code: Some(code.into()),
        }
    }

    pub(crate) fn credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|s| !s.is_empty())
    }

    pub(crate) fn code(&self) -> Option<&str> {
        self.access_code.as_deref().filter(|s| !s.is_empty())
    }
}

impl core::fmt::Debug for Presentation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Presentation")
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("access_code", &self.access_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
