use thiserror::Error;

use stationlend_core::DomainError;

use crate::{AccessTier, CredentialDigest, Intent, Presentation, Requirement};

/// Credential material a tenant exposes to the guard.
///
/// Implemented by the tenant record; the guard never sees clear-text secrets
/// other than the presented ones.
pub trait TenantCredentials {
    /// Resolve a presented manager secret to `(label, tier)`.
    fn resolve_manager(&self, presented: &str) -> Option<(String, AccessTier)>;

    /// Digest of the tenant's access code, if one is configured.
    fn access_code(&self) -> Option<&CredentialDigest>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No credential presented, or it matched nothing.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: requires '{required}', credential grants '{actual}'")]
    Forbidden {
        required: AccessTier,
        actual: AccessTier,
    },

    /// Public intent on a tenant with an access code, and none was presented.
    #[error("access code required")]
    AccessCodeRequired,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthorized | AuthzError::AccessCodeRequired => DomainError::Unauthorized,
            AuthzError::Forbidden { .. } => DomainError::Forbidden(value.to_string()),
        }
    }
}

/// Outcome of a successful check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grant {
    /// Label of the manager credential that was presented, if any.
    pub manager: Option<String>,
    pub tier: Option<AccessTier>,
}

impl Grant {
    pub fn is_full_access(&self) -> bool {
        self.tier == Some(AccessTier::FullAccess)
    }
}

/// Check a presentation against a requirement.
///
/// - No IO
/// - No panics
/// - A manager credential of any tier also opens public intents on tenants
///   that have an access code.
pub fn authorize<T>(
    tenant: &T,
    presented: &Presentation,
    required: Requirement,
) -> Result<Grant, AuthzError>
where
    T: TenantCredentials + ?Sized,
{
    let manager = presented
        .credential()
        .and_then(|secret| tenant.resolve_manager(secret));

    match required {
        Requirement::Tier(needed) => {
            let (label, tier) = manager.ok_or(AuthzError::Unauthorized)?;
            if !tier.satisfies(needed) {
                return Err(AuthzError::Forbidden {
                    required: needed,
                    actual: tier,
                });
            }
            Ok(Grant {
                manager: Some(label),
                tier: Some(tier),
            })
        }
        Requirement::Public => {
            if let Some((label, tier)) = manager {
                return Ok(Grant {
                    manager: Some(label),
                    tier: Some(tier),
                });
            }
            if presented.credential().is_some() {
                // A wrong manager secret is not silently downgraded to anonymous.
                return Err(AuthzError::Unauthorized);
            }
            match tenant.access_code() {
                None => Ok(Grant::default()),
                Some(digest) => match presented.code() {
                    None => Err(AuthzError::AccessCodeRequired),
                    Some(code) if digest.matches(code) => Ok(Grant::default()),
                    Some(_) => Err(AuthzError::Unauthorized),
                },
            }
        }
    }
}

/// [`authorize`] for a named intent, with a log line on denial.
pub fn authorize_intent<T>(
    tenant: &T,
    presented: &Presentation,
    intent: Intent,
) -> Result<Grant, AuthzError>
where
    T: TenantCredentials + ?Sized,
{
    authorize(tenant, presented, intent.requirement()).inspect_err(|e| {
        tracing::warn!(intent = %intent, error = %e, "authorization denied");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        managers: Vec<(String, CredentialDigest, AccessTier)>,
        code: Option<CredentialDigest>,
    }

    impl TenantCredentials for Fixture {
        fn resolve_manager(&self, presented: &str) -> Option<(String, AccessTier)> {
            self.managers
                .iter()
                .find(|(_, digest, _)| digest.matches(presented))
                .map(|(label, _, tier)| (label.clone(), *tier))
        }

        fn access_code(&self) -> Option<&CredentialDigest> {
            self.code.as_ref()
        }
    }

    fn fixture(code: Option<&str>) -> Fixture {
        Fixture {
            managers: vec![
                ("primary".to_string(), CredentialDigest::of("root"), AccessTier::FullAccess),
                ("desk".to_string(), CredentialDigest::of("desk"), AccessTier::ApproveRequests),
                ("viewer".to_string(), CredentialDigest::of("view"), AccessTier::ViewOnly),
            ],
            code: code.map(CredentialDigest::of),
        }
    }

    #[test]
    fn full_access_passes_every_tier() {
        let t = fixture(None);
        let grant = authorize_intent(&t, &Presentation::manager("root"), Intent::Borrow).unwrap();
        assert_eq!(grant.manager.as_deref(), Some("primary"));
        assert!(grant.is_full_access());
        assert!(authorize_intent(&t, &Presentation::manager("root"), Intent::Approve).is_ok());
    }

    #[test]
    fn approver_can_decide_but_not_borrow() {
        let t = fixture(None);
        assert!(authorize_intent(&t, &Presentation::manager("desk"), Intent::RejectReturn).is_ok());
        let err = authorize_intent(&t, &Presentation::manager("desk"), Intent::Borrow).unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden {
                required: AccessTier::FullAccess,
                actual: AccessTier::ApproveRequests
            }
        );
    }

    #[test]
    fn view_only_is_forbidden_from_queue_decisions() {
        let t = fixture(None);
        let err = authorize_intent(&t, &Presentation::manager("view"), Intent::Approve).unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden { .. }));
    }

    #[test]
    fn unknown_or_missing_credential_is_unauthorized() {
        let t = fixture(None);
        assert_eq!(
            authorize_intent(&t, &Presentation::manager("nope"), Intent::Approve).unwrap_err(),
            AuthzError::Unauthorized
        );
        assert_eq!(
            authorize_intent(&t, &Presentation::anonymous(), Intent::Return).unwrap_err(),
            AuthzError::Unauthorized
        );
    }

    #[test]
    fn public_intent_without_access_code_is_open() {
        let t = fixture(None);
        let grant = authorize_intent(&t, &Presentation::anonymous(), Intent::Request).unwrap();
        assert_eq!(grant, Grant::default());
    }

    #[test]
    fn public_intent_checks_access_code() {
        let t = fixture(Some("4321"));
        assert_eq!(
            authorize_intent(&t, &Presentation::anonymous(), Intent::Request).unwrap_err(),
            AuthzError::AccessCodeRequired
        );
        assert_eq!(
            authorize_intent(&t, &Presentation::access_code("0000"), Intent::Request).unwrap_err(),
            AuthzError::Unauthorized
        );
        assert!(authorize_intent(&t, &Presentation::access_code("4321"), Intent::SubmitReturn).is_ok());
        assert!(authorize_intent(&t, &Presentation::manager("view"), Intent::Request).is_ok());
    }

    #[test]
    fn wrong_manager_secret_does_not_fall_back_to_anonymous() {
        let t = fixture(None);
        assert_eq!(
            authorize_intent(&t, &Presentation::manager("bad"), Intent::Request).unwrap_err(),
            AuthzError::Unauthorized
        );
    }

    #[test]
    fn authz_errors_map_to_domain_errors() {
        assert_eq!(DomainError::from(AuthzError::AccessCodeRequired), DomainError::Unauthorized);
        assert!(matches!(
            DomainError::from(AuthzError::Forbidden {
                required: AccessTier::FullAccess,
                actual: AccessTier::ViewOnly
            }),
            DomainError::Forbidden(_)
        ));
    }
}
