//! `stationlend-auth`: the access guard in front of every mutating intent.
//!
//! Decoupled from HTTP and storage: tenants supply their credentials through
//! [`TenantCredentials`], callers supply a [`Presentation`].

pub mod authorize;
pub mod credential;
pub mod intent;
pub mod tier;

pub use authorize::{AuthzError, Grant, TenantCredentials, authorize, authorize_intent};
pub use credential::{CredentialDigest, Presentation};
pub use intent::{Intent, Requirement};
pub use tier::AccessTier;
