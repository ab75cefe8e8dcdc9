//! Tenant configuration (cities and stations).
//!
//! A tenant decides how its loans flow (`direct` vs `request` mode), who may
//! manage it (manager credentials with tiers) and what end users must present
//! (access code, caller identity). Pure domain logic; storage lives in infra.

pub mod tenant;

pub use tenant::{
    ManagerCredential, OperatingMode, PRIMARY_CREDENTIAL, Tenant, TenantKind,
};
