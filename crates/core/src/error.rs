//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business/domain failures only. Storage and transport concerns
/// are wrapped by the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found (loan, item).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale stream revision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The tenant id is unknown.
    #[error("tenant not found")]
    TenantNotFound,

    /// The tenant is deactivated; mutating intents are blocked.
    #[error("tenant is inactive")]
    TenantInactive,

    /// A counted item does not have enough units on the shelf.
    #[error("insufficient quantity (requested: {requested}, available: {available})")]
    InsufficientQuantity { requested: u32, available: u32 },

    /// A unit item already has an open loan.
    #[error("unit is unavailable")]
    UnitUnavailable,

    /// The loan is not in a state that permits the intent.
    #[error("illegal transition: cannot {intent} a loan in status {from}")]
    IllegalTransition { from: String, intent: String },

    /// The tenant's operating mode does not offer this intent.
    #[error("'{intent}' is not available in {mode} mode")]
    WrongMode { mode: String, intent: String },

    /// Credential missing, unknown or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but the credential's tier is too low.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A release would push a counted item above its catalog total.
    #[error("over-release: quantity would become {attempted}, catalog total is {max}")]
    OverRelease { attempted: u32, max: u32 },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn illegal(from: impl core::fmt::Display, intent: impl core::fmt::Display) -> Self {
        Self::IllegalTransition {
            from: from.to_string(),
            intent: intent.to_string(),
        }
    }

    pub fn wrong_mode(mode: impl core::fmt::Display, intent: impl core::fmt::Display) -> Self {
        Self::WrongMode {
            mode: mode.to_string(),
            intent: intent.to_string(),
        }
    }

    /// Data-integrity failures are surfaced to an administrator and never
    /// corrected automatically.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::OverRelease { .. } | Self::InvariantViolation(_))
    }

    /// Expected business conflicts the caller can resolve by picking another
    /// item or waiting.
    pub fn is_availability_conflict(&self) -> bool {
        matches!(self, Self::InsufficientQuantity { .. } | Self::UnitUnavailable)
    }
}
