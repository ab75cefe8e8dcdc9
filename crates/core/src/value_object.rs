//! Value object trait: equality by value, not identity.
//!
//! Borrower details, deposit descriptors and fault reports attached to a loan
//! are value objects: two deposits with the same type and details are the same
//! deposit. To "change" one, replace it.

/// Marker trait for value objects.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Deposit {
///     kind: String,
///     details: String,
/// }
///
/// impl ValueObject for Deposit {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
