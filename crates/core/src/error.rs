//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// One variant per failure kind of the inventory pipeline. Infrastructure
/// failures (lock poisoning, transport errors) belong to the infra layer and
/// wrap this type rather than extend it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request field is missing or malformed (synchronous boundary).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An envelope payload does not have the shape its action tag requires.
    #[error("payload shape mismatch: {0}")]
    PayloadShape(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced item or store is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A decrease asked for more units than are in stock.
    #[error("cannot decrease quantity by {requested}; current quantity is only {available}")]
    InsufficientQuantity { requested: u32, available: u32 },

    /// A store with the same name and address is already on record.
    #[error("duplicate: {0}")]
    DuplicateConflict(String),

    /// A concurrent writer kept winning the race for the same record.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn payload_shape(msg: impl Into<String>) -> Self {
        Self::PayloadShape(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn insufficient_quantity(requested: u32, available: u32) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateConflict(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_quantity_message_names_both_amounts() {
        let err = DomainError::insufficient_quantity(999_999, 3);
        assert_eq!(
            err.to_string(),
            "cannot decrease quantity by 999999; current quantity is only 3"
        );
    }
}
