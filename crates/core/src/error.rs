//! Errors raised by entity constructors and state transitions.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejected input or transition on an entity, e.g. an empty order number or
/// confirming an order without lines.
///
/// Missing records and duplicate keys are storage outcomes and surface as
/// `SessionError` from `stocker-persistence` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input rejected before any state changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The entity's current status does not allow the transition.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An id string is not a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure_kind() {
        assert_eq!(
            DomainError::validation("quantity must be positive").to_string(),
            "validation failed: quantity must be positive"
        );
        assert_eq!(
            DomainError::invariant("order is already cancelled").to_string(),
            "invariant violated: order is already cancelled"
        );
    }
}
