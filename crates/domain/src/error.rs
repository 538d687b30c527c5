//! Domain error types.

use thiserror::Error;

/// A single field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: &'static str,
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: "is required",
        }
    }

    pub fn invalid(field: impl Into<String>, reason: &'static str) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

/// A state machine refused a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {machine} transition: {from} -> {to}")]
pub struct TransitionError {
    pub machine: &'static str,
    pub from: String,
    pub to: String,
}

impl TransitionError {
    pub(crate) fn new(
        machine: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self {
            machine,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
