//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The input failed field validation; nothing was written.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ValidationErrors> for DomainError {
    fn from(errors: ValidationErrors) -> Self {
        DomainError::Validation(errors)
    }
}

/// Reasons the Checkout Validator turns a request away.
///
/// Every variant is raised before identity resolution or any inventory read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutRejection {
    /// An enum code outside the known variants.
    #[error("Unknown {field} code {value}")]
    InvalidEnum { field: &'static str, value: i64 },

    /// Member checkout without a token.
    #[error("Member checkout requires a token")]
    MissingToken,

    /// Guest checkout carrying a token.
    #[error("Guest checkout must not carry a token")]
    UnexpectedToken,

    /// Guests have no stored addresses to ship to.
    #[error("Guest checkout cannot ship to an existing address")]
    InvalidPairingForGuest,

    /// Request fields failed validation.
    #[error("Invalid checkout request: {0}")]
    InvalidInput(ValidationErrors),
}
