//! Checkout step state machine.

use serde::Serialize;

/// The steps of a checkout, in execution order.
///
/// State transitions (terminal on first failure):
/// ```text
/// Validate ──► ResolveIdentity ──► VerifyStock ──► ResolveAddress ──► Commit ──► ClearCart
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum CheckoutStep {
    /// Request shape, enum codes, and token presence.
    #[default]
    Validate,

    /// Token exchanged for a member record.
    ResolveIdentity,

    /// Every line re-checked against current ledger state.
    VerifyStock,

    /// New address taken as given, or stored address looked up for the member.
    ResolveAddress,

    /// Stock decremented and order recorded, all or nothing.
    Commit,

    /// Purchased lines removed from the member's cart.
    ClearCart,
}

impl CheckoutStep {
    /// Returns the step that follows this one, if any.
    pub fn next(&self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Validate => Some(CheckoutStep::ResolveIdentity),
            CheckoutStep::ResolveIdentity => Some(CheckoutStep::VerifyStock),
            CheckoutStep::VerifyStock => Some(CheckoutStep::ResolveAddress),
            CheckoutStep::ResolveAddress => Some(CheckoutStep::Commit),
            CheckoutStep::Commit => Some(CheckoutStep::ClearCart),
            CheckoutStep::ClearCart => None,
        }
    }

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::Validate => "validate",
            CheckoutStep::ResolveIdentity => "resolve_identity",
            CheckoutStep::VerifyStock => "verify_stock",
            CheckoutStep::ResolveAddress => "resolve_address",
            CheckoutStep::Commit => "commit",
            CheckoutStep::ClearCart => "clear_cart",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
