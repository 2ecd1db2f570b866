//! Domain layer for the bookstore cart and checkout.
//!
//! This crate provides:
//! - Field-level validation results that callers compose
//! - The checkout request model and the Checkout Validator
//! - `CartService`, the validated and instrumented entry point to the Cart Store

pub mod cart;
pub mod checkout;
pub mod error;
pub mod validation;

pub use cart::CartService;
pub use checkout::{
    AddressVariety, CheckoutMode, CheckoutRequest, CheckoutType, ShippingDestination,
    ValidatedCheckout, validate_checkout,
};
pub use error::{CheckoutRejection, DomainError};
pub use validation::{FieldError, ValidationErrors, validate_shipping_address};
