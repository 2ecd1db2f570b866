//! Checkout request model and the Checkout Validator.

use serde::{Deserialize, Serialize};
use store::{AddressId, OrderRequestLine, ShippingAddress};

use crate::error::CheckoutRejection;
use crate::validation::{ValidationErrors, validate_order_lines, validate_shipping_address};

/// Whether the buyer is an authenticated member or an anonymous guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutType {
    Member,
    Guest,
}

impl CheckoutType {
    /// Wire code for this variant.
    pub const fn code(self) -> i64 {
        match self {
            CheckoutType::Member => 0,
            CheckoutType::Guest => 1,
        }
    }
}

impl TryFrom<i64> for CheckoutType {
    type Error = CheckoutRejection;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CheckoutType::Member),
            1 => Ok(CheckoutType::Guest),
            _ => Err(CheckoutRejection::InvalidEnum {
                field: "checkout_type",
                value,
            }),
        }
    }
}

/// Whether shipping uses a freshly supplied address or a stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressVariety {
    NewAddress,
    ExistingAddress,
}

impl AddressVariety {
    /// Wire code for this variant.
    pub const fn code(self) -> i64 {
        match self {
            AddressVariety::NewAddress => 0,
            AddressVariety::ExistingAddress => 1,
        }
    }
}

impl TryFrom<i64> for AddressVariety {
    type Error = CheckoutRejection;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AddressVariety::NewAddress),
            1 => Ok(AddressVariety::ExistingAddress),
            _ => Err(CheckoutRejection::InvalidEnum {
                field: "address_variety",
                value,
            }),
        }
    }
}

/// A checkout request as received from the client.
///
/// Enum fields keep their raw wire codes so that unknown codes surface as
/// `InvalidEnum` instead of a decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub checkout_type: i64,
    pub address_variety: i64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "carts")]
    pub cart_lines: Vec<OrderRequestLine>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub existing_shipping_address_id: Option<AddressId>,
}

impl CheckoutRequest {
    /// Member checkout shipping to a new address.
    pub fn member(
        token: impl Into<String>,
        lines: Vec<OrderRequestLine>,
        address: ShippingAddress,
    ) -> Self {
        Self {
            checkout_type: CheckoutType::Member.code(),
            address_variety: AddressVariety::NewAddress.code(),
            token: Some(token.into()),
            cart_lines: lines,
            shipping_address: Some(address),
            existing_shipping_address_id: None,
        }
    }

    /// Member checkout shipping to a stored address.
    pub fn member_to_existing(
        token: impl Into<String>,
        lines: Vec<OrderRequestLine>,
        address_id: AddressId,
    ) -> Self {
        Self {
            checkout_type: CheckoutType::Member.code(),
            address_variety: AddressVariety::ExistingAddress.code(),
            token: Some(token.into()),
            cart_lines: lines,
            shipping_address: None,
            existing_shipping_address_id: Some(address_id),
        }
    }

    /// Guest checkout shipping to a new address.
    pub fn guest(lines: Vec<OrderRequestLine>, address: ShippingAddress) -> Self {
        Self {
            checkout_type: CheckoutType::Guest.code(),
            address_variety: AddressVariety::NewAddress.code(),
            token: None,
            cart_lines: lines,
            shipping_address: Some(address),
            existing_shipping_address_id: None,
        }
    }
}

/// Who is buying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutMode {
    Member { token: String },
    Guest,
}

impl CheckoutMode {
    pub fn checkout_type(&self) -> CheckoutType {
        match self {
            CheckoutMode::Member { .. } => CheckoutType::Member,
            CheckoutMode::Guest => CheckoutType::Guest,
        }
    }
}

/// Where the order ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShippingDestination {
    New(ShippingAddress),
    /// Ownership is checked once the member is resolved.
    Existing(AddressId),
}

/// A checkout request that passed every pre-side-effect check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCheckout {
    pub mode: CheckoutMode,
    pub destination: ShippingDestination,
    pub lines: Vec<OrderRequestLine>,
}

/// Validates a checkout request without touching any collaborator.
///
/// Checks run in a fixed order and stop at the first failing stage: enum
/// codes, then the guest/existing-address pairing, then token presence,
/// then request fields. Field errors are collected together.
pub fn validate_checkout(request: CheckoutRequest) -> Result<ValidatedCheckout, CheckoutRejection> {
    let checkout_type = CheckoutType::try_from(request.checkout_type)?;
    let address_variety = AddressVariety::try_from(request.address_variety)?;

    if checkout_type == CheckoutType::Guest && address_variety == AddressVariety::ExistingAddress {
        return Err(CheckoutRejection::InvalidPairingForGuest);
    }

    let token = request
        .token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let mode = match (checkout_type, token) {
        (CheckoutType::Member, Some(token)) => CheckoutMode::Member { token },
        (CheckoutType::Member, None) => return Err(CheckoutRejection::MissingToken),
        (CheckoutType::Guest, Some(_)) => return Err(CheckoutRejection::UnexpectedToken),
        (CheckoutType::Guest, None) => CheckoutMode::Guest,
    };

    let mut errors = validate_order_lines(&request.cart_lines);
    let destination = match address_variety {
        AddressVariety::NewAddress => match request.shipping_address {
            Some(address) => {
                errors = errors.merge(validate_shipping_address(&address));
                Some(ShippingDestination::New(address))
            }
            None => {
                errors.add("shipping_address", "must be provided");
                None
            }
        },
        AddressVariety::ExistingAddress => match request.existing_shipping_address_id {
            Some(id) if id.is_valid() => Some(ShippingDestination::Existing(id)),
            Some(_) => {
                errors.add("existing_shipping_address_id", "must be a positive id");
                None
            }
            None => {
                errors.add("existing_shipping_address_id", "must be provided");
                None
            }
        },
    };

    match destination {
        Some(destination) if errors.is_empty() => Ok(ValidatedCheckout {
            mode,
            destination,
            lines: request.cart_lines,
        }),
        _ => Err(CheckoutRejection::InvalidInput(errors)),
    }
}

impl From<ValidationErrors> for CheckoutRejection {
    fn from(errors: ValidationErrors) -> Self {
        CheckoutRejection::InvalidInput(errors)
    }
}
