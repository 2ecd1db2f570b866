//! Field-level input validation.
//!
//! Every check returns its own [`ValidationErrors`]; callers compose results
//! with [`ValidationErrors::merge`] and turn them into a `Result` with
//! [`ValidationErrors::into_result`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use store::{CartLineKey, NewCartLine, OrderRequestLine, ShippingAddress};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$")
        .expect("Invalid regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{8,15}$").expect("Invalid regex"));

static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}$").expect("Invalid regex"));

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// An ordered list of rejected fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result holding one error.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Records an error for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Records an error for `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    /// Appends another result's errors after this one's.
    pub fn merge(mut self, other: ValidationErrors) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Returns true if any error names `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Collapses errors into a field → message map, keeping the first
    /// message reported for each field.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for error in &self.0 {
            map.entry(error.field.clone())
                .or_insert_with(|| error.message.clone());
        }
        map
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Checks a cart insert.
pub fn validate_new_cart_line(line: &NewCartLine) -> ValidationErrors {
    let mut v = ValidationErrors::new();
    v.check(line.user_id.is_valid(), "user_id", "must be a positive id");
    v.check(line.item_id.is_valid(), "item_id", "must be a positive id");
    v.merge(validate_quantity(line.quantity))
}

/// Checks the key addressing an existing cart line.
pub fn validate_cart_line_key(key: &CartLineKey) -> ValidationErrors {
    let mut v = ValidationErrors::new();
    match key {
        CartLineKey::Id(id) => {
            v.check(id.is_valid(), "cart_line_id", "must be a positive id");
        }
        CartLineKey::UserItem { user_id, item_id } => {
            v.check(user_id.is_valid(), "user_id", "must be a positive id");
            v.check(item_id.is_valid(), "item_id", "must be a positive id");
        }
    }
    v
}

/// Checks a requested quantity.
pub fn validate_quantity(quantity: u32) -> ValidationErrors {
    let mut v = ValidationErrors::new();
    v.check(quantity > 0, "quantity", "must be greater than zero");
    v
}

/// Checks the lines of a checkout request.
pub fn validate_order_lines(lines: &[OrderRequestLine]) -> ValidationErrors {
    let mut v = ValidationErrors::new();
    if lines.is_empty() {
        v.add("cart_lines", "must contain at least one item");
        return v;
    }

    let mut seen = std::collections::HashSet::with_capacity(lines.len());
    for line in lines {
        if !line.item_id.is_valid() {
            v.add("cart_lines", "item ids must be positive");
        } else if line.quantity == 0 {
            v.add("cart_lines", "quantities must be greater than zero");
        } else if !seen.insert(line.item_id) {
            v.add("cart_lines", "must not contain duplicate items");
        }
    }
    v
}

/// Checks a freshly supplied shipping address.
pub fn validate_shipping_address(address: &ShippingAddress) -> ValidationErrors {
    let mut v = ValidationErrors::new();

    if address.email.is_empty() {
        v.add("email", "must be provided");
    } else {
        v.check(
            EMAIL_RE.is_match(&address.email),
            "email",
            "must be a valid email address",
        );
    }

    v = v
        .merge(validate_name("first_name", &address.first_name))
        .merge(validate_name("last_name", &address.last_name));

    if address.addresses.trim().is_empty() {
        v.add("addresses", "must be provided");
    } else {
        v.check(
            address.addresses.chars().count() <= 500,
            "addresses",
            "must not be more than 500 characters long",
        );
    }

    if address.postal_code.is_empty() {
        v.add("postal_code", "must be provided");
    } else {
        v.check(
            POSTAL_CODE_RE.is_match(&address.postal_code),
            "postal_code",
            "must be 5 digits",
        );
    }

    v.check(address.province_id > 0, "province_id", "must be provided");
    v.check(address.city_id > 0, "city_id", "must be provided");
    v.check(address.district_id > 0, "district_id", "must be provided");
    v.check(
        address.subdistrict_id > 0,
        "subdistrict_id",
        "must be provided",
    );

    if address.phone.is_empty() {
        v.add("phone", "must be provided");
    } else {
        v.check(
            PHONE_RE.is_match(&address.phone),
            "phone",
            "must be 8 to 15 digits with an optional leading +",
        );
    }

    v
}

fn validate_name(field: &str, value: &str) -> ValidationErrors {
    let mut v = ValidationErrors::new();
    let len = value.chars().count();
    if value.trim().is_empty() {
        v.add(field, "must be provided");
    } else if len < 3 {
        v.add(field, "must be at least 3 characters long");
    } else if len > 30 {
        v.add(field, "must not be more than 30 characters long");
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{CartLineId, ItemId, UserId};

    fn valid_address() -> ShippingAddress {
        ShippingAddress {
            email: "reader@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Reader".to_string(),
            addresses: "Jl. Merdeka 1".to_string(),
            postal_code: "40111".to_string(),
            province_id: 32,
            city_id: 3273,
            district_id: 327301,
            subdistrict_id: 3273011001,
            phone: "+6281234567890".to_string(),
        }
    }

    #[test]
    fn accepts_complete_address() {
        assert!(validate_shipping_address(&valid_address()).is_empty());
    }

    #[test]
    fn empty_address_reports_every_field() {
        let errors = validate_shipping_address(&ShippingAddress::default());
        for field in [
            "email",
            "first_name",
            "last_name",
            "addresses",
            "postal_code",
            "province_id",
            "city_id",
            "district_id",
            "subdistrict_id",
            "phone",
        ] {
            assert!(errors.has_field(field), "missing error for {field}");
        }
    }

    #[test]
    fn rejects_malformed_fields() {
        let address = ShippingAddress {
            email: "not-an-email".to_string(),
            first_name: "Al".to_string(),
            postal_code: "4011".to_string(),
            phone: "08-1234".to_string(),
            ..valid_address()
        };
        let map = validate_shipping_address(&address).to_map();
        assert_eq!(map["email"], "must be a valid email address");
        assert_eq!(map["first_name"], "must be at least 3 characters long");
        assert_eq!(map["postal_code"], "must be 5 digits");
        assert!(map.contains_key("phone"));
        assert!(!map.contains_key("last_name"));
    }

    #[test]
    fn cart_line_needs_positive_quantity() {
        let line = NewCartLine {
            user_id: UserId::new(1),
            item_id: ItemId::new(42),
            quantity: 0,
        };
        let errors = validate_new_cart_line(&line);
        assert_eq!(errors.len(), 1);
        assert!(errors.has_field("quantity"));
    }

    #[test]
    fn cart_key_needs_positive_ids() {
        assert!(validate_cart_line_key(&CartLineKey::Id(CartLineId::new(0))).has_field("cart_line_id"));
        assert!(
            validate_cart_line_key(&CartLineKey::UserItem {
                user_id: UserId::new(1),
                item_id: ItemId::new(2),
            })
            .is_empty()
        );
    }

    #[test]
    fn order_lines_reject_duplicates_and_empty() {
        assert!(validate_order_lines(&[]).has_field("cart_lines"));
        let line = OrderRequestLine {
            item_id: ItemId::new(7),
            quantity: 1,
        };
        let errors = validate_order_lines(&[line, line]);
        assert_eq!(errors.to_map()["cart_lines"], "must not contain duplicate items");
    }

    #[test]
    fn merge_keeps_order_and_map_keeps_first() {
        let merged = ValidationErrors::single("a", "first")
            .merge(ValidationErrors::single("b", "second"))
            .merge(ValidationErrors::single("a", "third"));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.to_map()["a"], "first");
        assert_eq!(merged.to_string(), "a: first; b: second; a: third");
        assert!(merged.into_result().is_err());
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
