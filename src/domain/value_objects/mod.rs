//! Value Objects for order fulfillment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Time-ordered (UUIDv7) identifier.
            pub fn new() -> Self { Self(Uuid::now_v7()) }
            pub fn from_uuid(uuid: Uuid) -> Self { Self(uuid) }
            pub fn as_uuid(&self) -> &Uuid { &self.0 }
        }

        impl Default for $name {
            fn default() -> Self { Self::new() }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(&self.0, f) }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self { Self(value) }
        }

        impl FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::from_str(s).map(Self) }
        }
    };
}

uuid_id!(
    /// Purchasing user, supplied by the identity collaborator.
    UserId
);
uuid_id!(AddressId);
uuid_id!(StoreId);
uuid_id!(CategoryId);
uuid_id!(CatalogEntryId);
uuid_id!(SnapshotId);
uuid_id!(OrderId);
uuid_id!(OrderLineId);

/// Amount in whole currency units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(amount: i64) -> Self { Self(amount) }
    pub fn amount(&self) -> i64 { self.0 }

    /// Parses a stored price. Anything but a plain non-negative integer is rejected,
    /// so "12.50" or "12abc" never get truncated into a different price.
    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        let amount: i64 = raw.trim().parse().map_err(|_| MoneyError::NotNumeric)?;
        if amount < 0 { return Err(MoneyError::Negative); }
        Ok(Self(amount))
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).map(Money).ok_or(MoneyError::Overflow)
    }

    pub fn checked_mul(&self, qty: Quantity) -> Result<Money, MoneyError> {
        self.0.checked_mul(i64::from(qty.value())).map(Money).ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { NotNumeric, Negative, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNumeric => write!(f, "price is not a whole number"),
            Self::Negative => write!(f, "price is negative"),
            Self::Overflow => write!(f, "amount overflow"),
        }
    }
}

/// Strictly positive item count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[sqlx(transparent)]
pub struct Quantity(i32);

impl Quantity {
    pub fn new(value: i32) -> Result<Self, QuantityError> {
        if value <= 0 { return Err(QuantityError::NotPositive(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> i32 { self.0 }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for i32 {
    fn from(value: Quantity) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must be positive, got {0}")]
    NotPositive(i32),
}

/// URL-safe unique handle of a catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn new(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into().trim().to_lowercase();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.len() > 255 { return Err(SlugError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') { return Err(SlugError::InvalidChar); }
        Ok(Self(value))
    }

    const FALLBACK_BASE: &'static str = "item";
    const MAX_BASE_LEN: usize = 200;

    /// Builds a slug from a display name, suffixed with the creation second so two
    /// entries with the same name do not collide.
    pub fn from_name(name: &str, at: DateTime<Utc>) -> Result<Self, SlugError> {
        let mut base = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                base.push(c.to_ascii_lowercase());
            } else if !base.ends_with('-') && !base.is_empty() {
                base.push('-');
            }
        }
        // ASCII only; names without any (e.g. "コーヒー") fall back to a generic base
        let base = match base.trim_end_matches('-') {
            "" => Self::FALLBACK_BASE,
            b => &b[..b.len().min(Self::MAX_BASE_LEN)],
        };
        Self::new(format!("{}-{}", base.trim_end_matches('-'), at.timestamp()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Slug> for String {
    fn from(value: Slug) -> Self { value.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    #[error("slug is empty")]
    Empty,
    #[error("slug is longer than 255 characters")]
    TooLong,
    #[error("slug may only contain ascii letters, digits and '-'")]
    InvalidChar,
}

/// Free-form payment method label ("transfer", "cod", ...). Not interpreted here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    pub fn new(value: impl Into<String>) -> Result<Self, PaymentMethodError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(PaymentMethodError::Empty); }
        if value.len() > 64 { return Err(PaymentMethodError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for PaymentMethod {
    type Error = PaymentMethodError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PaymentMethod> for String {
    fn from(value: PaymentMethod) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentMethodError {
    #[error("payment method is empty")]
    Empty,
    #[error("payment method is longer than 64 characters")]
    TooLong,
}

/// Human-referenceable order identifier, `INV-YYYYMMDD-<order id hex>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct InvoiceCode(String);

impl InvoiceCode {
    /// Derived from the order's own identity, so two orders can only share a code
    /// if they share an id.
    pub fn issue(order_id: &OrderId, at: DateTime<Utc>) -> Self {
        Self(format!(
            "INV-{}-{}",
            at.format("%Y%m%d"),
            order_id.as_uuid().simple().to_string().to_uppercase()
        ))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for InvoiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
