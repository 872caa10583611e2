//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "SKU empty"), Self::TooLong => write!(f, "SKU too long") }
    }
}

/// Coupon code, always stored uppercase
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 32 { return Err(CouponCodeError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CouponCodeError::InvalidCharacter);
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponCodeError { Empty, TooLong, InvalidCharacter }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Coupon code empty"),
            Self::TooLong => write!(f, "Coupon code too long"),
            Self::InvalidCharacter => write!(f, "Coupon code may only contain letters, digits, '-' and '_'"),
        }
    }
}

/// Account email, always stored lowercase
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl Into<String>) -> Result<Self, EmailError> {
        let value = value.into().trim().to_lowercase();
        match value.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(Self(value)),
            _ => Err(EmailError),
        }
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Email {
    type Error = EmailError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(value) }
}

impl From<Email> for String {
    fn from(email: Email) -> Self { email.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct EmailError;
impl std::error::Error for EmailError {}
impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Invalid email address") }
}

/// URL slug derived from a display name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().chars().flat_map(char::to_lowercase) {
            if c.is_alphanumeric() {
                slug.push(c);
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        while slug.ends_with('-') { slug.pop(); }
        Self(slug)
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub(crate) fn from_stored(value: String) -> Self { Self(value) }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Money value object in whole units of the store currency.
///
/// The store runs in a single currency, so amounts carry no currency code;
/// the gateway adapter converts to minor units at the boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative); }
        Ok(Self(amount))
    }
    pub fn from_units(units: u32) -> Self { Self(Decimal::from(units)) }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn add(&self, other: Money) -> Money { Money(self.0 + other.0) }
    /// Subtraction floored at zero.
    pub fn saturating_sub(&self, other: Money) -> Money { Money((self.0 - other.0).max(Decimal::ZERO)) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }
    /// `pct` percent of this amount, kept to minor-unit precision.
    pub fn percent(&self, pct: Decimal) -> Money {
        Money((self.0 * pct / Decimal::ONE_HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
    /// Nearest whole unit, halves rounded up.
    pub fn round_units(&self) -> Money { Money(self.0.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)) }
    pub fn to_minor_units(&self) -> i64 {
        (self.0 * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self { money.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Negative }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Amount cannot be negative") }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

/// A single variant attribute value: either a name ("Red", "XL") or a number (42, 7.5).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Named(String),
    Scalar(f64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Named(s) => write!(f, "{s}"), Self::Scalar(n) => write!(f, "{n}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_coupon_code_uppercases() {
        assert_eq!(CouponCode::new(" save10 ").unwrap().as_str(), "SAVE10");
        assert_eq!(CouponCode::new("save 10"), Err(CouponCodeError::InvalidCharacter));
    }
    #[test]
    fn test_email_lowercases() {
        assert_eq!(Email::parse("Jo@Example.COM").unwrap().as_str(), "jo@example.com");
        assert!(Email::parse("nope").is_err());
        assert!(Email::parse("a@localhost").is_err());
    }
    #[test]
    fn test_slug() {
        assert_eq!(Slug::from_name("  Linen Shirt -- Summer '24 ").as_str(), "linen-shirt-summer-24");
    }
    #[test]
    fn test_money_rounding() {
        let price = Money::new(Decimal::new(99950, 2)).unwrap();
        assert_eq!(price.round_units().amount(), Decimal::from(1000));
        assert_eq!(Money::from_units(1000).percent(Decimal::from(15)).amount(), Decimal::from(150));
        assert_eq!(Money::from_units(100).saturating_sub(Money::from_units(250)), Money::zero());
        assert_eq!(Money::new(Decimal::new(180050, 2)).unwrap().to_minor_units(), 180050);
        assert!(Money::new(Decimal::from(-1)).is_err());
    }
    #[test]
    fn test_attribute_value_parses_names_and_numbers() {
        let v: AttributeValue = serde_json::from_str("\"Red\"").unwrap();
        assert_eq!(v, AttributeValue::Named("Red".into()));
        let n: AttributeValue = serde_json::from_str("42").unwrap();
        assert_eq!(n.to_string(), "42");
        let half: AttributeValue = serde_json::from_str("7.5").unwrap();
        assert_eq!(half.to_string(), "7.5");
    }
}
