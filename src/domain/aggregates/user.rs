//! User Aggregate
//!
//! A user exclusively owns its cart and address book. The address book keeps
//! the single-default invariant: any address becoming default first clears
//! the flag on every other address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::cart::Cart;
use crate::domain::aggregates::order::ShippingAddress;
use crate::domain::value_objects::Email;

#[derive(Clone, Debug)]
pub struct User {
    id: Uuid,
    name: String,
    email: Email,
    password_hash: String,
    role: Role,
    email_verified: bool,
    addresses: Vec<Address>,
    cart: Cart,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] User, Admin }

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::User => "user", Self::Admin => "admin" }
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "user" => Ok(Self::User), "admin" => Ok(Self::Admin), other => Err(format!("unknown role {other}")) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
}

impl Address {
    pub fn to_shipping(&self) -> ShippingAddress {
        ShippingAddress {
            full_name: self.full_name.clone(), phone: self.phone.clone(), line1: self.line1.clone(),
            line2: self.line2.clone(), city: self.city.clone(), state: self.state.clone(),
            postal_code: self.postal_code.clone(), country: self.country.clone(),
        }
    }
}

/// Columns needed to rebuild a stored user.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    pub addresses: Vec<Address>,
    pub cart: Cart,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn register(name: impl Into<String>, email: Email, password_hash: String) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.into(), email, password_hash, role: Role::User,
            email_verified: false, addresses: vec![], cart: Cart::new(), created_at: Utc::now(),
        }
    }

    pub fn restore(r: UserRecord) -> Self {
        Self {
            id: r.id, name: r.name, email: r.email, password_hash: r.password_hash, role: r.role,
            email_verified: r.email_verified, addresses: r.addresses, cart: r.cart, created_at: r.created_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn email(&self) -> &Email { &self.email }
    pub fn password_hash(&self) -> &str { &self.password_hash }
    pub fn role(&self) -> Role { self.role }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn email_verified(&self) -> bool { self.email_verified }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn cart_mut(&mut self) -> &mut Cart { &mut self.cart }
    pub fn addresses(&self) -> &[Address] { &self.addresses }

    pub fn promote_to_admin(&mut self) { self.role = Role::Admin; }

    pub fn address(&self, id: Uuid) -> Option<&Address> { self.addresses.iter().find(|a| a.id == id) }
    pub fn default_address(&self) -> Option<&Address> { self.addresses.iter().find(|a| a.is_default) }

    /// Adds an address. The first address, or one flagged default, becomes the default.
    pub fn add_address(&mut self, mut address: Address) -> &Address {
        let make_default = address.is_default || self.addresses.is_empty();
        if make_default { self.clear_default(); }
        address.is_default = make_default;
        self.addresses.push(address);
        &self.addresses[self.addresses.len() - 1]
    }

    pub fn set_default_address(&mut self, id: Uuid) -> Result<(), AddressError> {
        if self.address(id).is_none() { return Err(AddressError::NotFound); }
        self.clear_default();
        if let Some(a) = self.addresses.iter_mut().find(|a| a.id == id) { a.is_default = true; }
        Ok(())
    }

    pub fn remove_address(&mut self, id: Uuid) -> Result<Address, AddressError> {
        let idx = self.addresses.iter().position(|a| a.id == id).ok_or(AddressError::NotFound)?;
        Ok(self.addresses.remove(idx))
    }

    /// Replaces the address book with a stored copy.
    pub(crate) fn replace_addresses(&mut self, addresses: Vec<Address>) { self.addresses = addresses; }

    fn clear_default(&mut self) {
        for a in &mut self.addresses { a.is_default = false; }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum AddressError { NotFound }
impl std::error::Error for AddressError {}
impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Address not found") }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn address(name: &str, is_default: bool) -> Address {
        Address {
            id: Uuid::now_v7(), full_name: name.into(), phone: "9999999999".into(), line1: "1 Main St".into(),
            line2: None, city: "Pune".into(), state: "MH".into(), postal_code: "411001".into(),
            country: "IN".into(), is_default,
        }
    }

    fn defaults(user: &User) -> usize { user.addresses().iter().filter(|a| a.is_default).count() }

    #[test]
    fn test_first_address_becomes_default() {
        let mut user = User::register("Asha", Email::parse("asha@example.com").unwrap(), "x".into());
        let first = user.add_address(address("home", false)).id;
        user.add_address(address("work", false));
        assert_eq!(user.default_address().unwrap().id, first);
        assert_eq!(defaults(&user), 1);
    }

    #[test]
    fn test_single_default_invariant() {
        let mut user = User::register("Asha", Email::parse("asha@example.com").unwrap(), "x".into());
        user.add_address(address("home", true));
        let work = user.add_address(address("work", true)).id;
        assert_eq!(defaults(&user), 1);
        assert_eq!(user.default_address().unwrap().id, work);
        let home = user.addresses()[0].id;
        user.set_default_address(home).unwrap();
        assert_eq!(defaults(&user), 1);
        assert_eq!(user.set_default_address(Uuid::now_v7()), Err(AddressError::NotFound));
        user.remove_address(home).unwrap();
        assert_eq!(defaults(&user), 0);
    }
}
