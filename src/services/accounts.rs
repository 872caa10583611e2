//! Registration, login and the address book.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::locked_user;
use crate::auth::{self, JwtKeys};
use crate::domain::aggregates::{Address, Role, User};
use crate::domain::value_objects::Email;
use crate::error::{AppError, AppResult};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self { id: user.id(), name: user.name().to_string(), email: user.email().to_string(), role: user.role() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Address book entry as submitted.
#[derive(Debug, Clone)]
pub struct NewAddress {
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

impl From<NewAddress> for Address {
    fn from(a: NewAddress) -> Self {
        Address {
            id: Uuid::now_v7(),
            full_name: a.full_name,
            phone: a.phone,
            line1: a.line1,
            line2: a.line2,
            city: a.city,
            state: a.state,
            postal_code: a.postal_code,
            country: a.country,
            is_default: a.is_default,
        }
    }
}

const BAD_CREDENTIALS: &str = "Invalid email or password";

pub struct AccountService {
    store: Arc<dyn Store>,
    jwt: JwtKeys,
    admin_emails: Vec<String>,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, jwt: JwtKeys, admin_emails: Vec<String>) -> Self {
        Self { store, jwt, admin_emails }
    }

    pub async fn register(&self, name: &str, email: &str, password: String) -> AppResult<AuthResponse> {
        let email = Email::parse(email).map_err(|e| AppError::Validation(e.to_string()))?;
        let hash = auth::hash_password(password).await?;
        let mut user = User::register(name.trim(), email, hash);
        if self.admin_emails.iter().any(|e| e == user.email().as_str()) {
            user.promote_to_admin();
        }

        let mut tx = self.store.begin().await?;
        tx.insert_user(&user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AppError::Conflict("Email already registered".into()),
            other => other.into(),
        })?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id(), role = user.role().as_str(), "User registered");
        Ok(AuthResponse { token: self.jwt.issue(&user)?, user: UserProfile::from(&user) })
    }

    pub async fn login(&self, email: &str, password: String) -> AppResult<AuthResponse> {
        let email = Email::parse(email).map_err(|_| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;
        let user = self
            .store
            .user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;
        if !auth::verify_password(password, user.password_hash().to_string()).await? {
            tracing::debug!(user_id = %user.id(), "Login rejected");
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
        }
        Ok(AuthResponse { token: self.jwt.issue(&user)?, user: UserProfile::from(&user) })
    }

    pub async fn profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let user = self.store.user(user_id).await?.ok_or_else(|| AppError::not_found("User"))?;
        Ok(UserProfile::from(&user))
    }

    pub async fn addresses(&self, user_id: Uuid) -> AppResult<Vec<Address>> {
        let user = self.store.user(user_id).await?.ok_or_else(|| AppError::not_found("User"))?;
        Ok(user.addresses().to_vec())
    }

    pub async fn add_address(&self, user_id: Uuid, new: NewAddress) -> AppResult<Vec<Address>> {
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), user_id).await?;
        user.add_address(new.into());
        tx.save_addresses(user.id(), user.addresses()).await?;
        tx.commit().await?;
        Ok(user.addresses().to_vec())
    }

    /// Makes `address_id` the only default.
    pub async fn set_default(&self, user_id: Uuid, address_id: Uuid) -> AppResult<Vec<Address>> {
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), user_id).await?;
        user.set_default_address(address_id)?;
        tx.save_addresses(user.id(), user.addresses()).await?;
        tx.commit().await?;
        Ok(user.addresses().to_vec())
    }

    pub async fn remove_address(&self, user_id: Uuid, address_id: Uuid) -> AppResult<Vec<Address>> {
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), user_id).await?;
        user.remove_address(address_id)?;
        tx.save_addresses(user.id(), user.addresses()).await?;
        tx.commit().await?;
        Ok(user.addresses().to_vec())
    }
}
