//! Storefront backend.
//!
//! ## Features
//! - Product catalog with per-variant stock
//! - Cart with abandoned-cart tracking and reminders
//! - Transactional cart-to-order checkout with coupons
//! - Gateway payments reconciled by signed webhooks
//! - Order status tracking, cancellation with stock restoration
//! - PDF invoices for paid orders

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod invoice;
pub mod notify;
pub mod scheduler;
pub mod services;
pub mod store;

pub use error::{AppError, AppResult};
