//! Abandoned cart records
//!
//! A denormalised copy of a user's live cart, kept for recovery mail. One
//! `pending` record per user at most; checkout leaves it in place so the
//! payment capture can mark it `converted`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{Email, Money};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonedCart {
    id: Uuid,
    user_id: Uuid,
    user_name: String,
    user_email: Email,
    items: Vec<AbandonedLine>,
    status: AbandonedStatus,
    abandoned_at: Option<DateTime<Utc>>,
    converted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonedLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub price: Money,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbandonedStatus { #[default] Pending, Converted, Expired }

impl AbandonedStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Converted => "converted", Self::Expired => "expired" }
    }
}

impl FromStr for AbandonedStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "converted" => Ok(Self::Converted), "expired" => Ok(Self::Expired),
            other => Err(format!("unknown abandoned cart status {other}")),
        }
    }
}

/// Columns needed to rebuild a stored record.
#[derive(Clone, Debug)]
pub struct AbandonedCartRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: Email,
    pub items: Vec<AbandonedLine>,
    pub status: AbandonedStatus,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AbandonedCart {
    pub fn open(user_id: Uuid, user_name: impl Into<String>, user_email: Email, items: Vec<AbandonedLine>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), user_id, user_name: user_name.into(), user_email, items,
            status: AbandonedStatus::Pending, abandoned_at: None, converted_at: None, created_at: now, updated_at: now,
        }
    }

    pub fn restore(r: AbandonedCartRecord) -> Self {
        Self {
            id: r.id, user_id: r.user_id, user_name: r.user_name, user_email: r.user_email, items: r.items,
            status: r.status, abandoned_at: r.abandoned_at, converted_at: r.converted_at,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn user_name(&self) -> &str { &self.user_name }
    pub fn user_email(&self) -> &Email { &self.user_email }
    pub fn items(&self) -> &[AbandonedLine] { &self.items }
    pub fn status(&self) -> AbandonedStatus { self.status }
    pub fn abandoned_at(&self) -> Option<DateTime<Utc>> { self.abandoned_at }
    pub fn converted_at(&self) -> Option<DateTime<Utc>> { self.converted_at }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn total(&self) -> Money {
        self.items.iter().fold(Money::zero(), |acc, l| acc.add(l.price.multiply(l.quantity)))
    }

    /// Replaces the snapshot after the live cart changed; the user is active again.
    pub fn refresh(&mut self, items: Vec<AbandonedLine>) {
        self.items = items;
        self.abandoned_at = None;
        self.updated_at = Utc::now();
    }

    /// Pending, not yet flagged, and untouched since before `idle_cutoff`.
    pub fn is_idle(&self, idle_cutoff: DateTime<Utc>) -> bool {
        self.status == AbandonedStatus::Pending && self.abandoned_at.is_none() && self.updated_at <= idle_cutoff
    }

    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) {
        self.abandoned_at = Some(now);
    }

    /// Expires a pending record flagged abandoned for longer than `window`. Returns whether it changed.
    pub fn expire_if_stale(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.abandoned_at {
            Some(at) if self.status == AbandonedStatus::Pending && at + window <= now => {
                self.status = AbandonedStatus::Expired;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    pub fn mark_converted(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != AbandonedStatus::Pending { return false; }
        self.status = AbandonedStatus::Converted;
        self.converted_at = Some(now);
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> AbandonedCart {
        AbandonedCart::open(Uuid::now_v7(), "Asha", Email::parse("asha@example.com").unwrap(), vec![AbandonedLine {
            product_id: Uuid::now_v7(), variant_id: Uuid::now_v7(), name: "Linen Shirt".into(),
            quantity: 2, price: Money::from_units(900),
        }])
    }

    #[test]
    fn test_lifecycle() {
        let mut c = cart();
        assert_eq!(c.total(), Money::from_units(1800));
        let later = c.updated_at() + Duration::hours(2);
        assert!(c.is_idle(later - Duration::hours(1)));
        c.mark_abandoned(later);
        assert!(!c.is_idle(later));
        assert!(!c.expire_if_stale(later + Duration::days(1), Duration::days(7)));
        assert!(c.expire_if_stale(later + Duration::days(7), Duration::days(7)));
        assert_eq!(c.status(), AbandonedStatus::Expired);
        assert!(!c.mark_converted(later));
    }

    #[test]
    fn test_refresh_clears_abandoned_flag() {
        let mut c = cart();
        c.mark_abandoned(Utc::now());
        c.refresh(vec![]);
        assert!(c.abandoned_at().is_none());
        assert!(c.mark_converted(Utc::now()));
        assert_eq!(c.status(), AbandonedStatus::Converted);
    }
}
