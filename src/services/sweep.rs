//! Periodic abandoned-cart sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::AbandonedCartConfig;
use crate::error::AppResult;
use crate::notify::{Email, Notifier};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Newly flagged abandoned; each got a reminder.
    pub marked: usize,
    pub expired: usize,
}

pub struct AbandonedCartSweeper {
    store: Arc<dyn Store>,
    notifier: Notifier,
    idle: Duration,
    expire_after: Duration,
}

impl AbandonedCartSweeper {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier, config: &AbandonedCartConfig) -> Self {
        Self {
            store,
            notifier,
            idle: Duration::minutes(config.idle_minutes),
            expire_after: Duration::days(config.expire_days),
        }
    }

    /// Flags idle pending carts as abandoned and expires stale ones.
    /// Reminder mail goes out only after the changes are committed.
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let mut tx = self.store.begin().await?;
        let mut report = SweepReport::default();
        let mut reminders = Vec::new();

        for mut cart in tx.pending_abandoned_carts().await? {
            if cart.is_idle(now - self.idle) {
                cart.mark_abandoned(now);
                tx.save_abandoned_cart(&cart).await?;
                reminders.push(Email::abandoned_cart_reminder(&cart));
                report.marked += 1;
            } else if cart.expire_if_stale(now, self.expire_after) {
                tx.save_abandoned_cart(&cart).await?;
                report.expired += 1;
            }
        }
        tx.commit().await?;

        for email in reminders {
            self.notifier.dispatch(email);
        }
        if report.marked > 0 || report.expired > 0 {
            tracing::info!(marked = report.marked, expired = report.expired, "Abandoned cart sweep finished");
        } else {
            tracing::debug!("Abandoned cart sweep found nothing to do");
        }
        Ok(report)
    }
}
