//! Subscription engine: activation on payment confirmation and the expiry
//! sweep.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::DbPool;
use crate::models::{
    now, NewSubscription, Payment, Plan, Subscription, SubscriptionStatus,
};
use crate::services::webhook_dispatcher::{
    subscription_event_data, WebhookDispatcher, EVENT_SUBSCRIPTION_EXPIRED,
};

/// Caller-facing subscription shape with the derived days remaining.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub subscription_id: String,
    pub external_user_id: String,
    pub plan_id: String,
    pub payment_id: Option<String>,
    pub status: String,
    pub starts_at: String,
    pub ends_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

impl SubscriptionView {
    pub fn from_subscription(subscription: &Subscription) -> Self {
        let fmt = |ts: NaiveDateTime| ts.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Self {
            subscription_id: subscription.id.clone(),
            external_user_id: subscription.external_user_id.clone(),
            plan_id: subscription.plan_id.clone(),
            payment_id: subscription.payment_id.clone(),
            status: subscription.status.clone(),
            starts_at: fmt(subscription.starts_at),
            ends_at: subscription.ends_at.map(fmt),
            days_remaining: (subscription.status == SubscriptionStatus::Active.as_str())
                .then(|| days_remaining(subscription.ends_at, now()))
                .flatten(),
        }
    }
}

pub struct SubscriptionEngine {
    pool: DbPool,
    webhooks: Arc<WebhookDispatcher>,
}

impl SubscriptionEngine {
    pub fn new(pool: DbPool, webhooks: Arc<WebhookDispatcher>) -> Self {
        Self { pool, webhooks }
    }

    /// Activate a subscription for a confirmed payment. Runs on the caller's
    /// connection so the payment engine can keep it inside the confirmation
    /// transaction: any prior active subscription flips to `expired` and the
    /// new one is created `active`, atomically with the payment update.
    pub fn activate_within(
        conn: &mut SqliteConnection,
        payment: &Payment,
        plan: &Plan,
    ) -> Result<Subscription> {
        let superseded =
            Subscription::expire_active_for_user(conn, &payment.tenant_id, &payment.external_user_id)?;
        if superseded > 0 {
            info!(
                tenant_id = %payment.tenant_id,
                user = %payment.external_user_id,
                superseded,
                "prior active subscription superseded"
            );
        }

        let starts_at = now();
        let ends_at = plan
            .period_days
            .map(|days| starts_at + chrono::Duration::days(days as i64));

        Subscription::create(
            conn,
            NewSubscription {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: payment.tenant_id.clone(),
                external_user_id: payment.external_user_id.clone(),
                plan_id: plan.id.clone(),
                payment_id: Some(payment.id.clone()),
                status: SubscriptionStatus::Active.as_str().to_string(),
                starts_at,
                ends_at,
                created_at: starts_at,
                updated_at: starts_at,
            },
        )
    }

    pub async fn current(&self, tenant: &str, user: &str) -> Result<Option<SubscriptionView>> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        let active = Subscription::active_for_user(&mut conn, tenant, user)?;
        Ok(active.as_ref().map(SubscriptionView::from_subscription))
    }

    pub async fn is_active(&self, tenant: &str, user: &str) -> Result<bool> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        Ok(Subscription::active_for_user(&mut conn, tenant, user)?.is_some())
    }

    pub async fn history(&self, tenant: &str, user: &str) -> Result<Vec<Subscription>> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        Subscription::history(&mut conn, tenant, user)
    }

    /// Expire every active subscription whose end date has passed, emitting
    /// `subscription.expired` per row. Returns the count.
    pub async fn expire_due(&self) -> Result<usize> {
        let due = {
            let mut conn = self.pool.get().context("Failed to get DB connection")?;
            Subscription::expired_due(&mut conn, now())?
        };

        if due.is_empty() {
            return Ok(0);
        }

        info!(count = due.len(), "expiring due subscriptions");

        for subscription in &due {
            {
                let mut conn = self.pool.get().context("Failed to get DB connection")?;
                Subscription::set_status(&mut conn, &subscription.id, SubscriptionStatus::Expired)?;
            }

            let mut expired = subscription.clone();
            expired.status = SubscriptionStatus::Expired.as_str().to_string();
            if let Err(e) = self
                .webhooks
                .enqueue(
                    &subscription.tenant_id,
                    EVENT_SUBSCRIPTION_EXPIRED,
                    subscription_event_data(&expired),
                )
                .await
            {
                warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "failed to emit subscription.expired"
                );
            }
        }

        Ok(due.len())
    }
}

/// Whole days until `ends_at`, rounded up, clamped at zero. None for
/// lifetime grants.
pub fn days_remaining(ends_at: Option<NaiveDateTime>, at: NaiveDateTime) -> Option<i64> {
    ends_at.map(|end| {
        let seconds = (end - at).num_seconds();
        if seconds <= 0 {
            0
        } else {
            (seconds + 86_399) / 86_400
        }
    })
}
