//! Subscription model: a time-bounded grant derived from a confirmed
//! payment. At most one subscription per (tenant, user) is active.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::subscriptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = subscriptions)]
pub struct Subscription {
    pub id: String,
    pub tenant_id: String,
    pub external_user_id: String,
    pub plan_id: String,
    /// The confirmed payment that triggered this grant.
    pub payment_id: Option<String>,
    pub status: String,
    pub starts_at: NaiveDateTime,
    /// None means a lifetime grant (plan without a period).
    pub ends_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscription {
    pub id: String,
    pub tenant_id: String,
    pub external_user_id: String,
    pub plan_id: String,
    pub payment_id: Option<String>,
    pub status: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Subscription {
    pub fn find_by_id(
        conn: &mut SqliteConnection,
        subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        use crate::schema::subscriptions::dsl::*;
        subscriptions
            .find(subscription_id)
            .first::<Subscription>(conn)
            .optional()
            .context("Failed to load subscription")
    }

    pub fn active_for_user(
        conn: &mut SqliteConnection,
        tenant: &str,
        user: &str,
    ) -> Result<Option<Subscription>> {
        use crate::schema::subscriptions::dsl::*;
        subscriptions
            .filter(tenant_id.eq(tenant))
            .filter(external_user_id.eq(user))
            .filter(status.eq(SubscriptionStatus::Active.as_str()))
            .order(starts_at.desc())
            .first::<Subscription>(conn)
            .optional()
            .context("Failed to query active subscription")
    }

    pub fn history(
        conn: &mut SqliteConnection,
        tenant: &str,
        user: &str,
    ) -> Result<Vec<Subscription>> {
        use crate::schema::subscriptions::dsl::*;
        subscriptions
            .filter(tenant_id.eq(tenant))
            .filter(external_user_id.eq(user))
            .order(starts_at.desc())
            .load::<Subscription>(conn)
            .context("Failed to load subscription history")
    }

    /// Active subscriptions whose end date has passed.
    pub fn expired_due(
        conn: &mut SqliteConnection,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<Subscription>> {
        use crate::schema::subscriptions::dsl::*;
        subscriptions
            .filter(status.eq(SubscriptionStatus::Active.as_str()))
            .filter(ends_at.is_not_null())
            .filter(ends_at.le(cutoff))
            .load::<Subscription>(conn)
            .context("Failed to query expired subscriptions")
    }

    pub fn create(conn: &mut SqliteConnection, row: NewSubscription) -> Result<Subscription> {
        diesel::insert_into(subscriptions::table)
            .values(&row)
            .execute(conn)
            .context("Failed to insert subscription")?;
        Self::find_by_id(conn, &row.id)?
            .context("subscription missing immediately after insert")
    }

    pub fn set_status(
        conn: &mut SqliteConnection,
        subscription_id: &str,
        next: SubscriptionStatus,
    ) -> Result<()> {
        use crate::schema::subscriptions::dsl::*;
        diesel::update(subscriptions.find(subscription_id))
            .set((status.eq(next.as_str()), updated_at.eq(super::now())))
            .execute(conn)
            .context("Failed to update subscription status")?;
        Ok(())
    }

    /// Move every currently-active subscription for the user to `expired`.
    /// Called inside the activation transaction so a new grant supersedes
    /// the old one atomically.
    pub fn expire_active_for_user(
        conn: &mut SqliteConnection,
        tenant: &str,
        user: &str,
    ) -> Result<usize> {
        use crate::schema::subscriptions::dsl::*;
        diesel::update(
            subscriptions
                .filter(tenant_id.eq(tenant))
                .filter(external_user_id.eq(user))
                .filter(status.eq(SubscriptionStatus::Active.as_str())),
        )
        .set((
            status.eq(SubscriptionStatus::Expired.as_str()),
            updated_at.eq(super::now()),
        ))
        .execute(conn)
        .context("Failed to expire prior active subscriptions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("paused"), None);
    }
}
