//! Persistent data model. Each entity carries its own diesel query
//! operations on `&mut SqliteConnection`; services compose them inside
//! transactions where invariants demand atomicity.

pub mod ofac;
pub mod payment;
pub mod plan;
pub mod subscription;
pub mod tenant;
pub mod webhook_log;

pub use ofac::{NewOfacSanctionedAddress, NewOfacUpdateLog, OfacSanctionedAddress, OfacUpdateLog};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use plan::{NewPlan, Plan};
pub use subscription::{NewSubscription, Subscription, SubscriptionStatus};
pub use tenant::{NewTenant, Tenant, DEFAULT_TENANT_ID};
pub use webhook_log::{NewWebhookLog, WebhookLog, WEBHOOK_RETRY_DELAYS};

use chrono::{NaiveDateTime, Timelike};

/// Current UTC timestamp truncated to whole seconds, the precision every
/// table stores and compares at.
pub fn now() -> NaiveDateTime {
    let now = chrono::Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}
