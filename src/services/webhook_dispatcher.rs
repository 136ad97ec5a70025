//! Webhook delivery engine.
//!
//! At-least-once delivery of signed event payloads:
//! 1. `enqueue` builds the payload, writes a log row, and fires the first
//!    attempt in the background.
//! 2. Each attempt POSTs the exact logged payload with
//!    `X-Webhook-Signature: hex(HMAC-SHA256(webhook_secret, payload))`.
//! 3. Failures climb the retry ladder (60s, 300s, 900s waits) until success
//!    or exhaustion; `retry_pending` is driven by the scheduler.
//!
//! Consumers must be idempotent on paymentId / subscriptionId.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::db::DbPool;
use crate::models::{NewWebhookLog, Payment, Subscription, Tenant, WebhookLog};

/// Per-attempt delivery timeout.
const DELIVERY_TIMEOUT_SECS: u64 = 10;

pub const EVENT_PAYMENT_CREATED: &str = "payment.created";
pub const EVENT_PAYMENT_CONFIRMED: &str = "payment.confirmed";
pub const EVENT_PAYMENT_EXPIRED: &str = "payment.expired";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";
pub const EVENT_SUBSCRIPTION_ACTIVATED: &str = "subscription.activated";
pub const EVENT_SUBSCRIPTION_EXPIRED: &str = "subscription.expired";

#[derive(Clone)]
pub struct WebhookDispatcher {
    pool: DbPool,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(pool: DbPool) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .user_agent("stablegate-webhook/1.0")
            .build()
            .expect("Failed to build webhook HTTP client");
        Self { pool, client }
    }

    /// Record an event for a tenant and attempt delivery in the background.
    /// A tenant without a webhook URL is a silent no-op.
    pub async fn enqueue(
        &self,
        tenant_id: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;

        let tenant = Tenant::find_by_id(&mut conn, tenant_id)?
            .with_context(|| format!("unknown tenant {tenant_id}"))?;

        let Some(url) = tenant.webhook_url.clone() else {
            debug!(tenant_id, event, "tenant has no webhook URL, skipping event");
            return Ok(());
        };

        let payload = serde_json::json!({
            "event": event,
            "timestamp": iso_timestamp(),
            "data": data,
        });
        let payload_string =
            serde_json::to_string(&payload).context("Failed to serialize webhook payload")?;

        let log = WebhookLog::create(
            &mut conn,
            NewWebhookLog::new(
                tenant_id.to_string(),
                event.to_string(),
                payload_string,
                url,
            ),
        )?;
        drop(conn);

        info!(tenant_id, event, log_id = %log.id, "webhook event enqueued");

        // First attempt runs in the background; the retry sweep covers any
        // window where this task dies before recording an outcome.
        let dispatcher = self.clone();
        let secret = tenant.webhook_secret.unwrap_or_default();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver_once(&log, &secret).await {
                error!(log_id = %log.id, error = %e, "initial webhook delivery errored");
            }
        });

        Ok(())
    }

    /// One delivery attempt for a log row. Returns true on 2xx.
    pub async fn deliver_once(&self, log: &WebhookLog, secret: &str) -> Result<bool> {
        let signature = sign_payload(secret, &log.payload);

        let result = self
            .client
            .post(&log.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .body(log.payload.clone())
            .send()
            .await;

        let mut conn = self.pool.get().context("Failed to get DB connection")?;

        match result {
            Ok(response) => {
                let status = response.status().as_u16() as i32;
                let body = response.text().await.unwrap_or_default();

                if (200..300).contains(&status) {
                    WebhookLog::mark_success(&mut conn, &log.id, status, Some(&body))?;
                    info!(log_id = %log.id, status, "webhook delivered");
                    Ok(true)
                } else {
                    let is_final =
                        WebhookLog::mark_failed(&mut conn, &log.id, Some(status), Some(&body))?;
                    warn!(log_id = %log.id, status, is_final, "webhook delivery failed");
                    Ok(false)
                }
            }
            Err(e) => {
                let message = e.to_string();
                let is_final =
                    WebhookLog::mark_failed(&mut conn, &log.id, None, Some(&message))?;
                warn!(log_id = %log.id, error = %message, is_final, "webhook delivery transport error");
                Ok(false)
            }
        }
    }

    /// Deliver every due unsuccessful log once. Returns how many attempts
    /// were made.
    pub async fn retry_pending(&self) -> Result<usize> {
        let due = {
            let mut conn = self.pool.get().context("Failed to get DB connection")?;
            WebhookLog::pending_retries(&mut conn, crate::models::now())?
        };

        if due.is_empty() {
            return Ok(0);
        }

        info!(count = due.len(), "processing pending webhook retries");

        let mut attempted = 0;
        for log in due {
            let secret = {
                let mut conn = self.pool.get().context("Failed to get DB connection")?;
                Tenant::find_by_id(&mut conn, &log.tenant_id)?
                    .and_then(|t| t.webhook_secret)
                    .unwrap_or_default()
            };

            if let Err(e) = self.deliver_once(&log, &secret).await {
                error!(log_id = %log.id, error = %e, "webhook retry errored");
            }
            attempted += 1;
        }

        Ok(attempted)
    }
}

/// `hex(HMAC-SHA256(secret, payload))`, the `X-Webhook-Signature` value.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn iso_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `data` fields for payment lifecycle events.
pub fn payment_event_data(payment: &Payment) -> serde_json::Value {
    serde_json::json!({
        "paymentId": payment.id,
        "externalUserId": payment.external_user_id,
        "planId": payment.plan_id,
        "amount": payment.amount,
        "token": payment.token,
        "network": payment.network,
        "status": payment.status,
        "expiresAt": format_ts(payment.expires_at),
    })
}

/// `data` fields for `payment.confirmed`.
pub fn payment_confirmed_data(payment: &Payment) -> serde_json::Value {
    serde_json::json!({
        "paymentId": payment.id,
        "externalUserId": payment.external_user_id,
        "planId": payment.plan_id,
        "amount": payment.amount,
        "token": payment.token,
        "network": payment.network,
        "txHash": payment.tx_hash,
        "confirmations": payment.confirmations,
        "confirmedAt": payment.tx_confirmed_at.map(format_ts),
    })
}

/// `data` fields for `payment.failed` (the expired event reuses
/// `payment_event_data`).
pub fn payment_failed_data(payment: &Payment, error: &str) -> serde_json::Value {
    let mut data = payment_event_data(payment);
    data["error"] = serde_json::Value::String(error.to_string());
    data
}

/// `data` fields for subscription lifecycle events.
pub fn subscription_event_data(subscription: &Subscription) -> serde_json::Value {
    serde_json::json!({
        "subscriptionId": subscription.id,
        "externalUserId": subscription.external_user_id,
        "planId": subscription.plan_id,
        "paymentId": subscription.payment_id,
        "startsAt": format_ts(subscription.starts_at),
        "endsAt": subscription.ends_at.map(format_ts),
    })
}

fn format_ts(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex_sha256() {
        let a = sign_payload("secret", r#"{"event":"payment.created"}"#);
        let b = sign_payload("secret", r#"{"event":"payment.created"}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        // A different secret or payload changes the signature.
        assert_ne!(a, sign_payload("other", r#"{"event":"payment.created"}"#));
        assert_ne!(a, sign_payload("secret", r#"{"event":"payment.expired"}"#));
    }

    #[test]
    fn payload_envelope_shape() {
        let payload = serde_json::json!({
            "event": "payment.created",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": { "paymentId": "p1" },
        });
        let s = serde_json::to_string(&payload).unwrap();
        // Deterministic serialization: same value, same string.
        assert_eq!(s, serde_json::to_string(&payload).unwrap());
        assert!(s.contains(r#""event":"payment.created""#));
    }
}
