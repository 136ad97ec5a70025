//! Webhook delivery log with bounded exponential retry.
//!
//! Retry ladder after a failed attempt with prior `retry_count = n`:
//! - `n + 1 >= 4`: terminally failed, no further retries
//! - otherwise: `retry_count = n + 1`, `next_retry_at = now + DELAYS[n]`
//!
//! So the waits are 60s, 300s, 900s between the four total attempts.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::webhook_logs;

/// Retry delays in seconds.
pub const WEBHOOK_RETRY_DELAYS: [i64; 4] = [60, 300, 900, 3600];

/// Response bodies are truncated to this many bytes before storage.
pub const MAX_RESPONSE_BODY_BYTES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = webhook_logs)]
pub struct WebhookLog {
    pub id: String,
    pub tenant_id: String,
    pub event: String,
    /// The exact serialized payload that is signed and posted.
    pub payload: String,
    pub url: String,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub success: bool,
    pub retry_count: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_logs)]
pub struct NewWebhookLog {
    pub id: String,
    pub tenant_id: String,
    pub event: String,
    pub payload: String,
    pub url: String,
    pub success: bool,
    pub retry_count: i32,
    pub created_at: NaiveDateTime,
}

impl NewWebhookLog {
    pub fn new(tenant_id: String, event: String, payload: String, url: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            event,
            payload,
            url,
            success: false,
            retry_count: 0,
            created_at: super::now(),
        }
    }
}

impl WebhookLog {
    pub fn find_by_id(conn: &mut SqliteConnection, log_id: &str) -> Result<Option<WebhookLog>> {
        use crate::schema::webhook_logs::dsl::*;
        webhook_logs
            .find(log_id)
            .first::<WebhookLog>(conn)
            .optional()
            .context("Failed to load webhook log")
    }

    pub fn create(conn: &mut SqliteConnection, row: NewWebhookLog) -> Result<WebhookLog> {
        diesel::insert_into(webhook_logs::table)
            .values(&row)
            .execute(conn)
            .context("Failed to insert webhook log")?;
        Self::find_by_id(conn, &row.id)?
            .context("webhook log missing immediately after insert")
    }

    /// Unsuccessful logs with retry budget left whose retry time is unset or
    /// due.
    pub fn pending_retries(
        conn: &mut SqliteConnection,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<WebhookLog>> {
        use crate::schema::webhook_logs::dsl::*;
        webhook_logs
            .filter(success.eq(false))
            .filter(retry_count.lt(WEBHOOK_RETRY_DELAYS.len() as i32))
            .filter(next_retry_at.is_null().or(next_retry_at.le(cutoff)))
            .order(created_at.asc())
            .load::<WebhookLog>(conn)
            .context("Failed to query pending webhook retries")
    }

    pub fn mark_success(
        conn: &mut SqliteConnection,
        log_id: &str,
        status_code: i32,
        body: Option<&str>,
    ) -> Result<()> {
        use crate::schema::webhook_logs::dsl::*;
        diesel::update(webhook_logs.find(log_id))
            .set((
                success.eq(true),
                response_status.eq(status_code),
                response_body.eq(body.map(truncate_body)),
                next_retry_at.eq(None::<NaiveDateTime>),
            ))
            .execute(conn)
            .context("Failed to mark webhook delivery successful")?;
        Ok(())
    }

    /// Record a failed attempt and schedule the next retry, or stop when the
    /// ladder is exhausted. Returns true when the failure was final.
    pub fn mark_failed(
        conn: &mut SqliteConnection,
        log_id: &str,
        status_code: Option<i32>,
        body: Option<&str>,
    ) -> Result<bool> {
        use crate::schema::webhook_logs::dsl::*;

        let current: WebhookLog = webhook_logs
            .find(log_id)
            .first(conn)
            .context("Failed to reload webhook log for failure update")?;

        let attempts = current.retry_count + 1;
        let is_final = attempts >= WEBHOOK_RETRY_DELAYS.len() as i32;

        if is_final {
            diesel::update(webhook_logs.find(log_id))
                .set((
                    response_status.eq(status_code),
                    response_body.eq(body.map(truncate_body)),
                    retry_count.eq(attempts),
                    next_retry_at.eq(None::<NaiveDateTime>),
                ))
                .execute(conn)
                .context("Failed to mark webhook delivery terminally failed")?;
        } else {
            let delay = WEBHOOK_RETRY_DELAYS[current.retry_count as usize];
            let retry_at = super::now() + chrono::Duration::seconds(delay);
            diesel::update(webhook_logs.find(log_id))
                .set((
                    response_status.eq(status_code),
                    response_body.eq(body.map(truncate_body)),
                    retry_count.eq(attempts),
                    next_retry_at.eq(retry_at),
                ))
                .execute(conn)
                .context("Failed to schedule webhook retry")?;
        }

        Ok(is_final)
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_RESPONSE_BODY_BYTES {
        return body.to_string();
    }
    // Cut on a char boundary at or below the byte cap.
    let mut end = MAX_RESPONSE_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
