//! Payment model and its status state machine.
//!
//! Status DFA:
//!
//! ```text
//!   pending ──confirm_sent──► awaiting_confirmation ──monitor──► confirmed
//!      │ │                          │          │
//!      │ └──cancel──► cancelled     │          └──retries exhausted──► failed
//!      └──expired────► expired ◄────┘
//! ```
//!
//! Transitions not in the DFA are illegal and rejected by the engine.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::schema::payments;

/// Minutes a payment stays payable after creation.
pub const PAYMENT_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    AwaitingConfirmation,
    Confirmed,
    Expired,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "awaiting_confirmation" => Some(Self::AwaitingConfirmation),
            "confirmed" => Some(Self::Confirmed),
            "expired" => Some(Self::Expired),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Expired | Self::Failed | Self::Cancelled
        )
    }

    /// Blocks a new payment for the same user while set (invariant: one
    /// in-flight payment per user).
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::AwaitingConfirmation)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, AwaitingConfirmation)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (AwaitingConfirmation, Confirmed)
                | (AwaitingConfirmation, Expired)
                | (AwaitingConfirmation, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub external_user_id: String,
    pub plan_id: String,
    /// Canonical decimal string; equals the plan price at creation time.
    pub amount: String,
    pub token: String,
    pub network: String,
    /// `iv:tag:ct` AES-256-GCM envelope over the normalized sender address.
    pub sender_address_encrypted: String,
    /// Deterministic HMAC-SHA256 over the lower-cased sender address.
    pub sender_address_hmac: String,
    pub receiver_address: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub confirmations: i32,
    pub tx_confirmed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub id: String,
    pub tenant_id: String,
    pub external_user_id: String,
    pub plan_id: String,
    pub amount: String,
    pub token: String,
    pub network: String,
    pub sender_address_encrypted: String,
    pub sender_address_hmac: String,
    pub receiver_address: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Payment {
    pub fn status_enum(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.status).unwrap_or(PaymentStatus::Failed)
    }

    pub fn amount_decimal(&self) -> Result<Decimal> {
        self.amount
            .parse::<Decimal>()
            .with_context(|| format!("corrupt amount on payment {}: {}", self.id, self.amount))
    }

    pub fn find_by_id(conn: &mut SqliteConnection, payment_id: &str) -> Result<Option<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .find(payment_id)
            .first::<Payment>(conn)
            .optional()
            .context("Failed to load payment")
    }

    pub fn find_for_tenant(
        conn: &mut SqliteConnection,
        payment_id: &str,
        tenant: &str,
    ) -> Result<Option<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .find(payment_id)
            .filter(tenant_id.eq(tenant))
            .first::<Payment>(conn)
            .optional()
            .context("Failed to load payment for tenant")
    }

    /// The user's blocking in-flight payment, if any (invariant I-single).
    pub fn pending_for_user(
        conn: &mut SqliteConnection,
        tenant: &str,
        user: &str,
    ) -> Result<Option<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .filter(tenant_id.eq(tenant))
            .filter(external_user_id.eq(user))
            .filter(status.eq_any(["pending", "awaiting_confirmation"]))
            .first::<Payment>(conn)
            .optional()
            .context("Failed to query in-flight payment")
    }

    /// In-flight payments whose deadline has passed.
    pub fn expired_due(
        conn: &mut SqliteConnection,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .filter(status.eq_any(["pending", "awaiting_confirmation"]))
            .filter(expires_at.le(cutoff))
            .load::<Payment>(conn)
            .context("Failed to query expired payments")
    }

    pub fn awaiting_confirmation(conn: &mut SqliteConnection) -> Result<Vec<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .filter(status.eq("awaiting_confirmation"))
            .load::<Payment>(conn)
            .context("Failed to query awaiting-confirmation payments")
    }

    pub fn find_by_tx_hash(conn: &mut SqliteConnection, hash: &str) -> Result<Option<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .filter(tx_hash.eq(hash))
            .first::<Payment>(conn)
            .optional()
            .context("Failed to query payment by tx hash")
    }

    pub fn history(
        conn: &mut SqliteConnection,
        tenant: &str,
        user: &str,
        limit: i64,
    ) -> Result<Vec<Payment>> {
        use crate::schema::payments::dsl::*;
        payments
            .filter(tenant_id.eq(tenant))
            .filter(external_user_id.eq(user))
            .order(created_at.desc())
            .limit(limit)
            .load::<Payment>(conn)
            .context("Failed to load payment history")
    }

    pub fn create(conn: &mut SqliteConnection, row: NewPayment) -> Result<Payment> {
        diesel::insert_into(payments::table)
            .values(&row)
            .execute(conn)
            .context("Failed to insert payment")?;
        Self::find_by_id(conn, &row.id)?.context("payment missing immediately after insert")
    }

    /// Plain status write; callers are responsible for DFA legality.
    pub fn set_status(
        conn: &mut SqliteConnection,
        payment_id: &str,
        next: PaymentStatus,
    ) -> Result<()> {
        use crate::schema::payments::dsl::*;
        diesel::update(payments.find(payment_id))
            .set((status.eq(next.as_str()), updated_at.eq(super::now())))
            .execute(conn)
            .context("Failed to update payment status")?;
        Ok(())
    }

    pub fn set_failed(
        conn: &mut SqliteConnection,
        payment_id: &str,
        message: &str,
    ) -> Result<()> {
        use crate::schema::payments::dsl::*;
        diesel::update(payments.find(payment_id))
            .set((
                status.eq(PaymentStatus::Failed.as_str()),
                error_message.eq(message),
                updated_at.eq(super::now()),
            ))
            .execute(conn)
            .context("Failed to mark payment failed")?;
        Ok(())
    }

    pub fn set_retry_count(
        conn: &mut SqliteConnection,
        payment_id: &str,
        count: i32,
    ) -> Result<()> {
        use crate::schema::payments::dsl::*;
        diesel::update(payments.find(payment_id))
            .set((retry_count.eq(count), updated_at.eq(super::now())))
            .execute(conn)
            .context("Failed to update payment retry count")?;
        Ok(())
    }

    /// Conditional confirmation write. Only succeeds while the row is still
    /// `awaiting_confirmation`; the unique index on `tx_hash` is the
    /// double-spend backstop. Returns the number of rows updated (0 or 1).
    pub fn confirm(
        conn: &mut SqliteConnection,
        payment_id: &str,
        hash: &str,
        confirmation_count: i32,
        confirmed_at: NaiveDateTime,
    ) -> std::result::Result<usize, diesel::result::Error> {
        use crate::schema::payments::dsl::*;
        diesel::update(
            payments
                .find(payment_id)
                .filter(status.eq(PaymentStatus::AwaitingConfirmation.as_str())),
        )
        .set((
            status.eq(PaymentStatus::Confirmed.as_str()),
            tx_hash.eq(hash),
            confirmations.eq(confirmation_count),
            tx_confirmed_at.eq(confirmed_at),
            updated_at.eq(super::now()),
        ))
        .execute(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PaymentStatus::Confirmed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::AwaitingConfirmation.is_terminal());
    }

    #[test]
    fn dfa_allows_only_specified_transitions() {
        use PaymentStatus::*;
        let all = [
            Pending,
            AwaitingConfirmation,
            Confirmed,
            Expired,
            Failed,
            Cancelled,
        ];

        let legal = [
            (Pending, AwaitingConfirmation),
            (Pending, Cancelled),
            (Pending, Expired),
            (AwaitingConfirmation, Confirmed),
            (AwaitingConfirmation, Expired),
            (AwaitingConfirmation, Failed),
        ];

        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn no_transition_leaves_terminal_states() {
        use PaymentStatus::*;
        for terminal in [Confirmed, Expired, Failed, Cancelled] {
            for to in [
                Pending,
                AwaitingConfirmation,
                Confirmed,
                Expired,
                Failed,
                Cancelled,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::AwaitingConfirmation,
            PaymentStatus::Confirmed,
            PaymentStatus::Expired,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
    }
}
