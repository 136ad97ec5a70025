//! Payment engine: the per-payment lifecycle with strict transition rules,
//! the OFAC screening gate, and the double-spend guard.
//!
//! Status DFA (see `models::payment`): `pending` ->
//! `awaiting_confirmation` -> `confirmed`, with `cancelled`, `expired` and
//! `failed` as the other terminals. Every confirmation runs through
//! `handle_confirmed_transaction`, one atomic unit that marks the payment
//! confirmed and activates the subscription, or does neither.

use anyhow::Context;
use chrono::Duration;
use diesel::Connection;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, Network, Token};
use crate::crypto::{validate_address, AddressCipher};
use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::payment::PAYMENT_TTL_MINUTES;
use crate::models::{
    now, NewPayment, NewPlan, Payment, PaymentStatus, Plan, Subscription, Tenant,
};
use crate::services::monitor::MonitorQueue;
use crate::services::ofac::OfacService;
use crate::services::subscription::SubscriptionEngine;
use crate::services::webhook_dispatcher::{
    payment_confirmed_data, payment_event_data, subscription_event_data, WebhookDispatcher,
    EVENT_PAYMENT_CONFIRMED, EVENT_PAYMENT_CREATED, EVENT_PAYMENT_EXPIRED,
    EVENT_SUBSCRIPTION_ACTIVATED,
};

/// Maximum rows a history query returns.
pub const HISTORY_LIMIT: i64 = 50;

/// Specification for a new plan.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSpec {
    pub plan_key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: String,
    pub currency: String,
    #[serde(default)]
    pub period_days: Option<i32>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Partial plan update; absent fields are left untouched.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub period_days: Option<i32>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Placement instructions returned from `initiate_payment`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub payment_id: String,
    pub receiver_address: String,
    pub amount: String,
    pub token: String,
    pub network: String,
    pub expires_at: String,
    /// Seconds until the payment window closes.
    pub expires_in: i64,
    pub qr_code_data: String,
    pub instructions: Vec<String>,
}

/// Caller-facing payment view; never exposes the encrypted sender columns.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub payment_id: String,
    pub status: String,
    pub plan_id: String,
    pub amount: String,
    pub token: String,
    pub network: String,
    pub receiver_address: String,
    pub created_at: String,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PaymentView {
    pub fn from_payment(payment: &Payment) -> Self {
        let status = payment.status_enum();
        let expires_in = status.is_in_flight().then(|| {
            let left = (payment.expires_at - now()).num_seconds();
            left.max(0)
        });
        let confirmed = status == PaymentStatus::Confirmed;
        let explorer_url = if confirmed {
            payment.tx_hash.as_deref().and_then(|hash| {
                Network::parse(&payment.network)
                    .map(|n| crate::config::ChainConfig::explorer_tx_url(n, hash))
            })
        } else {
            None
        };

        Self {
            payment_id: payment.id.clone(),
            status: payment.status.clone(),
            plan_id: payment.plan_id.clone(),
            amount: payment.amount.clone(),
            token: payment.token.clone(),
            network: payment.network.clone(),
            receiver_address: payment.receiver_address.clone(),
            created_at: fmt_ts(payment.created_at),
            expires_at: fmt_ts(payment.expires_at),
            expires_in,
            tx_hash: confirmed.then(|| payment.tx_hash.clone()).flatten(),
            explorer_url,
            confirmations: confirmed.then_some(payment.confirmations),
            confirmed_at: payment.tx_confirmed_at.map(fmt_ts),
            error_message: (status == PaymentStatus::Failed)
                .then(|| payment.error_message.clone())
                .flatten(),
        }
    }
}

fn fmt_ts(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub struct PaymentEngine {
    pool: DbPool,
    cipher: Arc<AddressCipher>,
    ofac: Arc<OfacService>,
    webhooks: Arc<WebhookDispatcher>,
    queue: MonitorQueue,
    config: Arc<AppConfig>,
}

impl PaymentEngine {
    pub fn new(
        pool: DbPool,
        cipher: Arc<AddressCipher>,
        ofac: Arc<OfacService>,
        webhooks: Arc<WebhookDispatcher>,
        queue: MonitorQueue,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            pool,
            cipher,
            ofac,
            webhooks,
            queue,
            config,
        }
    }

    // -----------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------

    pub async fn create_plan(&self, tenant_id: &str, spec: PlanSpec) -> Result<Plan, ApiError> {
        let price = parse_price(&spec.price)?;
        let currency = Token::parse(&spec.currency).ok_or_else(|| {
            ApiError::Validation(format!("unsupported currency: {}", spec.currency))
        })?;
        if spec.plan_key.trim().is_empty() {
            return Err(ApiError::Validation("planKey must not be empty".into()));
        }
        if matches!(spec.period_days, Some(days) if days <= 0) {
            return Err(ApiError::Validation(
                "periodDays must be a positive integer".into(),
            ));
        }

        let mut conn = self.conn()?;
        self.require_active_tenant(&mut conn, tenant_id)?;

        if Plan::find_by_key(&mut conn, tenant_id, spec.plan_key.trim())
            .map_err(ApiError::Internal)?
            .is_some()
        {
            return Err(ApiError::InvalidPlan(format!(
                "plan_key '{}' already exists: unique (tenant, plan_key)",
                spec.plan_key.trim()
            )));
        }

        let ts = now();
        let plan = Plan::create(
            &mut conn,
            NewPlan {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                plan_key: spec.plan_key.trim().to_string(),
                name: spec.name,
                description: spec.description,
                price: price.normalize().to_string(),
                currency: currency.as_str().to_string(),
                period_days: spec.period_days,
                features: serde_json::to_string(&spec.features)
                    .unwrap_or_else(|_| "[]".to_string()),
                is_active: true,
                created_at: ts,
                updated_at: ts,
            },
        )
        .map_err(ApiError::Internal)?;

        info!(tenant_id, plan_id = %plan.id, plan_key = %plan.plan_key, "plan created");
        Ok(plan)
    }

    pub async fn update_plan(
        &self,
        tenant_id: &str,
        plan_id: &str,
        update: PlanUpdate,
    ) -> Result<Plan, ApiError> {
        let mut conn = self.conn()?;
        let existing = Plan::find_for_tenant(&mut conn, plan_id, tenant_id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::NotFound("plan not found".into()))?;

        let new_price = match &update.price {
            Some(p) => Some(parse_price(p)?.normalize().to_string()),
            None => None,
        };
        if matches!(update.period_days, Some(days) if days <= 0) {
            return Err(ApiError::Validation(
                "periodDays must be a positive integer".into(),
            ));
        }

        {
            use crate::schema::plans::dsl::*;
            use diesel::prelude::*;

            diesel::update(plans.find(&existing.id))
                .set((
                    name.eq(update.name.unwrap_or(existing.name)),
                    description.eq(update.description.or(existing.description)),
                    price.eq(new_price.unwrap_or(existing.price)),
                    period_days.eq(update.period_days.or(existing.period_days)),
                    features.eq(update
                        .features
                        .map(|f| serde_json::to_string(&f).unwrap_or_else(|_| "[]".to_string()))
                        .unwrap_or(existing.features)),
                    is_active.eq(update.is_active.unwrap_or(existing.is_active)),
                    updated_at.eq(now()),
                ))
                .execute(&mut conn)
                .map_err(|e| ApiError::Internal(e.into()))?;
        }

        Plan::find_by_id(&mut conn, &existing.id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("plan vanished during update")))
    }

    pub async fn list_plans(&self, tenant_id: &str) -> Result<Vec<Plan>, ApiError> {
        let mut conn = self.conn()?;
        Plan::list_active(&mut conn, tenant_id).map_err(ApiError::Internal)
    }

    // -----------------------------------------------------------------
    // Payment lifecycle
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn initiate_payment(
        &self,
        tenant_id: &str,
        external_user_id: &str,
        plan_id: &str,
        network_raw: &str,
        token_raw: &str,
        sender_address: &str,
    ) -> Result<Placement, ApiError> {
        if external_user_id.trim().is_empty() {
            return Err(ApiError::Validation("externalUserId must not be empty".into()));
        }
        let network = Network::parse(network_raw).ok_or_else(|| {
            ApiError::Validation(format!("unsupported network: {network_raw}"))
        })?;
        let token = Token::parse(token_raw)
            .ok_or_else(|| ApiError::Validation(format!("unsupported token: {token_raw}")))?;

        let normalized = validate_address(network, sender_address)
            .map_err(|e| ApiError::InvalidAddress(e.to_string()))?;

        let (tenant, plan) = {
            let mut conn = self.conn()?;
            let tenant = self.require_active_tenant(&mut conn, tenant_id)?;
            let plan = Plan::find_for_tenant(&mut conn, plan_id, tenant_id)
                .map_err(ApiError::Internal)?
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    ApiError::InvalidPlan(format!("plan {plan_id} not found or inactive"))
                })?;
            (tenant, plan)
        };

        // Compliance gate runs before anything is persisted.
        let screen = self
            .ofac
            .check_address(&normalized)
            .await
            .map_err(ApiError::Internal)?;
        if screen.is_sanctioned {
            let sdn_name = screen
                .matched_entries
                .first()
                .map(|m| m.sdn_name.clone())
                .unwrap_or_default();
            warn!(tenant_id, network = %network, "payment blocked by OFAC screening");
            return Err(ApiError::OfacSanctioned(format!(
                "address {normalized} on OFAC SDN list ({sdn_name})"
            )));
        }

        let receiver = tenant
            .receiver_for(network)
            .map(str::to_string)
            .or_else(|| self.config.default_receiver(network).map(str::to_string))
            .ok_or_else(|| {
                ApiError::InvalidNetwork(format!(
                    "no receiver address configured for network {network}"
                ))
            })?;

        let encrypted = self
            .cipher
            .encrypt(&normalized)
            .map_err(|e| ApiError::Internal(e.into()))?;
        let hmac = self.cipher.address_hmac(&normalized);

        let external_user = external_user_id.trim().to_string();
        let payment = {
            let mut conn = self.conn()?;
            conn.transaction::<Payment, ApiError, _>(|conn| {
                // One in-flight payment per user, checked inside the
                // creation transaction.
                if let Some(existing) =
                    Payment::pending_for_user(conn, tenant_id, &external_user)
                        .map_err(ApiError::Internal)?
                {
                    return Err(ApiError::PendingExists(format!(
                        "payment {} is already in progress for this user",
                        existing.id
                    )));
                }

                let ts = now();
                Payment::create(
                    conn,
                    NewPayment {
                        id: uuid::Uuid::new_v4().to_string(),
                        tenant_id: tenant_id.to_string(),
                        external_user_id: external_user.clone(),
                        plan_id: plan.id.clone(),
                        amount: plan.price.clone(),
                        token: token.as_str().to_string(),
                        network: network.as_str().to_string(),
                        sender_address_encrypted: encrypted.clone(),
                        sender_address_hmac: hmac.clone(),
                        receiver_address: receiver.clone(),
                        status: PaymentStatus::Pending.as_str().to_string(),
                        created_at: ts,
                        updated_at: ts,
                        expires_at: ts + Duration::minutes(PAYMENT_TTL_MINUTES),
                    },
                )
                .map_err(ApiError::Internal)
            })?
        };

        info!(
            tenant_id,
            payment_id = %payment.id,
            plan_id = %plan.id,
            network = %network,
            token = %token,
            "payment initiated"
        );

        if let Err(e) = self
            .webhooks
            .enqueue(tenant_id, EVENT_PAYMENT_CREATED, payment_event_data(&payment))
            .await
        {
            warn!(payment_id = %payment.id, error = %e, "failed to emit payment.created");
        }

        let expires_in = (payment.expires_at - now()).num_seconds().max(0);
        Ok(Placement {
            payment_id: payment.id.clone(),
            receiver_address: receiver.clone(),
            amount: payment.amount.clone(),
            token: payment.token.clone(),
            network: payment.network.clone(),
            expires_at: fmt_ts(payment.expires_at),
            expires_in,
            qr_code_data: receiver.clone(),
            instructions: vec![
                format!(
                    "Send exactly {} {} on the {} network to {}.",
                    payment.amount, payment.token, payment.network, receiver
                ),
                "Send from the wallet address you provided; transfers from other addresses are not matched.".to_string(),
                "After sending, confirm the payment so on-chain monitoring can begin.".to_string(),
                format!("This payment window closes at {} UTC.", fmt_ts(payment.expires_at)),
            ],
        })
    }

    /// Caller says the funds were sent: move to `awaiting_confirmation` and
    /// enroll in the monitor queue (idempotent).
    pub async fn confirm_payment_sent(
        &self,
        payment_id: &str,
        tenant_id: &str,
    ) -> Result<PaymentView, ApiError> {
        let payment = {
            let mut conn = self.conn()?;
            Payment::find_for_tenant(&mut conn, payment_id, tenant_id)
                .map_err(ApiError::Internal)?
                .ok_or_else(|| ApiError::NotFound("payment not found".into()))?
        };

        match payment.status_enum() {
            PaymentStatus::Pending if now() >= payment.expires_at => {
                {
                    let mut conn = self.conn()?;
                    Payment::set_status(&mut conn, payment_id, PaymentStatus::Expired)
                        .map_err(ApiError::Internal)?;
                }
                let mut expired = payment.clone();
                expired.status = PaymentStatus::Expired.as_str().to_string();
                if let Err(e) = self
                    .webhooks
                    .enqueue(tenant_id, EVENT_PAYMENT_EXPIRED, payment_event_data(&expired))
                    .await
                {
                    warn!(payment_id, error = %e, "failed to emit payment.expired");
                }
                Err(ApiError::InvalidStatus(
                    "payment window has expired".into(),
                ))
            }
            PaymentStatus::Pending => {
                {
                    let mut conn = self.conn()?;
                    Payment::set_status(
                        &mut conn,
                        payment_id,
                        PaymentStatus::AwaitingConfirmation,
                    )
                    .map_err(ApiError::Internal)?;
                }
                self.queue.enroll(payment_id);
                info!(payment_id, "payment awaiting on-chain confirmation");

                let mut conn = self.conn()?;
                let updated = Payment::find_by_id(&mut conn, payment_id)
                    .map_err(ApiError::Internal)?
                    .ok_or_else(|| {
                        ApiError::Internal(anyhow::anyhow!("payment vanished during confirm"))
                    })?;
                Ok(PaymentView::from_payment(&updated))
            }
            other => Err(ApiError::InvalidStatus(format!(
                "payment is {}, expected pending",
                other.as_str()
            ))),
        }
    }

    pub async fn get_payment_status(
        &self,
        payment_id: &str,
        tenant_id: &str,
    ) -> Result<PaymentView, ApiError> {
        let mut conn = self.conn()?;
        let payment = Payment::find_for_tenant(&mut conn, payment_id, tenant_id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::NotFound("payment not found".into()))?;
        Ok(PaymentView::from_payment(&payment))
    }

    /// Cancellation is legal only from `pending`.
    pub async fn cancel_payment(
        &self,
        payment_id: &str,
        tenant_id: &str,
    ) -> Result<PaymentView, ApiError> {
        let mut conn = self.conn()?;
        let payment = Payment::find_for_tenant(&mut conn, payment_id, tenant_id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::NotFound("payment not found".into()))?;

        if payment.status_enum() != PaymentStatus::Pending {
            return Err(ApiError::CannotCancel(format!(
                "only pending payments can be cancelled (status: {})",
                payment.status
            )));
        }

        Payment::set_status(&mut conn, payment_id, PaymentStatus::Cancelled)
            .map_err(ApiError::Internal)?;
        info!(payment_id, "payment cancelled");

        let updated = Payment::find_by_id(&mut conn, payment_id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("payment vanished during cancel")))?;
        Ok(PaymentView::from_payment(&updated))
    }

    pub async fn get_payment_history(
        &self,
        tenant_id: &str,
        external_user_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<PaymentView>, ApiError> {
        let limit = limit.unwrap_or(HISTORY_LIMIT).clamp(1, HISTORY_LIMIT);
        let mut conn = self.conn()?;
        let payments = Payment::history(&mut conn, tenant_id, external_user_id, limit)
            .map_err(ApiError::Internal)?;
        Ok(payments.iter().map(PaymentView::from_payment).collect())
    }

    /// Confirmation handler, called by the monitor. One atomic unit: the
    /// payment flips to `confirmed` and the subscription activates, or
    /// neither happens. A duplicate transaction hash is rejected without
    /// partial state change.
    pub async fn handle_confirmed_transaction(
        &self,
        payment_id: &str,
        tx_hash: &str,
        confirmations: u32,
        amount: Decimal,
    ) -> Result<(Payment, Subscription), ApiError> {
        if tx_hash.is_empty() {
            return Err(ApiError::Validation("transaction hash is empty".into()));
        }

        let pool = self.pool.clone();
        let payment_id_owned = payment_id.to_string();
        let tx_hash_owned = tx_hash.to_string();

        let (payment, subscription) = tokio::task::spawn_blocking(
            move || -> Result<(Payment, Subscription), ApiError> {
                let mut conn = pool
                    .get()
                    .context("Failed to get DB connection")
                    .map_err(ApiError::Internal)?;

                conn.transaction::<(Payment, Subscription), ApiError, _>(|conn| {
                    let payment = Payment::find_by_id(conn, &payment_id_owned)
                        .map_err(ApiError::Internal)?
                        .ok_or_else(|| ApiError::NotFound("payment not found".into()))?;

                    if payment.status_enum() != PaymentStatus::AwaitingConfirmation {
                        return Err(ApiError::InvalidStatus(format!(
                            "payment is {}, expected awaiting_confirmation",
                            payment.status
                        )));
                    }

                    // Double-spend guard: a hash settles at most one payment.
                    if let Some(existing) = Payment::find_by_tx_hash(conn, &tx_hash_owned)
                        .map_err(ApiError::Internal)?
                    {
                        if existing.id != payment.id {
                            return Err(ApiError::DuplicateTxHash(tx_hash_owned.clone()));
                        }
                    }

                    let updated = Payment::confirm(
                        conn,
                        &payment.id,
                        &tx_hash_owned,
                        confirmations as i32,
                        now(),
                    )
                    .map_err(|e| match e {
                        diesel::result::Error::DatabaseError(
                            diesel::result::DatabaseErrorKind::UniqueViolation,
                            _,
                        ) => ApiError::DuplicateTxHash(tx_hash_owned.clone()),
                        other => ApiError::Internal(other.into()),
                    })?;
                    if updated == 0 {
                        return Err(ApiError::InvalidStatus(
                            "payment left awaiting_confirmation during confirmation".into(),
                        ));
                    }

                    let payment = Payment::find_by_id(conn, &payment.id)
                        .map_err(ApiError::Internal)?
                        .ok_or_else(|| {
                            ApiError::Internal(anyhow::anyhow!("payment vanished during confirm"))
                        })?;
                    let plan = Plan::find_by_id(conn, &payment.plan_id)
                        .map_err(ApiError::Internal)?
                        .ok_or_else(|| {
                            ApiError::Internal(anyhow::anyhow!(
                                "plan {} missing for confirmed payment",
                                payment.plan_id
                            ))
                        })?;

                    let subscription =
                        SubscriptionEngine::activate_within(conn, &payment, &plan)
                            .map_err(ApiError::Internal)?;

                    Ok((payment, subscription))
                })
            },
        )
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

        info!(
            payment_id = %payment.id,
            tx_hash,
            confirmations,
            %amount,
            subscription_id = %subscription.id,
            "payment confirmed, subscription activated"
        );

        // Events go out after the atomic unit commits.
        if let Err(e) = self
            .webhooks
            .enqueue(
                &payment.tenant_id,
                EVENT_PAYMENT_CONFIRMED,
                payment_confirmed_data(&payment),
            )
            .await
        {
            warn!(payment_id = %payment.id, error = %e, "failed to emit payment.confirmed");
        }
        if let Err(e) = self
            .webhooks
            .enqueue(
                &subscription.tenant_id,
                EVENT_SUBSCRIPTION_ACTIVATED,
                subscription_event_data(&subscription),
            )
            .await
        {
            warn!(subscription_id = %subscription.id, error = %e, "failed to emit subscription.activated");
        }

        Ok((payment, subscription))
    }

    /// Periodic sweep: expire every in-flight payment whose window has
    /// closed, emitting `payment.expired` per row. Returns the count.
    pub async fn expire_due_payments(&self) -> Result<usize, ApiError> {
        let due = {
            let mut conn = self.conn()?;
            Payment::expired_due(&mut conn, now()).map_err(ApiError::Internal)?
        };

        if due.is_empty() {
            return Ok(0);
        }

        info!(count = due.len(), "expiring overdue payments");

        for payment in &due {
            {
                let mut conn = self.conn()?;
                Payment::set_status(&mut conn, &payment.id, PaymentStatus::Expired)
                    .map_err(ApiError::Internal)?;
            }
            self.queue.unenroll(&payment.id);

            let mut expired = payment.clone();
            expired.status = PaymentStatus::Expired.as_str().to_string();
            if let Err(e) = self
                .webhooks
                .enqueue(
                    &payment.tenant_id,
                    EVENT_PAYMENT_EXPIRED,
                    payment_event_data(&expired),
                )
                .await
            {
                warn!(payment_id = %payment.id, error = %e, "failed to emit payment.expired");
            }
        }

        Ok(due.len())
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn conn(&self) -> Result<crate::db::DbConn, ApiError> {
        self.pool
            .get()
            .context("Failed to get DB connection")
            .map_err(ApiError::Internal)
    }

    fn require_active_tenant(
        &self,
        conn: &mut diesel::SqliteConnection,
        tenant_id: &str,
    ) -> Result<Tenant, ApiError> {
        let tenant = Tenant::find_by_id(conn, tenant_id)
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::Unauthorized("unknown tenant".into()))?;
        if !tenant.is_active {
            return Err(ApiError::Forbidden("tenant is disabled".into()));
        }
        Ok(tenant)
    }
}

fn parse_price(raw: &str) -> Result<Decimal, ApiError> {
    let price: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("invalid price: {raw}")))?;
    if price <= Decimal::ZERO {
        return Err(ApiError::Validation("price must be positive".into()));
    }
    if price.scale() > 6 {
        return Err(ApiError::Validation(
            "price supports at most 6 decimal places".into(),
        ));
    }
    Ok(price)
}
