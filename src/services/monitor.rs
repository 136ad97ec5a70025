//! Blockchain monitor: a concurrent polling engine that reconciles on-chain
//! transfers against in-flight payments.
//!
//! State is one in-process map from payment id to retry bookkeeping, owned
//! by the monitor; everything else reaches it through the thread-safe
//! `MonitorQueue` handle. Every tick (30s) each enrolled payment is checked
//! in parallel: expired payments are swept out, found transfers go through
//! the atomic confirmation handler, and adapter failures burn a bounded
//! retry budget.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::chains::ChainClients;
use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::{now, Payment, PaymentStatus};
use crate::services::payment_engine::PaymentEngine;
use crate::services::webhook_dispatcher::{
    payment_event_data, payment_failed_data, WebhookDispatcher, EVENT_PAYMENT_EXPIRED,
    EVENT_PAYMENT_FAILED,
};

/// Adapter failures tolerated per payment before it is marked failed.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Seconds between monitor ticks.
pub const POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Default)]
struct MonitoredPayment {
    retry_count: u32,
    last_checked: Option<chrono::NaiveDateTime>,
}

/// Thread-safe handle to the monitor's enrollment map. Cheap to clone; the
/// payment engine holds one to enroll payments on `confirm_payment_sent`.
#[derive(Clone, Default)]
pub struct MonitorQueue {
    inner: Arc<Mutex<HashMap<String, MonitoredPayment>>>,
}

impl MonitorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-enrolling keeps existing retry bookkeeping.
    pub fn enroll(&self, payment_id: &str) {
        let mut map = self.inner.lock().unwrap();
        map.entry(payment_id.to_string()).or_default();
    }

    pub fn unenroll(&self, payment_id: &str) {
        self.inner.lock().unwrap().remove(payment_id);
    }

    pub fn contains(&self, payment_id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(payment_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    /// Record one failed check; returns the new count.
    fn record_failure(&self, payment_id: &str) -> u32 {
        let mut map = self.inner.lock().unwrap();
        let entry = map.entry(payment_id.to_string()).or_default();
        entry.retry_count += 1;
        entry.retry_count
    }

    fn touch(&self, payment_id: &str) {
        let mut map = self.inner.lock().unwrap();
        if let Some(entry) = map.get_mut(payment_id) {
            entry.last_checked = Some(now());
        }
    }
}

pub struct BlockchainMonitor {
    db: DbPool,
    chains: Arc<ChainClients>,
    engine: Arc<PaymentEngine>,
    webhooks: Arc<WebhookDispatcher>,
    queue: MonitorQueue,
    task: Mutex<Option<MonitorTask>>,
}

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BlockchainMonitor {
    pub fn new(
        db: DbPool,
        chains: Arc<ChainClients>,
        engine: Arc<PaymentEngine>,
        webhooks: Arc<WebhookDispatcher>,
        queue: MonitorQueue,
    ) -> Self {
        Self {
            db,
            chains,
            engine,
            webhooks,
            queue,
            task: Mutex::new(None),
        }
    }

    /// Start the tick loop. Idempotent; a second call while running is a
    /// no-op. Re-enrolls every `awaiting_confirmation` payment first so a
    /// restart never loses in-flight monitoring.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        {
            let task = self.task.lock().unwrap();
            if task.is_some() {
                return Ok(());
            }
        }

        self.bootstrap().await?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(&self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
            info!(
                poll_interval = POLL_INTERVAL_SECS,
                "blockchain monitor started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("blockchain monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        monitor.tick().await;
                    }
                }
            }
        });

        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            // Lost a start race; keep the loop that won.
            handle.abort();
            return Ok(());
        }
        *task = Some(MonitorTask {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Signal the tick loop to stop and wait for the in-flight tick.
    pub async fn stop(&self) {
        let task = { self.task.lock().unwrap().take() };
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            let _ = task.handle.await;
            info!("blockchain monitor stopped");
        }
    }

    /// Load every awaiting-confirmation payment into the queue. Also used
    /// by the periodic enroll sweep to pick up payments enrolled on another
    /// path.
    pub async fn bootstrap(&self) -> Result<()> {
        let pool = self.db.clone();
        let awaiting = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().context("Failed to get DB connection")?;
            Payment::awaiting_confirmation(&mut conn)
        })
        .await
        .context("bootstrap task panicked")??;

        for payment in &awaiting {
            self.queue.enroll(&payment.id);
        }
        if !awaiting.is_empty() {
            info!(count = awaiting.len(), "enrolled awaiting-confirmation payments");
        }
        Ok(())
    }

    /// One pass over the enrolled payments, all checked concurrently.
    async fn tick(&self) {
        let ids = self.queue.snapshot_ids();
        if ids.is_empty() {
            return;
        }

        let checks = ids.iter().map(|id| self.check_payment(id));
        join_all(checks).await;
    }

    async fn check_payment(&self, payment_id: &str) {
        self.queue.touch(payment_id);

        let pool = self.db.clone();
        let id = payment_id.to_string();
        let payment = match tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().context("Failed to get DB connection")?;
            Payment::find_by_id(&mut conn, &id)
        })
        .await
        {
            Ok(Ok(p)) => p,
            Ok(Err(e)) => {
                warn!(payment_id, error = %e, "failed to load payment for check");
                return;
            }
            Err(e) => {
                warn!(payment_id, error = %e, "payment load task panicked");
                return;
            }
        };

        // Gone or moved on: nothing left to watch.
        let Some(payment) = payment else {
            self.queue.unenroll(payment_id);
            return;
        };
        if payment.status_enum() != PaymentStatus::AwaitingConfirmation {
            self.queue.unenroll(payment_id);
            return;
        }

        // Deadline passed: expire and notify.
        if now() > payment.expires_at {
            if let Err(e) = self.expire_payment(&payment).await {
                error!(payment_id, error = %e, "failed to expire payment");
            }
            self.queue.unenroll(payment_id);
            return;
        }

        match self.chains.find_transfer(&payment).await {
            Ok(result) if result.found => {
                let tx_hash = result.tx_hash.unwrap_or_default();
                let confirmations = result.confirmations.unwrap_or(0);
                let amount = result.amount.unwrap_or_default();

                match self
                    .engine
                    .handle_confirmed_transaction(payment_id, &tx_hash, confirmations, amount)
                    .await
                {
                    Ok(_) => {
                        info!(payment_id, tx_hash = %tx_hash, confirmations, "payment confirmed");
                        self.queue.unenroll(payment_id);
                    }
                    Err(ApiError::DuplicateTxHash(hash)) => {
                        // Another payment already consumed this transaction.
                        // Leave this one to the expiry sweep.
                        warn!(
                            payment_id,
                            tx_hash = %hash,
                            "transfer already settled another payment; leaving payment to expire"
                        );
                        self.queue.unenroll(payment_id);
                    }
                    Err(e) => {
                        error!(payment_id, error = %e, "confirmation handler failed");
                        self.record_check_failure(&payment, &e.to_string()).await;
                    }
                }
            }
            Ok(_) => {
                // Nothing on-chain yet; keep waiting.
            }
            Err(e) => {
                warn!(payment_id, error = %e, "chain adapter check failed");
                self.record_check_failure(&payment, &e.to_string()).await;
            }
        }
    }

    /// Burn one retry; on budget exhaustion mark the payment failed and
    /// emit `payment.failed`.
    async fn record_check_failure(&self, payment: &Payment, message: &str) {
        let retries = self.queue.record_failure(&payment.id);

        let pool = self.db.clone();
        let payment_id = payment.id.clone();
        let persist = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get().context("Failed to get DB connection")?;
            Payment::set_retry_count(&mut conn, &payment_id, retries as i32)
        })
        .await;
        if let Ok(Err(e)) = persist {
            warn!(payment_id = %payment.id, error = %e, "failed to persist retry count");
        }

        if retries < MAX_RETRY_COUNT {
            return;
        }

        warn!(
            payment_id = %payment.id,
            retries,
            "retry budget exhausted, marking payment failed"
        );

        let pool = self.db.clone();
        let payment_id = payment.id.clone();
        let message_owned = message.to_string();
        let marked = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get().context("Failed to get DB connection")?;
            Payment::set_failed(&mut conn, &payment_id, &message_owned)
        })
        .await;

        match marked {
            Ok(Ok(())) => {
                let mut failed = payment.clone();
                failed.status = PaymentStatus::Failed.as_str().to_string();
                let data = payment_failed_data(&failed, message);
                if let Err(e) = self
                    .webhooks
                    .enqueue(&payment.tenant_id, EVENT_PAYMENT_FAILED, data)
                    .await
                {
                    warn!(payment_id = %payment.id, error = %e, "failed to emit payment.failed");
                }
            }
            Ok(Err(e)) => error!(payment_id = %payment.id, error = %e, "failed to mark payment failed"),
            Err(e) => error!(payment_id = %payment.id, error = %e, "mark-failed task panicked"),
        }

        self.queue.unenroll(&payment.id);
    }

    async fn expire_payment(&self, payment: &Payment) -> Result<()> {
        let pool = self.db.clone();
        let payment_id = payment.id.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get().context("Failed to get DB connection")?;
            Payment::set_status(&mut conn, &payment_id, PaymentStatus::Expired)
        })
        .await
        .context("expire task panicked")??;

        info!(payment_id = %payment.id, "payment expired in monitoring");

        let mut expired = payment.clone();
        expired.status = PaymentStatus::Expired.as_str().to_string();
        let data = payment_event_data(&expired);
        if let Err(e) = self
            .webhooks
            .enqueue(&payment.tenant_id, EVENT_PAYMENT_EXPIRED, data)
            .await
        {
            warn!(payment_id = %payment.id, error = %e, "failed to emit payment.expired");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_is_idempotent() {
        let queue = MonitorQueue::new();
        queue.enroll("p1");
        queue.record_failure("p1");
        queue.record_failure("p1");

        // Re-enrolling must not reset the retry bookkeeping.
        queue.enroll("p1");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.record_failure("p1"), 3);
    }

    #[test]
    fn unenroll_removes_entry() {
        let queue = MonitorQueue::new();
        queue.enroll("p1");
        queue.enroll("p2");
        assert!(queue.contains("p1"));
        assert_eq!(queue.len(), 2);

        queue.unenroll("p1");
        assert!(!queue.contains("p1"));
        assert_eq!(queue.len(), 1);

        // Unenrolling an absent payment is a no-op.
        queue.unenroll("p1");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn failure_counting_reaches_budget() {
        let queue = MonitorQueue::new();
        queue.enroll("p1");
        assert_eq!(queue.record_failure("p1"), 1);
        assert_eq!(queue.record_failure("p1"), 2);
        assert!(queue.record_failure("p1") >= MAX_RETRY_COUNT);
    }
}
