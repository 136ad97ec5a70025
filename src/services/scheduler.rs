//! Periodic background tasks: payment/subscription expiry sweeps, webhook
//! retries, the monitor enroll sweep, and the daily OFAC refresh.
//!
//! Every task is a cancellable loop on the shared shutdown signal; interval
//! semantics guarantee the previous run completes before the next fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::services::monitor::BlockchainMonitor;
use crate::services::ofac::OfacService;
use crate::services::payment_engine::PaymentEngine;
use crate::services::subscription::SubscriptionEngine;
use crate::services::webhook_dispatcher::WebhookDispatcher;

/// Fixed periodic schedule (seconds).
pub const ENROLL_SWEEP_SECS: u64 = 60;
pub const EXPIRE_PAYMENTS_SECS: u64 = 300;
pub const EXPIRE_SUBSCRIPTIONS_SECS: u64 = 3600;
pub const RETRY_WEBHOOKS_SECS: u64 = 120;

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn all periodic tasks.
    pub fn start(
        engine: Arc<PaymentEngine>,
        subscriptions: Arc<SubscriptionEngine>,
        webhooks: Arc<WebhookDispatcher>,
        ofac: Arc<OfacService>,
        monitor: Arc<BlockchainMonitor>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let mut handles = Vec::new();

        // Enroll sweep: pick up awaiting-confirmation payments the queue
        // may have missed.
        {
            let monitor = Arc::clone(&monitor);
            let mut rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(ENROLL_SWEEP_SECS));
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = monitor.bootstrap().await {
                                error!(error = %e, "monitor enroll sweep failed");
                            }
                        }
                    }
                }
            }));
        }

        // Payment expiry sweep.
        {
            let engine = Arc::clone(&engine);
            let mut rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(EXPIRE_PAYMENTS_SECS));
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = ticker.tick() => {
                            match engine.expire_due_payments().await {
                                Ok(0) => {}
                                Ok(count) => info!(count, "expired overdue payments"),
                                Err(e) => error!(error = %e, "payment expiry sweep failed"),
                            }
                        }
                    }
                }
            }));
        }

        // Subscription expiry sweep.
        {
            let subscriptions = Arc::clone(&subscriptions);
            let mut rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(EXPIRE_SUBSCRIPTIONS_SECS));
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = ticker.tick() => {
                            match subscriptions.expire_due().await {
                                Ok(0) => {}
                                Ok(count) => info!(count, "expired due subscriptions"),
                                Err(e) => error!(error = %e, "subscription expiry sweep failed"),
                            }
                        }
                    }
                }
            }));
        }

        // Webhook retry sweep.
        {
            let webhooks = Arc::clone(&webhooks);
            let mut rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(RETRY_WEBHOOKS_SECS));
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = ticker.tick() => {
                            match webhooks.retry_pending().await {
                                Ok(0) => {}
                                Ok(count) => info!(count, "processed webhook retries"),
                                Err(e) => error!(error = %e, "webhook retry sweep failed"),
                            }
                        }
                    }
                }
            }));
        }

        // Daily OFAC refresh at 00:00 UTC.
        {
            let ofac = Arc::clone(&ofac);
            let mut rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    let wait = until_next_midnight_utc();
                    info!(in_seconds = wait.as_secs(), "next OFAC refresh scheduled");
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = tokio::time::sleep(wait) => {
                            if let Err(e) = ofac.update().await {
                                error!(error = %e, "scheduled OFAC refresh failed");
                            }
                        }
                    }
                }
            }));
        }

        info!("background scheduler started");
        Self {
            shutdown: shutdown_tx,
            handles,
        }
    }

    /// Signal every task and wait for them to wind down.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("background scheduler stopped");
    }
}

fn until_next_midnight_utc() -> Duration {
    let now = chrono::Utc::now();
    let next_midnight = (now + chrono::Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    (next_midnight - now)
        .to_std()
        .unwrap_or(Duration::from_secs(24 * 3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midnight_wait_is_at_most_a_day() {
        let wait = until_next_midnight_utc();
        assert!(wait <= Duration::from_secs(24 * 3600));
        assert!(wait > Duration::ZERO);
    }
}
