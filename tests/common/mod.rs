//! Shared harness for integration tests: an in-memory database with the
//! full component wiring, and a minimal scriptable HTTP endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use stablegate::chains::ChainClients;
use stablegate::config::AppConfig;
use stablegate::crypto::AddressCipher;
use stablegate::db::{create_test_pool, DbPool};
use stablegate::models::Tenant;
use stablegate::services::{
    BlockchainMonitor, MonitorQueue, OfacService, PaymentEngine, SubscriptionEngine,
    WebhookDispatcher,
};

pub const TEST_SECRET: &str = "integration-test-session-secret-0123456789";
pub const RECEIVER_EVM: &str = "0x00000000000000000000000000000000000000aa";
pub const RECEIVER_TRON: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

pub struct TestApp {
    pub pool: DbPool,
    pub engine: Arc<PaymentEngine>,
    pub subscriptions: Arc<SubscriptionEngine>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub ofac: Arc<OfacService>,
    pub monitor: Arc<BlockchainMonitor>,
    pub queue: MonitorQueue,
}

pub fn test_config(webhook_url: Option<String>) -> AppConfig {
    AppConfig {
        database_url: ":memory:".to_string(),
        session_secret: TEST_SECRET.to_string(),
        alchemy_api_key: None,
        trongrid_api_key: None,
        payment_address_evm: Some(RECEIVER_EVM.to_string()),
        payment_address_tron: Some(RECEIVER_TRON.to_string()),
        webhook_url,
        webhook_secret: Some("whsec_test".to_string()),
        tron_base_url: "http://127.0.0.1:9".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

/// Full wiring over a fresh in-memory database. `webhook_url` lands on the
/// default tenant; pass None to disable webhook delivery entirely.
pub fn build_app(webhook_url: Option<String>) -> TestApp {
    let config = Arc::new(test_config(webhook_url));
    let pool = create_test_pool();

    {
        let mut conn = pool.get().unwrap();
        Tenant::ensure_default(
            &mut conn,
            config.payment_address_evm.clone(),
            config.payment_address_tron.clone(),
            config.webhook_url.clone(),
            config.webhook_secret.clone(),
        )
        .unwrap();
    }

    let cipher = Arc::new(AddressCipher::from_secret(&config.session_secret).unwrap());
    let webhooks = Arc::new(WebhookDispatcher::new(pool.clone()));
    let ofac = Arc::new(OfacService::new(pool.clone()));
    let subscriptions = Arc::new(SubscriptionEngine::new(pool.clone(), Arc::clone(&webhooks)));
    let queue = MonitorQueue::new();
    let engine = Arc::new(PaymentEngine::new(
        pool.clone(),
        Arc::clone(&cipher),
        Arc::clone(&ofac),
        Arc::clone(&webhooks),
        queue.clone(),
        Arc::clone(&config),
    ));
    let chain_clients = Arc::new(ChainClients::new(&config, Arc::clone(&cipher)));
    let monitor = Arc::new(BlockchainMonitor::new(
        pool.clone(),
        chain_clients,
        Arc::clone(&engine),
        Arc::clone(&webhooks),
        queue.clone(),
    ));

    TestApp {
        pool,
        engine,
        subscriptions,
        webhooks,
        ofac,
        monitor,
        queue,
    }
}

/// Minimal HTTP endpoint that answers each request from a scripted status
/// sequence (the last entry repeats); 200 responses carry `body`. Returns
/// the URL to hit.
pub async fn scripted_endpoint_with_body(
    statuses: Vec<u16>,
    hits: Arc<AtomicUsize>,
    body: String,
) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let statuses = statuses.clone();
            let hits = Arc::clone(&hits);
            let body = body.clone();

            tokio::spawn(async move {
                // Drain the request; small test payloads arrive quickly.
                let mut buf = vec![0u8; 65536];
                let mut total = 0;
                loop {
                    let read = tokio::time::timeout(
                        std::time::Duration::from_millis(200),
                        socket.read(&mut buf[total..]),
                    )
                    .await;
                    match read {
                        Ok(Ok(0)) => break,
                        Ok(Ok(n)) => {
                            total += n;
                            if total >= buf.len() {
                                break;
                            }
                            // Headers seen and no body pending? Good enough.
                            if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        _ => break,
                    }
                }

                let hit = hits.fetch_add(1, Ordering::SeqCst);
                let status = *statuses.get(hit).or(statuses.last()).unwrap_or(&200);
                let (reason, payload) = match status {
                    200 => ("OK", body.as_str()),
                    500 => ("Internal Server Error", "oops"),
                    _ => ("No Content", ""),
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/hook")
}
