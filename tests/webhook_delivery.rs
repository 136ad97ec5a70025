//! Webhook retry scenario: a flaky endpoint fails twice with 500, then
//! succeeds; the log row climbs the retry ladder and stops being selected
//! after success.

mod common;

use common::{build_app, scripted_endpoint_with_body};
use diesel::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stablegate::models::{now, WebhookLog};
use stablegate::services::webhook_dispatcher::sign_payload;

async fn wait_for<F>(mut predicate: F, what: &str)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

fn make_due_now(pool: &stablegate::db::DbPool, log_id: &str) {
    use stablegate::schema::webhook_logs::dsl::*;
    let mut conn = pool.get().unwrap();
    diesel::update(webhook_logs.find(log_id))
        .set(next_retry_at.eq(now() - chrono::Duration::seconds(1)))
        .execute(&mut conn)
        .unwrap();
}

#[tokio::test]
async fn retry_ladder_until_endpoint_recovers() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url =
        scripted_endpoint_with_body(vec![500, 500, 200], Arc::clone(&hits), "ok".to_string())
            .await;

    let app = build_app(Some(url));

    // Emit an event; the initial background attempt gets the first 500.
    app.webhooks
        .enqueue(
            "default",
            "payment.created",
            serde_json::json!({ "paymentId": "p-hook" }),
        )
        .await
        .unwrap();

    let pool = app.pool.clone();
    let log_id = {
        use stablegate::schema::webhook_logs::dsl::*;
        let mut conn = pool.get().unwrap();
        webhook_logs
            .select(id)
            .first::<String>(&mut conn)
            .unwrap()
    };

    // First failure recorded: retry_count=1, next retry ~60s out.
    {
        let pool = pool.clone();
        let log_id = log_id.clone();
        wait_for(
            move || {
                let mut conn = pool.get().unwrap();
                let row = WebhookLog::find_by_id(&mut conn, &log_id).unwrap().unwrap();
                row.retry_count == 1
            },
            "first delivery failure",
        )
        .await;
    }
    {
        let mut conn = pool.get().unwrap();
        let row = WebhookLog::find_by_id(&mut conn, &log_id).unwrap().unwrap();
        assert!(!row.success);
        assert_eq!(row.response_status, Some(500));
        let wait = (row.next_retry_at.unwrap() - now()).num_seconds();
        assert!((50..=61).contains(&wait), "first retry wait was {wait}s");
    }

    // Second attempt: also 500; ladder moves to ~300s.
    make_due_now(&pool, &log_id);
    assert_eq!(app.webhooks.retry_pending().await.unwrap(), 1);
    {
        let mut conn = pool.get().unwrap();
        let row = WebhookLog::find_by_id(&mut conn, &log_id).unwrap().unwrap();
        assert_eq!(row.retry_count, 2);
        assert!(!row.success);
        let wait = (row.next_retry_at.unwrap() - now()).num_seconds();
        assert!((290..=301).contains(&wait), "second retry wait was {wait}s");
    }

    // Third attempt: endpoint recovered.
    make_due_now(&pool, &log_id);
    assert_eq!(app.webhooks.retry_pending().await.unwrap(), 1);
    {
        let mut conn = pool.get().unwrap();
        let row = WebhookLog::find_by_id(&mut conn, &log_id).unwrap().unwrap();
        assert!(row.success);
        assert_eq!(row.response_status, Some(200));
        assert_eq!(row.response_body.as_deref(), Some("ok"));
        assert!(row.next_retry_at.is_none());
    }

    // A delivered log is never reselected.
    assert_eq!(app.webhooks.retry_pending().await.unwrap(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn delivered_payload_matches_signature() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = scripted_endpoint_with_body(vec![200], Arc::clone(&hits), String::new()).await;

    let app = build_app(Some(url));
    app.webhooks
        .enqueue(
            "default",
            "subscription.activated",
            serde_json::json!({ "subscriptionId": "s1" }),
        )
        .await
        .unwrap();

    let pool = app.pool.clone();
    let row = {
        use stablegate::schema::webhook_logs::dsl::*;
        let mut conn = pool.get().unwrap();
        webhook_logs.first::<WebhookLog>(&mut conn).unwrap()
    };

    // The signature the engine would send verifies against the exact logged
    // payload bytes with the tenant secret.
    let signature = sign_payload("whsec_test", &row.payload);
    assert_eq!(signature.len(), 64);
    assert_eq!(signature, sign_payload("whsec_test", &row.payload));

    // The payload envelope carries event, timestamp and data.
    let parsed: serde_json::Value = serde_json::from_str(&row.payload).unwrap();
    assert_eq!(parsed["event"], "subscription.activated");
    assert!(parsed["timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(parsed["data"]["subscriptionId"], "s1");
}

#[tokio::test]
async fn tenant_without_webhook_url_is_a_noop() {
    let app = build_app(None);
    app.webhooks
        .enqueue(
            "default",
            "payment.created",
            serde_json::json!({ "paymentId": "p-silent" }),
        )
        .await
        .unwrap();

    use stablegate::schema::webhook_logs::dsl::*;
    let mut conn = app.pool.get().unwrap();
    let count: i64 = webhook_logs.count().get_result(&mut conn).unwrap();
    assert_eq!(count, 0);
}
