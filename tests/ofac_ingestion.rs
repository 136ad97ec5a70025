//! OFAC ingestion pipeline over a local feed endpoint: fetch, extract,
//! replace-publish, run log, and screening lookups.

mod common;

use common::scripted_endpoint_with_body;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use stablegate::db::create_test_pool;
use stablegate::models::OfacSanctionedAddress;
use stablegate::services::OfacService;

const FEED_A: &str = r#"<?xml version="1.0"?>
<sdnList>
  <sdnEntry>
    <uid>36318</uid>
    <lastName>ACME SDN</lastName>
    <idList>
      <id>
        <idType>Digital Currency Address - ETH</idType>
        <idNumber>0xDEadbeef00000000000000000000000000000001</idNumber>
      </id>
      <id>
        <idType>Digital Currency Address - TRC20</idType>
        <idNumber>TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t</idNumber>
      </id>
    </idList>
  </sdnEntry>
  <sdnEntry>
    <uid>40111</uid>
    <lastName>OTHER SDN</lastName>
    <idList>
      <id>
        <idType>Digital Currency Address - XBT</idType>
        <idNumber>1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa</idNumber>
      </id>
    </idList>
  </sdnEntry>
</sdnList>"#;

const FEED_B: &str = r#"<?xml version="1.0"?>
<sdnList>
  <sdnEntry>
    <uid>50000</uid>
    <lastName>NEW SDN</lastName>
    <idList>
      <id>
        <idType>Digital Currency Address - USDC</idType>
        <idNumber>0xDEadbeef00000000000000000000000000000099</idNumber>
      </id>
    </idList>
  </sdnEntry>
</sdnList>"#;

#[tokio::test]
async fn ingestion_replaces_set_and_logs_runs() {
    let pool = create_test_pool();

    // First run: three addresses land.
    let url_a =
        scripted_endpoint_with_body(vec![200], Arc::new(AtomicUsize::new(0)), FEED_A.to_string())
            .await;
    let service_a = OfacService::with_feed_url(pool.clone(), url_a);
    let summary = service_a.update().await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.added, 3);
    assert_eq!(summary.removed, 0);

    // Screening hits are case-insensitive over the whole address.
    let check = service_a
        .check_address("0XDEADBEEF00000000000000000000000000000001")
        .await
        .unwrap();
    assert!(check.is_sanctioned);
    assert_eq!(check.matched_entries.len(), 1);
    assert_eq!(check.matched_entries[0].sdn_name, "ACME SDN");
    assert_eq!(check.matched_entries[0].address_type, "ethereum");

    let clean = service_a
        .check_address("0x00000000000000000000000000000000000000aa")
        .await
        .unwrap();
    assert!(!clean.is_sanctioned);
    assert!(clean.matched_entries.is_empty());

    // Second run from a shrunk feed: set semantics, not merge.
    let url_b =
        scripted_endpoint_with_body(vec![200], Arc::new(AtomicUsize::new(0)), FEED_B.to_string())
            .await;
    let service_b = OfacService::with_feed_url(pool.clone(), url_b);
    let summary = service_b.update().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 2);

    {
        let mut conn = pool.get().unwrap();
        assert_eq!(OfacSanctionedAddress::count_all(&mut conn).unwrap(), 1);
    }
    let old = service_b
        .check_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t")
        .await
        .unwrap();
    assert!(!old.is_sanctioned);

    // Status endpoint data reflects the latest run.
    let status = service_b.status().await.unwrap();
    assert_eq!(status["totalAddresses"], 1);
    assert_eq!(status["lastUpdateSuccess"], true);
    assert_eq!(status["addressTypes"]["usd-coin"], 1);
}

#[tokio::test]
async fn failed_fetch_is_logged_and_leaves_set_untouched() {
    let pool = create_test_pool();

    // Seed via a good feed first.
    let url =
        scripted_endpoint_with_body(vec![200], Arc::new(AtomicUsize::new(0)), FEED_B.to_string())
            .await;
    let good = OfacService::with_feed_url(pool.clone(), url);
    good.update().await.unwrap();

    // Run-log timestamps have second precision; give the failed run its
    // own second so "latest" is unambiguous.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    // A dead endpoint: the update fails, the set stays.
    let bad = OfacService::with_feed_url(pool.clone(), "http://127.0.0.1:9/feed".to_string());
    assert!(bad.update().await.is_err());

    {
        let mut conn = pool.get().unwrap();
        assert_eq!(OfacSanctionedAddress::count_all(&mut conn).unwrap(), 1);
    }

    let status = bad.status().await.unwrap();
    assert_eq!(status["lastUpdateSuccess"], false);
}

#[tokio::test]
async fn refresh_if_empty_skips_populated_set() {
    let pool = create_test_pool();
    let url =
        scripted_endpoint_with_body(vec![200], Arc::new(AtomicUsize::new(0)), FEED_B.to_string())
            .await;
    let service = OfacService::with_feed_url(pool.clone(), url);

    // Empty set: the startup hook ingests.
    service.refresh_if_empty().await.unwrap();
    {
        let mut conn = pool.get().unwrap();
        assert_eq!(OfacSanctionedAddress::count_all(&mut conn).unwrap(), 1);
    }

    // Populated set: startup does not re-fetch (a dead URL proves it).
    let quiet = OfacService::with_feed_url(pool.clone(), "http://127.0.0.1:9/feed".to_string());
    quiet.refresh_if_empty().await.unwrap();
    {
        let mut conn = pool.get().unwrap();
        assert_eq!(OfacSanctionedAddress::count_all(&mut conn).unwrap(), 1);
    }
}
