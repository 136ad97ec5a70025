//! OFAC sanctions screening: SDN feed ingestion and address lookup.
//!
//! Ingestion is a pipeline: fetch -> extract -> publish. Extraction tries a
//! structured XML walk first and falls back to a line-oriented regex pass
//! when the structured walk yields nothing (the feed's layout has shifted
//! across revisions). Publication replaces the whole address set inside one
//! transaction and appends a run log.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::ofac::{INSERT_BATCH_SIZE, OFAC_SOURCE};
use crate::models::{
    now, NewOfacSanctionedAddress, NewOfacUpdateLog, OfacSanctionedAddress, OfacUpdateLog,
};

pub const SDN_ADVANCED_URL: &str =
    "https://www.treasury.gov/ofac/downloads/sanctions/1.0/sdn_advanced.xml";

const FETCH_TIMEOUT_SECS: u64 = 120;
const FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; stablegate/1.0; +https://github.com/stablegate)";

/// How deep into the document tree entry containers are searched for when
/// the feed's top-level layout differs from the classic `sdnList/sdnEntry`.
const ENTRY_SEARCH_DEPTH: usize = 5;

/// One digital-currency address pulled out of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAddress {
    pub address: String,
    /// Normalized chain name (`ethereum`, `tron`, ...).
    pub address_type: String,
    pub sdn_name: String,
    pub sdn_uid: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdateSummary {
    pub total: i64,
    pub added: i64,
    pub removed: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub is_sanctioned: bool,
    pub matched_entries: Vec<OfacSanctionedAddress>,
    pub checked_at: String,
}

pub struct OfacService {
    pool: DbPool,
    client: reqwest::Client,
    feed_url: String,
    is_updating: AtomicBool,
}

impl OfacService {
    pub fn new(pool: DbPool) -> Self {
        Self::with_feed_url(pool, SDN_ADVANCED_URL.to_string())
    }

    pub fn with_feed_url(pool: DbPool, feed_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(FETCH_USER_AGENT)
            .build()
            .expect("Failed to build OFAC HTTP client");
        Self {
            pool,
            client,
            feed_url,
            is_updating: AtomicBool::new(false),
        }
    }

    /// Screen an address. Lookup is exact on `lower(trim(address))`; a
    /// cross-chain collision returns every match.
    pub async fn check_address(&self, address: &str) -> Result<CheckResult> {
        let needle = address.trim().to_lowercase();
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        let matched = OfacSanctionedAddress::find_matches(&mut conn, &needle)?;
        Ok(CheckResult {
            is_sanctioned: !matched.is_empty(),
            matched_entries: matched,
            checked_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        })
    }

    /// Fetch and republish the SDN address set. A second invocation while a
    /// run is in flight fails fast without blocking.
    pub async fn update(&self) -> Result<UpdateSummary, ApiError> {
        if self.is_updating.swap(true, Ordering::SeqCst) {
            return Err(ApiError::InvalidStatus(
                "OFAC update already in progress".to_string(),
            ));
        }

        let result = self.run_update().await;
        self.is_updating.store(false, Ordering::SeqCst);

        match result {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(error = %e, "OFAC update failed");
                // Best-effort failure record; the run log is the audit trail.
                if let Ok(mut conn) = self.pool.get() {
                    let _ = OfacUpdateLog::create(
                        &mut conn,
                        NewOfacUpdateLog {
                            id: uuid::Uuid::new_v4().to_string(),
                            total_addresses: 0,
                            added: 0,
                            removed: 0,
                            success: false,
                            error_message: Some(e.to_string()),
                            created_at: now(),
                        },
                    );
                }
                Err(ApiError::Internal(e))
            }
        }
    }

    /// Startup hook: only ingest when the address set is empty.
    pub async fn refresh_if_empty(&self) -> Result<()> {
        let count = {
            let mut conn = self.pool.get().context("Failed to get DB connection")?;
            OfacSanctionedAddress::count_all(&mut conn)?
        };
        if count > 0 {
            info!(count, "OFAC address set already populated, skipping startup refresh");
            return Ok(());
        }
        match self.update().await {
            Ok(summary) => {
                info!(total = summary.total, "OFAC startup ingestion complete");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "OFAC startup ingestion failed; screening set is empty");
                Ok(())
            }
        }
    }

    /// Status endpoint data.
    pub async fn status(&self) -> Result<serde_json::Value> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        let latest = OfacUpdateLog::latest(&mut conn)?;
        let total = OfacSanctionedAddress::count_all(&mut conn)?;
        let by_type = OfacSanctionedAddress::counts_by_type(&mut conn)?;

        Ok(serde_json::json!({
            "lastUpdate": latest
                .as_ref()
                .map(|l| l.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            "lastUpdateSuccess": latest.as_ref().map(|l| l.success),
            "totalAddresses": total,
            "addressTypes": by_type,
        }))
    }

    async fn run_update(&self) -> Result<UpdateSummary> {
        info!(url = %self.feed_url, "fetching OFAC SDN feed");

        let bytes = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("OFAC feed request failed")?
            .error_for_status()
            .context("OFAC feed returned an error status")?
            .bytes()
            .await
            .context("Failed to read OFAC feed body")?;

        info!(bytes = bytes.len(), "OFAC feed downloaded, extracting addresses");

        // Parsing a feed this size is CPU-bound; keep it off the runtime.
        let extracted = tokio::task::spawn_blocking(move || extract(&bytes))
            .await
            .context("OFAC extraction task panicked")?;

        if extracted.is_empty() {
            anyhow::bail!("OFAC feed yielded zero digital-currency addresses");
        }

        info!(count = extracted.len(), "publishing sanctioned address set");

        let pool = self.pool.clone();
        let summary = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().context("Failed to get DB connection")?;
            publish(&mut conn, &extracted)
        })
        .await
        .context("OFAC publish task panicked")??;

        info!(
            total = summary.total,
            added = summary.added,
            removed = summary.removed,
            "OFAC address set replaced"
        );

        Ok(summary)
    }
}

/// Replace the whole address set and append a run log, atomically.
fn publish(
    conn: &mut diesel::SqliteConnection,
    extracted: &[ExtractedAddress],
) -> Result<UpdateSummary> {
    use diesel::Connection;

    let ts = now();
    let summary = conn.transaction::<UpdateSummary, anyhow::Error, _>(|conn| {
        let old_count = OfacSanctionedAddress::count_all(conn)?;
        OfacSanctionedAddress::delete_all(conn)?;

        let rows: Vec<NewOfacSanctionedAddress> = extracted
            .iter()
            .map(|e| NewOfacSanctionedAddress {
                id: uuid::Uuid::new_v4().to_string(),
                address: e.address.clone(),
                address_lower: e.address.to_lowercase(),
                address_type: e.address_type.clone(),
                sdn_name: e.sdn_name.clone(),
                sdn_uid: e.sdn_uid.clone(),
                source: OFAC_SOURCE.to_string(),
                last_seen_at: ts,
            })
            .collect();

        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            OfacSanctionedAddress::insert_batch(conn, chunk)?;
        }

        let new_count = rows.len() as i64;
        let summary = UpdateSummary {
            total: new_count,
            added: (new_count - old_count).max(0),
            removed: (old_count - new_count).max(0),
        };

        OfacUpdateLog::create(
            conn,
            NewOfacUpdateLog {
                id: uuid::Uuid::new_v4().to_string(),
                total_addresses: summary.total as i32,
                added: summary.added as i32,
                removed: summary.removed as i32,
                success: true,
                error_message: None,
                created_at: ts,
            },
        )?;

        Ok(summary)
    })?;

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Extraction pipeline
// ---------------------------------------------------------------------------

static DCA_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    // Dash or en-dash between the label and the ticker.
    Regex::new(r"(?i)digital\s+currency\s+address\s*[-\u{2013}\u{2014}]\s*([A-Za-z0-9]+)").unwrap()
});

static EVM_ADDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b0x[0-9a-fA-F]{40}\b").unwrap());
static TRON_ADDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bT[1-9A-HJ-NP-Za-km-z]{33}\b").unwrap());
static BTC_LEGACY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[13][1-9A-HJ-NP-Za-km-z]{25,34}\b").unwrap());
static BECH32_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bbc1[02-9ac-hj-np-z]{25,90}\b").unwrap());

/// Pull digital-currency addresses out of the feed. Structured walk first;
/// the regex pass only runs when the walk finds nothing.
pub fn extract(xml: &[u8]) -> Vec<ExtractedAddress> {
    let structured = extract_structured(xml);
    if !structured.is_empty() {
        return dedup(structured);
    }
    warn!("structured OFAC parse found no addresses, falling back to regex pass");
    dedup(extract_regex(xml))
}

fn dedup(addresses: Vec<ExtractedAddress>) -> Vec<ExtractedAddress> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|a| seen.insert((a.address.to_lowercase(), a.address_type.clone())))
        .collect()
}

/// Normalize a feed ticker to a chain name. Unknown tickers are kept,
/// lower-cased.
pub fn normalize_ticker(ticker: &str) -> String {
    match ticker.to_uppercase().as_str() {
        "XBT" => "bitcoin",
        "ETH" => "ethereum",
        "XRP" => "ripple",
        "LTC" => "litecoin",
        "BCH" => "bitcoin-cash",
        "DASH" => "dash",
        "XMR" => "monero",
        "XVG" => "verge",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        "TRX" => "tron",
        "ARB" => "arbitrum",
        "BSC" => "bsc",
        "ERC20" => "ethereum",
        "TRC20" => "tron",
        _ => return ticker.to_lowercase(),
    }
    .to_string()
}

/// State for the entry currently being walked.
#[derive(Default)]
struct EntryState {
    depth: usize,
    uid: String,
    last_name: String,
    whole_name: String,
    first_name: String,
    generic_name: String,
    /// (type text, value text) pairs collected from id/feature records.
    pairs: Vec<(String, String)>,
    pending_type: Option<String>,
}

impl EntryState {
    fn resolved_name(&self) -> String {
        if !self.last_name.trim().is_empty() {
            return self.last_name.trim().to_string();
        }
        if !self.whole_name.trim().is_empty() {
            return self.whole_name.trim().to_string();
        }
        let combined = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        if !combined.trim().is_empty() {
            return combined.trim().to_string();
        }
        if !self.generic_name.trim().is_empty() {
            return self.generic_name.trim().to_string();
        }
        "UNKNOWN".to_string()
    }

    fn into_addresses(self) -> Vec<ExtractedAddress> {
        let name = self.resolved_name();
        let uid = self.uid.clone();
        self.pairs
            .into_iter()
            .filter_map(|(type_text, value)| {
                let ticker = DCA_TYPE_RE.captures(&type_text)?.get(1)?.as_str().to_string();
                let address = value.trim().to_string();
                if address.is_empty() {
                    return None;
                }
                Some(ExtractedAddress {
                    address,
                    address_type: normalize_ticker(&ticker),
                    sdn_name: name.clone(),
                    sdn_uid: uid.clone(),
                })
            })
            .collect()
    }
}

fn is_entry_element(local_name: &str, depth: usize) -> bool {
    let lower = local_name.to_lowercase();
    if lower == "sdnentry" {
        return true;
    }
    if depth > ENTRY_SEARCH_DEPTH || lower.contains("list") {
        return false;
    }
    lower == "entry" || lower == "sdn"
}

fn extract_structured(xml: &[u8]) -> Vec<ExtractedAddress> {
    let mut reader = Reader::from_reader(xml);
    let mut out = Vec::new();

    let mut depth: usize = 0;
    let mut entry: Option<EntryState> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                text.clear();
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();

                if entry.is_none() && is_entry_element(&name, depth) {
                    let mut state = EntryState {
                        depth,
                        ..Default::default()
                    };
                    // Some revisions carry the SDN id as a uid attribute.
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"uid" {
                            state.uid =
                                String::from_utf8_lossy(&attr.value).trim().to_string();
                        }
                    }
                    entry = Some(state);
                }
            }
            Ok(Event::Text(t)) => {
                if let Ok(s) = t.unescape() {
                    text.push_str(&s);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();

                if let Some(state) = entry.as_mut() {
                    let value = text.trim().to_string();
                    match name.as_str() {
                        "uid" if state.uid.is_empty() => state.uid = value,
                        "lastname" => state.last_name = value,
                        "wholename" => state.whole_name = value,
                        "firstname" => state.first_name = value,
                        "name" if state.generic_name.is_empty() => state.generic_name = value,
                        "idtype" | "type" | "featuretype" => {
                            state.pending_type = Some(value);
                        }
                        "idnumber" | "value" | "versiondetail" | "registrationnumber" => {
                            if let Some(type_text) = state.pending_type.take() {
                                state.pairs.push((type_text, value));
                            }
                        }
                        _ => {}
                    }
                }

                let entry_closed = entry.as_ref().map(|s| s.depth == depth).unwrap_or(false);
                if entry_closed {
                    if let Some(finished) = entry.take() {
                        out.extend(finished.into_addresses());
                    }
                }

                text.clear();
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "XML parse error during structured OFAC pass");
                break;
            }
            _ => {}
        }
    }

    out
}

/// Line-oriented fallback: recognize raw address shapes and pair each with
/// the most recent "Digital Currency Address - TICKER" marker seen.
fn extract_regex(xml: &[u8]) -> Vec<ExtractedAddress> {
    let text = String::from_utf8_lossy(xml);
    let mut out = Vec::new();
    let mut current_ticker: Option<String> = None;

    for line in text.lines() {
        if let Some(caps) = DCA_TYPE_RE.captures(line) {
            if let Some(ticker) = caps.get(1) {
                current_ticker = Some(normalize_ticker(ticker.as_str()));
            }
        }

        let Some(ticker) = current_ticker.clone() else {
            continue;
        };

        for re in [&*EVM_ADDR_RE, &*TRON_ADDR_RE, &*BTC_LEGACY_RE, &*BECH32_RE] {
            for m in re.find_iter(line) {
                out.push(ExtractedAddress {
                    address: m.as_str().to_string(),
                    address_type: ticker.clone(),
                    sdn_name: "UNKNOWN".to_string(),
                    sdn_uid: String::new(),
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC_FEED: &str = r#"<?xml version="1.0"?>
<sdnList>
  <sdnEntry>
    <uid>36318</uid>
    <lastName>ACME SDN</lastName>
    <sdnType>Entity</sdnType>
    <idList>
      <id>
        <idType>Digital Currency Address - ETH</idType>
        <idNumber>0xDEadbeef00000000000000000000000000000001</idNumber>
      </id>
      <id>
        <idType>Digital Currency Address - TRC20</idType>
        <idNumber>TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t</idNumber>
      </id>
      <id>
        <idType>Passport</idType>
        <idNumber>A1234567</idNumber>
      </id>
    </idList>
  </sdnEntry>
  <sdnEntry>
    <uid>40111</uid>
    <firstName>John</firstName>
    <lastName>Doe</lastName>
    <idList>
      <id>
        <idType>Digital Currency Address - XBT</idType>
        <idNumber>1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa</idNumber>
      </id>
    </idList>
  </sdnEntry>
</sdnList>"#;

    #[test]
    fn structured_pass_extracts_addresses_with_names() {
        let out = extract(CLASSIC_FEED.as_bytes());
        assert_eq!(out.len(), 3);

        let eth = out
            .iter()
            .find(|a| a.address_type == "ethereum")
            .expect("eth entry");
        assert_eq!(eth.address, "0xDEadbeef00000000000000000000000000000001");
        assert_eq!(eth.sdn_name, "ACME SDN");
        assert_eq!(eth.sdn_uid, "36318");

        let tron = out.iter().find(|a| a.address_type == "tron").unwrap();
        assert_eq!(tron.address, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t");

        let btc = out.iter().find(|a| a.address_type == "bitcoin").unwrap();
        assert_eq!(btc.sdn_name, "Doe");

        // Non-digital-currency ids are ignored.
        assert!(out.iter().all(|a| a.address != "A1234567"));
    }

    #[test]
    fn regex_fallback_pairs_with_most_recent_marker() {
        // No sdnEntry elements at all: the structured pass yields nothing.
        let feed = "\
preamble line with no addresses
Digital Currency Address - ETH
0xDEadbeef00000000000000000000000000000002
Digital Currency Address - TRX
TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t
bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4
";
        let out = extract(feed.as_bytes());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].address_type, "ethereum");
        assert_eq!(out[1].address_type, "tron");
        // Bech32 address inherits the most recent marker.
        assert_eq!(out[2].address_type, "tron");
        assert_eq!(out[0].sdn_name, "UNKNOWN");
    }

    #[test]
    fn en_dash_marker_is_recognized() {
        let feed = "Digital Currency Address \u{2013} USDT\n0xDEadbeef00000000000000000000000000000003\n";
        let out = extract(feed.as_bytes());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].address_type, "tether");
    }

    #[test]
    fn ticker_normalization_table() {
        assert_eq!(normalize_ticker("XBT"), "bitcoin");
        assert_eq!(normalize_ticker("eth"), "ethereum");
        assert_eq!(normalize_ticker("BCH"), "bitcoin-cash");
        assert_eq!(normalize_ticker("USDC"), "usd-coin");
        assert_eq!(normalize_ticker("TRC20"), "tron");
        assert_eq!(normalize_ticker("ERC20"), "ethereum");
        assert_eq!(normalize_ticker("ARB"), "arbitrum");
        // Unknown tickers pass through lower-cased.
        assert_eq!(normalize_ticker("DOGE"), "doge");
    }

    #[test]
    fn duplicate_addresses_are_deduped() {
        let feed = "\
Digital Currency Address - ETH
0xDEadbeef00000000000000000000000000000004
0xdeadbeef00000000000000000000000000000004
";
        let out = extract(feed.as_bytes());
        assert_eq!(out.len(), 1);
    }
}
