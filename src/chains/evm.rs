//! EVM adapter (Arbitrum, Ethereum) over the Alchemy transfers API.
//!
//! Search strategy: ask for the newest ERC-20 transfers from the sender to
//! the receiver on the token contract, drop anything older than the payment,
//! accept the first transfer that clears the amount floor and the network's
//! confirmation depth.

use anyhow::{Context, Result};
use chrono::DateTime;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

use crate::config::{ChainConfig, Network, Token};
use crate::models::Payment;

use super::{meets_amount, TransferResult};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Newest-first result cap (0x32 = 50).
const MAX_TRANSFERS: &str = "0x32";

pub struct EvmClient {
    client: reqwest::Client,
    api_key: String,
}

impl EvmClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build EVM HTTP client");
        Self { client, api_key }
    }

    pub async fn find_transfer(
        &self,
        payment: &Payment,
        network: Network,
        token: Token,
        sender: &str,
    ) -> Result<TransferResult> {
        let base = ChainConfig::alchemy_base_url(network)
            .context("EVM adapter called for a non-EVM network")?;
        let url = format!("{}/{}", base, self.api_key);
        let contract = ChainConfig::token_contract(network, token);

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "alchemy_getAssetTransfers",
            "params": [{
                "fromBlock": "0x0",
                "toBlock": "latest",
                "fromAddress": sender,
                "toAddress": payment.receiver_address,
                "contractAddresses": [contract],
                "category": ["erc20"],
                "withMetadata": true,
                "order": "desc",
                "maxCount": MAX_TRANSFERS,
            }]
        });

        let response: serde_json::Value = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Alchemy transfers request failed")?
            .json()
            .await
            .context("Failed to parse Alchemy transfers response")?;

        if let Some(err) = response.get("error") {
            anyhow::bail!("Alchemy RPC error: {err}");
        }

        let transfers = response["result"]["transfers"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        if transfers.is_empty() {
            return Ok(TransferResult::not_found());
        }

        let current_block = self.current_block(&url).await?;
        let required = payment.amount_decimal()?;
        let min_confirmations = ChainConfig::min_confirmations(network);
        let created_at_millis = payment.created_at.and_utc().timestamp_millis();

        for transfer in &transfers {
            let Some(hash) = transfer["hash"].as_str() else {
                continue;
            };

            // The chain block timestamp is authoritative for the "after
            // creation" guard; the comparison is inclusive.
            let block_ts = transfer["metadata"]["blockTimestamp"]
                .as_str()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.timestamp_millis());
            match block_ts {
                Some(ts) if ts >= created_at_millis => {}
                _ => continue,
            }

            let Some(amount) = transfer["value"].as_f64().and_then(Decimal::from_f64_retain)
            else {
                continue;
            };
            if !meets_amount(required, amount) {
                debug!(
                    payment_id = %payment.id,
                    tx = hash,
                    %amount,
                    %required,
                    "transfer below amount floor"
                );
                continue;
            }

            let Some(tx_block) = transfer["blockNum"].as_str().and_then(parse_hex_block)
            else {
                continue;
            };

            let confirmations = current_block.saturating_sub(tx_block) as u32 + 1;
            if confirmations < min_confirmations {
                debug!(
                    payment_id = %payment.id,
                    tx = hash,
                    confirmations,
                    min_confirmations,
                    "transfer found, waiting for confirmations"
                );
                return Ok(TransferResult::not_found());
            }

            return Ok(TransferResult {
                found: true,
                tx_hash: Some(hash.to_string()),
                confirmations: Some(confirmations),
                amount: Some(amount),
                timestamp: block_ts,
                block_number: Some(tx_block),
            });
        }

        Ok(TransferResult::not_found())
    }

    async fn current_block(&self, url: &str) -> Result<u64> {
        let response: serde_json::Value = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_blockNumber",
                "params": []
            }))
            .send()
            .await
            .context("eth_blockNumber request failed")?
            .json()
            .await
            .context("Failed to parse eth_blockNumber response")?;

        response["result"]
            .as_str()
            .and_then(parse_hex_block)
            .context("eth_blockNumber returned no block")
    }
}

fn parse_hex_block(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_block_parsing() {
        assert_eq!(parse_hex_block("0x10"), Some(16));
        assert_eq!(parse_hex_block("0x0"), Some(0));
        assert_eq!(parse_hex_block("nonsense"), None);
    }

    #[test]
    fn confirmation_count_is_inclusive() {
        // A transfer in the current head block counts as 1 confirmation.
        let current: u64 = 1000;
        let tx_block: u64 = 1000;
        assert_eq!(current.saturating_sub(tx_block) as u32 + 1, 1);
        // Depth 3 is reached two blocks later.
        assert_eq!(1002u64.saturating_sub(tx_block) as u32 + 1, 3);
    }
}
