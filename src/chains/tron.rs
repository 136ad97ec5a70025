//! Tron adapter over the TronGrid REST API.
//!
//! TRC-20 transfers arrive through the account transactions endpoint with
//! raw integer values; confirmation depth needs a second call for the
//! transaction's block plus the current block height.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

use crate::config::{chains::TOKEN_DECIMALS, ChainConfig, Network, Token};
use crate::models::Payment;

use super::{meets_amount, TransferResult};

const REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_TRANSFERS: u32 = 50;

pub struct TronClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TronClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build Tron HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }
        req
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }
        req
    }

    pub async fn find_transfer(
        &self,
        payment: &Payment,
        token: Token,
        sender: &str,
    ) -> Result<TransferResult> {
        let contract = ChainConfig::token_contract(Network::Tron, token);
        let created_at_millis = payment.created_at.and_utc().timestamp_millis();

        let url = format!(
            "{}/v1/accounts/{}/transactions/trc20",
            self.base_url, payment.receiver_address
        );

        let response: serde_json::Value = self
            .get(&url)
            .query(&[
                ("only_to", "true".to_string()),
                ("contract_address", contract.to_string()),
                ("min_timestamp", created_at_millis.to_string()),
                ("limit", MAX_TRANSFERS.to_string()),
                ("order_by", "block_timestamp,desc".to_string()),
            ])
            .send()
            .await
            .context("TronGrid transfers request failed")?
            .json()
            .await
            .context("Failed to parse TronGrid transfers response")?;

        let transfers = response["data"].as_array().cloned().unwrap_or_default();
        if transfers.is_empty() {
            return Ok(TransferResult::not_found());
        }

        let required = payment.amount_decimal()?;
        let min_confirmations = ChainConfig::min_confirmations(Network::Tron);

        for transfer in &transfers {
            let Some(from) = transfer["from"].as_str() else {
                continue;
            };
            if !from.eq_ignore_ascii_case(sender) {
                continue;
            }

            let Some(tx_id) = transfer["transaction_id"].as_str() else {
                continue;
            };

            let block_ts = transfer["block_timestamp"].as_i64();
            if matches!(block_ts, Some(ts) if ts < created_at_millis) {
                continue;
            }

            let Some(amount) = transfer["value"]
                .as_str()
                .and_then(|raw| raw.parse::<i128>().ok())
                .map(|raw| Decimal::from_i128_with_scale(raw, TOKEN_DECIMALS))
            else {
                continue;
            };
            if !meets_amount(required, amount) {
                debug!(
                    payment_id = %payment.id,
                    tx = tx_id,
                    %amount,
                    %required,
                    "TRC-20 transfer below amount floor"
                );
                continue;
            }

            let Some(tx_block) = self.transaction_block(tx_id).await? else {
                // Not yet in a block; check again next tick.
                return Ok(TransferResult::not_found());
            };
            let current_block = self.current_block().await?;

            // Same inclusive convention as the EVM side.
            let confirmations = current_block.saturating_sub(tx_block) as u32 + 1;
            if confirmations < min_confirmations {
                debug!(
                    payment_id = %payment.id,
                    tx = tx_id,
                    confirmations,
                    min_confirmations,
                    "TRC-20 transfer found, waiting for confirmations"
                );
                return Ok(TransferResult::not_found());
            }

            return Ok(TransferResult {
                found: true,
                tx_hash: Some(tx_id.to_string()),
                confirmations: Some(confirmations),
                amount: Some(amount),
                timestamp: block_ts,
                block_number: Some(tx_block),
            });
        }

        Ok(TransferResult::not_found())
    }

    async fn transaction_block(&self, tx_id: &str) -> Result<Option<u64>> {
        let url = format!("{}/wallet/gettransactioninfobyid", self.base_url);
        let response: serde_json::Value = self
            .post(&url)
            .json(&serde_json::json!({ "value": tx_id }))
            .send()
            .await
            .context("Tron transaction info request failed")?
            .json()
            .await
            .context("Failed to parse Tron transaction info response")?;

        Ok(response["blockNumber"].as_u64())
    }

    async fn current_block(&self) -> Result<u64> {
        let url = format!("{}/wallet/getnowblock", self.base_url);
        let response: serde_json::Value = self
            .post(&url)
            .send()
            .await
            .context("Tron current block request failed")?
            .json()
            .await
            .context("Failed to parse Tron current block response")?;

        response["block_header"]["raw_data"]["number"]
            .as_u64()
            .context("Tron current block response missing height")
    }
}
