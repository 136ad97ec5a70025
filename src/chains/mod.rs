//! Chain adapters: transfer discovery and confirmation counting.
//!
//! Both adapters answer the same question for a payment: has the sender
//! moved at least the required amount of the right token to the receiver
//! since the payment was created, and how deep is that transfer buried?
//! Adapter errors are non-fatal per attempt; the monitor's retry budget
//! decides when to give up.

pub mod evm;
pub mod tron;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::config::{AppConfig, Network, Token};
use crate::crypto::AddressCipher;
use crate::models::Payment;
use evm::EvmClient;
use tron::TronClient;

/// Outcome of one transfer search.
#[derive(Debug, Clone, Default)]
pub struct TransferResult {
    pub found: bool,
    pub tx_hash: Option<String>,
    pub confirmations: Option<u32>,
    pub amount: Option<Decimal>,
    /// Block timestamp, milliseconds since epoch.
    pub timestamp: Option<i64>,
    pub block_number: Option<u64>,
}

impl TransferResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// A transfer is accepted when its value reaches this fraction of the
/// required amount (tolerance for decimal-scale rounding at the API
/// boundary).
pub fn min_acceptable_amount(required: Decimal) -> Decimal {
    required * Decimal::new(99, 2)
}

pub fn meets_amount(required: Decimal, actual: Decimal) -> bool {
    actual >= min_acceptable_amount(required)
}

/// Per-network clients plus the cipher needed to recover sender addresses.
/// Dispatch is an exhaustive match on `Network`.
pub struct ChainClients {
    evm: Option<EvmClient>,
    tron: TronClient,
    cipher: Arc<AddressCipher>,
}

impl ChainClients {
    pub fn new(config: &AppConfig, cipher: Arc<AddressCipher>) -> Self {
        Self {
            evm: config
                .alchemy_api_key
                .clone()
                .map(EvmClient::new),
            tron: TronClient::new(
                config.tron_base_url.clone(),
                config.trongrid_api_key.clone(),
            ),
            cipher,
        }
    }

    /// Look for a sufficiently confirmed transfer matching the payment.
    pub async fn find_transfer(&self, payment: &Payment) -> Result<TransferResult> {
        let network = Network::parse(&payment.network)
            .with_context(|| format!("payment {} has unknown network", payment.id))?;
        let token = Token::parse(&payment.token)
            .with_context(|| format!("payment {} has unknown token", payment.id))?;

        let sender = self
            .cipher
            .decrypt(&payment.sender_address_encrypted)
            .context("Failed to decrypt sender address")?;

        match network {
            Network::Arbitrum | Network::Ethereum => match &self.evm {
                Some(client) => client.find_transfer(payment, network, token, &sender).await,
                None => {
                    debug!(
                        payment_id = %payment.id,
                        "EVM monitoring unavailable (no ALCHEMY_API_KEY); payment will expire"
                    );
                    Ok(TransferResult::not_found())
                }
            },
            Network::Tron => self.tron.find_transfer(payment, token, &sender).await,
        }
    }
}
