//! Static per-chain configuration: supported networks and tokens, token
//! contract addresses, confirmation depths, and explorer URLs.
//!
//! `Network` and `Token` are closed enumerations so adapter dispatch and
//! config lookup stay exhaustive at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported settlement networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Arbitrum,
    Ethereum,
    Tron,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Arbitrum, Network::Ethereum, Network::Tron];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Arbitrum => "arbitrum",
            Network::Ethereum => "ethereum",
            Network::Tron => "tron",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "arbitrum" => Some(Network::Arbitrum),
            "ethereum" => Some(Network::Ethereum),
            "tron" => Some(Network::Tron),
            _ => None,
        }
    }

    /// Arbitrum and Ethereum share the EVM adapter; Tron has its own.
    pub fn is_evm(&self) -> bool {
        matches!(self, Network::Arbitrum | Network::Ethereum)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported stablecoins. Both settle with 6 decimals on every supported
/// network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    #[serde(rename = "USDT")]
    Usdt,
    #[serde(rename = "USDC")]
    Usdc,
}

impl Token {
    pub const ALL: [Token; 2] = [Token::Usdt, Token::Usdc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Usdt => "USDT",
            Token::Usdc => "USDC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "USDT" => Some(Token::Usdt),
            "USDC" => Some(Token::Usdc),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token decimal places; identical for USDT and USDC on all three networks.
pub const TOKEN_DECIMALS: u32 = 6;

/// Static chain parameters.
pub struct ChainConfig;

impl ChainConfig {
    /// Token contract address for a (network, token) pair.
    pub fn token_contract(network: Network, token: Token) -> &'static str {
        match (network, token) {
            (Network::Arbitrum, Token::Usdt) => "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9",
            (Network::Arbitrum, Token::Usdc) => "0xaf88d065e77c8cC2239327C5EDb3A432268e5831",
            (Network::Ethereum, Token::Usdt) => "0xdAC17F958D2ee523a2206206994597C13D831ec7",
            (Network::Ethereum, Token::Usdc) => "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
            (Network::Tron, Token::Usdt) => "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
            (Network::Tron, Token::Usdc) => "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8",
        }
    }

    /// Blocks on top of the transfer's block (inclusive of the transfer's
    /// own block) required before a transfer is accepted. The same inclusive
    /// convention (`current - tx + 1`) is applied on every network.
    pub fn min_confirmations(network: Network) -> u32 {
        match network {
            Network::Arbitrum | Network::Ethereum => 3,
            Network::Tron => 19,
        }
    }

    /// Public explorer URL for a transaction hash.
    pub fn explorer_tx_url(network: Network, tx_hash: &str) -> String {
        match network {
            Network::Arbitrum => format!("https://arbiscan.io/tx/{tx_hash}"),
            Network::Ethereum => format!("https://etherscan.io/tx/{tx_hash}"),
            Network::Tron => format!("https://tronscan.org/#/transaction/{tx_hash}"),
        }
    }

    /// Alchemy JSON-RPC base URL (EVM networks only).
    pub fn alchemy_base_url(network: Network) -> Option<&'static str> {
        match network {
            Network::Arbitrum => Some("https://arb-mainnet.g.alchemy.com/v2"),
            Network::Ethereum => Some("https://eth-mainnet.g.alchemy.com/v2"),
            Network::Tron => None,
        }
    }

    /// Advisory metadata for the `/networks` endpoint.
    pub fn network_hint(network: Network) -> NetworkHint {
        match network {
            Network::Arbitrum => NetworkHint {
                fee_hint: "~$0.01",
                confirmation_time: "~1 minute",
                recommended: true,
            },
            Network::Ethereum => NetworkHint {
                fee_hint: "$1-10",
                confirmation_time: "~1 minute",
                recommended: false,
            },
            Network::Tron => NetworkHint {
                fee_hint: "~$1",
                confirmation_time: "~1 minute",
                recommended: false,
            },
        }
    }
}

/// Static fee/latency hints surfaced on the networks endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkHint {
    pub fee_hint: &'static str,
    pub confirmation_time: &'static str,
    pub recommended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_round_trips_through_strings() {
        for network in Network::ALL {
            assert_eq!(Network::parse(network.as_str()), Some(network));
        }
        assert_eq!(Network::parse("solana"), None);
    }

    #[test]
    fn token_parse_is_case_insensitive() {
        assert_eq!(Token::parse("usdt"), Some(Token::Usdt));
        assert_eq!(Token::parse("USDC"), Some(Token::Usdc));
        assert_eq!(Token::parse("DAI"), None);
    }

    #[test]
    fn confirmation_depths() {
        assert_eq!(ChainConfig::min_confirmations(Network::Arbitrum), 3);
        assert_eq!(ChainConfig::min_confirmations(Network::Ethereum), 3);
        assert_eq!(ChainConfig::min_confirmations(Network::Tron), 19);
    }

    #[test]
    fn every_pair_has_a_contract() {
        for network in Network::ALL {
            for token in Token::ALL {
                assert!(!ChainConfig::token_contract(network, token).is_empty());
            }
        }
    }

    #[test]
    fn explorer_urls() {
        assert_eq!(
            ChainConfig::explorer_tx_url(Network::Ethereum, "0xabc"),
            "https://etherscan.io/tx/0xabc"
        );
        assert!(ChainConfig::explorer_tx_url(Network::Tron, "deadbeef")
            .starts_with("https://tronscan.org/#/transaction/"));
    }
}
