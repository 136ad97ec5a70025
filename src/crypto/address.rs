//! Per-chain sender/receiver address validation and normalization.
//!
//! EVM addresses are 20-byte hex with `0x` prefix; the normalized form is
//! lower-case (no EIP-55 checksum requirement at this boundary). Tron
//! addresses are base58check with a `0x41` version byte and a double-SHA256
//! checksum; the normalized form is the original base58 string.

use crate::config::Network;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("EVM address must be 0x followed by 40 hex characters")]
    MalformedEvm,
    #[error("Tron address must be base58check starting with T")]
    MalformedTron,
    #[error("Tron address checksum mismatch")]
    BadChecksum,
}

/// Validate an address for a network and return its normalized form.
pub fn validate_address(network: Network, address: &str) -> Result<String, AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }
    match network {
        Network::Arbitrum | Network::Ethereum => validate_evm(address),
        Network::Tron => validate_tron(address),
    }
}

fn validate_evm(address: &str) -> Result<String, AddressError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or(AddressError::MalformedEvm)?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::MalformedEvm);
    }
    Ok(format!("0x{}", hex_part.to_lowercase()))
}

fn validate_tron(address: &str) -> Result<String, AddressError> {
    if !address.starts_with('T') || address.len() != 34 {
        return Err(AddressError::MalformedTron);
    }

    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::MalformedTron)?;

    // 1 version byte + 20 payload bytes + 4 checksum bytes
    if decoded.len() != 25 || decoded[0] != 0x41 {
        return Err(AddressError::MalformedTron);
    }

    let (payload, checksum) = decoded.split_at(21);
    let digest = Sha256::digest(Sha256::digest(payload));
    if digest[..4] != *checksum {
        return Err(AddressError::BadChecksum);
    }

    // Base58 case is significant; the validated input is already canonical.
    Ok(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_address_is_lowercased() {
        let normalized = validate_address(
            Network::Ethereum,
            "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        )
        .unwrap();
        assert_eq!(normalized, "0xdac17f958d2ee523a2206206994597c13d831ec7");
    }

    #[test]
    fn evm_rejects_short_and_unprefixed() {
        assert_eq!(
            validate_address(Network::Arbitrum, "0x1234"),
            Err(AddressError::MalformedEvm)
        );
        assert_eq!(
            validate_address(
                Network::Arbitrum,
                "dAC17F958D2ee523a2206206994597C13D831ec7"
            ),
            Err(AddressError::MalformedEvm)
        );
        assert_eq!(
            validate_address(
                Network::Arbitrum,
                "0xZZC17F958D2ee523a2206206994597C13D831ec7"
            ),
            Err(AddressError::MalformedEvm)
        );
    }

    #[test]
    fn tron_accepts_known_contracts() {
        for addr in [
            "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
            "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8",
        ] {
            assert_eq!(validate_address(Network::Tron, addr).unwrap(), addr);
        }
    }

    #[test]
    fn tron_rejects_corrupted_checksum() {
        // Swap two distinct base58 characters; decodes fine, checksum fails.
        let addr = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjL6jt";
        let err = validate_address(Network::Tron, addr).unwrap_err();
        assert!(matches!(
            err,
            AddressError::BadChecksum | AddressError::MalformedTron
        ));
    }

    #[test]
    fn tron_rejects_evm_shape_and_vice_versa() {
        assert!(validate_address(Network::Tron, "0xdAC17F958D2ee523a2206206994597C13D831ec7")
            .is_err());
        assert!(
            validate_address(Network::Ethereum, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t").is_err()
        );
    }

    #[test]
    fn whitespace_is_trimmed() {
        let normalized = validate_address(
            Network::Ethereum,
            "  0xdAC17F958D2ee523a2206206994597C13D831ec7  ",
        )
        .unwrap();
        assert_eq!(normalized, "0xdac17f958d2ee523a2206206994597c13d831ec7");
    }
}
