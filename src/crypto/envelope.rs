//! AES-256-GCM envelope for sender addresses, plus the deterministic HMAC
//! used for indexed lookups without decryption.
//!
//! Envelope format: `<iv_hex>:<auth_tag_hex>:<ciphertext_hex>`
//! - 16-byte random IV per encryption
//! - 16-byte GCM auth tag
//! - key = scrypt(SESSION_SECRET, "payment-salt", N=2^14, r=8, p=1, dklen=32)
//!
//! Sender HMAC: HMAC-SHA256(SESSION_SECRET, lower(address)), hex.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// AES-256-GCM with the 16-byte IV the envelope format carries.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

type HmacSha256 = Hmac<Sha256>;

const KEY_SALT: &[u8] = b"payment-salt";
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),
}

/// Encrypts and looks up sender addresses. Constructed once at startup from
/// `SESSION_SECRET` and shared across the engine and the chain adapters.
pub struct AddressCipher {
    key: [u8; 32],
    hmac_key: Vec<u8>,
}

impl AddressCipher {
    /// Derive the AES key from the session secret with scrypt.
    pub fn from_secret(session_secret: &str) -> Result<Self, CryptoError> {
        let params =
            scrypt::Params::new(14, 8, 1, 32).map_err(|_| CryptoError::KeyDerivation)?;
        let mut key = [0u8; 32];
        scrypt::scrypt(session_secret.as_bytes(), KEY_SALT, &params, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(Self {
            key,
            hmac_key: session_secret.as_bytes().to_vec(),
        })
    }

    /// Encrypt a normalized address into the `iv:tag:ct` envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher =
            Aes256Gcm16::new_from_slice(&self.key).map_err(|_| CryptoError::Encrypt)?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        // The AEAD appends the tag to the ciphertext; the envelope carries
        // them as separate hex fields.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Open an `iv:tag:ct` envelope.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let mut parts = envelope.splitn(3, ':');
        let iv_hex = parts
            .next()
            .ok_or(CryptoError::MalformedEnvelope("missing iv"))?;
        let tag_hex = parts
            .next()
            .ok_or(CryptoError::MalformedEnvelope("missing auth tag"))?;
        let ct_hex = parts
            .next()
            .ok_or(CryptoError::MalformedEnvelope("missing ciphertext"))?;

        let iv = hex::decode(iv_hex).map_err(|_| CryptoError::MalformedEnvelope("bad iv hex"))?;
        let tag =
            hex::decode(tag_hex).map_err(|_| CryptoError::MalformedEnvelope("bad tag hex"))?;
        let ciphertext = hex::decode(ct_hex)
            .map_err(|_| CryptoError::MalformedEnvelope("bad ciphertext hex"))?;

        if iv.len() != IV_LEN {
            return Err(CryptoError::MalformedEnvelope("iv must be 16 bytes"));
        }
        if tag.len() != TAG_LEN {
            return Err(CryptoError::MalformedEnvelope("auth tag must be 16 bytes"));
        }

        let cipher =
            Aes256Gcm16::new_from_slice(&self.key).map_err(|_| CryptoError::Decrypt)?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Deterministic lookup digest: HMAC-SHA256 over the lower-cased
    /// address, hex-encoded. Stable across restarts for a fixed secret.
    pub fn address_hmac(&self, address: &str) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hmac_key)
            .expect("HMAC can take key of any size");
        mac.update(address.to_lowercase().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AddressCipher {
        AddressCipher::from_secret("test-session-secret-0123456789abcdef").unwrap()
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        let addr = "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9";
        let envelope = c.encrypt(addr).unwrap();
        assert_eq!(c.decrypt(&envelope).unwrap(), addr);
    }

    #[test]
    fn envelope_shape() {
        let c = cipher();
        let envelope = c.encrypt("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t").unwrap();
        let parts: Vec<&str> = envelope.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32); // 16-byte IV
        assert_eq!(parts[1].len(), 32); // 16-byte tag
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let c = cipher();
        let a = c.encrypt("0xabc").unwrap();
        let b = c.encrypt("0xabc").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let c = cipher();
        let envelope = c.encrypt("0xabcdef").unwrap();
        let mut parts: Vec<String> = envelope.split(':').map(String::from).collect();
        // Flip a ciphertext nibble.
        let last = parts[2].pop().unwrap();
        parts[2].push(if last == '0' { '1' } else { '0' });
        assert!(c.decrypt(&parts.join(":")).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let envelope = cipher().encrypt("0xabcdef").unwrap();
        let other = AddressCipher::from_secret("a-completely-different-secret!!!").unwrap();
        assert!(other.decrypt(&envelope).is_err());
    }

    #[test]
    fn hmac_is_deterministic_and_case_insensitive() {
        let c = cipher();
        let a = c.address_hmac("0xAbCd");
        let b = c.address_hmac("0xabcd");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        // A second instance from the same secret agrees.
        let again = cipher().address_hmac("0xabcd");
        assert_eq!(a, again);
    }
}
