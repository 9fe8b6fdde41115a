//! One-time passphrase authentication
//!
//! Clients never hand the core a plaintext passphrase to store. They submit
//! the SHA-256 hash of the bytes32-encoded passphrase at account creation and
//! on every authenticated call, together with the encoded passphrase that
//! matches the currently stored hash. The stored hash is replaced on every
//! successful call, so each encoded passphrase authenticates exactly once.

use crate::error::{CustodyError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Passphrase encoded as a right-padded 32-byte word
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedPassphrase([u8; 32]);

impl EncodedPassphrase {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encode text as bytes32: UTF-8 bytes, right-padded with zeros.
    /// Longer passphrases are rejected rather than cut, so two of them can
    /// never collide on a shared prefix.
    pub fn from_text(passphrase: &str) -> Result<Self> {
        let raw = passphrase.as_bytes();
        if raw.len() > 32 {
            return Err(CustodyError::PassphraseTooLong(raw.len()));
        }
        let mut bytes = [0u8; 32];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self(bytes))
    }

    /// Fresh random passphrase
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn hash(&self) -> PassphraseHash {
        let digest = Sha256::digest(self.0);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        PassphraseHash(out)
    }
}

impl fmt::Debug for EncodedPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncodedPassphrase(<redacted>)")
    }
}

/// SHA-256 of an encoded passphrase
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassphraseHash([u8; 32]);

impl PassphraseHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash of a plaintext passphrase, as a client would compute it
    pub fn of_text(passphrase: &str) -> Result<Self> {
        Ok(EncodedPassphrase::from_text(passphrase)?.hash())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, String> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| format!("invalid hash hex: {}", e))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("hash must be 32 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }

    /// Check an encoded passphrase against this hash
    pub fn verify(&self, passphrase: &EncodedPassphrase) -> bool {
        let candidate = passphrase.hash();
        // Compare every byte regardless of where the first difference is
        self.0
            .iter()
            .zip(candidate.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for PassphraseHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PassphraseHash(0x{})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_verification() {
        let passphrase = EncodedPassphrase::from_text("@@@ Some Random Passphrase @@@").unwrap();
        let hash = passphrase.hash();

        assert!(hash.verify(&passphrase));
        assert!(!hash.verify(&EncodedPassphrase::from_text("||| Wrong Passphrase |||").unwrap()));
    }

    #[test]
    fn test_encoding_pads_short_passphrases() {
        let short = EncodedPassphrase::from_text("abc").unwrap();
        assert_eq!(&short.0[..3], b"abc");
        assert!(short.0[3..].iter().all(|b| *b == 0));

        let full = EncodedPassphrase::from_text(&"x".repeat(32)).unwrap();
        assert!(full.0.iter().all(|b| *b == b'x'));
    }

    #[test]
    fn test_long_passphrases_are_rejected() {
        let shared = "y".repeat(32);
        assert_eq!(
            EncodedPassphrase::from_text(&format!("{}first", shared)),
            Err(CustodyError::PassphraseTooLong(37))
        );
        assert_eq!(
            PassphraseHash::of_text(&format!("{}second", shared)),
            Err(CustodyError::PassphraseTooLong(38))
        );
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = PassphraseHash::of_text("secret").unwrap();
        assert_eq!(PassphraseHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(PassphraseHash::from_hex("00").is_err());
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let passphrase = EncodedPassphrase::from_text("hunter2").unwrap();
        assert!(!format!("{:?}", passphrase).contains("hunter2"));
    }

    #[test]
    fn test_random_passphrases_differ() {
        let a = EncodedPassphrase::random();
        let b = EncodedPassphrase::random();
        assert_ne!(a, b);
        assert!(!a.hash().verify(&b));
    }
}
