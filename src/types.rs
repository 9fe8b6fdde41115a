//! Primitive identifiers shared by every custody component

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Amount in base units (native currency or token atoms)
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// 20-byte identity of an account, node, token or proxy target
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derive a deterministic address from a namespace, a parent address and a nonce.
    ///
    /// Used for escrow, registry and dispatcher account identities so that a
    /// replayed deployment produces the same addresses.
    pub fn derive(namespace: &str, parent: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update(parent.0);
        hasher.update(nonce.to_be_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..32]);
        Self(bytes)
    }

    /// Address derived from a human-readable label (test identities, CLI simulation)
    pub fn from_label(label: &str) -> Self {
        Self::derive(label, &Address::ZERO, 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| format!("invalid address hex: {}", e))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("address must be 20 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Authenticated caller of a custody operation.
///
/// Produced by the host's trust boundary (transaction signer, session
/// credential); the core never derives identity from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub address: Address,
    /// Native value attached to the call
    pub value: Amount,
}

impl Caller {
    pub fn new(address: Address) -> Self {
        Self { address, value: 0 }
    }

    pub fn with_value(address: Address, value: Amount) -> Self {
        Self { address, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::from_label("alice");
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
        assert!(addr.to_string().starts_with("0x"));
        assert_eq!(addr.to_string().len(), 42);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("zz".parse::<Address>().is_err());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let parent = Address::from_label("registry");
        assert_eq!(
            Address::derive("account", &parent, 1),
            Address::derive("account", &parent, 1)
        );
        assert_ne!(
            Address::derive("account", &parent, 1),
            Address::derive("account", &parent, 2)
        );
    }

    #[test]
    fn test_address_serde_as_string() {
        let addr = Address::from_label("node");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
