//! # Primitive Identifiers
//!
//! The two identifiers every ledger operation speaks in:
//!
//! - [`TxHash`] — the 32-byte opaque key a submitter assigns to a
//!   transaction. Rendered as `0x`-prefixed lowercase hex on the wire.
//! - [`Address`] — a caller or sender identity. Opaque beyond equality; the
//!   only structural property we care about is whether it is the null
//!   identity.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::{TX_HASH_HEX_LENGTH, TX_HASH_LENGTH};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while parsing identifiers from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Wrong number of hex characters.
    #[error("invalid length: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Required number of hex characters.
        expected: usize,
        /// Number of hex characters supplied.
        actual: usize,
    },

    /// The input contained non-hex characters.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Strips an optional `0x` / `0X` prefix.
fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Decodes exactly 32 bytes of hex, with or without a `0x` prefix.
pub(crate) fn decode_hex32(s: &str) -> Result<[u8; 32], ParseError> {
    let digits = strip_hex_prefix(s.trim());
    if digits.len() != TX_HASH_HEX_LENGTH {
        return Err(ParseError::InvalidLength {
            expected: TX_HASH_HEX_LENGTH,
            actual: digits.len(),
        });
    }
    let mut out = [0u8; TX_HASH_LENGTH];
    hex::decode_to_slice(digits, &mut out).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    Ok(out)
}

/// Serde adapter for 32-byte arrays as `0x`-prefixed hex strings.
///
/// Works for both JSON (human-facing) and bincode (storage), since both go
/// through `serialize_str`.
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex32(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// A fixed-size opaque transaction identifier and the registry's primary key.
///
/// Assigned by the submitter, never reassigned. The ledger attaches no
/// meaning to the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; TX_HASH_LENGTH]);

impl TxHash {
    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; TX_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw bytes, used as the storage key.
    pub fn as_bytes(&self) -> &[u8; TX_HASH_LENGTH] {
        &self.0
    }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses 64 hex characters, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        decode_hex32(s).map(Self)
    }
}

impl From<[u8; TX_HASH_LENGTH]> for TxHash {
    fn from(bytes: [u8; TX_HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl FromStr for TxHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex32::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex32::deserialize(deserializer).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A caller or sender identity.
///
/// The ledger compares addresses for equality and nothing else. The null
/// identity (empty, or `0x` followed only by zeros) is never a valid owner
/// or relayer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an identity string. Surrounding whitespace is trimmed so that
    /// `" alice"` and `"alice"` are the same caller.
    pub fn new(value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self(value.trim().to_string())
    }

    /// The canonical null identity.
    pub fn zero() -> Self {
        Self(String::new())
    }

    /// True for the empty identity and for `0x000…0` in any length.
    pub fn is_zero(&self) -> bool {
        if self.0.is_empty() {
            return true;
        }
        match strip_hex_prefix(&self.0) {
            digits if digits.len() < self.0.len() => digits.chars().all(|c| c == '0'),
            _ => false,
        }
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_parses_with_and_without_prefix() {
        let raw = "ab".repeat(32);
        let a: TxHash = raw.parse().unwrap();
        let b: TxHash = format!("0x{raw}").parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), &[0xab; 32]);
    }

    #[test]
    fn tx_hash_displays_prefixed_lowercase() {
        let h = TxHash::new([0xAB; 32]);
        assert_eq!(h.to_string(), format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn tx_hash_rejects_wrong_length() {
        let err = TxHash::from_hex("0xdeadbeef").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidLength {
                expected: 64,
                actual: 8
            }
        );
    }

    #[test]
    fn tx_hash_rejects_non_hex() {
        let bad = "zz".repeat(32);
        assert!(matches!(
            TxHash::from_hex(&bad),
            Err(ParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn tx_hash_json_is_hex_string() {
        let h = TxHash::new([1u8; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(32)));
        let back: TxHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn zero_addresses() {
        assert!(Address::zero().is_zero());
        assert!(Address::new("").is_zero());
        assert!(Address::new("   ").is_zero());
        assert!(Address::new("0x0").is_zero());
        assert!(Address::new(format!("0x{}", "0".repeat(40))).is_zero());
    }

    #[test]
    fn non_zero_addresses() {
        assert!(!Address::new("alice").is_zero());
        assert!(!Address::new("0").is_zero());
        assert!(!Address::new("0x01").is_zero());
        assert!(!Address::new("0xabc").is_zero());
    }

    #[test]
    fn address_trims_whitespace() {
        assert_eq!(Address::new(" relayer "), Address::new("relayer"));
    }
}
