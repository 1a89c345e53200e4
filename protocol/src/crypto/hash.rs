//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256** — for transaction hash derivation. Callers outside the
//!   ledger (payment backends, relayers) already speak SHA-256, so the
//!   derived `txHash` uses it too.
//!
//! - **BLAKE3** — for the audit chain. Internal to the ledger, so we use
//!   the faster hash, with `derive_key` domain separation so an audit digest
//!   can never be confused with anything else we hash.

use sha2::{Digest, Sha256};

use crate::types::{Address, TxHash};

/// Domain tag for audit chain digests.
pub const AUDIT_CHAIN_CONTEXT: &str = "guard-ledger 2026 audit-chain v1";

/// Compute a domain-separated BLAKE3 hash over several parts.
///
/// Uses BLAKE3's `derive_key` mode, so hashes under different contexts never
/// collide even for identical input. Parts are fed sequentially; callers are
/// responsible for making the encoding unambiguous (fixed widths or length
/// prefixes).
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Derives a transaction hash for submitters that do not bring their own.
///
/// `SHA-256(len(reference) ‖ reference ‖ len(sender) ‖ sender ‖ amount)`,
/// lengths and amount as big-endian `u64`. Length prefixes keep
/// `("ab", "c")` and `("a", "bc")` apart.
pub fn derive_tx_hash(reference: &str, sender: &Address, amount: u64) -> TxHash {
    let reference = reference.as_bytes();
    let sender = sender.as_str().as_bytes();

    let mut hasher = Sha256::new();
    hasher.update((reference.len() as u64).to_be_bytes());
    hasher.update(reference);
    hasher.update((sender.len() as u64).to_be_bytes());
    hasher.update(sender);
    hasher.update(amount.to_be_bytes());

    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    TxHash::new(out)
}
