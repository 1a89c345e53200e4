//! # Cryptographic Primitives
//!
//! Hashing only. The ledger authenticates callers at the host boundary and
//! never signs or encrypts anything itself, so there is nothing else to put
//! here. Everything is a thin wrapper around audited implementations.

pub mod hash;

pub use hash::{derive_tx_hash, domain_separated_hash};
