//! # Audit Events
//!
//! The typed, hash-chained records that form the ledger's externally
//! observable history. The contract layer appends them; nothing in the
//! ledger reads them back to make a decision.

pub mod event;

pub use event::{chain_digest, AuditEvent, EventKind};
