//! # Protocol Configuration & Constants
//!
//! Every magic number in the Guard ledger lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Runtime configuration (ports, data directory, the initializing owner) is
//! owned by the node binary and loaded from TOML. What lives here are the
//! values that define the ledger itself and must not drift between builds.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The ledger protocol version. Bump on any change to the record layout,
/// the audit digest construction, or the status serialization contract.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Schema version written into the storage metadata tree. A node refuses to
/// open a database written with a different schema.
pub const STORAGE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Transaction hashes are fixed-size opaque identifiers. 32 bytes, always.
pub const TX_HASH_LENGTH: usize = 32;

/// Hex length of a transaction hash, without the optional `0x` prefix.
pub const TX_HASH_HEX_LENGTH: usize = TX_HASH_LENGTH * 2;

/// Audit chain digests are BLAKE3 outputs.
pub const DIGEST_LENGTH: usize = 32;

/// The digest every audit chain starts from. Event 0 chains off this.
pub const GENESIS_DIGEST: [u8; DIGEST_LENGTH] = [0u8; DIGEST_LENGTH];

// ---------------------------------------------------------------------------
// Risk Classification
// ---------------------------------------------------------------------------

/// Scores strictly above this are classified `high`.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Scores strictly above this (and not high) are classified `medium`.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.3;

/// Reason recorded when a low-risk transaction is cleared automatically.
pub const AUTO_CLEAR_REASON: &str = "auto-cleared: low risk";

// ---------------------------------------------------------------------------
// Service Defaults
// ---------------------------------------------------------------------------

/// Default port for the REST / JSON-RPC API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Broadcast channel capacity for live audit event streaming.
/// 256 absorbs short bursts without dropping events for WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default page size for audit log queries.
pub const DEFAULT_EVENT_PAGE_SIZE: usize = 100;

/// Hard cap on audit log page size. Ask for more, get this many.
pub const MAX_EVENT_PAGE_SIZE: usize = 1_000;
