//! # Storage Module
//!
//! Persistence for the ledger. The contract layer keeps its working state in
//! memory and treats storage as a write-behind log: every successful
//! operation commits its write set here before it is acknowledged, and a
//! restarted node replays the stored snapshot.
//!
//! ## Design Decisions
//!
//! 1. **sled.** Embedded, transactional across trees, no server to run.
//! 2. **Bincode on disk.** Compact, fast, deterministic. JSON is for the API.
//! 3. **No deletes.** There is no code path that removes a key. The ledger is
//!    its own permanent audit record.

pub mod db;

pub use db::{DbError, DbResult, LedgerDb, LedgerStore, Snapshot, WriteSet};
