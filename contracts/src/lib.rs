// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Guard Ledger Contract
//!
//! The rules of the Guard ledger: who may change what, and which status
//! transitions are legal.
//!
//! - **Access Control** — single owner, a primary relayer, and a set of
//!   authorized relayers. Owner-only roster management.
//! - **Transaction Registry** — one record per submitted hash, moved through
//!   `Pending → Held → Verified | Rejected`, then `Verified → Completed`.
//! - **Audit Log** — hash-chained, append-only trail of every successful
//!   mutation.
//! - **Ledger** — the three above behind one lock, with optional sled
//!   persistence. This is what callers use.
//!
//! ## Design Principles
//!
//! 1. Every operation is all-or-nothing. A failed call changes no state and
//!    emits no event.
//! 2. Authorization is checked first, then existence, then state.
//! 3. Reads never fail. A missing record is `NOT_FOUND`, not an error.
//! 4. Records are never deleted; the registry is the permanent record.

pub mod access_control;
pub mod audit_log;
pub mod error;
pub mod ledger;
pub mod transaction_registry;

pub use access_control::AccessControl;
pub use audit_log::AuditLog;
pub use error::{ErrorKind, LedgerError, LedgerResult, Role};
pub use ledger::{EventObserver, Ledger, LedgerSummary};
pub use transaction_registry::{TransactionRegistry, VerificationPolicy};
