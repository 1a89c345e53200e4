//! # Transaction Records
//!
//! The registry's unit of storage: one [`Transaction`] per `txHash`, plus the
//! two status enums that describe where it sits in the verification state
//! machine.
//!
//! ```text
//! (absent) ──submit──▶ Pending ──hold──▶ Held ──release──▶ Verified ──complete──▶ Completed
//!                                              └─────────▶ Rejected
//! ```
//!
//! [`TxStatus`] is the closed, five-state enum the state machine branches
//! on. [`TransactionStatus`] is the reader-facing view that adds `NotFound`
//! and owns the `NOT_FOUND | PENDING | …` string contract.

pub mod record;
pub mod types;

pub use record::Transaction;
pub use types::{TransactionStatus, TxStatus};
