// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Guard Protocol — Core Library
//!
//! The data model and plumbing underneath the Guard transaction ledger: a
//! permanent, access-controlled record of whether a submitted transaction is
//! pending review, held for manual inspection, verified, rejected, or
//! completed.
//!
//! This crate knows what a transaction record looks like, how to name one,
//! how to hash-chain the audit trail, and how to put all of it on disk. It
//! does not know who is allowed to change what. That lives in the contract
//! crate, which builds on everything here.
//!
//! ## Modules
//!
//! - **types** — `TxHash` and `Address`, the two identifiers every call uses.
//! - **transaction** — the record and its status vocabulary.
//! - **auth** — the owner / relayer roster.
//! - **audit** — typed audit events and the digest chain.
//! - **crypto** — SHA-256 hash derivation and BLAKE3 chain digests.
//! - **clock** — injectable time source.
//! - **storage** — sled persistence with atomic multi-tree commits.
//! - **config** — protocol constants.
//!
//! ## Design Philosophy
//!
//! 1. State transitions are explicit: enum variants, not strings.
//! 2. Nothing is ever deleted. The store is the audit record.
//! 3. If it touches the ledger, it has tests. Plural.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod storage;
pub mod transaction;
pub mod types;

pub use auth::AuthorizationState;
pub use transaction::{Transaction, TransactionStatus, TxStatus};
pub use types::{Address, TxHash};
