//! # Ledger Errors
//!
//! One variant per way a ledger operation can refuse. Every error aborts the
//! whole operation: no record changes, no roster changes, no audit event.

use std::fmt;

use guard_protocol::storage::DbError;
use guard_protocol::{Address, TxHash, TxStatus};
use thiserror::Error;

/// The role an operation demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single owner.
    Owner,
    /// The primary relayer or any authorized relayer.
    Relayer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Relayer => write!(f, "relayer"),
        }
    }
}

/// Stable machine-readable error codes for the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    NotFound,
    Duplicate,
    InvalidState,
    Validation,
    Storage,
    Integrity,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Duplicate => "DUPLICATE",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Storage => "STORAGE_ERROR",
            ErrorKind::Integrity => "INTEGRITY_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The caller lacks the role the operation requires.
    #[error("unauthorized: {caller} is not the {required}")]
    Unauthorized {
        /// The identity that attempted the operation.
        caller: Address,
        /// The role the operation requires.
        required: Role,
    },

    /// No record exists for the hash.
    #[error("transaction not found: {0}")]
    NotFound(TxHash),

    /// A record already exists for the hash.
    #[error("duplicate transaction: {0} already submitted")]
    Duplicate(TxHash),

    /// The record is not in the state the operation requires.
    #[error("invalid state: {tx_hash} is {current}, expected {expected}")]
    InvalidState {
        tx_hash: TxHash,
        /// Current record status.
        current: TxStatus,
        /// Human-readable description of the required status.
        expected: &'static str,
    },

    /// Malformed input: non-positive amount, null identity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persisting the operation failed; nothing was applied.
    #[error("storage failure: {0}")]
    Storage(#[from] DbError),

    /// The stored audit chain does not verify.
    #[error("audit chain broken at event {seq}")]
    Integrity {
        /// First event whose digest does not match.
        seq: u64,
    },

    /// A stored record disagrees with the state its audit events produce.
    #[error("stored record {0} does not match its audit trail")]
    RecordMismatch(TxHash),
}

impl LedgerError {
    /// The stable code for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Unauthorized { .. } => ErrorKind::Authorization,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Duplicate(_) => ErrorKind::Duplicate,
            LedgerError::InvalidState { .. } => ErrorKind::InvalidState,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Storage(_) => ErrorKind::Storage,
            LedgerError::Integrity { .. } | LedgerError::RecordMismatch(_) => {
                ErrorKind::Integrity
            }
        }
    }
}

/// Convenience alias used throughout the contract crate.
pub type LedgerResult<T> = Result<T, LedgerError>;
