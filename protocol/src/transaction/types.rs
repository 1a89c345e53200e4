//! Status vocabulary for ledger transactions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TxStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an existing transaction record.
///
/// `Rejected` and `Completed` are terminal: the guarded transitions never
/// leave them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Submitted, awaiting a relayer decision.
    Pending,
    /// Parked for manual review by the owner.
    Held,
    /// Cleared, either by a relayer or by owner release.
    Verified,
    /// Refused, either by a relayer or by owner release.
    Rejected,
    /// Verified and closed out by the owner.
    Completed,
}

impl TxStatus {
    /// Whether no guarded transition is defined out of this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, TxStatus::Rejected | TxStatus::Completed)
    }

    /// Every status, in lifecycle order. Handy for per-status counters.
    pub const ALL: [TxStatus; 5] = [
        TxStatus::Pending,
        TxStatus::Held,
        TxStatus::Verified,
        TxStatus::Rejected,
        TxStatus::Completed,
    ];
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TransactionStatus::from(*self).as_str())
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

/// What a reader sees when asking about a hash: one of the five record
/// states, or `NotFound` when no record exists.
///
/// The upper-case strings are the serialization contract. Internal logic
/// branches on [`TxStatus`], never on these strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    NotFound,
    Pending,
    Held,
    Verified,
    Rejected,
    Completed,
}

impl TransactionStatus {
    /// The wire string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Pending => "PENDING",
            Self::Held => "HELD",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl From<TxStatus> for TransactionStatus {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Pending => Self::Pending,
            TxStatus::Held => Self::Held,
            TxStatus::Verified => Self::Verified,
            TxStatus::Rejected => Self::Rejected,
            TxStatus::Completed => Self::Completed,
        }
    }
}

impl From<Option<TxStatus>> for TransactionStatus {
    fn from(status: Option<TxStatus>) -> Self {
        status.map_or(Self::NotFound, Self::from)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_FOUND" => Ok(Self::NotFound),
            "PENDING" => Ok(Self::Pending),
            "HELD" => Ok(Self::Held),
            "VERIFIED" => Ok(Self::Verified),
            "REJECTED" => Ok(Self::Rejected),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}
