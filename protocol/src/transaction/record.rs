//! The transaction record stored under each `txHash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::TxStatus;
use crate::types::{Address, TxHash};

/// A transaction tracked by the ledger.
///
/// The ledger tracks verification status and reasons only; it never moves
/// value. `tx_hash`, `sender`, `amount`, and `created_at` are fixed at
/// submission. `status`, `reason`, and `updated_at` change with each
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Submitter-assigned key.
    pub tx_hash: TxHash,
    /// Sending identity. Compared for equality only.
    pub sender: Address,
    /// Transaction amount in the smallest unit. Always `> 0`.
    pub amount: u64,
    /// When the record was submitted.
    pub created_at: DateTime<Utc>,
    /// When the record last transitioned. Equals `created_at` until then.
    pub updated_at: DateTime<Utc>,
    /// Current state-machine position.
    pub status: TxStatus,
    /// Free-text annotation from the most recent transition. Empty at creation.
    pub reason: String,
}

impl Transaction {
    /// A freshly submitted record: `Pending`, empty reason.
    pub fn pending(tx_hash: TxHash, sender: Address, amount: u64, now: DateTime<Utc>) -> Self {
        Self {
            tx_hash,
            sender,
            amount,
            created_at: now,
            updated_at: now,
            status: TxStatus::Pending,
            reason: String::new(),
        }
    }

    /// Applies a transition in place.
    pub fn transition(&mut self, status: TxStatus, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = status;
        self.reason = reason.into();
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_record_defaults() {
        let now = Utc::now();
        let tx = Transaction::pending(TxHash::new([7; 32]), Address::new("alice"), 100, now);
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(tx.reason.is_empty());
        assert_eq!(tx.created_at, tx.updated_at);
    }

    #[test]
    fn transition_keeps_creation_fields() {
        let created = Utc::now();
        let later = created + chrono::Duration::seconds(5);
        let mut tx = Transaction::pending(TxHash::new([7; 32]), Address::new("alice"), 100, created);
        tx.transition(TxStatus::Held, "manual review", later);

        assert_eq!(tx.status, TxStatus::Held);
        assert_eq!(tx.reason, "manual review");
        assert_eq!(tx.created_at, created);
        assert_eq!(tx.updated_at, later);
        assert_eq!(tx.amount, 100);
    }

    #[test]
    fn record_survives_bincode() {
        let tx = Transaction::pending(TxHash::new([9; 32]), Address::new("bob"), 42, Utc::now());
        let bytes = bincode::serialize(&tx).unwrap();
        let back: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, tx);
    }
}
