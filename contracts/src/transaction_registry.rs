//! # Transaction Registry
//!
//! Owns every transaction record and enforces the status state machine:
//!
//! ```text
//!  submit        hold                 release(approved)
//! ───────▶ Pending ─────▶ Held ──┬──────────────────▶ Verified ──complete──▶ Completed
//!                                └──────────────────▶ Rejected
//!                                   release(!approved)
//! ```
//!
//! Relayers may also record a verification outcome directly with
//! [`TransactionRegistry::set_verification`]. How far that reaches into the
//! lifecycle is governed by [`VerificationPolicy`].
//!
//! Records are never deleted. Every successful mutation returns the
//! [`EventKind`] the audit log should record; a failed one leaves the record
//! untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use guard_protocol::audit::{AuditEvent, EventKind};
use guard_protocol::{Address, Transaction, TransactionStatus, TxHash, TxStatus};

use crate::access_control::AccessControl;
use crate::error::{LedgerError, LedgerResult};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Which records a relayer's `set_verification` may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPolicy {
    /// Any existing record, terminal ones included, can be re-verified.
    /// Compatible with ledgers already deployed under this rule.
    #[default]
    Permissive,
    /// Only `Pending` and `Held` records can be verified.
    Strict,
}

impl VerificationPolicy {
    fn allows(self, current: TxStatus) -> bool {
        match self {
            VerificationPolicy::Permissive => true,
            VerificationPolicy::Strict => matches!(current, TxStatus::Pending | TxStatus::Held),
        }
    }
}

impl std::fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationPolicy::Permissive => write!(f, "permissive"),
            VerificationPolicy::Strict => write!(f, "strict"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// In-memory index of transaction records keyed by hash.
#[derive(Debug, Clone, Default)]
pub struct TransactionRegistry {
    records: HashMap<TxHash, Transaction>,
    policy: VerificationPolicy,
}

impl TransactionRegistry {
    pub fn new(policy: VerificationPolicy) -> Self {
        Self {
            records: HashMap::new(),
            policy,
        }
    }

    /// Rebuilds the registry by replaying transaction events in order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Integrity`] at the first event that cannot be
    /// applied: a second submission of a hash, or a transition for a hash
    /// that was never submitted.
    pub fn replay<'a>(
        events: impl IntoIterator<Item = &'a AuditEvent>,
        policy: VerificationPolicy,
    ) -> LedgerResult<Self> {
        let mut records: HashMap<TxHash, Transaction> = HashMap::new();
        for event in events {
            let broken = LedgerError::Integrity { seq: event.seq };
            let now = event.timestamp;
            match &event.kind {
                EventKind::TxSubmitted {
                    tx_hash,
                    sender,
                    amount,
                } => {
                    if records.contains_key(tx_hash) {
                        return Err(broken);
                    }
                    records.insert(
                        *tx_hash,
                        Transaction::pending(*tx_hash, sender.clone(), *amount, now),
                    );
                }
                EventKind::TxHeld { tx_hash, reason } => {
                    let record = records.get_mut(tx_hash).ok_or(broken)?;
                    record.transition(TxStatus::Held, reason.clone(), now);
                }
                EventKind::TxVerified {
                    tx_hash, reason, ..
                } => {
                    let record = records.get_mut(tx_hash).ok_or(broken)?;
                    if let Some(status) = event.kind.resulting_status() {
                        record.transition(status, reason.clone(), now);
                    }
                }
                EventKind::TxCompleted { tx_hash } => {
                    let record = records.get_mut(tx_hash).ok_or(broken)?;
                    let reason = std::mem::take(&mut record.reason);
                    record.transition(TxStatus::Completed, reason, now);
                }
                EventKind::OwnershipTransferred { .. } | EventKind::RelayerUpdated { .. } => {}
            }
        }
        Ok(Self { records, policy })
    }

    /// Checks that `stored` holds exactly the records this registry holds.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RecordMismatch`] for the first record that is
    /// altered, missing, or has no history.
    pub fn ensure_matches(&self, stored: &[Transaction]) -> LedgerResult<()> {
        for tx in stored {
            if self.records.get(&tx.tx_hash) != Some(tx) {
                return Err(LedgerError::RecordMismatch(tx.tx_hash));
            }
        }
        if stored.len() != self.records.len() {
            if let Some(missing) = self
                .records
                .keys()
                .find(|h| !stored.iter().any(|tx| tx.tx_hash == **h))
            {
                return Err(LedgerError::RecordMismatch(*missing));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    // -- Mutations ----------------------------------------------------------

    /// Creates a `Pending` record. Open to any caller.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `amount` is zero.
    /// Returns [`LedgerError::Duplicate`] if a record already exists for `tx_hash`.
    pub fn submit(
        &mut self,
        tx_hash: TxHash,
        sender: Address,
        amount: u64,
        now: DateTime<Utc>,
    ) -> LedgerResult<EventKind> {
        if amount == 0 {
            return Err(LedgerError::Validation("amount must be greater than zero".into()));
        }
        if self.records.contains_key(&tx_hash) {
            return Err(LedgerError::Duplicate(tx_hash));
        }

        let record = Transaction::pending(tx_hash, sender.clone(), amount, now);
        self.records.insert(tx_hash, record);
        info!(tx_hash = %tx_hash, sender = %sender, amount, "transaction submitted");

        Ok(EventKind::TxSubmitted {
            tx_hash,
            sender,
            amount,
        })
    }

    /// Records a relayer's verification outcome: `Verified` if `verified`,
    /// otherwise `Rejected`.
    ///
    /// Under [`VerificationPolicy::Permissive`] any existing record may be
    /// overwritten. Under [`VerificationPolicy::Strict`] only `Pending` and
    /// `Held` records are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not a relayer.
    /// Returns [`LedgerError::NotFound`] if no record exists.
    /// Returns [`LedgerError::InvalidState`] if the policy refuses the current status.
    pub fn set_verification(
        &mut self,
        access: &AccessControl,
        caller: &Address,
        tx_hash: TxHash,
        verified: bool,
        reason: String,
        now: DateTime<Utc>,
    ) -> LedgerResult<EventKind> {
        access.ensure_relayer(caller)?;
        let policy = self.policy;
        let record = self.record_mut(&tx_hash)?;
        if !policy.allows(record.status) {
            return Err(LedgerError::InvalidState {
                tx_hash,
                current: record.status,
                expected: "PENDING or HELD",
            });
        }

        let status = if verified {
            TxStatus::Verified
        } else {
            TxStatus::Rejected
        };
        record.transition(status, reason.clone(), now);
        info!(tx_hash = %tx_hash, caller = %caller, status = %status, "verification recorded");

        Ok(EventKind::TxVerified {
            tx_hash,
            verified,
            reason,
        })
    }

    /// Parks a `Pending` record for owner review.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not a relayer.
    /// Returns [`LedgerError::NotFound`] if no record exists.
    /// Returns [`LedgerError::InvalidState`] if the record is not `Pending`.
    pub fn hold(
        &mut self,
        access: &AccessControl,
        caller: &Address,
        tx_hash: TxHash,
        reason: String,
        now: DateTime<Utc>,
    ) -> LedgerResult<EventKind> {
        access.ensure_relayer(caller)?;
        let record = self.record_mut(&tx_hash)?;
        expect_status(record, TxStatus::Pending, "PENDING")?;

        record.transition(TxStatus::Held, reason.clone(), now);
        info!(tx_hash = %tx_hash, caller = %caller, reason = %reason, "transaction held");

        Ok(EventKind::TxHeld { tx_hash, reason })
    }

    /// Owner decision on a held record: `Verified` if `approved`, otherwise
    /// `Rejected`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// Returns [`LedgerError::NotFound`] if no record exists.
    /// Returns [`LedgerError::InvalidState`] if the record is not `Held`.
    pub fn release_held(
        &mut self,
        access: &AccessControl,
        caller: &Address,
        tx_hash: TxHash,
        approved: bool,
        reason: String,
        now: DateTime<Utc>,
    ) -> LedgerResult<EventKind> {
        access.ensure_owner(caller)?;
        let record = self.record_mut(&tx_hash)?;
        expect_status(record, TxStatus::Held, "HELD")?;

        let status = if approved {
            TxStatus::Verified
        } else {
            TxStatus::Rejected
        };
        record.transition(status, reason.clone(), now);
        info!(tx_hash = %tx_hash, caller = %caller, status = %status, "held transaction released");

        Ok(EventKind::TxVerified {
            tx_hash,
            verified: approved,
            reason,
        })
    }

    /// Closes out a `Verified` record. The reason from the previous
    /// transition is kept.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// Returns [`LedgerError::NotFound`] if no record exists.
    /// Returns [`LedgerError::InvalidState`] if the record is not `Verified`.
    pub fn complete(
        &mut self,
        access: &AccessControl,
        caller: &Address,
        tx_hash: TxHash,
        now: DateTime<Utc>,
    ) -> LedgerResult<EventKind> {
        access.ensure_owner(caller)?;
        let record = self.record_mut(&tx_hash)?;
        expect_status(record, TxStatus::Verified, "VERIFIED")?;

        let reason = std::mem::take(&mut record.reason);
        record.transition(TxStatus::Completed, reason, now);
        info!(tx_hash = %tx_hash, caller = %caller, "transaction completed");

        Ok(EventKind::TxCompleted { tx_hash })
    }

    // -- Reads --------------------------------------------------------------

    /// `(true, reason)` iff the record is `Held`; `(false, "")` otherwise,
    /// including when no record exists.
    pub fn is_held(&self, tx_hash: &TxHash) -> (bool, String) {
        debug!(tx_hash = %tx_hash, "is_held");
        match self.records.get(tx_hash) {
            Some(tx) if tx.status == TxStatus::Held => (true, tx.reason.clone()),
            _ => (false, String::new()),
        }
    }

    /// Current status, or [`TransactionStatus::NotFound`]. Never fails.
    pub fn status(&self, tx_hash: &TxHash) -> TransactionStatus {
        debug!(tx_hash = %tx_hash, "status");
        self.records.get(tx_hash).map(|tx| tx.status).into()
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<&Transaction> {
        self.records.get(tx_hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records in each status, in lifecycle order.
    pub fn count_by_status(&self) -> Vec<(TxStatus, usize)> {
        TxStatus::ALL
            .iter()
            .map(|status| {
                let n = self.records.values().filter(|tx| tx.status == *status).count();
                (*status, n)
            })
            .collect()
    }

    // -- Rollback -----------------------------------------------------------

    /// Puts a record back the way it was before a failed commit. `None`
    /// means the record did not exist.
    pub(crate) fn restore(&mut self, tx_hash: TxHash, previous: Option<Transaction>) {
        match previous {
            Some(tx) => {
                self.records.insert(tx_hash, tx);
            }
            None => {
                self.records.remove(&tx_hash);
            }
        }
    }

    fn record_mut(&mut self, tx_hash: &TxHash) -> LedgerResult<&mut Transaction> {
        self.records
            .get_mut(tx_hash)
            .ok_or(LedgerError::NotFound(*tx_hash))
    }
}

fn expect_status(record: &Transaction, wanted: TxStatus, expected: &'static str) -> LedgerResult<()> {
    if record.status == wanted {
        Ok(())
    } else {
        Err(LedgerError::InvalidState {
            tx_hash: record.tx_hash,
            current: record.status,
            expected,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
