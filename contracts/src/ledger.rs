//! # Ledger
//!
//! The single entry point for callers. Combines [`AccessControl`],
//! [`TransactionRegistry`], and [`AuditLog`] behind one lock, and optionally
//! persists every operation to a [`LedgerStore`], normally a sled-backed
//! `LedgerDb`.
//!
//! ## Atomicity
//!
//! Each mutating call runs entirely under the lock:
//!
//! 1. the component validates and applies the change in memory;
//! 2. the resulting event is appended to the audit log;
//! 3. the changed record or roster and the event are committed to storage
//!    in one sled transaction.
//!
//! A failure at step 1 leaves memory untouched. A failure at step 3 undoes
//! steps 1 and 2 before the error is returned. Either way, nothing is
//! emitted.
//!
//! Once step 3 succeeds the operation has happened: the store is flushed
//! afterwards, and a flush failure does not undo anything. It is logged,
//! the ledger reports itself as not durable (see [`LedgerSummary::durable`]),
//! and the next successful flush clears the condition.
//!
//! ## Recovery
//!
//! [`Ledger::open`] verifies the audit chain, replays the transaction events,
//! and refuses a store whose records differ from the replayed state. Two callers racing to submit the same hash are serialized by the
//! lock: the first wins, the second gets [`LedgerError::Duplicate`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use guard_protocol::audit::{AuditEvent, EventKind};
use guard_protocol::clock::{Clock, SystemClock};
use guard_protocol::storage::{DbError, LedgerStore, WriteSet};
use guard_protocol::{Address, Transaction, TransactionStatus, TxHash};

use crate::access_control::AccessControl;
use crate::audit_log::AuditLog;
use crate::error::{LedgerError, LedgerResult};
use crate::transaction_registry::{TransactionRegistry, VerificationPolicy};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything behind the lock.
#[derive(Debug)]
struct LedgerState {
    access: AccessControl,
    registry: TransactionRegistry,
    log: AuditLog,
    /// A committed write set has not been flushed yet.
    unflushed: bool,
}

/// What a mutating operation may change, so it can be snapshotted and undone.
#[derive(Debug, Clone, Copy)]
enum Target {
    Record(TxHash),
    Roster,
}

/// Point-in-time overview of the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub owner: Address,
    pub primary_relayer: Address,
    pub authorized_relayers: Vec<Address>,
    pub verification_policy: VerificationPolicy,
    /// Record count keyed by wire status string.
    pub by_status: BTreeMap<String, usize>,
    pub transactions: usize,
    pub events: usize,
    /// Digest of the newest audit event, hex encoded.
    pub audit_head: String,
    pub persistent: bool,
    /// False while committed operations are waiting on a failed flush.
    pub durable: bool,
}

/// Callback run after an event is committed, while the ledger lock is held,
/// so observers see events in sequence order. Must not block.
pub type EventObserver = Box<dyn Fn(&AuditEvent) + Send + Sync>;

/// The access-controlled transaction ledger.
pub struct Ledger {
    state: Mutex<LedgerState>,
    store: Option<Box<dyn LedgerStore>>,
    clock: Arc<dyn Clock>,
    observers: Vec<EventObserver>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("state", &self.state)
            .field("persistent", &self.store.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Ledger {
    // -- Construction -------------------------------------------------------

    /// A ledger with no persistence, using the system clock.
    pub fn new(owner: Address) -> LedgerResult<Self> {
        Self::in_memory(owner, VerificationPolicy::default(), Arc::new(SystemClock))
    }

    /// A ledger with no persistence.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `owner` is the null identity.
    pub fn in_memory(
        owner: Address,
        policy: VerificationPolicy,
        clock: Arc<dyn Clock>,
    ) -> LedgerResult<Self> {
        let access = AccessControl::new(owner)?;
        Ok(Self {
            state: Mutex::new(LedgerState {
                access,
                registry: TransactionRegistry::new(policy),
                log: AuditLog::new(),
                unflushed: false,
            }),
            store: None,
            clock,
            observers: Vec::new(),
        })
    }

    /// Opens a persistent ledger.
    ///
    /// A fresh store is initialized with `owner` as owner and sole relayer.
    /// An existing store is replayed and `owner` is ignored; the audit chain
    /// is verified before the ledger accepts any call.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Integrity`] if the stored audit chain is broken,
    /// or [`LedgerError::RecordMismatch`] if a stored record is not the one
    /// its events produce.
    /// Returns [`LedgerError::Storage`] if the store cannot be read or is
    /// inconsistent.
    pub fn open<S: LedgerStore + 'static>(
        store: S,
        owner: Address,
        policy: VerificationPolicy,
        clock: Arc<dyn Clock>,
    ) -> LedgerResult<Self> {
        let snapshot = store.load()?;

        let state = match snapshot.authorization {
            Some(roster) => {
                let access = AccessControl::from_state(roster)?;
                let log = AuditLog::from_events(snapshot.events)?;
                let registry = TransactionRegistry::replay(log.events(), policy)?;
                registry.ensure_matches(&snapshot.transactions)?;
                info!(
                    transactions = registry.len(),
                    events = log.len(),
                    owner = %access.owner(),
                    "ledger recovered from storage"
                );
                LedgerState {
                    access,
                    registry,
                    log,
                    unflushed: false,
                }
            }
            None => {
                if !snapshot.events.is_empty() || !snapshot.transactions.is_empty() {
                    return Err(DbError::Corrupt(
                        "records present but no authorization roster".into(),
                    )
                    .into());
                }
                let access = AccessControl::new(owner)?;
                store.put_authorization(access.state())?;
                info!(owner = %access.owner(), "ledger initialized");
                LedgerState {
                    access,
                    registry: TransactionRegistry::new(policy),
                    log: AuditLog::new(),
                    unflushed: false,
                }
            }
        };

        Ok(Self {
            state: Mutex::new(state),
            store: Some(Box::new(store)),
            clock,
            observers: Vec::new(),
        })
    }

    /// Registers a callback for every committed event.
    pub fn on_commit<F>(&mut self, observer: F)
    where
        F: Fn(&AuditEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    // -- Access control -----------------------------------------------------

    /// Owner-only. Replaces the owner immediately.
    pub fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> LedgerResult<AuditEvent> {
        self.execute("transfer_ownership", Target::Roster, |state, _| {
            state.access.transfer_ownership(caller, new_owner)
        })
    }

    /// Owner-only. Grants or revokes relayer rights.
    pub fn set_relayer(
        &self,
        caller: &Address,
        relayer: Address,
        authorized: bool,
    ) -> LedgerResult<AuditEvent> {
        self.execute("set_relayer", Target::Roster, |state, _| {
            state.access.set_relayer(caller, relayer, authorized)
        })
    }

    pub fn is_authorized_relayer(&self, address: &Address) -> bool {
        self.state.lock().access.is_authorized_relayer(address)
    }

    // -- Transaction registry -----------------------------------------------

    /// Open to any caller.
    pub fn submit_tx_hash(&self, tx_hash: TxHash, sender: Address, amount: u64) -> LedgerResult<AuditEvent> {
        self.execute("submit_tx_hash", Target::Record(tx_hash), |state, now| {
            state.registry.submit(tx_hash, sender, amount, now)
        })
    }

    /// Relayer-only submission: the role check and the insert happen under
    /// one lock, so a caller revoked concurrently creates no record.
    pub fn relay_tx_hash(
        &self,
        caller: &Address,
        tx_hash: TxHash,
        sender: Address,
        amount: u64,
    ) -> LedgerResult<AuditEvent> {
        self.execute("relay_tx_hash", Target::Record(tx_hash), |state, now| {
            state.access.ensure_relayer(caller)?;
            state.registry.submit(tx_hash, sender, amount, now)
        })
    }

    /// Relayer-only.
    pub fn set_verification(
        &self,
        caller: &Address,
        tx_hash: TxHash,
        verified: bool,
        reason: impl Into<String>,
    ) -> LedgerResult<AuditEvent> {
        let reason = reason.into();
        self.execute("set_verification", Target::Record(tx_hash), |state, now| {
            state
                .registry
                .set_verification(&state.access, caller, tx_hash, verified, reason, now)
        })
    }

    /// Relayer-only. `Pending` → `Held`.
    pub fn hold_transaction(
        &self,
        caller: &Address,
        tx_hash: TxHash,
        reason: impl Into<String>,
    ) -> LedgerResult<AuditEvent> {
        let reason = reason.into();
        self.execute("hold_transaction", Target::Record(tx_hash), |state, now| {
            state.registry.hold(&state.access, caller, tx_hash, reason, now)
        })
    }

    /// Owner-only. `Held` → `Verified` or `Rejected`.
    pub fn release_held_transaction(
        &self,
        caller: &Address,
        tx_hash: TxHash,
        approved: bool,
        reason: impl Into<String>,
    ) -> LedgerResult<AuditEvent> {
        let reason = reason.into();
        self.execute("release_held_transaction", Target::Record(tx_hash), |state, now| {
            state
                .registry
                .release_held(&state.access, caller, tx_hash, approved, reason, now)
        })
    }

    /// Owner-only. `Verified` → `Completed`.
    pub fn complete_transaction(&self, caller: &Address, tx_hash: TxHash) -> LedgerResult<AuditEvent> {
        self.execute("complete_transaction", Target::Record(tx_hash), |state, now| {
            state.registry.complete(&state.access, caller, tx_hash, now)
        })
    }

    // -- Reads --------------------------------------------------------------

    pub fn is_held(&self, tx_hash: &TxHash) -> (bool, String) {
        self.state.lock().registry.is_held(tx_hash)
    }

    pub fn get_transaction_status(&self, tx_hash: &TxHash) -> TransactionStatus {
        self.state.lock().registry.status(tx_hash)
    }

    pub fn get_transaction(&self, tx_hash: &TxHash) -> Option<Transaction> {
        self.state.lock().registry.get(tx_hash).cloned()
    }

    pub fn events_for(&self, tx_hash: &TxHash) -> Vec<AuditEvent> {
        self.state.lock().log.for_tx(tx_hash)
    }

    pub fn events_since(&self, since: u64, limit: usize) -> Vec<AuditEvent> {
        self.state.lock().log.since(since, limit).to_vec()
    }

    /// Flushes the store, clearing a pending durability failure.
    pub fn flush(&self) -> LedgerResult<()> {
        let mut state = self.state.lock();
        if let Some(store) = &self.store {
            store.flush()?;
        }
        state.unflushed = false;
        Ok(())
    }

    /// Recomputes the in-memory audit chain.
    pub fn verify_chain(&self) -> LedgerResult<()> {
        self.state.lock().log.verify_chain()
    }

    pub fn summary(&self) -> LedgerSummary {
        let state = self.state.lock();
        let by_status = state
            .registry
            .count_by_status()
            .into_iter()
            .map(|(status, n)| (status.to_string(), n))
            .collect();
        LedgerSummary {
            owner: state.access.owner().clone(),
            primary_relayer: state.access.primary_relayer().clone(),
            authorized_relayers: state.access.authorized_relayers().cloned().collect(),
            verification_policy: state.registry.policy(),
            by_status,
            transactions: state.registry.len(),
            events: state.log.len(),
            audit_head: format!("0x{}", hex::encode(state.log.head_digest())),
            persistent: self.store.is_some(),
            durable: !state.unflushed,
        }
    }

    // -- Internals ----------------------------------------------------------

    /// Runs one mutating operation atomically. See the module docs.
    fn execute<F>(&self, op: &'static str, target: Target, apply: F) -> LedgerResult<AuditEvent>
    where
        F: FnOnce(&mut LedgerState, DateTime<Utc>) -> LedgerResult<EventKind>,
    {
        let mut state = self.state.lock();
        let now = self.clock.now();

        let previous_record = match target {
            Target::Record(tx_hash) => state.registry.get(&tx_hash).cloned(),
            Target::Roster => None,
        };
        let previous_access = match target {
            Target::Roster => Some(state.access.clone()),
            Target::Record(_) => None,
        };

        let kind = match apply(&mut *state, now) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(op, error = %e, kind = %e.kind(), "operation rejected");
                return Err(e);
            }
        };
        let event = state.log.append(kind, now);

        let committed = match &self.store {
            Some(store) => {
                let write = WriteSet {
                    record: match target {
                        Target::Record(tx_hash) => state.registry.get(&tx_hash),
                        Target::Roster => None,
                    },
                    authorization: match target {
                        Target::Roster => Some(state.access.state()),
                        Target::Record(_) => None,
                    },
                    event: &event,
                };
                store.commit(&write)
            }
            None => Ok(()),
        };

        if let Err(e) = committed {
            state.log.pop_last();
            match target {
                Target::Record(tx_hash) => state.registry.restore(tx_hash, previous_record),
                Target::Roster => {
                    if let Some(access) = previous_access {
                        state.access = access;
                    }
                }
            }
            let err = LedgerError::from(e);
            warn!(op, error = %err, "commit failed, operation rolled back");
            return Err(err);
        }

        if let Some(store) = &self.store {
            match store.flush() {
                Ok(()) => state.unflushed = false,
                Err(e) => {
                    state.unflushed = true;
                    error!(op, seq = event.seq, error = %e, "flush failed, operation kept in memory");
                }
            }
        }

        for observer in &self.observers {
            observer(&event);
        }
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use guard_protocol::clock::ManualClock;
    use guard_protocol::TxStatus;

    fn owner() -> Address {
        Address::new("owner")
    }

    fn h(byte: u8) -> TxHash {
        TxHash::new([byte; 32])
    }

    fn ledger() -> Ledger {
        Ledger::new(owner()).unwrap()
    }

    #[test]
    fn failed_operation_emits_nothing() {
        let ledger = ledger();
        ledger.submit_tx_hash(h(1), Address::new("alice"), 10).unwrap();
        assert!(ledger.submit_tx_hash(h(1), Address::new("alice"), 10).is_err());
        assert!(ledger
            .hold_transaction(&Address::new("mallory"), h(1), "x")
            .is_err());
        assert_eq!(ledger.events_since(0, 100).len(), 1);
    }

    #[test]
    fn events_carry_the_clock_time() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let ledger =
            Ledger::in_memory(owner(), VerificationPolicy::Permissive, clock.clone()).unwrap();

        ledger.submit_tx_hash(h(1), Address::new("alice"), 10).unwrap();
        clock.advance(Duration::seconds(60));
        let ev = ledger.hold_transaction(&owner(), h(1), "review").unwrap();

        assert_eq!(ev.timestamp, start + Duration::seconds(60));
        let tx = ledger.get_transaction(&h(1)).unwrap();
        assert_eq!(tx.created_at, start);
        assert_eq!(tx.updated_at, start + Duration::seconds(60));
    }

    #[test]
    fn roster_changes_are_audited() {
        let ledger = ledger();
        ledger
            .set_relayer(&owner(), Address::new("oracle"), true)
            .unwrap();
        let ev = ledger
            .transfer_ownership(&owner(), Address::new("heir"))
            .unwrap();
        assert_eq!(ev.seq, 1);
        assert_eq!(ev.kind.name(), "ownership_transferred");
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn observers_see_committed_events_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = ledger();
        let sink = Arc::clone(&seen);
        ledger.on_commit(move |ev| sink.lock().push(ev.seq));

        ledger.submit_tx_hash(h(1), Address::new("a"), 1).unwrap();
        assert!(ledger.submit_tx_hash(h(1), Address::new("a"), 1).is_err());
        ledger.hold_transaction(&owner(), h(1), "r").unwrap();

        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[test]
    fn summary_reports_counts() {
        let ledger = ledger();
        ledger.submit_tx_hash(h(1), Address::new("a"), 1).unwrap();
        ledger.submit_tx_hash(h(2), Address::new("b"), 2).unwrap();
        ledger.hold_transaction(&owner(), h(2), "r").unwrap();

        let summary = ledger.summary();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.events, 3);
        assert_eq!(summary.by_status["PENDING"], 1);
        assert_eq!(summary.by_status["HELD"], 1);
        assert_eq!(summary.by_status[&TxStatus::Completed.to_string()], 0);
        assert!(!summary.persistent);
        assert!(summary.audit_head.starts_with("0x"));
        assert_eq!(summary.audit_head.len(), 66);
    }

    #[test]
    fn relayed_submission_checks_the_role_in_the_same_operation() {
        let ledger = ledger();
        ledger
            .set_relayer(&owner(), Address::new("oracle"), true)
            .unwrap();
        let ev = ledger
            .relay_tx_hash(&Address::new("oracle"), h(1), Address::new("a"), 5)
            .unwrap();
        assert_eq!(ev.kind.resulting_status(), Some(TxStatus::Pending));

        ledger
            .set_relayer(&owner(), Address::new("oracle"), false)
            .unwrap();
        let err = ledger
            .relay_tx_hash(&Address::new("oracle"), h(2), Address::new("a"), 5)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authorization);
        assert_eq!(ledger.get_transaction_status(&h(2)), TransactionStatus::NotFound);
        assert_eq!(ledger.summary().events, 3);
    }

    #[test]
    fn in_memory_ledger_is_always_durable() {
        let ledger = ledger();
        ledger.submit_tx_hash(h(1), Address::new("a"), 1).unwrap();
        assert!(ledger.flush().is_ok());
        assert!(ledger.summary().durable);
    }
}
