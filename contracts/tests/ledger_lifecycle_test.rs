//! Integration tests for the ledger lifecycle.
//!
//! These drive the public `Ledger` API end to end: the review flow, role
//! gating, relayer fallback, submission uniqueness, and concurrent callers.

use std::sync::Arc;
use std::thread;

use guard_contracts::{ErrorKind, Ledger, LedgerError, Role, VerificationPolicy};
use guard_protocol::audit::EventKind;
use guard_protocol::clock::SystemClock;
use guard_protocol::crypto::derive_tx_hash;
use guard_protocol::{Address, TransactionStatus, TxHash};

fn owner() -> Address {
    Address::new("0xowner")
}

fn relayer() -> Address {
    Address::new("0xrelayer")
}

/// Helper: a ledger whose owner has granted `relayer()` relayer rights.
fn ledger() -> Ledger {
    let ledger = Ledger::new(owner()).unwrap();
    ledger.set_relayer(&owner(), relayer(), true).unwrap();
    ledger
}

fn hash(reference: &str) -> TxHash {
    derive_tx_hash(reference, &Address::new("0xsender"), 100)
}

// ---------------------------------------------------------------------------
// Review Flow
// ---------------------------------------------------------------------------

#[test]
fn held_transaction_is_released_and_completed() {
    let ledger = ledger();
    let h1 = hash("h1");

    ledger
        .submit_tx_hash(h1, Address::new("0xsender"), 100)
        .unwrap();
    assert_eq!(ledger.get_transaction_status(&h1), TransactionStatus::Pending);

    ledger
        .hold_transaction(&relayer(), h1, "manual review")
        .unwrap();
    assert_eq!(ledger.is_held(&h1), (true, "manual review".to_string()));
    assert_eq!(ledger.get_transaction_status(&h1), TransactionStatus::Held);

    ledger
        .release_held_transaction(&owner(), h1, true, "cleared")
        .unwrap();
    assert_eq!(ledger.get_transaction_status(&h1), TransactionStatus::Verified);
    assert_eq!(ledger.is_held(&h1), (false, String::new()));

    ledger.complete_transaction(&owner(), h1).unwrap();
    assert_eq!(ledger.get_transaction_status(&h1), TransactionStatus::Completed);

    // Completed is terminal for the guarded transitions.
    let err = ledger
        .hold_transaction(&relayer(), h1, "again")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let kinds: Vec<&str> = ledger
        .events_for(&h1)
        .iter()
        .map(|e| e.kind.name())
        .collect();
    assert_eq!(
        kinds,
        vec!["tx_submitted", "tx_held", "tx_verified", "tx_completed"]
    );
}

#[test]
fn released_rejection_is_terminal() {
    let ledger = ledger();
    let h = hash("rejected");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();
    ledger.hold_transaction(&relayer(), h, "sanctions hit").unwrap();
    ledger
        .release_held_transaction(&owner(), h, false, "confirmed match")
        .unwrap();

    assert_eq!(ledger.get_transaction_status(&h), TransactionStatus::Rejected);
    assert_eq!(
        ledger.complete_transaction(&owner(), h).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        ledger
            .release_held_transaction(&owner(), h, true, "changed mind")
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
}

#[test]
fn relayer_can_verify_pending_directly() {
    let ledger = ledger();
    let h = hash("direct");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();

    let ev = ledger.set_verification(&relayer(), h, true, "ok").unwrap();
    assert_eq!(
        ev.kind,
        EventKind::TxVerified {
            tx_hash: h,
            verified: true,
            reason: "ok".into(),
        }
    );
    ledger.complete_transaction(&owner(), h).unwrap();
    assert_eq!(ledger.get_transaction_status(&h), TransactionStatus::Completed);
}

#[test]
fn unknown_hash_reads_as_not_found() {
    let ledger = ledger();
    let unknown = hash("never submitted");
    assert_eq!(
        ledger.get_transaction_status(&unknown),
        TransactionStatus::NotFound
    );
    assert_eq!(ledger.get_transaction_status(&unknown).as_str(), "NOT_FOUND");
    assert_eq!(ledger.is_held(&unknown), (false, String::new()));
    assert!(ledger.get_transaction(&unknown).is_none());
}

#[test]
fn guarded_operations_on_unknown_hash_are_not_found() {
    let ledger = ledger();
    let unknown = hash("ghost");
    let results = [
        ledger.set_verification(&relayer(), unknown, true, "x"),
        ledger.hold_transaction(&relayer(), unknown, "x"),
        ledger.release_held_transaction(&owner(), unknown, true, "x"),
        ledger.complete_transaction(&owner(), unknown),
    ];
    for result in results {
        assert!(matches!(result, Err(LedgerError::NotFound(h)) if h == unknown));
    }
    assert!(ledger.events_for(&unknown).is_empty());
}

// ---------------------------------------------------------------------------
// Role Gating
// ---------------------------------------------------------------------------

#[test]
fn non_owner_cannot_transfer_ownership() {
    let ledger = ledger();
    let before = ledger.summary();

    let err = ledger
        .transfer_ownership(&Address::new("0xmallory"), Address::new("0xmallory"))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Unauthorized {
            required: Role::Owner,
            ..
        }
    ));
    assert_eq!(ledger.summary().owner, owner());
    assert_eq!(ledger.summary().events, before.events);
}

#[test]
fn unauthorized_caller_cannot_set_verification() {
    let ledger = ledger();
    let h = hash("gated");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();

    let err = ledger
        .set_verification(&Address::new("0xstranger"), h, true, "trust me")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(ledger.get_transaction_status(&h), TransactionStatus::Pending);
}

#[test]
fn relayer_cannot_release_or_complete() {
    let ledger = ledger();
    let h = hash("owner only");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();
    ledger.hold_transaction(&relayer(), h, "review").unwrap();

    let err = ledger
        .release_held_transaction(&relayer(), h, true, "self-approve")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    ledger
        .release_held_transaction(&owner(), h, true, "ok")
        .unwrap();
    let err = ledger.complete_transaction(&relayer(), h).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn authorization_is_checked_before_state() {
    let ledger = ledger();
    let h = hash("order");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();

    // Not held, and not the owner: the role failure wins.
    let err = ledger
        .release_held_transaction(&relayer(), h, true, "x")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn previous_owner_loses_owner_rights() {
    let ledger = ledger();
    ledger
        .transfer_ownership(&owner(), Address::new("0xheir"))
        .unwrap();

    let err = ledger
        .set_relayer(&owner(), Address::new("0xother"), true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    ledger
        .set_relayer(&Address::new("0xheir"), Address::new("0xother"), true)
        .unwrap();
    assert!(ledger.is_authorized_relayer(&Address::new("0xother")));
}

#[test]
fn zero_identities_are_rejected() {
    let ledger = ledger();
    let zero = Address::new("0x0000000000000000000000000000000000000000");

    let err = ledger.transfer_ownership(&owner(), zero.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = ledger.set_relayer(&owner(), zero, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(Ledger::new(Address::new("  ")).is_err());
}

// ---------------------------------------------------------------------------
// Relayer Roster
// ---------------------------------------------------------------------------

#[test]
fn revoking_primary_relayer_falls_back_to_owner() {
    let ledger = ledger();
    assert_eq!(ledger.summary().primary_relayer, relayer());

    ledger.set_relayer(&owner(), relayer(), false).unwrap();
    assert!(!ledger.is_authorized_relayer(&relayer()));
    assert_eq!(ledger.summary().primary_relayer, owner());
    assert!(ledger.is_authorized_relayer(&owner()));

    // The owner can act as relayer again.
    let h = hash("fallback");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();
    ledger.hold_transaction(&owner(), h, "owner review").unwrap();
}

#[test]
fn secondary_relayer_keeps_rights_when_primary_changes() {
    let ledger = ledger();
    ledger
        .set_relayer(&owner(), Address::new("0xsecond"), true)
        .unwrap();

    assert_eq!(ledger.summary().primary_relayer, Address::new("0xsecond"));
    assert!(ledger.is_authorized_relayer(&relayer()));
    assert_eq!(ledger.summary().authorized_relayers.len(), 2);
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[test]
fn duplicate_submission_is_refused() {
    let ledger = ledger();
    let h = hash("dup");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();

    let err = ledger
        .submit_tx_hash(h, Address::new("b"), 999)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    let tx = ledger.get_transaction(&h).unwrap();
    assert_eq!(tx.sender, Address::new("a"));
    assert_eq!(tx.amount, 5);
}

#[test]
fn zero_amount_is_refused() {
    let ledger = ledger();
    let h = hash("zero");
    let err = ledger.submit_tx_hash(h, Address::new("a"), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ledger.get_transaction_status(&h), TransactionStatus::NotFound);
}

#[test]
fn racing_submissions_have_one_winner() {
    let ledger = Arc::new(ledger());
    let h = hash("race");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                ledger.submit_tx_hash(h, Address::new(format!("sender-{i}")), 10 + i)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::Duplicate(_))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(ledger.events_for(&h).len(), 1);
    assert!(ledger.verify_chain().is_ok());
}

#[test]
fn concurrent_distinct_submissions_keep_a_dense_log() {
    let ledger = Arc::new(ledger());

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for i in 0..25u64 {
                    let h = derive_tx_hash(&format!("{t}-{i}"), &Address::new("s"), 1);
                    ledger.submit_tx_hash(h, Address::new("s"), 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let summary = ledger.summary();
    assert_eq!(summary.transactions, 100);
    // One roster event from setup, plus one per submission.
    assert_eq!(summary.events, 101);
    let seqs: Vec<u64> = ledger.events_since(0, 1000).iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..101).collect::<Vec<_>>());
    assert!(ledger.verify_chain().is_ok());
}

// ---------------------------------------------------------------------------
// Verification Policy
// ---------------------------------------------------------------------------

#[test]
fn permissive_policy_can_reopen_completed_records() {
    let ledger = ledger();
    let h = hash("reopen");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();
    ledger.set_verification(&relayer(), h, true, "ok").unwrap();
    ledger.complete_transaction(&owner(), h).unwrap();

    ledger
        .set_verification(&relayer(), h, false, "chargeback")
        .unwrap();
    assert_eq!(ledger.get_transaction_status(&h), TransactionStatus::Rejected);
}

#[test]
fn strict_policy_protects_terminal_records() {
    let ledger =
        Ledger::in_memory(owner(), VerificationPolicy::Strict, Arc::new(SystemClock)).unwrap();
    let h = hash("strict");
    ledger.submit_tx_hash(h, Address::new("a"), 5).unwrap();
    ledger.set_verification(&owner(), h, true, "ok").unwrap();
    ledger.complete_transaction(&owner(), h).unwrap();

    let events_before = ledger.summary().events;
    let err = ledger
        .set_verification(&owner(), h, false, "chargeback")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(ledger.get_transaction_status(&h), TransactionStatus::Completed);
    assert_eq!(ledger.summary().events, events_before);
}
