//! # LedgerDb — Persistent Storage Engine
//!
//! The persistence layer for the ledger, built on sled's embedded key-value
//! store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                   | Value                          |
//! |----------------|-----------------------|--------------------------------|
//! | `transactions` | `tx_hash` (32B)       | `bincode(Transaction)`         |
//! | `events`       | `seq` (8B BE)         | `bincode(AuditEvent)`          |
//! | `metadata`     | key (UTF-8)           | value (bytes)                  |
//!
//! Event sequence numbers are stored as big-endian u64 so that sled's
//! lexicographic ordering matches numeric ordering, and a full scan of
//! `events` yields the log in order.
//!
//! ## Atomicity
//!
//! A ledger operation touches at most one record, the authorization roster,
//! and one new event. [`LedgerDb::commit`] writes all of them in a single
//! multi-tree sled transaction: either every key is written or none is.
//! A committed write set is visible to every later read and is made durable
//! by [`LedgerStore::flush`]. A flush failure never undoes a commit, so
//! callers treat it as a durability problem, not as a failed write.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use crate::audit::AuditEvent;
use crate::auth::AuthorizationState;
use crate::config::STORAGE_SCHEMA_VERSION;
use crate::transaction::Transaction;
use crate::types::TxHash;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("schema mismatch: database is v{found}, this build expects v{expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("corrupt database: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the authorization roster.
const META_AUTHORIZATION: &[u8] = b"authorization";

/// Well-known key in the `metadata` tree for the storage schema version.
const META_SCHEMA_VERSION: &[u8] = b"schema_version";

// ---------------------------------------------------------------------------
// Write sets and snapshots
// ---------------------------------------------------------------------------

/// Everything one successful ledger operation changes.
#[derive(Debug, Clone, Copy)]
pub struct WriteSet<'a> {
    /// The created or updated transaction record, if the operation touched one.
    pub record: Option<&'a Transaction>,
    /// The new roster, if the operation changed it.
    pub authorization: Option<&'a AuthorizationState>,
    /// The audit event the operation emitted.
    pub event: &'a AuditEvent,
}

/// The full persisted state, as read back on startup.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// `None` for a database that has never been initialized.
    pub authorization: Option<AuthorizationState>,
    /// Every stored record, in key order.
    pub transactions: Vec<Transaction>,
    /// The audit log, in sequence order.
    pub events: Vec<AuditEvent>,
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// What the ledger needs from its persistence backend.
pub trait LedgerStore: Send + Sync {
    /// Everything persisted so far.
    fn load(&self) -> DbResult<Snapshot>;

    /// Persist the initial roster of a fresh ledger, durably.
    fn put_authorization(&self, state: &AuthorizationState) -> DbResult<()>;

    /// Apply one write set atomically. An error means nothing was written.
    fn commit(&self, write: &WriteSet<'_>) -> DbResult<()>;

    /// Make every committed write set durable.
    fn flush(&self) -> DbResult<()>;
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for the ledger.
///
/// # Thread Safety
///
/// sled is inherently thread-safe. `LedgerDb` is cheap to clone (it holds
/// tree handles) and can be shared across threads. Ordering of commits is
/// the caller's responsibility; the contract layer serializes them.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    /// The underlying sled database handle.
    db: Db,
    /// Transaction records keyed by raw 32-byte hash.
    transactions: Tree,
    /// Audit events keyed by big-endian sequence number.
    events: Tree,
    /// Roster and schema metadata.
    metadata: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is cleaned up automatically when
    /// the `LedgerDb` is dropped.
    ///
    /// Ideal for unit tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Internal constructor: opens named trees and checks the schema version.
    fn from_db(db: Db) -> DbResult<Self> {
        let transactions = db.open_tree("transactions")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;

        match metadata.get(META_SCHEMA_VERSION)? {
            Some(bytes) => {
                let found = u32::from_be_bytes(
                    bytes
                        .as_ref()
                        .try_into()
                        .map_err(|_| DbError::Corrupt("invalid schema version bytes".into()))?,
                );
                if found != STORAGE_SCHEMA_VERSION {
                    return Err(DbError::SchemaMismatch {
                        found,
                        expected: STORAGE_SCHEMA_VERSION,
                    });
                }
            }
            None => {
                metadata.insert(META_SCHEMA_VERSION, &STORAGE_SCHEMA_VERSION.to_be_bytes())?;
                tracing::info!(version = STORAGE_SCHEMA_VERSION, "initialized storage schema");
            }
        }

        Ok(Self {
            db,
            transactions,
            events,
            metadata,
        })
    }

    // -- Writes -------------------------------------------------------------

    /// Persist the initial authorization roster of a fresh ledger.
    pub fn put_authorization(&self, state: &AuthorizationState) -> DbResult<()> {
        self.metadata.insert(META_AUTHORIZATION, encode(state)?)?;
        self.db.flush()?;
        Ok(())
    }

    /// Persist one operation's write set atomically. Durable after
    /// [`LedgerDb::flush`].
    ///
    /// Refuses to overwrite an existing event: the audit log only grows.
    pub fn commit(&self, write: &WriteSet<'_>) -> DbResult<()> {
        let record = match write.record {
            Some(tx) => Some((*tx.tx_hash.as_bytes(), encode(tx)?)),
            None => None,
        };
        let authorization = match write.authorization {
            Some(state) => Some(encode(state)?),
            None => None,
        };
        let event_key = write.event.seq.to_be_bytes();
        let event_bytes = encode(write.event)?;

        let result: TransactionResult<(), DbError> =
            (&self.transactions, &self.events, &self.metadata).transaction(
                |(transactions, events, metadata)| {
                    if events.get(&event_key[..])?.is_some() {
                        return Err(ConflictableTransactionError::Abort(DbError::Corrupt(
                            format!("audit event {} already stored", write.event.seq),
                        )));
                    }
                    if let Some((key, bytes)) = &record {
                        transactions.insert(&key[..], bytes.as_slice())?;
                    }
                    if let Some(bytes) = &authorization {
                        metadata.insert(META_AUTHORIZATION, bytes.as_slice())?;
                    }
                    events.insert(&event_key[..], event_bytes.as_slice())?;
                    Ok(())
                },
            );

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => DbError::Sled(e),
        })?;

        tracing::debug!(
            seq = write.event.seq,
            event = write.event.kind.name(),
            "write set committed"
        );
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// The stored roster, or `None` for an uninitialized database.
    pub fn get_authorization(&self) -> DbResult<Option<AuthorizationState>> {
        match self.metadata.get(META_AUTHORIZATION)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a transaction record by hash.
    pub fn get_transaction(&self, tx_hash: &TxHash) -> DbResult<Option<Transaction>> {
        match self.transactions.get(tx_hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve an audit event by sequence number.
    pub fn get_event(&self, seq: u64) -> DbResult<Option<AuditEvent>> {
        match self.events.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read back everything: roster, records, and the ordered audit log.
    pub fn load(&self) -> DbResult<Snapshot> {
        let authorization = self.get_authorization()?;

        let mut transactions = Vec::with_capacity(self.transactions.len());
        for entry in self.transactions.iter() {
            let (_key, value) = entry?;
            transactions.push(decode(&value)?);
        }

        let mut events: Vec<AuditEvent> = Vec::with_capacity(self.events.len());
        for entry in self.events.iter() {
            let (_key, value) = entry?;
            events.push(decode(&value)?);
        }

        Ok(Snapshot {
            authorization,
            transactions,
            events,
        })
    }

    // -- Utility operations -------------------------------------------------

    /// Return the number of transaction records stored.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Return the number of audit events stored.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl LedgerStore for LedgerDb {
    fn load(&self) -> DbResult<Snapshot> {
        LedgerDb::load(self)
    }

    fn put_authorization(&self, state: &AuthorizationState) -> DbResult<()> {
        LedgerDb::put_authorization(self, state)
    }

    fn commit(&self, write: &WriteSet<'_>) -> DbResult<()> {
        LedgerDb::commit(self, write)
    }

    fn flush(&self) -> DbResult<()> {
        LedgerDb::flush(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EventKind;
    use crate::config::GENESIS_DIGEST;
    use crate::types::Address;
    use chrono::Utc;

    // -- Helpers ------------------------------------------------------------

    fn make_tx(byte: u8) -> Transaction {
        Transaction::pending(TxHash::new([byte; 32]), Address::new("alice"), 100, Utc::now())
    }

    fn submitted_event(seq: u64, tx: &Transaction) -> AuditEvent {
        AuditEvent::chained(
            &GENESIS_DIGEST,
            seq,
            tx.created_at,
            EventKind::TxSubmitted {
                tx_hash: tx.tx_hash,
                sender: tx.sender.clone(),
                amount: tx.amount,
            },
        )
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn open_temporary_database() {
        let db = LedgerDb::open_temporary().expect("should create temp db");
        assert_eq!(db.transaction_count(), 0);
        assert_eq!(db.event_count(), 0);
        assert!(db.get_authorization().unwrap().is_none());
    }

    #[test]
    fn commit_writes_record_and_event() {
        let db = LedgerDb::open_temporary().unwrap();
        let tx = make_tx(1);
        let ev = submitted_event(0, &tx);

        db.commit(&WriteSet {
            record: Some(&tx),
            authorization: None,
            event: &ev,
        })
        .unwrap();

        assert_eq!(db.get_transaction(&tx.tx_hash).unwrap(), Some(tx));
        assert_eq!(db.get_event(0).unwrap(), Some(ev));
        assert_eq!(db.transaction_count(), 1);
        assert_eq!(db.event_count(), 1);
    }

    #[test]
    fn commit_refuses_to_overwrite_an_event() {
        let db = LedgerDb::open_temporary().unwrap();
        let first = make_tx(1);
        let second = make_tx(2);

        db.commit(&WriteSet {
            record: Some(&first),
            authorization: None,
            event: &submitted_event(0, &first),
        })
        .unwrap();

        let err = db
            .commit(&WriteSet {
                record: Some(&second),
                authorization: None,
                event: &submitted_event(0, &second),
            })
            .unwrap_err();
        assert!(matches!(err, DbError::Corrupt(_)));

        // The aborted transaction left nothing behind.
        assert!(db.get_transaction(&second.tx_hash).unwrap().is_none());
        assert_eq!(db.event_count(), 1);
    }

    #[test]
    fn authorization_round_trip() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut roster = AuthorizationState::initial(Address::new("owner"));
        db.put_authorization(&roster).unwrap();
        assert_eq!(db.get_authorization().unwrap(), Some(roster.clone()));

        roster.authorized_relayers.insert(Address::new("oracle"));
        roster.primary_relayer = Address::new("oracle");
        let ev = AuditEvent::chained(
            &GENESIS_DIGEST,
            0,
            Utc::now(),
            EventKind::RelayerUpdated {
                relayer: Address::new("oracle"),
                authorized: true,
                primary_relayer: Address::new("oracle"),
            },
        );
        db.commit(&WriteSet {
            record: None,
            authorization: Some(&roster),
            event: &ev,
        })
        .unwrap();
        assert_eq!(db.get_authorization().unwrap(), Some(roster));
    }

    #[test]
    fn load_returns_events_in_sequence_order() {
        let db = LedgerDb::open_temporary().unwrap();
        // Sequence 256 sorts after 1 only with big-endian keys.
        for (seq, byte) in [(1u64, 1u8), (256, 2), (2, 3)] {
            let tx = make_tx(byte);
            db.commit(&WriteSet {
                record: Some(&tx),
                authorization: None,
                event: &submitted_event(seq, &tx),
            })
            .unwrap();
        }

        let snapshot = db.load().unwrap();
        let seqs: Vec<u64> = snapshot.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 256]);
        assert_eq!(snapshot.transactions.len(), 3);
        assert!(snapshot.authorization.is_none());
    }

    #[test]
    fn persistent_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tx = make_tx(9);
        {
            let db = LedgerDb::open(dir.path()).expect("should open db");
            db.put_authorization(&AuthorizationState::initial(Address::new("owner")))
                .unwrap();
            db.commit(&WriteSet {
                record: Some(&tx),
                authorization: None,
                event: &submitted_event(0, &tx),
            })
            .unwrap();
        }

        let db = LedgerDb::open(dir.path()).expect("should reopen db");
        let snapshot = db.load().unwrap();
        assert_eq!(snapshot.transactions, vec![tx]);
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(
            snapshot.authorization.map(|a| a.owner),
            Some(Address::new("owner"))
        );
    }
}
