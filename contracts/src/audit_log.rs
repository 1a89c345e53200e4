//! # Audit Log
//!
//! Append-only trail of every successful ledger mutation. Each event is
//! hash-chained to its predecessor, so a rewritten or dropped entry is
//! detected by [`AuditLog::verify_chain`].
//!
//! Nothing in the ledger reads the log to decide behavior. It exists for
//! external observers.

use chrono::{DateTime, Utc};

use guard_protocol::audit::{AuditEvent, EventKind};
use guard_protocol::config::{DIGEST_LENGTH, GENESIS_DIGEST, MAX_EVENT_PAGE_SIZE};
use guard_protocol::TxHash;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the log from stored events and verifies the chain.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Integrity`] naming the first event whose
    /// sequence number or digest does not line up.
    pub fn from_events(events: Vec<AuditEvent>) -> LedgerResult<Self> {
        let log = Self { events };
        log.verify_chain()?;
        Ok(log)
    }

    /// Appends the next event in the chain and returns a copy of it.
    pub fn append(&mut self, kind: EventKind, timestamp: DateTime<Utc>) -> AuditEvent {
        let seq = self.events.len() as u64;
        let event = AuditEvent::chained(&self.head_digest(), seq, timestamp, kind);
        self.events.push(event.clone());
        event
    }

    /// Drops the newest event. Only used to undo an append whose commit failed.
    pub(crate) fn pop_last(&mut self) -> Option<AuditEvent> {
        self.events.pop()
    }

    /// Recomputes every digest from genesis.
    pub fn verify_chain(&self) -> LedgerResult<()> {
        let mut prev = GENESIS_DIGEST;
        for (position, event) in self.events.iter().enumerate() {
            if event.seq != position as u64 || !event.verify(&prev) {
                return Err(LedgerError::Integrity {
                    seq: position as u64,
                });
            }
            prev = event.digest;
        }
        Ok(())
    }

    /// Digest of the newest event, or the genesis digest for an empty log.
    pub fn head_digest(&self) -> [u8; DIGEST_LENGTH] {
        self.events.last().map_or(GENESIS_DIGEST, |e| e.digest)
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Up to `limit` events starting at sequence number `since`. `limit` is
    /// capped at [`MAX_EVENT_PAGE_SIZE`].
    pub fn since(&self, since: u64, limit: usize) -> &[AuditEvent] {
        let start = usize::try_from(since)
            .unwrap_or(usize::MAX)
            .min(self.events.len());
        let end = start
            .saturating_add(limit.min(MAX_EVENT_PAGE_SIZE))
            .min(self.events.len());
        &self.events[start..end]
    }

    /// Every event about `tx_hash`, oldest first.
    pub fn for_tx(&self, tx_hash: &TxHash) -> Vec<AuditEvent> {
        self.events
            .iter()
            .filter(|e| e.kind.tx_hash() == Some(tx_hash))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
