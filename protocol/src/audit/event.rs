//! Audit event payloads and the digest chain that links them.
//!
//! Every event commits to its predecessor:
//!
//! ```text
//! digest[n] = BLAKE3_derive_key(ctx, digest[n-1] ‖ seq ‖ timestamp_ms ‖ canonical(kind))
//! digest[-1] = 0x00…00
//! ```
//!
//! Rewriting any stored event changes every digest after it.
//!
//! `canonical(kind)` is a fixed encoding written by hand: a one-byte tag per
//! variant, then each field in declaration order. Hashes are raw 32 bytes,
//! integers big-endian, bools one byte, strings and identities prefixed with
//! their big-endian `u64` byte length. It cannot fail and does not depend on
//! any serializer's format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DIGEST_LENGTH;
use crate::crypto::hash::{domain_separated_hash, AUDIT_CHAIN_CONTEXT};
use crate::transaction::TxStatus;
use crate::types::{hex32, Address, TxHash};

/// What happened.
///
/// Externally tagged so the same definition round-trips through both
/// bincode (storage) and JSON (API, WebSocket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A new record was created in `Pending`.
    TxSubmitted {
        tx_hash: TxHash,
        sender: Address,
        amount: u64,
    },
    /// A pending record was parked for manual review.
    TxHeld { tx_hash: TxHash, reason: String },
    /// A record was verified (`verified = true`) or rejected. Emitted by both
    /// relayer verification and owner release.
    TxVerified {
        tx_hash: TxHash,
        verified: bool,
        reason: String,
    },
    /// A verified record was closed out.
    TxCompleted { tx_hash: TxHash },
    /// The owner handed the ledger to someone else.
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    /// A relayer was granted or revoked. `primary_relayer` is the acting
    /// relayer after the change.
    RelayerUpdated {
        relayer: Address,
        authorized: bool,
        primary_relayer: Address,
    },
}

impl EventKind {
    /// The transaction this event is about, if any.
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            EventKind::TxSubmitted { tx_hash, .. }
            | EventKind::TxHeld { tx_hash, .. }
            | EventKind::TxVerified { tx_hash, .. }
            | EventKind::TxCompleted { tx_hash } => Some(tx_hash),
            EventKind::OwnershipTransferred { .. } | EventKind::RelayerUpdated { .. } => None,
        }
    }

    /// The status the event leaves its record in. `None` for roster events.
    pub fn resulting_status(&self) -> Option<TxStatus> {
        match self {
            EventKind::TxSubmitted { .. } => Some(TxStatus::Pending),
            EventKind::TxHeld { .. } => Some(TxStatus::Held),
            EventKind::TxVerified { verified: true, .. } => Some(TxStatus::Verified),
            EventKind::TxVerified { verified: false, .. } => Some(TxStatus::Rejected),
            EventKind::TxCompleted { .. } => Some(TxStatus::Completed),
            EventKind::OwnershipTransferred { .. } | EventKind::RelayerUpdated { .. } => None,
        }
    }

    /// The bytes the chain digest commits to.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        match self {
            EventKind::TxSubmitted {
                tx_hash,
                sender,
                amount,
            } => {
                out.push(0);
                out.extend_from_slice(tx_hash.as_bytes());
                put_str(&mut out, sender.as_str());
                out.extend_from_slice(&amount.to_be_bytes());
            }
            EventKind::TxHeld { tx_hash, reason } => {
                out.push(1);
                out.extend_from_slice(tx_hash.as_bytes());
                put_str(&mut out, reason);
            }
            EventKind::TxVerified {
                tx_hash,
                verified,
                reason,
            } => {
                out.push(2);
                out.extend_from_slice(tx_hash.as_bytes());
                out.push(u8::from(*verified));
                put_str(&mut out, reason);
            }
            EventKind::TxCompleted { tx_hash } => {
                out.push(3);
                out.extend_from_slice(tx_hash.as_bytes());
            }
            EventKind::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => {
                out.push(4);
                put_str(&mut out, previous_owner.as_str());
                put_str(&mut out, new_owner.as_str());
            }
            EventKind::RelayerUpdated {
                relayer,
                authorized,
                primary_relayer,
            } => {
                out.push(5);
                put_str(&mut out, relayer.as_str());
                out.push(u8::from(*authorized));
                put_str(&mut out, primary_relayer.as_str());
            }
        }
        out
    }

    /// Short stable name, used for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TxSubmitted { .. } => "tx_submitted",
            EventKind::TxHeld { .. } => "tx_held",
            EventKind::TxVerified { .. } => "tx_verified",
            EventKind::TxCompleted { .. } => "tx_completed",
            EventKind::OwnershipTransferred { .. } => "ownership_transferred",
            EventKind::RelayerUpdated { .. } => "relayer_updated",
        }
    }
}

/// One entry of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the log, starting at 0. Dense and strictly increasing.
    pub seq: u64,
    /// Transition time.
    pub timestamp: DateTime<Utc>,
    /// The payload.
    pub kind: EventKind,
    /// Chain digest committing to this event and every event before it.
    #[serde(with = "hex32")]
    pub digest: [u8; DIGEST_LENGTH],
}

impl AuditEvent {
    /// Builds the event that follows `prev_digest`, computing its digest.
    pub fn chained(
        prev_digest: &[u8; DIGEST_LENGTH],
        seq: u64,
        timestamp: DateTime<Utc>,
        kind: EventKind,
    ) -> Self {
        let digest = chain_digest(prev_digest, seq, &timestamp, &kind);
        Self {
            seq,
            timestamp,
            kind,
            digest,
        }
    }

    /// Whether this event's digest is consistent with `prev_digest`.
    pub fn verify(&self, prev_digest: &[u8; DIGEST_LENGTH]) -> bool {
        chain_digest(prev_digest, self.seq, &self.timestamp, &self.kind) == self.digest
    }

    /// The hex form of the digest.
    pub fn digest_hex(&self) -> String {
        format!("0x{}", hex::encode(self.digest))
    }
}

/// Computes the chain digest for an event.
pub fn chain_digest(
    prev_digest: &[u8; DIGEST_LENGTH],
    seq: u64,
    timestamp: &DateTime<Utc>,
    kind: &EventKind,
) -> [u8; DIGEST_LENGTH] {
    let payload = kind.canonical_bytes();
    domain_separated_hash(
        AUDIT_CHAIN_CONTEXT,
        &[
            &prev_digest[..],
            &seq.to_be_bytes()[..],
            &timestamp.timestamp_millis().to_be_bytes()[..],
            &payload[..],
        ],
    )
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GENESIS_DIGEST;

    fn submitted() -> EventKind {
        EventKind::TxSubmitted {
            tx_hash: TxHash::new([1; 32]),
            sender: Address::new("alice"),
            amount: 100,
        }
    }

    #[test]
    fn chained_event_verifies_against_its_parent() {
        let ev = AuditEvent::chained(&GENESIS_DIGEST, 0, Utc::now(), submitted());
        assert!(ev.verify(&GENESIS_DIGEST));
        assert!(!ev.verify(&[1u8; 32]));
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut ev = AuditEvent::chained(&GENESIS_DIGEST, 0, Utc::now(), submitted());
        ev.kind = EventKind::TxSubmitted {
            tx_hash: TxHash::new([1; 32]),
            sender: Address::new("alice"),
            amount: 1_000_000,
        };
        assert!(!ev.verify(&GENESIS_DIGEST));
    }

    #[test]
    fn tx_hash_accessor() {
        assert_eq!(submitted().tx_hash(), Some(&TxHash::new([1; 32])));
        let roster = EventKind::OwnershipTransferred {
            previous_owner: Address::new("a"),
            new_owner: Address::new("b"),
        };
        assert_eq!(roster.tx_hash(), None);
        assert_eq!(roster.name(), "ownership_transferred");
    }

    #[test]
    fn event_round_trips_through_bincode_and_json() {
        let ev = AuditEvent::chained(&GENESIS_DIGEST, 3, Utc::now(), submitted());

        let bytes = bincode::serialize(&ev).unwrap();
        let from_bin: AuditEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(from_bin, ev);

        let json = serde_json::to_string(&ev).unwrap();
        let from_json: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(from_json, ev);
        assert!(json.contains("TxSubmitted"));
    }

    #[test]
    fn canonical_bytes_are_length_prefixed() {
        // Moving a character between adjacent fields must change the payload.
        let a = EventKind::RelayerUpdated {
            relayer: Address::new("ab"),
            authorized: true,
            primary_relayer: Address::new("c"),
        };
        let b = EventKind::RelayerUpdated {
            relayer: Address::new("a"),
            authorized: true,
            primary_relayer: Address::new("bc"),
        };
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());

        let ts = Utc::now();
        assert_ne!(
            chain_digest(&GENESIS_DIGEST, 0, &ts, &a),
            chain_digest(&GENESIS_DIGEST, 0, &ts, &b)
        );
    }

    #[test]
    fn every_variant_has_a_distinct_non_empty_encoding() {
        let h = TxHash::new([1; 32]);
        let kinds = [
            submitted(),
            EventKind::TxHeld {
                tx_hash: h,
                reason: String::new(),
            },
            EventKind::TxVerified {
                tx_hash: h,
                verified: true,
                reason: String::new(),
            },
            EventKind::TxVerified {
                tx_hash: h,
                verified: false,
                reason: String::new(),
            },
            EventKind::TxCompleted { tx_hash: h },
            EventKind::OwnershipTransferred {
                previous_owner: Address::new("a"),
                new_owner: Address::new("b"),
            },
        ];
        let encoded: Vec<Vec<u8>> = kinds.iter().map(EventKind::canonical_bytes).collect();
        for (i, bytes) in encoded.iter().enumerate() {
            assert!(bytes.len() > 1);
            for other in &encoded[i + 1..] {
                assert_ne!(bytes, other);
            }
        }
    }

    #[test]
    fn resulting_status_follows_the_event() {
        let h = TxHash::new([2; 32]);
        assert_eq!(submitted().resulting_status(), Some(TxStatus::Pending));
        assert_eq!(
            EventKind::TxVerified {
                tx_hash: h,
                verified: false,
                reason: "no".into()
            }
            .resulting_status(),
            Some(TxStatus::Rejected)
        );
        assert_eq!(
            EventKind::TxCompleted { tx_hash: h }.resulting_status(),
            Some(TxStatus::Completed)
        );
        assert_eq!(
            EventKind::RelayerUpdated {
                relayer: Address::new("r"),
                authorized: false,
                primary_relayer: Address::new("o"),
            }
            .resulting_status(),
            None
        );
    }
}
