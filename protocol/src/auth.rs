//! # Authorization State
//!
//! The single-owner / multi-relayer roster. This is the data; the rules for
//! changing it live in the contract layer's access control.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::Address;

/// Who may do what.
///
/// - `owner` — exclusive rights over ownership transfer, relayer management,
///   and releasing / completing held transactions.
/// - `primary_relayer` — the acting relayer. Defaults to the owner.
/// - `authorized_relayers` — additional relayers; membership alone grants
///   relayer rights.
///
/// Neither `owner` nor `primary_relayer` is ever the null identity.
/// A `BTreeSet` keeps the serialized form deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub owner: Address,
    pub primary_relayer: Address,
    pub authorized_relayers: BTreeSet<Address>,
}

impl AuthorizationState {
    /// The initial roster: the initializing identity is both owner and sole
    /// relayer.
    pub fn initial(initializer: Address) -> Self {
        Self {
            owner: initializer.clone(),
            primary_relayer: initializer,
            authorized_relayers: BTreeSet::new(),
        }
    }

    /// True iff `address` is the primary relayer or an authorized relayer.
    pub fn is_authorized_relayer(&self, address: &Address) -> bool {
        *address == self.primary_relayer || self.authorized_relayers.contains(address)
    }

    /// True iff `address` is the owner.
    pub fn is_owner(&self, address: &Address) -> bool {
        *address == self.owner
    }
}
