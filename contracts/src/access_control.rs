//! # Access Control
//!
//! Gates every mutating ledger operation by caller identity and manages the
//! owner / relayer roster.
//!
//! ## Roles
//!
//! - **Owner** — transfers ownership, grants and revokes relayers, releases
//!   held transactions, completes verified ones. Exactly one at a time.
//! - **Relayer** — the primary relayer, or any member of the authorized set.
//!   Records verification outcomes and places holds.
//!
//! ## Relayer Policy
//!
//! Granting a relayer also makes it primary: the most recent grant wins.
//! Revoking the primary relayer hands the role back to the owner, so the
//! ledger is never left without an acting relayer.

use guard_protocol::audit::EventKind;
use guard_protocol::{Address, AuthorizationState};

use crate::error::{LedgerError, LedgerResult, Role};

/// The roster plus the rules for changing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControl {
    state: AuthorizationState,
}

impl AccessControl {
    /// Initializes the roster with `initializer` as owner and sole relayer.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `initializer` is the null identity.
    pub fn new(initializer: Address) -> LedgerResult<Self> {
        if initializer.is_zero() {
            return Err(LedgerError::Validation(
                "initializing owner must not be the zero address".into(),
            ));
        }
        Ok(Self {
            state: AuthorizationState::initial(initializer),
        })
    }

    /// Rebuilds access control from a persisted roster, re-checking the
    /// non-null invariants.
    pub fn from_state(state: AuthorizationState) -> LedgerResult<Self> {
        if state.owner.is_zero() || state.primary_relayer.is_zero() {
            return Err(LedgerError::Validation(
                "persisted roster has a zero owner or primary relayer".into(),
            ));
        }
        Ok(Self { state })
    }

    /// The underlying roster.
    pub fn state(&self) -> &AuthorizationState {
        &self.state
    }

    pub fn owner(&self) -> &Address {
        &self.state.owner
    }

    pub fn primary_relayer(&self) -> &Address {
        &self.state.primary_relayer
    }

    /// Members of the authorized set, in sorted order.
    pub fn authorized_relayers(&self) -> impl Iterator<Item = &Address> {
        self.state.authorized_relayers.iter()
    }

    /// True iff `address` is the primary relayer or in the authorized set.
    pub fn is_authorized_relayer(&self, address: &Address) -> bool {
        self.state.is_authorized_relayer(address)
    }

    /// Fails with [`LedgerError::Unauthorized`] unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &Address) -> LedgerResult<()> {
        if self.state.is_owner(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                required: Role::Owner,
            })
        }
    }

    /// Fails with [`LedgerError::Unauthorized`] unless `caller` is a relayer.
    pub fn ensure_relayer(&self, caller: &Address) -> LedgerResult<()> {
        if self.is_authorized_relayer(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                required: Role::Relayer,
            })
        }
    }

    /// Hands ownership to `new_owner`. The previous owner loses owner rights
    /// immediately; there is no accept step.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// Returns [`LedgerError::Validation`] if `new_owner` is the null identity.
    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> LedgerResult<EventKind> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(LedgerError::Validation(
                "new owner must not be the zero address".into(),
            ));
        }

        let previous_owner = std::mem::replace(&mut self.state.owner, new_owner.clone());
        Ok(EventKind::OwnershipTransferred {
            previous_owner,
            new_owner,
        })
    }

    /// Grants (`authorized = true`) or revokes relayer rights.
    ///
    /// A grant adds `relayer` to the set and makes it primary. A revoke
    /// removes it from the set; if it was primary, the owner becomes primary.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// Returns [`LedgerError::Validation`] if `relayer` is the null identity.
    pub fn set_relayer(
        &mut self,
        caller: &Address,
        relayer: Address,
        authorized: bool,
    ) -> LedgerResult<EventKind> {
        self.ensure_owner(caller)?;
        if relayer.is_zero() {
            return Err(LedgerError::Validation(
                "relayer must not be the zero address".into(),
            ));
        }

        if authorized {
            self.state.authorized_relayers.insert(relayer.clone());
            self.state.primary_relayer = relayer.clone();
        } else {
            self.state.authorized_relayers.remove(&relayer);
            if self.state.primary_relayer == relayer {
                self.state.primary_relayer = self.state.owner.clone();
            }
        }

        Ok(EventKind::RelayerUpdated {
            relayer,
            authorized,
            primary_relayer: self.state.primary_relayer.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn access() -> AccessControl {
        AccessControl::new(addr("owner")).unwrap()
    }

    #[test]
    fn initializer_is_owner_and_primary_relayer() {
        let ac = access();
        assert_eq!(ac.owner(), &addr("owner"));
        assert_eq!(ac.primary_relayer(), &addr("owner"));
        assert!(ac.is_authorized_relayer(&addr("owner")));
        assert_eq!(ac.authorized_relayers().count(), 0);
    }

    #[test]
    fn zero_initializer_rejected() {
        assert!(matches!(
            AccessControl::new(Address::zero()),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn transfer_ownership_moves_owner_rights() {
        let mut ac = access();
        let ev = ac.transfer_ownership(&addr("owner"), addr("heir")).unwrap();
        assert_eq!(
            ev,
            EventKind::OwnershipTransferred {
                previous_owner: addr("owner"),
                new_owner: addr("heir"),
            }
        );
        assert!(ac.ensure_owner(&addr("heir")).is_ok());
        assert!(ac.ensure_owner(&addr("owner")).is_err());
    }

    #[test]
    fn non_owner_cannot_transfer() {
        let mut ac = access();
        let before = ac.clone();
        let err = ac
            .transfer_ownership(&addr("mallory"), addr("mallory"))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Unauthorized {
                required: Role::Owner,
                ..
            }
        ));
        assert_eq!(ac, before);
    }

    #[test]
    fn transfer_to_zero_rejected() {
        let mut ac = access();
        let err = ac
            .transfer_ownership(&addr("owner"), addr("0x0000"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(ac.owner(), &addr("owner"));
    }

    #[test]
    fn grant_makes_relayer_primary() {
        let mut ac = access();
        ac.set_relayer(&addr("owner"), addr("r1"), true).unwrap();
        ac.set_relayer(&addr("owner"), addr("r2"), true).unwrap();

        assert_eq!(ac.primary_relayer(), &addr("r2"));
        assert!(ac.is_authorized_relayer(&addr("r1")));
        assert!(ac.is_authorized_relayer(&addr("r2")));
    }

    #[test]
    fn revoking_primary_falls_back_to_owner() {
        let mut ac = access();
        ac.set_relayer(&addr("owner"), addr("r"), true).unwrap();
        let ev = ac.set_relayer(&addr("owner"), addr("r"), false).unwrap();

        assert_eq!(ac.primary_relayer(), &addr("owner"));
        assert!(!ac.is_authorized_relayer(&addr("r")));
        assert_eq!(
            ev,
            EventKind::RelayerUpdated {
                relayer: addr("r"),
                authorized: false,
                primary_relayer: addr("owner"),
            }
        );
    }

    #[test]
    fn revoking_non_primary_keeps_primary() {
        let mut ac = access();
        ac.set_relayer(&addr("owner"), addr("r1"), true).unwrap();
        ac.set_relayer(&addr("owner"), addr("r2"), true).unwrap();
        ac.set_relayer(&addr("owner"), addr("r1"), false).unwrap();

        assert_eq!(ac.primary_relayer(), &addr("r2"));
        assert!(!ac.is_authorized_relayer(&addr("r1")));
    }

    #[test]
    fn non_owner_cannot_set_relayer() {
        let mut ac = access();
        let err = ac.set_relayer(&addr("owner2"), addr("r"), true).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(!ac.is_authorized_relayer(&addr("r")));
    }

    #[test]
    fn zero_relayer_rejected() {
        let mut ac = access();
        let err = ac.set_relayer(&addr("owner"), Address::zero(), true).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn relayer_check_names_the_role() {
        let ac = access();
        let err = ac.ensure_relayer(&addr("stranger")).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Unauthorized {
                required: Role::Relayer,
                ..
            }
        ));
    }

    #[test]
    fn from_state_rejects_zero_owner() {
        let mut state = AuthorizationState::initial(addr("owner"));
        state.owner = Address::zero();
        assert!(AccessControl::from_state(state).is_err());
    }
}
