// darknode-core/src/ownable.rs

use crate::ErrorKind;
use darknode_crypto::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnershipError {
    #[error("caller {caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("caller {caller} is not the pending owner")]
    NotPendingOwner { caller: Address },

    #[error("new owner cannot be the zero address")]
    ZeroAddress,
}

impl OwnershipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OwnershipError::ZeroAddress => ErrorKind::Parameter,
            _ => ErrorKind::Authorization,
        }
    }
}

/// Ownership that changes hands in two steps.
///
/// The current owner nominates a successor; the successor becomes owner
/// only once it claims. Until then the old owner stays in control and may
/// re-nominate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimable {
    owner: Address,
    pending_owner: Option<Address>,
}

impl Claimable {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            pending_owner: None,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.pending_owner
    }

    pub fn is_owner(&self, caller: &Address) -> bool {
        self.owner == *caller
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<(), OwnershipError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(OwnershipError::NotOwner { caller: *caller })
        }
    }

    /// Nominate `new_owner`; replaces any earlier nomination
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), OwnershipError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(OwnershipError::ZeroAddress);
        }
        self.pending_owner = Some(new_owner);
        tracing::info!("Ownership of {} nominated to {}", self.owner, new_owner);
        Ok(())
    }

    pub fn claim_ownership(&mut self, caller: &Address) -> Result<(), OwnershipError> {
        if self.pending_owner != Some(*caller) {
            return Err(OwnershipError::NotPendingOwner { caller: *caller });
        }
        tracing::info!("Ownership claimed by {} (was {})", caller, self.owner);
        self.owner = *caller;
        self.pending_owner = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_step_transfer() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let mut ownable = Claimable::new(alice);

        ownable.transfer_ownership(&alice, bob).unwrap();
        // Not effective until claimed
        assert_eq!(ownable.owner(), alice);
        assert_eq!(ownable.pending_owner(), Some(bob));

        ownable.claim_ownership(&bob).unwrap();
        assert_eq!(ownable.owner(), bob);
        assert_eq!(ownable.pending_owner(), None);
    }

    #[test]
    fn test_only_owner_nominates() {
        let alice = Address::from_label("alice");
        let mallory = Address::from_label("mallory");
        let mut ownable = Claimable::new(alice);

        let err = ownable.transfer_ownership(&mallory, mallory).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(ownable.transfer_ownership(&alice, Address::zero()), Err(OwnershipError::ZeroAddress));
    }

    #[test]
    fn test_only_nominee_claims() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let carol = Address::from_label("carol");
        let mut ownable = Claimable::new(alice);

        assert!(ownable.claim_ownership(&bob).is_err());
        ownable.transfer_ownership(&alice, bob).unwrap();
        assert!(ownable.claim_ownership(&carol).is_err());

        // Re-nomination replaces bob
        ownable.transfer_ownership(&alice, carol).unwrap();
        assert!(ownable.claim_ownership(&bob).is_err());
        ownable.claim_ownership(&carol).unwrap();
        assert_eq!(ownable.owner(), carol);
    }
}
