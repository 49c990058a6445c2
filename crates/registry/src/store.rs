// registry/src/store.rs

use crate::{linked_list::LinkedList, RegistryError, RegistryResult};
use darknode_core::{Amount, Claimable, EpochNumber, Token};
use darknode_crypto::{Address, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stored record of a darknode between registration and refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darknode {
    /// Account that registered the darknode and receives its bond
    pub operator: Address,
    /// Bond currently held for this darknode
    pub bond: Amount,
    pub public_key: PublicKey,
    /// First epoch the darknode is a member of
    pub registered_at: EpochNumber,
    /// First epoch the darknode is no longer a member of
    pub deregistered_at: Option<EpochNumber>,
}

/// Bond and membership store.
///
/// Holds every darknode record plus the bonded tokens under its own custody
/// address. Only the owner (the active registry) may mutate it, and the
/// owner changes through the nominate/claim handshake so that a successor
/// registry can take over the store intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarknodeRegistryStore {
    address: Address,
    token: Address,
    ownership: Claimable,
    darknodes: HashMap<Address, Darknode>,
    order: LinkedList,
}

impl DarknodeRegistryStore {
    /// Create a store holding bonds of `token`, owned by `owner`
    pub fn new(address: Address, token: Address, owner: Address) -> Self {
        Self {
            address,
            token,
            ownership: Claimable::new(owner),
            darknodes: HashMap::new(),
            order: LinkedList::new(),
        }
    }

    /// Custody account holding the bonds
    pub fn address(&self) -> Address {
        self.address
    }

    /// Token the bonds are denominated in
    pub fn token(&self) -> Address {
        self.token
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.ownership.pending_owner()
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> RegistryResult<()> {
        Ok(self.ownership.transfer_ownership(caller, new_owner)?)
    }

    pub fn claim_ownership(&mut self, caller: &Address) -> RegistryResult<()> {
        Ok(self.ownership.claim_ownership(caller)?)
    }

    fn ensure_token<T: Token + ?Sized>(&self, token: &T) -> RegistryResult<()> {
        if token.id() != self.token {
            return Err(RegistryError::WrongToken {
                expected: self.token,
                actual: token.id(),
            });
        }
        Ok(())
    }

    fn get_existing(&self, id: &Address) -> RegistryResult<&Darknode> {
        self.darknodes.get(id).ok_or(RegistryError::InvalidDarknode(*id))
    }

    // ==================== QUERIES ====================

    pub fn get(&self, id: &Address) -> Option<&Darknode> {
        self.darknodes.get(id)
    }

    pub fn contains(&self, id: &Address) -> bool {
        self.darknodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.darknodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.darknodes.is_empty()
    }

    /// First darknode in storage order
    pub fn begin(&self) -> Option<Address> {
        self.order.begin()
    }

    pub fn next(&self, id: &Address) -> Option<Address> {
        self.order.next(id)
    }

    /// Darknodes in storage order
    pub fn iter(&self) -> impl Iterator<Item = (Address, &Darknode)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.darknodes.get(&id).map(|node| (id, node)))
    }

    pub fn operator(&self, id: &Address) -> Option<Address> {
        self.darknodes.get(id).map(|n| n.operator)
    }

    pub fn bond(&self, id: &Address) -> Amount {
        self.darknodes.get(id).map(|n| n.bond.clone()).unwrap_or_default()
    }

    pub fn public_key(&self, id: &Address) -> Option<&PublicKey> {
        self.darknodes.get(id).map(|n| &n.public_key)
    }

    /// Sum of all bonds, which must match the custody balance
    pub fn total_bonded(&self) -> Amount {
        self.darknodes.values()
            .fold(Amount::zero(), |acc, n| acc + n.bond.clone())
    }

    // ==================== OWNER-ONLY MUTATIONS ====================

    /// Record a newly registered darknode with its bond.
    ///
    /// The bond is set exactly once per registration; later changes only go
    /// through the decreasing paths below.
    pub fn append_darknode(
        &mut self,
        caller: &Address,
        id: Address,
        operator: Address,
        bond: Amount,
        public_key: PublicKey,
        registered_at: EpochNumber,
    ) -> RegistryResult<()> {
        self.ownership.ensure_owner(caller)?;
        if self.contains(&id) {
            return Err(RegistryError::AlreadyPendingOrRegistered(id));
        }

        self.darknodes.insert(id, Darknode {
            operator,
            bond,
            public_key,
            registered_at,
            deregistered_at: None,
        });
        self.order.append(id);
        Ok(())
    }

    pub fn update_deregistered_at(
        &mut self,
        caller: &Address,
        id: &Address,
        deregistered_at: EpochNumber,
    ) -> RegistryResult<()> {
        self.ownership.ensure_owner(caller)?;
        let node = self.darknodes.get_mut(id)
            .ok_or(RegistryError::InvalidDarknode(*id))?;
        node.deregistered_at = Some(deregistered_at);
        Ok(())
    }

    /// Decrease a bond and send the difference to the store owner
    pub fn update_bond<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        id: &Address,
        new_bond: Amount,
    ) -> RegistryResult<Amount> {
        let owner = self.owner();
        self.decrease_bond_to(caller, token, id, new_bond, &owner)
    }

    /// Decrease a bond and send the difference to `recipient`.
    ///
    /// The token transfer happens before the bond is written; if it fails
    /// the bond is untouched.
    pub fn decrease_bond_to<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        id: &Address,
        new_bond: Amount,
        recipient: &Address,
    ) -> RegistryResult<Amount> {
        self.ownership.ensure_owner(caller)?;
        self.ensure_token(token)?;

        let current = self.get_existing(id)?.bond.clone();
        let difference = match current.checked_sub(&new_bond) {
            Some(diff) if !diff.is_zero() => diff,
            _ => {
                return Err(RegistryError::BondNotDecreased {
                    current,
                    requested: new_bond,
                })
            }
        };

        token.transfer(&self.address, recipient, &difference)?;

        if let Some(node) = self.darknodes.get_mut(id) {
            node.bond = new_bond;
        }
        tracing::debug!("Bond of {} decreased by {} to {}", id, difference, recipient);
        Ok(difference)
    }

    /// Return the remaining bond to the operator and delete the record
    pub fn remove_darknode<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        id: &Address,
    ) -> RegistryResult<Darknode> {
        self.ownership.ensure_owner(caller)?;
        self.ensure_token(token)?;

        let node = self.get_existing(id)?;
        token.transfer(&self.address, &node.operator, &node.bond)?;

        self.order.remove(id);
        self.darknodes.remove(id).ok_or(RegistryError::InvalidDarknode(*id))
    }
}
