// registry/src/slasher.rs

use crate::{registry::DarknodeRegistry, RegistryResult};
use darknode_core::{Amount, Claimable, EpochNumber, Percent, Token};
use darknode_crypto::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A penalty applied to a darknode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub darknode: Address,
    /// Account that received the slashed amount
    pub beneficiary: Address,
    pub percent: Percent,
    /// Amount taken from the bond
    pub amount: Amount,
    /// Registry epoch the penalty was applied in
    pub epoch: EpochNumber,
}

/// The account allowed to penalize darknodes.
///
/// The registry only accepts slashes from its configured slasher address;
/// this component holds that address and gates it behind its own owner. It
/// keeps the history of every penalty it applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slasher {
    address: Address,
    ownership: Claimable,
    history: Vec<SlashRecord>,
    offense_count: HashMap<Address, u32>,
    total_slashed: Amount,
}

impl Slasher {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            ownership: Claimable::new(owner),
            history: Vec::new(),
            offense_count: HashMap::new(),
            total_slashed: Amount::zero(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> RegistryResult<()> {
        Ok(self.ownership.transfer_ownership(caller, new_owner)?)
    }

    pub fn claim_ownership(&mut self, caller: &Address) -> RegistryResult<()> {
        Ok(self.ownership.claim_ownership(caller)?)
    }

    /// Slash `guilty` by `percent` and pay the difference to `beneficiary`
    pub fn slash<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        registry: &mut DarknodeRegistry,
        token: &mut T,
        guilty: &Address,
        beneficiary: &Address,
        percent: Percent,
    ) -> RegistryResult<SlashRecord> {
        self.ownership.ensure_owner(caller)?;

        let amount = registry.slash(&self.address, token, guilty, beneficiary, percent)?;
        let record = SlashRecord {
            darknode: *guilty,
            beneficiary: *beneficiary,
            percent,
            amount: amount.clone(),
            epoch: registry.current_epoch().number,
        };

        self.total_slashed = self.total_slashed.clone() + amount;
        *self.offense_count.entry(*guilty).or_insert(0) += 1;
        self.history.push(record.clone());

        tracing::info!(
            "Slasher {} recorded offense #{} for darknode {}",
            self.address,
            self.offense_count(guilty),
            guilty
        );
        Ok(record)
    }

    pub fn offense_count(&self, darknode: &Address) -> u32 {
        self.offense_count.get(darknode).copied().unwrap_or(0)
    }

    /// Penalties applied to one darknode, oldest first
    pub fn darknode_history(&self, darknode: &Address) -> Vec<&SlashRecord> {
        self.history.iter()
            .filter(|r| r.darknode == *darknode)
            .collect()
    }

    pub fn history(&self) -> &[SlashRecord] {
        &self.history
    }

    pub fn total_slashed(&self) -> &Amount {
        &self.total_slashed
    }
}
