// payment/src/ledger.rs

use crate::{PaymentError, PaymentResult};
use darknode_core::{Amount, Claimable, EpochNumber, Pending, Percent, Token, MAX_PERCENT};
use darknode_crypto::Address;
use registry::DarknodeRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reward pools of one token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPool {
    /// Deposits not yet released to any cycle
    pub pending: Amount,
    /// Released for the current cycle and not yet claimed
    pub claimable: Amount,
    /// Amount each eligible darknode may claim this cycle
    pub share: Amount,
}

/// Per-token reward ledger for darknodes.
///
/// All deposited tokens are held under the ledger's own address. Pools are
/// bookkeeping over that custody balance: `pending + claimable` plus every
/// unwithdrawn darknode balance always equals what the ledger holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarknodePayment {
    address: Address,
    ownership: Claimable,
    registry: Address,
    /// Registry epoch at the last rollover
    cycle: EpochNumber,
    payout_percent: Pending<Percent>,
    registered_tokens: BTreeSet<Address>,
    pending_registrations: BTreeSet<Address>,
    pending_deregistrations: BTreeSet<Address>,
    pools: BTreeMap<Address, TokenPool>,
    /// Members of the cycle being paid out
    cycle_darknodes: u64,
    /// (darknode, token) pairs claimed this cycle
    claimed: BTreeSet<(Address, Address)>,
    /// Claimed rewards awaiting withdrawal, keyed by (darknode, token)
    balances: BTreeMap<(Address, Address), Amount>,
}

impl DarknodePayment {
    /// Create a ledger paying darknodes of `registry`, starting at the
    /// registry's current epoch
    pub fn new(
        address: Address,
        owner: Address,
        registry: &DarknodeRegistry,
        payout_percent: Percent,
    ) -> PaymentResult<Self> {
        if payout_percent > MAX_PERCENT {
            return Err(PaymentError::InvalidPercent(payout_percent));
        }

        tracing::info!(
            "Darknode payment {} created for registry {} with payout {}%",
            address,
            registry.address(),
            payout_percent
        );

        Ok(Self {
            address,
            ownership: Claimable::new(owner),
            registry: registry.address(),
            cycle: registry.current_epoch().number,
            payout_percent: Pending::new(payout_percent),
            registered_tokens: BTreeSet::new(),
            pending_registrations: BTreeSet::new(),
            pending_deregistrations: BTreeSet::new(),
            pools: BTreeMap::new(),
            cycle_darknodes: 0,
            claimed: BTreeSet::new(),
            balances: BTreeMap::new(),
        })
    }

    // ==================== ACCESSORS ====================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn cycle(&self) -> EpochNumber {
        self.cycle
    }

    pub fn payout_percent(&self) -> Percent {
        *self.payout_percent.current()
    }

    /// Payout percent staged for the next rollover, if any
    pub fn pending_payout_percent(&self) -> Option<Percent> {
        self.payout_percent.next().copied()
    }

    pub fn registered_tokens(&self) -> impl Iterator<Item = &Address> {
        self.registered_tokens.iter()
    }

    pub fn is_registered_token(&self, token: &Address) -> bool {
        self.registered_tokens.contains(token)
    }

    pub fn is_pending_registration(&self, token: &Address) -> bool {
        self.pending_registrations.contains(token)
    }

    pub fn is_pending_deregistration(&self, token: &Address) -> bool {
        self.pending_deregistrations.contains(token)
    }

    pub fn pool(&self, token: &Address) -> TokenPool {
        self.pools.get(token).cloned().unwrap_or_default()
    }

    pub fn pending_pool(&self, token: &Address) -> Amount {
        self.pool(token).pending
    }

    pub fn claimable_pool(&self, token: &Address) -> Amount {
        self.pool(token).claimable
    }

    pub fn share(&self, token: &Address) -> Amount {
        self.pool(token).share
    }

    pub fn cycle_darknodes(&self) -> u64 {
        self.cycle_darknodes
    }

    pub fn has_claimed(&self, darknode: &Address, token: &Address) -> bool {
        self.claimed.contains(&(*darknode, *token))
    }

    /// Claimed and not yet withdrawn
    pub fn balance(&self, darknode: &Address, token: &Address) -> Amount {
        self.balances.get(&(*darknode, *token)).cloned().unwrap_or_default()
    }

    // ==================== ADMINISTRATION ====================

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> PaymentResult<()> {
        Ok(self.ownership.transfer_ownership(caller, new_owner)?)
    }

    pub fn claim_ownership(&mut self, caller: &Address) -> PaymentResult<()> {
        Ok(self.ownership.claim_ownership(caller)?)
    }

    /// Point the ledger at a successor registry
    pub fn update_registry(&mut self, caller: &Address, registry: Address) -> PaymentResult<()> {
        self.ownership.ensure_owner(caller)?;
        if registry.is_zero() {
            return Err(PaymentError::InvalidParameter("registry cannot be the zero address".into()));
        }
        tracing::info!("Darknode payment {} now follows registry {}", self.address, registry);
        self.registry = registry;
        Ok(())
    }

    /// Stage a new payout percent for the next rollover
    pub fn update_payout_percent(&mut self, caller: &Address, percent: Percent) -> PaymentResult<()> {
        self.ownership.ensure_owner(caller)?;
        if percent > MAX_PERCENT {
            return Err(PaymentError::InvalidPercent(percent));
        }
        tracing::info!("Payout percent update to {}% staged for next cycle", percent);
        self.payout_percent.stage(percent);
        Ok(())
    }

    /// Start paying out `token` from the next rollover
    pub fn register_token(&mut self, caller: &Address, token: Address) -> PaymentResult<()> {
        self.ownership.ensure_owner(caller)?;
        if token.is_zero() {
            return Err(PaymentError::InvalidParameter("token cannot be the zero address".into()));
        }

        if self.pending_deregistrations.remove(&token) {
            tracing::info!("Token {} deregistration cancelled", token);
            return Ok(());
        }
        if self.registered_tokens.contains(&token) || !self.pending_registrations.insert(token) {
            return Err(PaymentError::TokenAlreadyRegistered(token));
        }

        tracing::info!("Token {} registration pending until next cycle", token);
        Ok(())
    }

    /// Stop paying out `token` from the next rollover
    pub fn deregister_token(&mut self, caller: &Address, token: Address) -> PaymentResult<()> {
        self.ownership.ensure_owner(caller)?;

        if self.pending_registrations.remove(&token) {
            tracing::info!("Token {} registration cancelled", token);
            return Ok(());
        }
        if !self.registered_tokens.contains(&token) {
            return Err(PaymentError::TokenNotRegistered(token));
        }

        self.pending_deregistrations.insert(token);
        tracing::info!("Token {} deregistration pending until next cycle", token);
        Ok(())
    }

    // ==================== FUNDING ====================

    /// Pull `amount` of `token` from `from` into the pending pool.
    ///
    /// `from` must have approved the ledger address.
    pub fn deposit<T: Token + ?Sized>(
        &mut self,
        from: &Address,
        token: &mut T,
        amount: &Amount,
    ) -> PaymentResult<()> {
        let id = token.id();
        if !self.registered_tokens.contains(&id) && !self.pending_registrations.contains(&id) {
            return Err(PaymentError::TokenNotRegistered(id));
        }
        if amount.is_zero() {
            return Err(PaymentError::InvalidParameter("deposit amount must be non-zero".into()));
        }

        token.transfer_from(&self.address, from, &self.address, amount)?;

        let pool = self.pools.entry(id).or_default();
        pool.pending = pool.pending.clone() + amount.clone();

        tracing::debug!("Deposited {} of token {} from {}", amount, id, from);
        Ok(())
    }

    // ==================== CYCLES ====================

    /// Roll over to the registry's current epoch.
    ///
    /// Unclaimed rewards of the finished cycle return to the pending pool,
    /// staged tokens are applied, and the payout fraction of each pending
    /// pool is released in whole shares across the members of the epoch
    /// that just ended. A staged payout percent applies from the next
    /// rollover on.
    pub fn change_cycle(&mut self, registry: &DarknodeRegistry) -> PaymentResult<EpochNumber> {
        if registry.address() != self.registry {
            return Err(PaymentError::WrongRegistry(registry.address()));
        }
        let epoch = registry.current_epoch().number;
        if epoch <= self.cycle {
            return Err(PaymentError::CycleNotEnded(self.cycle));
        }

        for token in std::mem::take(&mut self.pending_registrations) {
            self.registered_tokens.insert(token);
        }
        for token in std::mem::take(&mut self.pending_deregistrations) {
            self.registered_tokens.remove(&token);
        }

        let darknodes = registry.num_darknodes_previous_epoch();
        let percent = self.payout_percent();

        for (token, pool) in self.pools.iter_mut() {
            let mut pending = pool.pending.clone() + std::mem::take(&mut pool.claimable);
            pool.share = Amount::zero();

            if self.registered_tokens.contains(token) {
                if let Some(share) = pending.percent(percent).checked_div_u64(darknodes) {
                    let released = share.mul_u64(darknodes);
                    pending = pending.saturating_sub(&released);
                    pool.claimable = released;
                    pool.share = share;
                }
            }
            pool.pending = pending;

            tracing::debug!(
                "Cycle {}: token {} releases {} per darknode, {} stays pending",
                epoch,
                token,
                pool.share,
                pool.pending
            );
        }

        if self.payout_percent.activate() {
            tracing::info!("Payout percent is now {}%", self.payout_percent());
        }

        self.claimed.clear();
        self.cycle_darknodes = darknodes;
        self.cycle = epoch;

        tracing::info!("Payment cycle {} started for {} darknodes", epoch, darknodes);
        Ok(epoch)
    }

    /// Credit the current share of `token` to `darknode`.
    ///
    /// Anyone may claim on behalf of a darknode; the reward is withdrawable
    /// only to its operator.
    pub fn claim(
        &mut self,
        registry: &DarknodeRegistry,
        darknode: &Address,
        token: &Address,
    ) -> PaymentResult<Amount> {
        self.ensure_claimable(registry, darknode)?;
        if !self.registered_tokens.contains(token) {
            return Err(PaymentError::TokenNotRegistered(*token));
        }
        if self.has_claimed(darknode, token) {
            return Err(PaymentError::AlreadyClaimed {
                darknode: *darknode,
                token: *token,
                cycle: self.cycle,
            });
        }

        Ok(self.credit(darknode, token))
    }

    /// Claim every registered token not yet claimed this cycle
    pub fn claim_all(
        &mut self,
        registry: &DarknodeRegistry,
        darknode: &Address,
    ) -> PaymentResult<Vec<(Address, Amount)>> {
        self.ensure_claimable(registry, darknode)?;

        let unclaimed: Vec<Address> = self.registered_tokens.iter()
            .filter(|token| !self.has_claimed(darknode, token))
            .copied()
            .collect();

        if unclaimed.is_empty() {
            if let Some(token) = self.registered_tokens.iter().next() {
                return Err(PaymentError::AlreadyClaimed {
                    darknode: *darknode,
                    token: *token,
                    cycle: self.cycle,
                });
            }
        }

        Ok(unclaimed.into_iter()
            .map(|token| {
                let amount = self.credit(darknode, &token);
                (token, amount)
            })
            .collect())
    }

    fn ensure_claimable(&self, registry: &DarknodeRegistry, darknode: &Address) -> PaymentResult<()> {
        if registry.address() != self.registry {
            return Err(PaymentError::WrongRegistry(registry.address()));
        }
        let epoch = registry.current_epoch().number;
        if epoch != self.cycle {
            return Err(PaymentError::CycleOutOfSync { cycle: self.cycle, epoch });
        }
        if !registry.is_registered_in_previous_epoch(darknode) {
            return Err(PaymentError::NotRegisteredInCycle(*darknode));
        }
        Ok(())
    }

    fn credit(&mut self, darknode: &Address, token: &Address) -> Amount {
        let pool = self.pools.entry(*token).or_default();
        let share = pool.share.clone();
        pool.claimable = pool.claimable.saturating_sub(&share);

        let balance = self.balances.entry((*darknode, *token)).or_default();
        *balance = balance.clone() + share.clone();
        self.claimed.insert((*darknode, *token));

        tracing::debug!("Darknode {} claimed {} of token {} in cycle {}", darknode, share, token, self.cycle);
        share
    }

    /// Send the claimed balance of `token` to the darknode's operator
    pub fn withdraw<T: Token + ?Sized>(
        &mut self,
        registry: &DarknodeRegistry,
        token: &mut T,
        darknode: &Address,
    ) -> PaymentResult<Amount> {
        let id = token.id();
        let operator = registry.get_darknode_operator(darknode)
            .ok_or(PaymentError::InvalidDarknode(*darknode))?;
        let amount = self.balance(darknode, &id);
        if amount.is_zero() {
            return Err(PaymentError::NothingToWithdraw {
                darknode: *darknode,
                token: id,
            });
        }

        token.transfer(&self.address, &operator, &amount)?;
        self.balances.remove(&(*darknode, id));

        tracing::info!("Withdrew {} of token {} for darknode {} to {}", amount, id, darknode, operator);
        Ok(amount)
    }
}
