// registry/src/registry.rs

use crate::{
    epoch::{Epoch, EpochScheduler},
    store::{Darknode, DarknodeRegistryStore},
    RegistryError, RegistryResult,
};
use darknode_core::{Amount, Claimable, EpochNumber, Pending, Percent, Timestamp, Token, MAX_PERCENT};
use darknode_crypto::{Address, PublicKey};
use serde::{Deserialize, Serialize};

/// Largest explicit page a pagination query may request
pub const MAX_PAGE_SIZE: usize = 1024;

/// Lifecycle state of a darknode at the current epoch.
///
/// Exactly one variant holds for any id. `Deregisterable` and
/// `RegisteredInPreviousEpoch` are flags layered on top, see the `is_*`
/// predicates on [`DarknodeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DarknodeStatus {
    /// Never registered, or bond already refunded
    Refunded,
    /// Registered; becomes a member at the next epoch
    PendingRegistration,
    /// Member of the current epoch
    Registered,
    /// Member of the current epoch; leaves at the next one
    PendingDeregistration,
    /// Left the current epoch; bond still locked
    Deregistered,
    /// Bond can be refunded
    Refundable,
}

/// Genesis parameters for a registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Bond pulled from the operator at registration
    pub minimum_bond: Amount,
    pub minimum_pod_size: u64,
    /// Seconds between epoch advances
    pub minimum_epoch_interval: u64,
    /// Only account allowed to slash; zero disables slashing
    pub slasher: Address,
    /// Payment ledger rolled over at each epoch; zero for none
    pub darknode_payment: Address,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            minimum_bond: Amount::from_tokens(100_000),
            minimum_pod_size: 24,
            minimum_epoch_interval: 24 * 3600, // 1 day
            slasher: Address::zero(),
            darknode_payment: Address::zero(),
        }
    }
}

/// Tunable parameters. Updates are staged and activated by the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryParams {
    pub minimum_bond: Pending<Amount>,
    pub minimum_pod_size: Pending<u64>,
    pub minimum_epoch_interval: Pending<u64>,
    pub slasher: Pending<Address>,
    pub darknode_payment: Pending<Address>,
}

impl RegistryParams {
    fn from_config(config: &RegistryConfig) -> Self {
        Self {
            minimum_bond: Pending::new(config.minimum_bond.clone()),
            minimum_pod_size: Pending::new(config.minimum_pod_size),
            minimum_epoch_interval: Pending::new(config.minimum_epoch_interval),
            slasher: Pending::new(config.slasher),
            darknode_payment: Pending::new(config.darknode_payment),
        }
    }

    fn activate(&mut self, epoch: EpochNumber) {
        if self.minimum_bond.activate() {
            tracing::info!("Epoch {}: minimum bond is now {}", epoch, self.minimum_bond.current());
        }
        if self.minimum_pod_size.activate() {
            tracing::info!("Epoch {}: minimum pod size is now {}", epoch, self.minimum_pod_size.current());
        }
        if self.minimum_epoch_interval.activate() {
            tracing::info!(
                "Epoch {}: minimum epoch interval is now {}s",
                epoch,
                self.minimum_epoch_interval.current()
            );
        }
        if self.slasher.activate() {
            tracing::info!("Epoch {}: slasher is now {}", epoch, self.slasher.current());
        }
        if self.darknode_payment.activate() {
            tracing::info!("Epoch {}: darknode payment is now {}", epoch, self.darknode_payment.current());
        }
    }
}

/// Parameter values staged for the next epoch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingParameters {
    pub minimum_bond: Option<Amount>,
    pub minimum_pod_size: Option<u64>,
    pub minimum_epoch_interval: Option<u64>,
    pub slasher: Option<Address>,
    pub darknode_payment: Option<Address>,
}

impl PendingParameters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Member counts for the three epoch views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCounts {
    pub current: u64,
    pub previous: u64,
    pub next: u64,
}

/// Logic-side state of a registry, persisted apart from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryState {
    pub address: Address,
    pub ownership: Claimable,
    pub scheduler: EpochScheduler,
    pub params: RegistryParams,
    pub counts: MembershipCounts,
}

/// The darknode registry.
///
/// Owns the lifecycle rules; all bond and membership data lives in the
/// [`DarknodeRegistryStore`], which this registry must own.
#[derive(Debug, Clone)]
pub struct DarknodeRegistry {
    state: RegistryState,
    store: DarknodeRegistryStore,
}

impl DarknodeRegistry {
    /// Create a registry with a fresh store holding bonds of `token`
    pub fn new(
        address: Address,
        owner: Address,
        store_address: Address,
        token: Address,
        config: RegistryConfig,
        genesis_time: Timestamp,
    ) -> RegistryResult<Self> {
        if config.minimum_bond.is_zero() {
            return Err(RegistryError::InvalidParameter("minimum bond must be non-zero".into()));
        }

        let store = DarknodeRegistryStore::new(store_address, token, address);
        let state = RegistryState {
            address,
            ownership: Claimable::new(owner),
            scheduler: EpochScheduler::new(genesis_time),
            params: RegistryParams::from_config(&config),
            counts: MembershipCounts::default(),
        };

        tracing::info!(
            "Darknode registry {} created with minimum bond {} and epoch interval {}s",
            address,
            config.minimum_bond,
            config.minimum_epoch_interval
        );

        Ok(Self { state, store })
    }

    /// Reassemble a registry from persisted parts
    pub fn from_parts(state: RegistryState, store: DarknodeRegistryStore) -> RegistryResult<Self> {
        if store.owner() != state.address {
            return Err(RegistryError::StoreNotOwned {
                registry: state.address,
                owner: store.owner(),
            });
        }
        Ok(Self { state, store })
    }

    /// Split into the logic state and the store
    pub fn into_parts(self) -> (RegistryState, DarknodeRegistryStore) {
        (self.state, self.store)
    }

    /// Build a successor registry around an existing store.
    ///
    /// The predecessor must have nominated `address` through
    /// [`transfer_store_ownership`](Self::transfer_store_ownership). Epoch
    /// history and parameters carry over; member counts are recomputed from
    /// the store.
    pub fn adopt_store(
        predecessor: RegistryState,
        mut store: DarknodeRegistryStore,
        address: Address,
        owner: Address,
    ) -> RegistryResult<Self> {
        store.claim_ownership(&address)?;

        let mut registry = Self {
            state: RegistryState {
                address,
                ownership: Claimable::new(owner),
                scheduler: predecessor.scheduler,
                params: predecessor.params,
                counts: MembershipCounts::default(),
            },
            store,
        };
        registry.state.counts = registry.recount();

        tracing::info!(
            "Registry {} took over store {} from {} with {} darknodes",
            address,
            registry.store.address(),
            predecessor.address,
            registry.store.len()
        );
        Ok(registry)
    }

    // ==================== ACCESSORS ====================

    pub fn address(&self) -> Address {
        self.state.address
    }

    pub fn owner(&self) -> Address {
        self.state.ownership.owner()
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn store(&self) -> &DarknodeRegistryStore {
        &self.store
    }

    pub fn params(&self) -> &RegistryParams {
        &self.state.params
    }

    pub fn pending_parameters(&self) -> PendingParameters {
        let params = &self.state.params;
        PendingParameters {
            minimum_bond: params.minimum_bond.next().cloned(),
            minimum_pod_size: params.minimum_pod_size.next().copied(),
            minimum_epoch_interval: params.minimum_epoch_interval.next().copied(),
            slasher: params.slasher.next().copied(),
            darknode_payment: params.darknode_payment.next().copied(),
        }
    }

    pub fn current_epoch(&self) -> &Epoch {
        self.state.scheduler.current()
    }

    pub fn previous_epoch(&self) -> Option<&Epoch> {
        self.state.scheduler.previous()
    }

    pub fn minimum_bond(&self) -> &Amount {
        self.state.params.minimum_bond.current()
    }

    pub fn minimum_pod_size(&self) -> u64 {
        *self.state.params.minimum_pod_size.current()
    }

    pub fn minimum_epoch_interval(&self) -> u64 {
        *self.state.params.minimum_epoch_interval.current()
    }

    pub fn slasher(&self) -> Address {
        *self.state.params.slasher.current()
    }

    /// Active payment ledger address, if one is configured
    pub fn darknode_payment(&self) -> Option<Address> {
        let payment = *self.state.params.darknode_payment.current();
        (!payment.is_zero()).then_some(payment)
    }

    pub fn num_darknodes(&self) -> u64 {
        self.state.counts.current
    }

    pub fn num_darknodes_previous_epoch(&self) -> u64 {
        self.state.counts.previous
    }

    pub fn num_darknodes_next_epoch(&self) -> u64 {
        self.state.counts.next
    }

    pub fn get_darknode_operator(&self, id: &Address) -> Option<Address> {
        self.store.operator(id)
    }

    pub fn get_darknode_bond(&self, id: &Address) -> Amount {
        self.store.bond(id)
    }

    pub fn get_darknode_public_key(&self, id: &Address) -> Option<&PublicKey> {
        self.store.public_key(id)
    }

    pub fn get_darknode(&self, id: &Address) -> Option<&Darknode> {
        self.store.get(id)
    }

    // ==================== STATUS ====================

    fn epoch_number(&self) -> EpochNumber {
        self.current_epoch().number
    }

    fn registered_in_epoch(node: &Darknode, epoch: EpochNumber) -> bool {
        node.registered_at <= epoch && node.deregistered_at.map_or(true, |d| d > epoch)
    }

    fn is_registered_in(&self, id: &Address, epoch: EpochNumber) -> bool {
        self.store
            .get(id)
            .map_or(false, |node| Self::registered_in_epoch(node, epoch))
    }

    pub fn darknode_status(&self, id: &Address) -> DarknodeStatus {
        let epoch = self.epoch_number();
        let Some(node) = self.store.get(id) else {
            return DarknodeStatus::Refunded;
        };

        if node.registered_at > epoch {
            return DarknodeStatus::PendingRegistration;
        }
        match node.deregistered_at {
            None => DarknodeStatus::Registered,
            Some(d) if d > epoch => DarknodeStatus::PendingDeregistration,
            Some(d) if self.previous_epoch().map_or(false, |p| d <= p.number) => DarknodeStatus::Refundable,
            Some(_) => DarknodeStatus::Deregistered,
        }
    }

    pub fn is_refunded(&self, id: &Address) -> bool {
        !self.store.contains(id)
    }

    pub fn is_pending_registration(&self, id: &Address) -> bool {
        self.store
            .get(id)
            .map_or(false, |node| node.registered_at > self.epoch_number())
    }

    /// Member of the current epoch
    pub fn is_registered(&self, id: &Address) -> bool {
        self.is_registered_in(id, self.epoch_number())
    }

    /// Member of the current epoch with no deregistration pending
    pub fn is_deregisterable(&self, id: &Address) -> bool {
        self.is_registered(id)
            && self.store.get(id).map_or(false, |node| node.deregistered_at.is_none())
    }

    pub fn is_pending_deregistration(&self, id: &Address) -> bool {
        self.store
            .get(id)
            .and_then(|node| node.deregistered_at)
            .map_or(false, |d| d > self.epoch_number())
    }

    pub fn is_deregistered(&self, id: &Address) -> bool {
        self.store
            .get(id)
            .and_then(|node| node.deregistered_at)
            .map_or(false, |d| d <= self.epoch_number())
    }

    /// Deregistered for at least one full epoch
    pub fn is_refundable(&self, id: &Address) -> bool {
        self.darknode_status(id) == DarknodeStatus::Refundable
    }

    pub fn is_registered_in_previous_epoch(&self, id: &Address) -> bool {
        self.previous_epoch()
            .map_or(false, |previous| self.is_registered_in(id, previous.number))
    }

    // ==================== LIFECYCLE ====================

    /// Register `id` for the next epoch, pulling the minimum bond from
    /// `caller`. The caller must have approved the registry for the bond.
    pub fn register<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        id: Address,
        public_key: PublicKey,
    ) -> RegistryResult<()> {
        if id.is_zero() {
            return Err(RegistryError::NullDarknodeId);
        }
        if id == self.state.address || id == self.store.address() || id == token.id() {
            return Err(RegistryError::ReservedDarknodeId(id));
        }
        if public_key.is_empty() {
            return Err(RegistryError::InvalidParameter("public key is empty".into()));
        }
        if !self.is_refunded(&id) {
            return Err(RegistryError::AlreadyPendingOrRegistered(id));
        }
        if token.id() != self.store.token() {
            return Err(RegistryError::WrongToken {
                expected: self.store.token(),
                actual: token.id(),
            });
        }

        let bond = self.minimum_bond().clone();
        let registered_at = self.epoch_number() + 1;

        token.transfer_from(&self.state.address, caller, &self.store.address(), &bond)?;
        self.store.append_darknode(&self.state.address, id, *caller, bond.clone(), public_key, registered_at)?;
        self.state.counts.next += 1;

        tracing::info!(
            "Darknode {} registered by {} with bond {}, active from epoch {}",
            id,
            caller,
            bond,
            registered_at
        );
        Ok(())
    }

    /// Schedule `id` to leave at the next epoch. Operator only.
    pub fn deregister(&mut self, caller: &Address, id: &Address) -> RegistryResult<()> {
        let operator = self.store.operator(id)
            .ok_or(RegistryError::NotDeregisterable(*id))?;
        if operator != *caller {
            return Err(RegistryError::NotOperator {
                darknode: *id,
                caller: *caller,
            });
        }
        if !self.is_deregisterable(id) {
            return Err(RegistryError::NotDeregisterable(*id));
        }

        let deregistered_at = self.epoch_number() + 1;
        self.store.update_deregistered_at(&self.state.address, id, deregistered_at)?;
        self.state.counts.next = self.state.counts.next.saturating_sub(1);

        tracing::info!("Darknode {} deregistered, leaves at epoch {}", id, deregistered_at);
        Ok(())
    }

    /// Return the bond of a refundable darknode to its operator.
    ///
    /// Anyone may call this; the funds always go to the operator.
    pub fn refund<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        id: &Address,
    ) -> RegistryResult<Amount> {
        if !self.is_refundable(id) {
            return Err(RegistryError::NotYetRefundable(*id));
        }

        let node = self.store.remove_darknode(&self.state.address, token, id)?;

        tracing::info!(
            "Darknode {} refunded {} to operator {} (called by {})",
            id,
            node.bond,
            node.operator,
            caller
        );
        Ok(node.bond)
    }

    /// Penalize `id` by `percent` of its bond, paid to `beneficiary`.
    ///
    /// Repeated slashes are applied one after another. Returns the amount
    /// taken.
    pub fn slash<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        id: &Address,
        beneficiary: &Address,
        percent: Percent,
    ) -> RegistryResult<Amount> {
        if *caller != self.slasher() || self.slasher().is_zero() {
            return Err(RegistryError::NotSlasher(*caller));
        }
        if percent > MAX_PERCENT {
            return Err(RegistryError::InvalidPercent(percent));
        }
        if beneficiary.is_zero() {
            return Err(RegistryError::InvalidParameter("beneficiary is the zero address".into()));
        }
        if !self.store.contains(id) {
            return Err(RegistryError::InvalidDarknode(*id));
        }

        let bond = self.store.bond(id);
        let penalty = bond.percent(percent);
        if penalty.is_zero() {
            tracing::debug!("Slash of {} by {}% rounds to zero", id, percent);
            return Ok(penalty);
        }

        let new_bond = bond.saturating_sub(&penalty);
        self.store.decrease_bond_to(&self.state.address, token, id, new_bond.clone(), beneficiary)?;

        tracing::warn!(
            "Darknode {} slashed {}% ({}) to {}, remaining bond {}",
            id,
            percent,
            penalty,
            beneficiary,
            new_bond
        );
        Ok(penalty)
    }

    /// Advance to the next epoch.
    ///
    /// The first call is reserved for the owner; later calls are open to
    /// anyone once the minimum interval has elapsed. Pending members join,
    /// pending deregistrations leave, and staged parameters activate.
    pub fn epoch(&mut self, caller: &Address, now: Timestamp) -> RegistryResult<Epoch> {
        if !self.state.scheduler.is_bootstrapped() && !self.state.ownership.is_owner(caller) {
            return Err(RegistryError::FirstEpochRestricted(*caller));
        }

        let interval = self.minimum_epoch_interval();
        let epoch = self.state.scheduler.advance(now, interval)?.clone();

        let counts = &mut self.state.counts;
        counts.previous = counts.current;
        counts.current = counts.next;

        self.state.params.activate(epoch.number);

        tracing::info!(
            "Epoch {} started at {}: {} darknodes (previous {}), seed {}",
            epoch.number,
            epoch.timestamp,
            counts.current,
            counts.previous,
            epoch.seed
        );
        Ok(epoch)
    }

    /// Check whether `epoch` would succeed without applying it
    pub fn check_epoch(&self, caller: &Address, now: Timestamp) -> RegistryResult<()> {
        if !self.state.scheduler.is_bootstrapped() && !self.state.ownership.is_owner(caller) {
            return Err(RegistryError::FirstEpochRestricted(*caller));
        }
        self.state.scheduler.check_advance(now, self.minimum_epoch_interval())
    }

    // ==================== PAGINATION ====================

    /// Page through members of the current epoch.
    ///
    /// A zero `start` begins at the first member; otherwise the page starts
    /// after `start`. `count == 0` returns every remaining member. The page
    /// is padded with zero addresses; its last slot is the cursor for the
    /// next call, and a zero last slot means there are no more pages.
    /// Explicit counts above [`MAX_PAGE_SIZE`] are rejected.
    pub fn get_darknodes(&self, start: &Address, count: usize) -> RegistryResult<Vec<Address>> {
        let epoch = self.epoch_number();
        self.paginate(start, count, self.num_darknodes(), |node| {
            Self::registered_in_epoch(node, epoch)
        })
    }

    /// Page through members of the previous epoch, see [`get_darknodes`](Self::get_darknodes)
    pub fn get_previous_darknodes(&self, start: &Address, count: usize) -> RegistryResult<Vec<Address>> {
        let Some(previous) = self.previous_epoch().map(|e| e.number) else {
            return Ok(vec![Address::zero(); Self::page_size(count, 0)?]);
        };
        self.paginate(start, count, self.num_darknodes_previous_epoch(), |node| {
            Self::registered_in_epoch(node, previous)
        })
    }

    fn paginate<F>(&self, start: &Address, count: usize, total: u64, include: F) -> RegistryResult<Vec<Address>>
    where
        F: Fn(&Darknode) -> bool,
    {
        let count = Self::page_size(count, total)?;
        let mut page = vec![Address::zero(); count];

        let mut cursor = if start.is_zero() {
            self.store.begin()
        } else {
            if !self.store.contains(start) {
                return Err(RegistryError::UnknownCursor(*start));
            }
            self.store.next(start)
        };

        let mut filled = 0;
        while filled < count {
            let Some(id) = cursor else { break };
            if self.store.get(&id).map_or(false, &include) {
                page[filled] = id;
                filled += 1;
            }
            cursor = self.store.next(&id);
        }

        tracing::debug!("Paginated {} of {} darknodes from {}", filled, count, start);
        Ok(page)
    }

    fn page_size(count: usize, total: u64) -> RegistryResult<usize> {
        if count == 0 {
            return usize::try_from(total)
                .map_err(|_| RegistryError::InvalidParameter(format!("{} darknodes do not fit in one page", total)));
        }
        if count > MAX_PAGE_SIZE {
            return Err(RegistryError::InvalidParameter(format!(
                "page size {} exceeds maximum {}",
                count, MAX_PAGE_SIZE
            )));
        }
        Ok(count)
    }

    // ==================== ADMINISTRATION ====================

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> RegistryResult<()> {
        Ok(self.state.ownership.transfer_ownership(caller, new_owner)?)
    }

    pub fn claim_ownership(&mut self, caller: &Address) -> RegistryResult<()> {
        Ok(self.state.ownership.claim_ownership(caller)?)
    }

    /// Nominate a successor registry as owner of the store
    pub fn transfer_store_ownership(&mut self, caller: &Address, successor: Address) -> RegistryResult<()> {
        self.state.ownership.ensure_owner(caller)?;
        self.store.transfer_ownership(&self.state.address, successor)
    }

    pub fn update_minimum_bond(&mut self, caller: &Address, bond: Amount) -> RegistryResult<()> {
        self.state.ownership.ensure_owner(caller)?;
        if bond.is_zero() {
            return Err(RegistryError::InvalidParameter("minimum bond must be non-zero".into()));
        }
        tracing::info!("Minimum bond update to {} staged for next epoch", bond);
        self.state.params.minimum_bond.stage(bond);
        Ok(())
    }

    pub fn update_minimum_pod_size(&mut self, caller: &Address, pod_size: u64) -> RegistryResult<()> {
        self.state.ownership.ensure_owner(caller)?;
        tracing::info!("Minimum pod size update to {} staged for next epoch", pod_size);
        self.state.params.minimum_pod_size.stage(pod_size);
        Ok(())
    }

    pub fn update_minimum_epoch_interval(&mut self, caller: &Address, interval: u64) -> RegistryResult<()> {
        self.state.ownership.ensure_owner(caller)?;
        tracing::info!("Minimum epoch interval update to {}s staged for next epoch", interval);
        self.state.params.minimum_epoch_interval.stage(interval);
        Ok(())
    }

    pub fn update_slasher(&mut self, caller: &Address, slasher: Address) -> RegistryResult<()> {
        self.state.ownership.ensure_owner(caller)?;
        if slasher.is_zero() {
            return Err(RegistryError::InvalidParameter("slasher cannot be the zero address".into()));
        }
        tracing::info!("Slasher update to {} staged for next epoch", slasher);
        self.state.params.slasher.stage(slasher);
        Ok(())
    }

    /// Stage a new payment ledger; the zero address disconnects it
    pub fn update_darknode_payment(&mut self, caller: &Address, payment: Address) -> RegistryResult<()> {
        self.state.ownership.ensure_owner(caller)?;
        tracing::info!("Darknode payment update to {} staged for next epoch", payment);
        self.state.params.darknode_payment.stage(payment);
        Ok(())
    }

    /// Sweep tokens sent to the registry account by mistake.
    ///
    /// Bonds are held by the store and are never touched here.
    pub fn recover_tokens<T: Token + ?Sized>(
        &mut self,
        caller: &Address,
        token: &mut T,
        to: &Address,
    ) -> RegistryResult<Amount> {
        self.state.ownership.ensure_owner(caller)?;
        let balance = token.balance_of(&self.state.address);
        if !balance.is_zero() {
            token.transfer(&self.state.address, to, &balance)?;
            tracing::info!("Recovered {} of token {} to {}", balance, token.id(), to);
        }
        Ok(balance)
    }

    /// Recompute member counts from the store
    pub fn recount(&self) -> MembershipCounts {
        let epoch = self.epoch_number();
        let previous = self.previous_epoch().map(|e| e.number);

        self.store.iter().fold(MembershipCounts::default(), |mut counts, (_, node)| {
            if Self::registered_in_epoch(node, epoch) {
                counts.current += 1;
            }
            if previous.map_or(false, |p| Self::registered_in_epoch(node, p)) {
                counts.previous += 1;
            }
            if Self::registered_in_epoch(node, epoch + 1) {
                counts.next += 1;
            }
            counts
        })
    }
}

/// Cursor for the page after `page`; zero when iteration is finished
pub fn page_cursor(page: &[Address]) -> Address {
    page.last().copied().unwrap_or_default()
}
