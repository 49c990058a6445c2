// node/src/engine.rs

use crate::{EngineError, EngineResult};
use darknode_core::{Amount, Percent, Timestamp, Token, TokenLedger};
use darknode_crypto::{Address, PublicKey};
use payment::DarknodePayment;
use registry::{
    DarknodeRegistry, DarknodeStatus, Epoch, PendingParameters, RegistryConfig, SlashRecord, Slasher,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::EngineSnapshot;

const REGISTRY_LABEL: &str = "darknode-registry";
const STORE_LABEL: &str = "darknode-registry-store";
const PAYMENT_LABEL: &str = "darknode-payment";
const SLASHER_LABEL: &str = "darknode-slasher";

/// Genesis parameters for a new engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub owner: Address,
    /// Symbol of the token bonds are paid in
    pub bond_token: String,
    /// Registry parameters; a zero slasher selects the built-in slasher
    /// address and the payment address is always the engine's ledger
    pub registry: RegistryConfig,
    pub payout_percent: Percent,
    pub genesis_time: Timestamp,
}

/// Summary of the engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub epoch: u64,
    pub epoch_timestamp: Timestamp,
    pub next_epoch_time: Timestamp,
    pub num_darknodes: u64,
    pub num_darknodes_previous_epoch: u64,
    pub num_darknodes_next_epoch: u64,
    pub stored_darknodes: usize,
    pub total_bonded: String,
    pub minimum_bond: String,
    pub payment_cycle: u64,
    pub payout_percent: Percent,
    pub reward_tokens: Vec<String>,
    pub pending_parameters: PendingParameters,
}

/// The registry, slasher and payment ledger driven as one state machine.
///
/// Every operation either applies completely or returns an error with the
/// engine untouched. Token ledgers live inside the engine so that bond and
/// reward transfers commit together with the state they belong to.
#[derive(Debug, Clone)]
pub struct DarknodeEngine {
    registry: DarknodeRegistry,
    slasher: Slasher,
    /// Slasher installed once the registry activates its address
    pending_slasher: Option<Slasher>,
    payment: DarknodePayment,
    tokens: BTreeMap<Address, TokenLedger>,
}

impl DarknodeEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let bond_token = TokenLedger::new(&config.bond_token);
        let payment_address = Address::from_label(PAYMENT_LABEL);

        let mut registry_config = config.registry;
        if registry_config.slasher.is_zero() {
            registry_config.slasher = Address::from_label(SLASHER_LABEL);
        }
        registry_config.darknode_payment = payment_address;

        let slasher = Slasher::new(registry_config.slasher, config.owner);
        let registry = DarknodeRegistry::new(
            Address::from_label(REGISTRY_LABEL),
            config.owner,
            Address::from_label(STORE_LABEL),
            bond_token.id(),
            registry_config,
            config.genesis_time,
        )?;
        let payment = DarknodePayment::new(payment_address, config.owner, &registry, config.payout_percent)?;

        tracing::info!(
            "Darknode engine created: bond token {} ({}), owner {}",
            bond_token.symbol(),
            bond_token.id(),
            config.owner
        );

        let mut tokens = BTreeMap::new();
        tokens.insert(bond_token.id(), bond_token);

        Ok(Self {
            registry,
            slasher,
            pending_slasher: None,
            payment,
            tokens,
        })
    }

    pub fn from_snapshot(snapshot: EngineSnapshot) -> EngineResult<Self> {
        let registry = DarknodeRegistry::from_parts(snapshot.registry, snapshot.store)?;
        let tokens: BTreeMap<Address, TokenLedger> = snapshot.tokens
            .into_iter()
            .map(|ledger| (ledger.id(), ledger))
            .collect();

        let bond_token = registry.store().token();
        if !tokens.contains_key(&bond_token) {
            return Err(EngineError::UnknownToken(bond_token));
        }

        Ok(Self {
            registry,
            slasher: snapshot.slasher,
            pending_slasher: snapshot.pending_slasher,
            payment: snapshot.payment,
            tokens,
        })
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let (registry, store) = self.registry.clone().into_parts();
        EngineSnapshot {
            registry,
            store,
            slasher: self.slasher.clone(),
            pending_slasher: self.pending_slasher.clone(),
            payment: self.payment.clone(),
            tokens: self.tokens.values().cloned().collect(),
        }
    }

    // ==================== ACCESSORS ====================

    pub fn owner(&self) -> Address {
        self.registry.owner()
    }

    pub fn registry(&self) -> &DarknodeRegistry {
        &self.registry
    }

    /// Owner administration of the registry (parameters, ownership)
    pub fn registry_mut(&mut self) -> &mut DarknodeRegistry {
        &mut self.registry
    }

    pub fn payment(&self) -> &DarknodePayment {
        &self.payment
    }

    pub fn payment_mut(&mut self) -> &mut DarknodePayment {
        &mut self.payment
    }

    pub fn slasher(&self) -> &Slasher {
        &self.slasher
    }

    pub fn pending_slasher(&self) -> Option<&Slasher> {
        self.pending_slasher.as_ref()
    }

    pub fn bond_token(&self) -> Address {
        self.registry.store().token()
    }

    pub fn token(&self, id: &Address) -> Option<&TokenLedger> {
        self.tokens.get(id)
    }

    pub fn token_mut(&mut self, id: &Address) -> Option<&mut TokenLedger> {
        self.tokens.get_mut(id)
    }

    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenLedger> {
        self.tokens.values().find(|t| t.symbol() == symbol)
    }

    pub fn balance_of(&self, token: &Address, owner: &Address) -> Amount {
        self.tokens.get(token)
            .map(|t| t.balance_of(owner))
            .unwrap_or_default()
    }

    fn ledger_mut(tokens: &mut BTreeMap<Address, TokenLedger>, id: &Address) -> EngineResult<&mut TokenLedger> {
        tokens.get_mut(id).ok_or(EngineError::UnknownToken(*id))
    }

    fn ensure_owner(&self, caller: &Address) -> EngineResult<()> {
        if self.registry.owner() != *caller {
            return Err(EngineError::NotOwner(*caller));
        }
        Ok(())
    }

    // ==================== TOKENS ====================

    /// Create a reward token and register it with the payment ledger.
    ///
    /// An existing ledger with the same symbol (such as the bond token) is
    /// registered as is.
    pub fn add_reward_token(&mut self, caller: &Address, symbol: &str) -> EngineResult<Address> {
        self.ensure_owner(caller)?;
        let ledger = TokenLedger::new(symbol);
        let id = ledger.id();

        self.payment.register_token(caller, id)?;
        self.tokens.entry(id).or_insert(ledger);

        tracing::info!("Reward token {} ({}) added", symbol, id);
        Ok(id)
    }

    pub fn mint(&mut self, caller: &Address, token: &Address, to: &Address, amount: &Amount) -> EngineResult<()> {
        self.ensure_owner(caller)?;
        Self::ledger_mut(&mut self.tokens, token)?.mint(to, amount);
        Ok(())
    }

    pub fn approve(&mut self, owner: &Address, token: &Address, spender: &Address, amount: Amount) -> EngineResult<()> {
        let ledger = Self::ledger_mut(&mut self.tokens, token)?;
        Ok(ledger.approve(owner, spender, amount)?)
    }

    // ==================== REGISTRY ====================

    pub fn register(&mut self, caller: &Address, id: Address, public_key: PublicKey) -> EngineResult<()> {
        let bond_token = self.bond_token();
        let token = Self::ledger_mut(&mut self.tokens, &bond_token)?;
        Ok(self.registry.register(caller, token, id, public_key)?)
    }

    pub fn deregister(&mut self, caller: &Address, id: &Address) -> EngineResult<()> {
        Ok(self.registry.deregister(caller, id)?)
    }

    pub fn refund(&mut self, caller: &Address, id: &Address) -> EngineResult<Amount> {
        let bond_token = self.bond_token();
        let token = Self::ledger_mut(&mut self.tokens, &bond_token)?;
        Ok(self.registry.refund(caller, token, id)?)
    }

    /// Slash through the slasher component; `caller` must own the slasher
    pub fn slash(
        &mut self,
        caller: &Address,
        guilty: &Address,
        beneficiary: &Address,
        percent: Percent,
    ) -> EngineResult<SlashRecord> {
        let active = self.registry.slasher();
        if self.slasher.address() != active {
            return Err(EngineError::SlasherInactive {
                component: self.slasher.address(),
                active,
            });
        }

        let bond_token = self.bond_token();
        let token = Self::ledger_mut(&mut self.tokens, &bond_token)?;
        Ok(self.slasher.slash(caller, &mut self.registry, token, guilty, beneficiary, percent)?)
    }

    /// Stage a new slasher component owned by `slasher_owner`.
    ///
    /// The registry parameter and the component switch together at the next
    /// epoch; until then the current slasher stays in charge.
    pub fn update_slasher(&mut self, caller: &Address, slasher: Address, slasher_owner: Address) -> EngineResult<()> {
        self.ensure_owner(caller)?;
        self.registry.update_slasher(caller, slasher)?;

        self.pending_slasher = if slasher == self.slasher.address() {
            None
        } else {
            Some(Slasher::new(slasher, slasher_owner))
        };
        tracing::info!("Slasher {} owned by {} staged for the next epoch", slasher, slasher_owner);
        Ok(())
    }

    pub fn darknode_status(&self, id: &Address) -> DarknodeStatus {
        self.registry.darknode_status(id)
    }

    /// Advance the epoch and roll the payment cycle as one step.
    ///
    /// The cycle only rolls when the ledger is the registry's active payment
    /// contract and follows this registry; otherwise the epoch still
    /// advances and the lag is logged.
    pub fn epoch(&mut self, caller: &Address, now: Timestamp) -> EngineResult<Epoch> {
        let mut registry = self.registry.clone();
        let epoch = registry.epoch(caller, now)?;

        let mut payment = self.payment.clone();
        let active = registry.darknode_payment() == Some(payment.address())
            && payment.registry() == registry.address();
        if active {
            payment.change_cycle(&registry)?;
        } else {
            tracing::warn!(
                "Payment ledger {} is not active for registry {}, cycle stays at {}",
                payment.address(),
                registry.address(),
                payment.cycle()
            );
        }

        let promoted = self.pending_slasher
            .as_ref()
            .map_or(false, |pending| pending.address() == registry.slasher());

        self.registry = registry;
        self.payment = payment;
        if promoted {
            if let Some(slasher) = self.pending_slasher.take() {
                tracing::info!("Slasher {} replaced by {}", self.slasher.address(), slasher.address());
                self.slasher = slasher;
            }
        }
        Ok(epoch)
    }

    // ==================== PAYMENT ====================

    pub fn deposit(&mut self, from: &Address, token: &Address, amount: &Amount) -> EngineResult<()> {
        let ledger = Self::ledger_mut(&mut self.tokens, token)?;
        Ok(self.payment.deposit(from, ledger, amount)?)
    }

    pub fn claim(&mut self, darknode: &Address, token: &Address) -> EngineResult<Amount> {
        Ok(self.payment.claim(&self.registry, darknode, token)?)
    }

    pub fn claim_all(&mut self, darknode: &Address) -> EngineResult<Vec<(Address, Amount)>> {
        Ok(self.payment.claim_all(&self.registry, darknode)?)
    }

    pub fn withdraw(&mut self, darknode: &Address, token: &Address) -> EngineResult<Amount> {
        let ledger = Self::ledger_mut(&mut self.tokens, token)?;
        Ok(self.payment.withdraw(&self.registry, ledger, darknode)?)
    }

    // ==================== STATUS ====================

    pub fn status(&self) -> EngineStatus {
        let epoch = self.registry.current_epoch();
        let next_epoch_time = if self.registry.previous_epoch().is_some() {
            epoch.timestamp.saturating_add(self.registry.minimum_epoch_interval())
        } else {
            epoch.timestamp
        };

        EngineStatus {
            epoch: epoch.number,
            epoch_timestamp: epoch.timestamp,
            next_epoch_time,
            num_darknodes: self.registry.num_darknodes(),
            num_darknodes_previous_epoch: self.registry.num_darknodes_previous_epoch(),
            num_darknodes_next_epoch: self.registry.num_darknodes_next_epoch(),
            stored_darknodes: self.registry.store().len(),
            total_bonded: self.registry.store().total_bonded().to_string(),
            minimum_bond: self.registry.minimum_bond().to_string(),
            payment_cycle: self.payment.cycle(),
            payout_percent: self.payment.payout_percent(),
            reward_tokens: self.payment.registered_tokens()
                .map(|id| {
                    self.tokens.get(id)
                        .map(|t| t.symbol().to_string())
                        .unwrap_or_else(|| id.to_hex())
                })
                .collect(),
            pending_parameters: self.registry.pending_parameters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darknode_core::ErrorKind;

    fn engine() -> (DarknodeEngine, Address) {
        let owner = Address::from_label("owner");
        let config = EngineConfig {
            owner,
            bond_token: "REN".into(),
            registry: RegistryConfig {
                minimum_bond: Amount::from_u64(1000),
                minimum_pod_size: 1,
                minimum_epoch_interval: 60,
                slasher: Address::zero(),
                darknode_payment: Address::zero(),
            },
            payout_percent: 50,
            genesis_time: 0,
        };
        (DarknodeEngine::new(config).unwrap(), owner)
    }

    #[test]
    fn test_new_wires_components() {
        let (engine, owner) = engine();
        assert_eq!(engine.owner(), owner);
        assert_eq!(engine.registry().slasher(), engine.slasher().address());
        assert_eq!(engine.registry().darknode_payment(), Some(engine.payment().address()));
        assert_eq!(engine.token_by_symbol("REN").map(|t| t.id()), Some(engine.bond_token()));
    }

    #[test]
    fn test_mint_owner_only() {
        let (mut engine, owner) = engine();
        let ren = engine.bond_token();
        let mallory = Address::from_label("mallory");
        let err = engine.mint(&mallory, &ren, &mallory, &Amount::from_u64(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        engine.mint(&owner, &ren, &mallory, &Amount::from_u64(5)).unwrap();
        assert_eq!(engine.balance_of(&ren, &mallory), Amount::from_u64(5));
    }

    #[test]
    fn test_epoch_rolls_payment_cycle() {
        let (mut engine, owner) = engine();
        engine.epoch(&owner, 10).unwrap();
        assert_eq!(engine.payment().cycle(), 1);
        engine.epoch(&owner, 70).unwrap();
        assert_eq!(engine.payment().cycle(), 2);
    }

    #[test]
    fn test_disconnected_payment_keeps_cycle() {
        let (mut engine, owner) = engine();
        engine.epoch(&owner, 10).unwrap();
        engine.registry_mut().update_darknode_payment(&owner, Address::zero()).unwrap();
        engine.epoch(&owner, 70).unwrap();

        assert_eq!(engine.registry().current_epoch().number, 2);
        assert_eq!(engine.payment().cycle(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (mut engine, owner) = engine();
        let dai = engine.add_reward_token(&owner, "DAI").unwrap();
        engine.epoch(&owner, 10).unwrap();

        let restored = DarknodeEngine::from_snapshot(engine.snapshot()).unwrap();
        assert_eq!(restored.registry().current_epoch(), engine.registry().current_epoch());
        assert!(restored.payment().is_registered_token(&dai));
        assert!(restored.token(&dai).is_some());
    }

    #[test]
    fn test_status_reports_pending_parameters() {
        let (mut engine, owner) = engine();
        engine.registry_mut().update_minimum_pod_size(&owner, 7).unwrap();
        let status = engine.status();
        assert_eq!(status.epoch, 0);
        assert_eq!(status.minimum_bond, "1000");
        assert_eq!(status.pending_parameters.minimum_pod_size, Some(7));
    }

    fn register_node(engine: &mut DarknodeEngine, owner: &Address, id: Address) -> Address {
        let ren = engine.bond_token();
        let registry = engine.registry().address();
        let operator = Address::from_label("operator");
        engine.mint(owner, &ren, &operator, &Amount::from_u64(1000)).unwrap();
        engine.approve(&operator, &ren, &registry, Amount::from_u64(1000)).unwrap();
        engine.register(&operator, id, PublicKey::new(vec![1])).unwrap();
        operator
    }

    #[test]
    fn test_slasher_swapped_at_epoch() {
        let (mut engine, owner) = engine();
        let guilty = Address::new([7; 20]);
        let beneficiary = Address::from_label("challenger");
        let arbiter = Address::from_label("arbiter");
        let replacement = Address::from_label("darknode-slasher-v2");
        register_node(&mut engine, &owner, guilty);
        engine.epoch(&owner, 10).unwrap();

        engine.update_slasher(&owner, replacement, arbiter).unwrap();
        assert_eq!(engine.pending_slasher().map(|s| s.address()), Some(replacement));

        // The old component still slashes until the epoch
        engine.slash(&owner, &guilty, &beneficiary, 10).unwrap();

        engine.epoch(&owner, 70).unwrap();
        assert_eq!(engine.slasher().address(), replacement);
        assert_eq!(engine.registry().slasher(), replacement);
        assert!(engine.pending_slasher().is_none());

        let err = engine.slash(&owner, &guilty, &beneficiary, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let record = engine.slash(&arbiter, &guilty, &beneficiary, 10).unwrap();
        assert_eq!(record.amount, Amount::from_u64(90));
        assert_eq!(engine.balance_of(&engine.bond_token(), &beneficiary), Amount::from_u64(190));

        let restored = DarknodeEngine::from_snapshot(engine.snapshot()).unwrap();
        assert_eq!(restored.slasher().address(), replacement);
    }

    #[test]
    fn test_slash_with_stale_slasher_reports_mismatch() {
        let (mut engine, owner) = engine();
        let guilty = Address::new([7; 20]);
        register_node(&mut engine, &owner, guilty);
        engine.epoch(&owner, 10).unwrap();

        let external = Address::from_label("external-slasher");
        engine.registry_mut().update_slasher(&owner, external).unwrap();
        engine.epoch(&owner, 70).unwrap();

        let err = engine.slash(&owner, &guilty, &owner, 10).unwrap_err();
        assert!(matches!(err, EngineError::SlasherInactive { active, .. } if active == external));
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(engine.registry().get_darknode_bond(&guilty), Amount::from_u64(1000));
    }

    #[test]
    fn test_update_slasher_owner_only() {
        let (mut engine, _owner) = engine();
        let mallory = Address::from_label("mallory");
        let err = engine.update_slasher(&mallory, mallory, mallory).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(engine.pending_slasher().is_none());
    }
}
