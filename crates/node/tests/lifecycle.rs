use darknode_core::{Amount, ErrorKind};
use darknode_crypto::{Address, PublicKey};
use node::{DarknodeEngine, EngineConfig, EngineError};
use payment::PaymentError;
use registry::{DarknodeRegistry, DarknodeStatus, RegistryConfig, RegistryError};

const BOND: u64 = 1000;
const INTERVAL: u64 = 60;

struct Harness {
    engine: DarknodeEngine,
    owner: Address,
    now: u64,
}

impl Harness {
    fn new() -> Self {
        let owner = Address::from_label("owner");
        let engine = DarknodeEngine::new(EngineConfig {
            owner,
            bond_token: "REN".into(),
            registry: RegistryConfig {
                minimum_bond: Amount::from_u64(BOND),
                minimum_pod_size: 1,
                minimum_epoch_interval: INTERVAL,
                slasher: Address::zero(),
                darknode_payment: Address::zero(),
            },
            payout_percent: 50,
            genesis_time: 0,
        })
        .unwrap();

        Self { engine, owner, now: 10 }
    }

    fn operator(i: u8) -> Address {
        Address::from_label(&format!("operator-{}", i))
    }

    fn darknode(i: u8) -> Address {
        Address::new([i + 1; 20])
    }

    fn ren(&self) -> Address {
        self.engine.bond_token()
    }

    /// Fund operator `i` and register its darknode
    fn register(&mut self, i: u8) {
        let ren = self.ren();
        let registry = self.engine.registry().address();
        let operator = Self::operator(i);
        let bond = Amount::from_u64(BOND);

        self.engine.mint(&self.owner, &ren, &operator, &bond).unwrap();
        self.engine.approve(&operator, &ren, &registry, bond).unwrap();
        self.engine
            .register(&operator, Self::darknode(i), PublicKey::new(vec![i, 0xAA]))
            .unwrap();
    }

    fn advance(&mut self) {
        self.engine.epoch(&self.owner, self.now).unwrap();
        self.now += INTERVAL;
    }
}

#[test]
fn test_full_cycle_returns_every_bond() {
    let mut h = Harness::new();
    let ren = h.ren();

    for i in 0..10 {
        h.register(i);
    }
    assert_eq!(h.engine.registry().num_darknodes(), 0);
    assert_eq!(h.engine.registry().num_darknodes_next_epoch(), 10);

    h.advance();
    assert_eq!(h.engine.registry().num_darknodes(), 10);
    assert_eq!(h.engine.registry().get_darknodes(&Address::zero(), 0).unwrap().len(), 10);

    for i in 0..10 {
        h.engine.deregister(&Harness::operator(i), &Harness::darknode(i)).unwrap();
    }
    h.advance();
    assert_eq!(h.engine.registry().num_darknodes(), 0);
    assert_eq!(h.engine.darknode_status(&Harness::darknode(0)), DarknodeStatus::Deregistered);

    h.advance();
    for i in 0..10 {
        let refunded = h.engine.refund(&Harness::operator(i), &Harness::darknode(i)).unwrap();
        assert_eq!(refunded, Amount::from_u64(BOND));
        assert_eq!(h.engine.balance_of(&ren, &Harness::operator(i)), Amount::from_u64(BOND));
        assert_eq!(h.engine.darknode_status(&Harness::darknode(i)), DarknodeStatus::Refunded);
    }

    assert_eq!(h.engine.registry().num_darknodes(), 0);
    assert!(h.engine.registry().store().total_bonded().is_zero());
    assert!(h.engine.balance_of(&ren, &h.engine.registry().store().address()).is_zero());
}

#[test]
fn test_early_epoch_changes_nothing() {
    let mut h = Harness::new();
    h.register(0);
    h.advance();

    let before = h.engine.status();
    let err = h.engine.epoch(&h.owner, 10 + INTERVAL - 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timing);

    let after = h.engine.status();
    assert_eq!(after.epoch, before.epoch);
    assert_eq!(after.epoch_timestamp, before.epoch_timestamp);
    assert_eq!(after.num_darknodes, before.num_darknodes);
    assert_eq!(after.payment_cycle, before.payment_cycle);
}

#[test]
fn test_refund_of_active_darknode_rejected() {
    let mut h = Harness::new();
    h.register(0);

    let err = h.engine.refund(&Harness::operator(0), &Harness::darknode(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    h.advance();
    let err = h.engine.refund(&Harness::operator(0), &Harness::darknode(0)).unwrap_err();
    assert!(matches!(err, EngineError::Registry(RegistryError::NotYetRefundable(_))));
}

#[test]
fn test_slash_then_refund_returns_remaining_bond() {
    let mut h = Harness::new();
    let ren = h.ren();
    let challenger = Address::from_label("challenger");
    h.register(0);
    h.advance();

    let record = h.engine.slash(&h.owner, &Harness::darknode(0), &challenger, 20).unwrap();
    assert_eq!(record.amount, Amount::from_u64(200));
    assert_eq!(h.engine.balance_of(&ren, &challenger), Amount::from_u64(200));
    assert_eq!(h.engine.registry().get_darknode_bond(&Harness::darknode(0)), Amount::from_u64(800));

    h.engine.deregister(&Harness::operator(0), &Harness::darknode(0)).unwrap();
    h.advance();
    h.advance();

    let refunded = h.engine.refund(&Harness::operator(0), &Harness::darknode(0)).unwrap();
    assert_eq!(refunded, Amount::from_u64(800));
    assert_eq!(h.engine.balance_of(&ren, &Harness::operator(0)), Amount::from_u64(800));
}

#[test]
fn test_slash_requires_slasher_owner() {
    let mut h = Harness::new();
    h.register(0);

    let mallory = Address::from_label("mallory");
    let err = h.engine.slash(&mallory, &Harness::darknode(0), &mallory, 50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(h.engine.registry().get_darknode_bond(&Harness::darknode(0)), Amount::from_u64(BOND));
}

#[test]
fn test_payment_split_across_previous_epoch() {
    let mut h = Harness::new();
    let dai = h.engine.add_reward_token(&h.owner, "DAI").unwrap();
    for i in 0..4 {
        h.register(i);
    }
    h.advance();

    let sponsor = Address::from_label("sponsor");
    let payment = h.engine.payment().address();
    let deposit = Amount::from_u64(1000);
    h.engine.mint(&h.owner, &dai, &sponsor, &deposit).unwrap();
    h.engine.approve(&sponsor, &dai, &payment, deposit.clone()).unwrap();
    h.engine.deposit(&sponsor, &dai, &deposit).unwrap();

    h.advance();
    assert_eq!(h.engine.payment().share(&dai), Amount::from_u64(125));
    assert_eq!(h.engine.payment().pending_pool(&dai), Amount::from_u64(500));

    for i in 0..4 {
        let claimed = h.engine.claim(&Harness::darknode(i), &dai).unwrap();
        assert_eq!(claimed, Amount::from_u64(125));
    }

    let err = h.engine.claim(&Harness::darknode(0), &dai).unwrap_err();
    assert!(matches!(err, EngineError::Payment(PaymentError::AlreadyClaimed { .. })));

    let withdrawn = h.engine.withdraw(&Harness::darknode(0), &dai).unwrap();
    assert_eq!(withdrawn, Amount::from_u64(125));
    assert_eq!(h.engine.balance_of(&dai, &Harness::operator(0)), Amount::from_u64(125));
    assert!(h.engine.payment().balance(&Harness::darknode(0), &dai).is_zero());
}

#[test]
fn test_newcomer_cannot_claim_current_cycle() {
    let mut h = Harness::new();
    let dai = h.engine.add_reward_token(&h.owner, "DAI").unwrap();
    h.register(0);
    h.advance();
    h.register(1);
    h.advance();

    let err = h.engine.claim(&Harness::darknode(1), &dai).unwrap_err();
    assert!(matches!(err, EngineError::Payment(PaymentError::NotRegisteredInCycle(_))));
    assert!(h.engine.claim(&Harness::darknode(0), &dai).is_ok());
}

#[test]
fn test_store_moves_to_successor_registry() {
    let mut h = Harness::new();
    for i in 0..3 {
        h.register(i);
    }
    h.advance();

    let successor = Address::from_label("darknode-registry-v2");
    h.engine
        .registry_mut()
        .transfer_store_ownership(&h.owner, successor)
        .unwrap();

    let (state, store) = h.engine.registry().clone().into_parts();
    let epoch = state.scheduler.current().clone();
    let upgraded = DarknodeRegistry::adopt_store(state, store, successor, h.owner).unwrap();

    assert_eq!(upgraded.address(), successor);
    assert_eq!(upgraded.store().owner(), successor);
    assert_eq!(upgraded.current_epoch(), &epoch);
    assert_eq!(upgraded.num_darknodes(), 3);
    assert_eq!(upgraded.minimum_bond(), &Amount::from_u64(BOND));
    assert!(upgraded.is_registered(&Harness::darknode(2)));
}
