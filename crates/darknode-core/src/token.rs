// darknode-core/src/token.rs

use crate::{types::Amount, ErrorKind};
use darknode_crypto::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result type for token movements
pub type TokenResult<T> = Result<T, TokenError>;

/// Reasons a token call can fail. Each call either fully succeeds or
/// leaves balances and allowances untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token {0} is paused")]
    Paused(Address),

    #[error("insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: Address,
        required: Amount,
        available: Amount,
    },

    #[error("insufficient allowance from {owner} to {spender}: required {required}, available {available}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        required: Amount,
        available: Amount,
    },
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ExternalTransfer
    }
}

/// Fungible token capability consumed by the registry and payment ledger.
///
/// Callers identify themselves explicitly: `transfer` moves funds held by
/// `from`, `transfer_from` moves funds `from` has approved `spender` to use.
pub trait Token {
    /// Address identifying this token
    fn id(&self) -> Address;

    fn balance_of(&self, owner: &Address) -> Amount;

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) -> TokenResult<()>;

    fn transfer(&mut self, from: &Address, to: &Address, amount: &Amount) -> TokenResult<()>;

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> TokenResult<()>;
}

/// In-memory token ledger with pausing, used by the engine and in tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    id: Address,
    symbol: String,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
    paused: bool,
}

impl TokenLedger {
    pub fn new(symbol: &str) -> Self {
        Self {
            id: Address::from_label(symbol),
            symbol: symbol.to_string(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: Amount::zero(),
            paused: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> &Amount {
        &self.total_supply
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
        tracing::warn!("Token {} paused", self.symbol);
    }

    pub fn unpause(&mut self) {
        self.paused = false;
        tracing::info!("Token {} unpaused", self.symbol);
    }

    /// Credit new supply to `to`
    pub fn mint(&mut self, to: &Address, amount: &Amount) {
        let balance = self.balance_of(to);
        self.balances.insert(*to, balance + amount.clone());
        self.total_supply = self.total_supply.clone() + amount.clone();
    }

    fn ensure_active(&self) -> TokenResult<()> {
        if self.paused {
            return Err(TokenError::Paused(self.id));
        }
        Ok(())
    }

    /// Move funds after all checks have passed
    fn move_balance(&mut self, from: &Address, to: &Address, amount: &Amount) -> TokenResult<()> {
        let available = self.balance_of(from);
        let remaining = available.checked_sub(amount)
            .ok_or_else(|| TokenError::InsufficientBalance {
                account: *from,
                required: amount.clone(),
                available: available.clone(),
            })?;

        self.balances.insert(*from, remaining);
        let credited = self.balance_of(to) + amount.clone();
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl Token for TokenLedger {
    fn id(&self) -> Address {
        self.id
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.get(owner).cloned().unwrap_or_default()
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).cloned().unwrap_or_default()
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) -> TokenResult<()> {
        self.ensure_active()?;
        self.allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: &Amount) -> TokenResult<()> {
        self.ensure_active()?;
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> TokenResult<()> {
        self.ensure_active()?;

        let allowance = self.allowance(from, spender);
        let remaining_allowance = allowance.checked_sub(amount)
            .ok_or_else(|| TokenError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                required: amount.clone(),
                available: allowance.clone(),
            })?;

        self.move_balance(from, to, amount)?;
        self.allowances.insert((*from, *spender), remaining_allowance);
        Ok(())
    }
}
