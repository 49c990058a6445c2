// darknode-core/src/types.rs

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Sequential epoch counter
pub type EpochNumber = u64;

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Whole percentage, valid range 0..=100
pub type Percent = u64;

pub const MAX_PERCENT: Percent = 100;

/// Token amount (using BigUint for arbitrary precision)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_tokens(tokens: u64) -> Self {
        // 1 token = 10^18 base units
        Self(BigUint::from(tokens) * BigUint::from(10u64).pow(18))
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Lossy view for logs and tests; `None` past u64::MAX
    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        self.checked_sub(other).unwrap_or_default()
    }

    /// `self * percent / 100`, rounded down
    pub fn percent(&self, percent: Percent) -> Amount {
        Amount((&self.0 * percent) / MAX_PERCENT)
    }

    pub fn mul_u64(&self, factor: u64) -> Amount {
        Amount(&self.0 * factor)
    }

    /// Floor division; `None` when dividing by zero
    pub fn checked_div_u64(&self, divisor: u64) -> Option<Amount> {
        if divisor == 0 {
            None
        } else {
            Some(Amount(&self.0 / divisor))
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
