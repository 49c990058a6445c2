// payment/src/lib.rs

//! Darknode Payment Ledger
//!
//! Cycle-based reward distribution for registered darknodes:
//! - Rewards are deposited per token into a pending pool
//! - Each cycle rollover releases a payout fraction of the pending pool
//! - Darknodes that were members for the whole cycle claim an equal share
//!
//! A cycle ends when the registry advances its epoch.

pub mod ledger;

pub use ledger::{DarknodePayment, TokenPool};

use darknode_core::{EpochNumber, ErrorKind, OwnershipError, TokenError};
use darknode_crypto::Address;

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;

/// Errors that can occur in the payment ledger
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("Ownership error: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("Registry {0} is not the registry this ledger pays for")]
    WrongRegistry(Address),

    #[error("Token {0} is not registered")]
    TokenNotRegistered(Address),

    #[error("Token {0} is already registered")]
    TokenAlreadyRegistered(Address),

    #[error("Darknode {darknode} already claimed token {token} in cycle {cycle}")]
    AlreadyClaimed {
        darknode: Address,
        token: Address,
        cycle: EpochNumber,
    },

    #[error("Darknode {0} was not registered for the whole cycle")]
    NotRegisteredInCycle(Address),

    #[error("Darknode {0} has no operator")]
    InvalidDarknode(Address),

    #[error("Darknode {darknode} has nothing to withdraw in token {token}")]
    NothingToWithdraw { darknode: Address, token: Address },

    #[error("Ledger cycle {cycle} is behind registry epoch {epoch}")]
    CycleOutOfSync { cycle: EpochNumber, epoch: EpochNumber },

    #[error("Cycle {0} has not ended")]
    CycleNotEnded(EpochNumber),

    #[error("Invalid percent: {0}")]
    InvalidPercent(u64),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Token transfer failed: {0}")]
    Transfer(#[from] TokenError),
}

impl PaymentError {
    /// Category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Ownership(err) => err.kind(),
            PaymentError::WrongRegistry(_) => ErrorKind::Authorization,
            PaymentError::TokenNotRegistered(_)
            | PaymentError::TokenAlreadyRegistered(_)
            | PaymentError::AlreadyClaimed { .. }
            | PaymentError::NotRegisteredInCycle(_)
            | PaymentError::InvalidDarknode(_)
            | PaymentError::NothingToWithdraw { .. }
            | PaymentError::CycleOutOfSync { .. } => ErrorKind::State,
            PaymentError::InvalidPercent(_) | PaymentError::InvalidParameter(_) => ErrorKind::Parameter,
            PaymentError::Transfer(_) => ErrorKind::ExternalTransfer,
            PaymentError::CycleNotEnded(_) => ErrorKind::Timing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        let token = Address::from_label("DAI");
        assert_eq!(PaymentError::CycleNotEnded(3).kind(), ErrorKind::Timing);
        assert_eq!(PaymentError::TokenNotRegistered(token).kind(), ErrorKind::State);
        assert_eq!(PaymentError::InvalidPercent(200).kind(), ErrorKind::Parameter);
        assert_eq!(
            PaymentError::from(TokenError::Paused(token)).kind(),
            ErrorKind::ExternalTransfer
        );
    }
}
