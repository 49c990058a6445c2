// registry/src/lib.rs

//! Darknode Registry
//!
//! This crate implements the bonded, epoch-gated darknode registry where:
//! - Operators bond tokens to register darknodes for the next epoch
//! - Membership only changes when the epoch advances
//! - Bonds sit in a separately owned store that survives registry upgrades
//! - A single authorized slasher can penalize a darknode's bond

pub mod epoch;
pub mod linked_list;
pub mod registry;
pub mod slasher;
pub mod store;

pub use epoch::{Epoch, EpochScheduler};
pub use linked_list::LinkedList;
pub use registry::{
    page_cursor, DarknodeRegistry, DarknodeStatus, MembershipCounts, PendingParameters,
    RegistryConfig, RegistryParams, RegistryState, MAX_PAGE_SIZE,
};
pub use slasher::{SlashRecord, Slasher};
pub use store::{Darknode, DarknodeRegistryStore};

use darknode_core::{Amount, ErrorKind, OwnershipError, Timestamp, TokenError};
use darknode_crypto::Address;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Ownership error: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("Caller {caller} is not the operator of darknode {darknode}")]
    NotOperator { darknode: Address, caller: Address },

    #[error("Caller {0} is not the slasher")]
    NotSlasher(Address),

    #[error("First epoch can only be called by the owner, not {0}")]
    FirstEpochRestricted(Address),

    #[error("Store is owned by {owner}, not by registry {registry}")]
    StoreNotOwned { registry: Address, owner: Address },

    #[error("Darknode {0} is already pending registration or registered")]
    AlreadyPendingOrRegistered(Address),

    #[error("Darknode {0} is not deregisterable")]
    NotDeregisterable(Address),

    #[error("Darknode {0} is not refundable yet")]
    NotYetRefundable(Address),

    #[error("Invalid darknode: {0}")]
    InvalidDarknode(Address),

    #[error("Pagination cursor {0} is not in the registry")]
    UnknownCursor(Address),

    #[error("Invalid percent: {0}")]
    InvalidPercent(u64),

    #[error("Darknode id cannot be the zero address")]
    NullDarknodeId,

    #[error("Darknode id {0} is reserved")]
    ReservedDarknodeId(Address),

    #[error("Bond not decreased: current {current}, requested {requested}")]
    BondNotDecreased { current: Amount, requested: Amount },

    #[error("Wrong token: expected {expected}, got {actual}")]
    WrongToken { expected: Address, actual: Address },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Token transfer failed: {0}")]
    Transfer(#[from] TokenError),

    #[error("Epoch too soon: now {now}, earliest {earliest}")]
    EpochTooSoon { now: Timestamp, earliest: Timestamp },
}

impl RegistryError {
    /// Category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Ownership(err) => err.kind(),
            RegistryError::NotOperator { .. }
            | RegistryError::NotSlasher(_)
            | RegistryError::FirstEpochRestricted(_)
            | RegistryError::StoreNotOwned { .. } => ErrorKind::Authorization,
            RegistryError::AlreadyPendingOrRegistered(_)
            | RegistryError::NotDeregisterable(_)
            | RegistryError::NotYetRefundable(_)
            | RegistryError::InvalidDarknode(_)
            | RegistryError::UnknownCursor(_) => ErrorKind::State,
            RegistryError::InvalidPercent(_)
            | RegistryError::NullDarknodeId
            | RegistryError::ReservedDarknodeId(_)
            | RegistryError::BondNotDecreased { .. }
            | RegistryError::WrongToken { .. }
            | RegistryError::InvalidParameter(_) => ErrorKind::Parameter,
            RegistryError::Transfer(_) => ErrorKind::ExternalTransfer,
            RegistryError::EpochTooSoon { .. } => ErrorKind::Timing,
        }
    }
}
