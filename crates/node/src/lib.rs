// node/src/lib.rs

//! Darknode Node
//!
//! Runs the darknode registry, slasher and payment ledger as one engine:
//! - `DarknodeEngine` applies every operation atomically across components
//! - `Node` serializes mutations behind a single lock and persists each
//!   committed state
//! - An optional ticker advances epochs as soon as they are due

pub mod config;
pub mod engine;
pub mod runtime;

pub use config::NodeConfig;
pub use engine::{DarknodeEngine, EngineConfig, EngineStatus};
pub use runtime::Node;

use darknode_core::{ErrorKind, TokenError};
use darknode_crypto::Address;
use payment::PaymentError;
use registry::RegistryError;
use storage::StorageError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Caller {0} is not the engine owner")]
    NotOwner(Address),

    #[error("Unknown token {0}")]
    UnknownToken(Address),

    #[error("Slasher {component} is not the registry's active slasher {active}")]
    SlasherInactive { component: Address, active: Address },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Registry(err) => err.kind(),
            EngineError::Payment(err) => err.kind(),
            EngineError::Token(err) => err.kind(),
            EngineError::Storage(err) => err.kind(),
            EngineError::NotOwner(_) => ErrorKind::Authorization,
            EngineError::UnknownToken(_) => ErrorKind::Parameter,
            EngineError::SlasherInactive { .. } => ErrorKind::State,
        }
    }
}
