// darknode-core/src/lib.rs

//! Shared building blocks for the darknode registry engine
//!
//! This crate provides:
//! - Token amounts and epoch/timestamp types
//! - Two-step (nominate then claim) ownership
//! - Parameters that only take effect at the next epoch
//! - The token interface consumed by the registry and payment ledger

pub mod ownable;
pub mod params;
pub mod token;
pub mod types;

pub use ownable::{Claimable, OwnershipError};
pub use params::Pending;
pub use token::{Token, TokenError, TokenLedger, TokenResult};
pub use types::*;

use std::fmt;

/// Broad category of a failed operation.
///
/// Every domain error in the workspace maps onto one of these so callers can
/// tell an authorization failure from a bad lifecycle state, a bad argument,
/// a failed token movement, or a premature epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    State,
    Parameter,
    ExternalTransfer,
    Timing,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Parameter => "parameter",
            ErrorKind::ExternalTransfer => "external transfer",
            ErrorKind::Timing => "timing",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}
