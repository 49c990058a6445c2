// registry/src/epoch.rs

use crate::{RegistryError, RegistryResult};
use darknode_core::{EpochNumber, Timestamp};
use darknode_crypto::{hash::epoch_seed, Hash};
use serde::{Deserialize, Serialize};

/// A registry epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    /// Sequential epoch number
    pub number: EpochNumber,
    /// Time of the advance that started this epoch
    pub timestamp: Timestamp,
    /// Opaque value derived from the advance, exposed to consumers
    pub seed: Hash,
}

/// Monotonic epoch counter gated by a minimum interval.
///
/// The scheduler starts at epoch 0 at genesis. The first advance is not
/// interval-gated (the registry restricts who may make it); every later
/// advance needs `now >= current.timestamp + minimum_interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochScheduler {
    current: Epoch,
    previous: Option<Epoch>,
}

impl EpochScheduler {
    pub fn new(genesis_time: Timestamp) -> Self {
        Self {
            current: Epoch {
                number: 0,
                timestamp: genesis_time,
                seed: epoch_seed(&Hash::zero(), 0, genesis_time),
            },
            previous: None,
        }
    }

    pub fn current(&self) -> &Epoch {
        &self.current
    }

    pub fn previous(&self) -> Option<&Epoch> {
        self.previous.as_ref()
    }

    /// Whether the bootstrapping advance has happened
    pub fn is_bootstrapped(&self) -> bool {
        self.previous.is_some()
    }

    /// Earliest time the next advance is accepted
    pub fn next_epoch_time(&self, minimum_interval: u64) -> Timestamp {
        if self.is_bootstrapped() {
            self.current.timestamp.saturating_add(minimum_interval)
        } else {
            self.current.timestamp
        }
    }

    /// Check an advance at `now` without applying it
    pub fn check_advance(&self, now: Timestamp, minimum_interval: u64) -> RegistryResult<()> {
        if !self.is_bootstrapped() {
            return Ok(());
        }
        let earliest = self.next_epoch_time(minimum_interval);
        if now < earliest {
            return Err(RegistryError::EpochTooSoon { now, earliest });
        }
        Ok(())
    }

    pub fn advance(&mut self, now: Timestamp, minimum_interval: u64) -> RegistryResult<&Epoch> {
        self.check_advance(now, minimum_interval)?;

        // Keep timestamps monotonic even if the first advance reports an
        // earlier clock than genesis.
        let timestamp = now.max(self.current.timestamp);
        let number = self.current.number + 1;
        let next = Epoch {
            number,
            timestamp,
            seed: epoch_seed(&self.current.seed, number, timestamp),
        };

        self.previous = Some(std::mem::replace(&mut self.current, next));
        Ok(&self.current)
    }
}
