// darknode-core/src/params.rs

use serde::{Deserialize, Serialize};

/// A tunable value whose updates are staged until the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pending<T> {
    current: T,
    next: Option<T>,
}

impl<T: Clone + PartialEq> Pending<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: value,
            next: None,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    /// Value staged for the next epoch, if any
    pub fn next(&self) -> Option<&T> {
        self.next.as_ref()
    }

    /// Value that will be current after the next epoch
    pub fn effective_next(&self) -> &T {
        self.next.as_ref().unwrap_or(&self.current)
    }

    pub fn stage(&mut self, value: T) {
        self.next = Some(value);
    }

    /// Promote the staged value. Returns true if the current value changed.
    pub fn activate(&mut self) -> bool {
        match self.next.take() {
            Some(value) if value != self.current => {
                self.current = value;
                true
            }
            _ => false,
        }
    }
}
