//! At-most-once counting per visitor identity.
//!
//! An identity is only marked [`VisitorState::Resolved`] after its observation
//! has been recorded. A lookup that returns incomplete data leaves the identity
//! in [`VisitorState::PendingRetry`], so the next request from the same client
//! triggers a fresh lookup. A client whose lookup never completes will be
//! looked up on every request; `attempts` tracks how often that happened.
//!
//! The deduplicator is not synchronized by itself. [`crate::VisitTracker`]
//! holds it under the same lock as the statistics store, which makes
//! [`VisitorDeduplicator::try_claim`] an atomic check-and-mark.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::VisitorIdentity;

/// Lifecycle of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitorState {
    /// A lookup is running for this identity; `attempts` counts earlier
    /// lookups that returned incomplete data.
    InFlight { attempts: u32 },
    /// Earlier lookups returned incomplete data; eligible for another lookup.
    PendingRetry { attempts: u32 },
    /// The identity has contributed its observation.
    Resolved,
}

/// Result of [`VisitorDeduplicator::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the lookup for this identity.
    Acquired,
    /// Already counted; nothing to do.
    AlreadyResolved,
    /// Another request is resolving this identity right now.
    InFlight,
}

/// Tracks which identities have been counted.
#[derive(Debug, Clone, Default)]
pub struct VisitorDeduplicator {
    states: HashMap<VisitorIdentity, VisitorState>,
}

impl VisitorDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted resolved identities.
    pub fn from_resolved<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = VisitorIdentity>,
    {
        Self {
            states: identities
                .into_iter()
                .map(|id| (id, VisitorState::Resolved))
                .collect(),
        }
    }

    /// `true` unless the identity has already been marked resolved.
    /// Does not mark anything.
    pub fn should_resolve(&self, identity: &VisitorIdentity) -> bool {
        !matches!(self.states.get(identity), Some(VisitorState::Resolved))
    }

    /// Record that the identity has contributed. Idempotent.
    pub fn mark_resolved(&mut self, identity: &VisitorIdentity) {
        self.states.insert(identity.clone(), VisitorState::Resolved);
    }

    /// Check and mark in one step: move the identity to `InFlight` if it is
    /// neither resolved nor already being resolved.
    pub fn try_claim(&mut self, identity: &VisitorIdentity) -> Claim {
        let attempts = match self.states.get(identity) {
            Some(VisitorState::Resolved) => return Claim::AlreadyResolved,
            Some(VisitorState::InFlight { .. }) => return Claim::InFlight,
            Some(VisitorState::PendingRetry { attempts }) => *attempts,
            None => 0,
        };
        self.states
            .insert(identity.clone(), VisitorState::InFlight { attempts });
        Claim::Acquired
    }

    /// Record an incomplete lookup and return the number of such attempts.
    /// A resolved identity stays resolved.
    pub fn mark_pending(&mut self, identity: &VisitorIdentity) -> u32 {
        let attempts = match self.states.get(identity) {
            Some(VisitorState::Resolved) => return 0,
            Some(VisitorState::InFlight { attempts })
            | Some(VisitorState::PendingRetry { attempts }) => attempts + 1,
            None => 1,
        };
        self.states
            .insert(identity.clone(), VisitorState::PendingRetry { attempts });
        attempts
    }

    /// Drop an in-flight claim without learning anything, restoring the
    /// state the identity had before [`try_claim`](Self::try_claim).
    pub fn release(&mut self, identity: &VisitorIdentity) {
        match self.states.get(identity) {
            Some(VisitorState::InFlight { attempts: 0 }) => {
                self.states.remove(identity);
            }
            Some(VisitorState::InFlight { attempts }) => {
                let attempts = *attempts;
                self.states
                    .insert(identity.clone(), VisitorState::PendingRetry { attempts });
            }
            _ => {}
        }
    }

    pub fn state(&self, identity: &VisitorIdentity) -> Option<VisitorState> {
        self.states.get(identity).copied()
    }

    /// Resolved identities, sorted for stable persistence output.
    pub fn resolved_identities(&self) -> Vec<VisitorIdentity> {
        let mut ids: Vec<VisitorIdentity> = self
            .states
            .iter()
            .filter(|(_, s)| **s == VisitorState::Resolved)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn resolved_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == VisitorState::Resolved)
            .count()
    }
}
