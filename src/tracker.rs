//! Request pipeline: identity → deduplicator → resolver → statistics store.
//!
//! [`VisitTracker`] owns the statistics store and the deduplicator behind one
//! `RwLock`. The lock is only held around short in-memory steps; the resolver
//! call happens outside it, so a slow lookup never blocks other requests or
//! snapshots.
//!
//! ```text
//! lock   try_claim(identity)          -> Acquired | AlreadyResolved | InFlight
//! unlock resolver.resolve(identity)   (network I/O)
//! lock   record + mark_resolved               (success)
//!        mark_pending                         (incomplete data)
//!        release                              (network error, invalid data)
//! ```
//!
//! The claim is held by a [`ClaimGuard`]. If the caller drops the
//! `record_visit` future while the lookup is pending (request cancelled,
//! outer timeout), the guard releases the identity so it is not stuck
//! `InFlight`.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};

use crate::persistence::{AtlasState, StateStore};
use crate::snapshot::{project, Snapshot, SnapshotConfig};
use crate::{
    AtlasError, Claim, CountryAggregate, GeoObservation, GeoResolver, ResolutionFailure,
    StatisticsStore, VisitorDeduplicator, VisitorIdentity, VisitorState,
};

/// Configuration for the request pipeline.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Incomplete lookups for one identity after which each further attempt
    /// is logged as a warning. Default: 3
    pub retry_warn_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retry_warn_threshold: 3,
        }
    }
}

/// What a single visit did to the statistics.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitOutcome {
    /// First successful lookup for this identity; the observation was counted.
    Counted {
        observation: GeoObservation,
        aggregate: CountryAggregate,
    },
    /// The identity was counted earlier.
    AlreadyCounted,
    /// Another request is resolving this identity right now.
    InFlight,
    /// The lookup lacked a country or coordinates; the identity will be
    /// looked up again on its next visit.
    Incomplete { attempts: u32 },
}

/// Releases an `InFlight` claim on drop unless disarmed.
struct ClaimGuard<'a> {
    tracker: &'a VisitTracker,
    identity: &'a VisitorIdentity,
    armed: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(tracker: &'a VisitTracker, identity: &'a VisitorIdentity) -> Self {
        Self {
            tracker,
            identity,
            armed: true,
        }
    }

    /// The claim has been settled under the lock; nothing left to undo.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("[VisitTracker] Releasing claim on {}", self.identity);
            self.tracker.write().dedup.release(self.identity);
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    store: StatisticsStore,
    dedup: VisitorDeduplicator,
}

/// Shared owner of all visitor statistics. Wrap in an `Arc` to share between
/// request handlers.
#[derive(Debug, Default)]
pub struct VisitTracker {
    inner: RwLock<Inner>,
    config: TrackerConfig,
}

impl VisitTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config,
        }
    }

    /// Rebuild a tracker from a saved state.
    pub fn from_state(state: AtlasState, config: TrackerConfig) -> Result<Self, AtlasError> {
        let store = StatisticsStore::from_parts(state.aggregates, state.observations)?;
        let dedup = VisitorDeduplicator::from_resolved(state.seen_identities);
        Ok(Self {
            inner: RwLock::new(Inner { store, dedup }),
            config,
        })
    }

    /// Load a tracker from a persistence backend.
    pub fn restore(backend: &dyn StateStore, config: TrackerConfig) -> Result<Self, AtlasError> {
        let tracker = Self::from_state(backend.load()?, config)?;
        let inner = tracker.read();
        info!(
            "[VisitTracker] Restored {} countries, {} visitors",
            inner.store.country_count(),
            inner.dedup.resolved_count()
        );
        drop(inner);
        Ok(tracker)
    }

    /// Copy of the persistable state, taken under one read lock.
    pub fn export_state(&self) -> AtlasState {
        let inner = self.read();
        AtlasState {
            aggregates: inner.store.aggregates().cloned().collect(),
            observations: inner.store.observations().to_vec(),
            seen_identities: inner.dedup.resolved_identities(),
        }
    }

    /// Save the current state to a persistence backend.
    pub fn persist(&self, backend: &dyn StateStore) -> Result<(), AtlasError> {
        backend.save(&self.export_state())
    }

    /// Handle one visit.
    ///
    /// # Errors
    ///
    /// - [`AtlasError::Network`] when the resolver could not be reached; the
    ///   identity stays eligible and nothing is recorded.
    /// - [`AtlasError::InvalidInput`] when the resolver returned unusable data
    ///   ([`ResolutionFailure::InvalidData`]); nothing is recorded.
    ///
    /// Incomplete lookups are not errors; see [`VisitOutcome::Incomplete`].
    ///
    /// Dropping the returned future before it completes releases the claim,
    /// leaving the identity eligible for the next visit.
    pub async fn record_visit(
        &self,
        identity: &VisitorIdentity,
        resolver: &dyn GeoResolver,
    ) -> Result<VisitOutcome, AtlasError> {
        let claim = self.write().dedup.try_claim(identity);
        match claim {
            Claim::AlreadyResolved => {
                debug!("[VisitTracker] {} already counted", identity);
                return Ok(VisitOutcome::AlreadyCounted);
            }
            Claim::InFlight => {
                debug!("[VisitTracker] {} is being resolved by another request", identity);
                return Ok(VisitOutcome::InFlight);
            }
            Claim::Acquired => {}
        }
        let claim = ClaimGuard::new(self, identity);

        debug!("[VisitTracker] Resolving {} via {}", identity, resolver.name());
        let resolved = resolver.resolve(identity.as_str()).await;

        // The guard must not drop while the write lock is held.
        match resolved {
            Ok(observation) => {
                let aggregate = {
                    let mut inner = self.write();
                    let aggregate = inner.store.record(observation.clone()).clone();
                    inner.dedup.mark_resolved(identity);
                    aggregate
                };
                claim.disarm();
                debug!(
                    "[VisitTracker] Counted {} in {} (now {})",
                    identity, aggregate.country, aggregate.count
                );
                Ok(VisitOutcome::Counted {
                    observation,
                    aggregate,
                })
            }
            Err(ResolutionFailure::IncompleteData { country, loc }) => {
                let attempts = self.write().dedup.mark_pending(identity);
                claim.disarm();
                if attempts >= self.config.retry_warn_threshold {
                    warn!(
                        "[VisitTracker] {} still incomplete after {} lookups (country={:?}, loc={:?})",
                        identity, attempts, country, loc
                    );
                } else {
                    debug!(
                        "[VisitTracker] Incomplete data for {} (country={:?}, loc={:?})",
                        identity, country, loc
                    );
                }
                Ok(VisitOutcome::Incomplete { attempts })
            }
            Err(ResolutionFailure::InvalidData(msg)) => {
                drop(claim);
                warn!("[VisitTracker] Rejected lookup for {}: {}", identity, msg);
                Err(AtlasError::InvalidInput(msg))
            }
            Err(ResolutionFailure::Network(msg)) => {
                drop(claim);
                warn!("[VisitTracker] Lookup for {} failed: {}", identity, msg);
                Err(AtlasError::Network(msg))
            }
        }
    }

    /// Record an observation directly, bypassing deduplication.
    pub fn record_observation(
        &self,
        country: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<CountryAggregate, AtlasError> {
        self.write()
            .store
            .record_observation(country, latitude, longitude)
            .cloned()
    }

    /// `true` unless the identity has already been counted.
    pub fn should_resolve(&self, identity: &VisitorIdentity) -> bool {
        self.read().dedup.should_resolve(identity)
    }

    pub fn visitor_state(&self, identity: &VisitorIdentity) -> Option<VisitorState> {
        self.read().dedup.state(identity)
    }

    /// Aggregate for one country, copied out of the lock.
    pub fn aggregate(&self, country: &str) -> Option<CountryAggregate> {
        self.read().store.get(country).cloned()
    }

    /// Consistent snapshot, projected under a single read lock.
    pub fn snapshot(&self, config: &SnapshotConfig) -> Snapshot {
        project(&self.read().store, config)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
