//! # Visitor Atlas
//!
//! Geolocation of visiting clients and running per-country statistics for
//! rendering visitor maps.
//!
//! This library provides:
//! - Deduplication of visitors by client address
//! - A resolver boundary for IP → (country, latitude, longitude) lookups
//! - Online per-country aggregates (visit count, mean position)
//! - Spherical averaging for a global "meeting point" marker
//! - Consistent, immutable snapshots for a rendering layer
//!
//! ## Features
//!
//! - **`http`** - Enable the ipinfo.io style HTTP resolver
//! - **`parallel`** - Enable parallel spherical averaging with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use visitor_atlas::{SnapshotConfig, StatisticsStore, project};
//!
//! let mut store = StatisticsStore::new();
//! store.record_observation("US", 10.0, -100.0).unwrap();
//! store.record_observation("US", 20.0, -120.0).unwrap();
//! store.record_observation("JP", 35.0, 139.0).unwrap();
//!
//! let snapshot = project(&store, &SnapshotConfig::default());
//! let us = snapshot.country("US").unwrap();
//! assert_eq!(us.aggregate.count, 2);
//! assert!((us.aggregate.mean_latitude - 15.0).abs() < 1e-9);
//! assert!(snapshot.global_center.is_some());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{AtlasError, ResolutionFailure};

// Spherical averaging and distances
pub mod spherical;

// Per-country running statistics
pub mod stats;
pub use stats::{CountryAggregate, StatisticsStore};

// At-most-once counting per visitor
pub mod dedup;
pub use dedup::{Claim, VisitorDeduplicator, VisitorState};

// Identity derivation from request metadata
pub mod identity;
pub use identity::{client_identity, forwarded_for, FORWARDED_FOR_HEADER};

// Geolocation lookup boundary
pub mod resolver;
pub use resolver::{parse_lookup, GeoResolver, LookupResponse, ResolverConfig};

#[cfg(feature = "http")]
pub use resolver::IpInfoResolver;

// Read-only projection for rendering
pub mod snapshot;
pub use snapshot::{project, CountryMarker, Snapshot, SnapshotConfig};

// Load/save hooks
pub mod persistence;
pub use persistence::{AtlasState, JsonFileStore, MemoryStateStore, StateStore};

// Request pipeline
pub mod tracker;
pub use tracker::{TrackerConfig, VisitOutcome, VisitTracker};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in degrees.
///
/// # Example
/// ```
/// use visitor_atlas::GeoPoint;
/// let point = GeoPoint::new(35.6762, 139.6503); // Tokyo
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point. No validation; see [`GeoPoint::is_valid`].
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Validate and return the point, or describe which coordinate is bad.
    pub fn validated(self) -> Result<Self, AtlasError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AtlasError::invalid(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AtlasError::invalid(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(self)
    }
}

/// One resolved visit: the country and position of a first-seen visitor.
///
/// Only [`GeoObservation::new`] builds one, so every observation carries a
/// non-empty upper-cased country code and in-range coordinates.
/// Deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservation")]
pub struct GeoObservation {
    country: String,
    latitude: f64,
    longitude: f64,
}

impl GeoObservation {
    /// Build a validated observation.
    ///
    /// The country code is trimmed and upper-cased. Fails with
    /// [`AtlasError::InvalidInput`] for an empty code or out-of-range coordinates.
    ///
    /// ```
    /// use visitor_atlas::GeoObservation;
    /// let obs = GeoObservation::new(" jp ", 35.0, 139.0).unwrap();
    /// assert_eq!(obs.country(), "JP");
    /// assert!(GeoObservation::new("JP", 91.0, 139.0).is_err());
    /// ```
    pub fn new(country: &str, latitude: f64, longitude: f64) -> Result<Self, AtlasError> {
        let country = normalize_country(country)?;
        let point = GeoPoint::new(latitude, longitude).validated()?;
        Ok(Self {
            country,
            latitude: point.latitude,
            longitude: point.longitude,
        })
    }

    /// Upper-cased ISO-style country code.
    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Position of this observation.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Deserialize)]
struct RawObservation {
    country: String,
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawObservation> for GeoObservation {
    type Error = AtlasError;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        GeoObservation::new(&raw.country, raw.latitude, raw.longitude)
    }
}

/// Opaque deduplication key derived from a request's origin address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorIdentity(String);

impl VisitorIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VisitorIdentity {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

pub(crate) fn normalize_country(country: &str) -> Result<String, AtlasError> {
    let code = country.trim();
    if code.is_empty() {
        return Err(AtlasError::invalid("country code must not be empty"));
    }
    Ok(code.to_ascii_uppercase())
}

// ============================================================================
// Tests
// ============================================================================
