//! Read-only projection of the current statistics for a rendering layer.
//!
//! A [`Snapshot`] is plain data: country markers with their running
//! statistics, every individual visit, and the global "meeting point". The
//! meeting point is the spherical mean of all individual visits, which is
//! generally not the mean of the per-country markers.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::spherical::{haversine_distance, mean_of};
use crate::{CountryAggregate, GeoPoint, StatisticsStore};

/// Configuration for snapshot projection.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Marker radius per visit. Default: 0.3 (use 0.1 for dense heatmaps)
    pub marker_scale: f64,
    /// Include one pin per individual visit. Default: true
    pub include_visits: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            marker_scale: 0.3,
            include_visits: true,
        }
    }
}

/// One country row, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryMarker {
    pub aggregate: CountryAggregate,
    /// Popup text, e.g. `"US: 2"`
    pub label: String,
    /// `count * marker_scale`
    pub radius: f64,
    /// Great-circle distance from the marker to the meeting point (meters)
    pub distance_to_center_m: Option<f64>,
}

/// Consistent point-in-time view of all aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Country markers ordered by country code
    pub countries: Vec<CountryMarker>,
    /// Spherical mean of every visit; `None` when there are no visits
    /// (or they cancel out exactly)
    pub global_center: Option<GeoPoint>,
    /// Individual visit positions, empty unless `include_visits`
    pub visits: Vec<GeoPoint>,
    pub total_visits: u64,
}

impl Snapshot {
    /// Find the marker for a country code (case-insensitive).
    pub fn country(&self, code: &str) -> Option<&CountryMarker> {
        let code = code.trim();
        self.countries
            .iter()
            .find(|m| m.aggregate.country.eq_ignore_ascii_case(code))
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

/// Project a store into a [`Snapshot`].
///
/// The store is borrowed immutably for the whole projection, so the caller's
/// lock (if any) guarantees no aggregate is observed half-updated.
pub fn project(store: &StatisticsStore, config: &SnapshotConfig) -> Snapshot {
    let points: Vec<GeoPoint> = store.observations().iter().map(|o| o.point()).collect();

    let global_center = if points.is_empty() {
        None
    } else {
        match mean_of(&points) {
            Ok(center) => Some(center),
            Err(e) => {
                debug!("[Snapshot] No meeting point: {}", e);
                None
            }
        }
    };

    let countries = store
        .aggregates()
        .map(|agg| CountryMarker {
            label: format!("{}: {}", agg.country, agg.count),
            radius: agg.count as f64 * config.marker_scale,
            distance_to_center_m: global_center
                .map(|c| haversine_distance(&agg.mean_position(), &c)),
            aggregate: agg.clone(),
        })
        .collect();

    Snapshot {
        countries,
        global_center,
        visits: if config.include_visits { points } else { Vec::new() },
        total_visits: store.total_visits(),
    }
}
