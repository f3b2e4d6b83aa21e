//! Per-country running statistics.
//!
//! Each country keeps a visit count and a mean position that is updated one
//! observation at a time, without replaying history:
//!
//! ```text
//! new_count = old_count + 1
//! new_mean  = old_mean + (value - old_mean) / new_count
//! ```
//!
//! The recurrence is applied to latitude and longitude independently, so the
//! per-country mean is a *planar* mean. It is wrong for a country that spans
//! the antimeridian, but it is the value the maps have always shown for
//! country markers. The global meeting point uses [`crate::spherical::mean_of`]
//! over the individual observations instead, and the two are kept apart.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{AtlasError, GeoObservation, GeoPoint};

/// Running statistics for one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryAggregate {
    /// Country code (unique key)
    pub country: String,
    /// Number of accepted observations, always >= 1
    pub count: u64,
    /// Planar running mean of observed latitudes
    pub mean_latitude: f64,
    /// Planar running mean of observed longitudes
    pub mean_longitude: f64,
}

impl CountryAggregate {
    fn first(obs: &GeoObservation) -> Self {
        Self {
            country: obs.country().to_string(),
            count: 1,
            mean_latitude: obs.latitude(),
            mean_longitude: obs.longitude(),
        }
    }

    /// Fold one more observation into the running means.
    fn update(&mut self, latitude: f64, longitude: f64) {
        self.count += 1;
        let n = self.count as f64;
        self.mean_latitude += (latitude - self.mean_latitude) / n;
        self.mean_longitude += (longitude - self.mean_longitude) / n;
    }

    /// Mean position as a point.
    pub fn mean_position(&self) -> GeoPoint {
        GeoPoint::new(self.mean_latitude, self.mean_longitude)
    }
}

/// Owner of every [`CountryAggregate`] and of the accepted observations.
///
/// Not synchronized by itself; [`crate::VisitTracker`] wraps it in a lock.
#[derive(Debug, Clone, Default)]
pub struct StatisticsStore {
    aggregates: BTreeMap<String, CountryAggregate>,
    observations: Vec<GeoObservation>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted parts.
    ///
    /// Rejected: aggregates with a zero count, an empty key, out-of-range
    /// means or a key that appears twice after normalization, and any
    /// country whose aggregate count differs from its number of observations.
    pub fn from_parts(
        aggregates: Vec<CountryAggregate>,
        observations: Vec<GeoObservation>,
    ) -> Result<Self, AtlasError> {
        let mut map = BTreeMap::new();
        for agg in aggregates {
            if agg.count == 0 {
                return Err(AtlasError::invalid(format!(
                    "aggregate for {} has zero count",
                    agg.country
                )));
            }
            let country = crate::normalize_country(&agg.country)?;
            agg.mean_position().validated()?;
            if map.contains_key(&country) {
                return Err(AtlasError::invalid(format!(
                    "duplicate aggregate for {}",
                    country
                )));
            }
            map.insert(country.clone(), CountryAggregate { country, ..agg });
        }

        let mut observed: BTreeMap<&str, u64> = BTreeMap::new();
        for obs in &observations {
            *observed.entry(obs.country()).or_default() += 1;
        }
        for (country, count) in &observed {
            let expected = map.get(*country).map_or(0, |a| a.count);
            if expected != *count {
                return Err(AtlasError::invalid(format!(
                    "{} has {} observations but an aggregate count of {}",
                    country, count, expected
                )));
            }
        }
        if let Some(agg) = map.values().find(|a| !observed.contains_key(a.country.as_str())) {
            return Err(AtlasError::invalid(format!(
                "{} has an aggregate count of {} but no observations",
                agg.country, agg.count
            )));
        }

        Ok(Self {
            aggregates: map,
            observations,
        })
    }

    /// Validate and record one observation.
    ///
    /// Fails with [`AtlasError::InvalidInput`] before touching any state when
    /// the country is empty or a coordinate is out of range.
    pub fn record_observation(
        &mut self,
        country: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<&CountryAggregate, AtlasError> {
        let obs = GeoObservation::new(country, latitude, longitude)?;
        Ok(self.record(obs))
    }

    /// Record an observation built by [`GeoObservation::new`]. O(1) amortized.
    pub(crate) fn record(&mut self, obs: GeoObservation) -> &CountryAggregate {
        let (latitude, longitude) = (obs.latitude(), obs.longitude());
        let country = obs.country().to_string();
        let is_new = !self.aggregates.contains_key(&country);

        if is_new {
            info!("[StatisticsStore] First visitor from {}", country);
            self.aggregates
                .insert(country.clone(), CountryAggregate::first(&obs));
        } else if let Some(agg) = self.aggregates.get_mut(&country) {
            agg.update(latitude, longitude);
        }
        self.observations.push(obs);

        &self.aggregates[&country]
    }

    /// Aggregate for one country (code is matched case-insensitively).
    pub fn get(&self, country: &str) -> Option<&CountryAggregate> {
        self.aggregates.get(&country.trim().to_ascii_uppercase())
    }

    /// All aggregates ordered by country code.
    pub fn aggregates(&self) -> impl Iterator<Item = &CountryAggregate> {
        self.aggregates.values()
    }

    /// Every accepted observation in arrival order.
    pub fn observations(&self) -> &[GeoObservation] {
        &self.observations
    }

    pub fn country_count(&self) -> usize {
        self.aggregates.len()
    }

    /// Total accepted observations across all countries.
    pub fn total_visits(&self) -> u64 {
        self.aggregates.values().map(|a| a.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}
