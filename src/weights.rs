// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weight factors of the scan score.
//!
//! These used to be global mutable state in older scheduling codes; here
//! they are a plain value handed to the scheduler once and never changed
//! during a session.

use serde::{Deserialize, Serialize};

use crate::constants::DEG2RAD;

/// Weights of the additive score components plus the ramp thresholds of
/// the low-declination and low-elevation terms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightFactors {
    pub number_of_observations: f64,
    pub average_sources: f64,
    pub average_stations: f64,
    pub average_baselines: f64,
    pub duration: f64,
    pub idle_time: f64,
    /// Normalization interval of the idle-time score \[s\]
    pub idle_time_interval: u32,
    pub sky_coverage: f64,

    pub low_declination: f64,
    /// Declination at which the low-declination term starts to count
    /// \[radians\]
    pub declination_start_weight: f64,
    /// Declination at which the low-declination term saturates \[radians\]
    pub declination_full_weight: f64,

    pub low_elevation: f64,
    /// Elevation at which the low-elevation term starts to count
    /// \[radians\]
    pub low_elevation_start_weight: f64,
    /// Elevation at which the low-elevation term saturates \[radians\]
    pub low_elevation_full_weight: f64,
}

impl Default for WeightFactors {
    fn default() -> WeightFactors {
        WeightFactors {
            number_of_observations: 1.0,
            average_sources: 0.05,
            average_stations: 0.05,
            average_baselines: 0.0,
            duration: 0.2,
            idle_time: 0.1,
            idle_time_interval: 600,
            sky_coverage: 0.75,
            low_declination: 0.0,
            declination_start_weight: -30.0 * DEG2RAD,
            declination_full_weight: -60.0 * DEG2RAD,
            low_elevation: 0.0,
            low_elevation_start_weight: 30.0 * DEG2RAD,
            low_elevation_full_weight: 20.0 * DEG2RAD,
        }
    }
}

/// Piecewise-linear ramp: 0 above `start`, 1 below `full`, linear in
/// between. Used by the low-elevation and low-declination score terms.
pub(crate) fn ramp(value: f64, start: f64, full: f64) -> f64 {
    if value > start {
        0.0
    } else if value < full {
        1.0
    } else {
        (start - value) / (start - full)
    }
}
