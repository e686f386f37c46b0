// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Horizon masks.

use serde::{Deserialize, Serialize};

use crate::constants::TAU;
use crate::error::ConfigurationError;

/// The local horizon of a station as a function of azimuth. A pointing
/// exactly on the mask is *not* visible.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum HorizonMask {
    /// The closest azimuth knot governs the minimum elevation.
    Step {
        /// Azimuth knots, ascending \[radians\]
        azimuths: Vec<f64>,
        /// Minimum elevations at the knots \[radians\]
        elevations: Vec<f64>,
    },

    /// Piecewise-linear interpolation between azimuth knots.
    Line {
        /// Azimuth knots, ascending \[radians\]
        azimuths: Vec<f64>,
        /// Minimum elevations at the knots \[radians\]
        elevations: Vec<f64>,
    },
}

impl HorizonMask {
    /// Build a mask from alternating azimuth/elevation values in degrees,
    /// the layout of mask catalog entries. An even number of azimuth
    /// knots makes a line mask, an odd number a step mask.
    pub fn from_catalog(el_mask_deg: &[f64]) -> Option<HorizonMask> {
        if el_mask_deg.is_empty() {
            return None;
        }
        let mut azimuths = vec![];
        let mut elevations = vec![];
        for (i, &value) in el_mask_deg.iter().enumerate() {
            if i % 2 == 0 {
                azimuths.push(value.to_radians());
            } else {
                elevations.push(value.to_radians());
            }
        }
        elevations.resize(azimuths.len(), *elevations.last().unwrap_or(&0.0));

        Some(if azimuths.len() % 2 == 0 {
            HorizonMask::Line { azimuths, elevations }
        } else {
            HorizonMask::Step { azimuths, elevations }
        })
    }

    pub fn validate(&self, station: &str) -> Result<(), ConfigurationError> {
        let azimuths = match self {
            HorizonMask::Step { azimuths, .. } => azimuths,
            HorizonMask::Line { azimuths, .. } => azimuths,
        };
        if azimuths.len() < 2 {
            return Err(ConfigurationError::BadHorizonMask(station.to_string()));
        }
        Ok(())
    }

    /// The minimum elevation at an azimuth \[radians\].
    pub fn elevation_limit(&self, az: f64) -> f64 {
        let az = az.rem_euclid(TAU);
        match self {
            HorizonMask::Step { azimuths, elevations } => {
                let mut best = 0;
                let mut best_dist = f64::INFINITY;
                for (i, &knot) in azimuths.iter().enumerate() {
                    let mut d = (az - knot.rem_euclid(TAU)).abs();
                    if d > TAU / 2.0 {
                        d = TAU - d;
                    }
                    if d < best_dist {
                        best_dist = d;
                        best = i;
                    }
                }
                elevations[best]
            }

            HorizonMask::Line { azimuths, elevations } => {
                // Find the bracketing knots, wrapping the last interval
                // back to the first knot.
                let i = azimuths.partition_point(|&k| k <= az);
                if i == 0 || i == azimuths.len() {
                    let a0 = azimuths[azimuths.len() - 1];
                    let a1 = azimuths[0] + TAU;
                    let az = if az < a0 { az + TAU } else { az };
                    let frac = if (a1 - a0).abs() < 1e-12 {
                        0.0
                    } else {
                        (az - a0) / (a1 - a0)
                    };
                    let e0 = elevations[elevations.len() - 1];
                    let e1 = elevations[0];
                    e0 + (e1 - e0) * frac
                } else {
                    let frac = (az - azimuths[i - 1]) / (azimuths[i] - azimuths[i - 1]);
                    elevations[i - 1] + (elevations[i] - elevations[i - 1]) * frac
                }
            }
        }
    }

    /// Is a pointing above the mask? Elevation exactly on the mask is
    /// not visible.
    pub fn visible(&self, az: f64, el: f64) -> bool {
        el > self.elevation_limit(az)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEG2RAD;
    use approx::assert_abs_diff_eq;

    #[test]
    fn step_mask_uses_closest_knot() {
        let mask = HorizonMask::Step {
            azimuths: vec![0.0, 90.0 * DEG2RAD, 180.0 * DEG2RAD],
            elevations: vec![5.0 * DEG2RAD, 10.0 * DEG2RAD, 15.0 * DEG2RAD],
        };
        assert_abs_diff_eq!(mask.elevation_limit(40.0 * DEG2RAD), 5.0 * DEG2RAD);
        assert_abs_diff_eq!(mask.elevation_limit(50.0 * DEG2RAD), 10.0 * DEG2RAD);
        // Wrap-around: 350 deg is closest to the knot at 0.
        assert_abs_diff_eq!(mask.elevation_limit(350.0 * DEG2RAD), 5.0 * DEG2RAD);
    }

    #[test]
    fn line_mask_interpolates() {
        let mask = HorizonMask::Line {
            azimuths: vec![0.0, 180.0 * DEG2RAD],
            elevations: vec![0.0, 20.0 * DEG2RAD],
        };
        assert_abs_diff_eq!(
            mask.elevation_limit(90.0 * DEG2RAD),
            10.0 * DEG2RAD,
            epsilon = 1e-10
        );
        // Behind the last knot the mask wraps back towards the first.
        assert_abs_diff_eq!(
            mask.elevation_limit(270.0 * DEG2RAD),
            10.0 * DEG2RAD,
            epsilon = 1e-10
        );
    }

    #[test]
    fn exactly_on_the_mask_is_not_visible() {
        let mask = HorizonMask::Line {
            azimuths: vec![0.0, 180.0 * DEG2RAD],
            elevations: vec![10.0 * DEG2RAD, 10.0 * DEG2RAD],
        };
        assert!(!mask.visible(45.0 * DEG2RAD, 10.0 * DEG2RAD));
        assert!(mask.visible(45.0 * DEG2RAD, 10.001 * DEG2RAD));
    }

    #[test]
    fn catalog_layout() {
        // az el az el az -> odd number of azimuth knots -> step mask.
        let mask = HorizonMask::from_catalog(&[0.0, 5.0, 120.0, 10.0, 240.0]).unwrap();
        assert!(matches!(mask, HorizonMask::Step { .. }));

        // az el az el -> line mask.
        let mask = HorizonMask::from_catalog(&[0.0, 5.0, 180.0, 10.0]).unwrap();
        assert!(matches!(mask, HorizonMask::Line { .. }));

        assert!(HorizonMask::from_catalog(&[]).is_none());
    }
}
