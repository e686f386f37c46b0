// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Station recording equipment: the SEFD per band, optionally
//! elevation-dependent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Elevation dependence of an SEFD:
/// `SEFD(el) = SEFD0 * (c0 + c1 / sin(el)^y)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationDependence {
    pub y: f64,
    pub c0: f64,
    pub c1: f64,
}

/// The per-band system equivalent flux densities of a station.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Equipment {
    /// Zenith SEFD per band \[Jy\]
    sefd: HashMap<String, f64>,
    /// Optional elevation dependence per band.
    elevation_dependence: HashMap<String, ElevationDependence>,
}

impl Equipment {
    pub fn new(sefd: HashMap<String, f64>) -> Equipment {
        Equipment {
            sefd,
            elevation_dependence: HashMap::new(),
        }
    }

    pub fn set_elevation_dependence(&mut self, band: &str, dependence: ElevationDependence) {
        self.elevation_dependence.insert(band.to_string(), dependence);
    }

    pub fn has_band(&self, band: &str) -> bool {
        self.sefd.contains_key(band)
    }

    pub fn bands(&self) -> impl Iterator<Item = &str> {
        self.sefd.keys().map(String::as_str)
    }

    /// SEFD of a band at an elevation \[Jy\]
    pub fn sefd(&self, band: &str, el: f64) -> f64 {
        let base = match self.sefd.get(band) {
            Some(&sefd) => sefd,
            None => return 0.0,
        };
        match self.elevation_dependence.get(band) {
            Some(dep) => {
                let sin_el = el.sin().max(1e-9);
                base * (dep.c0 + dep.c1 / sin_el.powf(dep.y))
            }
            None => base,
        }
    }

    /// Worst (largest) zenith SEFD over all bands. Drives the
    /// station-removal tie-break when a scan runs too long.
    pub fn max_sefd(&self) -> f64 {
        self.sefd.values().cloned().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEG2RAD;
    use approx::assert_abs_diff_eq;

    fn equipment() -> Equipment {
        let mut sefd = HashMap::new();
        sefd.insert("X".to_string(), 1000.0);
        sefd.insert("S".to_string(), 1500.0);
        Equipment::new(sefd)
    }

    #[test]
    fn flat_sefd() {
        let eq = equipment();
        assert_abs_diff_eq!(eq.sefd("X", 0.5), 1000.0);
        assert_abs_diff_eq!(eq.sefd("X", 1.5), 1000.0);
        assert_abs_diff_eq!(eq.max_sefd(), 1500.0);
    }

    #[test]
    fn elevation_dependence_raises_low_elevation_sefd() {
        let mut eq = equipment();
        eq.set_elevation_dependence(
            "X",
            ElevationDependence {
                y: 1.0,
                c0: 0.9,
                c1: 0.1,
            },
        );
        // At zenith: c0 + c1 = 1.
        assert_abs_diff_eq!(eq.sefd("X", 90.0 * DEG2RAD), 1000.0, epsilon = 1e-6);
        // At 30 deg elevation 1/sin = 2.
        assert_abs_diff_eq!(eq.sefd("X", 30.0 * DEG2RAD), 1100.0, epsilon = 1e-6);
        // The untouched band stays flat.
        assert_abs_diff_eq!(eq.sefd("S", 30.0 * DEG2RAD), 1500.0);
    }

    #[test]
    fn unknown_band_is_zero() {
        assert_abs_diff_eq!(equipment().sefd("K", 1.0), 0.0);
    }
}
