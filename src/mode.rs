// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The observing mode: which bands are recorded, at which wavelength and
data rate, and how efficiently the correlator turns recorded bits into
SNR.
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// What to do when a source has no flux information for a band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxBackup {
    /// Assume a negligible flux density; the observation will usually be
    /// dropped for exceeding the maximum scan length.
    None,
    /// Extrapolate a power law through the bands that do have flux
    /// information.
    InternalModel,
}

/// Per-band recording setup shared by the whole network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Band {
    /// Band name, e.g. "X" or "S".
    pub name: String,
    /// Observing wavelength \[m\]
    pub wavelength: f64,
    /// Total recorded data rate on this band \[bit/s\]
    pub recording_rate: f64,
    /// Flux fallback policy for sources without flux information.
    pub backup: FluxBackup,
}

/// The observing mode consumed by the scheduling core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObservingMode {
    bands: Vec<Band>,
    /// Correlator efficiency applied to every baseline.
    efficiency: f64,
    /// Recording-rate overrides for specific baselines, keyed by the
    /// canonical (lower, higher) station-id pair.
    #[serde(default)]
    baseline_rate_overrides: HashMap<(usize, usize), HashMap<String, f64>>,
}

impl ObservingMode {
    pub fn new(bands: Vec<Band>, efficiency: f64) -> Result<ObservingMode, ConfigurationError> {
        if bands.is_empty() {
            return Err(ConfigurationError::NoBands);
        }
        for band in &bands {
            if band.recording_rate <= 0.0 {
                return Err(ConfigurationError::BadRecordingRate {
                    band: band.name.clone(),
                });
            }
        }
        Ok(ObservingMode {
            bands,
            efficiency,
            baseline_rate_overrides: HashMap::new(),
        })
    }

    /// Override the recording rate of one baseline on one band.
    pub fn set_baseline_rate(&mut self, staid1: usize, staid2: usize, band: &str, rate: f64) {
        let key = if staid1 < staid2 {
            (staid1, staid2)
        } else {
            (staid2, staid1)
        };
        self.baseline_rate_overrides
            .entry(key)
            .or_default()
            .insert(band.to_string(), rate);
    }

    pub fn bands(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    pub fn wavelength(&self, band: &str) -> Option<f64> {
        self.bands.iter().find(|b| b.name == band).map(|b| b.wavelength)
    }

    pub fn backup(&self, band: &str) -> FluxBackup {
        self.bands
            .iter()
            .find(|b| b.name == band)
            .map(|b| b.backup)
            .unwrap_or(FluxBackup::None)
    }

    /// Recording rate of a baseline on a band \[bit/s\]
    pub fn recording_rate(&self, staid1: usize, staid2: usize, band: &str) -> f64 {
        let key = if staid1 < staid2 {
            (staid1, staid2)
        } else {
            (staid2, staid1)
        };
        if let Some(rate) = self
            .baseline_rate_overrides
            .get(&key)
            .and_then(|rates| rates.get(band))
        {
            return *rate;
        }
        self.bands
            .iter()
            .find(|b| b.name == band)
            .map(|b| b.recording_rate)
            .unwrap_or(0.0)
    }

    /// Total recording rate over all bands \[bit/s\]; drives the
    /// data-write-speed slew floor.
    pub fn total_recording_rate(&self) -> f64 {
        self.bands.iter().map(|b| b.recording_rate).sum()
    }

    pub fn efficiency(&self, _staid1: usize, _staid2: usize) -> f64 {
        self.efficiency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x_band() -> Band {
        Band {
            name: "X".to_string(),
            wavelength: 0.0349,
            recording_rate: 1e9,
            backup: FluxBackup::InternalModel,
        }
    }

    #[test]
    fn band_lookup() {
        let mode = ObservingMode::new(vec![x_band()], 0.6).unwrap();
        assert!(mode.has_band("X"));
        assert!(!mode.has_band("S"));
        assert_eq!(mode.wavelength("X"), Some(0.0349));
        assert_eq!(mode.recording_rate(0, 1, "X"), 1e9);
    }

    #[test]
    fn baseline_rate_override_is_symmetric() {
        let mut mode = ObservingMode::new(vec![x_band()], 0.6).unwrap();
        mode.set_baseline_rate(3, 1, "X", 2.5e8);
        assert_eq!(mode.recording_rate(1, 3, "X"), 2.5e8);
        assert_eq!(mode.recording_rate(3, 1, "X"), 2.5e8);
        assert_eq!(mode.recording_rate(0, 1, "X"), 1e9);
    }

    #[test]
    fn empty_mode_is_rejected() {
        assert!(matches!(
            ObservingMode::new(vec![], 0.6),
            Err(ConfigurationError::NoBands)
        ));
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let mut band = x_band();
        band.recording_rate = 0.0;
        assert!(matches!(
            ObservingMode::new(vec![band], 0.6),
            Err(ConfigurationError::BadRecordingRate { .. })
        ));
    }
}
