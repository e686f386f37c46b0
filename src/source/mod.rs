// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Radio sources.

A [Source] is either a quasar (fixed RA/Dec) or an Earth-orbiting
satellite (time-indexed ephemeris). The scan core only ever talks to the
capability methods (position, observed flux, flux availability) and
never inspects the variant.
 */

mod flux;
pub mod source_list;

pub use flux::{Flux, GaussianComponent};
pub use source_list::SourceList;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::astro::AstronomicalParameters;
use crate::constants::*;
use crate::coord::RADec;
use crate::error::ConfigurationError;
use crate::event::Event;
use crate::station::Position;

/// Spectral index assumed when the internal flux model has only one band
/// to extrapolate from.
const DEFAULT_SPEC_INDEX: f64 = -0.8;

/// How often the try-to-focus bonus applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TryToFocusOccurrence {
    Once,
    PerScan,
}

/// How the try-to-focus bonus combines with the score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TryToFocusType {
    Additive,
    Multiplicative,
}

/// All scheduling knobs of a source. Replaced wholesale when an event
/// fires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceParameters {
    pub available: bool,
    pub global_available: bool,
    pub available_for_fillin_mode: bool,

    /// Multiplicative score factor for scans of this source.
    pub weight: f64,

    /// Minimum required SNR per band.
    pub min_snr: HashMap<String, f64>,

    pub min_number_of_stations: usize,
    /// Minimum flux density required for this source \[Jy\]
    pub min_flux: f64,
    /// Minimum time between two scans of this source \[s\]
    pub min_repeat: u32,
    /// Maximum allowed scan time \[s\]
    pub max_scan: u32,
    /// Minimum required scan time \[s\]
    pub min_scan: u32,
    pub max_number_of_scans: u32,
    /// Minimum elevation \[radians\]
    pub min_elevation: f64,
    /// Minimum distance to the sun \[radians\]
    pub min_sun_distance: f64,

    /// Reject observations within this angle of the jet \[radians\]
    pub jet_angle_buffer: Option<f64>,
    /// Reject observations within this multiple of the jet-angle
    /// uncertainty.
    pub jet_angle_factor: Option<f64>,

    pub try_to_focus_if_observed_once: bool,
    pub try_to_focus_factor: Option<f64>,
    pub try_to_focus_occurrence: Option<TryToFocusOccurrence>,
    pub try_to_focus_type: Option<TryToFocusType>,

    /// Try to spread this many scans evenly over the session; rewrites
    /// the effective min-repeat after every commit.
    pub try_to_observe_x_times_evenly_distributed: Option<u32>,
    /// Lower bound of the rewritten min-repeat \[s\]
    pub try_to_observe_x_times_min_repeat: Option<u32>,

    pub fixed_scan_duration: Option<u32>,

    pub ignore_stations: Vec<usize>,
    pub ignore_baselines: Vec<usize>,
    pub required_stations: Vec<usize>,
}

impl Default for SourceParameters {
    fn default() -> SourceParameters {
        SourceParameters {
            available: true,
            global_available: true,
            available_for_fillin_mode: true,
            weight: 1.0,
            min_snr: HashMap::new(),
            min_number_of_stations: 3,
            min_flux: 0.001,
            min_repeat: 1800,
            max_scan: 9999,
            min_scan: 0,
            max_number_of_scans: 9999,
            min_elevation: 0.0,
            min_sun_distance: 4.0 * DEG2RAD,
            jet_angle_buffer: None,
            jet_angle_factor: None,
            try_to_focus_if_observed_once: false,
            try_to_focus_factor: None,
            try_to_focus_occurrence: None,
            try_to_focus_type: None,
            try_to_observe_x_times_evenly_distributed: None,
            try_to_observe_x_times_min_repeat: None,
            fixed_scan_duration: None,
            ignore_stations: vec![],
            ignore_baselines: vec![],
            required_stations: vec![],
        }
    }
}

/// One sample of a satellite ephemeris.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EphemerisEntry {
    /// Seconds since session start.
    pub time: u32,
    pub coords: RADec,
    /// Distance to the geocentre \[m\]
    pub range: f64,
}

/// The two kinds of sources the scheduler understands.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SourceBody {
    /// Fixed equatorial coordinates.
    Quasar(RADec),
    /// Time-indexed RA/Dec/range samples, sorted by time.
    Satellite(Vec<EphemerisEntry>),
}

/// Per-source bookkeeping accumulated while scheduling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceStatistics {
    pub scan_start_times: Vec<u32>,
    /// Integrated observing time \[s\]
    pub total_observing_time: u32,
}

/// A schedulable radio source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Source {
    name: String,
    alias: Option<String>,
    body: SourceBody,

    /// Flux information per band. Ordered map so that the internal-model
    /// fallback walks the bands deterministically.
    flux: BTreeMap<String, Flux>,

    parameters: SourceParameters,
    events: Vec<Event<SourceParameters>>,
    next_event: usize,

    /// Jet position angle in the (u,v) plane \[radians\], wrapped to
    /// (-pi/2, pi/2].
    jet_angle: Option<f64>,
    /// Uncertainty of the jet angle \[radians\]
    jet_angle_std: f64,

    last_scan: u32,
    n_scans: u32,
    n_total_scans: u32,
    n_obs: u64,
    n_closures: u64,
    statistics: SourceStatistics,
}

impl Source {
    pub fn new(name: &str, body: SourceBody, flux: BTreeMap<String, Flux>) -> Source {
        Source {
            name: name.to_string(),
            alias: None,
            body,
            flux,
            parameters: SourceParameters::default(),
            events: vec![],
            next_event: 0,
            jet_angle: None,
            jet_angle_std: 10.0 * DEG2RAD,
            last_scan: 0,
            n_scans: 0,
            n_total_scans: 0,
            n_obs: 0,
            n_closures: 0,
            statistics: SourceStatistics::default(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Source {
        self.alias = Some(alias.to_string());
        self
    }

    /// Attach a jet angle (degrees, any wrap) and its uncertainty
    /// (degrees).
    pub fn with_jet_angle(mut self, jet_angle_deg: f64, jet_angle_std_deg: f64) -> Source {
        let mut wrapped = (jet_angle_deg + 180.0).rem_euclid(360.0) - 180.0;
        if wrapped < -90.0 {
            wrapped += 180.0;
        }
        if wrapped > 90.0 {
            wrapped -= 180.0;
        }
        self.jet_angle = Some(wrapped * DEG2RAD);
        self.jet_angle_std = jet_angle_std_deg * DEG2RAD;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn parameters(&self) -> &SourceParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut SourceParameters {
        &mut self.parameters
    }

    pub fn set_events(&mut self, events: Vec<Event<SourceParameters>>) -> Result<(), ConfigurationError> {
        crate::event::check_event_order(&self.name, &events)?;
        self.events = events;
        self.next_event = 0;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let SourceBody::Satellite(ephemeris) = &self.body {
            if ephemeris.is_empty() {
                return Err(ConfigurationError::EmptyEphemeris(self.name.clone()));
            }
        }
        crate::event::check_event_order(&self.name, &self.events)
    }

    /// RA/Dec at a session time. The station position is part of the
    /// contract for near-field sources; the present satellite model is
    /// geocentric and does not use it.
    pub fn ra_dec(&self, time: u32, _sta_pos: Option<&Position>) -> RADec {
        match &self.body {
            SourceBody::Quasar(radec) => *radec,
            SourceBody::Satellite(ephemeris) => interpolate_ephemeris(ephemeris, time).0,
        }
    }

    /// Geocentric range for satellites \[m\]; `None` for quasars.
    pub fn range(&self, time: u32) -> Option<f64> {
        match &self.body {
            SourceBody::Quasar(_) => None,
            SourceBody::Satellite(ephemeris) => Some(interpolate_ephemeris(ephemeris, time).1),
        }
    }

    /// Unit vector of the source direction in the celestial reference
    /// system.
    pub fn source_in_crs(&self, time: u32, sta_pos: Option<&Position>) -> [f64; 3] {
        self.ra_dec(time, sta_pos).to_unit_vector()
    }

    pub fn is_satellite(&self) -> bool {
        matches!(self.body, SourceBody::Satellite(_))
    }

    pub fn has_flux(&self, band: &str) -> bool {
        self.flux.contains_key(band)
    }

    /// The highest flux density over all bands; compared against
    /// `min_flux` to deactivate hopeless sources.
    pub fn max_flux(&self) -> f64 {
        self.flux.values().map(Flux::max_flux).fold(0.0, f64::max)
    }

    /// Projection of a baseline vector onto the (u,v) plane \[m\].
    pub fn calc_uv(&self, time: u32, gmst: f64, dxyz: &[f64; 3]) -> (f64, f64) {
        let radec = self.ra_dec(time, None);
        let ha = gmst - radec.ra;

        let (sin_ha, cos_ha) = ha.sin_cos();
        let (sin_de, cos_de) = radec.dec.sin_cos();

        let u = dxyz[0] * sin_ha + dxyz[1] * cos_ha;
        let v = dxyz[2] * cos_de + sin_de * (-dxyz[0] * cos_ha + dxyz[1] * sin_ha);
        (u, v)
    }

    /// Observed flux density on a baseline for a band \[Jy\]. The caller
    /// must have checked `has_flux`.
    pub fn observed_flux(&self, band: &str, time: u32, gmst: f64, dxyz: &[f64; 3]) -> f64 {
        let (u, v) = self.calc_uv(time, gmst, dxyz);
        match self.flux.get(band) {
            Some(flux) => flux.observed_flux(u, v),
            None => 0.0,
        }
    }

    /// Flux density for a wavelength the source has no information for:
    /// fit a power law through the bands that do have flux and evaluate
    /// it at the requested wavelength.
    pub fn observed_flux_model(&self, wavelength: f64, time: u32, gmst: f64, dxyz: &[f64; 3]) -> f64 {
        let (u, v) = self.calc_uv(time, gmst, dxyz);

        let mut it = self.flux.values();
        let first = match it.next() {
            Some(f) => f,
            None => return 0.0,
        };
        let wl1 = first.wavelength();
        let flux1 = first.observed_flux(u, v);

        let (alpha, k) = match it.next() {
            Some(second) => {
                let wl2 = second.wavelength();
                let flux2 = second.observed_flux(u, v);
                if flux1 <= 0.0 || flux2 <= 0.0 {
                    return 0.0;
                }
                let alpha = (flux1 / flux2).ln() / (wl1 / wl2).ln();
                (alpha, flux1 / wl1.powf(alpha))
            }
            // One band only: extrapolate with an assumed spectral index.
            None => (DEFAULT_SPEC_INDEX, flux1 / wl1.powf(DEFAULT_SPEC_INDEX)),
        };

        k * wavelength.powf(alpha)
    }

    /// Angular distance to the sun at a session time \[radians\].
    pub fn sun_distance(&self, time: u32, astro: &AstronomicalParameters) -> f64 {
        let sun = astro.sun(time);
        self.ra_dec(time, None).separation(&sun)
    }

    /// Angular distance to another source; satellites are evaluated at
    /// the given time.
    pub fn angle_distance(&self, other: &Source, time: u32) -> f64 {
        self.ra_dec(time, None).separation(&other.ra_dec(time, None))
    }

    fn check_jet_angle(&self) -> bool {
        self.jet_angle.is_some()
            && (self.parameters.jet_angle_buffer.is_some()
                || self.parameters.jet_angle_factor.is_some())
    }

    /// Is an observation of this baseline acceptably far from the jet
    /// direction in the (u,v) plane?
    pub fn jet_angle_valid(&self, time: u32, gmst: f64, dxyz: &[f64; 3]) -> bool {
        if !self.check_jet_angle() {
            return true;
        }
        let jet_angle = match self.jet_angle {
            Some(a) => a,
            None => return true,
        };

        let (u, v) = self.calc_uv(time, gmst, dxyz);
        let angle = (u / v).atan();

        // Angles are equivalent modulo 180 degrees, so the difference is
        // always within [0, 90] degrees.
        let mut diff = (jet_angle - angle).abs();
        if diff > FRAC_PI_2 {
            diff = PI - diff;
        }

        if let Some(buffer) = self.parameters.jet_angle_buffer {
            if diff < buffer {
                return false;
            }
        }
        if let Some(factor) = self.parameters.jet_angle_factor {
            if diff < factor * self.jet_angle_std {
                return false;
            }
        }
        true
    }

    /// Fire all events whose time has come. Returns true if parameters
    /// changed. A source whose best flux is below the new minimum flux is
    /// deactivated on the spot.
    pub fn check_for_new_event(&mut self, time: u32, hard_break: &mut bool) -> bool {
        let mut fired = false;
        while self.next_event < self.events.len() && self.events[self.next_event].time <= time {
            let global_available = self.parameters.global_available;
            self.parameters = self.events[self.next_event].parameters.clone();
            self.parameters.global_available = global_available;

            *hard_break |= !self.events[self.next_event].smooth_transition;
            self.next_event += 1;

            if self.max_flux() < self.parameters.min_flux {
                self.parameters.available = false;
            }
            fired = true;
        }
        fired
    }

    /// Register a committed scan of this source.
    pub fn update(&mut self, nsta: usize, nbl: usize, time: u32, add_to_statistics: bool) {
        if add_to_statistics {
            self.n_scans += 1;
            if nsta >= 3 {
                let n = nsta as u64;
                self.n_closures += (n - 1) * (n - 2) / 2 + n * (n - 3) / 2;
            }
            self.n_obs += nbl as u64;
            self.last_scan = time;
        }
        self.n_total_scans += 1;
    }

    pub fn record_statistics(&mut self, scan_start: u32, observing_time: u32) {
        self.statistics.scan_start_times.push(scan_start);
        self.statistics.total_observing_time += observing_time;
    }

    pub fn last_scan_time(&self) -> u32 {
        self.last_scan
    }

    pub fn n_scans(&self) -> u32 {
        self.n_scans
    }

    pub fn n_total_scans(&self) -> u32 {
        self.n_total_scans
    }

    pub fn n_obs(&self) -> u64 {
        self.n_obs
    }

    pub fn n_closures(&self) -> u64 {
        self.n_closures
    }

    pub fn statistics(&self) -> &SourceStatistics {
        &self.statistics
    }
}

fn interpolate_ephemeris(ephemeris: &[EphemerisEntry], time: u32) -> (RADec, f64) {
    debug_assert!(!ephemeris.is_empty());
    if ephemeris.len() == 1 || time <= ephemeris[0].time {
        return (ephemeris[0].coords, ephemeris[0].range);
    }
    let last = &ephemeris[ephemeris.len() - 1];
    if time >= last.time {
        return (last.coords, last.range);
    }

    let i = ephemeris.partition_point(|e| e.time < time);
    let (a, b) = (&ephemeris[i - 1], &ephemeris[i]);
    let frac = f64::from(time - a.time) / f64::from(b.time - a.time);

    // RA can wrap between samples.
    let mut d_ra = b.coords.ra - a.coords.ra;
    if d_ra > PI {
        d_ra -= TAU;
    } else if d_ra < -PI {
        d_ra += TAU;
    }

    (
        RADec::new(
            (a.coords.ra + d_ra * frac).rem_euclid(TAU),
            a.coords.dec + (b.coords.dec - a.coords.dec) * frac,
        ),
        a.range + (b.range - a.range) * frac,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn x_flux(jy: f64) -> BTreeMap<String, Flux> {
        let mut flux = BTreeMap::new();
        flux.insert(
            "X".to_string(),
            Flux::BaselineTable {
                wavelength: 0.0349,
                knots: vec![0.0],
                values: vec![jy],
            },
        );
        flux
    }

    fn quasar() -> Source {
        Source::new("TEST", SourceBody::Quasar(RADec::new_degrees(0.0, 30.0)), x_flux(1.0))
    }

    #[test]
    fn uv_at_transit() {
        // With the source on the meridian (ha = 0), u picks the y
        // component of the baseline.
        let src = quasar();
        let (u, v) = src.calc_uv(0, src.ra_dec(0, None).ra, &[0.0, 1000.0, 0.0]);
        assert_abs_diff_eq!(u, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn observed_flux_uses_band_table() {
        let src = quasar();
        assert_abs_diff_eq!(src.observed_flux("X", 0, 0.0, &[1e6, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn internal_model_with_single_band_is_finite() {
        let src = quasar();
        let flux = src.observed_flux_model(0.13, 0, 0.0, &[1e6, 0.0, 0.0]);
        assert!(flux.is_finite());
        assert!(flux > 0.0);
    }

    #[test]
    fn internal_model_fits_two_bands() {
        let mut flux = x_flux(1.0);
        flux.insert(
            "S".to_string(),
            Flux::BaselineTable {
                wavelength: 0.13,
                knots: vec![0.0],
                values: vec![2.0],
            },
        );
        let src = Source::new("TWO", SourceBody::Quasar(RADec::new_degrees(10.0, 10.0)), flux);
        // The fit must reproduce the inputs at their own wavelengths.
        assert_abs_diff_eq!(src.observed_flux_model(0.0349, 0, 0.0, &[0.0; 3]), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(src.observed_flux_model(0.13, 0, 0.0, &[0.0; 3]), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn event_swaps_parameters_and_deactivates_weak_sources() {
        let mut src = quasar();
        let mut strict = SourceParameters {
            min_flux: 5.0,
            ..Default::default()
        };
        strict.weight = 2.0;
        src.set_events(vec![Event::new(100, false, strict)]).unwrap();

        let mut hard_break = false;
        assert!(!src.check_for_new_event(99, &mut hard_break));
        assert!(src.check_for_new_event(100, &mut hard_break));
        assert!(hard_break);
        // Max flux of 1 Jy is below the new 5 Jy threshold.
        assert!(!src.parameters().available);
        assert_abs_diff_eq!(src.parameters().weight, 2.0);
    }

    #[test]
    fn jet_angle_gate() {
        let mut src = quasar().with_jet_angle(0.0, 5.0);
        src.parameters_mut().jet_angle_buffer = Some(10.0 * DEG2RAD);

        // A baseline whose (u,v) angle is along the jet (angle 0 means
        // u = 0).
        let radec = src.ra_dec(0, None);
        let gmst = radec.ra; // transit: ha = 0
        assert!(!src.jet_angle_valid(0, gmst, &[0.0, 0.0, 1000.0]));
        // Perpendicular baseline is fine.
        assert!(src.jet_angle_valid(0, gmst, &[0.0, 1000.0, 0.0]));
    }

    #[test]
    fn satellite_interpolates_ephemeris() {
        let ephemeris = vec![
            EphemerisEntry {
                time: 0,
                coords: RADec::new_degrees(10.0, 0.0),
                range: 1e7,
            },
            EphemerisEntry {
                time: 100,
                coords: RADec::new_degrees(20.0, 10.0),
                range: 2e7,
            },
        ];
        let sat = Source::new("SAT", SourceBody::Satellite(ephemeris), x_flux(1.0));
        let mid = sat.ra_dec(50, None);
        assert_abs_diff_eq!(mid.ra.to_degrees(), 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mid.dec.to_degrees(), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sat.range(50).unwrap(), 1.5e7, epsilon = 1.0);
        // Clamped outside the tabulated interval.
        assert_abs_diff_eq!(sat.ra_dec(1000, None).ra.to_degrees(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn ephemeris_ra_wrap() {
        let ephemeris = vec![
            EphemerisEntry {
                time: 0,
                coords: RADec::new_degrees(359.0, 0.0),
                range: 1e7,
            },
            EphemerisEntry {
                time: 100,
                coords: RADec::new_degrees(1.0, 0.0),
                range: 1e7,
            },
        ];
        let sat = Source::new("SAT", SourceBody::Satellite(ephemeris), x_flux(1.0));
        assert_abs_diff_eq!(sat.ra_dec(50, None).ra.to_degrees(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn update_counts_closures() {
        let mut src = quasar();
        src.update(4, 6, 300, true);
        assert_eq!(src.n_scans(), 1);
        assert_eq!(src.n_obs(), 6);
        // (4-1)(4-2)/2 + 4(4-3)/2 = 3 + 2
        assert_eq!(src.n_closures(), 5);
        assert_eq!(src.last_scan_time(), 300);

        src.update(2, 1, 400, false);
        assert_eq!(src.n_scans(), 1);
        assert_eq!(src.n_total_scans(), 2);
    }
}
