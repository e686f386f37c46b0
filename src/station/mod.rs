// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Stations.

A [Station] bundles the immutable physical description of a telescope
(position, antenna kinematics, cable wrap, equipment, horizon mask) with
the mutable scheduling state: the current pointing, counters and the
active parameter set.
 */

mod antenna;
mod baseline;
mod cable_wrap;
mod equip;
mod horizon_mask;
pub mod network;
mod position;

pub use antenna::Antenna;
pub use baseline::{Baseline, BaselineParameters, BaselineStatistics};
pub use cable_wrap::CableWrap;
pub use equip::{ElevationDependence, Equipment};
pub use horizon_mask::HorizonMask;
pub use network::Network;
pub use position::Position;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::astro::{frame, AstronomicalParameters, SessionTime};
use crate::constants::*;
use crate::error::ConfigurationError;
use crate::event::Event;
use crate::scan::PointingVector;
use crate::source::Source;

/// The azimuth/elevation model to use for a pointing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AzElModel {
    /// Hour-angle spherical trigonometry from GMST; good enough for bulk
    /// candidate generation.
    Simple,
    /// Full frame rotation with aberration; used once a scan is being
    /// committed or checked rigorously.
    Rigorous,
}

/// All scheduling knobs of a station. Replaced wholesale when an event
/// fires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StationParameters {
    pub available: bool,
    /// Append this station to committed scans instead of scheduling it.
    pub tagalong: bool,
    /// No setup, slew or preob time is charged for the first scan.
    pub first_scan: bool,

    /// Field-system/system delay before slewing \[s\]
    pub system_delay: u32,
    /// Calibration time before observing \[s\]
    pub preob: u32,
    /// Correlator synchronization time during observing \[s\]
    pub midob: u32,
    /// Time after observing before the antenna is free \[s\]
    pub postob: u32,

    /// Lower clamp of any slew \[s\]
    pub min_slew_time: u32,
    /// A slew longer than this removes the station from the candidate
    /// \[s\]
    pub max_slew_time: u32,
    /// Maximum idle time while waiting for the common scan start \[s\]
    pub max_wait: u32,
    /// Minimum observing time \[s\]
    pub min_scan: u32,
    /// Maximum observing time \[s\]
    pub max_scan: u32,

    /// Minimum elevation \[radians\]
    pub min_elevation: f64,

    /// Minimum required SNR per band.
    pub min_snr: HashMap<String, f64>,

    /// Multiplicative score factor for scans with this station.
    pub weight: f64,

    /// Sustained write speed of the recorder \[bit/s\]; limits how soon
    /// the next scan may start after a long one.
    pub data_write_rate: Option<f64>,

    /// Sources this station must never observe.
    pub ignore_sources: Vec<usize>,
}

impl Default for StationParameters {
    fn default() -> StationParameters {
        StationParameters {
            available: true,
            tagalong: false,
            first_scan: true,
            system_delay: 6,
            preob: 10,
            midob: 3,
            postob: 0,
            min_slew_time: 0,
            max_slew_time: 600,
            max_wait: 9999,
            min_scan: 20,
            max_scan: 600,
            min_elevation: 5.0 * DEG2RAD,
            min_snr: HashMap::new(),
            weight: 1.0,
            data_write_rate: None,
            ignore_sources: vec![],
        }
    }
}

/// Per-station bookkeeping accumulated while scheduling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StationStatistics {
    /// Pointing at the start of every committed scan.
    pub pv_start: Vec<PointingVector>,
    /// Pointing at the end of every committed scan.
    pub pv_end: Vec<PointingVector>,
    /// Integrated observing time \[s\]
    pub total_observing_time: u32,
}

/// A VLBI station.
#[derive(Clone, Debug)]
pub struct Station {
    name: String,
    /// Two-letter station code.
    code: String,

    antenna: Antenna,
    cable_wrap: CableWrap,
    position: Position,
    equip: Equipment,
    mask: Option<HorizonMask>,

    parameters: StationParameters,
    events: Vec<Event<StationParameters>>,
    next_event: usize,

    /// Where the antenna is pointing now, and since when.
    current: PointingVector,
    /// Observing duration of the last committed scan; drives the
    /// data-write-rate slew floor.
    previous_observing_duration: u32,

    n_scans: u32,
    n_obs: u32,
    statistics: StationStatistics,
}

impl Station {
    pub fn new(
        name: &str,
        code: &str,
        antenna: Antenna,
        cable_wrap: CableWrap,
        position: Position,
        equip: Equipment,
        mask: Option<HorizonMask>,
    ) -> Station {
        let mut current = PointingVector::new(usize::MAX, usize::MAX);
        current.az = cable_wrap.neutral_point(1);
        current.el = FRAC_PI_2 / 2.0;

        Station {
            name: name.to_string(),
            code: code.to_string(),
            antenna,
            cable_wrap,
            position,
            equip,
            mask,
            parameters: StationParameters::default(),
            events: vec![],
            next_event: 0,
            current,
            previous_observing_duration: 0,
            n_scans: 0,
            n_obs: 0,
            statistics: StationStatistics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn antenna(&self) -> &Antenna {
        &self.antenna
    }

    pub fn antenna_mut(&mut self) -> &mut Antenna {
        &mut self.antenna
    }

    pub fn cable_wrap(&self) -> &CableWrap {
        &self.cable_wrap
    }

    pub fn cable_wrap_mut(&mut self) -> &mut CableWrap {
        &mut self.cable_wrap
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn equip(&self) -> &Equipment {
        &self.equip
    }

    pub fn mask(&self) -> Option<&HorizonMask> {
        self.mask.as_ref()
    }

    pub fn parameters(&self) -> &StationParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut StationParameters {
        &mut self.parameters
    }

    pub fn set_events(
        &mut self,
        events: Vec<Event<StationParameters>>,
    ) -> Result<(), ConfigurationError> {
        crate::event::check_event_order(&self.name, &events)?;
        self.events = events;
        self.next_event = 0;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(mask) = &self.mask {
            mask.validate(&self.name)?;
        }
        crate::event::check_event_order(&self.name, &self.events)
    }

    pub fn available(&self) -> bool {
        self.parameters.available
    }

    pub fn current_pointing(&self) -> &PointingVector {
        &self.current
    }

    /// Seconds since session start at which this antenna was last
    /// committed.
    pub fn current_time(&self) -> u32 {
        self.current.time
    }

    pub fn n_scans(&self) -> u32 {
        self.n_scans
    }

    pub fn n_obs(&self) -> u32 {
        self.n_obs
    }

    pub fn statistics(&self) -> &StationStatistics {
        &self.statistics
    }

    /// Fire all events whose time has come.
    pub fn check_for_new_event(&mut self, time: u32, hard_break: &mut bool) -> bool {
        let mut fired = false;
        while self.next_event < self.events.len() && self.events[self.next_event].time <= time {
            self.parameters = self.events[self.next_event].parameters.clone();
            *hard_break |= !self.events[self.next_event].smooth_transition;
            self.next_event += 1;
            fired = true;
        }
        fired
    }

    /// Compute azimuth and elevation of a source at `pv.time`, writing
    /// the result into `pv`. The azimuth comes out in [0, 2pi) and still
    /// needs unwrapping against the cable wrap.
    pub fn calc_az_el(
        &self,
        source: &Source,
        pv: &mut PointingVector,
        session: &SessionTime,
        astro: &AstronomicalParameters,
        model: AzElModel,
    ) {
        match model {
            AzElModel::Simple => self.calc_az_el_simple(source, pv, session),
            AzElModel::Rigorous => self.calc_az_el_rigorous(source, pv, session, astro),
        }
    }

    /// Hour-angle/declination spherical trigonometry, no aberration or
    /// nutation refinements.
    pub fn calc_az_el_simple(&self, source: &Source, pv: &mut PointingVector, session: &SessionTime) {
        let radec = source.ra_dec(pv.time, Some(&self.position));
        let gmst = session.gmst(pv.time);
        let ha = gmst + self.position.lon() - radec.ra;

        let (sin_ha, cos_ha) = ha.sin_cos();
        let (sin_dec, cos_dec) = radec.dec.sin_cos();
        let (sin_lat, cos_lat) = self.position.lat().sin_cos();

        let sin_el = sin_lat * sin_dec + cos_lat * cos_dec * cos_ha;
        let el = sin_el.clamp(-1.0, 1.0).asin();
        let az = (-cos_dec * sin_ha)
            .atan2(sin_dec * cos_lat - cos_dec * cos_ha * sin_lat)
            .rem_euclid(TAU);

        pv.az = az;
        pv.el = el;
        pv.ha = ha;
        pv.dc = radec.dec;
    }

    /// The rigorous model: CIO-based frame rotation, annual plus diurnal
    /// aberration, then rotation into the station-local system.
    pub fn calc_az_el_rigorous(
        &self,
        source: &Source,
        pv: &mut PointingVector,
        session: &SessionTime,
        astro: &AstronomicalParameters,
    ) {
        let mjd = session.mjd(pv.time);
        let (nut_x, nut_y, nut_s) = astro.nutation(pv.time);
        let rc2i = frame::c2ixys(nut_x, nut_y, nut_s);
        let era = frame::era(mjd);
        let t2c = frame::c2tcio(&rc2i, era);

        let radec = source.ra_dec(pv.time, Some(&self.position));
        let rqu = radec.to_unit_vector();

        // Aberration: annual (Earth velocity) plus diurnal (station
        // rotation), both expressed in the celestial frame.
        let v_earth = astro.earth_velocity();
        let v_diurnal_trs = [
            -EARTH_OMEGA * self.position.y(),
            EARTH_OMEGA * self.position.x(),
            0.0,
        ];
        // t2c maps celestial to terrestrial; its transpose brings the
        // diurnal velocity back out.
        let v_diurnal = [
            t2c[0][0] * v_diurnal_trs[0] + t2c[1][0] * v_diurnal_trs[1] + t2c[2][0] * v_diurnal_trs[2],
            t2c[0][1] * v_diurnal_trs[0] + t2c[1][1] * v_diurnal_trs[1] + t2c[2][1] * v_diurnal_trs[2],
            t2c[0][2] * v_diurnal_trs[0] + t2c[1][2] * v_diurnal_trs[1] + t2c[2][2] * v_diurnal_trs[2],
        ];
        let beta = [
            (v_earth[0] + v_diurnal[0]) / VEL_C,
            (v_earth[1] + v_diurnal[1]) / VEL_C,
            (v_earth[2] + v_diurnal[2]) / VEL_C,
        ];

        let q_dot_beta = frame::dot(&rqu, &beta);
        let mut k1a = [
            rqu[0] + beta[0] - rqu[0] * q_dot_beta,
            rqu[1] + beta[1] - rqu[1] * q_dot_beta,
            rqu[2] + beta[2] - rqu[2] * q_dot_beta,
        ];
        let n = frame::norm(&k1a);
        k1a = [k1a[0] / n, k1a[1] / n, k1a[2] / n];

        // Source direction in the terrestrial system, then in the local
        // one.
        let rq = frame::mat_x_vec(&t2c, &k1a);
        let lq = frame::mat_x_vec(&self.position.g2l(), &rq);

        let zd = lq[2].clamp(-1.0, 1.0).acos();
        let el = FRAC_PI_2 - zd;
        let saz = lq[1].atan2(lq[0]);
        let az = (saz + PI).rem_euclid(TAU);

        pv.az = az;
        pv.el = el;
        pv.ha = session.gmst(pv.time) + self.position.lon() - radec.ra;
        pv.dc = radec.dec;
    }

    /// Can this station see the pointing? Checks the horizon mask, the
    /// second-axis limits, the azimuth reachability and both the
    /// station's and the caller's minimum elevation.
    pub fn is_visible(&self, pv: &PointingVector, min_elevation: f64) -> bool {
        let (el_low, el_up) = self.cable_wrap.axis2_limits();
        if pv.el < el_low || pv.el > el_up {
            return false;
        }
        if pv.el < self.parameters.min_elevation || pv.el < min_elevation {
            return false;
        }
        if let Some(mask) = &self.mask {
            if !mask.visible(pv.az, pv.el) {
                return false;
            }
        }
        self.cable_wrap.azimuth_inside(pv.az)
    }

    /// Slew from the current pointing to `pv` (whose azimuth must already
    /// be unwrapped). `None` if the slew exceeds the allowed maximum.
    /// The first scan of a station is free.
    pub fn slew_time(&self, pv: &PointingVector) -> Option<u32> {
        if self.parameters.first_scan {
            return Some(0);
        }
        let t = self
            .antenna
            .slew_time(pv.az - self.current.az, pv.el - self.current.el)
            .max(self.parameters.min_slew_time);
        if t > self.parameters.max_slew_time {
            None
        } else {
            Some(t)
        }
    }

    /// A recorder with finite write speed needs time to flush the last
    /// scan before the next one starts.
    pub fn min_slew_time_due_to_data_write_speed(
        &self,
        observing_duration: u32,
        recording_rate: f64,
    ) -> u32 {
        match self.parameters.data_write_rate {
            Some(write_rate) if write_rate > 0.0 => {
                let bits = f64::from(observing_duration) * recording_rate;
                (bits / write_rate).ceil() as u32
            }
            _ => 0,
        }
    }

    /// Observing duration of the last committed scan \[s\]
    pub fn previous_observing_duration(&self) -> u32 {
        self.previous_observing_duration
    }

    /// Park the antenna somewhere without recording a scan; the session
    /// setup uses this for antennas that start away from the neutral
    /// point.
    pub fn set_current_pointing(&mut self, pv: PointingVector) {
        self.current = pv;
    }

    /// Register a committed scan: move the antenna, advance the clock,
    /// count the observations.
    pub fn update(&mut self, nobs: usize, pv_start: &PointingVector, pv_end: &PointingVector) {
        self.current = *pv_end;
        self.previous_observing_duration = pv_end.time.saturating_sub(pv_start.time);
        self.n_scans += 1;
        self.n_obs += nobs as u32;
        self.parameters.first_scan = false;
        self.statistics.pv_start.push(*pv_start);
        self.statistics.pv_end.push(*pv_end);
        self.statistics.total_observing_time += self.previous_observing_duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::RADec;
    use crate::source::SourceBody;
    use approx::assert_abs_diff_eq;
    use hifitime::Epoch;
    use std::collections::BTreeMap;

    fn station(lat_deg: f64, lon_deg: f64) -> Station {
        let mut sefd = HashMap::new();
        sefd.insert("X".to_string(), 1000.0);
        Station::new(
            "TEST",
            "Ts",
            Antenna::from_catalog(0.0, 20.0, 120.0, 0.0, 60.0, 0.0),
            CableWrap::new(-90.0, 450.0, 5.0, 88.0).unwrap(),
            Position::from_geodetic(lat_deg, lon_deg, 0.0),
            Equipment::new(sefd),
            None,
        )
    }

    fn session() -> SessionTime {
        SessionTime::new(Epoch::from_gregorian_utc_at_midnight(2020, 1, 1), 3600).unwrap()
    }

    fn source_at(ra_deg: f64, dec_deg: f64) -> Source {
        Source::new(
            "SRC",
            SourceBody::Quasar(RADec::new_degrees(ra_deg, dec_deg)),
            BTreeMap::new(),
        )
    }

    #[test]
    fn source_at_zenith_in_simple_model() {
        let session = session();
        let station = station(30.0, 0.0);
        // Put the source exactly at the local meridian with dec = lat.
        let gmst = session.gmst(0);
        let source = source_at(gmst * RAD2DEG, 30.0);

        let mut pv = PointingVector::new(0, 0);
        station.calc_az_el_simple(&source, &mut pv, &session);
        assert_abs_diff_eq!(pv.el, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn transit_azimuth_is_south_for_northern_station() {
        let session = session();
        let station = station(48.0, 0.0);
        let gmst = session.gmst(0);
        // Source south of the station at transit.
        let source = source_at(gmst * RAD2DEG, 10.0);

        let mut pv = PointingVector::new(0, 0);
        station.calc_az_el_simple(&source, &mut pv, &session);
        assert_abs_diff_eq!(pv.az, PI, epsilon = 1e-6);
        assert_abs_diff_eq!(pv.el, (90.0 - 48.0 + 10.0) * DEG2RAD, epsilon = 1e-6);
    }

    #[test]
    fn rigorous_model_is_close_to_simple_model() {
        let session = session();
        let astro = AstronomicalParameters::new(&session);
        let station = station(48.0, 16.0);
        let source = source_at(80.0, 30.0);

        let mut simple = PointingVector::new(0, 0);
        simple.time = 1800;
        station.calc_az_el_simple(&source, &mut simple, &session);

        let mut rigorous = simple;
        station.calc_az_el_rigorous(&source, &mut rigorous, &session, &astro);

        // Precession since J2000 plus aberration shifts the apparent
        // position by a few tenths of a degree at most.
        assert_abs_diff_eq!(simple.el, rigorous.el, epsilon = 8e-3);
        let mut d_az = (simple.az - rigorous.az).abs();
        if d_az > PI {
            d_az = TAU - d_az;
        }
        assert!(d_az < 2e-2, "azimuth difference {d_az}");
    }

    #[test]
    fn first_scan_slew_is_free() {
        let station = station(48.0, 0.0);
        let mut pv = PointingVector::new(0, 0);
        pv.az = 2.0;
        pv.el = 0.7;
        assert_eq!(station.slew_time(&pv), Some(0));
    }

    #[test]
    fn slew_exceeding_maximum_is_rejected() {
        let mut station = station(48.0, 0.0);
        station.parameters_mut().first_scan = false;
        station.parameters_mut().max_slew_time = 10;
        let mut pv = PointingVector::new(0, 0);
        pv.az = station.current_pointing().az + PI;
        pv.el = station.current_pointing().el;
        assert_eq!(station.slew_time(&pv), None);
    }

    #[test]
    fn data_write_rate_floors_the_gap() {
        let mut station = station(48.0, 0.0);
        station.parameters_mut().data_write_rate = Some(0.5e9);
        // 60 s at 1 Gbps recorded, flushed at 0.5 Gbps: 120 s.
        assert_eq!(station.min_slew_time_due_to_data_write_speed(60, 1e9), 120);
        station.parameters_mut().data_write_rate = None;
        assert_eq!(station.min_slew_time_due_to_data_write_speed(60, 1e9), 0);
    }

    #[test]
    fn update_moves_the_antenna() {
        let mut station = station(48.0, 0.0);
        let mut start = PointingVector::new(0, 3);
        start.time = 100;
        let mut end = start;
        end.time = 160;
        end.az = 1.0;

        station.update(2, &start, &end);
        assert_eq!(station.current_time(), 160);
        assert_eq!(station.n_scans(), 1);
        assert_eq!(station.n_obs(), 2);
        assert!(!station.parameters().first_scan);
        assert_eq!(station.previous_observing_duration(), 60);
        assert_eq!(station.statistics().total_observing_time, 60);
    }
}
