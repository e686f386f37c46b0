// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Scans.

A [Scan] is a candidate or committed observation: a set of stations
pointing at one source over a common interval, with one observation per
usable baseline. Candidates are born from a cheap azimuth/elevation pass
and then ground through the rigorous update pipeline, which iterates

1. slew-time convergence,
2. scan-start alignment,
3. per-baseline observing durations,
4. per-station observing durations,
5. in-scan visibility,
6. end-position reachability (fill-in mode),

removing stations until the scan is stable or invalid. A scan that drops
below its source's minimum station count, loses a required station or
runs out of observations is discarded; the pipeline never throws.
 */

mod observation;
mod pointing_vector;
mod scan_times;

pub use observation::Observation;
pub use pointing_vector::PointingVector;
pub use scan_times::{AlignmentAnchor, ScanTimes, Timestamp};

use std::collections::HashMap;

use log::{log_enabled, trace, warn, Level::Trace};
use serde::{Deserialize, Serialize};

use crate::astro::{AstronomicalParameters, SessionTime};
use crate::constants::*;
use crate::mode::{FluxBackup, ObservingMode};
use crate::scheduler::end_position::StationEndposition;
use crate::source::Source;
use crate::station::{Network, Station};
use crate::weights::{ramp, WeightFactors};

/// Upper bound on the slew-convergence iterations per station.
const MAX_SLEW_ITERATIONS: usize = 30;

/// Sampling step of the in-scan visibility check \[s\]
const VISIBILITY_STEP: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanType {
    HighImpact,
    Standard,
    Fillin,
    AstroCalibrator,
    Calibrator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanConstellation {
    Single,
    Subnetting,
}

/// Read-only context threaded through the rigorous update.
pub struct ScanContext<'a> {
    pub session: &'a SessionTime,
    pub astro: &'a AstronomicalParameters,
    pub mode: &'a ObservingMode,
    pub anchor: AlignmentAnchor,
    /// Fixed observing duration of calibrator-block scans \[s\]
    pub calibrator_scan_length: Option<u32>,
}

/// Precomputed inputs of the score.
pub struct ScoreInputs<'a> {
    /// Deficit score per station.
    pub astas: &'a [f64],
    /// Deficit score per source.
    pub asrcs: &'a [f64],
    /// Deficit score per baseline.
    pub abls: &'a [f64],
    /// Shortest candidate duration in the current subcon \[s\]
    pub min_time: u32,
    /// Longest candidate duration in the current subcon \[s\]
    pub max_time: u32,
    /// Idle score per station.
    pub idle_score: &'a [f64],
    pub weights: &'a WeightFactors,
    /// Custom-scan-sequence boost for this source (1 when inactive).
    pub sequence_factor: f64,
}

/// A candidate or committed scan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scan {
    nsta: usize,
    srcid: usize,
    score: f64,

    times: ScanTimes,
    pointing_vectors_start: Vec<PointingVector>,
    pointing_vectors_end: Vec<PointingVector>,
    observations: Vec<Observation>,

    scan_type: ScanType,
    constellation: ScanConstellation,
}

impl Scan {
    /// Create a single-source scan from the visible stations' pointing
    /// vectors and each station's end-of-last-scan time.
    pub fn new(
        pointing_vectors: Vec<PointingVector>,
        end_of_last_scan: Vec<u32>,
        scan_type: ScanType,
    ) -> Scan {
        debug_assert_eq!(pointing_vectors.len(), end_of_last_scan.len());
        let nsta = pointing_vectors.len();
        let srcid = pointing_vectors[0].srcid;
        Scan {
            nsta,
            srcid,
            score: 0.0,
            times: ScanTimes::new(end_of_last_scan),
            pointing_vectors_start: pointing_vectors,
            pointing_vectors_end: vec![],
            observations: Vec::with_capacity(nsta * (nsta - 1) / 2),
            scan_type,
            constellation: ScanConstellation::Single,
        }
    }

    pub fn nsta(&self) -> usize {
        self.nsta
    }

    pub fn srcid(&self) -> usize {
        self.srcid
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn set_scan_type(&mut self, scan_type: ScanType) {
        self.scan_type = scan_type;
    }

    pub fn constellation(&self) -> ScanConstellation {
        self.constellation
    }

    pub fn times(&self) -> &ScanTimes {
        &self.times
    }

    pub fn times_mut(&mut self) -> &mut ScanTimes {
        &mut self.times
    }

    pub fn station_id(&self, idx: usize) -> usize {
        self.pointing_vectors_start[idx].staid
    }

    pub fn station_ids(&self) -> Vec<usize> {
        self.pointing_vectors_start.iter().map(|pv| pv.staid).collect()
    }

    pub fn pointing_vector(&self, idx: usize, ts: Timestamp) -> &PointingVector {
        match ts {
            Timestamp::Start => &self.pointing_vectors_start[idx],
            Timestamp::End => &self.pointing_vectors_end[idx],
        }
    }

    pub fn pointing_vectors(&self, ts: Timestamp) -> &[PointingVector] {
        match ts {
            Timestamp::Start => &self.pointing_vectors_start,
            Timestamp::End => &self.pointing_vectors_end,
        }
    }

    pub(crate) fn pointing_vectors_start_mut(&mut self) -> &mut [PointingVector] {
        &mut self.pointing_vectors_start
    }

    /// Delay the whole observing window, growing the idle block; keeps
    /// pointing-vector and observation times consistent.
    pub fn shift_observing_start(&mut self, delta: u32) {
        self.times.shift_observing_start(delta);
        for pv in &mut self.pointing_vectors_start {
            pv.time += delta;
        }
        for pv in &mut self.pointing_vectors_end {
            pv.time += delta;
        }
        for obs in &mut self.observations {
            obs.start_time += delta;
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn n_obs(&self) -> usize {
        self.observations.len()
    }

    /// Number of observations a station takes part in.
    pub fn n_obs_of_station(&self, staid: usize) -> usize {
        self.observations
            .iter()
            .filter(|obs| obs.contains_station(staid))
            .count()
    }

    pub fn has_observation(&self, staid1: usize, staid2: usize) -> bool {
        self.observations
            .iter()
            .any(|obs| obs.contains_station(staid1) && obs.contains_station(staid2))
    }

    pub fn find_idx_of_station_id(&self, staid: usize) -> Option<usize> {
        self.pointing_vectors_start.iter().position(|pv| pv.staid == staid)
    }

    /// Charge a station's fixed overheads.
    pub fn add_times(&mut self, idx: usize, field_system: u32, slew: u32, preob: u32) {
        self.times.add_times(idx, field_system, slew, preob);
    }

    /// Delete a station and everything that depends on it. Returns false
    /// if the scan is no longer valid.
    pub fn remove_station(&mut self, idx: usize, source: &Source, anchor: AlignmentAnchor) -> bool {
        let staid = self.pointing_vectors_start[idx].staid;
        if log_enabled!(Trace) {
            trace!("scan of source {} removes station {staid}", self.srcid);
        }

        self.nsta -= 1;
        if self.nsta < source.parameters().min_number_of_stations {
            return false;
        }
        if source.parameters().required_stations.contains(&staid) {
            return false;
        }

        self.times.remove_element(idx, anchor);
        self.pointing_vectors_start.remove(idx);
        if idx < self.pointing_vectors_end.len() {
            self.pointing_vectors_end.remove(idx);
        }

        let nobs_before = self.observations.len();
        self.observations.retain(|obs| !obs.contains_station(staid));
        !(nobs_before != 0 && self.observations.is_empty())
    }

    /// Delete one observation; a station left without observations goes
    /// with it. Returns false if the scan is no longer valid.
    pub fn remove_observation(&mut self, iobs: usize, source: &Source, anchor: AlignmentAnchor) -> bool {
        let staid1 = self.observations[iobs].staid1;
        let staid2 = self.observations[iobs].staid2;
        self.observations.remove(iobs);
        if self.observations.is_empty() {
            return false;
        }

        let count1 = self.observations.iter().filter(|o| o.contains_station(staid1)).count();
        let count2 = self.observations.iter().filter(|o| o.contains_station(staid2)).count();

        let mut valid = true;
        if count1 == 0 {
            if let Some(idx) = self.find_idx_of_station_id(staid1) {
                valid = self.remove_station(idx, source, anchor);
            }
        }
        if valid && count2 == 0 {
            if let Some(idx) = self.find_idx_of_station_id(staid2) {
                valid = self.remove_station(idx, source, anchor);
            }
        }
        valid
    }

    /// Build the observation list from all station pairs, skipping
    /// ignored baselines and baselines too close to the source's jet.
    pub fn construct_observations(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) -> bool {
        self.observations.clear();
        let mut valid = false;

        for i in 0..self.pointing_vectors_start.len() {
            for j in (i + 1)..self.pointing_vectors_start.len() {
                let staid1 = self.pointing_vectors_start[i].staid;
                let staid2 = self.pointing_vectors_start[j].staid;
                let blid = network.blid(staid1, staid2);
                let baseline = network.baseline_by_id(blid);

                if baseline.parameters().ignore {
                    continue;
                }
                if source.parameters().ignore_baselines.contains(&blid) {
                    continue;
                }

                let start_time = self
                    .times
                    .observing_time(i, Timestamp::Start)
                    .max(self.times.observing_time(j, Timestamp::Start));

                let dxyz = network.dxyz(staid1, staid2);
                let gmst = ctx.session.gmst(start_time);
                if !source.jet_angle_valid(start_time, gmst, &dxyz) {
                    continue;
                }

                let (staid1, staid2) = if staid1 < staid2 {
                    (staid1, staid2)
                } else {
                    (staid2, staid1)
                };
                self.observations
                    .push(Observation::new(blid, staid1, staid2, self.srcid, start_time));
                valid = true;
            }
        }
        valid
    }

    /// Remove stations that cannot reach the common start within their
    /// maximum wait. `max_idle` runs parallel to the stations.
    pub fn check_idle_times(
        &mut self,
        max_idle: &mut Vec<u32>,
        source: &Source,
        anchor: AlignmentAnchor,
    ) -> bool {
        loop {
            let slew_ends: Vec<u32> = self.times.slew_ends().to_vec();
            let latest = match slew_ends.iter().copied().max() {
                Some(latest) => latest,
                None => break,
            };

            let violator = (0..self.nsta).find(|&idx| latest - slew_ends[idx] > max_idle[idx]);
            match violator {
                Some(idx) => {
                    if !self.remove_station(idx, source, anchor) {
                        return false;
                    }
                    max_idle.remove(idx);
                }
                None => break,
            }
        }

        self.times.align_start_times(anchor);
        true
    }

    /// Required observing duration per baseline from the SNR targets
    /// (§4.3 of the duration model). Observations that cannot finish
    /// within the baseline's maximum are dropped individually.
    pub fn calc_observation_duration(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) -> bool {
        if self.scan_type == ScanType::Calibrator {
            if let Some(fixed) = ctx.calibrator_scan_length {
                for obs in &mut self.observations {
                    obs.observing_time = fixed;
                }
                return true;
            }
        }
        if let Some(fixed) = source.parameters().fixed_scan_duration {
            for obs in &mut self.observations {
                obs.observing_time = fixed;
            }
            return true;
        }

        let mut idx_obs = 0;
        while idx_obs < self.observations.len() {
            let obs = self.observations[idx_obs];
            let sta1 = network.station(obs.staid1);
            let sta2 = network.station(obs.staid2);
            let baseline = network.baseline_by_id(obs.blid);
            let dxyz = network.dxyz(obs.staid1, obs.staid2);
            let gmst = ctx.session.gmst(obs.start_time);

            let el1 = self.pointing_vectors_start[self.find_idx_of_station_id(obs.staid1).unwrap()].el;
            let el2 = self.pointing_vectors_start[self.find_idx_of_station_id(obs.staid2).unwrap()].el;

            let mut max_duration = 0u32;
            let mut observation_removed = false;
            for band in ctx.mode.bands() {
                let mut flux = if source.has_flux(&band.name) {
                    source.observed_flux(&band.name, obs.start_time, gmst, &dxyz)
                } else if ctx.mode.backup(&band.name) == FluxBackup::InternalModel {
                    source.observed_flux_model(band.wavelength, obs.start_time, gmst, &dxyz)
                } else {
                    MINIMUM_FLUX
                };
                if !flux.is_finite() {
                    warn!(
                        "non-finite flux density for source {} band {}; scan invalidated",
                        source.name(),
                        band.name
                    );
                    return false;
                }
                if flux <= 0.0 {
                    flux = MINIMUM_FLUX;
                }

                let sefd1 = sta1.equip().sefd(&band.name, el1);
                let sefd2 = sta2.equip().sefd(&band.name, el2);
                if !sefd1.is_finite() || !sefd2.is_finite() {
                    warn!(
                        "non-finite SEFD on baseline {}; scan invalidated",
                        baseline.name()
                    );
                    return false;
                }

                let snr = |map: &std::collections::HashMap<String, f64>| {
                    map.get(&band.name).copied().unwrap_or(0.0)
                };
                let max_min_snr = snr(&source.parameters().min_snr)
                    .max(snr(&baseline.parameters().min_snr))
                    .max(snr(&sta1.parameters().min_snr))
                    .max(snr(&sta2.parameters().min_snr));

                let max_cor_synch =
                    f64::from(sta1.parameters().midob.max(sta2.parameters().midob));

                let efficiency = ctx.mode.efficiency(obs.staid1, obs.staid2);
                let rate = ctx.mode.recording_rate(obs.staid1, obs.staid2, &band.name);
                if rate <= 0.0 {
                    return false;
                }

                let anum = max_min_snr / (flux * efficiency);
                let duration = (anum * anum * sefd1 * sefd2 / rate + max_cor_synch).ceil();
                if !duration.is_finite() {
                    warn!(
                        "non-finite observing duration on baseline {}; scan invalidated",
                        baseline.name()
                    );
                    return false;
                }
                let mut duration = duration as u32;

                duration = duration.max(baseline.parameters().min_scan);
                if duration > baseline.parameters().max_scan {
                    if !self.remove_observation(idx_obs, source, ctx.anchor) {
                        return false;
                    }
                    observation_removed = true;
                    break;
                }

                max_duration = max_duration.max(duration);
            }

            if !observation_removed {
                self.observations[idx_obs].observing_time = max_duration;
                idx_obs += 1;
            }
        }
        true
    }

    /// Per-station observing durations from the baseline durations.
    /// Stations whose observations run past their maximum scan time are
    /// removed, worst offender first.
    pub fn scan_duration(&mut self, ctx: &ScanContext, network: &Network, source: &Source) -> bool {
        if self.scan_type == ScanType::Calibrator {
            if let Some(fixed) = ctx.calibrator_scan_length {
                self.times.set_fixed_observing_time(fixed, ctx.anchor);
                return true;
            }
        }
        if let Some(fixed) = source.parameters().fixed_scan_duration {
            self.times.set_fixed_observing_time(fixed, ctx.anchor);
            return true;
        }

        let mut min_scan_times: Vec<u32> = self
            .pointing_vectors_start
            .iter()
            .map(|pv| {
                source
                    .parameters()
                    .min_scan
                    .max(network.station(pv.staid).parameters().min_scan)
            })
            .collect();
        let mut max_scan_times: Vec<u32> = self
            .pointing_vectors_start
            .iter()
            .map(|pv| {
                source
                    .parameters()
                    .max_scan
                    .min(network.station(pv.staid).parameters().max_scan)
            })
            .collect();

        let scan_times = loop {
            let mut valid = true;
            let mut counters = vec![0usize; self.nsta];
            let mut scan_times = min_scan_times.clone();

            for obs in &self.observations {
                let idx1 = self.find_idx_of_station_id(obs.staid1).unwrap();
                let idx2 = self.find_idx_of_station_id(obs.staid2).unwrap();
                let duration = obs.observing_time;

                scan_times[idx1] = scan_times[idx1].max(duration);
                scan_times[idx2] = scan_times[idx2].max(duration);

                if duration > max_scan_times[idx1] || duration > max_scan_times[idx2] {
                    counters[idx1] += 1;
                    counters[idx2] += 1;
                    valid = false;
                }
            }

            if valid {
                break scan_times;
            }

            // Remove the worst offender. Ties: the highest maximum SEFD,
            // then the latest slew end, then the highest station id.
            let max_count = *counters.iter().max().unwrap();
            let mut candidates: Vec<usize> = (0..self.nsta)
                .filter(|&i| counters[i] == max_count)
                .collect();

            if candidates.len() > 1 {
                let max_sefd = candidates
                    .iter()
                    .map(|&i| {
                        network
                            .station(self.pointing_vectors_start[i].staid)
                            .equip()
                            .max_sefd()
                    })
                    .fold(0.0, f64::max);
                candidates.retain(|&i| {
                    network
                        .station(self.pointing_vectors_start[i].staid)
                        .equip()
                        .max_sefd()
                        == max_sefd
                });
            }
            if candidates.len() > 1 {
                let latest_slew = candidates.iter().map(|&i| self.times.slew_end(i)).max().unwrap();
                candidates.retain(|&i| self.times.slew_end(i) == latest_slew);
            }
            let erase = candidates
                .into_iter()
                .max_by_key(|&i| self.pointing_vectors_start[i].staid)
                .unwrap();

            if !self.remove_station(erase, source, ctx.anchor) {
                return false;
            }
            min_scan_times.remove(erase);
            max_scan_times.remove(erase);
        };

        self.times.set_observing_times(&scan_times, ctx.anchor);
        true
    }

    /// Check the scan against the rigorous azimuth/elevation model and
    /// the station kinematics. Returns false if the scan has become
    /// invalid; otherwise the scan is stable and its end pointings are
    /// filled in.
    pub fn rigorous_update(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        endposition: Option<&StationEndposition>,
    ) -> bool {
        if log_enabled!(Trace) {
            trace!("rigorous update of scan of source {}", self.srcid);
        }

        loop {
            let mut station_removed = false;

            if !self.rigorous_slew_time(ctx, network, source) {
                return false;
            }
            if !self.rigorous_scan_start_time_alignment(ctx, network, source) {
                return false;
            }
            if !self.rigorous_scan_visibility(ctx, network, source, &mut station_removed) {
                return false;
            }
            if station_removed {
                continue;
            }
            if !self.rigorous_can_reach_endposition(ctx, network, source, endposition, &mut station_removed)
            {
                return false;
            }
            if !station_removed {
                return true;
            }
        }
    }

    /// Iteratively refine each station's slew end: the apparent source
    /// position moves while the antenna slews, so slew time and target
    /// position are solved together to within one second.
    fn rigorous_slew_time(&mut self, ctx: &ScanContext, network: &Network, source: &Source) -> bool {
        let mut ista = 0;
        while ista < self.nsta {
            let staid = self.pointing_vectors_start[ista].staid;
            let station = network.station(staid);
            let slew_start = self.times.slew_start(ista);

            let mut old_slew_end = 0u32;
            let mut new_slew_end = self.times.slew_end(ista);

            // A slew distance beyond half a turn means the unwrap is
            // about to flip between the cable-wrap wings.
            let mut big_slew = false;
            let mut time_diff = u32::MAX;
            let mut station_removed = false;
            let mut iterations = 0;

            while time_diff > 1 {
                iterations += 1;
                if iterations > MAX_SLEW_ITERATIONS {
                    break;
                }
                old_slew_end = new_slew_end;
                let old_az = self.pointing_vectors_start[ista].az;

                {
                    let pv = &mut self.pointing_vectors_start[ista];
                    pv.time = old_slew_end;
                    station.calc_az_el_rigorous(source, pv, ctx.session, ctx.astro);
                }
                if !station.is_visible(
                    &self.pointing_vectors_start[ista],
                    source.parameters().min_elevation,
                ) {
                    if !self.remove_station(ista, source, ctx.anchor) {
                        return false;
                    }
                    station_removed = true;
                    break;
                }

                let reference_az = if big_slew {
                    old_az
                } else {
                    station.current_pointing().az
                };
                let unwrapped = station
                    .cable_wrap()
                    .unwrap_az_near(self.pointing_vectors_start[ista].az, reference_az);
                let new_az = match unwrapped {
                    Some(az) => {
                        self.pointing_vectors_start[ista].az = az;
                        az
                    }
                    None => {
                        if !self.remove_station(ista, source, ctx.anchor) {
                            return false;
                        }
                        station_removed = true;
                        break;
                    }
                };

                if (old_az - new_az).abs() > 0.5 * PI {
                    // Close to a wrap limit the unwrap direction flipped.
                    // Once is tolerable (retry near the old azimuth);
                    // twice means both representations are unsafe.
                    if big_slew {
                        if !self.remove_station(ista, source, ctx.anchor) {
                            return false;
                        }
                        station_removed = true;
                        break;
                    }
                    big_slew = true;
                }

                match station.slew_time(&self.pointing_vectors_start[ista]) {
                    Some(slew) => {
                        new_slew_end = slew_start + slew;
                        time_diff = new_slew_end.abs_diff(old_slew_end);
                    }
                    None => {
                        if !self.remove_station(ista, source, ctx.anchor) {
                            return false;
                        }
                        station_removed = true;
                        break;
                    }
                }
            }

            if !station_removed {
                let slew = new_slew_end.max(old_slew_end) - slew_start;
                self.times.update_slew_time(ista, slew);
                ista += 1;
            }
        }
        true
    }

    /// Align all stations to a common observing start and settle the
    /// observation and station durations; the three stages loop until
    /// the station set stops shrinking.
    fn rigorous_scan_start_time_alignment(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
    ) -> bool {
        loop {
            let nsta_beginning = self.nsta;

            self.times.align_start_times(ctx.anchor);
            if !self.construct_observations(ctx, network, source) {
                return false;
            }
            if self.nsta != nsta_beginning {
                continue;
            }

            if !self.calc_observation_duration(ctx, network, source) {
                return false;
            }
            if self.nsta != nsta_beginning {
                continue;
            }

            if !self.scan_duration(ctx, network, source) {
                return false;
            }
            if self.nsta == nsta_beginning {
                return true;
            }
        }
    }

    /// Walk the observing window in 30-second steps (plus the end) and
    /// make sure the source stays reachable for every station.
    fn rigorous_scan_visibility(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        station_removed: &mut bool,
    ) -> bool {
        self.pointing_vectors_end.clear();

        let mut ista = 0;
        while ista < self.nsta {
            let scan_start = self.times.observing_time(ista, Timestamp::Start);
            let scan_end = self.times.observing_time(ista, Timestamp::End);
            let staid = self.pointing_vectors_start[ista].staid;
            let station = network.station(staid);

            let mut moving = self.pointing_vectors_start[ista];

            let mut t = scan_start;
            let mut first = true;
            loop {
                let old_az = moving.az;
                moving.time = t;
                station.calc_az_el_rigorous(source, &mut moving, ctx.session, ctx.astro);

                let unwrapped = station.cable_wrap().unwrap_az_near(moving.az, old_az);
                match unwrapped {
                    Some(az) => moving.az = az,
                    None => {
                        *station_removed = true;
                        return self.remove_station(ista, source, ctx.anchor);
                    }
                }

                if (old_az - moving.az).abs() > 0.5 * PI {
                    // The wrap ambiguity changed mid-scan.
                    *station_removed = true;
                    return self.remove_station(ista, source, ctx.anchor);
                }
                if !station.is_visible(&moving, source.parameters().min_elevation) {
                    *station_removed = true;
                    return self.remove_station(ista, source, ctx.anchor);
                }

                if first {
                    self.pointing_vectors_start[ista].copy_values_from(&moving);
                    first = false;
                }

                if t == scan_end {
                    break;
                }
                t = (t + VISIBILITY_STEP).min(scan_end);
            }

            self.pointing_vectors_end.push(moving);
            ista += 1;
        }
        true
    }

    /// In fill-in mode every station must still reach its next committed
    /// pointing in time.
    fn rigorous_can_reach_endposition(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        endposition: Option<&StationEndposition>,
        station_removed: &mut bool,
    ) -> bool {
        let endposition = match endposition {
            Some(e) => e,
            None => return true,
        };

        for idx in 0..self.nsta {
            let slew_start_pv = &self.pointing_vectors_end[idx];
            let staid = slew_start_pv.staid;
            let station = network.station(staid);

            let possible_end_time = match endposition.final_position(staid) {
                Some(final_position) => {
                    let mut slew = station.antenna().slew_time(
                        final_position.az - slew_start_pv.az,
                        final_position.el - slew_start_pv.el,
                    );
                    let duration = self.times.observing_duration(idx);
                    let write_floor = station.min_slew_time_due_to_data_write_speed(
                        duration,
                        ctx.mode.total_recording_rate(),
                    );
                    slew = slew
                        .max(write_floor)
                        .max(station.parameters().min_slew_time);

                    self.times.observing_time(idx, Timestamp::End)
                        + station.parameters().system_delay
                        + slew
                        + station.parameters().preob
                }
                None => self.times.observing_time(idx, Timestamp::End),
            };

            if possible_end_time > endposition.required_endposition_time(staid) {
                *station_removed = true;
                return self.remove_station(idx, source, ctx.anchor);
            }
        }
        true
    }

    /// Remove stations whose observation would run past the session end.
    pub fn prepare_for_scan_end(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        source: &Source,
        end_time: u32,
    ) -> bool {
        loop {
            let mut worst: Option<(usize, u32)> = None;
            for idx in 0..self.nsta {
                let staid = self.pointing_vectors_start[idx].staid;
                let end = self.times.observing_time(idx, Timestamp::End)
                    + network.station(staid).parameters().postob;
                if end > end_time && worst.map(|(_, w)| end > w).unwrap_or(true) {
                    worst = Some((idx, end));
                }
            }
            match worst {
                Some((idx, _)) => {
                    if !self.remove_station(idx, source, ctx.anchor) {
                        return false;
                    }
                }
                None => return true,
            }
        }
    }

    /// Align every observation's window with the final per-station
    /// observing times. Called once on commit.
    pub fn update_observing_time(&mut self) {
        let idx_of: HashMap<usize, usize> = self
            .pointing_vectors_start
            .iter()
            .enumerate()
            .map(|(idx, pv)| (pv.staid, idx))
            .collect();
        for obs in &mut self.observations {
            let idx1 = idx_of[&obs.staid1];
            let idx2 = idx_of[&obs.staid2];
            let start = self
                .times
                .observing_time(idx1, Timestamp::Start)
                .max(self.times.observing_time(idx2, Timestamp::Start));
            let end = self
                .times
                .observing_time(idx1, Timestamp::End)
                .min(self.times.observing_time(idx2, Timestamp::End));
            obs.start_time = start;
            obs.observing_time = end.saturating_sub(start);
        }
    }

    /// Append a tagalong station with externally computed pointings,
    /// observations and slew time. No rescoring happens.
    pub fn add_tagalong_station(
        &mut self,
        pv_start: PointingVector,
        pv_end: PointingVector,
        observations: Vec<Observation>,
        slew_time: u32,
        station: &Station,
    ) {
        if station.parameters().first_scan {
            self.times.add_tagalong_station_time(&pv_start, &pv_end, 0, pv_start.time, 0, 0);
        } else {
            self.times.add_tagalong_station_time(
                &pv_start,
                &pv_end,
                slew_time,
                station.current_time(),
                station.parameters().system_delay,
                station.parameters().preob,
            );
        }
        self.pointing_vectors_start.push(pv_start);
        self.pointing_vectors_end.push(pv_end);
        self.nsta += 1;
        self.observations.extend(observations);
    }

    /// Hard copy with only the stations in `ids`; used to split a
    /// single-source scan into a subnetting half. `None` if the subset
    /// cannot form a valid scan.
    pub fn copy_scan(&self, ids: &[usize], source: &Source) -> Option<Scan> {
        for required in &source.parameters().required_stations {
            if !ids.contains(required) {
                return None;
            }
        }

        let indices: Vec<usize> = self
            .pointing_vectors_start
            .iter()
            .enumerate()
            .filter(|(_, pv)| ids.contains(&pv.staid))
            .map(|(idx, _)| idx)
            .collect();
        if indices.len() < source.parameters().min_number_of_stations {
            return None;
        }

        let pointing_vectors_start: Vec<PointingVector> = indices
            .iter()
            .map(|&i| self.pointing_vectors_start[i])
            .collect();
        let pointing_vectors_end: Vec<PointingVector> = if self.pointing_vectors_end.is_empty() {
            vec![]
        } else {
            indices.iter().map(|&i| self.pointing_vectors_end[i]).collect()
        };
        let observations: Vec<Observation> = self
            .observations
            .iter()
            .filter(|obs| ids.contains(&obs.staid1) && ids.contains(&obs.staid2))
            .cloned()
            .collect();

        Some(Scan {
            nsta: indices.len(),
            srcid: self.srcid,
            score: 0.0,
            times: self.times.subset(&indices),
            pointing_vectors_start,
            pointing_vectors_end,
            observations,
            scan_type: self.scan_type,
            constellation: ScanConstellation::Subnetting,
        })
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    fn calc_score_number_of_observations(&self, max_obs: usize) -> f64 {
        self.observations.len() as f64 / max_obs as f64
    }

    fn calc_score_average_stations(&self, astas: &[f64], nsta_max: usize) -> f64 {
        let max_possible = (nsta_max - 1) as f64;
        self.pointing_vectors_start
            .iter()
            .map(|pv| astas[pv.staid] * self.n_obs_of_station(pv.staid) as f64 / max_possible)
            .sum()
    }

    fn calc_score_average_sources(&self, asrcs: &[f64], nbls_max: usize) -> f64 {
        asrcs[self.srcid] * self.observations.len() as f64 / nbls_max as f64
    }

    fn calc_score_average_baselines(&self, abls: &[f64]) -> f64 {
        self.observations.iter().map(|obs| abls[obs.blid]).sum()
    }

    fn calc_score_duration(&self, nsta_max: usize, min_time: u32, max_time: u32) -> f64 {
        let duration = self.times.scan_duration();
        let score = if max_time == min_time {
            1.0
        } else {
            1.0 - f64::from(duration.saturating_sub(min_time)) / f64::from(max_time - min_time)
        };
        score * self.nsta as f64 / nsta_max as f64
    }

    fn calc_score_idle_time(&self, idle_score: &[f64]) -> f64 {
        self.pointing_vectors_start
            .iter()
            .map(|pv| idle_score[pv.staid])
            .sum()
    }

    fn calc_score_low_declination(&self, nobs_max: usize, weights: &WeightFactors) -> f64 {
        let dec = self.pointing_vectors_start[0].dc;
        ramp(
            dec,
            weights.declination_start_weight,
            weights.declination_full_weight,
        ) * self.observations.len() as f64
            / nobs_max as f64
    }

    fn calc_score_low_elevation(&self, nsta_max: usize, weights: &WeightFactors) -> f64 {
        let sum: f64 = self
            .pointing_vectors_start
            .iter()
            .map(|pv| {
                ramp(
                    pv.el,
                    weights.low_elevation_start_weight,
                    weights.low_elevation_full_weight,
                )
            })
            .sum();
        sum / nsta_max as f64
    }

    /// The additive score components.
    fn calc_score_first_part(
        &self,
        inputs: &ScoreInputs,
        network: &Network,
        _source: &Source,
    ) -> f64 {
        let nsta_max = network.nsta();
        let nbls_max = network.nbls();
        let weights = inputs.weights;
        let mut score = 0.0;

        if weights.number_of_observations != 0.0 {
            score += self.calc_score_number_of_observations(nbls_max) * weights.number_of_observations;
        }
        if weights.average_sources != 0.0 && !inputs.asrcs.is_empty() {
            score += self.calc_score_average_sources(inputs.asrcs, nbls_max) * weights.average_sources;
        }
        if weights.average_stations != 0.0 && !inputs.astas.is_empty() {
            score += self.calc_score_average_stations(inputs.astas, nsta_max) * weights.average_stations;
        }
        if weights.average_baselines != 0.0 && !inputs.abls.is_empty() {
            score += self.calc_score_average_baselines(inputs.abls) * weights.average_baselines;
        }
        if weights.duration != 0.0 {
            score += self.calc_score_duration(nsta_max, inputs.min_time, inputs.max_time)
                * weights.duration;
        }
        if weights.idle_time != 0.0 {
            score += self.calc_score_idle_time(inputs.idle_score) * weights.idle_time;
        }
        if weights.low_declination != 0.0 {
            score += self.calc_score_low_declination(nbls_max, weights) * weights.low_declination;
        }
        if weights.low_elevation != 0.0 {
            score += self.calc_score_low_elevation(nsta_max, weights) * weights.low_elevation;
        }
        score
    }

    /// The multiplicative score adjustments: try-to-focus, the custom
    /// scan sequence and the entity weights.
    fn calc_score_second_part(&self, mut score: f64, network: &Network, source: &Source, inputs: &ScoreInputs) -> f64 {
        let para = source.parameters();
        if para.try_to_focus_if_observed_once && source.n_scans() > 0 {
            if let (Some(factor), Some(occurrence), Some(focus_type)) = (
                para.try_to_focus_factor,
                para.try_to_focus_occurrence,
                para.try_to_focus_type,
            ) {
                use crate::source::{TryToFocusOccurrence, TryToFocusType};
                let factor = match occurrence {
                    TryToFocusOccurrence::Once => factor,
                    TryToFocusOccurrence::PerScan => f64::from(source.n_scans()) * factor,
                };
                match focus_type {
                    TryToFocusType::Additive => score += factor,
                    TryToFocusType::Multiplicative => score *= factor,
                }
            }
        }

        score *= inputs.sequence_factor;

        let station_weights: f64 = self
            .pointing_vectors_start
            .iter()
            .map(|pv| network.station(pv.staid).parameters().weight)
            .product();
        let baseline_weights: f64 = self
            .observations
            .iter()
            .map(|obs| network.baseline_by_id(obs.blid).parameters().weight)
            .product();

        score * para.weight * station_weights * baseline_weights
    }

    /// Score a single-source scan, saving each station's sky-coverage
    /// contribution for reuse by subnetting pairs.
    pub fn calc_score(
        &mut self,
        inputs: &ScoreInputs,
        network: &Network,
        source: &Source,
        staids_to_sky_coverage_score: &mut HashMap<usize, f64>,
    ) {
        let mut score = self.calc_score_first_part(inputs, network, source);
        if inputs.weights.sky_coverage != 0.0 {
            score += network.calc_score_sky_coverage_saving(
                &self.pointing_vectors_start,
                staids_to_sky_coverage_score,
            ) * inputs.weights.sky_coverage;
        }
        self.score = self.calc_score_second_part(score, network, source, inputs);
    }

    /// Score a subnetting half, reusing the sky-coverage contributions
    /// computed for the corresponding single-source scan.
    pub fn calc_score_subnetting(
        &mut self,
        inputs: &ScoreInputs,
        network: &Network,
        source: &Source,
        staids_to_sky_coverage_score: &HashMap<usize, f64>,
    ) {
        let mut score = self.calc_score_first_part(inputs, network, source);
        if inputs.weights.sky_coverage != 0.0 {
            score += network.calc_score_sky_coverage_subnetting(
                &self.pointing_vectors_start,
                staids_to_sky_coverage_score,
            ) * inputs.weights.sky_coverage;
        }
        self.score = self.calc_score_second_part(score, network, source, inputs);
    }
}
