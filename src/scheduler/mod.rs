// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The scheduler: the outer greedy loop.

Every iteration fires pending parameter events, enumerates all currently
possible scans into a subcon, rigorously updates and scores them, commits
the best candidate (or subnetting pair), packs fill-in scans into the
idle gaps, and advances the session clock. Two runs over identical
inputs produce identical schedules; every tie is broken
deterministically.
 */

pub mod end_position;
mod schedule;

pub use schedule::{BaselineRecord, Schedule, SourceRecord, StationRecord};

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::astro::{AstronomicalParameters, SessionTime};
use crate::constants::DEG2RAD;
use crate::error::{ConfigurationError, SchedulerError};
use crate::mode::ObservingMode;
use crate::scan::{
    AlignmentAnchor, Observation, PointingVector, Scan, ScanContext, ScanType, Timestamp,
};
use crate::source::SourceList;
use crate::station::Network;
use crate::subcon::{Selection, Subcon};
use crate::weights::WeightFactors;
use end_position::StationEndposition;

/// Subnetting setup.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SubnettingParameters {
    /// Two sources must be at least this far apart to be observed
    /// simultaneously \[radians\]
    pub min_source_angle: f64,
}

impl Default for SubnettingParameters {
    fn default() -> SubnettingParameters {
        SubnettingParameters {
            min_source_angle: 120.0 * DEG2RAD,
        }
    }
}

/// Knobs of the outer loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerParameters {
    pub alignment_anchor: AlignmentAnchor,
    pub subnetting: Option<SubnettingParameters>,
    /// Pack fill-in scans into idle gaps between selection and commit.
    pub fillin_mode_during_scan_selection: bool,
    /// Network-wide lower bound on stations per scan.
    pub min_stations_per_scan: usize,
    /// How far to advance when no candidate survives \[s\]
    pub time_slice: u32,
    /// Give up after this many consecutive empty slices.
    pub max_consecutive_empty_slices: u32,
    /// Fixed observing duration of calibrator-block scans \[s\]
    pub calibrator_scan_length: Option<u32>,
}

impl Default for SchedulerParameters {
    fn default() -> SchedulerParameters {
        SchedulerParameters {
            alignment_anchor: AlignmentAnchor::Start,
            subnetting: None,
            fillin_mode_during_scan_selection: false,
            min_stations_per_scan: 2,
            time_slice: 60,
            max_consecutive_empty_slices: 10,
            calibrator_scan_length: None,
        }
    }
}

/// A custom scan sequence: every `cadence`-th selection has a target
/// source set whose members get a large score boost and everything else
/// a matching penalty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanSequence {
    cadence: u32,
    modulo: u32,
    target_sources: HashMap<u32, Vec<usize>>,
}

impl ScanSequence {
    pub fn new(cadence: u32, target_sources: HashMap<u32, Vec<usize>>) -> ScanSequence {
        ScanSequence {
            cadence: cadence.max(1),
            modulo: 0,
            target_sources,
        }
    }

    fn new_scan(&mut self) {
        self.modulo = (self.modulo + 1) % self.cadence;
    }

    /// Score factor for a source in the current cadence bucket.
    pub fn factor(&self, srcid: usize) -> f64 {
        match self.target_sources.get(&self.modulo) {
            Some(targets) => {
                if targets.contains(&srcid) {
                    100.0
                } else {
                    0.01
                }
            }
            None => 1.0,
        }
    }
}

/// The scheduling core. Owns all session state; [Scheduler::run]
/// consumes the session and produces a [Schedule].
pub struct Scheduler {
    network: Network,
    sources: SourceList,
    mode: ObservingMode,
    weights: WeightFactors,
    session: SessionTime,
    astro: AstronomicalParameters,
    parameters: SchedulerParameters,
    scan_sequence: Option<ScanSequence>,

    /// Admissible partner sources for subnetting, per source.
    subnetting_src_ids: Vec<Vec<usize>>,

    scans: Vec<Scan>,
}

impl Scheduler {
    pub fn new(
        network: Network,
        sources: SourceList,
        mode: ObservingMode,
        weights: WeightFactors,
        session: SessionTime,
        parameters: SchedulerParameters,
        scan_sequence: Option<ScanSequence>,
    ) -> Result<Scheduler, SchedulerError> {
        network.validate()?;
        sources.validate()?;
        validate_cross_references(&network, &sources, &mode)?;

        let astro = AstronomicalParameters::new(&session);

        // Admissible subnetting partners, evaluated once. Pairs are
        // stored only under the lower source id.
        let subnetting_src_ids = match parameters.subnetting {
            Some(subnetting) => {
                let n = sources.len();
                let mut ids = vec![vec![]; n];
                for i in 0..n {
                    for j in (i + 1)..n {
                        if sources[i].angle_distance(&sources[j], 0) >= subnetting.min_source_angle {
                            ids[i].push(j);
                        }
                    }
                }
                ids
            }
            None => vec![vec![]; sources.len()],
        };

        Ok(Scheduler {
            network,
            sources,
            mode,
            weights,
            session,
            astro,
            parameters,
            scan_sequence,
            subnetting_src_ids,
            scans: vec![],
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn sources(&self) -> &SourceList {
        &self.sources
    }

    fn scan_context(&self) -> ScanContext {
        ScanContext {
            session: &self.session,
            astro: &self.astro,
            mode: &self.mode,
            anchor: self.parameters.alignment_anchor,
            calibrator_scan_length: self.parameters.calibrator_scan_length,
        }
    }

    /// Run the whole session and produce the schedule.
    pub fn run(&mut self) -> Schedule {
        let duration = self.session.duration();
        let mut current_time = 0u32;
        let mut consecutive_empty = 0u32;

        while current_time < duration {
            self.check_for_new_events(current_time);

            let subcon = self.build_subcon(current_time, ScanType::Standard, None, true, &[]);
            let selection = subcon.select_best();

            let best_scans = match selection {
                Some(selection) => {
                    let ctx = self.scan_context();
                    let mut scans = selection.scans();
                    scans.retain_mut(|scan| {
                        let source = &self.sources[scan.srcid()];
                        scan.prepare_for_scan_end(&ctx, &self.network, source, duration)
                    });
                    scans
                }
                None => vec![],
            };

            if best_scans.is_empty() {
                consecutive_empty += 1;
                if consecutive_empty >= self.parameters.max_consecutive_empty_slices {
                    warn!(
                        "no candidate scans for {} consecutive slices; ending session at {} s",
                        consecutive_empty, current_time
                    );
                    break;
                }
                current_time += self.parameters.time_slice;
                continue;
            }
            consecutive_empty = 0;

            // Fill idle gaps before the selected scans begin.
            if self.parameters.fillin_mode_during_scan_selection {
                self.start_fillin_mode(&best_scans, current_time);
            }

            let mut next_time = u32::MAX;
            for scan in best_scans {
                for idx in 0..scan.nsta() {
                    let staid = scan.station_id(idx);
                    let postob = self.network.station(staid).parameters().postob;
                    next_time =
                        next_time.min(scan.times().observing_time(idx, Timestamp::End) + postob);
                }
                let committed = self.update(scan);
                self.apply_tagalong(committed);
            }
            if let Some(sequence) = &mut self.scan_sequence {
                sequence.new_scan();
            }

            current_time = if next_time > current_time {
                next_time
            } else {
                current_time + self.parameters.time_slice
            };
        }

        info!(
            "session finished with {} scans and {} observations",
            self.scans.len(),
            self.scans.iter().map(Scan::n_obs).sum::<usize>()
        );
        self.finalize()
    }

    /// Fire all station, source and baseline events up to `time`, in
    /// that order.
    fn check_for_new_events(&mut self, time: u32) -> bool {
        let mut hard_break = false;
        for station in self.network.stations_mut() {
            station.check_for_new_event(time, &mut hard_break);
        }
        for source in self.sources.iter_mut() {
            source.check_for_new_event(time, &mut hard_break);
        }
        for baseline in self.network.baselines_mut() {
            baseline.check_for_new_event(time, &mut hard_break);
        }
        hard_break
    }

    /// Enumerate, update and score all candidates at a decision point.
    fn build_subcon(
        &self,
        time: u32,
        scan_type: ScanType,
        endposition: Option<&StationEndposition>,
        allow_subnetting: bool,
        exclude_sources: &[usize],
    ) -> Subcon {
        let ctx = self.scan_context();

        let mut subcon = self.all_visible_scans(time, scan_type, endposition, exclude_sources);
        subcon.calc_start_times(&ctx, &self.network, &self.sources, endposition);
        subcon.rigorous_update_all(&ctx, &self.network, &self.sources, endposition);

        if allow_subnetting && self.parameters.subnetting.is_some() {
            subcon.create_subnetting_scans(
                &ctx,
                &self.network,
                &self.sources,
                &self.subnetting_src_ids,
                endposition,
            );
        }

        let astas = deficit_scores(self.network.stations().iter().map(|s| u64::from(s.n_obs())));
        let asrcs = deficit_scores(self.sources.iter().map(|s| s.n_obs()));
        let abls = deficit_scores(self.network.baselines().iter().map(|b| u64::from(b.n_obs())));
        let idle_score = self.idle_scores(time);

        subcon.generate_scores(
            &self.network,
            &self.sources,
            &self.weights,
            &astas,
            &asrcs,
            &abls,
            &idle_score,
            self.scan_sequence.as_ref(),
        );
        subcon
    }

    /// The cheap enumeration pass: every available source paired with
    /// every station that can see it right now.
    fn all_visible_scans(
        &self,
        time: u32,
        scan_type: ScanType,
        endposition: Option<&StationEndposition>,
        exclude_sources: &[usize],
    ) -> Subcon {
        let mut subcon = Subcon::new();

        for srcid in 0..self.sources.len() {
            let source = &self.sources[srcid];
            let para = source.parameters();

            if exclude_sources.contains(&srcid) {
                continue;
            }
            if !para.available || !para.global_available {
                continue;
            }
            if scan_type == ScanType::Fillin && !para.available_for_fillin_mode {
                continue;
            }
            if source.n_scans() >= para.max_number_of_scans {
                continue;
            }
            if source.n_scans() > 0
                && time.saturating_sub(source.last_scan_time()) < para.min_repeat
            {
                continue;
            }
            if source.max_flux() < para.min_flux {
                continue;
            }
            if source.sun_distance(time, &self.astro) < para.min_sun_distance {
                continue;
            }

            let mut pointing_vectors = vec![];
            let mut end_of_last_scan = vec![];
            for (staid, station) in self.network.stations().iter().enumerate() {
                if !station.available() || station.parameters().tagalong {
                    continue;
                }
                if station.parameters().ignore_sources.contains(&srcid) {
                    continue;
                }
                if para.ignore_stations.contains(&staid) {
                    continue;
                }
                if let Some(ep) = endposition {
                    if !ep.station_possible(staid) {
                        continue;
                    }
                }

                let mut pv = PointingVector::new(staid, srcid);
                pv.time = time.max(station.current_time());
                station.calc_az_el_simple(source, &mut pv, &self.session);
                if !station.is_visible(&pv, para.min_elevation) {
                    continue;
                }

                pointing_vectors.push(pv);
                // A station may have been idle since long before this
                // decision point; it still cannot start in the past.
                end_of_last_scan.push(station.current_time().max(time));
            }

            let min_stations = para
                .min_number_of_stations
                .max(self.parameters.min_stations_per_scan);
            if pointing_vectors.len() < min_stations {
                continue;
            }
            if !para
                .required_stations
                .iter()
                .all(|required| pointing_vectors.iter().any(|pv| pv.staid == *required))
            {
                continue;
            }

            subcon.add_scan(Scan::new(pointing_vectors, end_of_last_scan, scan_type));
        }

        debug!(
            "{} single-source candidates at {} s",
            subcon.n_singles(),
            time
        );
        subcon
    }

    /// Idle score per station: how long it has been waiting, in units
    /// of the configured interval.
    fn idle_scores(&self, time: u32) -> Vec<f64> {
        self.network
            .stations()
            .iter()
            .map(|station| {
                if station.parameters().first_scan {
                    0.0
                } else {
                    f64::from(time.saturating_sub(station.current_time()))
                        / f64::from(self.weights.idle_time_interval)
                }
            })
            .collect()
    }

    /// Commit a scan: advance stations, log sky coverage, update source
    /// and baseline counters and statistics. Returns the committed
    /// scan's index.
    fn update(&mut self, mut scan: Scan) -> usize {
        scan.update_observing_time();
        for idx in 0..scan.nsta() {
            let pv_start = *scan.pointing_vector(idx, Timestamp::Start);
            let pv_end = *scan.pointing_vector(idx, Timestamp::End);
            let nobs = scan.n_obs_of_station(pv_start.staid);
            self.network
                .station_mut(pv_start.staid)
                .update(nobs, &pv_start, &pv_end);
            self.network.update_sky_coverage(&pv_start, &pv_end);
        }

        let srcid = scan.srcid();
        let observing_start = scan.times().observing_start();
        let observing_end = scan.times().observing_end();
        {
            let source = self.sources.get_mut(srcid);
            source.update(scan.nsta(), scan.n_obs(), observing_end, true);
            source.record_statistics(observing_start, observing_end - observing_start);
        }
        self.redistribute_min_repeat(srcid, observing_end);

        for obs in scan.observations() {
            self.network
                .baseline_by_id_mut(obs.blid)
                .update(obs.start_time, obs.observing_time);
        }

        info!(
            "scan {:>4}: source {:<10} at {:>6} s, {} stations, {} observations",
            self.scans.len(),
            self.sources[srcid].name(),
            observing_start,
            scan.nsta(),
            scan.n_obs()
        );

        self.scans.push(scan);
        self.scans.len() - 1
    }

    /// Spread the remaining scans of an observe-x-times-evenly source
    /// over the rest of the session.
    fn redistribute_min_repeat(&mut self, srcid: usize, now: u32) {
        let duration = self.session.duration();
        let source = self.sources.get_mut(srcid);
        let para = source.parameters();
        if let Some(x) = para.try_to_observe_x_times_evenly_distributed {
            let backup = para.try_to_observe_x_times_min_repeat.unwrap_or(0);
            let nscans = source.n_scans();
            if nscans < x {
                let remaining = x - nscans;
                let new_repeat = duration.saturating_sub(now) / remaining;
                source.parameters_mut().min_repeat = new_repeat.max(backup);
            }
        }
    }

    /// Pack fill-in scans into the gaps before the selected scans
    /// begin, never delaying any station's next commitment. The pending
    /// scans' own sources are off limits: observing one now would break
    /// its repeat spacing the moment the pending scan is committed.
    fn start_fillin_mode(&mut self, best_scans: &[Scan], current_time: u32) {
        let pending_sources: Vec<usize> = best_scans.iter().map(Scan::srcid).collect();
        loop {
            let scan_refs: Vec<&Scan> = best_scans.iter().collect();
            let endposition = StationEndposition::new(&scan_refs, self.network.stations());
            if endposition.n_possible_stations() < self.parameters.min_stations_per_scan {
                break;
            }

            let subcon = self.build_subcon(
                current_time,
                ScanType::Fillin,
                Some(&endposition),
                false,
                &pending_sources,
            );
            match subcon.select_best() {
                Some(Selection::Single(scan)) => {
                    debug!(
                        "fill-in scan of source {} with {} stations",
                        scan.srcid(),
                        scan.nsta()
                    );
                    self.update(scan);
                }
                _ => break,
            }
        }
    }

    /// Append tagalong stations to a freshly committed scan.
    fn apply_tagalong(&mut self, scan_idx: usize) {
        let additions = {
            let ctx = self.scan_context();
            let scan = &self.scans[scan_idx];
            let srcid = scan.srcid();
            let source = &self.sources[srcid];
            let observing_start = scan.times().observing_start();
            let observing_end = scan.times().observing_end();

            let mut additions = vec![];
            for (staid, station) in self.network.stations().iter().enumerate() {
                if !station.parameters().tagalong || !station.available() {
                    continue;
                }
                if scan.find_idx_of_station_id(staid).is_some() {
                    continue;
                }
                if source.parameters().ignore_stations.contains(&staid)
                    || station.parameters().ignore_sources.contains(&srcid)
                {
                    continue;
                }

                let mut pv_start = PointingVector::new(staid, srcid);
                pv_start.time = observing_start;
                station.calc_az_el_rigorous(source, &mut pv_start, ctx.session, ctx.astro);
                if !station.is_visible(&pv_start, source.parameters().min_elevation) {
                    continue;
                }
                let unwrapped = station
                    .cable_wrap()
                    .unwrap_az_near(pv_start.az, station.current_pointing().az);
                pv_start.az = match unwrapped {
                    Some(az) => az,
                    None => continue,
                };

                let slew = match station.slew_time(&pv_start) {
                    Some(slew) => slew,
                    None => continue,
                };
                let para = station.parameters();
                if !para.first_scan
                    && station.current_time() + para.system_delay + slew + para.preob
                        > observing_start
                {
                    continue;
                }

                let mut pv_end = pv_start;
                pv_end.time = observing_end;
                station.calc_az_el_rigorous(source, &mut pv_end, ctx.session, ctx.astro);
                let unwrapped = station.cable_wrap().unwrap_az_near(pv_end.az, pv_start.az);
                pv_end.az = match unwrapped {
                    Some(az) => az,
                    None => continue,
                };
                if (pv_end.az - pv_start.az).abs() > crate::constants::FRAC_PI_2
                    || !station.is_visible(&pv_end, source.parameters().min_elevation)
                {
                    continue;
                }

                let mut observations = vec![];
                for member_idx in 0..scan.nsta() {
                    let other = scan.station_id(member_idx);
                    let blid = self.network.blid(staid, other);
                    let baseline = self.network.baseline_by_id(blid);
                    if baseline.parameters().ignore
                        || source.parameters().ignore_baselines.contains(&blid)
                    {
                        continue;
                    }

                    let duration = scan
                        .times()
                        .observing_duration(member_idx)
                        .min(para.max_scan);
                    if duration < para.min_scan.max(baseline.parameters().min_scan) {
                        continue;
                    }

                    let (staid1, staid2) = if staid < other { (staid, other) } else { (other, staid) };
                    let mut obs = Observation::new(blid, staid1, staid2, srcid, observing_start);
                    obs.observing_time = duration;
                    observations.push(obs);
                }
                if observations.is_empty() {
                    continue;
                }

                additions.push((staid, pv_start, pv_end, observations, slew));
            }
            additions
        };

        for (staid, pv_start, pv_end, observations, slew) in additions {
            let nobs = observations.len();
            for obs in &observations {
                self.network
                    .baseline_by_id_mut(obs.blid)
                    .update(obs.start_time, obs.observing_time);
            }
            {
                let station = self.network.station(staid);
                self.scans[scan_idx].add_tagalong_station(
                    pv_start,
                    pv_end,
                    observations,
                    slew,
                    station,
                );
            }
            self.network.station_mut(staid).update(nobs, &pv_start, &pv_end);
            self.network.update_sky_coverage(&pv_start, &pv_end);
            debug!("tagalong station {staid} added to scan {scan_idx}");
        }
    }

    fn finalize(&mut self) -> Schedule {
        let mut scans = self.scans.clone();
        scans.sort_by_key(|scan| (scan.times().observing_start(), scan.srcid()));

        Schedule {
            scans,
            stations: self
                .network
                .stations()
                .iter()
                .map(|station| StationRecord {
                    name: station.name().to_string(),
                    code: station.code().to_string(),
                    n_scans: station.n_scans(),
                    n_obs: station.n_obs(),
                    statistics: station.statistics().clone(),
                })
                .collect(),
            sources: self
                .sources
                .iter()
                .map(|source| SourceRecord {
                    name: source.name().to_string(),
                    n_scans: source.n_scans(),
                    n_obs: source.n_obs(),
                    statistics: source.statistics().clone(),
                })
                .collect(),
            baselines: self
                .network
                .baselines()
                .iter()
                .map(|baseline| BaselineRecord {
                    name: baseline.name().to_string(),
                    n_obs: baseline.n_obs(),
                    statistics: baseline.statistics().clone(),
                })
                .collect(),
        }
    }
}

/// Deficit score over observation counters: 1 for the least-observed
/// entity, 0 for the most-observed, 0 everywhere when balanced.
fn deficit_scores(counts: impl Iterator<Item = u64>) -> Vec<f64> {
    let counts: Vec<u64> = counts.collect();
    let max = counts.iter().copied().max().unwrap_or(0);
    let min = counts.iter().copied().min().unwrap_or(0);
    if max == min {
        return vec![0.0; counts.len()];
    }
    counts
        .iter()
        .map(|&c| (max - c) as f64 / (max - min) as f64)
        .collect()
}

fn validate_cross_references(
    network: &Network,
    sources: &SourceList,
    mode: &ObservingMode,
) -> Result<(), ConfigurationError> {
    for station in network.stations() {
        for band in mode.bands() {
            if !station.equip().has_band(&band.name) {
                return Err(ConfigurationError::MissingBand {
                    band: band.name.clone(),
                    referrer: format!("station '{}'", station.name()),
                });
            }
        }
        for band in station.parameters().min_snr.keys() {
            if !mode.has_band(band) {
                return Err(ConfigurationError::MissingBand {
                    band: band.clone(),
                    referrer: format!("station '{}'", station.name()),
                });
            }
        }
    }

    for source in sources.iter() {
        for band in source.parameters().min_snr.keys() {
            if !mode.has_band(band) {
                return Err(ConfigurationError::MissingBand {
                    band: band.clone(),
                    referrer: format!("source '{}'", source.name()),
                });
            }
        }
        for list in [
            &source.parameters().ignore_stations,
            &source.parameters().required_stations,
        ] {
            for &staid in list {
                if staid >= network.nsta() {
                    return Err(ConfigurationError::UnknownStation {
                        name: source.name().to_string(),
                        station: format!("#{staid}"),
                    });
                }
            }
        }
    }
    Ok(())
}
