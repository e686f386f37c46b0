// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The candidate set of one scheduling decision.

A [Subcon] holds every single-source scan that is currently possible and,
when subnetting is enabled, every disjoint pair of them whose sources are
far enough apart. Candidates are seeded with slew estimates, ground
through the rigorous update (in parallel; candidates are independent and
all shared state is read-only here), scored, and the best one wins.
 */

use std::collections::HashMap;

use log::{debug, trace};
use rayon::prelude::*;

use crate::scan::{Scan, ScanContext, ScoreInputs, Timestamp};
use crate::scheduler::end_position::StationEndposition;
use crate::scheduler::ScanSequence;
use crate::source::SourceList;
use crate::station::Network;
use crate::weights::WeightFactors;

/// What the subcon picked: one scan, or a subnetting pair observed
/// simultaneously.
#[derive(Debug)]
pub enum Selection {
    Single(Scan),
    Subnetting(Scan, Scan),
}

impl Selection {
    pub fn scans(self) -> Vec<Scan> {
        match self {
            Selection::Single(scan) => vec![scan],
            Selection::Subnetting(scan1, scan2) => vec![scan1, scan2],
        }
    }
}

/// All candidate scans of one decision point.
#[derive(Debug, Default)]
pub struct Subcon {
    singles: Vec<Scan>,
    /// Sky-coverage contribution per station, one map per single scan,
    /// filled during scoring and reused by the pair scoring.
    sky_maps: Vec<HashMap<usize, f64>>,
    pairs: Vec<(Scan, Scan)>,
}

impl Subcon {
    pub fn new() -> Subcon {
        Subcon::default()
    }

    pub fn add_scan(&mut self, scan: Scan) {
        self.singles.push(scan);
    }

    pub fn n_singles(&self) -> usize {
        self.singles.len()
    }

    pub fn n_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn singles(&self) -> &[Scan] {
        &self.singles
    }

    pub fn pairs(&self) -> &[(Scan, Scan)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.pairs.is_empty()
    }

    /// Seed every candidate with slew estimates from the stations'
    /// current pointings and drop stations that cannot get there. Also
    /// enforces the per-station maximum wait.
    pub fn calc_start_times(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &SourceList,
        endposition: Option<&StationEndposition>,
    ) {
        let total_rate = ctx.mode.total_recording_rate();
        let mut kept = Vec::with_capacity(self.singles.len());

        'scans: for mut scan in self.singles.drain(..) {
            let source = &sources[scan.srcid()];

            let mut idx = 0;
            while idx < scan.nsta() {
                let staid = scan.station_id(idx);
                let station = network.station(staid);

                if let Some(ep) = endposition {
                    if !ep.station_possible(staid) {
                        if !scan.remove_station(idx, source, ctx.anchor) {
                            continue 'scans;
                        }
                        continue;
                    }
                }

                // Unwrap the candidate azimuth against the antenna's
                // current position before estimating the slew.
                let current_az = station.current_pointing().az;
                let unwrapped = {
                    let pv = scan.pointing_vector(idx, Timestamp::Start);
                    station.cable_wrap().unwrap_az_near(pv.az, current_az)
                };
                let slew = match unwrapped {
                    Some(az) => {
                        let pvs = scan.pointing_vectors_start_mut();
                        pvs[idx].az = az;
                        station.slew_time(&pvs[idx])
                    }
                    None => None,
                };

                let slew = slew.map(|s| {
                    s.max(station.min_slew_time_due_to_data_write_speed(
                        station.previous_observing_duration(),
                        total_rate,
                    ))
                });

                match slew {
                    Some(slew) => {
                        let para = station.parameters();
                        if para.first_scan {
                            scan.add_times(idx, 0, 0, 0);
                        } else {
                            scan.add_times(idx, para.system_delay, slew, para.preob);
                        }
                        idx += 1;
                    }
                    None => {
                        if !scan.remove_station(idx, source, ctx.anchor) {
                            continue 'scans;
                        }
                    }
                }
            }

            let mut max_idle: Vec<u32> = scan
                .station_ids()
                .iter()
                .map(|&staid| network.station(staid).parameters().max_wait)
                .collect();
            if !scan.check_idle_times(&mut max_idle, source, ctx.anchor) {
                continue 'scans;
            }

            kept.push(scan);
        }

        self.singles = kept;
    }

    /// Rigorously update every candidate in parallel; invalid candidates
    /// are dropped. Only reads shared state; commits happen later, on
    /// the scheduler.
    pub fn rigorous_update_all(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &SourceList,
        endposition: Option<&StationEndposition>,
    ) {
        let before = self.singles.len();
        let singles = std::mem::take(&mut self.singles);
        self.singles = singles
            .into_par_iter()
            .filter_map(|mut scan| {
                let source = &sources[scan.srcid()];
                if scan.rigorous_update(ctx, network, source, endposition) {
                    Some(scan)
                } else {
                    None
                }
            })
            .collect();
        trace!(
            "rigorous update kept {}/{} candidate scans",
            self.singles.len(),
            before
        );
    }

    /// Build subnetting pairs from the surviving single-source scans:
    /// for every admissible source pair, every disjoint partition of the
    /// shared stations that leaves both halves viable becomes a
    /// candidate pair with a common observing start.
    pub fn create_subnetting_scans(
        &mut self,
        ctx: &ScanContext,
        network: &Network,
        sources: &SourceList,
        subnetting_src_ids: &[Vec<usize>],
        endposition: Option<&StationEndposition>,
    ) {
        let srcid_to_single: HashMap<usize, usize> = self
            .singles
            .iter()
            .enumerate()
            .map(|(idx, scan)| (scan.srcid(), idx))
            .collect();

        let mut pairs = vec![];
        for scan1 in &self.singles {
            let srcid1 = scan1.srcid();
            for &srcid2 in &subnetting_src_ids[srcid1] {
                let idx2 = match srcid_to_single.get(&srcid2) {
                    Some(&idx) => idx,
                    None => continue,
                };
                let scan2 = &self.singles[idx2];

                let ids1 = scan1.station_ids();
                let ids2 = scan2.station_ids();
                let unique1: Vec<usize> =
                    ids1.iter().filter(|id| !ids2.contains(id)).copied().collect();
                let unique2: Vec<usize> =
                    ids2.iter().filter(|id| !ids1.contains(id)).copied().collect();
                let intersection: Vec<usize> =
                    ids1.iter().filter(|id| ids2.contains(id)).copied().collect();

                let source1 = &sources[srcid1];
                let source2 = &sources[srcid2];

                for assignment in 0u32..(1 << intersection.len()) {
                    let mut half1 = unique1.clone();
                    let mut half2 = unique2.clone();
                    for (bit, &staid) in intersection.iter().enumerate() {
                        if assignment & (1 << bit) == 0 {
                            half1.push(staid);
                        } else {
                            half2.push(staid);
                        }
                    }

                    if half1.len() < source1.parameters().min_number_of_stations
                        || half2.len() < source2.parameters().min_number_of_stations
                    {
                        continue;
                    }

                    let mut copy1 = match scan1.copy_scan(&half1, source1) {
                        Some(scan) => scan,
                        None => continue,
                    };
                    let mut copy2 = match scan2.copy_scan(&half2, source2) {
                        Some(scan) => scan,
                        None => continue,
                    };

                    if !copy1.rigorous_update(ctx, network, source1, endposition)
                        || !copy2.rigorous_update(ctx, network, source2, endposition)
                    {
                        continue;
                    }

                    if !synchronize_pair(&mut copy1, &mut copy2, network) {
                        continue;
                    }

                    pairs.push((copy1, copy2));
                }
            }
        }

        debug!("created {} subnetting candidates", pairs.len());
        self.pairs = pairs;
    }

    /// Score every candidate. Single scans save their per-station
    /// sky-coverage contributions; the pair halves reuse them.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_scores(
        &mut self,
        network: &Network,
        sources: &SourceList,
        weights: &WeightFactors,
        astas: &[f64],
        asrcs: &[f64],
        abls: &[f64],
        idle_score: &[f64],
        sequence: Option<&ScanSequence>,
    ) {
        let (min_time, max_time) = self.min_max_time();

        self.sky_maps = vec![HashMap::new(); self.singles.len()];
        for (scan, sky_map) in self.singles.iter_mut().zip(self.sky_maps.iter_mut()) {
            let source = &sources[scan.srcid()];
            let inputs = ScoreInputs {
                astas,
                asrcs,
                abls,
                min_time,
                max_time,
                idle_score,
                weights,
                sequence_factor: sequence.map_or(1.0, |s| s.factor(scan.srcid())),
            };
            scan.calc_score(&inputs, network, source, sky_map);
        }

        let srcid_to_single: HashMap<usize, usize> = self
            .singles
            .iter()
            .enumerate()
            .map(|(idx, scan)| (scan.srcid(), idx))
            .collect();
        let empty = HashMap::new();
        for (scan1, scan2) in &mut self.pairs {
            for scan in [&mut *scan1, &mut *scan2] {
                let source = &sources[scan.srcid()];
                let sky_map = srcid_to_single
                    .get(&scan.srcid())
                    .map(|&idx| &self.sky_maps[idx])
                    .unwrap_or(&empty);
                let inputs = ScoreInputs {
                    astas,
                    asrcs,
                    abls,
                    min_time,
                    max_time,
                    idle_score,
                    weights,
                    sequence_factor: sequence.map_or(1.0, |s| s.factor(scan.srcid())),
                };
                scan.calc_score_subnetting(&inputs, network, source, sky_map);
            }
        }
    }

    fn min_max_time(&self) -> (u32, u32) {
        let mut min_time = u32::MAX;
        let mut max_time = 0;
        for scan in self
            .singles
            .iter()
            .chain(self.pairs.iter().flat_map(|(a, b)| [a, b]))
        {
            let duration = scan.times().scan_duration();
            min_time = min_time.min(duration);
            max_time = max_time.max(duration);
        }
        if min_time == u32::MAX {
            (0, 0)
        } else {
            (min_time, max_time)
        }
    }

    /// The best candidate, deterministically: highest score, then lowest
    /// source id, then earliest end of observing.
    pub fn select_best(self) -> Option<Selection> {
        #[derive(PartialEq)]
        struct Key {
            score: f64,
            srcid: usize,
            end: u32,
        }
        impl Key {
            fn better_than(&self, other: &Key) -> bool {
                if self.score != other.score {
                    return self.score > other.score;
                }
                if self.srcid != other.srcid {
                    return self.srcid < other.srcid;
                }
                self.end < other.end
            }
        }

        let mut best: Option<(Key, Selection)> = None;

        for scan in self.singles {
            let key = Key {
                score: scan.score(),
                srcid: scan.srcid(),
                end: scan.times().observing_end(),
            };
            if best.as_ref().map(|(k, _)| key.better_than(k)).unwrap_or(true) {
                best = Some((key, Selection::Single(scan)));
            }
        }

        for (scan1, scan2) in self.pairs {
            let key = Key {
                score: scan1.score() + scan2.score(),
                srcid: scan1.srcid().min(scan2.srcid()),
                end: scan1.times().observing_end().max(scan2.times().observing_end()),
            };
            if best.as_ref().map(|(k, _)| key.better_than(k)).unwrap_or(true) {
                best = Some((key, Selection::Subnetting(scan1, scan2)));
            }
        }

        best.map(|(_, selection)| selection)
    }
}

/// Bring both halves of a subnetting pair to an identical common
/// observing start by delaying the earlier one, provided no station's
/// wait limit is violated.
fn synchronize_pair(scan1: &mut Scan, scan2: &mut Scan, network: &Network) -> bool {
    let start1 = scan1.times().observing_start();
    let start2 = scan2.times().observing_start();

    let (earlier, delta) = if start1 < start2 {
        (&mut *scan1, start2 - start1)
    } else {
        (&mut *scan2, start1 - start2)
    };
    if delta > 0 {
        earlier.shift_observing_start(delta);
        for idx in 0..earlier.nsta() {
            let staid = earlier.station_id(idx);
            if earlier.times().idle_duration(idx) > network.station(staid).parameters().max_wait {
                return false;
            }
        }
    }
    true
}
