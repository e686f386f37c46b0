// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The station network: all stations, their precomputed baselines and the
sky-coverage clusters.

Stations and baselines are addressed by index; every cross-reference in
the scheduler is an index into the vectors owned here.
 */

use std::collections::HashMap;

use crate::constants::DEG2RAD;
use crate::error::ConfigurationError;
use crate::scan::PointingVector;
use crate::sky_coverage::SkyCoverage;
use crate::station::{Baseline, Station};

/// Stations closer than this share one sky coverage \[m\]
const DEFAULT_CLUSTER_DISTANCE: f64 = 1000.0;

/// Angular influence radius of a recorded pointing \[radians\]
const DEFAULT_INFLUENCE_DISTANCE: f64 = 30.0 * DEG2RAD;

/// Temporal influence of a recorded pointing \[s\]
const DEFAULT_INFLUENCE_TIME: f64 = 3600.0;

/// The assembled network.
#[derive(Clone, Debug)]
pub struct Network {
    stations: Vec<Station>,
    baselines: Vec<Baseline>,
    staids_to_blid: HashMap<(usize, usize), usize>,
    staids_to_dxyz: HashMap<(usize, usize), [f64; 3]>,

    sky_coverages: Vec<SkyCoverage>,
    staid_to_sky_coverage: Vec<usize>,
}

impl Network {
    /// Assemble a network with default sky-coverage parameters.
    pub fn new(stations: Vec<Station>) -> Result<Network, ConfigurationError> {
        Network::with_sky_coverage(
            stations,
            DEFAULT_CLUSTER_DISTANCE,
            DEFAULT_INFLUENCE_DISTANCE,
            DEFAULT_INFLUENCE_TIME,
        )
    }

    /// Assemble a network, clustering stations within
    /// `cluster_distance` metres into shared sky coverages.
    pub fn with_sky_coverage(
        stations: Vec<Station>,
        cluster_distance: f64,
        influence_distance: f64,
        influence_time: f64,
    ) -> Result<Network, ConfigurationError> {
        if stations.len() < 2 {
            return Err(ConfigurationError::TooFewStations(stations.len()));
        }
        for station in &stations {
            station.validate()?;
        }

        // Baselines and coordinate differences for every pair.
        let mut baselines = vec![];
        let mut staids_to_blid = HashMap::new();
        let mut staids_to_dxyz = HashMap::new();
        for i in 0..stations.len() {
            for j in (i + 1)..stations.len() {
                let name = format!("{}-{}", stations[i].code(), stations[j].code());
                staids_to_blid.insert((i, j), baselines.len());
                baselines.push(Baseline::new(&name, i, j));

                let pi = stations[i].position();
                let pj = stations[j].position();
                staids_to_dxyz.insert(
                    (i, j),
                    [pi.x() - pj.x(), pi.y() - pj.y(), pi.z() - pj.z()],
                );
            }
        }

        // Cluster co-located stations into shared sky coverages.
        let mut sky_coverages: Vec<SkyCoverage> = vec![];
        let mut staid_to_sky_coverage = vec![0; stations.len()];
        for (staid, station) in stations.iter().enumerate() {
            let mut assigned = None;
            for (covid, coverage) in sky_coverages.iter().enumerate() {
                if coverage.staids().iter().any(|&other| {
                    station.position().distance(stations[other].position()) < cluster_distance
                }) {
                    assigned = Some(covid);
                    break;
                }
            }
            match assigned {
                Some(covid) => {
                    staid_to_sky_coverage[staid] = covid;
                    let mut staids = sky_coverages[covid].staids().to_vec();
                    staids.push(staid);
                    sky_coverages[covid] =
                        SkyCoverage::new(staids, influence_distance, influence_time);
                }
                None => {
                    staid_to_sky_coverage[staid] = sky_coverages.len();
                    sky_coverages.push(SkyCoverage::new(
                        vec![staid],
                        influence_distance,
                        influence_time,
                    ));
                }
            }
        }

        Ok(Network {
            stations,
            baselines,
            staids_to_blid,
            staids_to_dxyz,
            sky_coverages,
            staid_to_sky_coverage,
        })
    }

    pub fn nsta(&self) -> usize {
        self.stations.len()
    }

    pub fn nbls(&self) -> usize {
        self.baselines.len()
    }

    pub fn station(&self, staid: usize) -> &Station {
        &self.stations[staid]
    }

    pub fn station_mut(&mut self, staid: usize) -> &mut Station {
        &mut self.stations[staid]
    }

    pub fn station_by_name(&self, name: &str) -> Option<&Station> {
        self.stations
            .iter()
            .find(|s| s.name() == name || s.code() == name)
    }

    pub fn station_index(&self, name: &str) -> Option<usize> {
        self.stations
            .iter()
            .position(|s| s.name() == name || s.code() == name)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn stations_mut(&mut self) -> &mut [Station] {
        &mut self.stations
    }

    pub fn baselines(&self) -> &[Baseline] {
        &self.baselines
    }

    pub fn baselines_mut(&mut self) -> &mut [Baseline] {
        &mut self.baselines
    }

    pub fn baseline(&self, staid1: usize, staid2: usize) -> &Baseline {
        &self.baselines[self.blid(staid1, staid2)]
    }

    pub fn baseline_by_id(&self, blid: usize) -> &Baseline {
        &self.baselines[blid]
    }

    pub fn baseline_by_id_mut(&mut self, blid: usize) -> &mut Baseline {
        &mut self.baselines[blid]
    }

    pub fn blid(&self, staid1: usize, staid2: usize) -> usize {
        let key = if staid1 < staid2 {
            (staid1, staid2)
        } else {
            (staid2, staid1)
        };
        self.staids_to_blid[&key]
    }

    /// Coordinate difference of a station pair \[m\]. The sign follows
    /// the canonical (lower id minus higher id) convention; all
    /// consumers are insensitive to it.
    pub fn dxyz(&self, staid1: usize, staid2: usize) -> [f64; 3] {
        let key = if staid1 < staid2 {
            (staid1, staid2)
        } else {
            (staid2, staid1)
        };
        self.staids_to_dxyz[&key]
    }

    pub fn sky_coverages(&self) -> &[SkyCoverage] {
        &self.sky_coverages
    }

    pub fn sky_coverage_of(&self, staid: usize) -> usize {
        self.staid_to_sky_coverage[staid]
    }

    /// Sky-coverage score of a set of pointings, normalized by the
    /// number of stations in the network.
    pub fn calc_score_sky_coverage(&self, pvs: &[PointingVector]) -> f64 {
        let mut score = 0.0;
        for pv in pvs {
            let covid = self.staid_to_sky_coverage[pv.staid];
            score += self.sky_coverages[covid].calc_score(pv);
        }
        score / self.nsta() as f64
    }

    /// Like [Network::calc_score_sky_coverage], additionally saving each
    /// station's contribution for reuse by subnetting scoring.
    pub fn calc_score_sky_coverage_saving(
        &self,
        pvs: &[PointingVector],
        staids_to_score: &mut HashMap<usize, f64>,
    ) -> f64 {
        let mut score = 0.0;
        for pv in pvs {
            let covid = self.staid_to_sky_coverage[pv.staid];
            let this = self.sky_coverages[covid].calc_score(pv);
            staids_to_score.insert(pv.staid, this);
            score += this;
        }
        score / self.nsta() as f64
    }

    /// Subnetting form: reuse the per-station scores computed for the
    /// single-source scan of the same source.
    pub fn calc_score_sky_coverage_subnetting(
        &self,
        pvs: &[PointingVector],
        staids_to_score: &HashMap<usize, f64>,
    ) -> f64 {
        let mut score = 0.0;
        for pv in pvs {
            score += staids_to_score.get(&pv.staid).copied().unwrap_or(1.0);
        }
        score / self.nsta() as f64
    }

    /// Record the pointings of a committed scan in the owning sky
    /// coverages.
    pub fn update_sky_coverage(&mut self, start: &PointingVector, end: &PointingVector) {
        let covid = self.staid_to_sky_coverage[start.staid];
        self.sky_coverages[covid].update(start, end);
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for station in &self.stations {
            station.validate()?;
        }
        for baseline in &self.baselines {
            baseline.validate()?;
        }
        Ok(())
    }
}
