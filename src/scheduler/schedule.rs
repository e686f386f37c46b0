// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The session output: every committed scan plus per-entity statistics,
//! all serializable for a session-replayable record.

use serde::Serialize;

use crate::scan::Scan;
use crate::source::SourceStatistics;
use crate::station::{BaselineStatistics, StationStatistics};

#[derive(Clone, Debug, Serialize)]
pub struct StationRecord {
    pub name: String,
    pub code: String,
    pub n_scans: u32,
    pub n_obs: u32,
    pub statistics: StationStatistics,
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceRecord {
    pub name: String,
    pub n_scans: u32,
    pub n_obs: u64,
    pub statistics: SourceStatistics,
}

#[derive(Clone, Debug, Serialize)]
pub struct BaselineRecord {
    pub name: String,
    pub n_obs: u32,
    pub statistics: BaselineStatistics,
}

/// The finished session.
#[derive(Clone, Debug, Serialize)]
pub struct Schedule {
    /// All committed scans, ordered by observing start.
    pub scans: Vec<Scan>,
    pub stations: Vec<StationRecord>,
    pub sources: Vec<SourceRecord>,
    pub baselines: Vec<BaselineRecord>,
}

impl Schedule {
    pub fn n_scans(&self) -> usize {
        self.scans.len()
    }

    pub fn n_observations(&self) -> usize {
        self.scans.iter().map(Scan::n_obs).sum()
    }
}
