// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
End positions for fill-in scheduling.

Between selecting the next scans and actually reaching them, stations
have idle gaps. This structure answers, per station: is there a committed
pointing it must reach, by when, and is there enough slack for a fill-in
scan at all?
 */

use crate::scan::{PointingVector, Scan, Timestamp};
use crate::station::Station;

/// Assumed slew time when probing whether a fill-in scan could fit at
/// all \[s\]
const ASSUMED_SLEW_TIME: u32 = 5;

/// Per-station constraints derived from the committed next scans.
#[derive(Clone, Debug)]
pub struct StationEndposition {
    /// True if the station is not part of any of the next scans.
    station_unused: Vec<bool>,
    /// True if the station has enough slack for a fill-in scan.
    station_possible: Vec<bool>,
    /// The pointing the station must reach, if any.
    final_position: Vec<Option<PointingVector>>,
    /// Observing start of the station's next scan, or the overall
    /// earliest start for unused stations.
    required_time: Vec<u32>,
}

impl StationEndposition {
    /// Derive the constraints from the scans selected next and the
    /// current station states.
    pub fn new(best_scans: &[&Scan], stations: &[Station]) -> StationEndposition {
        let nsta = stations.len();

        let mut station_unused = vec![true; nsta];
        let mut station_possible = vec![true; nsta];
        let mut final_position: Vec<Option<PointingVector>> = vec![None; nsta];
        let mut earliest_scan_start = vec![u32::MAX; nsta];

        // Earliest commitment per station.
        for scan in best_scans {
            for idx in 0..scan.nsta() {
                let pv = scan.pointing_vector(idx, Timestamp::Start);
                let observing_start = scan.times().observing_time(idx, Timestamp::Start);
                if observing_start < earliest_scan_start[pv.staid] {
                    earliest_scan_start[pv.staid] = observing_start;
                    final_position[pv.staid] = Some(*pv);
                    station_unused[pv.staid] = false;
                }
            }
        }

        // Unused stations are bounded by the overall earliest start, so
        // a fill-in scan never delays the moment the selection loop
        // resumes.
        let total_earliest_scan_start =
            earliest_scan_start.iter().copied().min().unwrap_or(u32::MAX);
        let total_earliest_scan_start = if total_earliest_scan_start == u32::MAX {
            0
        } else {
            total_earliest_scan_start
        };

        let mut required_time = vec![0u32; nsta];
        let mut available_time = vec![0u32; nsta];
        for staid in 0..nsta {
            required_time[staid] = if station_unused[staid] {
                total_earliest_scan_start
            } else {
                earliest_scan_start[staid]
            };
            available_time[staid] =
                required_time[staid].saturating_sub(stations[staid].current_time());
        }

        for (staid, station) in stations.iter().enumerate() {
            let para = station.parameters();
            let needed = para.system_delay + ASSUMED_SLEW_TIME + para.preob + para.min_scan;
            if available_time[staid] < needed || !para.available {
                station_possible[staid] = false;
            }
        }

        StationEndposition {
            station_unused,
            station_possible,
            final_position,
            required_time,
        }
    }

    pub fn has_end_position(&self, staid: usize) -> bool {
        !self.station_unused[staid]
    }

    pub fn station_possible(&self, staid: usize) -> bool {
        self.station_possible[staid]
    }

    pub fn n_possible_stations(&self) -> usize {
        self.station_possible.iter().filter(|&&p| p).count()
    }

    pub fn final_position(&self, staid: usize) -> Option<&PointingVector> {
        self.final_position[staid].as_ref()
    }

    /// The time by which the station must be ready for its next
    /// commitment.
    pub fn required_endposition_time(&self, staid: usize) -> u32 {
        self.required_time[staid]
    }
}
