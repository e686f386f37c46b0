// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Per-station time rows of a scan.

Each participating station walks through the same sequence of marks:

```text
endOfLastScan <= endOfFieldSystem <= endOfSlew <= endOfIdle
             <= endOfPreob (= start of observing) <= endOfObserving
```

The idle block between slew end and preob absorbs whatever it takes to
bring all stations to a common observing start.
 */

use serde::{Deserialize, Serialize};

use crate::scan::PointingVector;

/// How scan start times are aligned across stations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentAnchor {
    /// All stations start observing together.
    Start,
    /// All stations stop observing together.
    End,
    /// Every station starts as early as it can.
    Individual,
}

/// Marker for the two ends of an interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timestamp {
    Start,
    End,
}

/// The six time marks of every participating station, in seconds since
/// session start.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanTimes {
    end_of_last_scan: Vec<u32>,
    end_of_field_system: Vec<u32>,
    end_of_slew: Vec<u32>,
    end_of_idle: Vec<u32>,
    end_of_preob: Vec<u32>,
    end_of_observing: Vec<u32>,
}

impl ScanTimes {
    pub fn new(end_of_last_scan: Vec<u32>) -> ScanTimes {
        let n = end_of_last_scan.len();
        ScanTimes {
            end_of_field_system: end_of_last_scan.clone(),
            end_of_slew: end_of_last_scan.clone(),
            end_of_idle: end_of_last_scan.clone(),
            end_of_preob: end_of_last_scan.clone(),
            end_of_observing: vec![0; n],
            end_of_last_scan,
        }
    }

    pub fn len(&self) -> usize {
        self.end_of_last_scan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_of_last_scan.is_empty()
    }

    /// Charge the fixed overheads of one station: field-system time,
    /// slew time and preob.
    pub fn add_times(&mut self, idx: usize, field_system: u32, slew: u32, preob: u32) {
        self.end_of_field_system[idx] = self.end_of_last_scan[idx] + field_system;
        self.end_of_slew[idx] = self.end_of_field_system[idx] + slew;
        self.end_of_idle[idx] = self.end_of_slew[idx];
        self.end_of_preob[idx] = self.end_of_idle[idx] + preob;
        self.end_of_observing[idx] = self.end_of_preob[idx];
    }

    /// Drop one station's row.
    pub fn remove_element(&mut self, idx: usize, anchor: AlignmentAnchor) {
        self.end_of_last_scan.remove(idx);
        self.end_of_field_system.remove(idx);
        self.end_of_slew.remove(idx);
        self.end_of_idle.remove(idx);
        self.end_of_preob.remove(idx);
        self.end_of_observing.remove(idx);
        if !self.is_empty() {
            self.align_start_times(anchor);
        }
    }

    /// Replace a station's slew duration, keeping its slew start.
    pub fn update_slew_time(&mut self, idx: usize, new_slew: u32) {
        self.end_of_slew[idx] = self.end_of_field_system[idx] + new_slew;
    }

    pub fn slew_start(&self, idx: usize) -> u32 {
        self.end_of_field_system[idx]
    }

    pub fn slew_end(&self, idx: usize) -> u32 {
        self.end_of_slew[idx]
    }

    pub fn slew_ends(&self) -> &[u32] {
        &self.end_of_slew
    }

    /// Align the observing starts according to the anchor, preserving
    /// each station's preob and observing durations.
    pub fn align_start_times(&mut self, anchor: AlignmentAnchor) {
        match anchor {
            AlignmentAnchor::Start | AlignmentAnchor::End => {
                let start = self
                    .end_of_slew
                    .iter()
                    .zip(self.preob_durations())
                    .map(|(&slew, preob)| slew + preob)
                    .max()
                    .unwrap_or(0);
                for idx in 0..self.len() {
                    let preob = self.end_of_preob[idx] - self.end_of_idle[idx];
                    let observing =
                        self.end_of_observing[idx].saturating_sub(self.end_of_preob[idx]);
                    self.end_of_idle[idx] = start - preob;
                    self.end_of_preob[idx] = start;
                    self.end_of_observing[idx] = start + observing;
                }
            }
            AlignmentAnchor::Individual => {
                for idx in 0..self.len() {
                    let preob = self.end_of_preob[idx] - self.end_of_idle[idx];
                    let observing =
                        self.end_of_observing[idx].saturating_sub(self.end_of_preob[idx]);
                    self.end_of_idle[idx] = self.end_of_slew[idx];
                    self.end_of_preob[idx] = self.end_of_idle[idx] + preob;
                    self.end_of_observing[idx] = self.end_of_preob[idx] + observing;
                }
            }
        }
    }

    /// Extract the rows of a subset of stations, by row index.
    pub(crate) fn subset(&self, indices: &[usize]) -> ScanTimes {
        let pick = |v: &Vec<u32>| indices.iter().map(|&i| v[i]).collect();
        ScanTimes {
            end_of_last_scan: pick(&self.end_of_last_scan),
            end_of_field_system: pick(&self.end_of_field_system),
            end_of_slew: pick(&self.end_of_slew),
            end_of_idle: pick(&self.end_of_idle),
            end_of_preob: pick(&self.end_of_preob),
            end_of_observing: pick(&self.end_of_observing),
        }
    }

    fn preob_durations(&self) -> impl Iterator<Item = u32> + '_ {
        self.end_of_preob
            .iter()
            .zip(self.end_of_idle.iter())
            .map(|(&p, &i)| p - i)
    }

    /// Apply per-station observing durations. With the `End` anchor all
    /// stations are shifted so that they stop together.
    pub fn set_observing_times(&mut self, durations: &[u32], anchor: AlignmentAnchor) {
        debug_assert_eq!(durations.len(), self.len());
        match anchor {
            AlignmentAnchor::Start | AlignmentAnchor::Individual => {
                for idx in 0..self.len() {
                    self.end_of_observing[idx] = self.end_of_preob[idx] + durations[idx];
                }
            }
            AlignmentAnchor::End => {
                let end = self
                    .end_of_preob
                    .iter()
                    .zip(durations)
                    .map(|(&start, &dur)| start + dur)
                    .max()
                    .unwrap_or(0);
                for idx in 0..self.len() {
                    let preob = self.end_of_preob[idx] - self.end_of_idle[idx];
                    self.end_of_observing[idx] = end;
                    self.end_of_preob[idx] = end - durations[idx];
                    self.end_of_idle[idx] = self.end_of_preob[idx] - preob;
                }
            }
        }
    }

    /// One fixed observing duration for every station.
    pub fn set_fixed_observing_time(&mut self, duration: u32, anchor: AlignmentAnchor) {
        let durations = vec![duration; self.len()];
        self.set_observing_times(&durations, anchor);
    }

    /// Delay every station's observing window by `delta` seconds,
    /// growing the idle block. Used to synchronize the halves of a
    /// subnetting pair.
    pub fn shift_observing_start(&mut self, delta: u32) {
        for idx in 0..self.len() {
            self.end_of_idle[idx] += delta;
            self.end_of_preob[idx] += delta;
            self.end_of_observing[idx] += delta;
        }
    }

    pub fn observing_time(&self, idx: usize, ts: Timestamp) -> u32 {
        match ts {
            Timestamp::Start => self.end_of_preob[idx],
            Timestamp::End => self.end_of_observing[idx],
        }
    }

    pub fn observing_duration(&self, idx: usize) -> u32 {
        self.end_of_observing[idx] - self.end_of_preob[idx]
    }

    /// Earliest observing start over all stations.
    pub fn observing_start(&self) -> u32 {
        self.end_of_preob.iter().copied().min().unwrap_or(0)
    }

    /// Latest observing end over all stations.
    pub fn observing_end(&self) -> u32 {
        self.end_of_observing.iter().copied().max().unwrap_or(0)
    }

    /// Span from the earliest observing start to the latest end.
    pub fn scan_duration(&self) -> u32 {
        self.observing_end() - self.observing_start()
    }

    pub fn field_system_duration(&self, idx: usize) -> u32 {
        self.end_of_field_system[idx] - self.end_of_last_scan[idx]
    }

    pub fn slew_duration(&self, idx: usize) -> u32 {
        self.end_of_slew[idx] - self.end_of_field_system[idx]
    }

    pub fn idle_duration(&self, idx: usize) -> u32 {
        self.end_of_idle[idx] - self.end_of_slew[idx]
    }

    pub fn preob_duration(&self, idx: usize) -> u32 {
        self.end_of_preob[idx] - self.end_of_idle[idx]
    }

    /// Append the time row of a tagalong station whose marks are already
    /// known.
    #[allow(clippy::too_many_arguments)]
    pub fn add_tagalong_station_time(
        &mut self,
        pv_start: &PointingVector,
        pv_end: &PointingVector,
        slew_time: u32,
        current_time: u32,
        system_delay: u32,
        preob: u32,
    ) {
        self.end_of_last_scan.push(current_time);
        self.end_of_field_system.push(current_time + system_delay);
        self.end_of_slew.push(current_time + system_delay + slew_time);
        self.end_of_idle.push(pv_start.time.saturating_sub(preob));
        self.end_of_preob.push(pv_start.time);
        self.end_of_observing.push(pv_end.time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times() -> ScanTimes {
        let mut t = ScanTimes::new(vec![0, 100]);
        t.add_times(0, 6, 30, 10); // slews until 36, preob until 46
        t.add_times(1, 6, 120, 10); // slews until 226, preob until 236
        t
    }

    #[test]
    fn alignment_to_common_start() {
        let mut t = times();
        t.align_start_times(AlignmentAnchor::Start);
        assert_eq!(t.observing_time(0, Timestamp::Start), 236);
        assert_eq!(t.observing_time(1, Timestamp::Start), 236);
        // The early station waits.
        assert_eq!(t.idle_duration(0), 190);
        assert_eq!(t.idle_duration(1), 0);
    }

    #[test]
    fn individual_alignment_has_no_idle() {
        let mut t = times();
        t.align_start_times(AlignmentAnchor::Individual);
        assert_eq!(t.observing_time(0, Timestamp::Start), 46);
        assert_eq!(t.observing_time(1, Timestamp::Start), 236);
        assert_eq!(t.idle_duration(0), 0);
    }

    #[test]
    fn observing_durations_apply_per_station() {
        let mut t = times();
        t.align_start_times(AlignmentAnchor::Start);
        t.set_observing_times(&[60, 40], AlignmentAnchor::Start);
        assert_eq!(t.observing_time(0, Timestamp::End), 296);
        assert_eq!(t.observing_time(1, Timestamp::End), 276);
        assert_eq!(t.observing_duration(0), 60);
        assert_eq!(t.scan_duration(), 60);
    }

    #[test]
    fn end_anchor_aligns_ends() {
        let mut t = times();
        t.align_start_times(AlignmentAnchor::End);
        t.set_observing_times(&[60, 40], AlignmentAnchor::End);
        assert_eq!(t.observing_time(0, Timestamp::End), 296);
        assert_eq!(t.observing_time(1, Timestamp::End), 296);
        assert_eq!(t.observing_time(0, Timestamp::Start), 236);
        assert_eq!(t.observing_time(1, Timestamp::Start), 256);
    }

    #[test]
    fn removal_realigns() {
        let mut t = times();
        t.align_start_times(AlignmentAnchor::Start);
        t.remove_element(1, AlignmentAnchor::Start);
        assert_eq!(t.len(), 1);
        // Only the fast station is left; no more waiting.
        assert_eq!(t.observing_time(0, Timestamp::Start), 46);
    }

    #[test]
    fn shift_grows_idle() {
        let mut t = times();
        t.align_start_times(AlignmentAnchor::Start);
        t.set_observing_times(&[60, 60], AlignmentAnchor::Start);
        t.shift_observing_start(14);
        assert_eq!(t.observing_time(0, Timestamp::Start), 250);
        assert_eq!(t.observing_duration(0), 60);
        assert_eq!(t.idle_duration(0), 204);
    }

    #[test]
    fn update_slew_time_keeps_slew_start() {
        let mut t = times();
        t.update_slew_time(0, 50);
        assert_eq!(t.slew_start(0), 6);
        assert_eq!(t.slew_end(0), 56);
    }
}
