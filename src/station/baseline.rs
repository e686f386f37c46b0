// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Baselines: unordered station pairs, stored canonically with
//! `staid1 < staid2`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::event::Event;

/// Scheduling knobs of a baseline. Replaced wholesale when an event
/// fires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BaselineParameters {
    /// Skip this baseline entirely.
    pub ignore: bool,
    /// Minimum observation duration \[s\]
    pub min_scan: u32,
    /// Maximum observation duration \[s\]
    pub max_scan: u32,
    /// Minimum required SNR per band.
    pub min_snr: HashMap<String, f64>,
    /// Multiplicative score factor for scans containing this baseline.
    pub weight: f64,
}

impl Default for BaselineParameters {
    fn default() -> BaselineParameters {
        BaselineParameters {
            ignore: false,
            min_scan: 0,
            max_scan: 9999,
            min_snr: HashMap::new(),
            weight: 1.0,
        }
    }
}

/// Per-baseline bookkeeping accumulated while scheduling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub scan_start_times: Vec<u32>,
    /// Integrated observing time \[s\]
    pub total_observing_time: u32,
}

/// An unordered pair of stations.
#[derive(Clone, Debug)]
pub struct Baseline {
    name: String,
    staid1: usize,
    staid2: usize,

    parameters: BaselineParameters,
    events: Vec<Event<BaselineParameters>>,
    next_event: usize,

    n_obs: u32,
    statistics: BaselineStatistics,
}

impl Baseline {
    pub fn new(name: &str, staid1: usize, staid2: usize) -> Baseline {
        debug_assert!(staid1 < staid2);
        Baseline {
            name: name.to_string(),
            staid1,
            staid2,
            parameters: BaselineParameters::default(),
            events: vec![],
            next_event: 0,
            n_obs: 0,
            statistics: BaselineStatistics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn staid1(&self) -> usize {
        self.staid1
    }

    pub fn staid2(&self) -> usize {
        self.staid2
    }

    pub fn parameters(&self) -> &BaselineParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut BaselineParameters {
        &mut self.parameters
    }

    pub fn set_events(
        &mut self,
        events: Vec<Event<BaselineParameters>>,
    ) -> Result<(), ConfigurationError> {
        crate::event::check_event_order(&self.name, &events)?;
        self.events = events;
        self.next_event = 0;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        crate::event::check_event_order(&self.name, &self.events)
    }

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

    /// Register a committed observation.
    pub fn update(&mut self, start_time: u32, observing_time: u32) {
        self.n_obs += 1;
        self.statistics.scan_start_times.push(start_time);
        self.statistics.total_observing_time += observing_time;
    }

    pub fn n_obs(&self) -> u32 {
        self.n_obs
    }

    pub fn statistics(&self) -> &BaselineStatistics {
        &self.statistics
    }
}
