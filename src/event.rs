// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Time-tagged parameter changes.
//!
//! Stations, sources and baselines each carry a time-sorted vector of
//! events and a cursor that advances monotonically with the session clock;
//! firing an event replaces the entity's active parameter set. Rollback is
//! never needed because the scheduler only moves forwards in time.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A scheduled swap of an entity's active parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event<P> {
    /// Time at which the new parameters become active, in seconds since
    /// session start.
    pub time: u32,

    /// A smooth transition leaves in-progress work alone; a hard one asks
    /// the scheduler to break at this time.
    pub smooth_transition: bool,

    /// The parameters that become active.
    pub parameters: P,
}

impl<P> Event<P> {
    pub fn new(time: u32, smooth_transition: bool, parameters: P) -> Self {
        Self {
            time,
            smooth_transition,
            parameters,
        }
    }
}

/// Verify that the events of an entity are sorted in time. Out-of-order
/// events are a configuration error; the cursor can never fire them.
pub(crate) fn check_event_order<P>(
    entity: &str,
    events: &[Event<P>],
) -> Result<(), ConfigurationError> {
    for pair in events.windows(2) {
        if pair[1].time < pair[0].time {
            return Err(ConfigurationError::EventOrdering {
                entity: entity.to_string(),
                time: pair[1].time,
                previous: pair[0].time,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_events_pass() {
        let events = vec![Event::new(0, true, ()), Event::new(10, true, ())];
        assert!(check_event_order("x", &events).is_ok());
    }

    #[test]
    fn unordered_events_fail() {
        let events = vec![Event::new(10, true, ()), Event::new(5, false, ())];
        let result = check_event_order("x", &events);
        assert!(matches!(
            result,
            Err(ConfigurationError::EventOrdering { time: 5, previous: 10, .. })
        ));
    }

    #[test]
    fn equal_times_are_allowed() {
        let events = vec![Event::new(7, true, ()), Event::new(7, false, ())];
        assert!(check_event_order("x", &events).is_ok());
    }
}
