// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all scheduler-related errors. This should be the *only*
//! error enum that is publicly visible.
//!
//! The scan-selection core itself never returns errors; infeasible
//! candidates are discarded and an empty candidate set is recovered by
//! advancing the session clock. Everything here is detected while the
//! session is assembled, before the first scan is selected.

use thiserror::Error;

/// The *only* publicly visible error from `vlbi_sched`.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Problems with the session setup that make scheduling impossible.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Session start time is not before its end time")]
    SessionNotPositive,

    #[error("Band '{band}' is referenced by {referrer}, but the observing mode does not define it")]
    MissingBand { band: String, referrer: String },

    #[error("The observing mode defines no bands")]
    NoBands,

    #[error("Band '{band}' has a non-positive recording rate")]
    BadRecordingRate { band: String },

    #[error("'{name}' references unknown station '{station}'")]
    UnknownStation { name: String, station: String },

    #[error("A session needs at least two stations, got {0}")]
    TooFewStations(usize),

    #[error("The source list is empty")]
    NoSources,

    #[error(
        "Event at {time} s for '{entity}' precedes the previous event at {previous} s; \
         events must be sorted in time"
    )]
    EventOrdering {
        entity: String,
        time: u32,
        previous: u32,
    },

    #[error("Cable wrap limits of station '{0}' span more than two full turns")]
    CableWrapTooWide(String),

    #[error("Horizon mask of station '{0}' needs at least two azimuth knots")]
    BadHorizonMask(String),

    #[error("Satellite '{0}' has an empty ephemeris")]
    EmptyEphemeris(String),
}
