// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scan scheduling for Very Long Baseline Interferometry (VLBI)
//! observing sessions.
//!
//! Given a station network, a source catalog, an observing mode and a
//! session window, the scheduler produces an ordered sequence of scans:
//! time-bounded pointings at a common source by a subset of stations,
//! such that every observation satisfies its signal-to-noise,
//! visibility, cable-wrap and timing constraints, while a weighted
//! objective is maximized greedily over the session.

pub mod astro;
pub(crate) mod constants;
pub mod coord;
pub(crate) mod error;
pub mod event;
pub mod mode;
pub mod scan;
pub mod scheduler;
pub mod sky_coverage;
pub mod source;
pub mod station;
pub mod subcon;
pub mod weights;

#[cfg(test)]
mod tests;

// Re-exports.
pub use astro::SessionTime;
pub use error::{ConfigurationError, SchedulerError};
pub use mode::{Band, FluxBackup, ObservingMode};
pub use scan::{AlignmentAnchor, Observation, PointingVector, Scan, ScanType};
pub use scheduler::{
    Schedule, Scheduler, SchedulerParameters, ScanSequence, SubnettingParameters,
};
pub use source::{Flux, Source, SourceBody, SourceList, SourceParameters};
pub use station::{
    Antenna, Baseline, BaselineParameters, CableWrap, Equipment, HorizonMask, Network, Position,
    Station, StationParameters,
};
pub use weights::WeightFactors;
