// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! End-to-end scheduling scenarios and session-level invariants.

mod scenarios;

use std::collections::{BTreeMap, HashMap};

use hifitime::Epoch;

use crate::astro::SessionTime;
use crate::coord::RADec;
use crate::mode::{Band, FluxBackup, ObservingMode};
use crate::source::{Flux, Source, SourceBody};
use crate::station::{Antenna, CableWrap, Equipment, Position, Station};

/// One X band at 1 Gbps, correlator efficiency 0.6.
pub(crate) fn x_band_mode() -> ObservingMode {
    ObservingMode::new(
        vec![Band {
            name: "X".to_string(),
            wavelength: 0.0349,
            recording_rate: 1e9,
            backup: FluxBackup::InternalModel,
        }],
        0.6,
    )
    .unwrap()
}

/// A quasar with a flat flux density on X band.
pub(crate) fn flat_source(name: &str, ra_deg: f64, dec_deg: f64, jy: f64) -> Source {
    let mut flux = BTreeMap::new();
    flux.insert(
        "X".to_string(),
        Flux::BaselineTable {
            wavelength: 0.0349,
            knots: vec![0.0],
            values: vec![jy],
        },
    );
    let mut source = Source::new(
        name,
        SourceBody::Quasar(RADec::new_degrees(ra_deg, dec_deg)),
        flux,
    );
    source.parameters_mut().min_snr.insert("X".to_string(), 20.0);
    source
}

/// A 20 m class station with a plain 1000 Jy SEFD on X band.
pub(crate) fn test_station(name: &str, code: &str, lat_deg: f64, lon_deg: f64) -> Station {
    let mut sefd = HashMap::new();
    sefd.insert("X".to_string(), 1000.0);
    Station::new(
        name,
        code,
        Antenna::from_catalog(0.0, 20.0, 120.0, 0.0, 60.0, 0.0),
        CableWrap::new(0.0, 360.0, 5.0, 88.0).unwrap(),
        Position::from_geodetic(lat_deg, lon_deg, 0.0),
        Equipment::new(sefd),
        None,
    )
}

/// A one-hour session starting 2020-01-01 00:00 UTC.
pub(crate) fn one_hour_session() -> SessionTime {
    SessionTime::new(Epoch::from_gregorian_utc_at_midnight(2020, 1, 1), 3600).unwrap()
}

pub(crate) fn session_of(duration: u32) -> SessionTime {
    SessionTime::new(Epoch::from_gregorian_utc_at_midnight(2020, 1, 1), duration).unwrap()
}
