// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. `vlbi_sched` should do as many
calculations as possible in double precision before converting to a lower
precision, if it is ever required.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Radians per degree.
pub const DEG2RAD: f64 = PI / 180.0;

/// Degrees per radian.
pub const RAD2DEG: f64 = 180.0 / PI;

/// Radians per arcsecond.
pub const ARCSEC2RAD: f64 = DEG2RAD / 3600.0;

/// Speed of light \[m/s\]
pub const VEL_C: f64 = 299792458.0;

/// Astronomical unit \[m\]
pub const AU_M: f64 = 1.495978707e11;

/// Earth rotation rate \[rad/s\]
pub const EARTH_OMEGA: f64 = 1.00273781191135448 * TAU / 86400.0;

/// Julian date of the MJD epoch.
pub const MJD_ZERO: f64 = 2400000.5;

/// MJD of J2000.0.
pub const MJD_J2000: f64 = 51544.5;

/// Days per Julian century.
pub const DAYS_PER_CENTURY: f64 = 36525.0;

/// WGS84 semi-major axis \[m\]
pub const WGS84_A: f64 = 6378137.0;

/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = 6.69437999014e-3;

/// Constant of the elliptical-Gaussian flux model: pi^2 / (4 ln 2).
pub const FLCON1: f64 = (PI * PI) / (4.0 * std::f64::consts::LN_2);

/// Converts a Gaussian major axis in milliarcseconds to radians:
/// pi / (3600 * 180 * 1000).
pub const FLCON2: f64 = PI / (3600.0 * 180.0 * 1000.0);

/// Flux density assumed when a band carries no information and no backup
/// model is requested \[Jy\]
pub const MINIMUM_FLUX: f64 = 1e-3;
