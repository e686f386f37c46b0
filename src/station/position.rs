// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Station positions.

use serde::{Deserialize, Serialize};

use crate::astro::frame::Mat3;
use crate::constants::*;

/// An ECEF station position with derived geodetic coordinates and the
/// geocentric-to-local rotation used by the rigorous azimuth/elevation
/// model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    x: f64,
    y: f64,
    z: f64,
    lat: f64,
    lon: f64,
    height: f64,
    #[serde(skip)]
    g2l: Option<Mat3>,
}

impl Position {
    /// Build a position from ECEF coordinates \[m\].
    pub fn new(x: f64, y: f64, z: f64) -> Position {
        let (lat, lon, height) = ecef_to_geodetic(x, y, z);
        Position {
            x,
            y,
            z,
            lat,
            lon,
            height,
            g2l: Some(g2l_matrix(lat, lon)),
        }
    }

    /// Build a position from geodetic coordinates (degrees, degrees,
    /// metres).
    pub fn from_geodetic(lat_deg: f64, lon_deg: f64, height: f64) -> Position {
        let lat = lat_deg * DEG2RAD;
        let lon = lon_deg * DEG2RAD;
        let n = WGS84_A / (1.0 - WGS84_E2 * lat.sin() * lat.sin()).sqrt();
        let x = (n + height) * lat.cos() * lon.cos();
        let y = (n + height) * lat.cos() * lon.sin();
        let z = (n * (1.0 - WGS84_E2) + height) * lat.sin();
        Position {
            x,
            y,
            z,
            lat,
            lon,
            height,
            g2l: Some(g2l_matrix(lat, lon)),
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    /// Geodetic latitude \[radians\]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude, east positive \[radians\]
    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Geocentric-to-local rotation matrix.
    pub fn g2l(&self) -> Mat3 {
        self.g2l.unwrap_or_else(|| g2l_matrix(self.lat, self.lon))
    }

    /// Chord distance to another station \[m\]
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Rotation taking a terrestrial unit vector into the station-local
/// system in which azimuth and elevation are read off. The middle-row
/// sign flip makes azimuth count clockwise from north after the final
/// `atan2`.
fn g2l_matrix(lat: f64, lon: f64) -> Mat3 {
    let theta = FRAC_PI_2 - lat;
    let (s_t, c_t) = theta.sin_cos();
    let (s_l, c_l) = lon.sin_cos();

    let roty: Mat3 = [[c_t, 0.0, -s_t], [0.0, -1.0, 0.0], [s_t, 0.0, c_t]];
    let rotz: Mat3 = [[c_l, s_l, 0.0], [-s_l, c_l, 0.0], [0.0, 0.0, 1.0]];
    crate::astro::frame::mat_x_mat(&roty, &rotz)
}

/// WGS84 geodetic coordinates from ECEF, Bowring's iteration.
fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();
    if p < 1.0 {
        // On the axis; latitude is a pole.
        let lat = if z >= 0.0 { FRAC_PI_2 } else { -FRAC_PI_2 };
        return (lat, lon, z.abs() - WGS84_A * (1.0 - WGS84_E2).sqrt());
    }

    let mut lat = (z / (p * (1.0 - WGS84_E2))).atan();
    for _ in 0..5 {
        let n = WGS84_A / (1.0 - WGS84_E2 * lat.sin() * lat.sin()).sqrt();
        lat = ((z + n * WGS84_E2 * lat.sin()) / p).atan();
    }
    let n = WGS84_A / (1.0 - WGS84_E2 * lat.sin() * lat.sin()).sqrt();
    let height = p / lat.cos() - n;
    (lat, lon, height)
}
