// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The session clock and the astronomical parameters the scheduler consumes.

Session time is an integer number of seconds since the session start; all
astrometric quantities are functions of it. Nutation, sun position and
Earth velocity are precomputed once per session on an hourly grid and
linearly interpolated, so the hot loop never evaluates a series.

The series themselves are truncated analytic models (leading precession
polynomial plus the 18.6-year nutation term, a low-precision solar
ephemeris, a circular-orbit Earth velocity). The scheduler only relies on
the lookup/interpolation contracts, not on milliarcsecond accuracy.
 */

pub(crate) mod frame;

use chrono::{DateTime, Utc};
use hifitime::Epoch;

use crate::constants::*;
use crate::coord::RADec;
use crate::error::ConfigurationError;

/// The session clock: a start epoch and a duration in integer seconds.
#[derive(Clone, Debug)]
pub struct SessionTime {
    start: Epoch,
    mjd_start: f64,
    duration: u32,
}

impl SessionTime {
    pub fn new(start: Epoch, duration: u32) -> Result<SessionTime, ConfigurationError> {
        if duration == 0 {
            return Err(ConfigurationError::SessionNotPositive);
        }
        Ok(SessionTime {
            start,
            mjd_start: start.as_mjd_utc_days(),
            duration,
        })
    }

    /// Build a session clock from wall-clock UTC boundaries.
    pub fn from_utc(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<SessionTime, ConfigurationError> {
        let seconds = end.timestamp() - start.timestamp();
        if seconds <= 0 {
            return Err(ConfigurationError::SessionNotPositive);
        }
        SessionTime::new(
            Epoch::from_unix_seconds(start.timestamp() as f64),
            seconds as u32,
        )
    }

    pub fn start(&self) -> Epoch {
        self.start
    }

    /// Session duration \[s\]
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// UTC MJD of a session time.
    pub fn mjd(&self, time: u32) -> f64 {
        self.mjd_start + f64::from(time) / 86400.0
    }

    /// Greenwich mean sidereal time of a session time \[radians\]
    pub fn gmst(&self, time: u32) -> f64 {
        gmst(self.mjd(time))
    }
}

/// Greenwich mean sidereal time from a UT1(≈UTC) MJD \[radians\]
pub fn gmst(mjd: f64) -> f64 {
    let d = mjd - MJD_J2000;
    let t = d / DAYS_PER_CENTURY;
    let theta_deg =
        280.46061837 + 360.98564736629 * d + 0.000387933 * t * t - t * t * t / 38710000.0;
    (theta_deg * DEG2RAD).rem_euclid(TAU)
}

/// CIP coordinates and CIO locator from a truncated IAU 2006 series:
/// the precession polynomial plus the dominant 18.6-year nutation term.
/// Returns (X, Y, s) in radians.
pub fn nutation_xys(mjd: f64) -> (f64, f64, f64) {
    let t = (mjd - MJD_J2000) / DAYS_PER_CENTURY;

    // Longitude of the ascending node of the Moon.
    let omega = (125.04452 - 1934.136261 * t) * DEG2RAD;

    let x_as = -0.016617 + 2004.191898 * t - 0.4297829 * t * t - 0.19861834 * t * t * t
        - 6.844318 * omega.sin();
    let y_as = -0.006951 - 0.025896 * t - 22.4072747 * t * t + 0.00190059 * t * t * t
        + 9.205236 * omega.cos();

    let x = x_as * ARCSEC2RAD;
    let y = y_as * ARCSEC2RAD;
    let s = -x * y / 2.0 + (0.0000094 + 0.00380865 * t) * ARCSEC2RAD;
    (x, y, s)
}

/// Low-precision geometric solar coordinates.
pub fn sun_ra_dec(mjd: f64) -> RADec {
    let t = (mjd - MJD_J2000) / DAYS_PER_CENTURY;

    let l0 = 280.46646 + 36000.76983 * t;
    let m = (357.52911 + 35999.05029 * t) * DEG2RAD;
    let centre = (1.914602 - 0.004817 * t) * m.sin()
        + (0.019993 - 0.000101 * t) * (2.0 * m).sin()
        + 0.000289 * (3.0 * m).sin();
    let lambda = (l0 + centre) * DEG2RAD;
    let eps = (23.439291 - 0.0130042 * t) * DEG2RAD;

    let ra = (eps.cos() * lambda.sin()).atan2(lambda.cos()).rem_euclid(TAU);
    let dec = (eps.sin() * lambda.sin()).asin();
    RADec::new(ra, dec)
}

/// Barycentric velocity of the Earth \[m/s\], circular-orbit model.
pub fn earth_velocity(mjd: f64) -> [f64; 3] {
    let t = (mjd - MJD_J2000) / DAYS_PER_CENTURY;
    let l0 = 280.46646 + 36000.76983 * t;
    let m = (357.52911 + 35999.05029 * t) * DEG2RAD;
    let lambda = (l0 + 1.914602 * m.sin()) * DEG2RAD;
    let eps = (23.439291 - 0.0130042 * t) * DEG2RAD;

    // d(lambda)/dt over a sidereal year, scaled to the orbit radius.
    let v = AU_M * TAU / (365.25636 * 86400.0);
    [
        v * lambda.sin(),
        -v * lambda.cos() * eps.cos(),
        -v * lambda.cos() * eps.sin(),
    ]
}

/// Hourly-sampled astronomical parameters with linear interpolation,
/// valid over one session.
#[derive(Clone, Debug)]
pub struct AstronomicalParameters {
    nut_time: Vec<u32>,
    nut_x: Vec<f64>,
    nut_y: Vec<f64>,
    nut_s: Vec<f64>,

    sun_time: Vec<u32>,
    sun_ra: Vec<f64>,
    sun_dec: Vec<f64>,

    earth_velocity: [f64; 3],
}

impl AstronomicalParameters {
    const STEP: u32 = 3600;

    pub fn new(session: &SessionTime) -> AstronomicalParameters {
        let n = (session.duration() / Self::STEP + 2) as usize;

        let mut nut_time = Vec::with_capacity(n);
        let mut nut_x = Vec::with_capacity(n);
        let mut nut_y = Vec::with_capacity(n);
        let mut nut_s = Vec::with_capacity(n);
        let mut sun_time = Vec::with_capacity(n);
        let mut sun_ra = Vec::with_capacity(n);
        let mut sun_dec = Vec::with_capacity(n);

        for i in 0..n {
            let t = i as u32 * Self::STEP;
            let mjd = session.mjd(t);

            let (x, y, s) = nutation_xys(mjd);
            nut_time.push(t);
            nut_x.push(x);
            nut_y.push(y);
            nut_s.push(s);

            let sun = sun_ra_dec(mjd);
            sun_time.push(t);
            sun_ra.push(sun.ra);
            sun_dec.push(sun.dec);
        }

        AstronomicalParameters {
            nut_time,
            nut_x,
            nut_y,
            nut_s,
            sun_time,
            sun_ra,
            sun_dec,
            earth_velocity: earth_velocity(session.mjd(session.duration() / 2)),
        }
    }

    fn interpolation_idx(times: &[u32], time: u32) -> usize {
        let mut idx = 0;
        while idx + 2 < times.len() && times[idx + 1] < time {
            idx += 1;
        }
        idx
    }

    fn interpolate(times: &[u32], values: &[f64], time: u32) -> f64 {
        let idx = Self::interpolation_idx(times, time);
        let delta = f64::from(times[idx + 1] - times[idx]);
        let dt = f64::from(time.saturating_sub(times[idx]));
        values[idx] + (values[idx + 1] - values[idx]) / delta * dt
    }

    /// Interpolated CIP coordinates and CIO locator at a session time.
    pub fn nutation(&self, time: u32) -> (f64, f64, f64) {
        (
            Self::interpolate(&self.nut_time, &self.nut_x, time),
            Self::interpolate(&self.nut_time, &self.nut_y, time),
            Self::interpolate(&self.nut_time, &self.nut_s, time),
        )
    }

    /// Interpolated solar coordinates at a session time.
    pub fn sun(&self, time: u32) -> RADec {
        let idx = Self::interpolation_idx(&self.sun_time, time);
        let delta = f64::from(self.sun_time[idx + 1] - self.sun_time[idx]);
        let dt = f64::from(time.saturating_sub(self.sun_time[idx]));

        // The sun's RA may wrap between samples.
        let mut d_ra = self.sun_ra[idx + 1] - self.sun_ra[idx];
        if d_ra > PI {
            d_ra -= TAU;
        } else if d_ra < -PI {
            d_ra += TAU;
        }

        RADec::new(
            (self.sun_ra[idx] + d_ra / delta * dt).rem_euclid(TAU),
            self.sun_dec[idx] + (self.sun_dec[idx + 1] - self.sun_dec[idx]) / delta * dt,
        )
    }

    /// Barycentric Earth velocity \[m/s\]
    pub fn earth_velocity(&self) -> [f64; 3] {
        self.earth_velocity
    }
}
