// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Cable wrap.

The azimuth axis of most VLBI antennas can turn through more than a full
circle, so a sky azimuth maps to up to two mechanical angles. All
azimuths inside the scheduler are *unwrapped*: they live in the mechanical
range and carry the ambiguity decision with them. Unwrapping picks the
representation closest to a reference angle, normally the antenna's
current position.
 */

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigurationError;

/// Mechanical axis limits with optional safety margins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CableWrap {
    axis1_low: f64,
    axis1_up: f64,
    axis2_low: f64,
    axis2_up: f64,

    axis1_low_offset: f64,
    axis1_up_offset: f64,
    axis2_low_offset: f64,
    axis2_up_offset: f64,

    /// Lower end of the neutral section.
    n_low: f64,
    /// Upper end of the neutral section.
    n_up: f64,
    /// Lower end of the clockwise wing.
    c_low: f64,
    /// Upper end of the clockwise wing.
    c_up: f64,
    /// Lower end of the counter-clockwise wing.
    w_low: f64,
    /// Upper end of the counter-clockwise wing.
    w_up: f64,
}

impl CableWrap {
    /// Build a cable wrap from axis limits in degrees.
    pub fn new(
        axis1_low_deg: f64,
        axis1_up_deg: f64,
        axis2_low_deg: f64,
        axis2_up_deg: f64,
    ) -> Result<CableWrap, ConfigurationError> {
        let axis1_low = axis1_low_deg * DEG2RAD;
        let axis1_up = axis1_up_deg * DEG2RAD;
        let axis2_low = axis2_low_deg * DEG2RAD;
        let axis2_up = axis2_up_deg * DEG2RAD;

        let axis1_range = axis1_up - axis1_low;
        if axis1_range > 2.0 * TAU {
            return Err(ConfigurationError::CableWrapTooWide(format!(
                "[{axis1_low_deg}, {axis1_up_deg}] deg"
            )));
        }

        // Split an overlapping azimuth range into a neutral centre and
        // two ambiguous wings.
        let (n_low, n_up, c_low, c_up, w_low, w_up) = if axis1_range > TAU {
            let overlap = axis1_range - TAU;
            (
                axis1_low,
                axis1_low + overlap / 2.0,
                axis1_low + overlap / 2.0,
                axis1_up - overlap / 2.0,
                axis1_up - overlap / 2.0,
                axis1_up,
            )
        } else {
            (axis1_low, axis1_up, axis1_up, axis1_up, axis1_low, axis1_low)
        };

        Ok(CableWrap {
            axis1_low,
            axis1_up,
            axis2_low,
            axis2_up,
            axis1_low_offset: 0.0,
            axis1_up_offset: 0.0,
            axis2_low_offset: 0.0,
            axis2_up_offset: 0.0,
            n_low,
            n_up,
            c_low,
            c_up,
            w_low,
            w_up,
        })
    }

    /// Safety margins inside the mechanical limits, in degrees.
    pub fn set_minimum_offsets(
        &mut self,
        axis1_low_offset: f64,
        axis1_up_offset: f64,
        axis2_low_offset: f64,
        axis2_up_offset: f64,
    ) {
        self.axis1_low_offset = axis1_low_offset * DEG2RAD;
        self.axis1_up_offset = axis1_up_offset * DEG2RAD;
        self.axis2_low_offset = axis2_low_offset * DEG2RAD;
        self.axis2_up_offset = axis2_up_offset * DEG2RAD;
    }

    fn low(&self) -> f64 {
        self.axis1_low + self.axis1_low_offset
    }

    fn up(&self) -> f64 {
        self.axis1_up - self.axis1_up_offset
    }

    /// Second-axis (elevation) limits with margins applied.
    pub fn axis2_limits(&self) -> (f64, f64) {
        (
            self.axis2_low + self.axis2_low_offset,
            self.axis2_up - self.axis2_up_offset,
        )
    }

    /// Middle of an axis range.
    pub fn neutral_point(&self, axis: usize) -> f64 {
        match axis {
            1 => (self.axis1_low + self.axis1_up) / 2.0,
            _ => (self.axis2_low + self.axis2_up) / 2.0,
        }
    }

    /// Is an unwrapped pointing inside the mechanical limits? The upper
    /// limit itself is valid.
    pub fn angles_inside(&self, unwrapped_az: f64, el: f64) -> bool {
        let (el_low, el_up) = self.axis2_limits();
        unwrapped_az >= self.low()
            && unwrapped_az <= self.up()
            && el >= el_low
            && el <= el_up
    }

    /// Does any unwrapped representation of this sky azimuth fit inside
    /// the axis limits?
    pub fn azimuth_inside(&self, az: f64) -> bool {
        self.unwrap_az_near(az, self.neutral_point(1)).is_some()
    }

    /// Unwrap a sky azimuth into the axis limits, choosing the
    /// representation closest to `ref_az`. `None` if no representation
    /// fits.
    pub fn unwrap_az_near(&self, az: f64, ref_az: f64) -> Option<f64> {
        let low = self.low();
        let up = self.up();

        // Smallest representation at or above the lower limit.
        let mut candidate = az - TAU * ((az - low) / TAU).floor();
        let mut best: Option<f64> = None;
        while candidate <= up {
            match best {
                Some(current) if (candidate - ref_az).abs() >= (current - ref_az).abs() => {}
                _ => best = Some(candidate),
            }
            candidate += TAU;
        }
        best
    }

    /// Which wrap section an unwrapped azimuth is in: neutral,
    /// clockwise or counter-clockwise.
    pub fn section(&self, unwrapped_az: f64) -> char {
        if unwrapped_az >= self.c_low && unwrapped_az <= self.c_up && self.c_up > self.c_low {
            'C'
        } else if unwrapped_az >= self.n_low && unwrapped_az <= self.n_up {
            '-'
        } else {
            'W'
        }
    }
}
