// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Antenna kinematics.

use serde::{Deserialize, Serialize};

use crate::constants::DEG2RAD;

/// A two-axis antenna mount: per-axis slew rate, acceleration and
/// constant overhead, plus the physical attributes carried through to
/// output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Antenna {
    /// Axis offset \[m\]
    pub offset: f64,
    /// Dish diameter \[m\]
    pub diam: f64,

    /// First-axis slew rate \[rad/s\]
    pub rate1: f64,
    /// First-axis acceleration \[rad/s^2\]
    pub acc1: f64,
    /// First-axis constant overhead \[s\]
    pub con1: f64,

    /// Second-axis slew rate \[rad/s\]
    pub rate2: f64,
    /// Second-axis acceleration \[rad/s^2\]
    pub acc2: f64,
    /// Second-axis constant overhead \[s\]
    pub con2: f64,
}

impl Antenna {
    /// Build an antenna from catalog units: rates in deg/min, overheads
    /// in seconds. Accelerations default to the slew rate per second.
    pub fn from_catalog(
        offset_m: f64,
        diam_m: f64,
        rate1_deg_per_min: f64,
        con1_s: f64,
        rate2_deg_per_min: f64,
        con2_s: f64,
    ) -> Antenna {
        let rate1 = rate1_deg_per_min * DEG2RAD / 60.0;
        let rate2 = rate2_deg_per_min * DEG2RAD / 60.0;
        Antenna {
            offset: offset_m,
            diam: diam_m,
            rate1,
            acc1: rate1,
            con1: con1_s,
            rate2,
            acc2: rate2,
            con2: con2_s,
        }
    }

    /// Slew time for unwrapped per-axis distances \[s\].
    ///
    /// Trapezoidal velocity profile: the axis accelerates over
    /// `s_acc = rate^2 / acc`; shorter moves never reach full rate.
    pub fn slew_time(&self, delta1: f64, delta2: f64) -> u32 {
        let t1 = axis_time(delta1.abs(), self.rate1, self.acc1, self.con1);
        let t2 = axis_time(delta2.abs(), self.rate2, self.acc2, self.con2);
        t1.max(t2).ceil() as u32
    }
}

fn axis_time(distance: f64, rate: f64, acc: f64, con: f64) -> f64 {
    if distance <= 0.0 {
        return con;
    }
    let s_acc = rate * rate / acc;
    if distance < s_acc {
        2.0 * (distance / acc).sqrt() + con
    } else {
        2.0 * rate / acc + (distance - s_acc) / rate + con
    }
}
