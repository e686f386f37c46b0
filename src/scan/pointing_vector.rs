// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Where a station points, and when.

use serde::{Deserialize, Serialize};

/// One station pointing at one source at one time. The azimuth is always
/// the *unwrapped* value, consistent with the cable-wrap ambiguity
/// carried forward from the previous pointing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PointingVector {
    pub staid: usize,
    pub srcid: usize,
    /// Unwrapped azimuth \[radians\]
    pub az: f64,
    /// Elevation \[radians\]
    pub el: f64,
    /// Local hour angle \[radians\]
    pub ha: f64,
    /// Declination \[radians\]
    pub dc: f64,
    /// Seconds since session start.
    pub time: u32,
}

impl PointingVector {
    pub fn new(staid: usize, srcid: usize) -> PointingVector {
        PointingVector {
            staid,
            srcid,
            az: 0.0,
            el: 0.0,
            ha: 0.0,
            dc: 0.0,
            time: 0,
        }
    }

    /// Copy the astrometric fields of another pointing vector, keeping
    /// the identifiers.
    pub fn copy_values_from(&mut self, other: &PointingVector) {
        self.az = other.az;
        self.el = other.el;
        self.ha = other.ha;
        self.dc = other.dc;
        self.time = other.time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_values_keeps_ids() {
        let mut a = PointingVector::new(1, 2);
        let mut b = PointingVector::new(3, 4);
        b.az = 1.0;
        b.el = 0.5;
        b.time = 100;
        a.copy_values_from(&b);
        assert_eq!(a.staid, 1);
        assert_eq!(a.srcid, 2);
        assert_eq!(a.time, 100);
        assert_eq!(a.az, 1.0);
    }
}
