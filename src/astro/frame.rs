// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rigorous frame transformations.
//!
//! Small fixed-size matrix helpers and the CIO-based celestial-to-
//! terrestrial rotation. Rotation conventions follow SOFA/ERFA: `rz(psi)`
//! rotates the *frame* anticlockwise about +z, so applying the matrix to a
//! vector expresses that vector in the rotated frame.

use crate::constants::TAU;

pub type Mat3 = [[f64; 3]; 3];
pub type Vec3 = [f64; 3];

/// Frame rotation about the y axis.
pub fn ry(theta: f64) -> Mat3 {
    let (s, c) = theta.sin_cos();
    [[c, 0.0, -s], [0.0, 1.0, 0.0], [s, 0.0, c]]
}

/// Frame rotation about the z axis.
pub fn rz(psi: f64) -> Mat3 {
    let (s, c) = psi.sin_cos();
    [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]]
}

pub fn mat_x_mat(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, element) in row.iter_mut().enumerate() {
            *element = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

pub fn mat_x_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn norm(v: &Vec3) -> f64 {
    dot(v, v).sqrt()
}

/// Earth rotation angle for a UT1 MJD \[radians\].
pub fn era(mjd_ut1: f64) -> f64 {
    let t = mjd_ut1 - 51544.5;
    (TAU * (0.7790572732640 + 1.00273781191135448 * t)).rem_euclid(TAU)
}

/// Celestial-to-intermediate matrix from the CIP coordinates (X, Y) and
/// the CIO locator s: Rz(-(E+s)) Ry(d) Rz(E).
pub fn c2ixys(x: f64, y: f64, s: f64) -> Mat3 {
    let r2 = x * x + y * y;
    let e = if r2 > 0.0 { y.atan2(x) } else { 0.0 };
    let d = (r2 / (1.0 - r2)).sqrt().atan();
    mat_x_mat(&rz(-(e + s)), &mat_x_mat(&ry(d), &rz(e)))
}

/// Celestial-to-terrestrial matrix, CIO based, with identity polar motion:
/// Rz(ERA) applied to the celestial-to-intermediate matrix.
pub fn c2tcio(rc2i: &Mat3, era: f64) -> Mat3 {
    mat_x_mat(&rz(era), rc2i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rz_quarter_turn() {
        // A frame rotated +90 deg about z sees +x where +y used to be.
        let v = mat_x_vec(&rz(std::f64::consts::FRAC_PI_2), &[0.0, 1.0, 0.0]);
        assert_abs_diff_eq!(v[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn c2ixys_is_near_identity_for_small_offsets() {
        let m = c2ixys(1e-7, 1e-7, 0.0);
        for (i, row) in m.iter().enumerate() {
            for (j, &element) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(element, expected, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn rotation_preserves_length() {
        let m = c2tcio(&c2ixys(1e-4, -2e-5, 1e-8), 1.234);
        let v = mat_x_vec(&m, &[0.3, -0.4, 0.5]);
        assert_abs_diff_eq!(norm(&v), norm(&[0.3, -0.4, 0.5]), epsilon = 1e-12);
    }

    #[test]
    fn era_advances_about_a_turn_per_day() {
        let e0 = era(58849.0);
        let e1 = era(58850.0);
        let advance = (e1 - e0).rem_euclid(TAU);
        // Sidereal day is ~236 s short of a solar day.
        assert_abs_diff_eq!(advance, TAU * 0.00273781191135448, epsilon = 1e-9);
    }
}
