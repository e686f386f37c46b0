// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Flux-density models.

A source carries one model per band. Type `BaselineTable` is a table of
(projected baseline length, flux density) knots interpolated linearly;
type `GaussianModel` is a sum of elliptical Gaussian components evaluated
from the projected (u,v) coordinates.
 */

use serde::{Deserialize, Serialize};

use crate::constants::{FLCON1, FLCON2};

/// One elliptical Gaussian component of a `GaussianModel` flux.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianComponent {
    /// Peak flux density \[Jy\]
    pub flux: f64,
    /// Major axis \[mas\]
    pub major_axis: f64,
    /// Minor-to-major axis ratio.
    pub axial_ratio: f64,
    /// Position angle of the major axis \[radians\]
    pub position_angle: f64,
}

/// Flux-density information of one band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Flux {
    /// Flux density as a function of projected baseline length.
    BaselineTable {
        /// Observing wavelength \[m\]
        wavelength: f64,
        /// Projected baseline lengths, ascending \[M lambda\]
        knots: Vec<f64>,
        /// Flux densities at the knots \[Jy\]
        values: Vec<f64>,
    },

    /// Sum of elliptical Gaussian components.
    GaussianModel {
        /// Observing wavelength \[m\]
        wavelength: f64,
        components: Vec<GaussianComponent>,
    },
}

impl Flux {
    /// Observing wavelength of the band this information belongs to \[m\]
    pub fn wavelength(&self) -> f64 {
        match self {
            Flux::BaselineTable { wavelength, .. } => *wavelength,
            Flux::GaussianModel { wavelength, .. } => *wavelength,
        }
    }

    /// The highest flux density this model can produce on any baseline.
    /// Used to weed out sources below their minimum-flux threshold.
    pub fn max_flux(&self) -> f64 {
        match self {
            Flux::BaselineTable { values, .. } => values.iter().cloned().fold(0.0, f64::max),
            // All components add up at zero baseline length.
            Flux::GaussianModel { components, .. } => components.iter().map(|c| c.flux).sum(),
        }
    }

    /// Observed flux density for a baseline with projected coordinates
    /// (u, v) in metres \[Jy\]
    pub fn observed_flux(&self, u: f64, v: f64) -> f64 {
        match self {
            Flux::BaselineTable {
                wavelength,
                knots,
                values,
            } => {
                // Projected baseline length in mega-wavelengths.
                let pbl = (u * u + v * v).sqrt() / wavelength / 1e6;
                interpolate(knots, values, pbl)
            }

            Flux::GaussianModel {
                wavelength,
                components,
            } => {
                let u = u / wavelength;
                let v = v / wavelength;
                let mut flux = 0.0;
                for c in components {
                    let (s_pa, c_pa) = c.position_angle.sin_cos();
                    let along = v * c_pa + u * s_pa;
                    let across = c.axial_ratio * (u * c_pa - v * s_pa);
                    let arg = (along * along + across * across)
                        * (c.major_axis * FLCON2)
                        * (c.major_axis * FLCON2);
                    flux += c.flux * (-FLCON1 * arg).exp();
                }
                flux
            }
        }
    }
}

fn interpolate(knots: &[f64], values: &[f64], x: f64) -> f64 {
    debug_assert_eq!(knots.len(), values.len());
    if values.is_empty() {
        return 0.0;
    }
    if x <= knots[0] {
        return values[0];
    }
    if x >= knots[knots.len() - 1] {
        return values[values.len() - 1];
    }
    let i = knots.partition_point(|&k| k < x);
    let frac = (x - knots[i - 1]) / (knots[i] - knots[i - 1]);
    values[i - 1] + (values[i] - values[i - 1]) * frac
}
