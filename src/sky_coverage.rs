// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky coverage.

Each cluster of co-located stations shares one record of every pointing
it has committed. A proposed pointing is scored by its angular and
temporal distance to the closest recorded one: 1 is completely novel, 0
repeats a just-observed direction.

The angular distance between two pointings and the cosine of the score
argument come from lookup tables quantized to whole degrees and
milliradians; both stay within 1 % of the analytical forms.
 */

use lazy_static::lazy_static;

use crate::constants::*;
use crate::scan::PointingVector;

lazy_static! {
    /// cos(x) for x in [0, pi], 1 mrad steps.
    static ref COS_LOOKUP: Vec<f64> = (0..=3142).map(|i| (i as f64 / 1000.0).cos()).collect();

    /// Angular distance between two pointings, indexed by
    /// [lower elevation][delta azimuth][delta elevation], whole degrees.
    static ref ANGULAR_DISTANCE_LOOKUP: Vec<f32> = {
        let mut table = Vec::with_capacity(91 * 181 * 91);
        for el in 0..=90 {
            let el1 = f64::from(el) * DEG2RAD;
            for daz in 0..=180 {
                let daz = f64::from(daz) * DEG2RAD;
                for del in 0..=90 {
                    let el2 = el1 + f64::from(del) * DEG2RAD;
                    let x = el1.sin() * el2.sin() + el1.cos() * el2.cos() * daz.cos();
                    table.push(x.clamp(-1.0, 1.0).acos() as f32);
                }
            }
        }
        table
    };
}

fn cos_lookup(x: f64) -> f64 {
    let idx = ((x.abs() * 1000.0) as usize).min(COS_LOOKUP.len() - 1);
    COS_LOOKUP[idx]
}

/// Angular distance between two pointings, whole-degree quantization
/// \[radians\].
fn angular_distance(pv1: &PointingVector, pv2: &PointingVector) -> f64 {
    let mut delta_az = (pv1.az - pv2.az) * RAD2DEG % 360.0;
    if delta_az < 0.0 {
        delta_az += 360.0;
    }
    if delta_az > 180.0 {
        delta_az = 360.0 - delta_az;
    }

    let (el_low, el_high) = if pv1.el <= pv2.el {
        (pv1.el, pv2.el)
    } else {
        (pv2.el, pv1.el)
    };

    let el_idx = ((el_low * RAD2DEG + 0.5) as usize).min(90);
    let daz_idx = ((delta_az + 0.5) as usize).min(180);
    let del_idx = (((el_high - el_low) * RAD2DEG + 0.5) as usize).min(90);

    f64::from(ANGULAR_DISTANCE_LOOKUP[(el_idx * 181 + daz_idx) * 91 + del_idx])
}

/// The pointing history of one station cluster.
#[derive(Clone, Debug)]
pub struct SkyCoverage {
    staids: Vec<usize>,

    pv_start: Vec<PointingVector>,
    pv_end: Vec<PointingVector>,

    /// Over this angular distance a previous pointing has no influence
    /// \[radians\]
    max_influence_distance: f64,
    /// Over this age a previous pointing has no influence \[s\]
    max_influence_time: f64,
}

impl SkyCoverage {
    pub fn new(staids: Vec<usize>, max_influence_distance: f64, max_influence_time: f64) -> SkyCoverage {
        SkyCoverage {
            staids,
            pv_start: vec![],
            pv_end: vec![],
            max_influence_distance,
            max_influence_time,
        }
    }

    pub fn staids(&self) -> &[usize] {
        &self.staids
    }

    /// Number of recorded scans per member station.
    pub fn len(&self) -> usize {
        self.pv_end.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pv_end.is_empty()
    }

    /// Novelty of a proposed pointing against everything recorded:
    /// the closest recorded pointing dominates.
    pub fn calc_score(&self, pv: &PointingVector) -> f64 {
        let mut min_score = 1.0;
        for pv_old in &self.pv_end {
            let score = self.score_per_pointing_vector(pv, pv_old);
            if score < min_score {
                min_score = score;
            }
        }
        min_score
    }

    /// Influence of one recorded pointing on a proposed one.
    fn score_per_pointing_vector(&self, pv_new: &PointingVector, pv_old: &PointingVector) -> f64 {
        let delta_time = f64::from(pv_new.time) - f64::from(pv_old.time);
        if delta_time > self.max_influence_time {
            return 1.0;
        }

        // Elevation difference alone can rule out any influence.
        if (pv_new.el - pv_old.el).abs() > self.max_influence_distance {
            return 1.0;
        }

        let distance = angular_distance(pv_new, pv_old);
        if distance > self.max_influence_distance {
            return 1.0;
        }

        let score_distance = 0.5 + 0.5 * cos_lookup(distance * PI / self.max_influence_distance);
        let score_time = 0.5 + 0.5 * cos_lookup(delta_time * PI / self.max_influence_time);
        1.0 - score_distance * score_time
    }

    /// Record a committed scan of a member station. The log is
    /// append-only.
    pub fn update(&mut self, start: &PointingVector, end: &PointingVector) {
        self.pv_start.push(*start);
        self.pv_end.push(*end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pv(az_deg: f64, el_deg: f64, time: u32) -> PointingVector {
        let mut pv = PointingVector::new(0, 0);
        pv.az = az_deg * DEG2RAD;
        pv.el = el_deg * DEG2RAD;
        pv.time = time;
        pv
    }

    fn coverage() -> SkyCoverage {
        SkyCoverage::new(vec![0], 30.0 * DEG2RAD, 3600.0)
    }

    #[test]
    fn empty_history_is_fully_novel() {
        assert_abs_diff_eq!(coverage().calc_score(&pv(100.0, 40.0, 0)), 1.0);
    }

    #[test]
    fn repeating_a_pointing_scores_zero() {
        let mut cov = coverage();
        cov.update(&pv(100.0, 40.0, 0), &pv(100.0, 40.0, 60));
        let score = cov.calc_score(&pv(100.0, 40.0, 60));
        assert_abs_diff_eq!(score, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn influence_fades_with_distance_and_time() {
        let mut cov = coverage();
        cov.update(&pv(100.0, 40.0, 0), &pv(100.0, 40.0, 60));

        let near = cov.calc_score(&pv(105.0, 40.0, 120));
        let far = cov.calc_score(&pv(125.0, 40.0, 120));
        assert!(near < far);

        let soon = cov.calc_score(&pv(105.0, 40.0, 120));
        let late = cov.calc_score(&pv(105.0, 40.0, 3000));
        assert!(soon < late);
    }

    #[test]
    fn outside_influence_radius_is_novel() {
        let mut cov = coverage();
        cov.update(&pv(100.0, 40.0, 0), &pv(100.0, 40.0, 60));
        assert_abs_diff_eq!(cov.calc_score(&pv(100.0, 85.0, 120)), 1.0);
        assert_abs_diff_eq!(cov.calc_score(&pv(100.0, 40.0, 5000)), 1.0);
    }

    #[test]
    fn closest_recorded_pointing_dominates() {
        let mut cov = coverage();
        cov.update(&pv(100.0, 40.0, 0), &pv(100.0, 40.0, 60));
        cov.update(&pv(160.0, 40.0, 0), &pv(160.0, 40.0, 60));
        let score_both = cov.calc_score(&pv(102.0, 40.0, 120));

        let mut cov_single = coverage();
        cov_single.update(&pv(100.0, 40.0, 0), &pv(100.0, 40.0, 60));
        let score_single = cov_single.calc_score(&pv(102.0, 40.0, 120));

        assert_abs_diff_eq!(score_both, score_single, epsilon = 1e-12);
    }

    #[test]
    fn lookup_tables_stay_within_one_percent_of_analytic() {
        let cases = [
            (pv(100.0, 40.0, 0), pv(113.0, 47.0, 0)),
            (pv(10.0, 5.0, 0), pv(350.0, 9.0, 0)),
            (pv(200.0, 70.0, 0), pv(210.0, 60.0, 0)),
        ];
        for (a, b) in cases {
            let analytic = (a.el.sin() * b.el.sin()
                + a.el.cos() * b.el.cos() * (a.az - b.az).cos())
            .clamp(-1.0, 1.0)
            .acos();
            let table = angular_distance(&a, &b);
            assert!(
                (table - analytic).abs() <= 0.01 * analytic.max(1.0 * DEG2RAD),
                "lookup {table} vs analytic {analytic}"
            );
        }

        for x in [0.0, 0.5, 1.0, 2.0, 3.0] {
            assert_abs_diff_eq!(cos_lookup(x), x.cos(), epsilon = 1e-3);
        }
    }
}
