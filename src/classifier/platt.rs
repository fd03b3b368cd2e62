//! Platt sigmoid calibration of decision values.
//!
//! Maps raw SVM decision values to probabilities through a sigmoid of a
//! fitted affine transform of the score. Targets use Laplace smoothing
//! and the two parameters are found with Newton's method plus a
//! backtracking line search.

use serde::{Deserialize, Serialize};

const MAX_ITER: usize = 100;
const TOL: f32 = 1e-5;

/// A fitted sigmoid calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    a: f32,
    b: f32,
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn nll(scores: &[f32], targets: &[f32], a: f32, b: f32) -> f32 {
    scores
        .iter()
        .zip(targets)
        .map(|(&s, &t)| {
            let p = sigmoid(a * s + b);
            -(t * p.max(1e-10).ln() + (1.0 - t) * (1.0 - p).max(1e-10).ln())
        })
        .sum()
}

impl PlattScaling {
    /// Fits the calibrator on decision values and boolean labels.
    pub fn fit(scores: &[f32], labels: &[bool]) -> Self {
        debug_assert_eq!(scores.len(), labels.len());
        let n_samples = scores.len();
        let n_pos = labels.iter().filter(|&&l| l).count();
        let n_neg = n_samples - n_pos;

        // Laplace-smoothed targets keep the fit finite on separable data.
        let t_pos = (n_pos as f32 + 1.0) / (n_pos as f32 + 2.0);
        let t_neg = 1.0 / (n_neg as f32 + 2.0);
        let targets: Vec<f32> = labels
            .iter()
            .map(|&l| if l { t_pos } else { t_neg })
            .collect();

        let mut a = 0.0f32;
        let mut b = (((n_neg + 1) as f32) / ((n_pos + 1) as f32)).ln();

        let min_step = 1e-10;
        let ridge = 1e-12;

        for _ in 0..MAX_ITER {
            let mut g_a = 0.0f32;
            let mut g_b = 0.0f32;
            let mut h_aa = ridge;
            let mut h_bb = ridge;
            let mut h_ab = 0.0f32;

            for i in 0..n_samples {
                let p = sigmoid(a * scores[i] + b);
                let d1 = p - targets[i];
                let d2 = p * (1.0 - p);
                g_a += scores[i] * d1;
                g_b += d1;
                h_aa += scores[i] * scores[i] * d2;
                h_bb += d2;
                h_ab += scores[i] * d2;
            }

            let det = h_aa * h_bb - h_ab * h_ab;
            if det.abs() < 1e-10 {
                break;
            }
            let da = -(h_bb * g_a - h_ab * g_b) / det;
            let db = -(-h_ab * g_a + h_aa * g_b) / det;

            let current = nll(scores, &targets, a, b);
            let mut step = 1.0f32;
            let mut accepted = false;
            while step > min_step {
                let candidate_a = a + step * da;
                let candidate_b = b + step * db;
                if nll(scores, &targets, candidate_a, candidate_b) < current {
                    a = candidate_a;
                    b = candidate_b;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                break;
            }

            if da.abs() < TOL && db.abs() < TOL {
                break;
            }
        }

        Self { a, b }
    }

    /// Calibrated probability for one decision value.
    pub fn probability(&self, score: f32) -> f32 {
        sigmoid(self.a * score + self.b)
    }
}
