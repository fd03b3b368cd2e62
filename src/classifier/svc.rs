//! Binary soft-margin support-vector classifier.
//!
//! Fitting uses a simplified sequential minimal optimization with a
//! deterministic working-pair sweep, so repeated runs over the same data
//! produce the same machine. Only the support vectors survive fitting;
//! the fitted state is serde-serializable for artifact persistence.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Kernel functions available to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    /// Plain dot product.
    Linear,
    /// Gaussian radial basis function.
    Rbf {
        /// Width parameter.
        gamma: f32,
    },
}

impl Kernel {
    fn eval(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Kernel::Linear => a.iter().zip(b).map(|(&x, &y)| x * y).sum(),
            Kernel::Rbf { gamma } => {
                let dist_sq: f32 = a.iter().zip(b).map(|(&x, &y)| (x - y) * (x - y)).sum();
                (-gamma * dist_sq).exp()
            }
        }
    }
}

/// Hyperparameters for SVC fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvcParams {
    /// Regularization strength.
    pub c: f32,
    /// KKT violation tolerance.
    pub tol: f32,
    /// Maximum optimization sweeps.
    pub max_iter: usize,
    /// Kernel function.
    pub kernel: Kernel,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-3,
            max_iter: 1000,
            kernel: Kernel::Linear,
        }
    }
}

/// A fitted binary support-vector machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinarySvc {
    kernel: Kernel,
    support_vectors: Vec<Vec<f32>>,
    dual_coef: Vec<f32>,
    intercept: f32,
}

impl BinarySvc {
    /// Fits the machine on rows of `x` with labels `y` in {-1, +1}.
    pub fn fit(x: ArrayView2<'_, f32>, y: &[f32], params: &SvcParams) -> Self {
        let n_samples = x.nrows();
        debug_assert_eq!(n_samples, y.len());

        let rows: Vec<Vec<f32>> = (0..n_samples).map(|i| x.row(i).to_vec()).collect();

        // Precompute the kernel matrix; enrollment sets are small enough
        // that the quadratic cost is acceptable.
        let mut gram = vec![vec![0.0f32; n_samples]; n_samples];
        for i in 0..n_samples {
            for j in i..n_samples {
                let k = params.kernel.eval(&rows[i], &rows[j]);
                gram[i][j] = k;
                gram[j][i] = k;
            }
        }

        let mut alpha = vec![0.0f32; n_samples];
        let mut b = 0.0f32;
        let eps = 1e-5;

        for _ in 0..params.max_iter {
            let mut num_changed = 0;

            for i in 0..n_samples {
                let f_i: f32 = -b
                    + (0..n_samples)
                        .map(|k| alpha[k] * y[k] * gram[i][k])
                        .sum::<f32>();
                let e_i = f_i - y[i];

                let violates = (y[i] * e_i < -params.tol && alpha[i] < params.c)
                    || (y[i] * e_i > params.tol && alpha[i] > 0.0);
                if !violates {
                    continue;
                }

                // Deterministic partner choice keeps refitting reproducible.
                let j = (i + 1) % n_samples;
                if j == i {
                    continue;
                }

                let f_j: f32 = -b
                    + (0..n_samples)
                        .map(|k| alpha[k] * y[k] * gram[j][k])
                        .sum::<f32>();
                let e_j = f_j - y[j];

                let alpha_i_old = alpha[i];
                let alpha_j_old = alpha[j];

                let (low, high) = if y[i] != y[j] {
                    (
                        (alpha[j] - alpha[i]).max(0.0),
                        params.c.min(params.c + alpha[j] - alpha[i]),
                    )
                } else {
                    (
                        (alpha[i] + alpha[j] - params.c).max(0.0),
                        params.c.min(alpha[i] + alpha[j]),
                    )
                };
                if low >= high {
                    continue;
                }

                let eta = 2.0 * gram[i][j] - gram[i][i] - gram[j][j];
                if eta >= 0.0 {
                    continue;
                }

                alpha[j] = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(low, high);
                if (alpha[j] - alpha_j_old).abs() < eps {
                    continue;
                }
                alpha[i] = alpha_i_old + y[i] * y[j] * (alpha_j_old - alpha[j]);

                let b1 = b - e_i
                    - y[i] * (alpha[i] - alpha_i_old) * gram[i][i]
                    - y[j] * (alpha[j] - alpha_j_old) * gram[i][j];
                let b2 = b - e_j
                    - y[i] * (alpha[i] - alpha_i_old) * gram[i][j]
                    - y[j] * (alpha[j] - alpha_j_old) * gram[j][j];

                b = if alpha[i] > 0.0 && alpha[i] < params.c {
                    b1
                } else if alpha[j] > 0.0 && alpha[j] < params.c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                num_changed += 1;
            }

            if num_changed == 0 {
                break;
            }
        }

        let mut support_vectors = Vec::new();
        let mut dual_coef = Vec::new();
        for i in 0..n_samples {
            if alpha[i] > eps {
                support_vectors.push(rows[i].to_vec());
                dual_coef.push(alpha[i] * y[i]);
            }
        }

        Self {
            kernel: params.kernel,
            support_vectors,
            dual_coef,
            intercept: b,
        }
    }

    /// Signed distance of a point from the separating boundary.
    pub fn decision(&self, x: &[f32]) -> f32 {
        let mut value = -self.intercept;
        for (sv, &coef) in self.support_vectors.iter().zip(&self.dual_coef) {
            value += coef * self.kernel.eval(x, sv);
        }
        value
    }

    /// Number of retained support vectors.
    pub fn support_count(&self) -> usize {
        self.support_vectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable_problem() -> (ndarray::Array2<f32>, Vec<f32>) {
        let x = array![
            [1.0_f32, 1.0],
            [1.2, 0.9],
            [0.9, 1.1],
            [-1.0, -1.0],
            [-1.1, -0.8],
            [-0.9, -1.2],
        ];
        let y = vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        (x, y)
    }

    #[test]
    fn fits_linearly_separable_data() {
        let (x, y) = separable_problem();
        let svc = BinarySvc::fit(x.view(), &y, &SvcParams::default());

        assert!(svc.support_count() > 0);
        assert!(svc.decision(&[1.0, 1.0]) > 0.0);
        assert!(svc.decision(&[-1.0, -1.0]) < 0.0);
    }

    #[test]
    fn refitting_is_deterministic() {
        let (x, y) = separable_problem();
        let params = SvcParams::default();
        let a = BinarySvc::fit(x.view(), &y, &params);
        let b = BinarySvc::fit(x.view(), &y, &params);

        let probe = [0.3_f32, -0.2];
        assert_eq!(a.decision(&probe), b.decision(&probe));
        assert_eq!(a.support_count(), b.support_count());
    }

    #[test]
    fn rbf_kernel_separates_nonlinear_data() {
        // inner cluster vs outer ring on one axis
        let x = array![
            [0.0_f32, 0.1],
            [0.1, 0.0],
            [-0.1, 0.0],
            [2.0, 0.0],
            [-2.0, 0.0],
            [0.0, 2.0],
        ];
        let y = vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        let params = SvcParams {
            kernel: Kernel::Rbf { gamma: 1.0 },
            ..SvcParams::default()
        };
        let svc = BinarySvc::fit(x.view(), &y, &params);
        assert!(svc.decision(&[0.0, 0.0]) > svc.decision(&[2.0, 2.0]));
    }

    #[test]
    fn fitted_state_survives_serialization() {
        let (x, y) = separable_problem();
        let svc = BinarySvc::fit(x.view(), &y, &SvcParams::default());

        let bytes = bincode::serialize(&svc).unwrap();
        let restored: BinarySvc = bincode::deserialize(&bytes).unwrap();
        let probe = [0.5_f32, 0.5];
        assert_eq!(svc.decision(&probe), restored.decision(&probe));
    }
}
