//! Unscented Transform
//!
//! ## Overview
//!
//! The unscented transform propagates a Gaussian through a nonlinear
//! function without linearizing it. A small deterministic set of sigma
//! points captures the mean and covariance exactly; each point is pushed
//! through the function and the results are recombined with fixed
//! weights.
//!
//! ## Merwe Scaled Sigma Points
//!
//! ```text
//! λ    = α²(n + κ) − n
//! χ₀   = x
//! χᵢ   = x + (√((n+λ)P))ᵢ        i = 1..n
//! χᵢ₊ₙ = x − (√((n+λ)P))ᵢ        i = 1..n
//!
//! Wm₀ = λ / (n+λ)
//! Wc₀ = λ / (n+λ) + (1 − α² + β)
//! Wᵢ  = 1 / (2(n+λ))             i = 1..2n
//! ```
//!
//! `α` sets the spread, `κ` is a secondary scaling, `β` encodes prior
//! knowledge of the distribution (2 is optimal for a Gaussian).
//!
//! ## Failure Mode
//!
//! The matrix square root is a Cholesky factor. When the covariance has
//! drifted away from positive definite, the factorization is retried once
//! with a small diagonal load. A second failure is reported as
//! [`FusionError::NumericalInstability`](crate::FusionError) and no sigma
//! points are produced.
//!
//! ## Usage Example
//!
//! ```rust
//! use nalgebra::{Matrix2, Vector2};
//! use vitalfuse_core::fusion::unscented::{SigmaParams, UnscentedTransform};
//!
//! let ut = UnscentedTransform::<2>::new(SigmaParams::default());
//! let sigma = ut.sigma_points(&Vector2::new(1.0, 2.0), &Matrix2::identity()).unwrap();
//! assert_eq!(sigma.len(), 5);
//!
//! // Linear map: recovered exactly
//! let (mean, cov) = ut.propagate(&sigma, |x| x * 2.0);
//! assert!((mean[0] - 2.0).abs() < 1e-9);
//! assert!((cov[(1, 1)] - 4.0).abs() < 1e-9);
//! ```

use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::{
    constants::filter::{REGULARIZATION_EPSILON, UKF_ALPHA, UKF_BETA, UKF_KAPPA},
    errors::FusionResult,
    fusion::matrix::cholesky_lower,
};

/// Sigma point scaling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaParams {
    /// Spread of the sigma points around the mean
    pub alpha: f64,
    /// Distribution prior weighting
    pub beta: f64,
    /// Secondary scaling
    pub kappa: f64,
}

impl Default for SigmaParams {
    fn default() -> Self {
        Self {
            alpha: UKF_ALPHA,
            beta: UKF_BETA,
            kappa: UKF_KAPPA,
        }
    }
}

/// The 2n+1 sigma points of one mean/covariance pair
///
/// Ephemeral: regenerated for every predict and every update.
#[derive(Debug, Clone)]
pub struct SigmaPoints<const N: usize> {
    mean: SVector<f64, N>,
    points: Vec<SVector<f64, N>>,
}

impl<const N: usize> SigmaPoints<N> {
    /// The mean the points were generated around
    pub fn mean(&self) -> &SVector<f64, N> {
        &self.mean
    }

    /// Points in weight order (χ₀ first)
    pub fn points(&self) -> &[SVector<f64, N>] {
        &self.points
    }

    /// Always 2N + 1
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Never true for a generated set
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Result of pushing sigma points through a measurement function
#[derive(Debug, Clone)]
pub struct Transformed {
    /// Predicted mean of the output
    pub mean: DVector<f64>,
    /// Predicted covariance of the output (without measurement noise)
    pub covariance: DMatrix<f64>,
    /// Cross covariance between state and output, N × m
    pub cross_covariance: DMatrix<f64>,
}

/// Weights and parameters for an N-dimensional unscented transform
#[derive(Debug, Clone)]
pub struct UnscentedTransform<const N: usize> {
    params: SigmaParams,
    lambda: f64,
    mean_weights: Vec<f64>,
    cov_weights: Vec<f64>,
    regularization: f64,
}

impl<const N: usize> UnscentedTransform<N> {
    /// Precompute weights for `params`
    pub fn new(params: SigmaParams) -> Self {
        let n = N as f64;
        let alpha_sq = params.alpha * params.alpha;
        let lambda = alpha_sq * (n + params.kappa) - n;

        let w0 = lambda / (n + lambda);
        let wi = 1.0 / (2.0 * (n + lambda));

        let mut mean_weights = vec![wi; 2 * N + 1];
        let mut cov_weights = vec![wi; 2 * N + 1];
        mean_weights[0] = w0;
        cov_weights[0] = w0 + (1.0 - alpha_sq + params.beta);

        Self {
            params,
            lambda,
            mean_weights,
            cov_weights,
            regularization: REGULARIZATION_EPSILON,
        }
    }

    /// Diagonal load used when the first decomposition fails
    pub fn with_regularization(mut self, epsilon: f64) -> Self {
        self.regularization = epsilon;
        self
    }

    /// Scaling parameters
    pub fn params(&self) -> SigmaParams {
        self.params
    }

    /// Composite scaling λ
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Mean weights Wm
    pub fn mean_weights(&self) -> &[f64] {
        &self.mean_weights
    }

    /// Covariance weights Wc
    pub fn cov_weights(&self) -> &[f64] {
        &self.cov_weights
    }

    /// Generate sigma points around `mean` with spread from `covariance`
    pub fn sigma_points(
        &self,
        mean: &SVector<f64, N>,
        covariance: &SMatrix<f64, N, N>,
    ) -> FusionResult<SigmaPoints<N>> {
        let scaled = covariance * (N as f64 + self.lambda);
        let root = cholesky_lower(&scaled, self.regularization, "sigma point generation")?;

        let mut points = Vec::with_capacity(2 * N + 1);
        points.push(*mean);
        let columns: Vec<SVector<f64, N>> = (0..N).map(|i| root.column(i).into_owned()).collect();
        for column in &columns {
            points.push(mean + column);
        }
        for column in &columns {
            points.push(mean - column);
        }

        Ok(SigmaPoints { mean: *mean, points })
    }

    /// Push sigma points through a state-to-state function
    ///
    /// Returns the recombined mean and covariance. Process noise is the
    /// caller's business.
    pub fn propagate<F>(&self, sigma: &SigmaPoints<N>, mut f: F) -> (SVector<f64, N>, SMatrix<f64, N, N>)
    where
        F: FnMut(&SVector<f64, N>) -> SVector<f64, N>,
    {
        let moved: Vec<SVector<f64, N>> = sigma.points.iter().map(|p| f(p)).collect();

        let mut mean = SVector::<f64, N>::zeros();
        for (w, p) in self.mean_weights.iter().zip(&moved) {
            mean += p * *w;
        }

        let mut covariance = SMatrix::<f64, N, N>::zeros();
        for (w, p) in self.cov_weights.iter().zip(&moved) {
            let d = p - mean;
            covariance += d * d.transpose() * *w;
        }

        (mean, covariance)
    }

    /// Push sigma points through a state-to-measurement function
    ///
    /// `h` writes the `out_dim` predicted observables for one state into
    /// the provided slice.
    pub fn transform<F>(&self, sigma: &SigmaPoints<N>, out_dim: usize, mut h: F) -> Transformed
    where
        F: FnMut(&SVector<f64, N>, &mut [f64]),
    {
        let count = sigma.points.len();
        let mut outputs = DMatrix::<f64>::zeros(out_dim, count);
        let mut scratch = vec![0.0; out_dim];

        for (i, point) in sigma.points.iter().enumerate() {
            h(point, &mut scratch);
            for (k, value) in scratch.iter().enumerate() {
                outputs[(k, i)] = *value;
            }
        }

        let mut mean = DVector::<f64>::zeros(out_dim);
        for (i, w) in self.mean_weights.iter().enumerate() {
            for k in 0..out_dim {
                mean[k] += w * outputs[(k, i)];
            }
        }

        let mut covariance = DMatrix::<f64>::zeros(out_dim, out_dim);
        let mut cross_covariance = DMatrix::<f64>::zeros(N, out_dim);
        for (i, w) in self.cov_weights.iter().enumerate() {
            let dz = DVector::from_fn(out_dim, |k, _| outputs[(k, i)] - mean[k]);
            let dx = sigma.points[i] - sigma.mean;

            for r in 0..out_dim {
                for c in 0..out_dim {
                    covariance[(r, c)] += w * dz[r] * dz[c];
                }
            }
            for r in 0..N {
                for c in 0..out_dim {
                    cross_covariance[(r, c)] += w * dx[r] * dz[c];
                }
            }
        }

        Transformed { mean, covariance, cross_covariance }
    }
}

impl<const N: usize> Default for UnscentedTransform<N> {
    fn default() -> Self {
        Self::new(SigmaParams::default())
    }
}
