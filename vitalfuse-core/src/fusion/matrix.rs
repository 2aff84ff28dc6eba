//! Matrix helpers for covariance hygiene
//!
//! Floating-point error slowly pushes a covariance away from symmetric
//! positive semi-definite. These helpers detect that and put it back:
//!
//! ```text
//! make_symmetric   P ← (P + Pᵀ) / 2
//! cholesky_lower   L = chol(P); on failure P ← sym(P) + εI, retry once
//! repair_psd       P = V Λ Vᵀ; Λ ← max(Λ, floor); P ← V Λ Vᵀ
//! invert_spd       S⁻¹ through Cholesky, same single regularization retry
//! ```
//!
//! Eigen decompositions go through a dynamic matrix so the helpers stay
//! generic over the state dimension.

use nalgebra::{DMatrix, SMatrix, SVector};

use crate::{
    constants::STATE_DIM,
    errors::{FusionError, FusionResult},
};

/// Estimator state vector
pub type StateVector = SVector<f64, STATE_DIM>;

/// Estimator state covariance
pub type StateCovariance = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// Average a square matrix with its transpose
pub fn make_symmetric<const N: usize>(m: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    (m + m.transpose()) * 0.5
}

/// Dynamic counterpart of [`make_symmetric`]
pub fn make_symmetric_dyn(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// True when every entry is finite
pub fn is_finite<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Lower Cholesky factor, regularizing once on failure
///
/// Non-finite input fails immediately: nalgebra's decomposition only
/// rejects non-positive pivots, and NaN pivots slip through that test.
pub fn cholesky_lower<const N: usize>(
    m: &SMatrix<f64, N, N>,
    epsilon: f64,
    stage: &'static str,
) -> FusionResult<SMatrix<f64, N, N>> {
    if !is_finite(m) {
        return Err(FusionError::NumericalInstability { stage });
    }

    if let Some(chol) = m.cholesky() {
        return Ok(chol.l());
    }

    let mut loaded = make_symmetric(m);
    for i in 0..N {
        loaded[(i, i)] += epsilon;
    }

    match loaded.cholesky() {
        Some(chol) => {
            log::debug!("{}: cholesky needed diagonal loading of {:e}", stage, epsilon);
            Ok(chol.l())
        }
        None => Err(FusionError::NumericalInstability { stage }),
    }
}

/// Inverse of a symmetric positive definite matrix, regularizing once on failure
pub fn invert_spd(m: &DMatrix<f64>, epsilon: f64, stage: &'static str) -> FusionResult<DMatrix<f64>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(FusionError::NumericalInstability { stage });
    }

    let symmetric = make_symmetric_dyn(m);
    if let Some(chol) = symmetric.clone().cholesky() {
        return Ok(chol.inverse());
    }

    let mut loaded = symmetric;
    for i in 0..loaded.nrows() {
        loaded[(i, i)] += epsilon;
    }

    match loaded.cholesky() {
        Some(chol) => {
            log::debug!("{}: inversion needed diagonal loading of {:e}", stage, epsilon);
            Ok(chol.inverse())
        }
        None => Err(FusionError::NumericalInstability { stage }),
    }
}

/// Clamp eigenvalues to `floor`, returning the repaired matrix
pub fn repair_psd<const N: usize>(m: &SMatrix<f64, N, N>, floor: f64) -> SMatrix<f64, N, N> {
    let dynamic = DMatrix::from_column_slice(N, N, make_symmetric(m).as_slice());
    let eig = dynamic.symmetric_eigen();

    let mut values = eig.eigenvalues.clone();
    for v in values.iter_mut() {
        *v = v.max(floor);
    }

    let rebuilt = &eig.eigenvectors * DMatrix::from_diagonal(&values) * eig.eigenvectors.transpose();
    make_symmetric(&SMatrix::<f64, N, N>::from_column_slice(rebuilt.as_slice()))
}

/// Smallest eigenvalue of a symmetric matrix
pub fn min_eigenvalue<const N: usize>(m: &SMatrix<f64, N, N>) -> f64 {
    let dynamic = DMatrix::from_column_slice(N, N, make_symmetric(m).as_slice());
    dynamic
        .symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix2;

    #[test]
    fn symmetric_average() {
        let m = Matrix2::new(1.0, 2.0, 4.0, 3.0);
        let s = make_symmetric(&m);
        assert_eq!(s[(0, 1)], 3.0);
        assert_eq!(s[(1, 0)], 3.0);
        assert_eq!(s[(0, 0)], 1.0);
    }

    #[test]
    fn cholesky_regularizes_singular_once() {
        let zero = Matrix2::<f64>::zeros();
        let l = cholesky_lower(&zero, 1e-6, "test").unwrap();
        assert!((l[(0, 0)] - 1e-3).abs() < 1e-9);
    }

    #[test]
    fn cholesky_fails_on_indefinite_or_nan() {
        let neg = Matrix2::new(-1.0, 0.0, 0.0, -1.0);
        assert_eq!(
            cholesky_lower(&neg, 1e-6, "test"),
            Err(FusionError::NumericalInstability { stage: "test" })
        );

        let nan = Matrix2::new(f64::NAN, 0.0, 0.0, 1.0);
        assert!(cholesky_lower(&nan, 1e-6, "test").is_err());
    }

    #[test]
    fn repair_clamps_negative_eigenvalues() {
        // eigenvalues 3 and -1
        let m = Matrix2::new(1.0, 2.0, 2.0, 1.0);
        assert!(min_eigenvalue(&m) < 0.0);

        let fixed = repair_psd(&m, 1e-9);
        assert!(min_eigenvalue(&fixed) >= 0.0);
        assert!((fixed[(0, 1)] - fixed[(1, 0)]).abs() < 1e-12);
    }

    #[test]
    fn invert_spd_matches_identity() {
        let s = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let inv = invert_spd(&s, 1e-9, "test").unwrap();
        let product = &s * &inv;
        assert!((product[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(product[(0, 1)].abs() < 1e-12);
    }
}
