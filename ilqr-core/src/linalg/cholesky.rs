//! Dense Cholesky factorization with a fused positive-definiteness check.
//!
//! The backward sweep needs to (a) test whether the regularized control
//! Hessian is positive definite and (b) solve two linear systems against it.
//! A Cholesky factorization does both: the factorization succeeds exactly
//! when the matrix is positive definite, and the resulting factor serves
//! both solves. The factor buffer is allocated once and reused across knot
//! points, so the sweep itself never touches the heap.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Dense Cholesky errors.
#[derive(Error, Debug)]
pub enum CholeskyError {
    /// Factorization failed (matrix not positive definite)
    #[error("Factorization failed: matrix not positive definite")]
    NotPositiveDefinite,

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },
}

/// Reusable lower-triangular Cholesky factor `A = L Lᵀ`.
#[derive(Debug, Clone)]
pub struct DenseCholesky {
    n: usize,
    l: DMatrix<f64>,
}

impl DenseCholesky {
    /// Allocate a factor buffer for `n × n` matrices.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            l: DMatrix::zeros(n, n),
        }
    }

    /// Factor the symmetric matrix `a` in the preallocated buffer.
    ///
    /// Only the lower triangle of `a` is read. Returns
    /// [`CholeskyError::NotPositiveDefinite`] on any non-positive or
    /// non-finite pivot, leaving the factor in an unusable state until the
    /// next successful call.
    pub fn factor(&mut self, a: &DMatrix<f64>) -> Result<(), CholeskyError> {
        if a.nrows() != self.n || a.ncols() != self.n {
            return Err(CholeskyError::DimensionMismatch {
                expected: self.n,
                actual: a.nrows(),
            });
        }

        let n = self.n;
        let l = &mut self.l;
        for j in 0..n {
            let mut diag = a[(j, j)];
            for k in 0..j {
                diag -= l[(j, k)] * l[(j, k)];
            }
            if !(diag > 0.0) || !diag.is_finite() {
                return Err(CholeskyError::NotPositiveDefinite);
            }
            let root = diag.sqrt();
            l[(j, j)] = root;

            for i in (j + 1)..n {
                let mut v = a[(i, j)];
                for k in 0..j {
                    v -= l[(i, k)] * l[(j, k)];
                }
                l[(i, j)] = v / root;
            }
        }
        Ok(())
    }

    /// Solve `A x = b` in place, overwriting `b` with `x`.
    pub fn solve_in_place(&self, b: &mut DVector<f64>) {
        debug_assert_eq!(b.len(), self.n);
        let n = self.n;
        let l = &self.l;

        // Forward substitution: L y = b
        for i in 0..n {
            let mut v = b[i];
            for k in 0..i {
                v -= l[(i, k)] * b[k];
            }
            b[i] = v / l[(i, i)];
        }

        // Back substitution: Lᵀ x = y
        for i in (0..n).rev() {
            let mut v = b[i];
            for k in (i + 1)..n {
                v -= l[(k, i)] * b[k];
            }
            b[i] = v / l[(i, i)];
        }
    }

    /// Solve `A X = B` in place for a matrix right-hand side, column by
    /// column, overwriting `B` with `X`.
    pub fn solve_mat_in_place(&self, b: &mut DMatrix<f64>) {
        debug_assert_eq!(b.nrows(), self.n);
        let n = self.n;
        let l = &self.l;

        for col in 0..b.ncols() {
            for i in 0..n {
                let mut v = b[(i, col)];
                for k in 0..i {
                    v -= l[(i, k)] * b[(k, col)];
                }
                b[(i, col)] = v / l[(i, i)];
            }
            for i in (0..n).rev() {
                let mut v = b[(i, col)];
                for k in (i + 1)..n {
                    v -= l[(k, i)] * b[(k, col)];
                }
                b[(i, col)] = v / l[(i, i)];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_factor_and_solve_spd() {
        // A = [[4, 2], [2, 3]] is positive definite.
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let mut chol = DenseCholesky::new(2);
        chol.factor(&a).expect("SPD matrix must factor");

        let mut b = DVector::from_row_slice(&[1.0, 2.0]);
        chol.solve_in_place(&mut b);

        let residual = &a * &b - DVector::from_row_slice(&[1.0, 2.0]);
        assert!(residual.amax() < 1e-12);
    }

    #[test]
    fn test_solve_matrix_rhs() {
        let a = DMatrix::from_row_slice(3, 3, &[6.0, 2.0, 1.0, 2.0, 5.0, 2.0, 1.0, 2.0, 4.0]);
        let mut chol = DenseCholesky::new(3);
        chol.factor(&a).unwrap();

        let rhs = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let mut x = rhs.clone();
        chol.solve_mat_in_place(&mut x);

        let recovered = &a * &x;
        for (got, want) in recovered.iter().zip(rhs.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_indefinite_rejected() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let mut chol = DenseCholesky::new(2);
        assert!(matches!(
            chol.factor(&a),
            Err(CholeskyError::NotPositiveDefinite)
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let a = DMatrix::from_row_slice(2, 2, &[f64::NAN, 0.0, 0.0, 1.0]);
        let mut chol = DenseCholesky::new(2);
        assert!(matches!(
            chol.factor(&a),
            Err(CholeskyError::NotPositiveDefinite)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 4.0]);
        let mut chol = DenseCholesky::new(3);
        assert!(matches!(
            chol.factor(&a),
            Err(CholeskyError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
