//! Dense linear algebra kernels for the solver hot loop.
//!
//! The control Hessians factored here are small (m rarely exceeds a couple
//! dozen), so everything is dense and allocation-free: factorizations and
//! solves reuse buffers owned by the solver workspace.

pub mod cholesky;

pub use cholesky::{CholeskyError, DenseCholesky};

use nalgebra::DMatrix;

/// Replace `m` with `(m + mᵀ) / 2` in place.
///
/// Quadratic-model Hessians are symmetric analytically, but accumulated
/// floating-point products drift off symmetry. The sweep relies on exact
/// symmetry of the cost-to-go, so it is re-imposed after every accumulation.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    debug_assert_eq!(n, m.ncols());
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetrize() {
        let mut m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        symmetrize(&mut m);
        assert_eq!(m[(0, 1)], 3.0);
        assert_eq!(m[(1, 0)], 3.0);
        assert_eq!(m[(0, 0)], 1.0);
    }
}
