//! Knot-point trajectory storage.
//!
//! A trajectory is a fixed-length sequence of `(state, control, dt)` knot
//! points. The solver keeps two instances: the accepted trajectory and a
//! candidate written by the forward pass. Acceptance is an element-wise copy
//! rather than a buffer swap, so the rollout can keep reading the accepted
//! states while it writes candidate ones without aliasing.

use nalgebra::DVector;

/// One discrete time step: state, control, and step duration.
///
/// The control of the final knot is carried for uniform storage but never
/// read by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotPoint {
    /// State x ∈ ℝⁿ
    pub x: DVector<f64>,
    /// Control u ∈ ℝᵐ
    pub u: DVector<f64>,
    /// Step duration
    pub dt: f64,
}

impl KnotPoint {
    /// Zero-initialized knot point with the given dimensions.
    pub fn zeros(state_dim: usize, control_dim: usize, dt: f64) -> Self {
        Self {
            x: DVector::zeros(state_dim),
            u: DVector::zeros(control_dim),
            dt,
        }
    }
}

/// Fixed-length sequence of knot points with uniform dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// Knot points, index 0 is the initial state
    pub knots: Vec<KnotPoint>,
}

impl Trajectory {
    /// Zero-initialized trajectory of `num_knots` points.
    pub fn zeros(state_dim: usize, control_dim: usize, num_knots: usize, dt: f64) -> Self {
        Self {
            knots: (0..num_knots)
                .map(|_| KnotPoint::zeros(state_dim, control_dim, dt))
                .collect(),
        }
    }

    /// Number of knot points.
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    /// True when the trajectory holds no knot points.
    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Element-wise copy of `other` into `self`. Both trajectories must have
    /// the same length and dimensions; no buffers are reallocated.
    pub fn copy_from(&mut self, other: &Trajectory) {
        debug_assert_eq!(self.knots.len(), other.knots.len());
        for (dst, src) in self.knots.iter_mut().zip(other.knots.iter()) {
            dst.x.copy_from(&src.x);
            dst.u.copy_from(&src.u);
            dst.dt = src.dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_is_element_wise() {
        let mut dst = Trajectory::zeros(2, 1, 3, 0.1);
        let mut src = Trajectory::zeros(2, 1, 3, 0.1);
        src.knots[1].x[0] = 5.0;
        src.knots[1].u[0] = -2.0;

        dst.copy_from(&src);
        assert_eq!(dst, src);

        // Mutating the source afterwards must not leak into the copy.
        src.knots[1].x[0] = 9.0;
        assert_eq!(dst.knots[1].x[0], 5.0);
    }
}
