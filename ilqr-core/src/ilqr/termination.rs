//! Convergence tests for the outer loop.
//!
//! Checks, in order:
//! - Cost decrease below tolerance (strictly positive, so a fallback
//!   iteration with dJ = 0 never reads as converged)
//! - Normalized feedforward gradient below tolerance
//! - Stall: too many consecutive failed forward passes
//! - Iteration budget exhausted

use nalgebra::DVector;

use crate::problem::{ConvergenceCriterion, SolveStatus, SolverSettings};
use crate::traj::Trajectory;

/// Check termination conditions after one recorded iteration.
///
/// Returns `Some((status, criterion))` if the solve should stop, `None`
/// otherwise.
pub(crate) fn check_termination(
    dj: f64,
    gradient: f64,
    iter: usize,
    dj_zero_counter: usize,
    settings: &SolverSettings,
) -> Option<(SolveStatus, Option<ConvergenceCriterion>)> {
    if dj > 0.0 && dj < settings.cost_tolerance {
        return Some((SolveStatus::Solved, Some(ConvergenceCriterion::CostTolerance)));
    }
    if gradient < settings.gradient_norm_tolerance {
        return Some((
            SolveStatus::Solved,
            Some(ConvergenceCriterion::GradientTolerance),
        ));
    }
    if dj_zero_counter > settings.dj_counter_limit {
        return Some((SolveStatus::Stalled, None));
    }
    if iter + 1 >= settings.iterations {
        return Some((SolveStatus::MaxIterations, None));
    }
    None
}

/// Normalized feedforward magnitude: the mean over knots of the largest
/// component of `|d| / (|u| + 1)`. Estimates how much the policy still wants
/// to change, scaled by the size of the controls already in use.
pub(crate) fn feedforward_gradient(gains_d: &[DVector<f64>], traj: &Trajectory) -> f64 {
    debug_assert!(!gains_d.is_empty());
    let mut total = 0.0;
    for (d, kp) in gains_d.iter().zip(traj.knots.iter()) {
        let mut worst = 0.0_f64;
        for j in 0..d.len() {
            worst = worst.max(d[j].abs() / (kp.u[j].abs() + 1.0));
        }
        total += worst;
    }
    total / gains_d.len() as f64
}
