//! ilqr-core: an iterative LQR trajectory optimizer
//!
//! This library computes locally optimal control sequences for discrete-time
//! nonlinear systems with quadratic stage and terminal costs by iterating a
//! quadratic approximation of the Bellman equation:
//!
//! - **Backward Riccati sweep** producing feedback and feedforward gains
//! - **Forward closed-loop rollout** with a backtracking line search
//! - **Levenberg-Marquardt damping** keeping the control Hessian positive
//!   definite
//! - **Outer loop** with cost, gradient, and stall based termination
//!
//! Dynamics and costs are supplied through the [`Dynamics`] and
//! [`CostFunction`] oracle traits; the [`models`] module ships small
//! reference systems.
//!
//! # Example
//!
//! ```
//! use ilqr_core::{solve, Problem, SolverSettings, SolveStatus};
//! use ilqr_core::models::{DoubleIntegrator, QuadraticCost};
//! use nalgebra::dvector;
//!
//! let mut cost = QuadraticCost::regulator(2, 1);
//! cost.qf *= 100.0;
//! let prob = Problem::new(DoubleIntegrator, cost, dvector![1.0, 0.0], 51, 0.1);
//!
//! let result = solve(&prob, &SolverSettings::default()).unwrap();
//! assert_eq!(result.status, SolveStatus::Solved);
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // sweep and rollout kernels take many buffers

pub mod error;
pub mod ilqr;
pub mod linalg;
pub mod models;
pub mod problem;
pub mod traj;

// Re-export main types
pub use error::{IlqrError, IlqrResult};
pub use problem::{
    trajectory_cost, ConvergenceCriterion, CostExpansion, CostFunction, Dynamics, Problem,
    RegularizationType, SolveInfo, SolveResult, SolveStatus, SolverSettings,
};
pub use traj::{KnotPoint, Trajectory};

use ilqr::solve_ilqr;

/// Main solve entry point.
///
/// Runs the iLQR loop on `prob` under `settings` and returns the accepted
/// trajectory together with per-iteration statistics. Numerical trouble the
/// solver recovered from (or stalled on) is reported through
/// [`SolveStatus`]; an `Err` means the problem was malformed or an internal
/// invariant broke.
pub fn solve<D: Dynamics, C: CostFunction>(
    prob: &Problem<D, C>,
    settings: &SolverSettings,
) -> IlqrResult<SolveResult> {
    solve_ilqr(prob, settings)
}
