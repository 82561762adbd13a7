//! Iterative LQR solver.
//!
//! Implements the zero-order-hold, dense, unconstrained iLQR loop:
//! - Backward Riccati sweep with Levenberg-Marquardt damping
//! - Forward closed-loop rollout with a backtracking line search
//! - Damping controller tied to sweep and line-search outcomes
//! - Outer driver with cost, gradient, and stall based termination

pub mod backward;
pub mod diagnostics;
pub mod forward;
pub mod regularization;
pub mod solve;
pub mod termination;
pub mod workspace;

pub use diagnostics::TraceLevel;
pub use forward::rollout_open_loop;
pub use regularization::Regularization;
pub use solve::solve_ilqr;
pub use workspace::{CostToGo, DynamicsExpansion, IlqrWorkspace};
