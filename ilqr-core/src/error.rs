//! Error types for the trajectory optimizer.

use thiserror::Error;

/// Errors that can escape the solver boundary.
///
/// Recoverable numerical conditions (non-finite rollouts, indefinite control
/// Hessians, exhausted line searches) are handled inside the solve loop and
/// reported through [`crate::problem::SolveStatus`] instead.
#[derive(Error, Debug)]
pub enum IlqrError {
    /// Problem validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Accepted cost increased after the line-search fallback clamped it.
    /// The fallback must return the previous cost, so this indicates a bug
    /// in the solver rather than a property of the problem.
    #[error("cost increased during forward pass at iteration {iteration}")]
    CostIncreased {
        /// Outer iteration at which the invariant was violated
        iteration: usize,
    },
}

/// Result type for solver operations.
pub type IlqrResult<T> = Result<T, IlqrError>;
