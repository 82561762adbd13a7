//! Problem data structures, oracle traits, and solver configuration.
//!
//! This module defines the canonical trajectory-optimization problem
//! representation and all associated types.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::error::IlqrError;
use crate::traj::Trajectory;

/// Discrete-time dynamics oracle.
///
/// Implementations must be pure and deterministic: the solver relies on
/// re-evaluating the dynamics at identical points producing identical
/// results. Invalid operating points are signalled by writing non-finite
/// components into `x_next`; the rollout treats those as a failed step.
pub trait Dynamics {
    /// State dimension n.
    fn state_dim(&self) -> usize;

    /// Control dimension m.
    fn control_dim(&self) -> usize;

    /// Propagate one step: write `f(x, u, dt)` into `x_next`.
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64, x_next: &mut DVector<f64>);

    /// Write the Jacobians `∂f/∂x` into `a` (n × n) and `∂f/∂u` into `b`
    /// (n × m), evaluated at the operating point `(x, u)`.
    fn jacobians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        dt: f64,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
    );
}

/// Second-order expansion of the cost at one knot point.
///
/// Stage expansions populate all five blocks; terminal expansions populate
/// only `qx` and `qxx`. `qxx` and `quu` must be written symmetric.
#[derive(Debug, Clone)]
pub struct CostExpansion {
    /// Gradient w.r.t. state (n)
    pub qx: DVector<f64>,
    /// Gradient w.r.t. control (m)
    pub qu: DVector<f64>,
    /// Hessian w.r.t. state (n × n)
    pub qxx: DMatrix<f64>,
    /// Hessian w.r.t. control (m × m)
    pub quu: DMatrix<f64>,
    /// Mixed Hessian, control rows by state columns (m × n)
    pub qux: DMatrix<f64>,
}

impl CostExpansion {
    /// Zero-initialized expansion for the given dimensions.
    pub fn zeros(state_dim: usize, control_dim: usize) -> Self {
        Self {
            qx: DVector::zeros(state_dim),
            qu: DVector::zeros(control_dim),
            qxx: DMatrix::zeros(state_dim, state_dim),
            quu: DMatrix::zeros(control_dim, control_dim),
            qux: DMatrix::zeros(control_dim, state_dim),
        }
    }
}

/// Trajectory cost oracle.
///
/// The scalar costs must agree with the expansions at zero deviation: the
/// line search compares actual against model-predicted decrease, and a
/// mismatched oracle shows up as a persistently rejected step.
pub trait CostFunction {
    /// Stage cost at one interior knot.
    fn stage(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> f64;

    /// Terminal cost at the final knot.
    fn terminal(&self, x: &DVector<f64>) -> f64;

    /// Write the quadratic model of the stage cost into `exp` (all blocks).
    fn stage_expansion(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64, exp: &mut CostExpansion);

    /// Write the quadratic model of the terminal cost into `exp.qx` and
    /// `exp.qxx`; the control blocks are left untouched.
    fn terminal_expansion(&self, x: &DVector<f64>, exp: &mut CostExpansion);
}

/// Trajectory optimization problem.
///
/// Bundles the two oracles with the initial state, the control
/// initialization, and the discretization. Knot `0` carries the initial
/// state; the final knot's control is unused.
#[derive(Debug, Clone)]
pub struct Problem<D, C> {
    /// Discrete dynamics oracle
    pub dynamics: D,
    /// Cost oracle
    pub cost: C,
    /// Initial state x₀ (length n)
    pub x0: DVector<f64>,
    /// Initial controls, one per interior knot (length `num_knots - 1`)
    pub u_init: Vec<DVector<f64>>,
    /// Number of knot points N
    pub num_knots: usize,
    /// Uniform step duration
    pub dt: f64,
}

impl<D: Dynamics, C: CostFunction> Problem<D, C> {
    /// Build a problem with zero initial controls.
    pub fn new(dynamics: D, cost: C, x0: DVector<f64>, num_knots: usize, dt: f64) -> Self {
        let m = dynamics.control_dim();
        Self {
            dynamics,
            cost,
            x0,
            u_init: (0..num_knots.saturating_sub(1))
                .map(|_| DVector::zeros(m))
                .collect(),
            num_knots,
            dt,
        }
    }

    /// State dimension n.
    pub fn state_dim(&self) -> usize {
        self.dynamics.state_dim()
    }

    /// Control dimension m.
    pub fn control_dim(&self) -> usize {
        self.dynamics.control_dim()
    }

    /// Validate dimensional consistency before solving.
    pub fn validate(&self) -> Result<(), IlqrError> {
        let n = self.state_dim();
        let m = self.control_dim();

        if self.num_knots < 2 {
            return Err(IlqrError::InvalidProblem(format!(
                "need at least 2 knot points, got {}",
                self.num_knots
            )));
        }
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(IlqrError::InvalidProblem(format!(
                "step duration must be positive and finite, got {}",
                self.dt
            )));
        }
        if self.x0.len() != n {
            return Err(IlqrError::InvalidProblem(format!(
                "initial state has length {}, expected {}",
                self.x0.len(),
                n
            )));
        }
        if self.x0.iter().any(|v| !v.is_finite()) {
            return Err(IlqrError::InvalidProblem(
                "initial state has non-finite components".to_string(),
            ));
        }
        if self.u_init.len() != self.num_knots - 1 {
            return Err(IlqrError::InvalidProblem(format!(
                "initial controls have length {}, expected {}",
                self.u_init.len(),
                self.num_knots - 1
            )));
        }
        for (k, u) in self.u_init.iter().enumerate() {
            if u.len() != m {
                return Err(IlqrError::InvalidProblem(format!(
                    "initial control {} has length {}, expected {}",
                    k,
                    u.len(),
                    m
                )));
            }
        }
        Ok(())
    }
}

/// Total cost of a trajectory: stage costs over the interior knots plus the
/// terminal cost at the last knot.
pub fn trajectory_cost<C: CostFunction>(cost: &C, traj: &Trajectory) -> f64 {
    let nk = traj.len();
    let mut total = 0.0;
    for kp in &traj.knots[..nk - 1] {
        total += cost.stage(&kp.x, &kp.u, kp.dt);
    }
    total + cost.terminal(&traj.knots[nk - 1].x)
}

/// Which Hessian the Levenberg-Marquardt damping is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularizationType {
    /// `Quu + ρ BᵀB`, `Qux + ρ BᵀA`: damps through the dynamics, equivalent
    /// to penalizing deviation in the next state
    State,
    /// `Quu + ρ I`: damps the control directly
    Control,
}

/// Solver settings and parameters.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Maximum number of outer iterations
    pub iterations: usize,

    /// Convergence threshold on a strictly positive cost decrease
    pub cost_tolerance: f64,

    /// Convergence threshold on the normalized feedforward gradient
    pub gradient_norm_tolerance: f64,

    /// Early-abort threshold on divergent cost
    pub max_cost_value: f64,

    /// Per-component magnitude limit on states and controls during rollout
    pub max_state_value: f64,

    /// Which Hessian the damping ρ is applied to
    pub bp_reg_type: RegularizationType,

    /// Initial damping ρ
    pub bp_reg_initial: f64,

    /// Multiplicative damping rate φ (must be > 1)
    pub bp_reg_increase_factor: f64,

    /// Floor for nonzero damping; ρ collapses to exactly 0 below it
    pub bp_reg_min: f64,

    /// Ceiling clamp on ρ after an increase
    pub bp_reg_max: f64,

    /// One-shot ρ bump applied when the line search exhausts its budget
    pub bp_reg_fp: f64,

    /// Backward-sweep restart budget per outer iteration
    pub bp_sweep_retry_limit: usize,

    /// Maximum backtracking line-search iterations
    pub iterations_linesearch: usize,

    /// Lower bound of the acceptance window on z
    pub line_search_lower_bound: f64,

    /// Upper bound of the acceptance window on z
    pub line_search_upper_bound: f64,

    /// Consecutive failed-forward-pass budget before declaring a stall
    pub dj_counter_limit: usize,

    /// Enable per-iteration trace on stderr
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            iterations: 300,
            cost_tolerance: 1e-4,
            gradient_norm_tolerance: 1e-5,
            max_cost_value: 1e8,
            max_state_value: 1e8,
            bp_reg_type: RegularizationType::Control,
            bp_reg_initial: 0.0,
            bp_reg_increase_factor: 1.6,
            bp_reg_min: 1e-8,
            bp_reg_max: 1e8,
            bp_reg_fp: 10.0,
            bp_sweep_retry_limit: 10,
            iterations_linesearch: 20,
            line_search_lower_bound: 1e-8,
            line_search_upper_bound: 10.0,
            dj_counter_limit: 10,
            verbose: false,
        }
    }
}

/// Which convergence criterion fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceCriterion {
    /// `0 < dJ < cost_tolerance`
    CostTolerance,
    /// Normalized feedforward gradient below tolerance
    GradientTolerance,
}

/// Solution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A convergence criterion fired; the trajectory is locally optimal
    Solved,

    /// Maximum iterations reached before convergence
    MaxIterations,

    /// Too many consecutive failed forward passes
    Stalled,

    /// Accepted cost exceeded `max_cost_value`; no further iteration
    CostBlowup,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Solved => write!(f, "Solved"),
            SolveStatus::MaxIterations => write!(f, "MaxIterations"),
            SolveStatus::Stalled => write!(f, "Stalled"),
            SolveStatus::CostBlowup => write!(f, "CostBlowup"),
        }
    }
}

/// Solve result with the accepted trajectory and diagnostics.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Solution status
    pub status: SolveStatus,

    /// Accepted states, one per knot
    pub states: Vec<DVector<f64>>,

    /// Accepted controls, one per interior knot
    pub controls: Vec<DVector<f64>>,

    /// Final accepted cost
    pub cost: f64,

    /// Detailed solve information and statistics
    pub info: SolveInfo,
}

/// Detailed solve information and per-iteration statistics.
#[derive(Debug, Clone, Default)]
pub struct SolveInfo {
    /// Number of outer iterations completed
    pub iterations: usize,

    /// Total solve time (milliseconds)
    pub solve_time_ms: u64,

    /// Accepted cost after each iteration
    pub cost_history: Vec<f64>,

    /// Absolute cost decrease after each iteration
    pub dj_history: Vec<f64>,

    /// Normalized feedforward gradient after each iteration
    pub gradient_history: Vec<f64>,

    /// Number of forward-pass fallbacks over the whole solve
    pub dj_zero_count: usize,

    /// Number of damping increases over the whole solve
    pub reg_increase_count: usize,

    /// Damping ρ at termination
    pub final_rho: f64,

    /// Which criterion fired when `status` is `Solved`
    pub converged_by: Option<ConvergenceCriterion>,
}
