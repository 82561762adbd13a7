//! Forward rollout and backtracking line search.
//!
//! The closed-loop rollout replays the accepted trajectory under the new
//! gains at a step size α, writing into the candidate buffer. The line
//! search backtracks on α until the achieved cost reduction is a reasonable
//! fraction of the reduction the quadratic model predicted; when it runs out
//! of attempts it falls back to the unchanged trajectory and penalizes the
//! damping instead of accepting a bad step.

use nalgebra::{DMatrix, DVector};

use crate::error::IlqrError;
use crate::ilqr::regularization::Regularization;
use crate::ilqr::workspace::IlqrWorkspace;
use crate::problem::{trajectory_cost, CostFunction, Dynamics, Problem, SolverSettings};
use crate::traj::Trajectory;

/// Outcome of one forward pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ForwardOutcome {
    /// Accepted candidate cost (equals the previous cost on fallback)
    pub cost: f64,
    /// Step size of the accepted rollout, 0 on fallback
    pub alpha: f64,
    /// Ratio of actual to predicted cost reduction at acceptance
    pub z: f64,
    /// Model-predicted cost reduction at acceptance
    pub expected: f64,
    /// True when the line search exhausted its budget and kept the
    /// unchanged trajectory
    pub fell_back: bool,
}

/// Integrate the supplied controls forward from the initial state, filling
/// in the states of `traj`. Used to initialize the solve; no magnitude
/// guard is applied here, divergent initializations surface through the
/// line search instead.
pub fn rollout_open_loop<D: Dynamics>(dynamics: &D, traj: &mut Trajectory) {
    let nk = traj.len();
    for k in 0..nk - 1 {
        let (head, tail) = traj.knots.split_at_mut(k + 1);
        let cur = &head[k];
        let next = &mut tail[0];
        dynamics.step(&cur.x, &cur.u, cur.dt, &mut next.x);
    }
}

#[inline]
fn within_limits(v: &DVector<f64>, limit: f64) -> bool {
    v.iter().all(|c| c.is_finite() && c.abs() <= limit)
}

/// Closed-loop rollout at step size `alpha`. Returns false as soon as any
/// state or control component leaves the trust window (non-finite values
/// included), leaving the candidate partially written.
#[allow(clippy::too_many_arguments)]
fn rollout_closed_loop<D: Dynamics>(
    dynamics: &D,
    accepted: &Trajectory,
    candidate: &mut Trajectory,
    gains_k: &[DMatrix<f64>],
    gains_d: &[DVector<f64>],
    alpha: f64,
    dx: &mut DVector<f64>,
    max_state_value: f64,
) -> bool {
    let nk = accepted.len();
    candidate.knots[0].x.copy_from(&accepted.knots[0].x);

    for k in 0..nk - 1 {
        let (head, tail) = candidate.knots.split_at_mut(k + 1);
        let cur = &mut head[k];
        let next = &mut tail[0];
        let acc = &accepted.knots[k];

        // u = u_ref + K (x - x_ref) + α d
        dx.copy_from(&cur.x);
        dx.axpy(-1.0, &acc.x, 1.0);
        cur.u.copy_from(&acc.u);
        cur.u.gemv(1.0, &gains_k[k], dx, 1.0);
        cur.u.axpy(alpha, &gains_d[k], 1.0);

        dynamics.step(&cur.x, &cur.u, cur.dt, &mut next.x);

        if !within_limits(&next.x, max_state_value) || !within_limits(&cur.u, max_state_value) {
            return false;
        }
    }
    true
}

/// Backtracking line search over the closed-loop rollout.
///
/// The step is accepted when `z = (J_prev - J) / expected` lands inside the
/// configured window and the cost strictly decreased. Exhausting the budget
/// keeps the previous trajectory, escalates the damping with the one-shot
/// forward-pass penalty, and reports `fell_back` so the driver can count the
/// stall. A cost that comes back above `cost_prev` after the fallback
/// clamped it is a solver bug and is surfaced as an error.
pub(crate) fn forward_pass<D: Dynamics, C: CostFunction>(
    ws: &mut IlqrWorkspace,
    prob: &Problem<D, C>,
    accepted: &Trajectory,
    dv: [f64; 2],
    cost_prev: f64,
    reg: &mut Regularization,
    settings: &SolverSettings,
    iteration: usize,
) -> Result<ForwardOutcome, IlqrError> {
    let IlqrWorkspace {
        candidate,
        gains_k,
        gains_d,
        dx,
        ..
    } = ws;

    let mut alpha = 1.0_f64;
    let mut attempts = 0usize;
    let mut z = -1.0_f64;
    let mut expected = 0.0_f64;
    let mut cost_new = f64::INFINITY;
    let mut alpha_used = 0.0_f64;
    let mut fell_back = false;

    while (z <= settings.line_search_lower_bound || z > settings.line_search_upper_bound)
        && cost_new >= cost_prev
    {
        if attempts > settings.iterations_linesearch {
            candidate.copy_from(accepted);
            cost_new = trajectory_cost(&prob.cost, candidate);
            alpha_used = 0.0;
            z = 0.0;
            expected = 0.0;
            reg.penalize_forward_pass(settings);
            fell_back = true;
            break;
        }

        let ok = rollout_closed_loop(
            &prob.dynamics,
            accepted,
            candidate,
            gains_k,
            gains_d,
            alpha,
            dx,
            settings.max_state_value,
        );
        if !ok {
            alpha *= 0.5;
            attempts += 1;
            continue;
        }

        cost_new = trajectory_cost(&prob.cost, candidate);
        if cost_new.is_nan() {
            cost_new = f64::INFINITY;
            alpha *= 0.5;
            attempts += 1;
            continue;
        }
        expected = -alpha * (dv[0] + alpha * dv[1]);
        z = if expected > 0.0 {
            (cost_prev - cost_new) / expected
        } else {
            -1.0
        };
        alpha_used = alpha;

        alpha *= 0.5;
        attempts += 1;
    }

    if cost_new > cost_prev {
        return Err(IlqrError::CostIncreased { iteration });
    }

    Ok(ForwardOutcome {
        cost: cost_new,
        alpha: alpha_used,
        z,
        expected,
        fell_back,
    })
}
