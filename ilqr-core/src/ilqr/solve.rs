//! Outer solve loop.
//!
//! Each iteration refreshes the expansion cache from the oracles, runs the
//! backward sweep for gains and predicted decrease, line-searches a forward
//! rollout against that prediction, and commits the candidate. The loop
//! stops on convergence, stall, a cost blowup, or the iteration budget.

use std::time::Instant;

use crate::error::IlqrResult;
use crate::ilqr::backward::backward_pass;
use crate::ilqr::diagnostics::TraceLevel;
use crate::ilqr::forward::{forward_pass, rollout_open_loop};
use crate::ilqr::regularization::Regularization;
use crate::ilqr::termination::{check_termination, feedforward_gradient};
use crate::ilqr::workspace::IlqrWorkspace;
use crate::problem::{
    trajectory_cost, CostFunction, Dynamics, Problem, SolveInfo, SolveResult, SolveStatus,
    SolverSettings,
};
use crate::traj::Trajectory;

/// Main solver entry point.
///
/// Computes a locally optimal control sequence for `prob` starting from its
/// initial state and controls. Recoverable numerical trouble is absorbed by
/// the damping and line-search machinery and reported through the returned
/// status; an `Err` means the problem was malformed or an internal
/// invariant broke.
pub fn solve_ilqr<D: Dynamics, C: CostFunction>(
    prob: &Problem<D, C>,
    settings: &SolverSettings,
) -> IlqrResult<SolveResult> {
    prob.validate()?;

    let n = prob.state_dim();
    let m = prob.control_dim();
    let nk = prob.num_knots;

    let start = Instant::now();
    let trace = TraceLevel::from_env();

    let mut ws = IlqrWorkspace::new(n, m, nk, prob.dt);
    let mut accepted = Trajectory::zeros(n, m, nk, prob.dt);
    accepted.knots[0].x.copy_from(&prob.x0);
    for (knot, u) in accepted.knots.iter_mut().zip(prob.u_init.iter()) {
        knot.u.copy_from(u);
    }

    // First iteration starts from the open-loop rollout; there are no gains
    // yet to close the loop with.
    rollout_open_loop(&prob.dynamics, &mut accepted);
    let mut cost_prev = trajectory_cost(&prob.cost, &accepted);

    let mut reg = Regularization::new(settings.bp_reg_initial);
    let mut info = SolveInfo::default();
    let mut status = SolveStatus::MaxIterations;
    // Consecutive failed forward passes; resets on any accepted step.
    let mut dj_zero_counter = 0usize;
    let mut total_fallbacks = 0usize;

    if settings.verbose {
        eprintln!(
            "ilqr: n={} m={} knots={} initial J={:.6e}",
            n, m, nk, cost_prev
        );
    }

    for iter in 0..settings.iterations {
        ws.fill_expansions(prob, &accepted);

        let Some(dv) = backward_pass(&mut ws, prob, &accepted, &mut reg, settings) else {
            // Sweep restart budget exhausted: same recovery as an exhausted
            // line search, so a persistently indefinite Hessian ends in a
            // stall instead of a livelock.
            ws.candidate.copy_from(&accepted);
            dj_zero_counter += 1;
            total_fallbacks += 1;
            info.cost_history.push(cost_prev);
            info.dj_history.push(0.0);
            info.gradient_history.push(f64::INFINITY);
            info.iterations = iter + 1;
            if settings.verbose || trace.iterations() {
                eprintln!("iter {:4} backward sweep exhausted, rho={:.3e}", iter, reg.rho);
            }
            if let Some((st, by)) =
                check_termination(0.0, f64::INFINITY, iter, dj_zero_counter, settings)
            {
                status = st;
                info.converged_by = by;
                break;
            }
            continue;
        };

        let outcome = forward_pass(
            &mut ws, prob, &accepted, dv, cost_prev, &mut reg, settings, iter,
        )?;
        if outcome.fell_back {
            dj_zero_counter += 1;
            total_fallbacks += 1;
        } else {
            dj_zero_counter = 0;
        }
        let cost_new = outcome.cost;
        let dj = (cost_prev - cost_new).abs();
        let gradient = feedforward_gradient(&ws.gains_d, &ws.candidate);

        info.cost_history.push(cost_new);
        info.dj_history.push(dj);
        info.gradient_history.push(gradient);
        info.iterations = iter + 1;

        if trace.events() && outcome.fell_back {
            eprintln!("iter {:4} line search exhausted, rho={:.3e}", iter, reg.rho);
        }
        if settings.verbose || trace.iterations() {
            eprintln!(
                "iter {:4} J={:.6e} dJ={:.3e} exp={:.3e} grad={:.3e} rho={:.3e} alpha={:.3e} z={:.3e}",
                iter, cost_new, dj, outcome.expected, gradient, reg.rho, outcome.alpha, outcome.z
            );
        }

        if cost_new > settings.max_cost_value {
            status = SolveStatus::CostBlowup;
            break;
        }

        accepted.copy_from(&ws.candidate);
        cost_prev = cost_new;

        if let Some((st, by)) = check_termination(dj, gradient, iter, dj_zero_counter, settings) {
            status = st;
            info.converged_by = by;
            break;
        }
    }

    info.solve_time_ms = start.elapsed().as_millis() as u64;
    info.dj_zero_count = total_fallbacks;
    info.reg_increase_count = reg.increases;
    info.final_rho = reg.rho;

    if settings.verbose {
        eprintln!(
            "ilqr: {} after {} iterations, J={:.6e}",
            status, info.iterations, cost_prev
        );
    }

    Ok(SolveResult {
        status,
        states: accepted.knots.iter().map(|k| k.x.clone()).collect(),
        controls: accepted.knots[..nk - 1]
            .iter()
            .map(|k| k.u.clone())
            .collect(),
        cost: cost_prev,
        info,
    })
}
