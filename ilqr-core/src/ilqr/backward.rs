//! Backward Riccati sweep.
//!
//! Walks the horizon from the terminal knot down to the first, propagating
//! the quadratic cost-to-go through the linearized dynamics and solving for
//! the feedback and feedforward gains at every knot. The damping ρ enters
//! only the Hessians used for the gain solve; the cost-to-go recursion uses
//! the undamped blocks so the value model stays consistent across sweeps.
//!
//! A failed positive-definiteness check aborts the sweep, escalates the
//! damping, and restarts from the terminal knot with a freshly refilled
//! expansion cache (the aborted sweep already folded propagated terms into
//! it). Restarts are bounded per outer iteration.

use crate::ilqr::regularization::Regularization;
use crate::ilqr::workspace::IlqrWorkspace;
use crate::linalg::symmetrize;
use crate::problem::{CostFunction, Dynamics, Problem, RegularizationType, SolverSettings};
use crate::traj::Trajectory;

/// Run the sweep, restarting with increased damping on ill-conditioned
/// control Hessians. Returns the line-search scalars `(ΔV₁, ΔV₂)`, or `None`
/// once the restart budget is exhausted.
pub(crate) fn backward_pass<D: Dynamics, C: CostFunction>(
    ws: &mut IlqrWorkspace,
    prob: &Problem<D, C>,
    accepted: &Trajectory,
    reg: &mut Regularization,
    settings: &SolverSettings,
) -> Option<[f64; 2]> {
    let mut restarts = 0usize;
    loop {
        match sweep(ws, reg.rho, settings.bp_reg_type) {
            Some(dv) => {
                reg.decrease(settings);
                return Some(dv);
            }
            None => {
                reg.increase(settings);
                restarts += 1;
                if restarts > settings.bp_sweep_retry_limit {
                    return None;
                }
                // The aborted sweep mutated the cache in place; refill it
                // before accumulating again.
                ws.fill_expansions(prob, accepted);
            }
        }
    }
}

/// One descending pass. Returns `None` as soon as the regularized control
/// Hessian fails its positive-definiteness check.
fn sweep(ws: &mut IlqrWorkspace, rho: f64, reg_type: RegularizationType) -> Option<[f64; 2]> {
    let nk = ws.num_knots;
    let m = ws.m;

    // Terminal boundary condition.
    let term = &ws.cost_exp[nk - 1];
    ws.ctg[nk - 1].sxx.copy_from(&term.qxx);
    ws.ctg[nk - 1].sx.copy_from(&term.qx);

    let mut dv = [0.0_f64; 2];

    for k in (0..nk - 1).rev() {
        let exp = &mut ws.cost_exp[k];
        let dyn_exp = &ws.dyn_exp[k];
        let (ctg_head, ctg_tail) = ws.ctg.split_at_mut(k + 1);
        let ctg_k = &mut ctg_head[k];
        let ctg_next = &ctg_tail[0];

        // Action-value expansion: fold the propagated cost-to-go into the
        // cached cost expansion.
        ws.sxx_a.gemm(1.0, &ctg_next.sxx, &dyn_exp.a, 0.0);
        ws.sxx_b.gemm(1.0, &ctg_next.sxx, &dyn_exp.b, 0.0);

        exp.qx.gemv_tr(1.0, &dyn_exp.a, &ctg_next.sx, 1.0);
        exp.qu.gemv_tr(1.0, &dyn_exp.b, &ctg_next.sx, 1.0);
        exp.qxx.gemm_tr(1.0, &dyn_exp.a, &ws.sxx_a, 1.0);
        exp.quu.gemm_tr(1.0, &dyn_exp.b, &ws.sxx_b, 1.0);
        exp.qux.gemm_tr(1.0, &dyn_exp.b, &ws.sxx_a, 1.0);
        symmetrize(&mut exp.qxx);
        symmetrize(&mut exp.quu);

        // Damped copies, used only for the gain solve.
        ws.quu_reg.copy_from(&exp.quu);
        ws.qux_reg.copy_from(&exp.qux);
        match reg_type {
            RegularizationType::State => {
                ws.quu_reg.gemm_tr(rho, &dyn_exp.b, &dyn_exp.b, 1.0);
                ws.qux_reg.gemm_tr(rho, &dyn_exp.b, &dyn_exp.a, 1.0);
            }
            RegularizationType::Control => {
                for i in 0..m {
                    ws.quu_reg[(i, i)] += rho;
                }
            }
        }
        symmetrize(&mut ws.quu_reg);

        // Fused positive-definiteness check and factorization; one factor
        // serves both gain solves.
        if ws.chol.factor(&ws.quu_reg).is_err() {
            return None;
        }

        let k_gain = &mut ws.gains_k[k];
        k_gain.copy_from(&ws.qux_reg);
        k_gain.neg_mut();
        ws.chol.solve_mat_in_place(k_gain);

        let d_gain = &mut ws.gains_d[k];
        d_gain.copy_from(&exp.qu);
        d_gain.neg_mut();
        ws.chol.solve_in_place(d_gain);

        // Cost-to-go recursion with the undamped blocks.
        ws.quu_d.gemv(1.0, &exp.quu, d_gain, 0.0);
        ctg_k.sx.copy_from(&exp.qx);
        ctg_k.sx.gemv_tr(1.0, k_gain, &ws.quu_d, 1.0);
        ctg_k.sx.gemv_tr(1.0, k_gain, &exp.qu, 1.0);
        ctg_k.sx.gemv_tr(1.0, &exp.qux, d_gain, 1.0);

        ws.quu_k.gemm(1.0, &exp.quu, k_gain, 0.0);
        ctg_k.sxx.copy_from(&exp.qxx);
        ctg_k.sxx.gemm_tr(1.0, k_gain, &ws.quu_k, 1.0);
        ctg_k.sxx.gemm_tr(1.0, k_gain, &exp.qux, 1.0);
        ctg_k.sxx.gemm_tr(1.0, &exp.qux, k_gain, 1.0);
        symmetrize(&mut ctg_k.sxx);

        dv[0] += d_gain.dot(&exp.qu);
        dv[1] += 0.5 * d_gain.dot(&ws.quu_d);
    }

    Some(dv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilqr::forward::rollout_open_loop;
    use crate::models::{DoubleIntegrator, QuadraticCost};
    use nalgebra::{dvector, DMatrix};

    fn setup() -> (
        Problem<DoubleIntegrator, QuadraticCost>,
        Trajectory,
        IlqrWorkspace,
    ) {
        let mut cost = QuadraticCost::regulator(2, 1);
        cost.qf *= 100.0;
        let prob = Problem::new(DoubleIntegrator, cost, dvector![1.0, 0.0], 11, 0.1);
        let mut traj = Trajectory::zeros(2, 1, 11, 0.1);
        traj.knots[0].x.copy_from(&prob.x0);
        rollout_open_loop(&prob.dynamics, &mut traj);
        let mut ws = IlqrWorkspace::new(2, 1, 11, 0.1);
        ws.fill_expansions(&prob, &traj);
        (prob, traj, ws)
    }

    #[test]
    fn test_cost_to_go_symmetric() {
        let (prob, traj, mut ws) = setup();
        let mut reg = Regularization::new(0.0);
        let settings = SolverSettings::default();
        backward_pass(&mut ws, &prob, &traj, &mut reg, &settings).unwrap();

        for ctg in &ws.ctg {
            let asym = (&ctg.sxx - ctg.sxx.transpose()).amax();
            assert!(asym < 1e-12, "cost-to-go asymmetry {}", asym);
        }
        for exp in &ws.cost_exp[..ws.num_knots - 1] {
            let asym = (&exp.quu - exp.quu.transpose()).amax();
            assert!(asym < 1e-12, "Quu asymmetry {}", asym);
        }
    }

    #[test]
    fn test_gain_consistency() {
        // With ρ = 0 the regularized blocks equal the cached ones, so the
        // gains must satisfy Quu·K + Qux = 0 and Quu·d + Qu = 0.
        let (prob, traj, mut ws) = setup();
        let mut reg = Regularization::new(0.0);
        let settings = SolverSettings::default();
        backward_pass(&mut ws, &prob, &traj, &mut reg, &settings).unwrap();

        for k in 0..ws.num_knots - 1 {
            let exp = &ws.cost_exp[k];
            let k_res = (&exp.quu * &ws.gains_k[k] + &exp.qux).amax();
            let d_res = (&exp.quu * &ws.gains_d[k] + &exp.qu).amax();
            assert!(k_res < 1e-9, "feedback residual {} at knot {}", k_res, k);
            assert!(d_res < 1e-9, "feedforward residual {} at knot {}", d_res, k);
        }
    }

    #[test]
    fn test_predicted_decrease_nonpositive_linear_term() {
        // d = -Quu⁻¹ Qu makes ΔV₁ = dᵀQu = -QuᵀQuu⁻¹Qu ≤ 0.
        let (prob, traj, mut ws) = setup();
        let mut reg = Regularization::new(0.0);
        let settings = SolverSettings::default();
        let dv = backward_pass(&mut ws, &prob, &traj, &mut reg, &settings).unwrap();
        assert!(dv[0] <= 0.0);
        assert!(dv[1] >= 0.0);
    }

    /// Cost with a negative definite control Hessian at u = 0. The sweep
    /// can only pass its check once the damping exceeds the negative
    /// curvature.
    struct ConcaveControlCost;

    impl crate::problem::CostFunction for ConcaveControlCost {
        fn stage(&self, _x: &nalgebra::DVector<f64>, u: &nalgebra::DVector<f64>, _dt: f64) -> f64 {
            -0.5 * u.dot(u)
        }

        fn terminal(&self, _x: &nalgebra::DVector<f64>) -> f64 {
            0.0
        }

        fn stage_expansion(
            &self,
            _x: &nalgebra::DVector<f64>,
            u: &nalgebra::DVector<f64>,
            _dt: f64,
            exp: &mut crate::problem::CostExpansion,
        ) {
            exp.qx.fill(0.0);
            exp.qxx.fill(0.0);
            exp.qux.fill(0.0);
            exp.qu.copy_from(u);
            exp.qu.neg_mut();
            exp.quu.copy_from(&DMatrix::from_row_slice(1, 1, &[-1.0]));
        }

        fn terminal_expansion(
            &self,
            _x: &nalgebra::DVector<f64>,
            exp: &mut crate::problem::CostExpansion,
        ) {
            exp.qx.fill(0.0);
            exp.qxx.fill(0.0);
        }
    }

    #[test]
    fn test_indefinite_hessian_recovers_through_damping() {
        // Quu = -1, so the check passes only once ρ > 1. The restart loop
        // must escalate the damping there within the default budget.
        let prob = Problem::new(
            DoubleIntegrator,
            ConcaveControlCost,
            dvector![0.0, 0.0],
            2,
            0.1,
        );
        let mut traj = Trajectory::zeros(2, 1, 2, 0.1);
        let mut ws = IlqrWorkspace::new(2, 1, 2, 0.1);
        ws.fill_expansions(&prob, &traj);
        traj.knots[0].x.copy_from(&prob.x0);

        let settings = SolverSettings::default();
        let mut reg = Regularization::new(0.0);
        let result = backward_pass(&mut ws, &prob, &traj, &mut reg, &settings);
        assert!(result.is_some());
        assert!(reg.rho > 1.0);
    }

    #[test]
    fn test_indefinite_hessian_gives_up_when_capped() {
        // With the damping ceiling below the needed level the sweep can
        // never pass, and the restart budget must stop the retry loop.
        let prob = Problem::new(
            DoubleIntegrator,
            ConcaveControlCost,
            dvector![0.0, 0.0],
            2,
            0.1,
        );
        let mut traj = Trajectory::zeros(2, 1, 2, 0.1);
        let mut ws = IlqrWorkspace::new(2, 1, 2, 0.1);
        ws.fill_expansions(&prob, &traj);
        traj.knots[0].x.copy_from(&prob.x0);

        let mut settings = SolverSettings::default();
        settings.bp_reg_max = 0.5;
        settings.bp_sweep_retry_limit = 5;
        let mut reg = Regularization::new(0.0);
        let result = backward_pass(&mut ws, &prob, &traj, &mut reg, &settings);
        assert!(result.is_none());
    }
}
