//! Preallocated solver workspace.
//!
//! Every per-iteration buffer lives here: the expansion cache refreshed from
//! the oracles at the top of each outer iteration, the gains and cost-to-go
//! written by the backward sweep, the candidate trajectory written by the
//! forward pass, and the scratch matrices the sweep multiplies through.
//! Allocation happens once at construction; the solve loop itself never
//! touches the heap.

use nalgebra::{DMatrix, DVector};

use crate::linalg::DenseCholesky;
use crate::problem::{CostExpansion, CostFunction, Dynamics, Problem};
use crate::traj::Trajectory;

/// Dynamics Jacobians at one knot point.
#[derive(Debug, Clone)]
pub struct DynamicsExpansion {
    /// ∂f/∂x (n × n)
    pub a: DMatrix<f64>,
    /// ∂f/∂u (n × m)
    pub b: DMatrix<f64>,
}

impl DynamicsExpansion {
    fn zeros(state_dim: usize, control_dim: usize) -> Self {
        Self {
            a: DMatrix::zeros(state_dim, state_dim),
            b: DMatrix::zeros(state_dim, control_dim),
        }
    }
}

/// Quadratic cost-to-go model at one knot point.
#[derive(Debug, Clone)]
pub struct CostToGo {
    /// Hessian (n × n, symmetric)
    pub sxx: DMatrix<f64>,
    /// Gradient (n)
    pub sx: DVector<f64>,
}

impl CostToGo {
    fn zeros(state_dim: usize) -> Self {
        Self {
            sxx: DMatrix::zeros(state_dim, state_dim),
            sx: DVector::zeros(state_dim),
        }
    }
}

/// All mutable state the solver needs across one outer iteration.
#[derive(Debug)]
pub struct IlqrWorkspace {
    /// State dimension n
    pub n: usize,
    /// Control dimension m
    pub m: usize,
    /// Number of knot points
    pub num_knots: usize,

    /// Cost expansion per knot; the last entry holds only the terminal
    /// blocks. The backward sweep folds propagated terms into these in
    /// place, so they are refilled from the oracle every iteration.
    pub cost_exp: Vec<CostExpansion>,

    /// Dynamics Jacobians per interior knot
    pub dyn_exp: Vec<DynamicsExpansion>,

    /// Feedback gains K (m × n), one per interior knot
    pub gains_k: Vec<DMatrix<f64>>,

    /// Feedforward gains d (m), one per interior knot
    pub gains_d: Vec<DVector<f64>>,

    /// Cost-to-go per knot
    pub ctg: Vec<CostToGo>,

    /// Candidate trajectory written by the forward pass
    pub candidate: Trajectory,

    // Sweep scratch (hot loop, no allocations)
    /// S·A product (n × n)
    pub sxx_a: DMatrix<f64>,
    /// S·B product (n × m)
    pub sxx_b: DMatrix<f64>,
    /// Regularized control Hessian (m × m)
    pub quu_reg: DMatrix<f64>,
    /// Regularized mixed Hessian (m × n)
    pub qux_reg: DMatrix<f64>,
    /// Quu·d product (m)
    pub quu_d: DVector<f64>,
    /// Quu·K product (m × n)
    pub quu_k: DMatrix<f64>,
    /// Reused Cholesky factor of the regularized control Hessian
    pub chol: DenseCholesky,
    /// State deviation during rollout (n)
    pub dx: DVector<f64>,
}

impl IlqrWorkspace {
    /// Allocate every buffer for an `n`-state, `m`-control problem over
    /// `num_knots` knot points.
    pub fn new(n: usize, m: usize, num_knots: usize, dt: f64) -> Self {
        let interior = num_knots.saturating_sub(1);
        Self {
            n,
            m,
            num_knots,
            cost_exp: (0..num_knots).map(|_| CostExpansion::zeros(n, m)).collect(),
            dyn_exp: (0..interior)
                .map(|_| DynamicsExpansion::zeros(n, m))
                .collect(),
            gains_k: (0..interior).map(|_| DMatrix::zeros(m, n)).collect(),
            gains_d: (0..interior).map(|_| DVector::zeros(m)).collect(),
            ctg: (0..num_knots).map(|_| CostToGo::zeros(n)).collect(),
            candidate: Trajectory::zeros(n, m, num_knots, dt),
            sxx_a: DMatrix::zeros(n, n),
            sxx_b: DMatrix::zeros(n, m),
            quu_reg: DMatrix::zeros(m, m),
            qux_reg: DMatrix::zeros(m, n),
            quu_d: DVector::zeros(m),
            quu_k: DMatrix::zeros(m, n),
            chol: DenseCholesky::new(m),
            dx: DVector::zeros(n),
        }
    }

    /// Refill the expansion cache from the oracles at the accepted
    /// trajectory. Called at the top of every outer iteration, and again
    /// when a sweep restart needs to discard in-place accumulations.
    pub fn fill_expansions<D: Dynamics, C: CostFunction>(
        &mut self,
        prob: &Problem<D, C>,
        traj: &Trajectory,
    ) {
        let nk = self.num_knots;
        for k in 0..nk - 1 {
            let kp = &traj.knots[k];
            let de = &mut self.dyn_exp[k];
            prob.dynamics.jacobians(&kp.x, &kp.u, kp.dt, &mut de.a, &mut de.b);
            prob.cost
                .stage_expansion(&kp.x, &kp.u, kp.dt, &mut self.cost_exp[k]);
        }
        prob.cost
            .terminal_expansion(&traj.knots[nk - 1].x, &mut self.cost_exp[nk - 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DoubleIntegrator, QuadraticCost};
    use nalgebra::dvector;

    #[test]
    fn test_buffer_dimensions() {
        let ws = IlqrWorkspace::new(3, 2, 5, 0.1);
        assert_eq!(ws.cost_exp.len(), 5);
        assert_eq!(ws.dyn_exp.len(), 4);
        assert_eq!(ws.gains_k.len(), 4);
        assert_eq!(ws.ctg.len(), 5);
        assert_eq!(ws.gains_k[0].shape(), (2, 3));
        assert_eq!(ws.candidate.len(), 5);
    }

    #[test]
    fn test_fill_expansions_writes_jacobians() {
        let prob = Problem::new(
            DoubleIntegrator,
            QuadraticCost::regulator(2, 1),
            dvector![1.0, 0.0],
            4,
            0.1,
        );
        let mut traj = Trajectory::zeros(2, 1, 4, 0.1);
        traj.knots[0].x.copy_from(&prob.x0);

        let mut ws = IlqrWorkspace::new(2, 1, 4, 0.1);
        ws.fill_expansions(&prob, &traj);

        // Double integrator has A = [[1, dt], [0, 1]], B = [[0], [dt]].
        assert_eq!(ws.dyn_exp[0].a[(0, 1)], 0.1);
        assert_eq!(ws.dyn_exp[0].b[(1, 0)], 0.1);
        // Terminal expansion populated on the last knot.
        assert!(ws.cost_exp[3].qxx[(0, 0)] > 0.0);
    }
}
