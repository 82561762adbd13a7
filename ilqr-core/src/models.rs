//! Ready-made dynamics and cost oracles.
//!
//! Small benchmark systems used by the tests, the examples, and as
//! reference implementations of the oracle traits.

use nalgebra::{DMatrix, DVector};

use crate::problem::{CostExpansion, CostFunction, Dynamics};

/// 1-D double integrator: position driven by velocity, velocity driven by
/// the control, integrated with an explicit Euler step.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleIntegrator;

impl Dynamics for DoubleIntegrator {
    fn state_dim(&self) -> usize {
        2
    }

    fn control_dim(&self) -> usize {
        1
    }

    fn step(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64, x_next: &mut DVector<f64>) {
        x_next[0] = x[0] + dt * x[1];
        x_next[1] = x[1] + dt * u[0];
    }

    fn jacobians(
        &self,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        dt: f64,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
    ) {
        a.fill(0.0);
        a[(0, 0)] = 1.0;
        a[(0, 1)] = dt;
        a[(1, 1)] = 1.0;
        b.fill(0.0);
        b[(1, 0)] = dt;
    }
}

/// Torque-actuated pendulum, state `[angle, angular velocity]` with the
/// angle measured from the stable downward equilibrium.
#[derive(Debug, Clone, Copy)]
pub struct Pendulum {
    /// Point mass at the tip [kg]
    pub mass: f64,
    /// Rod length [m]
    pub length: f64,
    /// Viscous damping at the pivot
    pub damping: f64,
    /// Gravitational acceleration [m/s²]
    pub gravity: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self {
            mass: 1.0,
            length: 0.5,
            damping: 0.1,
            gravity: 9.81,
        }
    }
}

impl Pendulum {
    #[inline]
    fn inertia(&self) -> f64 {
        self.mass * self.length * self.length
    }
}

impl Dynamics for Pendulum {
    fn state_dim(&self) -> usize {
        2
    }

    fn control_dim(&self) -> usize {
        1
    }

    fn step(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64, x_next: &mut DVector<f64>) {
        let inertia = self.inertia();
        let accel = (u[0] - self.damping * x[1]) / inertia
            - (self.gravity / self.length) * x[0].sin();
        x_next[0] = x[0] + dt * x[1];
        x_next[1] = x[1] + dt * accel;
    }

    fn jacobians(
        &self,
        x: &DVector<f64>,
        _u: &DVector<f64>,
        dt: f64,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
    ) {
        let inertia = self.inertia();
        a.fill(0.0);
        a[(0, 0)] = 1.0;
        a[(0, 1)] = dt;
        a[(1, 0)] = -dt * (self.gravity / self.length) * x[0].cos();
        a[(1, 1)] = 1.0 - dt * self.damping / inertia;
        b.fill(0.0);
        b[(1, 0)] = dt / inertia;
    }
}

/// Quadratic tracking cost
/// `½(x−xf)ᵀQ(x−xf) + ½uᵀRu` per stage, `½(x−xf)ᵀQf(x−xf)` at the end.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    /// Stage state weight (n × n)
    pub q: DMatrix<f64>,
    /// Stage control weight (m × m)
    pub r: DMatrix<f64>,
    /// Terminal state weight (n × n)
    pub qf: DMatrix<f64>,
    /// Goal state (n)
    pub xf: DVector<f64>,
}

impl QuadraticCost {
    /// Tracking cost with explicit weights and goal.
    pub fn new(q: DMatrix<f64>, r: DMatrix<f64>, qf: DMatrix<f64>, xf: DVector<f64>) -> Self {
        Self { q, r, qf, xf }
    }

    /// Identity-weighted regulator driving the state to the origin.
    pub fn regulator(state_dim: usize, control_dim: usize) -> Self {
        Self {
            q: DMatrix::identity(state_dim, state_dim),
            r: DMatrix::identity(control_dim, control_dim),
            qf: DMatrix::identity(state_dim, state_dim),
            xf: DVector::zeros(state_dim),
        }
    }
}

/// `½ (x − xref)ᵀ W (x − xref)` without temporaries.
fn quad_form(w: &DMatrix<f64>, x: &DVector<f64>, xref: &DVector<f64>) -> f64 {
    let n = x.len();
    let mut acc = 0.0;
    for i in 0..n {
        let di = x[i] - xref[i];
        for j in 0..n {
            acc += di * w[(i, j)] * (x[j] - xref[j]);
        }
    }
    0.5 * acc
}

/// `out = W (x − xref)` without temporaries.
fn weighted_error(w: &DMatrix<f64>, x: &DVector<f64>, xref: &DVector<f64>, out: &mut DVector<f64>) {
    let n = x.len();
    for i in 0..n {
        let mut acc = 0.0;
        for j in 0..n {
            acc += w[(i, j)] * (x[j] - xref[j]);
        }
        out[i] = acc;
    }
}

impl CostFunction for QuadraticCost {
    fn stage(&self, x: &DVector<f64>, u: &DVector<f64>, _dt: f64) -> f64 {
        let m = u.len();
        let mut control = 0.0;
        for i in 0..m {
            for j in 0..m {
                control += u[i] * self.r[(i, j)] * u[j];
            }
        }
        quad_form(&self.q, x, &self.xf) + 0.5 * control
    }

    fn terminal(&self, x: &DVector<f64>) -> f64 {
        quad_form(&self.qf, x, &self.xf)
    }

    fn stage_expansion(&self, x: &DVector<f64>, u: &DVector<f64>, _dt: f64, exp: &mut CostExpansion) {
        weighted_error(&self.q, x, &self.xf, &mut exp.qx);
        exp.qu.gemv(1.0, &self.r, u, 0.0);
        exp.qxx.copy_from(&self.q);
        exp.quu.copy_from(&self.r);
        exp.qux.fill(0.0);
    }

    fn terminal_expansion(&self, x: &DVector<f64>, exp: &mut CostExpansion) {
        weighted_error(&self.qf, x, &self.xf, &mut exp.qx);
        exp.qxx.copy_from(&self.qf);
    }
}

/// Solve the discrete algebraic Riccati equation by fixed-point iteration.
///
/// Returns the stationary cost matrix `P`, or `None` when `R + BᵀPB`
/// becomes singular along the way.
pub fn dare(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    max_iter: usize,
    epsilon: f64,
) -> Option<DMatrix<f64>> {
    let at = a.transpose();
    let bt = b.transpose();
    let mut p = q.clone();
    for _ in 0..max_iter {
        let gain_term = (r + &bt * &p * b).try_inverse()?;
        let pn = &at * &p * a - &at * &p * b * &gain_term * &bt * &p * a + q;
        let delta = (&pn - &p).abs().max();
        p = pn;
        if delta < epsilon {
            break;
        }
    }
    Some(p)
}

/// Stationary LQR feedback `K = (R + BᵀPB)⁻¹ BᵀPA` for the cost matrix `P`
/// returned by [`dare`]. The optimal control law is `u = −K x`.
pub fn lqr_gain(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    r: &DMatrix<f64>,
    p: &DMatrix<f64>,
) -> Option<DMatrix<f64>> {
    let bt = b.transpose();
    Some((r + &bt * p * b).try_inverse()? * &bt * p * a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    fn finite_difference_jacobians<D: Dynamics>(
        dynamics: &D,
        x: &DVector<f64>,
        u: &DVector<f64>,
        dt: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = dynamics.state_dim();
        let m = dynamics.control_dim();
        let h = 1e-7;
        let mut fp = DVector::zeros(n);
        let mut fm = DVector::zeros(n);
        let mut a = DMatrix::zeros(n, n);
        let mut b = DMatrix::zeros(n, m);

        for j in 0..n {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += h;
            xm[j] -= h;
            dynamics.step(&xp, u, dt, &mut fp);
            dynamics.step(&xm, u, dt, &mut fm);
            for i in 0..n {
                a[(i, j)] = (fp[i] - fm[i]) / (2.0 * h);
            }
        }
        for j in 0..m {
            let mut up = u.clone();
            let mut um = u.clone();
            up[j] += h;
            um[j] -= h;
            dynamics.step(x, &up, dt, &mut fp);
            dynamics.step(x, &um, dt, &mut fm);
            for i in 0..n {
                b[(i, j)] = (fp[i] - fm[i]) / (2.0 * h);
            }
        }
        (a, b)
    }

    #[test]
    fn test_double_integrator_jacobians() {
        let dynamics = DoubleIntegrator;
        let x = dvector![0.3, -1.2];
        let u = dvector![0.7];
        let (a_fd, b_fd) = finite_difference_jacobians(&dynamics, &x, &u, 0.1);

        let mut a = DMatrix::zeros(2, 2);
        let mut b = DMatrix::zeros(2, 1);
        dynamics.jacobians(&x, &u, 0.1, &mut a, &mut b);

        assert!((a - a_fd).amax() < 1e-6);
        assert!((b - b_fd).amax() < 1e-6);
    }

    #[test]
    fn test_pendulum_jacobians() {
        let dynamics = Pendulum::default();
        let x = dvector![2.1, -0.4];
        let u = dvector![0.3];
        let (a_fd, b_fd) = finite_difference_jacobians(&dynamics, &x, &u, 0.05);

        let mut a = DMatrix::zeros(2, 2);
        let mut b = DMatrix::zeros(2, 1);
        dynamics.jacobians(&x, &u, 0.05, &mut a, &mut b);

        assert!((a - a_fd).amax() < 1e-6);
        assert!((b - b_fd).amax() < 1e-6);
    }

    #[test]
    fn test_quadratic_cost_expansion_matches_gradient() {
        let cost = QuadraticCost::new(
            DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]),
            DMatrix::from_row_slice(1, 1, &[0.3]),
            DMatrix::identity(2, 2),
            dvector![1.0, -1.0],
        );
        let x = dvector![0.2, 0.9];
        let u = dvector![-0.6];

        let mut exp = CostExpansion::zeros(2, 1);
        cost.stage_expansion(&x, &u, 0.1, &mut exp);

        let h = 1e-6;
        for j in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += h;
            xm[j] -= h;
            let grad = (cost.stage(&xp, &u, 0.1) - cost.stage(&xm, &u, 0.1)) / (2.0 * h);
            assert_relative_eq!(exp.qx[j], grad, epsilon = 1e-5);
        }
        let mut up = u.clone();
        let mut um = u.clone();
        up[0] += h;
        um[0] -= h;
        let grad_u = (cost.stage(&x, &up, 0.1) - cost.stage(&x, &um, 0.1)) / (2.0 * h);
        assert_relative_eq!(exp.qu[0], grad_u, epsilon = 1e-5);
    }

    #[test]
    fn test_dare_fixed_point_residual() {
        let mut a = DMatrix::zeros(2, 2);
        let mut b = DMatrix::zeros(2, 1);
        DoubleIntegrator.jacobians(&dvector![0.0, 0.0], &dvector![0.0], 0.1, &mut a, &mut b);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::identity(1, 1);

        let p = dare(&a, &b, &q, &r, 1000, 1e-12).unwrap();

        // P must satisfy its own fixed-point equation.
        let bt = b.transpose();
        let gain_term = (&r + &bt * &p * &b).try_inverse().unwrap();
        let pn = a.transpose() * &p * &a
            - a.transpose() * &p * &b * gain_term * &bt * &p * &a
            + &q;
        assert!((&pn - &p).amax() < 1e-9);
    }

    #[test]
    fn test_lqr_gain_stabilizes() {
        let mut a = DMatrix::zeros(2, 2);
        let mut b = DMatrix::zeros(2, 1);
        DoubleIntegrator.jacobians(&dvector![0.0, 0.0], &dvector![0.0], 0.1, &mut a, &mut b);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::identity(1, 1);
        let p = dare(&a, &b, &q, &r, 1000, 1e-12).unwrap();
        let k = lqr_gain(&a, &b, &r, &p).unwrap();

        // Closed loop x' = (A - BK) x must contract from a unit state.
        let mut x = dvector![1.0, 0.0];
        let acl = &a - &b * &k;
        for _ in 0..200 {
            x = &acl * x;
        }
        assert!(x.amax() < 1e-3);
    }
}
