//! Pendulum swing-up example demonstrating the iLQR solver.
//!
//! Starts at the stable downward equilibrium and finds a torque trajectory
//! that swings the pendulum to the inverted position and holds it there.

use ilqr_core::models::{Pendulum, QuadraticCost};
use ilqr_core::{solve, Problem, SolverSettings};
use nalgebra::{dvector, DMatrix};
use std::f64::consts::PI;

fn main() {
    println!("ilqr-core - Pendulum Swing-Up Example");
    println!("=====================================");
    println!();

    // State [angle, angular velocity], goal is the inverted position.
    // Light running weights let the terminal weight dominate, so the
    // optimizer is free to choose the swing and only the endpoint is firm.
    let dynamics = Pendulum::default();
    let cost = QuadraticCost::new(
        DMatrix::identity(2, 2) * 0.01,
        DMatrix::identity(1, 1) * 0.01,
        DMatrix::identity(2, 2) * 100.0,
        dvector![PI, 0.0],
    );
    let prob = Problem::new(dynamics, cost, dvector![0.0, 0.0], 101, 0.05);

    let settings = SolverSettings {
        verbose: true,
        ..Default::default()
    };

    match solve(&prob, &settings) {
        Ok(result) => {
            let x_final = result.states.last().unwrap();
            println!();
            println!("Status:      {}", result.status);
            println!("Iterations:  {}", result.info.iterations);
            println!("Final cost:  {:.6e}", result.cost);
            println!("Solve time:  {} ms", result.info.solve_time_ms);
            println!(
                "Final state: angle = {:.4} rad ({:.1} deg), rate = {:.4} rad/s",
                x_final[0],
                x_final[0].to_degrees(),
                x_final[1]
            );
        }
        Err(e) => {
            eprintln!("solve failed: {}", e);
            std::process::exit(1);
        }
    }
}
