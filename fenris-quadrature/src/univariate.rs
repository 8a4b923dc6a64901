//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::Rule;
use std::f64::consts::PI;

const MAX_NEWTON_ITERATIONS: usize = 100;

/// Evaluates the Legendre polynomial `P_n` and its derivative at `x`.
///
/// The derivative formula is singular at `|x| == 1`, so this is only suitable for the open
/// interval `(-1, 1)`, which is where the Gauss points live.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    // Bonnet's recursion
    //  k P_k(x) = (2k - 1) x P_{k - 1}(x) - (k - 1) P_{k - 2}(x)
    let mut p_prev = 0.0;
    let mut p = 1.0;
    for k in 1..=n {
        let k = k as f64;
        let p_next = ((2.0 * k - 1.0) * x * p - (k - 1.0) * p_prev) / k;
        p_prev = p;
        p = p_next;
    }
    let dp = n as f64 * (x * p - p_prev) / (x * x - 1.0);
    (p, dp)
}

/// Gauss quadrature for the reference interval [-1, 1].
///
/// Returns the [Gauss quadrature rule] with the given number of points, ordered by increasing
/// coordinate. Given `n` points, the rule integrates polynomials of order up to `2 n - 1`
/// exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss quadrature rule]: https://en.wikipedia.org/wiki/Gaussian_quadrature
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // The roots are symmetric about the origin, so we only need to search for the
    // non-negative half and mirror the rest
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = legendre_with_derivative(n, x).1;
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let (p, dp_new) = legendre_with_derivative(n, x);
            dp = dp_new;
            let dx = -p / dp;
            x += dx;
            if dx.abs() <= 1e-15 {
                dp = legendre_with_derivative(n, x).1;
                break;
            }
        }

        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[n - 1 - i] = [x];
        weights[n - 1 - i] = w;
        points[i] = [-x];
        weights[i] = w;
    }

    (weights, points)
}
