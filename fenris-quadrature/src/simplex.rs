//! Collapsed (conical product) Gauss rules for the reference triangle and tetrahedron.
//!
//! A tensor Gauss rule on the hypercube is mapped onto the simplex by the Duffy transformation,
//! which collapses one face of the hypercube onto a vertex. The Jacobian of the transformation
//! is folded into the weights. With `n` points per direction the rules integrate polynomials
//! of total degree `2 n - 2` exactly, and all weights are positive.

use crate::tensor::hypercube_gauss;
use crate::Rule;

/// Measure of the reference triangle.
pub const TRIANGLE_AREA: f64 = 2.0;

/// Measure of the reference tetrahedron.
pub const TETRAHEDRON_VOLUME: f64 = 4.0 / 3.0;

/// A collapsed Gauss rule with `num_points_per_dim^2` points on the reference triangle.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn triangle_collapsed_gauss(num_points_per_dim: usize) -> Rule<2> {
    let (square_weights, square_points) = hypercube_gauss::<2>(num_points_per_dim);
    square_weights
        .iter()
        .zip(&square_points)
        .map(|(w, &[u, v])| {
            let x = 0.5 * (1.0 + u) * (1.0 - v) - 1.0;
            let jacobian = 0.5 * (1.0 - v);
            (w * jacobian, [x, v])
        })
        .unzip()
}

/// A collapsed Gauss rule with `num_points_per_dim^3` points on the reference tetrahedron.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn tetrahedron_collapsed_gauss(num_points_per_dim: usize) -> Rule<3> {
    let (cube_weights, cube_points) = hypercube_gauss::<3>(num_points_per_dim);
    cube_weights
        .iter()
        .zip(&cube_points)
        .map(|(w, &[u, v, t])| {
            let x = 0.25 * (1.0 + u) * (1.0 - v) * (1.0 - t) - 1.0;
            let y = 0.5 * (1.0 + v) * (1.0 - t) - 1.0;
            let jacobian = 0.125 * (1.0 - v) * (1.0 - t) * (1.0 - t);
            (w * jacobian, [x, y, t])
        })
        .unzip()
}
