//! Quadrature rules for hypercubes formed by tensor products of 1D Gauss rules.

use crate::univariate::gauss;
use crate::Rule;

/// A Gauss rule for the reference hypercube `[-1, 1]^D` with `num_points_per_dim` points
/// along each axis.
///
/// Points are ordered with the first coordinate varying fastest.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn hypercube_gauss<const D: usize>(num_points_per_dim: usize) -> Rule<D> {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss(n);
    let num_points = n.pow(D as u32);

    let mut weights = Vec::with_capacity(num_points);
    let mut points = Vec::with_capacity(num_points);
    for linear_index in 0..num_points {
        let mut remainder = linear_index;
        let mut point = [0.0; D];
        let mut weight = 1.0;
        for coord in &mut point {
            let i = remainder % n;
            remainder /= n;
            *coord = points1d[i][0];
            weight *= weights1d[i];
        }
        weights.push(weight);
        points.push(point);
    }

    (weights, points)
}

/// A Gauss quadrature rule for the reference quadrilateral.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    hypercube_gauss(num_points_per_dim)
}

/// A Gauss quadrature rule for the reference hexahedron.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    hypercube_gauss(num_points_per_dim)
}
