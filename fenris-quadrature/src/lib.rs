//! Quadrature rules for finite element reference domains.
//!
//! Rules are plain `(weights, points)` pairs in `f64` so that they can be used independently of
//! `nalgebra` or any particular element library.
//!
//! Reference domains follow the `fenris` conventions:
//!
//! - the interval, square and cube are `[-1, 1]^D`,
//! - the reference triangle has vertices `(-1, -1)`, `(1, -1)`, `(-1, 1)`,
//! - the reference tetrahedron has vertices `(-1, -1, -1)`, `(1, -1, -1)`, `(-1, 1, -1)`
//!   and `(-1, -1, 1)`.

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, p)| w * f(p))
        .sum()
}
