use fenris_quadrature::integrate;
use fenris_quadrature::simplex::{
    tetrahedron_collapsed_gauss, triangle_collapsed_gauss, TETRAHEDRON_VOLUME, TRIANGLE_AREA,
};
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;

fn factorial(n: i32) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

/// Integral of `a^i b^j` over the unit triangle `a, b >= 0, a + b <= 1`.
fn unit_triangle_monomial_integral(i: i32, j: i32) -> f64 {
    factorial(i) * factorial(j) / factorial(i + j + 2)
}

/// Integral of `a^i b^j c^k` over the unit tetrahedron.
fn unit_tetrahedron_monomial_integral(i: i32, j: i32, k: i32) -> f64 {
    factorial(i) * factorial(j) * factorial(k) / factorial(i + j + k + 3)
}

#[test]
fn triangle_rule_measures_reference_area() {
    for n in 1..=8 {
        let rule = triangle_collapsed_gauss(n);
        assert_eq!(rule.0.len(), n * n);
        assert_scalar_eq!(integrate(&rule, |_| 1.0), TRIANGLE_AREA, comp = abs, tol = 1e-13);
    }
}

#[test]
fn tetrahedron_rule_measures_reference_volume() {
    for n in 1..=6 {
        let rule = tetrahedron_collapsed_gauss(n);
        assert_eq!(rule.0.len(), n * n * n);
        assert_scalar_eq!(integrate(&rule, |_| 1.0), TETRAHEDRON_VOLUME, comp = abs, tol = 1e-13);
    }
}

#[test]
fn triangle_rules_integrate_polynomials_of_expected_degree() {
    for n in 1..=6 {
        let rule = triangle_collapsed_gauss(n);
        let degree = 2 * n as i32 - 2;
        for i in 0..=degree {
            for j in 0..=(degree - i) {
                // The reference triangle is the image of the unit triangle under x = 2a - 1
                let estimated = integrate(&rule, |&[x, y]| {
                    let (a, b) = (0.5 * (x + 1.0), 0.5 * (y + 1.0));
                    a.powi(i) * b.powi(j)
                });
                let expected = 4.0 * unit_triangle_monomial_integral(i, j);
                assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn tetrahedron_rules_integrate_polynomials_of_expected_degree() {
    for n in 1..=4 {
        let rule = tetrahedron_collapsed_gauss(n);
        let degree = 2 * n as i32 - 2;
        for i in 0..=degree {
            for j in 0..=(degree - i) {
                for k in 0..=(degree - i - j) {
                    let estimated = integrate(&rule, |&[x, y, z]| {
                        let (a, b, c) = (0.5 * (x + 1.0), 0.5 * (y + 1.0), 0.5 * (z + 1.0));
                        a.powi(i) * b.powi(j) * c.powi(k)
                    });
                    let expected = 8.0 * unit_tetrahedron_monomial_integral(i, j, k);
                    assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn simplex_rule_points_lie_strictly_inside_reference_domain(n in 1usize..=10) {
        let (weights, points) = triangle_collapsed_gauss(n);
        prop_assert!(weights.iter().all(|&w| w > 0.0));
        for [x, y] in points {
            prop_assert!(x > -1.0 && y > -1.0 && x + y < 0.0);
        }

        let (weights, points) = tetrahedron_collapsed_gauss(n.min(6));
        prop_assert!(weights.iter().all(|&w| w > 0.0));
        for [x, y, z] in points {
            prop_assert!(x > -1.0 && y > -1.0 && z > -1.0 && x + y + z < -1.0);
        }
    }
}
