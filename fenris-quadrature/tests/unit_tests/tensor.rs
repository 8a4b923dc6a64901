use fenris_quadrature::integrate;
use fenris_quadrature::tensor::{hexahedron_gauss, hypercube_gauss, quadrilateral_gauss};
use fenris_quadrature::univariate::gauss;
use matrixcompare::assert_scalar_eq;

fn monomial_integral_1d(alpha: i32) -> f64 {
    (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0)
}

#[test]
fn quadrilateral_gauss_integrates_per_axis_degree_exactly() {
    for n in 1..=12 {
        let rule = quadrilateral_gauss(n);
        assert!(rule.0.iter().all(|&w| w > 0.0));

        let degree = (2 * n - 1) as i32;
        for alpha in 0..=degree {
            for beta in 0..=degree {
                let estimated = integrate(&rule, |&[x, y]| x.powi(alpha) * y.powi(beta));
                let expected = monomial_integral_1d(alpha) * monomial_integral_1d(beta);
                assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn hexahedron_gauss_integrates_per_axis_degree_exactly() {
    for n in 1..=6 {
        let rule = hexahedron_gauss(n);
        assert!(rule.0.iter().all(|&w| w > 0.0));

        let degree = (2 * n - 1) as i32;
        for alpha in 0..=degree {
            for beta in 0..=degree {
                for gamma in 0..=degree {
                    let estimated = integrate(&rule, |&[x, y, z]| x.powi(alpha) * y.powi(beta) * z.powi(gamma));
                    let expected =
                        monomial_integral_1d(alpha) * monomial_integral_1d(beta) * monomial_integral_1d(gamma);
                    assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
                }
            }
        }
    }
}

#[test]
fn hypercube_gauss_varies_first_coordinate_fastest() {
    let (_, points1d) = gauss(3);
    let (weights, points) = hypercube_gauss::<2>(3);
    assert_eq!(weights.len(), 9);
    for j in 0..3 {
        for i in 0..3 {
            assert_eq!(points[3 * j + i], [points1d[i][0], points1d[j][0]]);
        }
    }
}
