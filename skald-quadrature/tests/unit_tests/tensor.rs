use matrixcompare::assert_scalar_eq;
use skald_quadrature::integrate;
use skald_quadrature::tensor::{hexahedron_gauss, quadrilateral_gauss};

fn monomial_integral_unit_1d(alpha: i32) -> f64 {
    1.0 / (alpha as f64 + 1.0)
}

#[test]
fn quadrilateral_gauss_rules_satisfy_expected_accuracy() {
    // Number of points in each dimension of rule
    for n in 1..=10 {
        // Expected polynomial degree that the rule can exactly integrate *along each dimension*
        let expected_polynomial_degree = 2 * n - 1;
        let rule = quadrilateral_gauss(n);

        // Also test that weights are positive
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            for beta in 0..=expected_polynomial_degree as i32 {
                let exact = monomial_integral_unit_1d(alpha) * monomial_integral_unit_1d(beta);
                let estimated = integrate(&rule, |&[x, y]| x.powi(alpha) * y.powi(beta));
                assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn hexahedron_gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=6 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = hexahedron_gauss(n);

        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            for beta in 0..=expected_polynomial_degree as i32 {
                for gamma in 0..=expected_polynomial_degree as i32 {
                    let exact = monomial_integral_unit_1d(alpha)
                        * monomial_integral_unit_1d(beta)
                        * monomial_integral_unit_1d(gamma);
                    let estimated =
                        integrate(&rule, |&[x, y, z]| x.powi(alpha) * y.powi(beta) * z.powi(gamma));
                    assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-13);
                }
            }
        }
    }
}
