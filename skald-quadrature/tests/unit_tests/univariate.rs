use matrixcompare::assert_scalar_eq;
use skald_quadrature::integrate;
use skald_quadrature::univariate::{gauss, gauss_unit};

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=20 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        // Also test that weights are positive
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            // Exact integral of x^alpha over [-1, 1]
            let exact = (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0);
            let estimated = integrate(&rule, |&[x]| x.powi(alpha));
            assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn gauss_unit_rules_satisfy_expected_accuracy() {
    for n in 1..=20 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss_unit(n);

        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule.1.iter().all(|&[x]| (0.0..=1.0).contains(&x)));

        for alpha in 0..=expected_polynomial_degree as i32 {
            // Exact integral of x^alpha over [0, 1]
            let exact = 1.0 / (alpha as f64 + 1.0);
            let estimated = integrate(&rule, |&[x]| x.powi(alpha));
            assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn gauss_rules_are_deterministic_across_calls() {
    for n in 1..=10 {
        let (weights1, points1) = gauss_unit(n);
        let (weights2, points2) = gauss_unit(n);
        assert_eq!(weights1, weights2);
        assert_eq!(points1, points2);
    }
}
