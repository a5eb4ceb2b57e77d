use matrixcompare::assert_scalar_eq;
use proptest::collection::vec;
use proptest::prelude::*;
use skald_quadrature::simplex::{tetrahedron_collapsed, triangle_collapsed};
use skald_quadrature::{integrate, triangle};

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

/// Exact integral of x^a y^b over the unit triangle.
fn triangle_monomial_integral(a: usize, b: usize) -> f64 {
    factorial(a) * factorial(b) / factorial(a + b + 2)
}

/// Exact integral of x^a y^b z^c over the unit tetrahedron.
fn tetrahedron_monomial_integral(a: usize, b: usize, c: usize) -> f64 {
    factorial(a) * factorial(b) * factorial(c) / factorial(a + b + c + 3)
}

#[test]
fn triangle_rules_integrate_monomials_exactly() {
    for degree in 0..=10 {
        let rule = triangle_collapsed(degree);

        assert!(rule.0.iter().all(|&w| w > 0.0));
        // All points must lie inside the unit triangle
        assert!(rule.1.iter().all(|&[x, y]| x >= 0.0 && y >= 0.0 && x + y <= 1.0));

        for a in 0..=degree {
            for b in 0..=(degree - a) {
                let exact = triangle_monomial_integral(a, b);
                let estimated = integrate(&rule, |&[x, y]| x.powi(a as i32) * y.powi(b as i32));
                assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn tetrahedron_rules_integrate_monomials_exactly() {
    for degree in 0..=8 {
        let rule = tetrahedron_collapsed(degree);

        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule
            .1
            .iter()
            .all(|&[x, y, z]| x >= 0.0 && y >= 0.0 && z >= 0.0 && x + y + z <= 1.0));

        for a in 0..=degree {
            for b in 0..=(degree - a) {
                for c in 0..=(degree - a - b) {
                    let exact = tetrahedron_monomial_integral(a, b, c);
                    let estimated = integrate(&rule, |&[x, y, z]| {
                        x.powi(a as i32) * y.powi(b as i32) * z.powi(c as i32)
                    });
                    assert_scalar_eq!(estimated, exact, comp = abs, tol = 1e-14);
                }
            }
        }
    }
}

proptest! {
    /// Any polynomial of total degree <= d is integrated exactly by the
    /// degree-d triangle rule.
    #[test]
    fn triangle_rule_integrates_random_polynomials_exactly(
        degree in 0usize..=6,
        raw_coefficients in vec(-10.0f64..10.0, 28),
    ) {
        // Monomial exponents (a, b) with a + b <= degree, paired with the
        // generated coefficients
        let monomials: Vec<(usize, usize, f64)> = (0..=degree)
            .flat_map(|a| (0..=(degree - a)).map(move |b| (a, b)))
            .zip(&raw_coefficients)
            .map(|((a, b), &c)| (a, b, c))
            .collect();

        let rule = triangle(degree);
        let estimated = integrate(&rule, |&[x, y]| {
            monomials
                .iter()
                .map(|&(a, b, c)| c * x.powi(a as i32) * y.powi(b as i32))
                .sum()
        });
        let exact: f64 = monomials
            .iter()
            .map(|&(a, b, c)| c * triangle_monomial_integral(a, b))
            .sum();

        prop_assert!((estimated - exact).abs() <= 1e-12 * (1.0 + exact.abs()));
    }
}
