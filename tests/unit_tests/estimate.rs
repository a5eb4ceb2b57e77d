use skald::element::{ElementDescriptor, ElementFamily, ReferenceCell};
use skald::estimate::{resolve_degree, DegreeError, DegreePolicy, StandardDegreePolicy};
use skald::form::{grad, inner, mul, quotient, Expr, Measure};

fn lagrange(degree: usize) -> ElementDescriptor {
    ElementDescriptor::scalar(ElementFamily::Lagrange, ReferenceCell::Triangle, degree).unwrap()
}

#[test]
fn derivatives_lower_the_degree_without_going_negative() {
    let policy = StandardDegreePolicy;
    let u = Expr::trial_function(lagrange(1));
    let v = Expr::test_function(lagrange(1));

    // Each gradient of a degree-1 factor contributes degree 0
    let stiffness = inner(grad(u).unwrap(), grad(v).unwrap()).unwrap();
    assert_eq!(policy.estimate(&stiffness), Ok(0));

    // A second application must saturate at zero, not underflow
    let laplacian_factor = grad(Expr::trial_function(lagrange(1))).unwrap();
    assert_eq!(policy.estimate(&laplacian_factor), Ok(0));
}

#[test]
fn factors_add_their_element_degrees() {
    let policy = StandardDegreePolicy;
    let u = Expr::trial_function(lagrange(2));
    let v = Expr::test_function(lagrange(2));
    let mass = mul(u, v).unwrap();
    assert_eq!(policy.estimate(&mass), Ok(4));

    let w = Expr::coefficient(0, "w", lagrange(1));
    let u = Expr::trial_function(lagrange(1));
    let v = Expr::test_function(lagrange(1));
    let weighted = mul(w, mul(u, v).unwrap()).unwrap();
    assert_eq!(policy.estimate(&weighted), Ok(3));
}

#[test]
fn non_affine_cells_add_the_jacobian_degree() {
    let policy = StandardDegreePolicy;
    let element =
        ElementDescriptor::scalar(ElementFamily::Lagrange, ReferenceCell::Quadrilateral, 1).unwrap();
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let mass = mul(u, v).unwrap();
    // 1 + 1 from the factors, plus the multilinear Jacobian factor
    assert_eq!(policy.estimate(&mass), Ok(3));
}

#[test]
fn division_by_non_constants_is_unbounded() {
    let policy = StandardDegreePolicy;
    let f = Expr::coefficient(0, "f", lagrange(1));
    let v = Expr::test_function(lagrange(1));
    let integrand = quotient(v, f).unwrap();
    assert!(matches!(
        policy.estimate(&integrand),
        Err(DegreeError::NonPolynomial { .. })
    ));
}

#[test]
fn piecewise_constant_denominators_are_fine() {
    let policy = StandardDegreePolicy;
    let f = Expr::coefficient(
        0,
        "f",
        ElementDescriptor::scalar(ElementFamily::DiscontinuousLagrange, ReferenceCell::Triangle, 0)
            .unwrap(),
    );
    let v = Expr::test_function(lagrange(2));
    let integrand = quotient(v, f).unwrap();
    assert_eq!(policy.estimate(&integrand), Ok(2));
}

#[test]
fn explicit_degree_overrides_the_estimate() {
    let policy = StandardDegreePolicy;
    let u = Expr::trial_function(lagrange(1));
    let v = Expr::test_function(lagrange(1));
    let mass = mul(u, v).unwrap();

    let measure = Measure::cell(0).with_degree(7);
    assert_eq!(resolve_degree(&mass, &measure, &policy), 7);

    let automatic = Measure::cell(0);
    assert_eq!(resolve_degree(&mass, &automatic, &policy), 2);
}

#[test]
fn estimation_failure_falls_back_to_the_conservative_default() {
    let policy = StandardDegreePolicy;
    let f = Expr::coefficient(0, "f", lagrange(1));
    let v = Expr::test_function(lagrange(1));
    let integrand = quotient(v, f).unwrap();

    // 2 * max element degree + 1
    let measure = Measure::cell(0);
    assert_eq!(resolve_degree(&integrand, &measure, &policy), 3);

    // An explicit degree bypasses estimation entirely
    let fixed = Measure::cell(0).with_degree(5);
    assert_eq!(resolve_degree(&integrand, &fixed, &policy), 5);
}
