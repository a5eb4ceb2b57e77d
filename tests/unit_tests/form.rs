use skald::element::{ElementDescriptor, ElementFamily, ReferenceCell, Shape};
use skald::form::{
    add, dot, grad, inner, mul, simplify, sub, Expr, Form, Integral, Measure, ShapeError,
};

fn p1(cell: ReferenceCell) -> ElementDescriptor {
    ElementDescriptor::scalar(ElementFamily::Lagrange, cell, 1).unwrap()
}

fn vector_p1(cell: ReferenceCell) -> ElementDescriptor {
    ElementDescriptor::vector(ElementFamily::Lagrange, cell, 1).unwrap()
}

#[test]
fn grad_of_scalar_is_a_vector() {
    let u = Expr::trial_function(p1(ReferenceCell::Triangle));
    let gradient = grad(u).unwrap();
    assert_eq!(gradient.shape(), Shape::vector(2));
}

#[test]
fn grad_of_vector_is_a_matrix() {
    let u = Expr::trial_function(vector_p1(ReferenceCell::Triangle));
    let gradient = grad(u).unwrap();
    assert_eq!(gradient.shape(), Shape::matrix(2, 2));
}

#[test]
fn inner_requires_equal_shapes() {
    let u = Expr::trial_function(vector_p1(ReferenceCell::Triangle));
    let v = Expr::test_function(p1(ReferenceCell::Triangle));
    let error = inner(u, v).unwrap_err();
    match error {
        ShapeError::Mismatch { operation, left_shape, right_shape, .. } => {
            assert_eq!(operation, "inner");
            assert_eq!(left_shape, Shape::vector(2));
            assert_eq!(right_shape, Shape::scalar());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn mul_rejects_two_non_scalars() {
    let u = Expr::trial_function(vector_p1(ReferenceCell::Triangle));
    let v = Expr::test_function(vector_p1(ReferenceCell::Triangle));
    assert!(matches!(mul(u, v), Err(ShapeError::Mismatch { .. })));
}

#[test]
fn grad_of_a_bare_constant_is_rejected() {
    let error = grad(Expr::constant(2.0)).unwrap_err();
    assert!(matches!(error, ShapeError::Unsupported { operation: "grad", .. }));
}

#[test]
fn mixed_cells_are_rejected() {
    let u = Expr::trial_function(p1(ReferenceCell::Triangle));
    let v = Expr::test_function(p1(ReferenceCell::Tetrahedron));
    assert!(matches!(mul(u, v), Err(ShapeError::CellMismatch { .. })));
}

#[test]
fn dot_contracts_adjacent_axes() {
    let u = Expr::trial_function(vector_p1(ReferenceCell::Triangle));
    let n = Expr::facet_normal(ReferenceCell::Triangle);
    let contracted = dot(u, n).unwrap();
    assert!(contracted.shape().is_scalar());
}

#[test]
fn shape_errors_render_the_offending_subexpression() {
    let u = Expr::trial_function(vector_p1(ReferenceCell::Triangle));
    let v = Expr::test_function(p1(ReferenceCell::Triangle));
    let message = inner(u, v).unwrap_err().to_string();
    assert!(message.contains("inner"), "{}", message);
    assert!(message.contains("(2)"), "{}", message);
}

#[test]
fn form_rank_counts_argument_kinds() {
    let element = p1(ReferenceCell::Triangle);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());

    let bilinear = Form::from_integrals(vec![Integral::new(
        mul(u.clone(), v.clone()).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();
    assert_eq!(bilinear.rank(), 2);
    assert_eq!(bilinear.argument_dimensions(), vec![3, 3]);

    let linear = Form::from_integrals(vec![Integral::new(v.clone(), Measure::cell(0))]).unwrap();
    assert_eq!(linear.rank(), 1);

    let functional = Form::from_integrals(vec![Integral::new(
        Expr::coefficient(0, "f", element),
        Measure::cell(0),
    )])
    .unwrap();
    assert_eq!(functional.rank(), 0);
}

#[test]
fn conflicting_test_functions_are_rejected() {
    let v1 = Expr::test_function(p1(ReferenceCell::Triangle));
    let v2 = Expr::test_function(
        ElementDescriptor::scalar(ElementFamily::Lagrange, ReferenceCell::Triangle, 2).unwrap(),
    );
    let result = Form::from_integrals(vec![Integral::new(
        add(v1, v2).unwrap(),
        Measure::cell(0),
    )]);
    assert!(matches!(result, Err(ShapeError::ConflictingArguments { .. })));
}

#[test]
fn coefficient_indices_must_be_contiguous() {
    let element = p1(ReferenceCell::Triangle);
    let v = Expr::test_function(element.clone());
    let f = Expr::coefficient(1, "f", element);
    let result = Form::from_integrals(vec![Integral::new(
        mul(f, v).unwrap(),
        Measure::cell(0),
    )]);
    assert!(matches!(result, Err(ShapeError::InvalidCoefficients { .. })));
}

#[test]
fn simplify_folds_constants_and_units() {
    let element = p1(ReferenceCell::Triangle);
    let u = Expr::trial_function(element.clone());

    let one_times_u = mul(Expr::constant(1.0), u.clone()).unwrap();
    assert_eq!(simplify(&one_times_u), u);

    let u_plus_zero = add(u.clone(), Expr::constant(0.0)).unwrap();
    assert_eq!(simplify(&u_plus_zero), u);

    let folded = add(Expr::constant(2.0), Expr::constant(3.0)).unwrap();
    assert_eq!(simplify(&folded), Expr::constant(5.0));

    let difference = sub(u.clone(), Expr::constant(0.0)).unwrap();
    // Desugared to u + (-0.0); the negated constant folds away
    assert_eq!(simplify(&difference), u);
}

#[test]
fn expressions_render_compactly() {
    let element = p1(ReferenceCell::Triangle);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let integrand = inner(grad(u).unwrap(), grad(v).unwrap()).unwrap();
    assert_eq!(integrand.to_string(), "inner(grad(u), grad(v))");
}
