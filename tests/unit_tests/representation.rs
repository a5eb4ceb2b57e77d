use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DMatrix;
use proptest::prelude::*;
use skald::element::{ElementDescriptor, ElementFamily, ReferenceCell};
use skald::estimate::StandardDegreePolicy;
use skald::form::{
    add, div, dot, grad, inner, mul, quotient, Expr, Form, Integral, Measure,
    RepresentationChoice,
};
use skald::geometry::CellGeometry;
use skald::representation::{
    plan_form, CompiledForm, PlanOptions, RepresentationKind, RepresentationPlan, TermError,
};

fn lagrange(cell: ReferenceCell, degree: usize) -> ElementDescriptor {
    ElementDescriptor::scalar(ElementFamily::Lagrange, cell, degree).unwrap()
}

fn plan(form: &Form, default: RepresentationChoice) -> CompiledForm {
    let options = PlanOptions {
        default_representation: default,
        optimize: false,
    };
    plan_form(form, &options, &StandardDegreePolicy).expect("Planning succeeds")
}

fn try_plan(form: &Form, default: RepresentationChoice) -> Result<CompiledForm, TermError> {
    let options = PlanOptions {
        default_representation: default,
        optimize: false,
    };
    plan_form(form, &options, &StandardDegreePolicy)
}

fn stiffness_form(element: &ElementDescriptor, measure: Measure) -> Form {
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());
    let integrand = inner(grad(u).unwrap(), grad(v).unwrap()).unwrap();
    Form::from_integrals(vec![Integral::new(integrand, measure)]).unwrap()
}

fn mass_form(element: &ElementDescriptor, measure: Measure) -> Form {
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());
    Form::from_integrals(vec![Integral::new(mul(u, v).unwrap(), measure)]).unwrap()
}

fn first_plan_kind(compiled: &CompiledForm) -> RepresentationKind {
    compiled.domains()[0].subdomains[0].integrals[0].plan.kind()
}

fn reference_triangle() -> CellGeometry {
    CellGeometry::reference(ReferenceCell::Triangle)
}

fn as_matrix(buffer: &[f64], rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_row_slice(rows, cols, buffer)
}

#[test]
fn stiffness_matrix_on_the_reference_triangle_is_exact() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let form = stiffness_form(&element, Measure::cell(0));

    for default in [RepresentationChoice::Tensor, RepresentationChoice::Quadrature] {
        let compiled = plan(&form, default);
        let values = compiled
            .evaluate_cell(0, &reference_triangle(), &[])
            .unwrap();
        assert_eq!(values.len(), 9);
        let expected = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, -0.5, -0.5, -0.5, 0.5, 0.0, -0.5, 0.0, 0.5],
        );
        assert_matrix_eq!(as_matrix(&values, 3, 3), expected, comp = abs, tol = 1e-13);
    }
}

#[test]
fn mass_matrix_on_the_reference_triangle_is_exact() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let form = mass_form(&element, Measure::cell(0));
    let compiled = plan(&form, RepresentationChoice::Auto);
    assert_eq!(first_plan_kind(&compiled), RepresentationKind::Tensor);

    let values = compiled
        .evaluate_cell(0, &reference_triangle(), &[])
        .unwrap();
    // Unit Jacobian determinant: 1/12 on the diagonal, 1/24 off it
    let d = 1.0 / 12.0;
    let o = 1.0 / 24.0;
    let expected = DMatrix::from_row_slice(3, 3, &[d, o, o, o, d, o, o, o, d]);
    assert_matrix_eq!(as_matrix(&values, 3, 3), expected, comp = abs, tol = 1e-14);
}

#[test]
fn mass_matrix_scales_with_the_jacobian_determinant() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let form = mass_form(&element, Measure::cell(0));
    let compiled = plan(&form, RepresentationChoice::Auto);

    // A triangle twice the reference size: det J = 4
    let geometry = CellGeometry::from_vertices(
        ReferenceCell::Triangle,
        &[&[0.0, 0.0], &[2.0, 0.0], &[0.0, 2.0]],
    );
    let values = compiled.evaluate_cell(0, &geometry, &[]).unwrap();
    assert_scalar_eq!(values[0], 4.0 / 12.0, comp = abs, tol = 1e-13);
    assert_scalar_eq!(values[1], 4.0 / 24.0, comp = abs, tol = 1e-13);
}

fn assert_representations_agree(form: &Form, geometry: &CellGeometry, coefficients: &[Vec<f64>]) {
    let tensor = plan(form, RepresentationChoice::Tensor);
    let quadrature = plan(form, RepresentationChoice::Quadrature);
    assert_eq!(first_plan_kind(&tensor), RepresentationKind::Tensor);
    assert_eq!(first_plan_kind(&quadrature), RepresentationKind::Quadrature);

    let tensor_values = tensor.evaluate_cell(0, geometry, coefficients).unwrap();
    let quadrature_values = quadrature.evaluate_cell(0, geometry, coefficients).unwrap();
    assert_eq!(tensor_values.len(), quadrature_values.len());
    for (left, right) in tensor_values.iter().zip(&quadrature_values) {
        assert_scalar_eq!(*left, *right, comp = abs, tol = 1e-11);
    }
}

#[test]
fn representations_agree_on_a_skewed_triangle() {
    let geometry = CellGeometry::from_vertices(
        ReferenceCell::Triangle,
        &[&[0.0, 0.0], &[2.0, 0.3], &[0.4, 1.7]],
    );

    for degree in [1, 2] {
        let element = lagrange(ReferenceCell::Triangle, degree);
        assert_representations_agree(&stiffness_form(&element, Measure::cell(0)), &geometry, &[]);
        assert_representations_agree(&mass_form(&element, Measure::cell(0)), &geometry, &[]);
    }
}

#[test]
fn representations_agree_on_a_tetrahedron() {
    let geometry = CellGeometry::from_vertices(
        ReferenceCell::Tetrahedron,
        &[
            &[0.0, 0.0, 0.0],
            &[1.1, 0.1, 0.0],
            &[0.2, 1.3, 0.1],
            &[0.0, 0.2, 0.9],
        ],
    );
    let element = lagrange(ReferenceCell::Tetrahedron, 2);
    assert_representations_agree(&stiffness_form(&element, Measure::cell(0)), &geometry, &[]);
}

#[test]
fn representations_agree_on_coefficient_weighted_forms() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let geometry = CellGeometry::from_vertices(
        ReferenceCell::Triangle,
        &[&[0.0, 0.0], &[1.5, 0.2], &[0.1, 1.2]],
    );

    // Variable-coefficient stiffness: w * inner(grad(u), grad(v))
    let w = Expr::coefficient(0, "w", element.clone());
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());
    let integrand = mul(
        w,
        inner(grad(u).unwrap(), grad(v).unwrap()).unwrap(),
    )
    .unwrap();
    let form = Form::from_integrals(vec![Integral::new(integrand, Measure::cell(0))]).unwrap();

    let coefficients = vec![vec![0.7, 1.9, -0.4]];
    assert_representations_agree(&form, &geometry, &coefficients);

    // Load vector: f * v
    let f = Expr::coefficient(0, "f", element.clone());
    let v = Expr::test_function(element);
    let load = Form::from_integrals(vec![Integral::new(
        mul(f, v).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();
    assert_representations_agree(&load, &geometry, &coefficients);
}

#[test]
fn load_vector_with_unit_coefficient_integrates_the_basis() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let f = Expr::coefficient(0, "f", element.clone());
    let v = Expr::test_function(element);
    let load = Form::from_integrals(vec![Integral::new(
        mul(f, v).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();

    let compiled = plan(&load, RepresentationChoice::Auto);
    let values = compiled
        .evaluate_cell(0, &reference_triangle(), &[vec![1.0, 1.0, 1.0]])
        .unwrap();
    // Each basis function integrates to area / 3 = 1/6 on the reference cell
    for value in values {
        assert_scalar_eq!(value, 1.0 / 6.0, comp = abs, tol = 1e-14);
    }
}

#[test]
fn vector_valued_mass_matrix_is_block_diagonal() {
    let element = ElementDescriptor::vector(ElementFamily::Lagrange, ReferenceCell::Triangle, 1)
        .unwrap();
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let form = Form::from_integrals(vec![Integral::new(
        inner(u, v).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();

    for default in [RepresentationChoice::Tensor, RepresentationChoice::Quadrature] {
        let compiled = plan(&form, default);
        let values = compiled
            .evaluate_cell(0, &reference_triangle(), &[])
            .unwrap();
        assert_eq!(values.len(), 36);
        let matrix = as_matrix(&values, 6, 6);
        let d = 1.0 / 12.0;
        let o = 1.0 / 24.0;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { d } else { o };
                // Same-component blocks carry the scalar mass matrix
                assert_scalar_eq!(matrix[(i, j)], expected, comp = abs, tol = 1e-14);
                assert_scalar_eq!(matrix[(3 + i, 3 + j)], expected, comp = abs, tol = 1e-14);
                // Cross-component blocks vanish
                assert_scalar_eq!(matrix[(i, 3 + j)], 0.0, comp = abs, tol = 1e-14);
                assert_scalar_eq!(matrix[(3 + i, j)], 0.0, comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn additive_term_order_does_not_change_tensor_plans() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let build = |swapped: bool| {
        let u = Expr::trial_function(element.clone());
        let v = Expr::test_function(element.clone());
        let mass = mul(u.clone(), v.clone()).unwrap();
        let stiffness = inner(grad(u).unwrap(), grad(v).unwrap()).unwrap();
        let integrand = if swapped {
            add(stiffness, mass).unwrap()
        } else {
            add(mass, stiffness).unwrap()
        };
        Form::from_integrals(vec![Integral::new(integrand, Measure::cell(0))]).unwrap()
    };

    let geometry = CellGeometry::from_vertices(
        ReferenceCell::Triangle,
        &[&[0.0, 0.0], &[1.2, 0.1], &[0.3, 0.9]],
    );
    let first = plan(&build(false), RepresentationChoice::Tensor)
        .evaluate_cell(0, &geometry, &[])
        .unwrap();
    let second = plan(&build(true), RepresentationChoice::Tensor)
        .evaluate_cell(0, &geometry, &[])
        .unwrap();
    // Monomial canonicalization makes the plans identical, so the values
    // agree exactly, not just within rounding
    assert_eq!(first, second);
}

#[test]
fn automatic_selection_prefers_tensor_on_affine_cells() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let compiled = plan(&stiffness_form(&element, Measure::cell(0)), RepresentationChoice::Auto);
    assert_eq!(first_plan_kind(&compiled), RepresentationKind::Tensor);
}

#[test]
fn automatic_selection_uses_quadrature_on_non_affine_cells() {
    let element = lagrange(ReferenceCell::Quadrilateral, 1);
    let compiled = plan(&mass_form(&element, Measure::cell(0)), RepresentationChoice::Auto);
    assert_eq!(first_plan_kind(&compiled), RepresentationKind::Quadrature);
}

#[test]
fn explicit_tensor_on_a_non_affine_cell_fails() {
    let element = lagrange(ReferenceCell::Quadrilateral, 1);
    let measure = Measure::cell(3).with_representation(RepresentationChoice::Tensor);
    let error = try_plan(&mass_form(&element, measure), RepresentationChoice::Auto).unwrap_err();
    match error {
        TermError::RepresentationInapplicable { subdomain, .. } => assert_eq!(subdomain, 3),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn division_by_a_coefficient_forces_quadrature() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let build = |measure: Measure| {
        let f = Expr::coefficient(0, "f", element.clone());
        let u = Expr::trial_function(element.clone());
        let v = Expr::test_function(element.clone());
        let integrand = quotient(mul(u, v).unwrap(), f).unwrap();
        Form::from_integrals(vec![Integral::new(integrand, measure)]).unwrap()
    };

    let compiled = plan(&build(Measure::cell(0)), RepresentationChoice::Auto);
    assert_eq!(first_plan_kind(&compiled), RepresentationKind::Quadrature);

    let explicit = Measure::cell(0).with_representation(RepresentationChoice::Tensor);
    assert!(matches!(
        try_plan(&build(explicit), RepresentationChoice::Auto),
        Err(TermError::RepresentationInapplicable { .. })
    ));
}

#[test]
fn facet_normals_are_rejected_in_cell_integrals() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let v = Expr::test_function(element);
    let n = Expr::facet_normal(ReferenceCell::Triangle);
    let integrand = dot(grad(v).unwrap(), n).unwrap();
    let form = Form::from_integrals(vec![Integral::new(integrand, Measure::cell(1))]).unwrap();
    assert!(matches!(
        try_plan(&form, RepresentationChoice::Auto),
        Err(TermError::DomainMismatch { subdomain: 1, .. })
    ));
}

#[test]
fn non_multilinear_terms_are_rejected() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let integrand = mul(mul(u.clone(), u).unwrap(), v).unwrap();
    let form = Form::from_integrals(vec![Integral::new(integrand, Measure::cell(0))]).unwrap();
    assert!(matches!(
        try_plan(&form, RepresentationChoice::Auto),
        Err(TermError::NotMultilinear { .. })
    ));
}

#[test]
fn second_derivatives_are_rejected() {
    let element = lagrange(ReferenceCell::Triangle, 2);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let integrand = mul(div(grad(u).unwrap()).unwrap(), v).unwrap();
    let form = Form::from_integrals(vec![Integral::new(integrand, Measure::cell(0))]).unwrap();
    assert!(matches!(
        try_plan(&form, RepresentationChoice::Auto),
        Err(TermError::UnsupportedDerivative { .. })
    ));
}

#[test]
fn boundary_source_integrates_over_the_facet() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let v = Expr::test_function(element);
    let form = Form::from_integrals(vec![Integral::new(v, Measure::exterior_facet(0))]).unwrap();

    for default in [RepresentationChoice::Tensor, RepresentationChoice::Quadrature] {
        let compiled = plan(&form, default);
        // Facet 0 is the hypotenuse; its length is sqrt(2) and only the
        // basis functions of vertices 1 and 2 are supported on it
        let values = compiled
            .evaluate_exterior_facet(0, 0, &reference_triangle(), &[])
            .unwrap();
        let half_hypotenuse = f64::sqrt(2.0) / 2.0;
        assert_scalar_eq!(values[0], 0.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(values[1], half_hypotenuse, comp = abs, tol = 1e-13);
        assert_scalar_eq!(values[2], half_hypotenuse, comp = abs, tol = 1e-13);

        // Facet 2 is the edge y = 0 with length 1
        let values = compiled
            .evaluate_exterior_facet(0, 2, &reference_triangle(), &[])
            .unwrap();
        assert_scalar_eq!(values[0], 0.5, comp = abs, tol = 1e-13);
        assert_scalar_eq!(values[1], 0.5, comp = abs, tol = 1e-13);
        assert_scalar_eq!(values[2], 0.0, comp = abs, tol = 1e-14);
    }
}

#[test]
fn facet_normal_flux_matches_the_closed_form() {
    // dot(grad(u), n) * v on the edge y = 0 of the reference triangle;
    // the outward normal there is (0, -1)
    let element = lagrange(ReferenceCell::Triangle, 1);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let n = Expr::facet_normal(ReferenceCell::Triangle);
    let integrand = mul(dot(grad(u).unwrap(), n).unwrap(), v).unwrap();
    let form =
        Form::from_integrals(vec![Integral::new(integrand, Measure::exterior_facet(0))]).unwrap();

    let compiled = plan(&form, RepresentationChoice::Auto);
    assert_eq!(first_plan_kind(&compiled), RepresentationKind::Quadrature);

    let values = compiled
        .evaluate_exterior_facet(0, 2, &reference_triangle(), &[])
        .unwrap();
    // dot(grad(phi_j), (0, -1)) is constant: 1 for j = 0, 0 for j = 1,
    // -1 for j = 2; integrating against phi_i over the unit edge gives
    // column values scaled by the integral of phi_i, i.e. 1/2 for the two
    // edge vertices and 0 for the opposite vertex
    let expected = [
        0.5, 0.0, -0.5, //
        0.5, 0.0, -0.5, //
        0.0, 0.0, 0.0,
    ];
    for (value, reference) in values.iter().zip(expected) {
        assert_scalar_eq!(*value, reference, comp = abs, tol = 1e-13);
    }
}

#[test]
fn interior_facet_terms_fill_side_blocks() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());
    let form = Form::from_integrals(vec![Integral::new(
        mul(u.clone(), v.clone()).unwrap(),
        Measure::interior_facet(0),
    )])
    .unwrap();
    let compiled = plan(&form, RepresentationChoice::Auto);
    assert_eq!(compiled.macro_buffer_length(), 36);

    let geometry = reference_triangle();
    let values = compiled
        .evaluate_interior_facet(0, [(&geometry, 0), (&geometry, 0)], &[])
        .unwrap();
    let matrix = as_matrix(&values, 6, 6);

    // Each side's block carries the facet mass matrix of its own cell
    let boundary_form =
        Form::from_integrals(vec![Integral::new(mul(u, v).unwrap(), Measure::exterior_facet(0))])
            .unwrap();
    let boundary = plan(&boundary_form, RepresentationChoice::Auto)
        .evaluate_exterior_facet(0, 0, &geometry, &[])
        .unwrap();
    let boundary = as_matrix(&boundary, 3, 3);

    for i in 0..3 {
        for j in 0..3 {
            assert_scalar_eq!(matrix[(i, j)], boundary[(i, j)], comp = abs, tol = 1e-13);
            assert_scalar_eq!(matrix[(3 + i, 3 + j)], boundary[(i, j)], comp = abs, tol = 1e-13);
            assert_scalar_eq!(matrix[(i, 3 + j)], 0.0, comp = abs, tol = 1e-14);
            assert_scalar_eq!(matrix[(3 + i, j)], 0.0, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn unknown_subdomains_leave_the_buffer_zeroed() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let form = mass_form(&element, Measure::cell(2));
    let compiled = plan(&form, RepresentationChoice::Auto);
    let values = compiled
        .evaluate_cell(7, &reference_triangle(), &[])
        .unwrap();
    assert!(values.iter().all(|&value| value == 0.0));
}

#[test]
fn subdomains_accumulate_independently() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());
    let form = Form::from_integrals(vec![
        Integral::new(mul(u.clone(), v.clone()).unwrap(), Measure::cell(0)),
        Integral::new(
            mul(Expr::constant(10.0), mul(u, v).unwrap()).unwrap(),
            Measure::cell(1),
        ),
    ])
    .unwrap();
    let compiled = plan(&form, RepresentationChoice::Auto);

    let base = compiled
        .evaluate_cell(0, &reference_triangle(), &[])
        .unwrap();
    let scaled = compiled
        .evaluate_cell(1, &reference_triangle(), &[])
        .unwrap();
    for (left, right) in base.iter().zip(&scaled) {
        assert_scalar_eq!(10.0 * left, *right, comp = abs, tol = 1e-12);
    }
}

proptest! {
    /// Tensor and quadrature representations agree on arbitrary
    /// non-degenerate affine triangles.
    #[test]
    fn representations_agree_on_random_affine_cells(
        coordinates in proptest::array::uniform6(-2.0f64..2.0),
    ) {
        let [x0, y0, x1, y1, x2, y2] = coordinates;
        let det = (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0);
        prop_assume!(det.abs() > 0.2);

        let geometry = CellGeometry::from_vertices(
            ReferenceCell::Triangle,
            &[&[x0, y0], &[x1, y1], &[x2, y2]],
        );
        let element = lagrange(ReferenceCell::Triangle, 1);
        let form = stiffness_form(&element, Measure::cell(0));

        let tensor = plan(&form, RepresentationChoice::Tensor)
            .evaluate_cell(0, &geometry, &[])
            .unwrap();
        let quadrature = plan(&form, RepresentationChoice::Quadrature)
            .evaluate_cell(0, &geometry, &[])
            .unwrap();
        for (left, right) in tensor.iter().zip(&quadrature) {
            prop_assert!((left - right).abs() <= 1e-10 * (1.0 + left.abs()));
        }
    }
}

#[test]
fn tensor_plans_expose_their_data() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let form = mass_form(&element, Measure::cell(0));
    let compiled = plan(&form, RepresentationChoice::Tensor);
    match &compiled.domains()[0].subdomains[0].integrals[0].plan {
        RepresentationPlan::Tensor(tensor) => {
            assert_eq!(tensor.argument_dimensions, vec![3, 3]);
            assert_eq!(tensor.variants.len(), 1);
            let term = &tensor.variants[0][0];
            assert!(term.physical_axes.is_empty());
            // The reference tensor of the mass term is the basis-product
            // Gram matrix of the reference triangle
            assert_scalar_eq!(term.reference[0], 1.0 / 12.0, comp = abs, tol = 1e-14);
            assert_scalar_eq!(term.reference[1], 1.0 / 24.0, comp = abs, tol = 1e-14);
        }
        other => panic!("expected a tensor plan, got {:?}", other),
    }
}
