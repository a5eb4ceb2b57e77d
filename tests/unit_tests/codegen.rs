use skald::codegen::{emit_module, FormMetadata, TargetLanguage};
use skald::compiler::{compile_form_file, CompilerOptions, FormFile};
use skald::element::{ElementDescriptor, ElementFamily, ReferenceCell};
use skald::estimate::StandardDegreePolicy;
use skald::form::{grad, inner, mul, Expr, Form, Integral, Measure, RepresentationChoice};
use skald::representation::{plan_form, PlanOptions};
use std::str::FromStr;

fn lagrange(cell: ReferenceCell, degree: usize) -> ElementDescriptor {
    ElementDescriptor::scalar(ElementFamily::Lagrange, cell, degree).unwrap()
}

fn poisson_file(cell: ReferenceCell) -> FormFile {
    let element = lagrange(cell, 1);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element.clone());
    let bilinear = Form::from_integrals(vec![Integral::new(
        inner(grad(u).unwrap(), grad(v).unwrap()).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();

    let f = Expr::coefficient(0, "f", element.clone());
    let v = Expr::test_function(element);
    let linear = Form::from_integrals(vec![Integral::new(
        mul(f, v).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();

    FormFile::new("poisson")
        .with_bilinear(bilinear)
        .with_linear(linear)
}

#[test]
fn generated_modules_carry_metadata_constants() {
    let module = compile_form_file(&poisson_file(ReferenceCell::Triangle), &CompilerOptions::default())
        .unwrap();
    let source = &module.source;

    assert!(source.starts_with("// Automatically generated by the skald form compiler."));
    assert!(source.contains("pub mod a {"), "{}", source);
    assert!(source.contains("pub mod l {"), "{}", source);
    assert!(source.contains("pub const RANK: usize = 2;"));
    assert!(source.contains("pub const RANK: usize = 1;"));
    assert!(source.contains("pub const TEST_LOCAL_DIMENSION: usize = 3;"));
    assert!(source.contains("pub const LOCAL_TENSOR_LENGTH: usize = 9;"));
    assert!(source.contains("pub const LOCAL_TENSOR_LENGTH: usize = 3;"));
    assert!(source.contains("pub fn cell_interior("));
    assert!(source.contains("match subdomain {"));
}

#[test]
fn recompilation_is_byte_identical() {
    let options = CompilerOptions::default();
    let first = compile_form_file(&poisson_file(ReferenceCell::Triangle), &options).unwrap();
    let second = compile_form_file(&poisson_file(ReferenceCell::Triangle), &options).unwrap();
    assert_eq!(first.source, second.source);
    assert_eq!(first.metadata, second.metadata);
}

#[test]
fn tensor_terms_unroll_the_geometry_contraction() {
    let module = compile_form_file(&poisson_file(ReferenceCell::Triangle), &CompilerOptions::default())
        .unwrap();
    let source = &module.source;
    // Affine Jacobian data and geometry tensor bindings
    assert!(source.contains("let det = j0_0 * j1_1 - j0_1 * j1_0;"), "{}", source);
    assert!(source.contains("let det_abs = det.abs();"));
    assert!(source.contains("let g0_00 ="), "{}", source);
    assert!(source.contains("local_tensor[0] +="));
}

#[test]
fn quadrature_terms_embed_rule_tables_and_loops() {
    let module = compile_form_file(&poisson_file(ReferenceCell::Quadrilateral), &CompilerOptions::default())
        .unwrap();
    let source = &module.source;
    assert!(source.contains("const W: [f64;"), "{}", source);
    assert!(source.contains("const FE0: [[f64;"), "{}", source);
    assert!(source.contains("for q in 0.."), "{}", source);
    // Non-affine cells compute the Jacobian per point from the geometry
    // basis gradient table
    assert!(source.contains("const GG:"), "{}", source);
}

#[test]
fn facet_procedures_dispatch_over_facets() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let v = Expr::test_function(element);
    let linear = Form::from_integrals(vec![Integral::new(v, Measure::exterior_facet(0))]).unwrap();
    let file = FormFile::new("boundary").with_linear(linear);

    let module = compile_form_file(&file, &CompilerOptions::default()).unwrap();
    let source = &module.source;
    assert!(source.contains("pub fn exterior_facet("), "{}", source);
    assert!(source.contains("match facet {"), "{}", source);
    assert!(!source.contains("pub fn cell_interior("), "{}", source);
}

#[test]
fn metadata_describes_the_forms() {
    let module = compile_form_file(&poisson_file(ReferenceCell::Triangle), &CompilerOptions::default())
        .unwrap();
    assert_eq!(module.metadata.len(), 2);

    let bilinear = &module.metadata[0];
    assert_eq!(bilinear.name, "a");
    assert_eq!(bilinear.rank, 2);
    assert_eq!(bilinear.cell, "triangle");
    assert_eq!(bilinear.spatial_dimension, 2);
    assert_eq!(bilinear.test_local_dimension, Some(3));
    assert_eq!(bilinear.trial_local_dimension, Some(3));
    assert_eq!(bilinear.local_tensor_length, 9);
    assert_eq!(bilinear.domains, vec!["cell_interior"]);

    let linear = &module.metadata[1];
    assert_eq!(linear.name, "L");
    assert_eq!(linear.rank, 1);
    assert_eq!(linear.local_tensor_length, 3);
    assert_eq!(linear.coefficient_local_dimensions, vec![3]);
}

#[test]
fn metadata_round_trips_through_json() {
    let module = compile_form_file(&poisson_file(ReferenceCell::Triangle), &CompilerOptions::default())
        .unwrap();
    let serialized = serde_json::to_string(&module.metadata).unwrap();
    let deserialized: Vec<FormMetadata> = serde_json::from_str(&serialized).unwrap();
    assert_eq!(module.metadata, deserialized);
}

#[test]
fn language_identifiers_parse() {
    assert_eq!(TargetLanguage::from_str("rust"), Ok(TargetLanguage::Rust));
    assert!(TargetLanguage::from_str("fortran").is_err());
}

#[test]
fn emit_module_is_usable_directly() {
    let element = lagrange(ReferenceCell::Triangle, 1);
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    let form = Form::from_integrals(vec![Integral::new(
        mul(u, v).unwrap(),
        Measure::cell(0),
    )])
    .unwrap();
    let options = PlanOptions {
        default_representation: RepresentationChoice::Auto,
        optimize: false,
    };
    let compiled = plan_form(&form, &options, &StandardDegreePolicy).unwrap();
    let module = emit_module("mass", &[("a", &compiled)], TargetLanguage::Rust);
    assert_eq!(module.prefix, "mass");
    assert!(module.source.contains("pub mod a {"));
}
