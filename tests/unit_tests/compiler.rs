use skald::compiler::{
    compile_and_write, compile_form_file, compile_many, CompileError, CompilerOptions, FormFile,
};
use skald::element::{ElementDescriptor, ElementFamily, ReferenceCell};
use skald::form::{mul, Expr, Form, Integral, Measure, RepresentationChoice};

fn mass_form(cell: ReferenceCell, measure: Measure) -> Form {
    let element = ElementDescriptor::scalar(ElementFamily::Lagrange, cell, 1).unwrap();
    let u = Expr::trial_function(element.clone());
    let v = Expr::test_function(element);
    Form::from_integrals(vec![Integral::new(mul(u, v).unwrap(), measure)]).unwrap()
}

fn good_file(prefix: &str) -> FormFile {
    FormFile::new(prefix).with_bilinear(mass_form(ReferenceCell::Triangle, Measure::cell(0)))
}

fn failing_file(prefix: &str) -> FormFile {
    // An explicit tensor request on a non-affine cell fails at planning
    let measure = Measure::cell(0).with_representation(RepresentationChoice::Tensor);
    FormFile::new(prefix).with_bilinear(mass_form(ReferenceCell::Quadrilateral, measure))
}

#[test]
fn empty_files_are_rejected() {
    let error = compile_form_file(&FormFile::new("empty"), &CompilerOptions::default()).unwrap_err();
    assert!(matches!(error, CompileError::EmptyFile { .. }));
    assert_eq!(error.exit_code(), 1);
}

#[test]
fn term_errors_identify_the_form() {
    let error = compile_form_file(&failing_file("bad"), &CompilerOptions::default()).unwrap_err();
    match &error {
        CompileError::Term { form, .. } => assert_eq!(form, "a"),
        other => panic!("unexpected error: {:?}", other),
    }
    let message = error.to_string();
    assert!(message.contains("tensor representation"), "{}", message);
    assert!(message.contains("verbosity"), "{}", message);
}

#[test]
fn compile_and_write_produces_the_output_file() {
    let directory = tempfile::tempdir().unwrap();
    let options = CompilerOptions {
        output_dir: directory.path().to_path_buf(),
        ..CompilerOptions::default()
    };

    let outcome = compile_and_write(&good_file("mass"), &options);
    let (path, metadata) = outcome.result.expect("Compilation succeeds");
    assert_eq!(path, directory.path().join("mass.rs"));
    assert_eq!(metadata.len(), 1);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("// Automatically generated by the skald form compiler."));

    // No temporary files are left behind
    let leftovers: Vec<_> = std::fs::read_dir(directory.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn failures_do_not_leave_partial_output() {
    let directory = tempfile::tempdir().unwrap();
    let options = CompilerOptions {
        output_dir: directory.path().to_path_buf(),
        ..CompilerOptions::default()
    };

    let outcome = compile_and_write(&failing_file("broken"), &options);
    assert!(outcome.result.is_err());
    assert!(std::fs::read_dir(directory.path()).unwrap().next().is_none());
}

#[test]
fn one_failing_file_does_not_block_the_others() {
    let directory = tempfile::tempdir().unwrap();
    let options = CompilerOptions {
        output_dir: directory.path().to_path_buf(),
        ..CompilerOptions::default()
    };

    let files = vec![good_file("first"), failing_file("second"), good_file("third")];
    let outcomes = compile_many(&files, &options);
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].prefix, "first");
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_err());
    assert!(outcomes[2].result.is_ok());

    assert!(directory.path().join("first.rs").exists());
    assert!(!directory.path().join("second.rs").exists());
    assert!(directory.path().join("third.rs").exists());
}

#[test]
fn compilation_is_deterministic_across_drivers() {
    let options = CompilerOptions::default();
    let first = compile_form_file(&good_file("mass"), &options).unwrap();
    let second = compile_form_file(&good_file("mass"), &options).unwrap();
    assert_eq!(first.source, second.source);
}
