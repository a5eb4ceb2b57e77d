//! Code generation: from representation plans to source text.
//!
//! One module is generated per input file. It contains, per form, a set of
//! metadata constants and one procedure per domain kind present in the
//! form (`cell_interior`, `exterior_facet`, `interior_facet`). The
//! procedures depend on nothing but the language's core library: the
//! interface to the assembly engine is the procedure signatures and the
//! metadata block, versioned through `INTERFACE_VERSION`.
//!
//! Emission is deterministic: identical compiled forms produce
//! byte-identical source. All floating-point values are printed with the
//! shortest round-trip representation, and every collection is iterated in
//! a fixed order.

use crate::element::ReferenceCell;
use crate::form::DomainKind;
use crate::representation::{CompiledForm, RepresentationPlan};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

mod quadrature;
mod tensor;

/// The version of the generated-code interface contract.
pub const INTERFACE_VERSION: u32 = 1;

/// Output languages understood by the code generator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetLanguage {
    #[default]
    Rust,
}

impl Display for TargetLanguage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rust => write!(f, "rust"),
        }
    }
}

/// Error returned when parsing an unknown language identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl Display for UnknownLanguage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown output language `{}` (supported: rust)", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for TargetLanguage {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rust" => Ok(Self::Rust),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// The metadata descriptor of one generated form, for consumption by the
/// assembly engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormMetadata {
    pub name: String,
    pub rank: usize,
    pub cell: String,
    pub spatial_dimension: usize,
    pub topological_dimension: usize,
    pub test_local_dimension: Option<usize>,
    pub trial_local_dimension: Option<usize>,
    /// Product of the argument local dimensions; the length of the flat
    /// local tensor buffer.
    pub local_tensor_length: usize,
    pub value_shape: Vec<usize>,
    pub coefficient_local_dimensions: Vec<usize>,
    /// Domain kinds for which a procedure was generated.
    pub domains: Vec<String>,
    pub interface_version: u32,
}

impl FormMetadata {
    fn of(name: &str, compiled: &CompiledForm) -> Self {
        let form = compiled.form();
        let value_shape = form
            .test_element()
            .or_else(|| form.trial_element())
            .map(|element| element.value_shape().dims().to_vec())
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            rank: form.rank(),
            cell: form.cell().name().to_string(),
            spatial_dimension: form.cell().dimension(),
            topological_dimension: form.cell().dimension(),
            test_local_dimension: form.test_element().map(|e| e.local_dimension()),
            trial_local_dimension: form.trial_element().map(|e| e.local_dimension()),
            local_tensor_length: compiled.buffer_length(),
            value_shape,
            coefficient_local_dimensions: form
                .coefficients()
                .iter()
                .map(|c| c.element.local_dimension())
                .collect(),
            domains: compiled
                .domains()
                .iter()
                .map(|group| group.domain.procedure_name().to_string())
                .collect(),
            interface_version: INTERFACE_VERSION,
        }
    }
}

/// A generated output module: source text plus per-form metadata.
#[derive(Debug, Clone)]
pub struct GeneratedModule {
    pub prefix: String,
    pub language: TargetLanguage,
    pub source: String,
    pub metadata: Vec<FormMetadata>,
}

/// Prints a float so that it round-trips exactly.
pub(crate) fn format_float(value: f64) -> String {
    format!("{:?}", value)
}

/// An indentation-aware source text builder.
pub(crate) struct SourceBuilder {
    text: String,
    indent: usize,
}

impl SourceBuilder {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            indent: 0,
        }
    }

    pub fn line(&mut self, line: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.text.push_str("    ");
        }
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    pub fn blank(&mut self) {
        self.text.push('\n');
    }

    /// Writes a line and increases the indent (e.g. `foo {`).
    pub fn open(&mut self, line: impl AsRef<str>) {
        self.line(line);
        self.indent += 1;
    }

    /// Decreases the indent and writes a closing line (e.g. `}`).
    pub fn close(&mut self, line: impl AsRef<str>) {
        self.indent -= 1;
        self.line(line);
    }

    pub fn finish(self) -> String {
        self.text
    }
}

/// Emits the Jacobian of the affine map of a simplex cell from the
/// `coordinates` buffer: `j{r}_{c} = x_r(v_{c+1}) - x_r(v_0)`, followed by
/// determinant, inverse entries `k{b}_{a}` and `det_abs`.
pub(crate) fn emit_affine_jacobian(source: &mut SourceBuilder, cell: ReferenceCell, coords: &str) {
    let dim = cell.dimension();
    for r in 0..dim {
        for c in 0..dim {
            source.line(format!(
                "let j{}_{} = {}[{}] - {}[{}];",
                r,
                c,
                coords,
                (c + 1) * dim + r,
                coords,
                r
            ));
        }
    }
    emit_inverse_from_jacobian(source, dim);
}

/// Emits determinant and inverse entries `k{b}_{a}` from existing
/// `j{r}_{c}` bindings.
pub(crate) fn emit_inverse_from_jacobian(source: &mut SourceBuilder, dim: usize) {
    match dim {
        1 => {
            source.line("let det = j0_0;");
            source.line("let k0_0 = 1.0 / det;");
        }
        2 => {
            source.line("let det = j0_0 * j1_1 - j0_1 * j1_0;");
            source.line("let k0_0 = j1_1 / det;");
            source.line("let k0_1 = -j1_0 / det;");
            source.line("let k1_0 = -j0_1 / det;");
            source.line("let k1_1 = j0_0 / det;");
        }
        3 => {
            source.line("let c0_0 = j1_1 * j2_2 - j1_2 * j2_1;");
            source.line("let c0_1 = j1_2 * j2_0 - j1_0 * j2_2;");
            source.line("let c0_2 = j1_0 * j2_1 - j1_1 * j2_0;");
            source.line("let c1_0 = j0_2 * j2_1 - j0_1 * j2_2;");
            source.line("let c1_1 = j0_0 * j2_2 - j0_2 * j2_0;");
            source.line("let c1_2 = j0_1 * j2_0 - j0_0 * j2_1;");
            source.line("let c2_0 = j0_1 * j1_2 - j0_2 * j1_1;");
            source.line("let c2_1 = j0_2 * j1_0 - j0_0 * j1_2;");
            source.line("let c2_2 = j0_0 * j1_1 - j0_1 * j1_0;");
            source.line("let det = j0_0 * c0_0 + j0_1 * c0_1 + j0_2 * c0_2;");
            // K[b][a] = d xi_b / d x_a is the inverse, i.e. the transposed
            // cofactors over the determinant
            for b in 0..3 {
                for a in 0..3 {
                    source.line(format!("let k{}_{} = c{}_{} / det;", b, a, a, b));
                }
            }
        }
        _ => unreachable!("unsupported dimension {}", dim),
    }
    source.line("let det_abs = det.abs();");
}

/// Emits the generated module for one input file.
pub fn emit_module(
    prefix: &str,
    forms: &[(&str, &CompiledForm)],
    language: TargetLanguage,
) -> GeneratedModule {
    let TargetLanguage::Rust = language;
    let mut source = SourceBuilder::new();

    source.line("// Automatically generated by the skald form compiler. Do not edit.");
    source.line(format!("// Interface version {}.", INTERFACE_VERSION));
    source.line("//");
    source.line("// Conventions:");
    source.line("// - `coordinates` holds the cell vertex coordinates, vertex-major:");
    source.line("//   coordinates[v * dim + d] is coordinate d of vertex v.");
    source.line("// - `coefficients` holds one flat dof array per form coefficient.");
    source.line("// - The local tensor is row-major with the test index slowest.");
    source.line("// - Local-to-global dof mapping is delegated to the caller's mesh");
    source.line("//   abstraction; procedures only ever fill the local buffer.");
    source.line("// - Procedures return true on success after filling the buffer.");
    source.line("#![allow(unused, clippy::all)]");
    source.blank();

    for (index, (name, compiled)) in forms.iter().enumerate() {
        if index > 0 {
            source.blank();
        }
        emit_form_module(&mut source, name, compiled);
    }

    let metadata = forms
        .iter()
        .map(|(name, compiled)| FormMetadata::of(name, compiled))
        .collect();

    GeneratedModule {
        prefix: prefix.to_string(),
        language,
        source: source.finish(),
        metadata,
    }
}

fn emit_form_module(source: &mut SourceBuilder, name: &str, compiled: &CompiledForm) {
    let metadata = FormMetadata::of(name, compiled);

    source.line(format!("/// Local tensor procedures for the form `{}`.", name));
    source.open(format!("pub mod {} {{", sanitize_module_name(name)));

    source.line(format!("pub const INTERFACE_VERSION: u32 = {};", INTERFACE_VERSION));
    source.line(format!("pub const RANK: usize = {};", metadata.rank));
    source.line(format!("pub const CELL: &str = \"{}\";", metadata.cell));
    source.line(format!(
        "pub const SPATIAL_DIMENSION: usize = {};",
        metadata.spatial_dimension
    ));
    source.line(format!(
        "pub const TOPOLOGICAL_DIMENSION: usize = {};",
        metadata.topological_dimension
    ));
    if let Some(dimension) = metadata.test_local_dimension {
        source.line(format!("pub const TEST_LOCAL_DIMENSION: usize = {};", dimension));
    }
    if let Some(dimension) = metadata.trial_local_dimension {
        source.line(format!("pub const TRIAL_LOCAL_DIMENSION: usize = {};", dimension));
    }
    source.line(format!(
        "pub const LOCAL_TENSOR_LENGTH: usize = {};",
        metadata.local_tensor_length
    ));
    source.line(format!(
        "pub const NUM_COEFFICIENTS: usize = {};",
        metadata.coefficient_local_dimensions.len()
    ));
    source.line(format!(
        "pub const COEFFICIENT_LOCAL_DIMENSIONS: [usize; {}] = [{}];",
        metadata.coefficient_local_dimensions.len(),
        metadata
            .coefficient_local_dimensions
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    ));

    for domain_plans in compiled.domains() {
        source.blank();
        match domain_plans.domain {
            DomainKind::Cell => emit_cell_procedure(source, compiled, domain_plans),
            DomainKind::ExteriorFacet => emit_exterior_facet_procedure(source, compiled, domain_plans),
            DomainKind::InteriorFacet => emit_interior_facet_procedure(source, compiled, domain_plans),
        }
    }

    source.close("}");
}

fn sanitize_module_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(true)
    {
        sanitized.insert(0, '_');
    }
    // Form names like `L` and `M` are conventionally uppercase; module
    // names follow Rust convention instead
    sanitized.to_lowercase()
}

fn emit_cell_procedure(
    source: &mut SourceBuilder,
    compiled: &CompiledForm,
    domain_plans: &crate::representation::DomainPlans,
) {
    source.line("/// Fills the local tensor for one cell interior.");
    source.open(
        "pub fn cell_interior(local_tensor: &mut [f64], coefficients: &[&[f64]], \
         coordinates: &[f64], subdomain: usize) -> bool {",
    );
    source.line("for value in local_tensor.iter_mut() { *value = 0.0; }");
    source.open("match subdomain {");
    for group in &domain_plans.subdomains {
        source.open(format!("{} => {{", group.subdomain));
        for integral in &group.integrals {
            match &integral.plan {
                RepresentationPlan::Tensor(plan) => {
                    tensor::emit_cell_term(source, plan);
                }
                RepresentationPlan::Quadrature(plan) => {
                    quadrature::emit_cell_term(source, plan, compiled.form());
                }
            }
        }
        source.close("}");
    }
    source.line("_ => {}");
    source.close("}");
    source.line("true");
    source.close("}");
}

fn emit_exterior_facet_procedure(
    source: &mut SourceBuilder,
    compiled: &CompiledForm,
    domain_plans: &crate::representation::DomainPlans,
) {
    source.line("/// Fills the local tensor for one exterior facet of a cell.");
    source.open(
        "pub fn exterior_facet(local_tensor: &mut [f64], coefficients: &[&[f64]], \
         coordinates: &[f64], facet: usize, subdomain: usize) -> bool {",
    );
    source.line("for value in local_tensor.iter_mut() { *value = 0.0; }");
    source.open("match subdomain {");
    for group in &domain_plans.subdomains {
        source.open(format!("{} => {{", group.subdomain));
        for integral in &group.integrals {
            match &integral.plan {
                RepresentationPlan::Tensor(plan) => {
                    tensor::emit_exterior_facet_term(source, plan);
                }
                RepresentationPlan::Quadrature(plan) => {
                    quadrature::emit_facet_term(source, plan, compiled.form(), quadrature::FacetSide::Exterior);
                }
            }
        }
        source.close("}");
    }
    source.line("_ => {}");
    source.close("}");
    source.line("true");
    source.close("}");
}

fn emit_interior_facet_procedure(
    source: &mut SourceBuilder,
    compiled: &CompiledForm,
    domain_plans: &crate::representation::DomainPlans,
) {
    source.line("/// Fills the macro-cell local tensor for one interior facet.");
    source.line("/// Each argument's dof range covers both adjacent cells, side 0 first;");
    source.line("/// coefficient arrays are macro arrays laid out the same way.");
    source.open(
        "pub fn interior_facet(local_tensor: &mut [f64], coefficients: &[&[f64]], \
         coordinates: &[f64], coordinates_1: &[f64], facet: usize, facet_1: usize, \
         subdomain: usize) -> bool {",
    );
    source.line("for value in local_tensor.iter_mut() { *value = 0.0; }");
    source.open("match subdomain {");
    for group in &domain_plans.subdomains {
        source.open(format!("{} => {{", group.subdomain));
        for integral in &group.integrals {
            match &integral.plan {
                RepresentationPlan::Tensor(_) => {
                    unreachable!("tensor plans are rejected for interior facet integrals")
                }
                RepresentationPlan::Quadrature(plan) => {
                    quadrature::emit_facet_term(source, plan, compiled.form(), quadrature::FacetSide::Interior(0));
                    quadrature::emit_facet_term(source, plan, compiled.form(), quadrature::FacetSide::Interior(1));
                }
            }
        }
        source.close("}");
    }
    source.line("_ => {}");
    source.close("}");
    source.line("true");
    source.close("}");
}
