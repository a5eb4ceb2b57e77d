//! Emission of quadrature-represented terms.
//!
//! The emitted code mirrors [`QuadraturePlan::accumulate_cell`] and its
//! facet variants: basis values and reference gradients at the quadrature
//! points are embedded as constant tables, the per-cell Jacobian maps
//! reference gradients to physical ones, and the integrand is emitted as a
//! scalar expression specialized per value-component block of the
//! arguments (zero contributions are folded away at emission time).

use crate::codegen::{emit_inverse_from_jacobian, format_float, SourceBuilder};
use crate::codegen::emit_affine_jacobian;
use crate::element::{ElementDescriptor, ElementFamily, ReferenceCell};
use crate::form::{ArgumentKind, Expr, Form};
use crate::geometry::FacetEmbedding;
use crate::representation::quadrature::{QuadraturePlan, QuadratureVariant};

/// Which kernel a facet term is emitted for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum FacetSide {
    Exterior,
    /// One side of an interior facet kernel (0 or 1).
    Interior(usize),
}

impl FacetSide {
    fn index(&self) -> usize {
        match self {
            Self::Exterior => 0,
            Self::Interior(side) => *side,
        }
    }

    fn coordinates_var(&self) -> &'static str {
        match self {
            Self::Exterior | Self::Interior(0) => "coordinates",
            Self::Interior(_) => "coordinates_1",
        }
    }

    fn facet_var(&self) -> &'static str {
        match self {
            Self::Exterior | Self::Interior(0) => "facet",
            Self::Interior(_) => "facet_1",
        }
    }

    /// 1 for single-cell kernels, 2 for macro-cell kernels.
    fn sides(&self) -> usize {
        match self {
            Self::Exterior => 1,
            Self::Interior(_) => 2,
        }
    }
}

/// A scalar expression under construction, with zero folding.
#[derive(Debug, Clone)]
enum Scalar {
    Zero,
    Text { text: String, atomic: bool },
}

impl Scalar {
    fn lit(value: f64) -> Self {
        if value == 0.0 {
            Self::Zero
        } else {
            Self::Text {
                text: format_float(value),
                atomic: value >= 0.0,
            }
        }
    }

    fn var(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            atomic: true,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Zero => "0.0".to_string(),
            Self::Text { text, .. } => text.clone(),
        }
    }

    fn paren(&self) -> String {
        match self {
            Self::Zero => "0.0".to_string(),
            Self::Text { text, atomic } => {
                if *atomic {
                    text.clone()
                } else {
                    format!("({})", text)
                }
            }
        }
    }

    fn neg(self) -> Self {
        match self {
            Self::Zero => Self::Zero,
            other => Self::Text {
                text: format!("-{}", other.paren()),
                atomic: false,
            },
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Zero, x) | (x, Self::Zero) => x,
            (a, b) => Self::Text {
                text: format!("{} + {}", a.render(), b.render()),
                atomic: false,
            },
        }
    }

    fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Self::Zero, _) | (_, Self::Zero) => Self::Zero,
            (a, b) => Self::Text {
                text: format!("{} * {}", a.paren(), b.paren()),
                atomic: false,
            },
        }
    }

    fn divide(self, other: Self) -> Self {
        match (&self, &other) {
            (Self::Zero, _) => Self::Zero,
            _ => Self::Text {
                text: format!("{} / {}", self.paren(), other.paren()),
                atomic: false,
            },
        }
    }
}

fn sum(terms: impl IntoIterator<Item = Scalar>) -> Scalar {
    terms.into_iter().fold(Scalar::Zero, Scalar::add)
}

/// The deterministic element table registry of a term: test element first,
/// then trial, then coefficient elements by index, deduplicated.
fn element_registry(integrand: &Expr) -> Vec<ElementDescriptor> {
    let mut registry: Vec<ElementDescriptor> = Vec::new();
    let mut push = |element: &ElementDescriptor| {
        if !registry.contains(element) {
            registry.push(element.clone());
        }
    };
    let arguments = integrand.arguments();
    if let Some(argument) = arguments.iter().find(|a| a.kind == ArgumentKind::Test) {
        push(&argument.element);
    }
    if let Some(argument) = arguments.iter().find(|a| a.kind == ArgumentKind::Trial) {
        push(&argument.element);
    }
    let mut coefficients = integrand.coefficients();
    coefficients.sort_by_key(|coefficient| coefficient.index);
    for coefficient in coefficients {
        push(&coefficient.element);
    }
    registry
}

fn table_index(registry: &[ElementDescriptor], element: &ElementDescriptor) -> usize {
    registry
        .iter()
        .position(|candidate| candidate == element)
        .expect("Element is registered")
}

fn has_derivatives(expr: &Expr) -> bool {
    matches!(expr, Expr::Grad(_) | Expr::Div(_) | Expr::Curl(_))
        || expr.children().into_iter().any(has_derivatives)
}

/// Coefficient indices whose physical derivatives the integrand needs.
fn coefficients_under_derivatives(expr: &Expr, under: bool, out: &mut Vec<usize>) {
    match expr {
        Expr::Coefficient(coefficient) if under => {
            if !out.contains(&coefficient.index) {
                out.push(coefficient.index);
            }
        }
        Expr::Grad(e) | Expr::Div(e) | Expr::Curl(e) => {
            coefficients_under_derivatives(e, true, out)
        }
        _ => {
            for child in expr.children() {
                coefficients_under_derivatives(child, under, out);
            }
        }
    }
}

/// The emission context of one (test block, trial block) specialization at
/// one quadrature point.
struct EmitCtx<'a> {
    registry: &'a [ElementDescriptor],
    dim: usize,
    /// (element, fixed component block) of the test argument.
    test_block: Option<(&'a ElementDescriptor, usize)>,
    trial_block: Option<(&'a ElementDescriptor, usize)>,
}

impl<'a> EmitCtx<'a> {
    fn argument(&self, kind: ArgumentKind) -> (&'a ElementDescriptor, usize, &'static str) {
        match kind {
            ArgumentKind::Test => {
                let (element, block) = self.test_block.expect("Test argument is bound");
                (element, block, "i")
            }
            ArgumentKind::Trial => {
                let (element, block) = self.trial_block.expect("Trial argument is bound");
                (element, block, "j")
            }
        }
    }
}

fn emit_value(expr: &Expr, ctx: &EmitCtx<'_>) -> Vec<Scalar> {
    match expr {
        Expr::Constant(value) => vec![Scalar::lit(value.into_inner())],
        Expr::FacetNormal { cell } => (0..cell.dimension())
            .map(|a| Scalar::var(format!("n{}", a)))
            .collect(),
        Expr::Argument(argument) => {
            let (element, block, dof_var) = ctx.argument(argument.kind);
            let table = table_index(ctx.registry, element);
            (0..element.num_components())
                .map(|component| {
                    if component == block {
                        Scalar::var(format!("FE{}[q][{}]", table, dof_var))
                    } else {
                        Scalar::Zero
                    }
                })
                .collect()
        }
        Expr::Coefficient(coefficient) => (0..coefficient.element.num_components())
            .map(|component| Scalar::var(format!("w{}_{}", coefficient.index, component)))
            .collect(),
        Expr::Grad(e) => {
            let components = e.shape().num_components();
            let derivatives: Vec<Vec<Scalar>> = (0..ctx.dim)
                .map(|axis| emit_derivative(e, axis, ctx))
                .collect();
            let mut entries = Vec::with_capacity(components * ctx.dim);
            for component in 0..components {
                for derivative in &derivatives {
                    entries.push(derivative[component].clone());
                }
            }
            entries
        }
        Expr::Div(e) => {
            let shape = e.shape();
            let last = *shape.dims().last().expect("Divergence operand has rank >= 1");
            let heads = shape.num_components() / last;
            let derivatives: Vec<Vec<Scalar>> =
                (0..last).map(|axis| emit_derivative(e, axis, ctx)).collect();
            (0..heads)
                .map(|head| sum((0..last).map(|axis| derivatives[axis][head * last + axis].clone())))
                .collect()
        }
        Expr::Curl(e) => {
            if ctx.dim == 2 {
                let d0 = emit_derivative(e, 0, ctx);
                let d1 = emit_derivative(e, 1, ctx);
                vec![d0[1].clone().add(d1[0].clone().neg())]
            } else {
                let d: Vec<Vec<Scalar>> = (0..3).map(|axis| emit_derivative(e, axis, ctx)).collect();
                vec![
                    d[1][2].clone().add(d[2][1].clone().neg()),
                    d[2][0].clone().add(d[0][2].clone().neg()),
                    d[0][1].clone().add(d[1][0].clone().neg()),
                ]
            }
        }
        Expr::Neg(e) => emit_value(e, ctx).into_iter().map(Scalar::neg).collect(),
        Expr::Add(a, b) => emit_value(a, ctx)
            .into_iter()
            .zip(emit_value(b, ctx))
            .map(|(x, y)| x.add(y))
            .collect(),
        Expr::Mul(a, b) => {
            let left = emit_value(a, ctx);
            let right = emit_value(b, ctx);
            let (scalar, tensor) = if a.shape().is_scalar() {
                (left, right)
            } else {
                (right, left)
            };
            let s = scalar.into_iter().next().expect("Scalar operand has one entry");
            tensor.into_iter().map(|entry| s.clone().mul(entry)).collect()
        }
        Expr::Quotient(a, b) => {
            let numerator = emit_value(a, ctx);
            let denominator = emit_value(b, ctx).into_iter().next().unwrap();
            numerator
                .into_iter()
                .map(|entry| entry.divide(denominator.clone()))
                .collect()
        }
        Expr::Inner(a, b) => {
            let left = emit_value(a, ctx);
            let right = emit_value(b, ctx);
            vec![sum(left.into_iter().zip(right).map(|(x, y)| x.mul(y)))]
        }
        Expr::Dot(a, b) => {
            let left = emit_value(a, ctx);
            let right = emit_value(b, ctx);
            let a_dims = a.shape().dims().to_vec();
            let b_dims = b.shape().dims().to_vec();
            let contracted = *a_dims.last().unwrap();
            let a_outer: usize = a_dims[..a_dims.len() - 1].iter().product();
            let b_outer: usize = b_dims[1..].iter().product();
            let mut entries = Vec::with_capacity(a_outer * b_outer);
            for i in 0..a_outer {
                for j in 0..b_outer {
                    entries.push(sum((0..contracted).map(|k| {
                        left[i * contracted + k]
                            .clone()
                            .mul(right[k * b_outer + j].clone())
                    })));
                }
            }
            entries
        }
        Expr::Outer(a, b) => {
            let left = emit_value(a, ctx);
            let right = emit_value(b, ctx);
            let mut entries = Vec::with_capacity(left.len() * right.len());
            for x in &left {
                for y in &right {
                    entries.push(x.clone().mul(y.clone()));
                }
            }
            entries
        }
    }
}

fn emit_derivative(expr: &Expr, axis: usize, ctx: &EmitCtx<'_>) -> Vec<Scalar> {
    match expr {
        Expr::Constant(_) => vec![Scalar::Zero],
        Expr::FacetNormal { .. } | Expr::Grad(_) | Expr::Div(_) | Expr::Curl(_) => {
            unreachable!("second derivatives are rejected at planning time")
        }
        Expr::Argument(argument) => {
            let (element, block, dof_var) = ctx.argument(argument.kind);
            let table = table_index(ctx.registry, element);
            (0..element.num_components())
                .map(|component| {
                    if component == block {
                        sum((0..ctx.dim).map(|b| {
                            Scalar::var(format!("k{}_{}", b, axis))
                                .mul(Scalar::var(format!("DFE{}[q][{}][{}]", table, b, dof_var)))
                        }))
                    } else {
                        Scalar::Zero
                    }
                })
                .collect()
        }
        Expr::Coefficient(coefficient) => (0..coefficient.element.num_components())
            .map(|component| {
                Scalar::var(format!("w{}_d{}_{}", coefficient.index, axis, component))
            })
            .collect(),
        Expr::Neg(e) => emit_derivative(e, axis, ctx)
            .into_iter()
            .map(Scalar::neg)
            .collect(),
        Expr::Add(a, b) => emit_derivative(a, axis, ctx)
            .into_iter()
            .zip(emit_derivative(b, axis, ctx))
            .map(|(x, y)| x.add(y))
            .collect(),
        Expr::Mul(a, b) => {
            // Product rule; one operand is scalar by construction
            let da = emit_derivative(a, axis, ctx);
            let db = emit_derivative(b, axis, ctx);
            let va = emit_value(a, ctx);
            let vb = emit_value(b, ctx);
            mul_values(da, vb)
                .into_iter()
                .zip(mul_values(va, db))
                .map(|(x, y)| x.add(y))
                .collect()
        }
        Expr::Quotient(a, b) => {
            let da = emit_derivative(a, axis, ctx);
            let db = emit_derivative(b, axis, ctx).into_iter().next().unwrap();
            let va = emit_value(a, ctx);
            let vb = emit_value(b, ctx).into_iter().next().unwrap();
            da.into_iter()
                .zip(va)
                .map(|(dx, x)| {
                    dx.mul(vb.clone())
                        .add(x.mul(db.clone()).neg())
                        .divide(vb.clone().mul(vb.clone()))
                })
                .collect()
        }
        Expr::Inner(a, b) => {
            let da = emit_derivative(a, axis, ctx);
            let db = emit_derivative(b, axis, ctx);
            let va = emit_value(a, ctx);
            let vb = emit_value(b, ctx);
            let first = sum(da.into_iter().zip(vb).map(|(x, y)| x.mul(y)));
            let second = sum(va.into_iter().zip(db).map(|(x, y)| x.mul(y)));
            vec![first.add(second)]
        }
        Expr::Dot(_, _) | Expr::Outer(_, _) => {
            // Differentiated contractions are uncommon; fall back to the
            // sum of the two product-rule halves computed entrywise
            let (a, b) = match expr {
                Expr::Dot(a, b) | Expr::Outer(a, b) => (a, b),
                _ => unreachable!(),
            };
            let da = emit_derivative(a, axis, ctx);
            let db = emit_derivative(b, axis, ctx);
            let va = emit_value(a, ctx);
            let vb = emit_value(b, ctx);
            let combine = |x: Vec<Scalar>, y: Vec<Scalar>| -> Vec<Scalar> {
                match expr {
                    Expr::Dot(_, _) => contract_dot(&x, a, &y, b),
                    _ => outer_product(&x, &y),
                }
            };
            combine(da, vb)
                .into_iter()
                .zip(combine(va, db))
                .map(|(x, y)| x.add(y))
                .collect()
        }
    }
}

fn mul_values(scalar_or_tensor: Vec<Scalar>, other: Vec<Scalar>) -> Vec<Scalar> {
    if scalar_or_tensor.len() == 1 {
        let s = scalar_or_tensor.into_iter().next().unwrap();
        other.into_iter().map(|entry| s.clone().mul(entry)).collect()
    } else if other.len() == 1 {
        let s = other.into_iter().next().unwrap();
        scalar_or_tensor
            .into_iter()
            .map(|entry| entry.mul(s.clone()))
            .collect()
    } else {
        unreachable!("one multiplication operand is scalar by construction")
    }
}

fn contract_dot(left: &[Scalar], a: &Expr, right: &[Scalar], b: &Expr) -> Vec<Scalar> {
    let a_dims = a.shape().dims().to_vec();
    let b_dims = b.shape().dims().to_vec();
    let contracted = *a_dims.last().unwrap();
    let a_outer: usize = a_dims[..a_dims.len() - 1].iter().product();
    let b_outer: usize = b_dims[1..].iter().product();
    let mut entries = Vec::with_capacity(a_outer * b_outer);
    for i in 0..a_outer {
        for j in 0..b_outer {
            entries.push(sum((0..contracted).map(|k| {
                left[i * contracted + k]
                    .clone()
                    .mul(right[k * b_outer + j].clone())
            })));
        }
    }
    entries
}

fn outer_product(left: &[Scalar], right: &[Scalar]) -> Vec<Scalar> {
    let mut entries = Vec::with_capacity(left.len() * right.len());
    for x in left {
        for y in right {
            entries.push(x.clone().mul(y.clone()));
        }
    }
    entries
}

/// Renders a nested constant table of basis values: `[[f64; N]; NQ]`.
fn emit_value_table(source: &mut SourceBuilder, name: &str, rows: &[Vec<f64>]) {
    let columns = rows.first().map(|row| row.len()).unwrap_or(0);
    let rendered: Vec<String> = rows
        .iter()
        .map(|row| {
            format!(
                "[{}]",
                row.iter().map(|&v| format_float(v)).collect::<Vec<_>>().join(", ")
            )
        })
        .collect();
    source.line(format!(
        "const {}: [[f64; {}]; {}] = [{}];",
        name,
        columns,
        rows.len(),
        rendered.join(", ")
    ));
}

/// Renders a nested constant table of gradients: `[[[f64; N]; DIM]; NQ]`.
fn emit_gradient_table(source: &mut SourceBuilder, name: &str, rows: &[Vec<Vec<f64>>]) {
    let dim = rows.first().map(|row| row.len()).unwrap_or(0);
    let columns = rows
        .first()
        .and_then(|row| row.first())
        .map(|axis_row| axis_row.len())
        .unwrap_or(0);
    let rendered: Vec<String> = rows
        .iter()
        .map(|row| {
            let axes: Vec<String> = row
                .iter()
                .map(|axis_row| {
                    format!(
                        "[{}]",
                        axis_row
                            .iter()
                            .map(|&v| format_float(v))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                })
                .collect();
            format!("[{}]", axes.join(", "))
        })
        .collect();
    source.line(format!(
        "const {}: [[[f64; {}]; {}]; {}] = [{}];",
        name,
        columns,
        dim,
        rows.len(),
        rendered.join(", ")
    ));
}

/// Emits the rule weights and the basis tables of a variant.
fn emit_tables(
    source: &mut SourceBuilder,
    registry: &[ElementDescriptor],
    variant: &QuadratureVariant,
    derivatives_needed: bool,
) {
    let weights: Vec<String> = variant.rule.weights.iter().map(|&w| format_float(w)).collect();
    source.line(format!(
        "const W: [f64; {}] = [{}];",
        weights.len(),
        weights.join(", ")
    ));
    for (index, element) in registry.iter().enumerate() {
        let tables = &variant.tables[element];
        let values: Vec<Vec<f64>> = tables
            .values
            .iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        emit_value_table(source, &format!("FE{}", index), &values);
        if derivatives_needed {
            let gradients: Vec<Vec<Vec<f64>>> = tables
                .gradients
                .iter()
                .map(|matrix| {
                    (0..matrix.nrows())
                        .map(|b| (0..matrix.ncols()).map(|s| matrix[(b, s)]).collect())
                        .collect()
                })
                .collect();
            emit_gradient_table(source, &format!("DFE{}", index), &gradients);
        }
    }
}

/// Emits the per-point Jacobian of a non-affine cell from the geometry
/// basis gradient table `GG`.
fn emit_pointwise_jacobian(source: &mut SourceBuilder, cell: ReferenceCell, coords: &str) {
    let dim = cell.dimension();
    let nverts = cell.num_vertices();
    for r in 0..dim {
        for c in 0..dim {
            let terms: Vec<String> = (0..nverts)
                .map(|v| format!("{}[{}] * GG[q][{}][{}]", coords, v * dim + r, c, v))
                .collect();
            source.line(format!("let j{}_{} = {};", r, c, terms.join(" + ")));
        }
    }
    emit_inverse_from_jacobian(source, dim);
}

fn geometry_gradient_table(cell: ReferenceCell, variant: &QuadratureVariant) -> Vec<Vec<Vec<f64>>> {
    let geometry_element = ElementDescriptor::scalar(ElementFamily::Lagrange, cell, 1)
        .expect("Degree-1 geometry element exists for every cell");
    variant
        .rule
        .points
        .iter()
        .map(|point| {
            let gradients = geometry_element.evaluate_reference_basis_gradients(point.as_slice());
            (0..gradients.nrows())
                .map(|b| (0..gradients.ncols()).map(|s| gradients[(b, s)]).collect())
                .collect()
        })
        .collect()
}

/// Emits coefficient value (and, where needed, physical derivative)
/// bindings at the current quadrature point.
fn emit_coefficient_bindings(
    source: &mut SourceBuilder,
    integrand: &Expr,
    registry: &[ElementDescriptor],
    dim: usize,
    side: usize,
) {
    let mut coefficients = integrand.coefficients();
    coefficients.sort_by_key(|coefficient| coefficient.index);
    let mut derived = Vec::new();
    coefficients_under_derivatives(integrand, false, &mut derived);

    for coefficient in coefficients {
        let element = &coefficient.element;
        let table = table_index(registry, element);
        let n = element.scalar_dimension();
        let offset = side * element.local_dimension();
        for component in 0..element.num_components() {
            let terms: Vec<String> = (0..n)
                .map(|s| {
                    format!(
                        "coefficients[{}][{}] * FE{}[q][{}]",
                        coefficient.index,
                        offset + component * n + s,
                        table,
                        s
                    )
                })
                .collect();
            source.line(format!(
                "let w{}_{} = {};",
                coefficient.index,
                component,
                terms.join(" + ")
            ));
        }
        if derived.contains(&coefficient.index) {
            for axis in 0..dim {
                for component in 0..element.num_components() {
                    let terms: Vec<String> = (0..n)
                        .map(|s| {
                            let gradient = sum((0..dim).map(|b| {
                                Scalar::var(format!("k{}_{}", b, axis))
                                    .mul(Scalar::var(format!("DFE{}[q][{}][{}]", table, b, s)))
                            }));
                            format!(
                                "coefficients[{}][{}] * {}",
                                coefficient.index,
                                offset + component * n + s,
                                gradient.paren()
                            )
                        })
                        .collect();
                    source.line(format!(
                        "let w{}_d{}_{} = {};",
                        coefficient.index,
                        axis,
                        component,
                        terms.join(" + ")
                    ));
                }
            }
        }
    }
}

/// Emits the facet normal bindings `n0..` from the Jacobian data and the
/// reference normal of the facet.
fn emit_normal_bindings(source: &mut SourceBuilder, cell: ReferenceCell, facet: usize) {
    let dim = cell.dimension();
    let reference_normal = cell.facet_reference_normal(facet);
    if dim == 1 {
        source.line(format!(
            "let n0 = (det * k0_0 * {}).signum();",
            format_float(reference_normal[0])
        ));
        return;
    }
    for a in 0..dim {
        let terms = sum((0..dim).map(|b| {
            Scalar::lit(reference_normal[b]).mul(Scalar::var(format!("k{}_{}", b, a)))
        }));
        source.line(format!("let cof{} = det * {};", a, terms.paren()));
    }
    let norm_terms: Vec<String> = (0..dim).map(|a| format!("cof{0} * cof{0}", a)).collect();
    source.line(format!("let n_norm = ({}).sqrt();", norm_terms.join(" + ")));
    for a in 0..dim {
        source.line(format!("let n{} = cof{} / n_norm;", a, a));
    }
}

/// Emits the facet volume scale bindings; leaves `fscale` bound.
fn emit_facet_scale_bindings(source: &mut SourceBuilder, cell: ReferenceCell, facet: usize) {
    let dim = cell.dimension();
    if dim == 1 {
        source.line("let fscale = 1.0;");
        return;
    }
    let embedding = FacetEmbedding::new(cell, facet);
    let tangents = embedding.tangents();
    // Columns of G = J * E
    for column in 0..dim - 1 {
        for r in 0..dim {
            let terms = sum((0..dim).map(|b| {
                Scalar::lit(tangents[(b, column)]).mul(Scalar::var(format!("j{}_{}", r, b)))
            }));
            source.line(format!("let t{}_{} = {};", column, r, terms.render()));
        }
    }
    if dim == 2 {
        source.line("let fscale = (t0_0 * t0_0 + t0_1 * t0_1).sqrt();");
    } else {
        source.line("let m11 = t0_0 * t0_0 + t0_1 * t0_1 + t0_2 * t0_2;");
        source.line("let m22 = t1_0 * t1_0 + t1_1 * t1_1 + t1_2 * t1_2;");
        source.line("let m12 = t0_0 * t1_0 + t0_1 * t1_1 + t0_2 * t1_2;");
        source.line("let fscale = (m11 * m22 - m12 * m12).sqrt();");
    }
}

/// Emits the block-specialized accumulation loops at one quadrature point.
fn emit_accumulation(
    source: &mut SourceBuilder,
    plan: &QuadraturePlan,
    form: &Form,
    registry: &[ElementDescriptor],
    side: usize,
    sides: usize,
) {
    let test_element = form.test_element();
    let trial_element = form.trial_element();
    let dim = plan.cell.dimension();

    let test_blocks = test_element.map(|e| e.num_components()).unwrap_or(1);
    let trial_blocks = trial_element.map(|e| e.num_components()).unwrap_or(1);
    let test_scalar = test_element.map(|e| e.scalar_dimension()).unwrap_or(1);
    let trial_scalar = trial_element.map(|e| e.scalar_dimension()).unwrap_or(1);
    let test_total = test_element.map(|e| e.local_dimension()).unwrap_or(1);
    let trial_total = trial_element.map(|e| e.local_dimension()).unwrap_or(1);
    let columns = sides * trial_total;

    for test_block in 0..test_blocks {
        for trial_block in 0..trial_blocks {
            let ctx = EmitCtx {
                registry,
                dim,
                test_block: test_element.map(|e| (e, test_block)),
                trial_block: trial_element.map(|e| (e, trial_block)),
            };
            let value = emit_value(&plan.integrand, &ctx)
                .into_iter()
                .next()
                .expect("Integrand is scalar");
            if matches!(value, Scalar::Zero) {
                continue;
            }

            let row_offset = side * test_total + test_block * test_scalar;
            let col_offset = side * trial_total + trial_block * trial_scalar;
            let row = if row_offset > 0 {
                format!("({} + i)", row_offset)
            } else {
                "i".to_string()
            };
            let col = if col_offset > 0 {
                format!("{} + j", col_offset)
            } else {
                "j".to_string()
            };
            let output = match (test_element.is_some(), trial_element.is_some()) {
                (true, true) => format!("{} * {} + {}", row, columns, col),
                (true, false) => row,
                (false, true) => col,
                (false, false) => "0".to_string(),
            };

            if test_element.is_some() {
                source.open(format!("for i in 0..{} {{", test_scalar));
            }
            if trial_element.is_some() {
                source.open(format!("for j in 0..{} {{", trial_scalar));
            }
            source.line(format!(
                "local_tensor[{}] += scale * {};",
                output,
                value.paren()
            ));
            if trial_element.is_some() {
                source.close("}");
            }
            if test_element.is_some() {
                source.close("}");
            }
        }
    }
}

pub(super) fn emit_cell_term(source: &mut SourceBuilder, plan: &QuadraturePlan, form: &Form) {
    let registry = element_registry(&plan.integrand);
    let variant = &plan.variants[0];
    let derivatives_needed = has_derivatives(&plan.integrand);
    let affine = plan.cell.is_simplex();

    source.open("{");
    emit_tables(source, &registry, variant, derivatives_needed);
    if !affine {
        let gg = geometry_gradient_table(plan.cell, variant);
        emit_gradient_table(source, "GG", &gg);
    } else {
        emit_affine_jacobian(source, plan.cell, "coordinates");
    }
    source.open(format!("for q in 0..{} {{", variant.rule.len()));
    if !affine {
        emit_pointwise_jacobian(source, plan.cell, "coordinates");
    }
    source.line("let scale = W[q] * det_abs;");
    emit_coefficient_bindings(source, &plan.integrand, &registry, plan.cell.dimension(), 0);
    emit_accumulation(source, plan, form, &registry, 0, 1);
    source.close("}");
    source.close("}");
}

pub(super) fn emit_facet_term(
    source: &mut SourceBuilder,
    plan: &QuadraturePlan,
    form: &Form,
    facet_side: FacetSide,
) {
    let registry = element_registry(&plan.integrand);
    let derivatives_needed = has_derivatives(&plan.integrand);
    let needs_normal = plan.integrand.contains_facet_normal();
    let affine = plan.cell.is_simplex();
    let coords = facet_side.coordinates_var();
    let side = facet_side.index();
    let sides = facet_side.sides();

    source.open("{");
    if affine {
        emit_affine_jacobian(source, plan.cell, coords);
    }
    source.open(format!("match {} {{", facet_side.facet_var()));
    for facet in 0..plan.cell.num_facets() {
        let variant = &plan.variants[facet];
        source.open(format!("{} => {{", facet));
        emit_tables(source, &registry, variant, derivatives_needed);
        if !affine {
            let gg = geometry_gradient_table(plan.cell, variant);
            emit_gradient_table(source, "GG", &gg);
        }
        source.open(format!("for q in 0..{} {{", variant.rule.len()));
        if !affine {
            emit_pointwise_jacobian(source, plan.cell, coords);
        }
        emit_facet_scale_bindings(source, plan.cell, facet);
        source.line("let scale = W[q] * fscale;");
        if needs_normal {
            emit_normal_bindings(source, plan.cell, facet);
        }
        emit_coefficient_bindings(source, &plan.integrand, &registry, plan.cell.dimension(), side);
        emit_accumulation(source, plan, form, &registry, side, sides);
        source.close("}");
        source.close("}");
    }
    source.line("_ => {}");
    source.close("}");
    source.close("}");
}
