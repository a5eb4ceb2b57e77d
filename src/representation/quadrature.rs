//! The quadrature representation: weighted integrand evaluation at
//! quadrature points, recomputed per cell.
//!
//! This representation is always applicable. The plan resolves the
//! quadrature rule once at compile time and tabulates basis values and
//! reference gradients at the rule points; evaluation walks the integrand
//! tree at every point with the per-cell Jacobian mapping reference
//! gradients to physical ones. Facet variants carry one rule (and one set
//! of tables) per facet of the cell.

use crate::element::{ElementDescriptor, ReferenceCell, Shape};
use crate::form::{ArgumentKind, DomainKind, Expr};
use crate::geometry::{CellGeometry, JacobianData};
use crate::quadrature::{facet_rule, reference_rule, Rule};
use crate::representation::{tabulate_elements, BasisTables, FormContext};
use eyre::eyre;
use nalgebra::DVector;
use rustc_hash::FxHashMap;

/// The resolved rule and basis tables of one integration domain variant.
#[derive(Debug, Clone)]
pub struct QuadratureVariant {
    pub rule: Rule,
    pub tables: FxHashMap<ElementDescriptor, BasisTables>,
}

/// The quadrature representation of one integral.
#[derive(Debug, Clone)]
pub struct QuadraturePlan {
    pub cell: ReferenceCell,
    pub integrand: Expr,
    pub degree: usize,
    /// Local dimension of the test argument, if the form has one.
    pub test_dimension: Option<usize>,
    /// Local dimension of the trial argument, if the form has one.
    pub trial_dimension: Option<usize>,
    /// A single variant for cell integrals, one per facet otherwise.
    pub variants: Vec<QuadratureVariant>,
}

pub(crate) fn plan(
    ctx: &FormContext<'_>,
    integrand: &Expr,
    degree: usize,
    cell: ReferenceCell,
    domain: DomainKind,
) -> QuadraturePlan {
    let rules: Vec<Rule> = match domain {
        DomainKind::Cell => vec![reference_rule(cell, degree)],
        DomainKind::ExteriorFacet | DomainKind::InteriorFacet => (0..cell.num_facets())
            .map(|facet| facet_rule(cell, facet, degree))
            .collect(),
    };

    let elements: Vec<&ElementDescriptor> = integrand
        .arguments()
        .iter()
        .map(|argument| &argument.element)
        .chain(
            integrand
                .coefficients()
                .iter()
                .map(|coefficient| &coefficient.element),
        )
        .collect();

    let variants = rules
        .into_iter()
        .map(|rule| {
            let tables = tabulate_elements(elements.iter().copied(), &rule.points);
            QuadratureVariant { rule, tables }
        })
        .collect();

    QuadraturePlan {
        cell,
        integrand: integrand.clone(),
        degree,
        test_dimension: ctx.test.map(|element| element.local_dimension()),
        trial_dimension: ctx.trial.map(|element| element.local_dimension()),
        variants,
    }
}

/// A value of the integrand (or a subexpression) at one quadrature point.
#[derive(Debug, Clone)]
struct Value {
    shape: Shape,
    entries: Vec<f64>,
}

impl Value {
    fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::scalar(),
            entries: vec![value],
        }
    }
}

fn value_neg(a: Value) -> Value {
    Value {
        shape: a.shape,
        entries: a.entries.iter().map(|x| -x).collect(),
    }
}

fn value_add(a: Value, b: Value) -> Value {
    Value {
        shape: a.shape,
        entries: a
            .entries
            .iter()
            .zip(&b.entries)
            .map(|(x, y)| x + y)
            .collect(),
    }
}

/// Multiplication where (by shape checking) at least one operand is scalar.
fn value_mul(a: Value, b: Value) -> Value {
    let (scalar, tensor) = if a.shape.is_scalar() { (a, b) } else { (b, a) };
    let s = scalar.entries[0];
    Value {
        shape: tensor.shape,
        entries: tensor.entries.iter().map(|x| s * x).collect(),
    }
}

fn value_inner(a: &Value, b: &Value) -> Value {
    let sum = a
        .entries
        .iter()
        .zip(&b.entries)
        .map(|(x, y)| x * y)
        .sum();
    Value::scalar(sum)
}

fn value_dot(a: &Value, b: &Value) -> Value {
    let a_dims = a.shape.dims();
    let b_dims = b.shape.dims();
    let contracted = *a_dims.last().expect("Dot operand has rank >= 1");
    let a_outer: usize = a_dims[..a_dims.len() - 1].iter().product();
    let b_outer: usize = b_dims[1..].iter().product();
    let mut dims = a_dims[..a_dims.len() - 1].to_vec();
    dims.extend_from_slice(&b_dims[1..]);
    let mut entries = vec![0.0; a_outer * b_outer];
    for i in 0..a_outer {
        for j in 0..b_outer {
            let mut sum = 0.0;
            for k in 0..contracted {
                sum += a.entries[i * contracted + k] * b.entries[k * b_outer + j];
            }
            entries[i * b_outer + j] = sum;
        }
    }
    Value {
        shape: Shape::from_dims(dims),
        entries,
    }
}

fn value_outer(a: &Value, b: &Value) -> Value {
    let mut dims = a.shape.dims().to_vec();
    dims.extend_from_slice(b.shape.dims());
    let mut entries = Vec::with_capacity(a.entries.len() * b.entries.len());
    for x in &a.entries {
        for y in &b.entries {
            entries.push(x * y);
        }
    }
    Value {
        shape: Shape::from_dims(dims),
        entries,
    }
}

/// Everything needed to evaluate the integrand at one quadrature point.
struct PointContext<'a> {
    tables: &'a FxHashMap<ElementDescriptor, BasisTables>,
    point_index: usize,
    jacobian: &'a JacobianData,
    normal: Option<&'a DVector<f64>>,
    test_dof: Option<usize>,
    trial_dof: Option<usize>,
    coefficients: &'a [Vec<f64>],
}

impl<'a> PointContext<'a> {
    /// The value of scalar basis function `s` of the element.
    fn basis_value(&self, element: &ElementDescriptor, s: usize) -> f64 {
        self.tables[element].values[self.point_index][s]
    }

    /// The physical derivative of scalar basis function `s` along `axis`.
    fn basis_derivative(&self, element: &ElementDescriptor, s: usize, axis: usize) -> f64 {
        let gradients = &self.tables[element].gradients[self.point_index];
        let mut derivative = 0.0;
        for b in 0..gradients.nrows() {
            derivative += self.jacobian.inverse[(b, axis)] * gradients[(b, s)];
        }
        derivative
    }

    fn argument_dof(&self, kind: ArgumentKind) -> eyre::Result<usize> {
        match kind {
            ArgumentKind::Test => self.test_dof,
            ArgumentKind::Trial => self.trial_dof,
        }
        .ok_or_else(|| eyre!("integrand references an argument the form does not declare"))
    }
}

fn eval(expr: &Expr, ctx: &PointContext<'_>) -> eyre::Result<Value> {
    match expr {
        Expr::Constant(value) => Ok(Value::scalar(value.into_inner())),
        Expr::FacetNormal { .. } => {
            let normal = ctx
                .normal
                .ok_or_else(|| eyre!("facet normal evaluated outside a facet integral"))?;
            Ok(Value {
                shape: expr.shape(),
                entries: normal.iter().copied().collect(),
            })
        }
        Expr::Argument(argument) => {
            let element = &argument.element;
            let dof = ctx.argument_dof(argument.kind)?;
            let (block, scalar_index) = element.split_local_index(dof);
            let mut entries = vec![0.0; element.num_components()];
            entries[block] = ctx.basis_value(element, scalar_index);
            Ok(Value {
                shape: element.value_shape().clone(),
                entries,
            })
        }
        Expr::Coefficient(coefficient) => {
            let element = &coefficient.element;
            let n = element.scalar_dimension();
            let dofs = &ctx.coefficients[coefficient.index];
            let entries = (0..element.num_components())
                .map(|component| {
                    (0..n)
                        .map(|s| dofs[component * n + s] * ctx.basis_value(element, s))
                        .sum()
                })
                .collect();
            Ok(Value {
                shape: element.value_shape().clone(),
                entries,
            })
        }
        Expr::Grad(e) => {
            let dim = expr
                .cell()
                .expect("Gradient operand references an element")
                .dimension();
            let operand_components = e.shape().num_components();
            let derivatives: Vec<Value> = (0..dim)
                .map(|axis| eval_derivative(e, axis, ctx))
                .collect::<eyre::Result<_>>()?;
            let mut entries = Vec::with_capacity(operand_components * dim);
            for component in 0..operand_components {
                for derivative in &derivatives {
                    entries.push(derivative.entries[component]);
                }
            }
            Ok(Value {
                shape: expr.shape(),
                entries,
            })
        }
        Expr::Div(e) => {
            let operand_shape = e.shape();
            let last = *operand_shape
                .dims()
                .last()
                .expect("Divergence operand has rank >= 1");
            let heads = operand_shape.num_components() / last;
            let derivatives: Vec<Value> = (0..last)
                .map(|axis| eval_derivative(e, axis, ctx))
                .collect::<eyre::Result<_>>()?;
            let entries = (0..heads)
                .map(|head| {
                    (0..last)
                        .map(|axis| derivatives[axis].entries[head * last + axis])
                        .sum()
                })
                .collect();
            Ok(Value {
                shape: expr.shape(),
                entries,
            })
        }
        Expr::Curl(e) => {
            let dim = expr
                .cell()
                .expect("Curl operand references an element")
                .dimension();
            if dim == 2 {
                let d0 = eval_derivative(e, 0, ctx)?;
                let d1 = eval_derivative(e, 1, ctx)?;
                Ok(Value::scalar(d0.entries[1] - d1.entries[0]))
            } else {
                let d: Vec<Value> = (0..3)
                    .map(|axis| eval_derivative(e, axis, ctx))
                    .collect::<eyre::Result<_>>()?;
                Ok(Value {
                    shape: Shape::vector(3),
                    entries: vec![
                        d[1].entries[2] - d[2].entries[1],
                        d[2].entries[0] - d[0].entries[2],
                        d[0].entries[1] - d[1].entries[0],
                    ],
                })
            }
        }
        Expr::Neg(e) => Ok(value_neg(eval(e, ctx)?)),
        Expr::Add(a, b) => Ok(value_add(eval(a, ctx)?, eval(b, ctx)?)),
        Expr::Mul(a, b) => Ok(value_mul(eval(a, ctx)?, eval(b, ctx)?)),
        Expr::Quotient(a, b) => {
            let numerator = eval(a, ctx)?;
            let denominator = eval(b, ctx)?.entries[0];
            if denominator == 0.0 {
                return Err(eyre!("division by zero while evaluating `{}`", expr));
            }
            Ok(Value {
                shape: numerator.shape,
                entries: numerator.entries.iter().map(|x| x / denominator).collect(),
            })
        }
        Expr::Inner(a, b) => Ok(value_inner(&eval(a, ctx)?, &eval(b, ctx)?)),
        Expr::Dot(a, b) => Ok(value_dot(&eval(a, ctx)?, &eval(b, ctx)?)),
        Expr::Outer(a, b) => Ok(value_outer(&eval(a, ctx)?, &eval(b, ctx)?)),
    }
}

/// Evaluates the physical derivative of an expression along `axis`.
///
/// Second derivatives of basis functions are rejected at planning time, so
/// derivative operators never appear below this function.
fn eval_derivative(expr: &Expr, axis: usize, ctx: &PointContext<'_>) -> eyre::Result<Value> {
    match expr {
        Expr::Constant(_) => Ok(Value::scalar(0.0)),
        Expr::FacetNormal { .. } | Expr::Grad(_) | Expr::Div(_) | Expr::Curl(_) => Err(eyre!(
            "unsupported derivative of `{}` (rejected at planning time)",
            expr
        )),
        Expr::Argument(argument) => {
            let element = &argument.element;
            let dof = ctx.argument_dof(argument.kind)?;
            let (block, scalar_index) = element.split_local_index(dof);
            let mut entries = vec![0.0; element.num_components()];
            entries[block] = ctx.basis_derivative(element, scalar_index, axis);
            Ok(Value {
                shape: element.value_shape().clone(),
                entries,
            })
        }
        Expr::Coefficient(coefficient) => {
            let element = &coefficient.element;
            let n = element.scalar_dimension();
            let dofs = &ctx.coefficients[coefficient.index];
            let entries = (0..element.num_components())
                .map(|component| {
                    (0..n)
                        .map(|s| dofs[component * n + s] * ctx.basis_derivative(element, s, axis))
                        .sum()
                })
                .collect();
            Ok(Value {
                shape: element.value_shape().clone(),
                entries,
            })
        }
        Expr::Neg(e) => Ok(value_neg(eval_derivative(e, axis, ctx)?)),
        Expr::Add(a, b) => Ok(value_add(
            eval_derivative(a, axis, ctx)?,
            eval_derivative(b, axis, ctx)?,
        )),
        Expr::Mul(a, b) => {
            // Product rule; one operand is scalar by construction
            let da = eval_derivative(a, axis, ctx)?;
            let db = eval_derivative(b, axis, ctx)?;
            let va = eval(a, ctx)?;
            let vb = eval(b, ctx)?;
            Ok(value_add(value_mul(da, vb), value_mul(va, db)))
        }
        Expr::Quotient(a, b) => {
            let da = eval_derivative(a, axis, ctx)?;
            let db = eval_derivative(b, axis, ctx)?.entries[0];
            let va = eval(a, ctx)?;
            let vb = eval(b, ctx)?.entries[0];
            if vb == 0.0 {
                return Err(eyre!("division by zero while evaluating `{}`", expr));
            }
            let entries = da
                .entries
                .iter()
                .zip(&va.entries)
                .map(|(dx, x)| (dx * vb - x * db) / (vb * vb))
                .collect();
            Ok(Value {
                shape: da.shape,
                entries,
            })
        }
        Expr::Inner(a, b) => {
            let da = eval_derivative(a, axis, ctx)?;
            let db = eval_derivative(b, axis, ctx)?;
            let va = eval(a, ctx)?;
            let vb = eval(b, ctx)?;
            Ok(value_add(value_inner(&da, &vb), value_inner(&va, &db)))
        }
        Expr::Dot(a, b) => {
            let da = eval_derivative(a, axis, ctx)?;
            let db = eval_derivative(b, axis, ctx)?;
            let va = eval(a, ctx)?;
            let vb = eval(b, ctx)?;
            Ok(value_add(value_dot(&da, &vb), value_dot(&va, &db)))
        }
        Expr::Outer(a, b) => {
            let da = eval_derivative(a, axis, ctx)?;
            let db = eval_derivative(b, axis, ctx)?;
            let va = eval(a, ctx)?;
            let vb = eval(b, ctx)?;
            Ok(value_add(value_outer(&da, &vb), value_outer(&va, &db)))
        }
    }
}

impl QuadraturePlan {
    /// Accumulates this integral's contribution for one cell into the flat
    /// output buffer.
    pub fn accumulate_cell(
        &self,
        geometry: &CellGeometry,
        coefficients: &[Vec<f64>],
        output: &mut [f64],
    ) -> eyre::Result<()> {
        let variant = &self.variants[0];
        for point_index in 0..variant.rule.len() {
            let point = &variant.rule.points[point_index];
            let jacobian = geometry.jacobian_data_at(point.as_slice())?;
            let scale = variant.rule.weights[point_index] * jacobian.determinant.abs();
            self.accumulate_point(
                variant,
                point_index,
                &jacobian,
                None,
                scale,
                coefficients,
                (0, 1),
                output,
            )?;
        }
        Ok(())
    }

    /// Accumulates this integral's contribution for one exterior facet.
    pub fn accumulate_exterior_facet(
        &self,
        facet: usize,
        geometry: &CellGeometry,
        coefficients: &[Vec<f64>],
        output: &mut [f64],
    ) -> eyre::Result<()> {
        let variant = &self.variants[facet];
        for point_index in 0..variant.rule.len() {
            let point = &variant.rule.points[point_index];
            let jacobian = geometry.jacobian_data_at(point.as_slice())?;
            let (normal, facet_scale) = geometry.facet_normal_and_scale(facet, point.as_slice())?;
            let scale = variant.rule.weights[point_index] * facet_scale;
            self.accumulate_point(
                variant,
                point_index,
                &jacobian,
                Some(&normal),
                scale,
                coefficients,
                (0, 1),
                output,
            )?;
        }
        Ok(())
    }

    /// Accumulates one side's contribution of an interior facet integral
    /// into the macro-cell buffer, whose per-argument dimensions are twice
    /// the cell-local ones (side 0 dofs first).
    pub fn accumulate_interior_facet_side(
        &self,
        side: usize,
        facet: usize,
        geometry: &CellGeometry,
        coefficients: &[Vec<f64>],
        output: &mut [f64],
    ) -> eyre::Result<()> {
        let variant = &self.variants[facet];
        for point_index in 0..variant.rule.len() {
            let point = &variant.rule.points[point_index];
            let jacobian = geometry.jacobian_data_at(point.as_slice())?;
            let (normal, facet_scale) = geometry.facet_normal_and_scale(facet, point.as_slice())?;
            let scale = variant.rule.weights[point_index] * facet_scale;
            self.accumulate_point(
                variant,
                point_index,
                &jacobian,
                Some(&normal),
                scale,
                coefficients,
                (side, 2),
                output,
            )?;
        }
        Ok(())
    }

    /// The flat output index of a (test dof, trial dof) pair, where each
    /// argument's dof range is replicated `sides` times (2 for interior
    /// facet macro buffers) and this contribution targets block `side`.
    fn output_index(&self, i: usize, j: usize, side: usize, sides: usize) -> usize {
        match (self.test_dimension, self.trial_dimension) {
            (Some(test), Some(trial)) => (side * test + i) * (sides * trial) + side * trial + j,
            (Some(test), None) => side * test + i,
            (None, Some(trial)) => side * trial + j,
            (None, None) => 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate_point(
        &self,
        variant: &QuadratureVariant,
        point_index: usize,
        jacobian: &JacobianData,
        normal: Option<&DVector<f64>>,
        scale: f64,
        coefficients: &[Vec<f64>],
        (side, sides): (usize, usize),
        output: &mut [f64],
    ) -> eyre::Result<()> {
        for i in 0..self.test_dimension.unwrap_or(1) {
            for j in 0..self.trial_dimension.unwrap_or(1) {
                let ctx = PointContext {
                    tables: &variant.tables,
                    point_index,
                    jacobian,
                    normal,
                    test_dof: self.test_dimension.map(|_| i),
                    trial_dof: self.trial_dimension.map(|_| j),
                    coefficients,
                };
                let value = eval(&self.integrand, &ctx)?;
                output[self.output_index(i, j, side, sides)] += scale * value.entries[0];
            }
        }
        Ok(())
    }
}
