//! Representation selection and planning for integral terms.
//!
//! For every (integrand, measure) pair of a form, the planner resolves the
//! quadrature degree and the representation — tensor contraction or runtime
//! quadrature — and derives a [`RepresentationPlan`] holding everything the
//! code generator needs. Resolution is three-tiered and performed exactly
//! once per term: an explicit per-measure override wins over the global
//! default, which wins over the automatic heuristic.
//!
//! Plans can also be evaluated in-memory for a concrete cell geometry;
//! this is the semantic reference for the generated code and the basis of
//! the representation round-trip tests.

use crate::element::{ElementDescriptor, ReferenceCell};
use crate::estimate::{resolve_degree, DegreePolicy};
use crate::form::{
    ArgumentKind, Coefficient, DomainKind, Expr, Form, Integral, Measure, RepresentationChoice,
};
use crate::geometry::CellGeometry;
use crate::representation::monomial::ExpansionIssue;
use crate::representation::quadrature::QuadraturePlan;
use crate::representation::tensor::TensorPlan;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod monomial;
pub mod quadrature;
pub mod tensor;

/// Errors raised while planning an integral term.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TermError {
    /// An explicitly requested representation is not applicable to the
    /// term. Never raised by automatic selection.
    RepresentationInapplicable { subdomain: usize, reason: String },
    /// The integrand does not fit the domain kind of its measure.
    DomainMismatch { subdomain: usize, reason: String },
    /// A term does not use each declared argument exactly once.
    NotMultilinear { subdomain: usize, reason: String },
    /// The term requires basis derivatives beyond first order.
    UnsupportedDerivative { subdomain: usize, reason: String },
}

impl TermError {
    pub fn subdomain(&self) -> usize {
        match self {
            Self::RepresentationInapplicable { subdomain, .. }
            | Self::DomainMismatch { subdomain, .. }
            | Self::NotMultilinear { subdomain, .. }
            | Self::UnsupportedDerivative { subdomain, .. } => *subdomain,
        }
    }
}

impl Display for TermError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RepresentationInapplicable { subdomain, reason } => {
                write!(f, "subdomain {}: tensor representation is inapplicable: {}", subdomain, reason)
            }
            Self::DomainMismatch { subdomain, reason } => {
                write!(f, "subdomain {}: {}", subdomain, reason)
            }
            Self::NotMultilinear { subdomain, reason } => {
                write!(f, "subdomain {}: form is not multilinear: {}", subdomain, reason)
            }
            Self::UnsupportedDerivative { subdomain, reason } => {
                write!(f, "subdomain {}: {}", subdomain, reason)
            }
        }
    }
}

impl std::error::Error for TermError {}

/// The representation resolved for a term.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RepresentationKind {
    Tensor,
    Quadrature,
}

/// Options consumed by the planner.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Default representation for terms without an explicit override.
    pub default_representation: RepresentationChoice,
    /// Apply algebraic simplification to integrands before factorization.
    pub optimize: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            default_representation: RepresentationChoice::Auto,
            optimize: false,
        }
    }
}

/// Basis values and reference gradients tabulated at a fixed set of
/// points, one entry per point.
#[derive(Debug, Clone)]
pub struct BasisTables {
    pub values: Vec<DVector<f64>>,
    pub gradients: Vec<DMatrix<f64>>,
}

/// Tabulates each distinct element at the given reference points.
pub(crate) fn tabulate_elements<'a>(
    elements: impl IntoIterator<Item = &'a ElementDescriptor>,
    points: &[DVector<f64>],
) -> FxHashMap<ElementDescriptor, BasisTables> {
    let mut tables = FxHashMap::default();
    for element in elements {
        tables.entry(element.clone()).or_insert_with(|| BasisTables {
            values: points
                .iter()
                .map(|point| element.evaluate_reference_basis(point.as_slice()))
                .collect(),
            gradients: points
                .iter()
                .map(|point| element.evaluate_reference_basis_gradients(point.as_slice()))
                .collect(),
        });
    }
    tables
}

/// The elements of a form relevant during planning.
#[derive(Debug, Copy, Clone)]
pub(crate) struct FormContext<'a> {
    pub test: Option<&'a ElementDescriptor>,
    pub trial: Option<&'a ElementDescriptor>,
    pub coefficients: &'a [Coefficient],
}

impl<'a> FormContext<'a> {
    fn of(form: &'a Form) -> Self {
        Self {
            test: form.test_element(),
            trial: form.trial_element(),
            coefficients: form.coefficients(),
        }
    }

    /// Argument local dimensions in slot order, test first.
    pub fn argument_dimensions(&self) -> Vec<usize> {
        [self.test, self.trial]
            .iter()
            .flatten()
            .map(|element| element.local_dimension())
            .collect()
    }
}

/// The derived representation of a single integral.
#[derive(Debug, Clone)]
pub enum RepresentationPlan {
    Tensor(TensorPlan),
    Quadrature(QuadraturePlan),
}

impl RepresentationPlan {
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Self::Tensor(_) => RepresentationKind::Tensor,
            Self::Quadrature(_) => RepresentationKind::Quadrature,
        }
    }
}

/// One planned integral: resolved degree, representation and data.
#[derive(Debug, Clone)]
pub struct IntegralPlan {
    pub subdomain: usize,
    pub degree: usize,
    pub plan: RepresentationPlan,
}

/// All integrals of one (domain kind, subdomain) group, in form insertion
/// order.
#[derive(Debug, Clone)]
pub struct SubdomainPlans {
    pub subdomain: usize,
    pub integrals: Vec<IntegralPlan>,
}

/// All planned integrals of one domain kind, grouped by subdomain id in
/// ascending order.
#[derive(Debug, Clone)]
pub struct DomainPlans {
    pub domain: DomainKind,
    pub subdomains: Vec<SubdomainPlans>,
}

/// A fully planned form, ready for code generation.
#[derive(Debug, Clone)]
pub struct CompiledForm {
    form: Form,
    domains: Vec<DomainPlans>,
}

/// Decides whether the tensor representation applies to a term; returns a
/// human-readable reason when it does not.
fn tensor_inapplicability(
    integrand: &Expr,
    measure: &Measure,
    cell: ReferenceCell,
) -> Option<String> {
    if measure.domain == DomainKind::InteriorFacet {
        return Some("tensor representation is not available for interior facet integrals".into());
    }
    if !cell.is_simplex() {
        return Some(format!("cell {} is not affinely mapped", cell));
    }
    if integrand.contains_facet_normal() {
        return Some("integrand references the facet normal".into());
    }
    if let Some(quotient) = find_nonconstant_denominator(integrand) {
        return Some(format!("integrand divides by the non-constant `{}`", quotient));
    }
    None
}

fn is_constant_expression(expr: &Expr) -> bool {
    match expr {
        Expr::Constant(_) => true,
        Expr::Argument(_) | Expr::Coefficient(_) | Expr::FacetNormal { .. } => false,
        _ => expr.children().into_iter().all(is_constant_expression),
    }
}

fn find_nonconstant_denominator(expr: &Expr) -> Option<&Expr> {
    if let Expr::Quotient(_, denominator) = expr {
        if !is_constant_expression(denominator) {
            return Some(denominator);
        }
    }
    for child in expr.children() {
        if let Some(found) = find_nonconstant_denominator(child) {
            return Some(found);
        }
    }
    None
}

/// Resolves the representation of one term: explicit override, then global
/// default, then the automatic heuristic.
fn resolve_representation(
    integrand: &Expr,
    measure: &Measure,
    default: RepresentationChoice,
    cell: ReferenceCell,
) -> Result<RepresentationKind, TermError> {
    let inapplicability = tensor_inapplicability(integrand, measure, cell);
    match measure.representation {
        RepresentationChoice::Tensor => match inapplicability {
            Some(reason) => Err(TermError::RepresentationInapplicable {
                subdomain: measure.subdomain,
                reason,
            }),
            None => Ok(RepresentationKind::Tensor),
        },
        RepresentationChoice::Quadrature => Ok(RepresentationKind::Quadrature),
        RepresentationChoice::Auto => match (default, inapplicability) {
            (RepresentationChoice::Quadrature, _) => Ok(RepresentationKind::Quadrature),
            (RepresentationChoice::Tensor, Some(reason)) => {
                // The global default is a preference, not a per-term
                // request; downgrade with a warning instead of failing
                warn!(
                    "subdomain {}: tensor representation requested as default but inapplicable ({}); using quadrature",
                    measure.subdomain, reason
                );
                Ok(RepresentationKind::Quadrature)
            }
            (_, None) => Ok(RepresentationKind::Tensor),
            (_, Some(reason)) => {
                debug!(
                    "subdomain {}: selecting quadrature representation: {}",
                    measure.subdomain, reason
                );
                Ok(RepresentationKind::Quadrature)
            }
        },
    }
}

/// The polynomial degree of an expression in the test and trial arguments.
/// Fails when the expression is not jointly linear, e.g. a sum of terms of
/// different arities or a denominator depending on an argument.
fn argument_degrees(expr: &Expr) -> Result<(usize, usize), String> {
    match expr {
        Expr::Argument(argument) => Ok(match argument.kind {
            ArgumentKind::Test => (1, 0),
            ArgumentKind::Trial => (0, 1),
        }),
        Expr::Coefficient(_) | Expr::Constant(_) | Expr::FacetNormal { .. } => Ok((0, 0)),
        Expr::Grad(e) | Expr::Div(e) | Expr::Curl(e) | Expr::Neg(e) => argument_degrees(e),
        Expr::Add(a, b) => {
            let left = argument_degrees(a)?;
            let right = argument_degrees(b)?;
            if left != right {
                return Err(format!(
                    "the terms of `{}` have different argument arities",
                    expr
                ));
            }
            Ok(left)
        }
        Expr::Mul(a, b) | Expr::Inner(a, b) | Expr::Dot(a, b) | Expr::Outer(a, b) => {
            let left = argument_degrees(a)?;
            let right = argument_degrees(b)?;
            Ok((left.0 + right.0, left.1 + right.1))
        }
        Expr::Quotient(a, b) => {
            if argument_degrees(b)? != (0, 0) {
                return Err(format!("the denominator of `{}` depends on an argument", expr));
            }
            argument_degrees(a)
        }
    }
}

/// Rejects basis derivatives beyond first order and differentiated facet
/// normals. `applied` counts the derivative operators above the current
/// node.
fn check_derivatives(expr: &Expr, applied: usize) -> Result<(), String> {
    match expr {
        Expr::Argument(_) | Expr::Coefficient(_) => {
            if applied > 1 {
                Err("second and higher basis derivatives are not supported".to_string())
            } else {
                Ok(())
            }
        }
        Expr::FacetNormal { .. } => {
            if applied > 0 {
                Err("the facet normal cannot be differentiated".to_string())
            } else {
                Ok(())
            }
        }
        Expr::Constant(_) => Ok(()),
        Expr::Grad(e) | Expr::Div(e) | Expr::Curl(e) => check_derivatives(e, applied + 1),
        _ => expr
            .children()
            .into_iter()
            .try_for_each(|child| check_derivatives(child, applied)),
    }
}

fn validate_integrand(form: &Form, integral: &Integral) -> Result<(), TermError> {
    let subdomain = integral.measure.subdomain;
    let integrand = &integral.integrand;

    if integral.measure.domain == DomainKind::Cell && integrand.contains_facet_normal() {
        return Err(TermError::DomainMismatch {
            subdomain,
            reason: format!(
                "cell interior integrand `{}` references the facet normal",
                integrand
            ),
        });
    }

    check_derivatives(integrand, 0).map_err(|reason| TermError::UnsupportedDerivative {
        subdomain,
        reason,
    })?;

    let degrees = argument_degrees(integrand)
        .map_err(|reason| TermError::NotMultilinear { subdomain, reason })?;
    let expected = (
        usize::from(form.test_element().is_some()),
        usize::from(form.trial_element().is_some()),
    );
    if degrees != expected {
        return Err(TermError::NotMultilinear {
            subdomain,
            reason: format!(
                "term `{}` has argument degrees {:?}, form requires {:?}",
                integrand, degrees, expected
            ),
        });
    }
    Ok(())
}

fn expansion_issue_to_error(issue: ExpansionIssue, subdomain: usize) -> TermError {
    match issue {
        ExpansionIssue::FacetNormal => TermError::RepresentationInapplicable {
            subdomain,
            reason: "integrand references the facet normal".to_string(),
        },
        ExpansionIssue::NonConstantDenominator { expression } => {
            TermError::RepresentationInapplicable {
                subdomain,
                reason: format!("integrand divides by the non-constant `{}`", expression),
            }
        }
        ExpansionIssue::DerivativeOrder { expression } => TermError::UnsupportedDerivative {
            subdomain,
            reason: format!(
                "second and higher basis derivatives are not supported in `{}`",
                expression
            ),
        },
        ExpansionIssue::NotMultilinear { reason } => {
            TermError::NotMultilinear { subdomain, reason }
        }
    }
}

/// Plans all integrals of a form.
///
/// The returned [`CompiledForm`] groups plans by domain kind and subdomain
/// id (branches in ascending id order, terms within a group in form
/// insertion order).
pub fn plan_form(
    form: &Form,
    options: &PlanOptions,
    policy: &dyn DegreePolicy,
) -> Result<CompiledForm, TermError> {
    let ctx = FormContext::of(form);
    let cell = form.cell();

    let mut domains: Vec<DomainPlans> = Vec::new();
    for integral in form.integrals() {
        validate_integrand(form, integral)?;

        let integrand = if options.optimize {
            crate::form::expr::simplify(&integral.integrand)
        } else {
            integral.integrand.clone()
        };
        let measure = &integral.measure;
        let degree = resolve_degree(&integrand, measure, policy);
        let kind = resolve_representation(&integrand, measure, options.default_representation, cell)?;

        let plan = match kind {
            RepresentationKind::Tensor => {
                let plan = tensor::plan(&ctx, &integrand, degree, cell, measure.domain)
                    .map_err(|issue| expansion_issue_to_error(issue, measure.subdomain))?;
                RepresentationPlan::Tensor(plan)
            }
            RepresentationKind::Quadrature => RepresentationPlan::Quadrature(quadrature::plan(
                &ctx,
                &integrand,
                degree,
                cell,
                measure.domain,
            )),
        };

        let domain_position = match domains.iter().position(|d| d.domain == measure.domain) {
            Some(found) => found,
            None => {
                domains.push(DomainPlans {
                    domain: measure.domain,
                    subdomains: Vec::new(),
                });
                domains.len() - 1
            }
        };
        let domain_plans = &mut domains[domain_position];
        let position = domain_plans
            .subdomains
            .binary_search_by_key(&measure.subdomain, |group| group.subdomain);
        let group = match position {
            Ok(found) => &mut domain_plans.subdomains[found],
            Err(insert_at) => {
                domain_plans.subdomains.insert(
                    insert_at,
                    SubdomainPlans {
                        subdomain: measure.subdomain,
                        integrals: Vec::new(),
                    },
                );
                &mut domain_plans.subdomains[insert_at]
            }
        };
        group.integrals.push(IntegralPlan {
            subdomain: measure.subdomain,
            degree,
            plan,
        });
    }

    // Emit domain groups in the fixed kind order
    domains.sort_by_key(|group| DomainKind::ALL.iter().position(|k| *k == group.domain));

    Ok(CompiledForm { form: form.clone(), domains })
}

fn facet_reference_midpoint(cell: ReferenceCell, facet: usize) -> DVector<f64> {
    let vertices = cell.vertices();
    let indices = cell.facet_vertex_indices(facet);
    let mut midpoint = DVector::zeros(cell.dimension());
    for &index in indices {
        midpoint += &vertices[index];
    }
    midpoint /= indices.len() as f64;
    midpoint
}

impl CompiledForm {
    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn domains(&self) -> &[DomainPlans] {
        &self.domains
    }

    pub fn domain(&self, kind: DomainKind) -> Option<&DomainPlans> {
        self.domains.iter().find(|group| group.domain == kind)
    }

    /// The length of the flat local tensor buffer: the product of the
    /// argument local dimensions (one for rank-0 forms).
    pub fn buffer_length(&self) -> usize {
        self.form.argument_dimensions().iter().product()
    }

    /// The buffer length of interior facet procedures, where each
    /// argument's dof range covers both adjacent cells.
    pub fn macro_buffer_length(&self) -> usize {
        self.form
            .argument_dimensions()
            .iter()
            .map(|dimension| 2 * dimension)
            .product()
    }

    /// Evaluates the cell-interior contribution of this form for one cell.
    /// Unknown subdomain ids yield a zero buffer, matching the dispatch
    /// behavior of generated code.
    pub fn evaluate_cell(
        &self,
        subdomain: usize,
        geometry: &CellGeometry,
        coefficients: &[Vec<f64>],
    ) -> eyre::Result<Vec<f64>> {
        let mut output = vec![0.0; self.buffer_length()];
        if let Some(group) = self.subdomain_group(DomainKind::Cell, subdomain) {
            for integral in &group.integrals {
                match &integral.plan {
                    RepresentationPlan::Tensor(plan) => {
                        let jacobian = geometry.affine_jacobian_data()?;
                        let scale = jacobian.determinant.abs();
                        plan.accumulate(0, &jacobian, scale, coefficients, &mut output);
                    }
                    RepresentationPlan::Quadrature(plan) => {
                        plan.accumulate_cell(geometry, coefficients, &mut output)?;
                    }
                }
            }
        }
        Ok(output)
    }

    /// Evaluates the exterior-facet contribution of this form for one
    /// facet of one cell.
    pub fn evaluate_exterior_facet(
        &self,
        subdomain: usize,
        facet: usize,
        geometry: &CellGeometry,
        coefficients: &[Vec<f64>],
    ) -> eyre::Result<Vec<f64>> {
        let mut output = vec![0.0; self.buffer_length()];
        if let Some(group) = self.subdomain_group(DomainKind::ExteriorFacet, subdomain) {
            for integral in &group.integrals {
                match &integral.plan {
                    RepresentationPlan::Tensor(plan) => {
                        let jacobian = geometry.affine_jacobian_data()?;
                        let midpoint = facet_reference_midpoint(geometry.cell(), facet);
                        let (_, scale) =
                            geometry.facet_normal_and_scale(facet, midpoint.as_slice())?;
                        plan.accumulate(facet, &jacobian, scale, coefficients, &mut output);
                    }
                    RepresentationPlan::Quadrature(plan) => {
                        plan.accumulate_exterior_facet(facet, geometry, coefficients, &mut output)?;
                    }
                }
            }
        }
        Ok(output)
    }

    /// Evaluates the interior-facet contribution of this form for a facet
    /// shared by two cells. Coefficient dof arrays are macro-cell arrays:
    /// side 0 dofs followed by side 1 dofs.
    pub fn evaluate_interior_facet(
        &self,
        subdomain: usize,
        sides: [(&CellGeometry, usize); 2],
        coefficients: &[Vec<f64>],
    ) -> eyre::Result<Vec<f64>> {
        let mut output = vec![0.0; self.macro_buffer_length()];
        if let Some(group) = self.subdomain_group(DomainKind::InteriorFacet, subdomain) {
            for integral in &group.integrals {
                match &integral.plan {
                    RepresentationPlan::Tensor(_) => {
                        unreachable!("tensor plans are rejected for interior facet integrals")
                    }
                    RepresentationPlan::Quadrature(plan) => {
                        for (side, &(geometry, facet)) in sides.iter().enumerate() {
                            let side_coefficients =
                                extract_side_coefficients(self.form.coefficients(), coefficients, side);
                            plan.accumulate_interior_facet_side(
                                side,
                                facet,
                                geometry,
                                &side_coefficients,
                                &mut output,
                            )?;
                        }
                    }
                }
            }
        }
        Ok(output)
    }

    fn subdomain_group(&self, kind: DomainKind, subdomain: usize) -> Option<&SubdomainPlans> {
        self.domain(kind)?
            .subdomains
            .iter()
            .find(|group| group.subdomain == subdomain)
    }
}

fn extract_side_coefficients(
    declarations: &[Coefficient],
    macro_coefficients: &[Vec<f64>],
    side: usize,
) -> Vec<Vec<f64>> {
    declarations
        .iter()
        .zip(macro_coefficients)
        .map(|(declaration, dofs)| {
            let n = declaration.element.local_dimension();
            dofs[side * n..(side + 1) * n].to_vec()
        })
        .collect()
}
