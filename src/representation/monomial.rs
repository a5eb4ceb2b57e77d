//! Expansion of integrands into sums of basis-function monomials.
//!
//! The tensor factorizer rewrites a (polynomial) integrand as
//!
//! ```text
//! sum_m  c_m * prod_f  D^(m,f) phi^(m,f)
//! ```
//!
//! where every factor is a (possibly differentiated) component of an
//! argument or coefficient basis function. Each factor records its source,
//! its flattened value component and the physical derivative axes applied
//! to it. The expansion is purely symbolic; no geometry enters here.
//!
//! Monomials are canonicalized (factors sorted, equal monomials merged,
//! zero monomials dropped) so the result is independent of the syntactic
//! ordering of commutative subexpressions.

use crate::element::{ElementDescriptor, Shape};
use crate::form::{ArgumentKind, Expr};

/// The origin of a basis factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactorSource {
    Test,
    Trial,
    /// A coefficient, identified by its index in the form.
    Coefficient(usize),
}

/// One basis-function factor of a monomial.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BasisFactor {
    pub source: FactorSource,
    pub element: ElementDescriptor,
    /// Flattened value component of the factor.
    pub component: usize,
    /// Physical derivative axes applied to the factor, in ascending order.
    pub derivatives: Vec<usize>,
}

/// A product of basis factors with a scalar coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct Monomial {
    pub coefficient: f64,
    pub factors: Vec<BasisFactor>,
}

/// A sum of monomials.
pub type Poly = Vec<Monomial>;

/// Reasons why an integrand cannot be expanded into monomials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionIssue {
    /// The integrand references the facet normal, which is not a basis
    /// factor.
    FacetNormal,
    /// Division by an expression that is not a nonzero constant.
    NonConstantDenominator { expression: String },
    /// A factor carries more than one derivative; basis tables only hold
    /// first derivatives.
    DerivativeOrder { expression: String },
    /// A monomial does not use each declared argument exactly once.
    NotMultilinear { reason: String },
}

/// A value-shaped tensor of polynomials, the intermediate result of
/// expansion.
#[derive(Debug, Clone)]
struct SymTensor {
    shape: Shape,
    /// Row-major over flattened components.
    entries: Vec<Poly>,
}

impl SymTensor {
    fn scalar(poly: Poly) -> Self {
        Self {
            shape: Shape::scalar(),
            entries: vec![poly],
        }
    }

    fn zeros(shape: Shape) -> Self {
        let n = shape.num_components();
        Self {
            shape,
            entries: vec![Vec::new(); n],
        }
    }
}

fn poly_neg(poly: &Poly) -> Poly {
    poly.iter()
        .map(|monomial| Monomial {
            coefficient: -monomial.coefficient,
            factors: monomial.factors.clone(),
        })
        .collect()
}

fn poly_add(a: &Poly, b: &Poly) -> Poly {
    a.iter().chain(b).cloned().collect()
}

fn poly_mul(a: &Poly, b: &Poly) -> Poly {
    let mut product = Vec::with_capacity(a.len() * b.len());
    for left in a {
        for right in b {
            let mut factors = left.factors.clone();
            factors.extend(right.factors.iter().cloned());
            product.push(Monomial {
                coefficient: left.coefficient * right.coefficient,
                factors,
            });
        }
    }
    product
}

fn poly_scale(poly: &Poly, scale: f64) -> Poly {
    poly.iter()
        .map(|monomial| Monomial {
            coefficient: scale * monomial.coefficient,
            factors: monomial.factors.clone(),
        })
        .collect()
}

/// Differentiates a polynomial with respect to physical axis `axis` by the
/// product rule. Constant monomials vanish.
fn poly_derivative(poly: &Poly, axis: usize) -> Poly {
    let mut derivative = Vec::new();
    for monomial in poly {
        for position in 0..monomial.factors.len() {
            let mut factors = monomial.factors.clone();
            factors[position].derivatives.push(axis);
            factors[position].derivatives.sort_unstable();
            derivative.push(Monomial {
                coefficient: monomial.coefficient,
                factors,
            });
        }
    }
    derivative
}

/// If the polynomial is a constant, returns its value.
fn poly_constant_value(poly: &Poly) -> Option<f64> {
    if poly.iter().all(|monomial| monomial.factors.is_empty()) {
        Some(poly.iter().map(|monomial| monomial.coefficient).sum())
    } else {
        None
    }
}

/// Sorts factors within each monomial, merges equal monomials and drops
/// zeros. The result is a canonical form: any two expansions of
/// mathematically identical polynomial sums coincide.
pub fn canonicalize(mut poly: Poly) -> Poly {
    for monomial in &mut poly {
        monomial.factors.sort_unstable();
    }
    poly.sort_by(|a, b| a.factors.cmp(&b.factors));

    let mut merged: Poly = Vec::with_capacity(poly.len());
    for monomial in poly {
        match merged.last_mut() {
            Some(last) if last.factors == monomial.factors => {
                last.coefficient += monomial.coefficient
            }
            _ => merged.push(monomial),
        }
    }
    merged.retain(|monomial| monomial.coefficient != 0.0);
    merged
}

/// Expands a scalar integrand into a canonical sum of monomials.
pub fn expand_integrand(integrand: &Expr) -> Result<Poly, ExpansionIssue> {
    let tensor = expand(integrand)?;
    debug_assert!(tensor.shape.is_scalar(), "Integrands are scalar");
    let poly = canonicalize(tensor.entries.into_iter().next().unwrap_or_default());
    for monomial in &poly {
        for factor in &monomial.factors {
            if factor.derivatives.len() > 1 {
                return Err(ExpansionIssue::DerivativeOrder {
                    expression: integrand.to_string(),
                });
            }
        }
    }
    Ok(poly)
}

/// Checks that every monomial uses each declared argument exactly once.
pub fn check_multilinearity(
    poly: &Poly,
    has_test: bool,
    has_trial: bool,
) -> Result<(), ExpansionIssue> {
    for monomial in poly {
        let test_count = monomial
            .factors
            .iter()
            .filter(|f| f.source == FactorSource::Test)
            .count();
        let trial_count = monomial
            .factors
            .iter()
            .filter(|f| f.source == FactorSource::Trial)
            .count();
        let expected = |present: bool| if present { 1 } else { 0 };
        if test_count != expected(has_test) || trial_count != expected(has_trial) {
            return Err(ExpansionIssue::NotMultilinear {
                reason: format!(
                    "a term uses the test function {} time(s) and the trial function {} time(s)",
                    test_count, trial_count
                ),
            });
        }
    }
    Ok(())
}

fn expand(expr: &Expr) -> Result<SymTensor, ExpansionIssue> {
    match expr {
        Expr::Constant(value) => Ok(SymTensor::scalar(vec![Monomial {
            coefficient: value.into_inner(),
            factors: Vec::new(),
        }])),
        Expr::FacetNormal { .. } => Err(ExpansionIssue::FacetNormal),
        Expr::Argument(argument) => {
            let source = match argument.kind {
                ArgumentKind::Test => FactorSource::Test,
                ArgumentKind::Trial => FactorSource::Trial,
            };
            Ok(expand_terminal(source, &argument.element))
        }
        Expr::Coefficient(coefficient) => Ok(expand_terminal(
            FactorSource::Coefficient(coefficient.index),
            &coefficient.element,
        )),
        Expr::Grad(e) => {
            let operand = expand(e)?;
            let dim = expr
                .cell()
                .expect("Gradient operand references an element")
                .dimension();
            let mut dims = operand.shape.dims().to_vec();
            dims.push(dim);
            let shape = Shape::from_dims(dims);
            let mut entries = Vec::with_capacity(shape.num_components());
            for entry in &operand.entries {
                for axis in 0..dim {
                    entries.push(poly_derivative(entry, axis));
                }
            }
            Ok(SymTensor { shape, entries })
        }
        Expr::Div(e) => {
            let operand = expand(e)?;
            let dims = operand.shape.dims();
            let last = *dims.last().expect("Divergence operand has rank >= 1");
            let mut result_dims = dims.to_vec();
            result_dims.pop();
            let shape = Shape::from_dims(result_dims);
            let mut entries = Vec::with_capacity(shape.num_components());
            for head in 0..shape.num_components() {
                let mut sum = Vec::new();
                for axis in 0..last {
                    let derivative = poly_derivative(&operand.entries[head * last + axis], axis);
                    sum = poly_add(&sum, &derivative);
                }
                entries.push(sum);
            }
            Ok(SymTensor { shape, entries })
        }
        Expr::Curl(e) => {
            let operand = expand(e)?;
            let dim = expr
                .cell()
                .expect("Curl operand references an element")
                .dimension();
            if dim == 2 {
                // curl(v) = d v1 / dx0 - d v0 / dx1
                let poly = poly_add(
                    &poly_derivative(&operand.entries[1], 0),
                    &poly_neg(&poly_derivative(&operand.entries[0], 1)),
                );
                Ok(SymTensor::scalar(poly))
            } else {
                // (curl v)_i = d v_k / dx_j - d v_j / dx_k for cyclic (i, j, k)
                let component = |j: usize, k: usize| {
                    poly_add(
                        &poly_derivative(&operand.entries[k], j),
                        &poly_neg(&poly_derivative(&operand.entries[j], k)),
                    )
                };
                Ok(SymTensor {
                    shape: Shape::vector(3),
                    entries: vec![component(1, 2), component(2, 0), component(0, 1)],
                })
            }
        }
        Expr::Neg(e) => {
            let operand = expand(e)?;
            Ok(SymTensor {
                shape: operand.shape,
                entries: operand.entries.iter().map(poly_neg).collect(),
            })
        }
        Expr::Add(a, b) => {
            let left = expand(a)?;
            let right = expand(b)?;
            let entries = left
                .entries
                .iter()
                .zip(&right.entries)
                .map(|(l, r)| poly_add(l, r))
                .collect();
            Ok(SymTensor {
                shape: left.shape,
                entries,
            })
        }
        Expr::Mul(a, b) => {
            let left = expand(a)?;
            let right = expand(b)?;
            // One side is scalar by construction
            let (scalar, tensor) = if left.shape.is_scalar() {
                (&left, &right)
            } else {
                (&right, &left)
            };
            let scalar_poly = &scalar.entries[0];
            let entries = tensor
                .entries
                .iter()
                .map(|entry| poly_mul(scalar_poly, entry))
                .collect();
            Ok(SymTensor {
                shape: tensor.shape.clone(),
                entries,
            })
        }
        Expr::Quotient(a, b) => {
            let numerator = expand(a)?;
            let denominator = expand(b)?;
            let value = poly_constant_value(&denominator.entries[0]).filter(|v| *v != 0.0);
            match value {
                Some(value) => {
                    let entries = numerator
                        .entries
                        .iter()
                        .map(|entry| poly_scale(entry, 1.0 / value))
                        .collect();
                    Ok(SymTensor {
                        shape: numerator.shape,
                        entries,
                    })
                }
                None => Err(ExpansionIssue::NonConstantDenominator {
                    expression: b.to_string(),
                }),
            }
        }
        Expr::Inner(a, b) => {
            let left = expand(a)?;
            let right = expand(b)?;
            let mut sum = Vec::new();
            for (l, r) in left.entries.iter().zip(&right.entries) {
                sum = poly_add(&sum, &poly_mul(l, r));
            }
            Ok(SymTensor::scalar(sum))
        }
        Expr::Dot(a, b) => {
            let left = expand(a)?;
            let right = expand(b)?;
            let left_dims = left.shape.dims();
            let right_dims = right.shape.dims();
            let contracted = *left_dims.last().expect("Dot operand has rank >= 1");
            let left_outer: usize = left_dims[..left_dims.len() - 1].iter().product();
            let right_outer: usize = right_dims[1..].iter().product();
            let mut result_dims = left_dims[..left_dims.len() - 1].to_vec();
            result_dims.extend_from_slice(&right_dims[1..]);
            let shape = Shape::from_dims(result_dims);
            let mut result = SymTensor::zeros(shape);
            for i in 0..left_outer {
                for j in 0..right_outer {
                    let mut sum = Vec::new();
                    for k in 0..contracted {
                        sum = poly_add(
                            &sum,
                            &poly_mul(
                                &left.entries[i * contracted + k],
                                &right.entries[k * right_outer + j],
                            ),
                        );
                    }
                    result.entries[i * right_outer + j] = sum;
                }
            }
            Ok(result)
        }
        Expr::Outer(a, b) => {
            let left = expand(a)?;
            let right = expand(b)?;
            let mut dims = left.shape.dims().to_vec();
            dims.extend_from_slice(right.shape.dims());
            let shape = Shape::from_dims(dims);
            let mut entries = Vec::with_capacity(shape.num_components());
            for l in &left.entries {
                for r in &right.entries {
                    entries.push(poly_mul(l, r));
                }
            }
            Ok(SymTensor { shape, entries })
        }
    }
}

fn expand_terminal(source: FactorSource, element: &ElementDescriptor) -> SymTensor {
    let shape = element.value_shape().clone();
    let num_components = shape.num_components();
    let entries = (0..num_components)
        .map(|component| {
            vec![Monomial {
                coefficient: 1.0,
                factors: vec![BasisFactor {
                    source,
                    element: element.clone(),
                    component,
                    derivatives: Vec::new(),
                }],
            }]
        })
        .collect();
    SymTensor { shape, entries }
}
