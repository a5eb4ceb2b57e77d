//! Quadrature degree estimation.
//!
//! The estimator infers a sufficient polynomial integration degree for an
//! integrand from the element degrees and the operators present. The policy
//! is pluggable: the heuristic lives behind [`DegreePolicy`] so that it can
//! be replaced without touching the planner, and the standard policy is
//! validated against known-exact integration results in the test suite.

use crate::element::ReferenceCell;
use crate::form::{DegreeChoice, Expr, Measure};
use log::warn;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Raised when no finite polynomial degree bounds an integrand.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DegreeError {
    /// The integrand is not polynomial in the reference coordinates, e.g.
    /// because of division by a non-constant expression.
    NonPolynomial { expression: String },
}

impl Display for DegreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPolynomial { expression } => {
                write!(f, "cannot bound polynomial degree of `{}`", expression)
            }
        }
    }
}

impl std::error::Error for DegreeError {}

/// A quadrature degree estimation policy.
pub trait DegreePolicy {
    /// Estimates a degree sufficient to integrate the integrand exactly,
    /// or fails with [`DegreeError`] if no finite bound exists.
    fn estimate(&self, integrand: &Expr) -> Result<usize, DegreeError>;

    /// The conservative degree used when estimation fails and no explicit
    /// degree was given.
    fn fallback_degree(&self, integrand: &Expr) -> usize;
}

/// The standard estimation policy.
///
/// Each argument or coefficient factor contributes its element degree,
/// every derivative operator lowers the degree by one (never below zero),
/// multiplicative structure adds degrees and additive structure takes the
/// maximum. Non-affine cells add the polynomial degree of the geometry
/// mapping's Jacobian determinant.
#[derive(Debug, Clone, Default)]
pub struct StandardDegreePolicy;

impl StandardDegreePolicy {
    /// The polynomial degree contributed by the Jacobian factor of the
    /// geometry map. Zero for affine (simplex) cells; for multilinear maps
    /// the determinant is polynomial of the returned degree.
    fn geometry_degree(&self, cell: ReferenceCell) -> usize {
        match cell {
            ReferenceCell::Interval | ReferenceCell::Triangle | ReferenceCell::Tetrahedron => 0,
            ReferenceCell::Quadrilateral => 1,
            ReferenceCell::Hexahedron => 4,
        }
    }

    fn integrand_degree(&self, expr: &Expr) -> Result<usize, DegreeError> {
        match expr {
            Expr::Constant(_) | Expr::FacetNormal { .. } => Ok(0),
            Expr::Argument(argument) => Ok(argument.element.degree()),
            Expr::Coefficient(coefficient) => Ok(coefficient.element.degree()),
            // A derivative lowers the degree by one, but never below zero
            Expr::Grad(e) | Expr::Div(e) | Expr::Curl(e) => {
                Ok(self.integrand_degree(e)?.saturating_sub(1))
            }
            Expr::Neg(e) => self.integrand_degree(e),
            Expr::Add(a, b) => Ok(self.integrand_degree(a)?.max(self.integrand_degree(b)?)),
            Expr::Mul(a, b) | Expr::Inner(a, b) | Expr::Dot(a, b) | Expr::Outer(a, b) => {
                Ok(self.integrand_degree(a)? + self.integrand_degree(b)?)
            }
            Expr::Quotient(a, b) => {
                if self.integrand_degree(b)? == 0 {
                    self.integrand_degree(a)
                } else {
                    Err(DegreeError::NonPolynomial {
                        expression: expr.to_string(),
                    })
                }
            }
        }
    }
}

impl DegreePolicy for StandardDegreePolicy {
    fn estimate(&self, integrand: &Expr) -> Result<usize, DegreeError> {
        let geometry = integrand
            .cell()
            .map(|cell| self.geometry_degree(cell))
            .unwrap_or(0);
        Ok(self.integrand_degree(integrand)? + geometry)
    }

    fn fallback_degree(&self, integrand: &Expr) -> usize {
        let max_element_degree = integrand
            .arguments()
            .iter()
            .map(|argument| argument.element.degree())
            .chain(
                integrand
                    .coefficients()
                    .iter()
                    .map(|coefficient| coefficient.element.degree()),
            )
            .max()
            .unwrap_or(1);
        2 * max_element_degree + 1
    }
}

/// Resolves the quadrature degree of one integral: an explicit degree
/// overrides the estimate unconditionally; otherwise the policy estimate is
/// used, falling back to the conservative default with a warning when
/// estimation fails.
pub fn resolve_degree(integrand: &Expr, measure: &Measure, policy: &dyn DegreePolicy) -> usize {
    match measure.degree {
        DegreeChoice::Fixed(degree) => degree,
        DegreeChoice::Auto => match policy.estimate(integrand) {
            Ok(degree) => degree,
            Err(error) => {
                let fallback = policy.fallback_degree(integrand);
                warn!(
                    "{}; falling back to conservative quadrature degree {}",
                    error, fallback
                );
                fallback
            }
        },
    }
}
