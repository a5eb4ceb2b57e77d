//! The symbolic representation of variational forms.
//!
//! A [`Form`] is an ordered collection of (integrand, measure) pairs over a
//! common reference cell. The insertion order of integrals fixes the
//! accumulation order in generated code, but not the mathematical value of
//! the form.

use crate::element::{ElementDescriptor, ReferenceCell};
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod expr;
pub mod measure;

pub use expr::{
    add, curl, div, dot, grad, inner, mul, neg, outer, quotient, simplify, sub, Argument,
    ArgumentKind, Coefficient, Expr, ShapeError,
};
pub use measure::{DegreeChoice, DomainKind, Measure, RepresentationChoice};

/// A single integral of a form: an integrand paired with its measure.
#[derive(Debug, Clone, PartialEq)]
pub struct Integral {
    pub integrand: Expr,
    pub measure: Measure,
}

impl Integral {
    pub fn new(integrand: Expr, measure: Measure) -> Self {
        Self { integrand, measure }
    }
}

/// A multilinear form: an ordered collection of integrals.
///
/// Construction validates that at most one test and one trial argument
/// appear across all integrands, that coefficient declarations are
/// consistent, and that all elements live on the same reference cell.
/// Forms are immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    integrals: Vec<Integral>,
    test_element: Option<ElementDescriptor>,
    trial_element: Option<ElementDescriptor>,
    coefficients: Vec<Coefficient>,
    cell: ReferenceCell,
}

impl Form {
    /// Constructs a form from its integrals.
    pub fn from_integrals(integrals: Vec<Integral>) -> Result<Self, ShapeError> {
        let mut test_element = None;
        let mut trial_element = None;
        let mut cell = None;

        for integral in &integrals {
            for argument in integral.integrand.arguments() {
                let slot = match argument.kind {
                    ArgumentKind::Test => &mut test_element,
                    ArgumentKind::Trial => &mut trial_element,
                };
                match slot {
                    None => *slot = Some(argument.element.clone()),
                    Some(existing) if *existing != argument.element => {
                        return Err(ShapeError::ConflictingArguments {
                            kind: argument.kind,
                            first: existing.to_string(),
                            second: argument.element.to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
            if let Some(integral_cell) = integral.integrand.cell() {
                match cell {
                    None => cell = Some(integral_cell),
                    Some(existing) if existing != integral_cell => {
                        return Err(ShapeError::CellMismatch {
                            left_cell: existing,
                            right_cell: integral_cell,
                            expression: integral.integrand.to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        let cell = cell.ok_or_else(|| ShapeError::InvalidCoefficients {
            reason: "form references no finite element".to_string(),
        })?;

        let coefficients = Self::collect_coefficients(&integrals)?;

        Ok(Self {
            integrals,
            test_element,
            trial_element,
            coefficients,
            cell,
        })
    }

    fn collect_coefficients(integrals: &[Integral]) -> Result<Vec<Coefficient>, ShapeError> {
        let mut coefficients: Vec<Coefficient> = Vec::new();
        for integral in integrals {
            for coefficient in integral.integrand.coefficients() {
                match coefficients.iter().find(|c| c.index == coefficient.index) {
                    None => coefficients.push(coefficient.clone()),
                    Some(existing) if existing != coefficient => {
                        return Err(ShapeError::InvalidCoefficients {
                            reason: format!(
                                "coefficient index {} is bound to both `{}` and `{}`",
                                coefficient.index, existing.name, coefficient.name
                            ),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        coefficients.sort_by_key(|c| c.index);
        for (position, coefficient) in coefficients.iter().enumerate() {
            if coefficient.index != position {
                return Err(ShapeError::InvalidCoefficients {
                    reason: "coefficient indices must be contiguous starting at 0".to_string(),
                });
            }
        }
        Ok(coefficients)
    }

    /// The rank of the form: the number of distinct argument kinds present.
    /// 0 is a functional, 1 a linear form, 2 a bilinear form.
    pub fn rank(&self) -> usize {
        self.test_element.iter().count() + self.trial_element.iter().count()
    }

    pub fn integrals(&self) -> &[Integral] {
        &self.integrals
    }

    pub fn test_element(&self) -> Option<&ElementDescriptor> {
        self.test_element.as_ref()
    }

    pub fn trial_element(&self) -> Option<&ElementDescriptor> {
        self.trial_element.as_ref()
    }

    /// The coefficients of the form, ordered by index.
    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    /// The common reference cell of all elements of the form.
    pub fn cell(&self) -> ReferenceCell {
        self.cell
    }

    /// The local dimensions of the arguments, test first. The product of
    /// these is the length of the local tensor buffer.
    pub fn argument_dimensions(&self) -> Vec<usize> {
        [&self.test_element, &self.trial_element]
            .iter()
            .filter_map(|element| element.as_ref().map(ElementDescriptor::local_dimension))
            .collect()
    }
}

impl Display for Form {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (k, integral) in self.integrals.iter().enumerate() {
            if k > 0 {
                write!(f, " + ")?;
            }
            let measure_symbol = match integral.measure.domain {
                DomainKind::Cell => "dx",
                DomainKind::ExteriorFacet => "ds",
                DomainKind::InteriorFacet => "dS",
            };
            write!(
                f,
                "({}) * {}({})",
                integral.integrand, measure_symbol, integral.measure.subdomain
            )?;
        }
        Ok(())
    }
}
