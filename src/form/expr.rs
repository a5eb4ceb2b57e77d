//! The symbolic expression tree of integrands.
//!
//! Expressions are built through the constructor functions in this module
//! ([`grad`], [`inner`], [`add`], ...), never by hand: every constructor
//! validates the value shapes of its operands eagerly and fails with a
//! [`ShapeError`] identifying the offending subexpression, so that an
//! `Expr` that exists is always well-shaped.
//!
//! The derived `Ord` implementation provides the canonical ordering of
//! expressions (variant tag first, then children lexicographically) which
//! the factorizer uses to sort additive terms deterministically.

use crate::element::{ElementDescriptor, ReferenceCell, Shape};
use ordered_float::NotNan;
use std::fmt;
use std::fmt::{Display, Formatter};

/// The kind of a form argument.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgumentKind {
    Test,
    Trial,
}

impl Display for ArgumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Trial => write!(f, "trial"),
        }
    }
}

/// A placeholder for a test or trial function bound to an element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Argument {
    pub kind: ArgumentKind,
    pub element: ElementDescriptor,
}

/// A named, known function bound to an element. Its per-cell dof values are
/// runtime inputs of the generated procedures.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coefficient {
    pub index: usize,
    pub name: String,
    pub element: ElementDescriptor,
}

/// A node of the integrand expression tree.
///
/// The variants mirror the operators of the input language: terminals
/// (arguments, coefficients, constants, the facet normal), the differential
/// operators and the algebraic compositions. `a - b` is desugared to
/// `a + (-b)` at construction, so no subtraction variant exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    Argument(Argument),
    Coefficient(Coefficient),
    Constant(NotNan<f64>),
    /// The outward unit normal of the current facet. Only meaningful in
    /// facet integrals; cell integrals containing it are rejected when the
    /// integral is planned.
    FacetNormal { cell: ReferenceCell },
    Grad(Box<Expr>),
    Div(Box<Expr>),
    Curl(Box<Expr>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Quotient(Box<Expr>, Box<Expr>),
    Inner(Box<Expr>, Box<Expr>),
    Dot(Box<Expr>, Box<Expr>),
    Outer(Box<Expr>, Box<Expr>),
}

/// Value-shape errors raised during expression construction.
///
/// These are structural errors: they are reported eagerly, when the
/// offending node is built, not when the form is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ShapeError {
    /// A binary operation was applied to operands of incompatible shapes.
    Mismatch {
        operation: &'static str,
        left_shape: Shape,
        right_shape: Shape,
        expression: String,
    },
    /// An operation was applied to an operand whose shape it does not
    /// accept.
    Unsupported {
        operation: &'static str,
        operand_shape: Shape,
        expression: String,
        reason: String,
    },
    /// Two subexpressions reference elements on different reference cells.
    CellMismatch {
        left_cell: ReferenceCell,
        right_cell: ReferenceCell,
        expression: String,
    },
    /// A form used two distinct arguments of the same kind.
    ConflictingArguments {
        kind: ArgumentKind,
        first: String,
        second: String,
    },
    /// Coefficient declarations are inconsistent (duplicate indices bound to
    /// different elements, or indices that are not contiguous from zero).
    InvalidCoefficients { reason: String },
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch {
                operation,
                left_shape,
                right_shape,
                expression,
            } => write!(
                f,
                "shape mismatch in {}: {} vs {} in `{}`",
                operation, left_shape, right_shape, expression
            ),
            Self::Unsupported {
                operation,
                operand_shape,
                expression,
                reason,
            } => write!(
                f,
                "{} cannot be applied to operand of shape {} in `{}`: {}",
                operation, operand_shape, expression, reason
            ),
            Self::CellMismatch {
                left_cell,
                right_cell,
                expression,
            } => write!(
                f,
                "mixed reference cells {} and {} in `{}`",
                left_cell, right_cell, expression
            ),
            Self::ConflictingArguments { kind, first, second } => write!(
                f,
                "form uses two distinct {} functions: {} and {}",
                kind, first, second
            ),
            Self::InvalidCoefficients { reason } => {
                write!(f, "invalid coefficient declarations: {}", reason)
            }
        }
    }
}

impl std::error::Error for ShapeError {}

impl Expr {
    /// A test-function placeholder.
    pub fn test_function(element: ElementDescriptor) -> Self {
        Expr::Argument(Argument {
            kind: ArgumentKind::Test,
            element,
        })
    }

    /// A trial-function placeholder.
    pub fn trial_function(element: ElementDescriptor) -> Self {
        Expr::Argument(Argument {
            kind: ArgumentKind::Trial,
            element,
        })
    }

    /// A named coefficient function.
    pub fn coefficient(index: usize, name: impl Into<String>, element: ElementDescriptor) -> Self {
        Expr::Coefficient(Coefficient {
            index,
            name: name.into(),
            element,
        })
    }

    /// A scalar constant.
    ///
    /// # Panics
    ///
    /// Panics if the value is NaN.
    pub fn constant(value: f64) -> Self {
        let value = NotNan::new(value).expect("Constant must not be NaN");
        Expr::Constant(value)
    }

    /// The outward unit facet normal on the given cell.
    pub fn facet_normal(cell: ReferenceCell) -> Self {
        Expr::FacetNormal { cell }
    }

    /// The value shape of this expression. Well-defined for every
    /// successfully constructed expression.
    pub fn shape(&self) -> Shape {
        match self {
            Expr::Argument(arg) => arg.element.value_shape().clone(),
            Expr::Coefficient(coefficient) => coefficient.element.value_shape().clone(),
            Expr::Constant(_) => Shape::scalar(),
            Expr::FacetNormal { cell } => Shape::vector(cell.dimension()),
            Expr::Grad(e) => {
                let dim = self.cell().expect("Gradient operand has a cell").dimension();
                let mut dims = e.shape().dims().to_vec();
                dims.push(dim);
                Shape::from_dims(dims)
            }
            Expr::Div(e) => {
                let mut dims = e.shape().dims().to_vec();
                dims.pop();
                Shape::from_dims(dims)
            }
            Expr::Curl(e) => {
                let dim = self.cell().expect("Curl operand has a cell").dimension();
                if dim == 2 {
                    Shape::scalar()
                } else {
                    e.shape()
                }
            }
            Expr::Neg(e) => e.shape(),
            Expr::Add(a, _) => a.shape(),
            Expr::Mul(a, b) => {
                if a.shape().is_scalar() {
                    b.shape()
                } else {
                    a.shape()
                }
            }
            Expr::Quotient(a, _) => a.shape(),
            Expr::Inner(_, _) => Shape::scalar(),
            Expr::Dot(a, b) => {
                let a_dims = a.shape().dims().to_vec();
                let b_dims = b.shape().dims().to_vec();
                let mut dims = a_dims[..a_dims.len() - 1].to_vec();
                dims.extend_from_slice(&b_dims[1..]);
                Shape::from_dims(dims)
            }
            Expr::Outer(a, b) => {
                let mut dims = a.shape().dims().to_vec();
                dims.extend_from_slice(b.shape().dims());
                Shape::from_dims(dims)
            }
        }
    }

    /// The reference cell this expression is attached to, if it references
    /// any element or facet normal.
    pub fn cell(&self) -> Option<ReferenceCell> {
        match self {
            Expr::Argument(arg) => Some(arg.element.cell()),
            Expr::Coefficient(coefficient) => Some(coefficient.element.cell()),
            Expr::Constant(_) => None,
            Expr::FacetNormal { cell } => Some(*cell),
            Expr::Grad(e) | Expr::Div(e) | Expr::Curl(e) | Expr::Neg(e) => e.cell(),
            Expr::Add(a, b)
            | Expr::Mul(a, b)
            | Expr::Quotient(a, b)
            | Expr::Inner(a, b)
            | Expr::Dot(a, b)
            | Expr::Outer(a, b) => a.cell().or_else(|| b.cell()),
        }
    }

    /// The direct children of this node.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Argument(_) | Expr::Coefficient(_) | Expr::Constant(_) | Expr::FacetNormal { .. } => {
                Vec::new()
            }
            Expr::Grad(e) | Expr::Div(e) | Expr::Curl(e) | Expr::Neg(e) => vec![e],
            Expr::Add(a, b)
            | Expr::Mul(a, b)
            | Expr::Quotient(a, b)
            | Expr::Inner(a, b)
            | Expr::Dot(a, b)
            | Expr::Outer(a, b) => vec![a, b],
        }
    }

    /// Whether any node of this expression is a facet normal.
    pub fn contains_facet_normal(&self) -> bool {
        matches!(self, Expr::FacetNormal { .. })
            || self.children().iter().any(|child| child.contains_facet_normal())
    }

    /// Collects the distinct arguments appearing in this expression.
    pub fn arguments(&self) -> Vec<&Argument> {
        let mut arguments = Vec::new();
        self.collect_arguments(&mut arguments);
        arguments
    }

    fn collect_arguments<'a>(&'a self, out: &mut Vec<&'a Argument>) {
        if let Expr::Argument(arg) = self {
            if !out.contains(&arg) {
                out.push(arg);
            }
        }
        for child in self.children() {
            child.collect_arguments(out);
        }
    }

    /// Collects the distinct coefficients appearing in this expression.
    pub fn coefficients(&self) -> Vec<&Coefficient> {
        let mut coefficients = Vec::new();
        self.collect_coefficients(&mut coefficients);
        coefficients
    }

    fn collect_coefficients<'a>(&'a self, out: &mut Vec<&'a Coefficient>) {
        if let Expr::Coefficient(coefficient) = self {
            if !out.contains(&coefficient) {
                out.push(coefficient);
            }
        }
        for child in self.children() {
            child.collect_coefficients(out);
        }
    }
}

fn check_cells(operation: &'static str, a: &Expr, b: &Expr) -> Result<(), ShapeError> {
    if let (Some(left_cell), Some(right_cell)) = (a.cell(), b.cell()) {
        if left_cell != right_cell {
            return Err(ShapeError::CellMismatch {
                left_cell,
                right_cell,
                expression: format!("{}({}, {})", operation, a, b),
            });
        }
    }
    Ok(())
}

/// The gradient of an expression with respect to physical coordinates.
///
/// A scalar becomes a vector; a vector becomes a matrix with one row per
/// value component and one column per spatial coordinate.
pub fn grad(e: Expr) -> Result<Expr, ShapeError> {
    let shape = e.shape();
    if e.cell().is_none() {
        return Err(ShapeError::Unsupported {
            operation: "grad",
            operand_shape: shape,
            expression: format!("grad({})", e),
            reason: "operand references no finite element".to_string(),
        });
    }
    if shape.rank() > 1 {
        return Err(ShapeError::Unsupported {
            operation: "grad",
            operand_shape: shape,
            expression: format!("grad({})", e),
            reason: "tensors of rank above 2 are not supported".to_string(),
        });
    }
    Ok(Expr::Grad(Box::new(e)))
}

/// The divergence of a vector (to a scalar) or matrix (to a vector).
pub fn div(e: Expr) -> Result<Expr, ShapeError> {
    let shape = e.shape();
    let cell = match e.cell() {
        Some(cell) => cell,
        None => {
            return Err(ShapeError::Unsupported {
                operation: "div",
                operand_shape: shape,
                expression: format!("div({})", e),
                reason: "operand references no finite element".to_string(),
            })
        }
    };
    let dim = cell.dimension();
    match shape.dims().last() {
        Some(&last) if last == dim => Ok(Expr::Div(Box::new(e))),
        _ => Err(ShapeError::Unsupported {
            operation: "div",
            operand_shape: shape,
            expression: format!("div({})", e),
            reason: format!("last axis must have length {} (the spatial dimension)", dim),
        }),
    }
}

/// The curl of a vector field: a scalar in two dimensions, a vector in
/// three.
pub fn curl(e: Expr) -> Result<Expr, ShapeError> {
    let shape = e.shape();
    let cell = match e.cell() {
        Some(cell) => cell,
        None => {
            return Err(ShapeError::Unsupported {
                operation: "curl",
                operand_shape: shape,
                expression: format!("curl({})", e),
                reason: "operand references no finite element".to_string(),
            })
        }
    };
    let dim = cell.dimension();
    let valid = (dim == 2 || dim == 3) && shape.dims() == [dim];
    if valid {
        Ok(Expr::Curl(Box::new(e)))
    } else {
        Err(ShapeError::Unsupported {
            operation: "curl",
            operand_shape: shape,
            expression: format!("curl({})", e),
            reason: format!("operand must be a vector of length {} in dimension {}", dim, dim),
        })
    }
}

/// Negation.
pub fn neg(e: Expr) -> Expr {
    Expr::Neg(Box::new(e))
}

/// The sum of two expressions of equal shape.
pub fn add(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    check_cells("add", &a, &b)?;
    let (left_shape, right_shape) = (a.shape(), b.shape());
    if left_shape != right_shape {
        return Err(ShapeError::Mismatch {
            operation: "add",
            left_shape,
            right_shape,
            expression: format!("{} + {}", a, b),
        });
    }
    Ok(Expr::Add(Box::new(a), Box::new(b)))
}

/// The difference of two expressions of equal shape, desugared to
/// `a + (-b)`.
pub fn sub(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    add(a, neg(b))
}

/// The product of a scalar and an arbitrary expression (in either order).
pub fn mul(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    check_cells("mul", &a, &b)?;
    let (left_shape, right_shape) = (a.shape(), b.shape());
    if !left_shape.is_scalar() && !right_shape.is_scalar() {
        return Err(ShapeError::Mismatch {
            operation: "mul",
            left_shape,
            right_shape,
            expression: format!("{} * {}", a, b),
        });
    }
    Ok(Expr::Mul(Box::new(a), Box::new(b)))
}

/// The quotient of an expression by a scalar.
pub fn quotient(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    check_cells("quotient", &a, &b)?;
    let right_shape = b.shape();
    if !right_shape.is_scalar() {
        return Err(ShapeError::Unsupported {
            operation: "quotient",
            operand_shape: right_shape,
            expression: format!("{} / {}", a, b),
            reason: "denominator must be scalar".to_string(),
        });
    }
    Ok(Expr::Quotient(Box::new(a), Box::new(b)))
}

/// The full contraction of two expressions of identical shape.
pub fn inner(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    check_cells("inner", &a, &b)?;
    let (left_shape, right_shape) = (a.shape(), b.shape());
    if left_shape != right_shape {
        return Err(ShapeError::Mismatch {
            operation: "inner",
            left_shape,
            right_shape,
            expression: format!("inner({}, {})", a, b),
        });
    }
    Ok(Expr::Inner(Box::new(a), Box::new(b)))
}

/// The contraction of the last axis of `a` with the first axis of `b`.
pub fn dot(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    check_cells("dot", &a, &b)?;
    let (left_shape, right_shape) = (a.shape(), b.shape());
    let compatible = match (left_shape.dims().last(), right_shape.dims().first()) {
        (Some(&last), Some(&first)) => last == first,
        _ => false,
    };
    if !compatible {
        return Err(ShapeError::Mismatch {
            operation: "dot",
            left_shape,
            right_shape,
            expression: format!("dot({}, {})", a, b),
        });
    }
    let result_rank = left_shape.rank() + right_shape.rank() - 2;
    if result_rank > 2 {
        return Err(ShapeError::Unsupported {
            operation: "dot",
            operand_shape: left_shape,
            expression: format!("dot({}, {})", a, b),
            reason: "tensors of rank above 2 are not supported".to_string(),
        });
    }
    Ok(Expr::Dot(Box::new(a), Box::new(b)))
}

/// The outer product of two expressions.
pub fn outer(a: Expr, b: Expr) -> Result<Expr, ShapeError> {
    check_cells("outer", &a, &b)?;
    let (left_shape, right_shape) = (a.shape(), b.shape());
    if left_shape.rank() + right_shape.rank() > 2 {
        return Err(ShapeError::Unsupported {
            operation: "outer",
            operand_shape: left_shape,
            expression: format!("outer({}, {})", a, b),
            reason: "tensors of rank above 2 are not supported".to_string(),
        });
    }
    Ok(Expr::Outer(Box::new(a), Box::new(b)))
}

/// Algebraically simplifies an expression: constant folding, elimination
/// of zero and one factors and of double negation. Applied before
/// factorization when the `optimize` option is set. The transformation is
/// shape-preserving, so the result never needs re-validation.
pub fn simplify(expr: &Expr) -> Expr {
    let constant_value = |e: &Expr| match e {
        Expr::Constant(value) => Some(value.into_inner()),
        _ => None,
    };
    match expr {
        Expr::Argument(_) | Expr::Coefficient(_) | Expr::Constant(_) | Expr::FacetNormal { .. } => {
            expr.clone()
        }
        Expr::Grad(e) => Expr::Grad(Box::new(simplify(e))),
        Expr::Div(e) => Expr::Div(Box::new(simplify(e))),
        Expr::Curl(e) => Expr::Curl(Box::new(simplify(e))),
        Expr::Neg(e) => match simplify(e) {
            Expr::Constant(value) => Expr::constant(-value.into_inner()),
            Expr::Neg(inner) => *inner,
            simplified => Expr::Neg(Box::new(simplified)),
        },
        Expr::Add(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (constant_value(&a), constant_value(&b)) {
                (Some(x), Some(y)) => Expr::constant(x + y),
                (Some(x), None) if x == 0.0 => b,
                (None, Some(y)) if y == 0.0 => a,
                _ => Expr::Add(Box::new(a), Box::new(b)),
            }
        }
        Expr::Mul(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (constant_value(&a), constant_value(&b)) {
                (Some(x), Some(y)) => Expr::constant(x * y),
                (Some(x), None) if x == 1.0 => b,
                (None, Some(y)) if y == 1.0 => a,
                // Folding a zero product requires the surviving constant to
                // have the shape of the product, i.e. scalar
                (Some(x), None) if x == 0.0 && b.shape().is_scalar() => Expr::constant(0.0),
                (None, Some(y)) if y == 0.0 && a.shape().is_scalar() => Expr::constant(0.0),
                _ => Expr::Mul(Box::new(a), Box::new(b)),
            }
        }
        Expr::Quotient(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (constant_value(&a), constant_value(&b)) {
                (Some(x), Some(y)) if y != 0.0 => Expr::constant(x / y),
                (None, Some(y)) if y == 1.0 => a,
                _ => Expr::Quotient(Box::new(a), Box::new(b)),
            }
        }
        Expr::Inner(a, b) => Expr::Inner(Box::new(simplify(a)), Box::new(simplify(b))),
        Expr::Dot(a, b) => Expr::Dot(Box::new(simplify(a)), Box::new(simplify(b))),
        Expr::Outer(a, b) => Expr::Outer(Box::new(simplify(a)), Box::new(simplify(b))),
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Parenthesize sums when they appear as factors
        fn factor(e: &Expr) -> String {
            match e {
                Expr::Add(_, _) | Expr::Neg(_) => format!("({})", e),
                _ => format!("{}", e),
            }
        }
        match self {
            Expr::Argument(arg) => match arg.kind {
                ArgumentKind::Test => write!(f, "v"),
                ArgumentKind::Trial => write!(f, "u"),
            },
            Expr::Coefficient(coefficient) => write!(f, "{}", coefficient.name),
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::FacetNormal { .. } => write!(f, "n"),
            Expr::Grad(e) => write!(f, "grad({})", e),
            Expr::Div(e) => write!(f, "div({})", e),
            Expr::Curl(e) => write!(f, "curl({})", e),
            Expr::Neg(e) => write!(f, "-{}", factor(e)),
            Expr::Add(a, b) => write!(f, "{} + {}", a, b),
            Expr::Mul(a, b) => write!(f, "{} * {}", factor(a), factor(b)),
            Expr::Quotient(a, b) => write!(f, "{} / {}", factor(a), factor(b)),
            Expr::Inner(a, b) => write!(f, "inner({}, {})", a, b),
            Expr::Dot(a, b) => write!(f, "dot({}, {})", a, b),
            Expr::Outer(a, b) => write!(f, "outer({}, {})", a, b),
        }
    }
}
