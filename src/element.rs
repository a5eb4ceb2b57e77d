//! Finite element descriptors and reference-cell basis tabulation.
//!
//! An [`ElementDescriptor`] captures everything the compiler needs to know
//! about a finite element: its family, reference cell, polynomial degree and
//! value shape. The local dimension and the reference basis functions are
//! deterministic functions of these four fields; descriptors are immutable
//! once constructed and queried, never mutated, by the rest of the pipeline.
//!
//! Basis functions are evaluated in closed form by the per-cell submodules.
//! All bases are nodal (Lagrange) bases: basis function `i` is one at
//! reference node `i` and zero at every other node, which the rest of the
//! compiler relies on when it interpolates coefficient data.

use crate::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod hexahedron;
pub mod interval;
pub mod quadrilateral;
pub mod tetrahedron;
pub mod triangle;

/// The value shape of an expression or element: `[]` for scalars, `[d]` for
/// vectors, `[m, n]` for second-order tensors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn vector(dim: usize) -> Self {
        Shape(vec![dim])
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape(vec![rows, cols])
    }

    pub fn from_dims(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// The total number of scalar components, i.e. the product of all axis
    /// lengths. A scalar has one component.
    pub fn num_components(&self) -> usize {
        self.0.iter().product()
    }

    /// Enumerates all component multi-indices in row-major order.
    pub fn component_indices(&self) -> Vec<Vec<usize>> {
        let mut indices = vec![Vec::new()];
        for &axis_len in &self.0 {
            let mut next = Vec::with_capacity(indices.len() * axis_len);
            for index in &indices {
                for i in 0..axis_len {
                    let mut extended = index.clone();
                    extended.push(i);
                    next.push(extended);
                }
            }
            indices = next;
        }
        indices
    }

    /// Flattens a component multi-index to a linear component number
    /// (row-major).
    pub fn flatten_index(&self, index: &[usize]) -> usize {
        assert_eq!(index.len(), self.rank());
        let mut flat = 0;
        for (i, &axis_len) in index.iter().zip(&self.0) {
            flat = flat * axis_len + i;
        }
        flat
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (k, dim) in self.0.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, ")")
    }
}

/// The reference cells supported by the compiler.
///
/// Reference domains are the unit cells: the unit interval, the unit
/// triangle/tetrahedron and the unit square/cube. Vertices are ordered
/// lexicographically by coordinate, so that the degree-1 nodal ordering
/// coincides with the vertex ordering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReferenceCell {
    Interval,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl ReferenceCell {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Interval => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Interval => 2,
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
            Self::Tetrahedron => 4,
            Self::Hexahedron => 8,
        }
    }

    /// Whether the map from this reference cell to a physical cell with
    /// straight edges is affine. The tensor representation relies on this
    /// property.
    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Interval | Self::Triangle | Self::Tetrahedron)
    }

    /// The volume of the reference domain.
    pub fn reference_volume(&self) -> f64 {
        match self {
            Self::Interval | Self::Quadrilateral | Self::Hexahedron => 1.0,
            Self::Triangle => 0.5,
            Self::Tetrahedron => 1.0 / 6.0,
        }
    }

    pub fn vertices(&self) -> Vec<DVector<f64>> {
        let coords: &[&[f64]] = match self {
            Self::Interval => &[&[0.0], &[1.0]],
            Self::Triangle => &[&[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0]],
            Self::Quadrilateral => &[&[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]],
            Self::Tetrahedron => &[
                &[0.0, 0.0, 0.0],
                &[1.0, 0.0, 0.0],
                &[0.0, 1.0, 0.0],
                &[0.0, 0.0, 1.0],
            ],
            Self::Hexahedron => &[
                &[0.0, 0.0, 0.0],
                &[1.0, 0.0, 0.0],
                &[0.0, 1.0, 0.0],
                &[1.0, 1.0, 0.0],
                &[0.0, 0.0, 1.0],
                &[1.0, 0.0, 1.0],
                &[0.0, 1.0, 1.0],
                &[1.0, 1.0, 1.0],
            ],
        };
        coords.iter().map(|c| DVector::from_column_slice(c)).collect()
    }

    pub fn num_facets(&self) -> usize {
        match self {
            Self::Interval => 2,
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
            Self::Tetrahedron => 4,
            Self::Hexahedron => 6,
        }
    }

    /// The reference cell of each facet. `None` for the interval, whose
    /// facets are points.
    pub fn facet_cell(&self) -> Option<ReferenceCell> {
        match self {
            Self::Interval => None,
            Self::Triangle | Self::Quadrilateral => Some(Self::Interval),
            Self::Tetrahedron => Some(Self::Triangle),
            Self::Hexahedron => Some(Self::Quadrilateral),
        }
    }

    /// The vertex indices of the given facet.
    ///
    /// For simplices, facet `i` is the facet opposite vertex `i`. For
    /// tensor-product cells, facets are ordered by constrained axis value
    /// and then by axis; the vertices of each facet are ordered so that the
    /// embedding of the facet reference cell into this cell is affine.
    pub fn facet_vertex_indices(&self, facet: usize) -> &'static [usize] {
        const INTERVAL: [&[usize]; 2] = [&[0], &[1]];
        const TRIANGLE: [&[usize]; 3] = [&[1, 2], &[0, 2], &[0, 1]];
        const QUADRILATERAL: [&[usize]; 4] = [&[0, 1], &[2, 3], &[0, 2], &[1, 3]];
        const TETRAHEDRON: [&[usize]; 4] = [&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]];
        const HEXAHEDRON: [&[usize]; 6] = [
            &[0, 1, 2, 3],
            &[4, 5, 6, 7],
            &[0, 1, 4, 5],
            &[2, 3, 6, 7],
            &[0, 2, 4, 6],
            &[1, 3, 5, 7],
        ];
        match self {
            Self::Interval => INTERVAL[facet],
            Self::Triangle => TRIANGLE[facet],
            Self::Quadrilateral => QUADRILATERAL[facet],
            Self::Tetrahedron => TETRAHEDRON[facet],
            Self::Hexahedron => HEXAHEDRON[facet],
        }
    }

    /// The outward unit normal of the given facet, in reference coordinates.
    pub fn facet_reference_normal(&self, facet: usize) -> DVector<f64> {
        let sqrt2_inv = 1.0 / f64::sqrt(2.0);
        let sqrt3_inv = 1.0 / f64::sqrt(3.0);
        let normal: &[f64] = match (self, facet) {
            (Self::Interval, 0) => &[-1.0],
            (Self::Interval, 1) => &[1.0],
            (Self::Triangle, 0) => return DVector::from_column_slice(&[sqrt2_inv, sqrt2_inv]),
            (Self::Triangle, 1) => &[-1.0, 0.0],
            (Self::Triangle, 2) => &[0.0, -1.0],
            (Self::Quadrilateral, 0) => &[0.0, -1.0],
            (Self::Quadrilateral, 1) => &[0.0, 1.0],
            (Self::Quadrilateral, 2) => &[-1.0, 0.0],
            (Self::Quadrilateral, 3) => &[1.0, 0.0],
            (Self::Tetrahedron, 0) => {
                return DVector::from_column_slice(&[sqrt3_inv, sqrt3_inv, sqrt3_inv])
            }
            (Self::Tetrahedron, 1) => &[-1.0, 0.0, 0.0],
            (Self::Tetrahedron, 2) => &[0.0, -1.0, 0.0],
            (Self::Tetrahedron, 3) => &[0.0, 0.0, -1.0],
            (Self::Hexahedron, 0) => &[0.0, 0.0, -1.0],
            (Self::Hexahedron, 1) => &[0.0, 0.0, 1.0],
            (Self::Hexahedron, 2) => &[0.0, -1.0, 0.0],
            (Self::Hexahedron, 3) => &[0.0, 1.0, 0.0],
            (Self::Hexahedron, 4) => &[-1.0, 0.0, 0.0],
            (Self::Hexahedron, 5) => &[1.0, 0.0, 0.0],
            _ => panic!("facet index {} out of bounds for {}", facet, self),
        };
        DVector::from_column_slice(normal)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Triangle => "triangle",
            Self::Quadrilateral => "quadrilateral",
            Self::Tetrahedron => "tetrahedron",
            Self::Hexahedron => "hexahedron",
        }
    }
}

impl Display for ReferenceCell {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Element families supported by the compiler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementFamily {
    /// Continuous nodal Lagrange elements.
    Lagrange,
    /// Element-wise discontinuous Lagrange elements. Degree 0 (piecewise
    /// constants) is permitted for this family only.
    DiscontinuousLagrange,
}

impl Display for ElementFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lagrange => write!(f, "Lagrange"),
            Self::DiscontinuousLagrange => write!(f, "Discontinuous Lagrange"),
        }
    }
}

/// Errors produced when constructing element descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ElementError {
    /// The (family, cell, degree) combination is not supported.
    Unsupported {
        family: ElementFamily,
        cell: ReferenceCell,
        degree: usize,
    },
}

impl Display for ElementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { family, cell, degree } => {
                write!(
                    f,
                    "unsupported element: {} of degree {} on {}",
                    family, degree, cell
                )
            }
        }
    }
}

impl std::error::Error for ElementError {}

/// A description of a finite element: family, reference cell, polynomial
/// degree and value shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementDescriptor {
    family: ElementFamily,
    cell: ReferenceCell,
    degree: usize,
    value_shape: Shape,
}

impl ElementDescriptor {
    /// Constructs a scalar-valued element.
    pub fn scalar(
        family: ElementFamily,
        cell: ReferenceCell,
        degree: usize,
    ) -> Result<Self, ElementError> {
        Self::with_value_shape(family, cell, degree, Shape::scalar())
    }

    /// Constructs a vector-valued element with one component per spatial
    /// dimension of the cell.
    pub fn vector(
        family: ElementFamily,
        cell: ReferenceCell,
        degree: usize,
    ) -> Result<Self, ElementError> {
        let shape = Shape::vector(cell.dimension());
        Self::with_value_shape(family, cell, degree, shape)
    }

    /// Constructs an element with an explicit value shape. Each component is
    /// a copy of the scalar element; the local basis is blocked by
    /// component.
    pub fn with_value_shape(
        family: ElementFamily,
        cell: ReferenceCell,
        degree: usize,
        value_shape: Shape,
    ) -> Result<Self, ElementError> {
        let max_degree = match cell {
            ReferenceCell::Interval | ReferenceCell::Triangle | ReferenceCell::Tetrahedron => 3,
            ReferenceCell::Quadrilateral | ReferenceCell::Hexahedron => 2,
        };
        let min_degree = match family {
            ElementFamily::Lagrange => 1,
            ElementFamily::DiscontinuousLagrange => 0,
        };
        if degree < min_degree || degree > max_degree {
            return Err(ElementError::Unsupported { family, cell, degree });
        }
        Ok(Self {
            family,
            cell,
            degree,
            value_shape,
        })
    }

    pub fn family(&self) -> ElementFamily {
        self.family
    }

    pub fn cell(&self) -> ReferenceCell {
        self.cell
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn value_shape(&self) -> &Shape {
        &self.value_shape
    }

    pub fn num_components(&self) -> usize {
        self.value_shape.num_components()
    }

    /// The number of scalar basis functions of a single component.
    pub fn scalar_dimension(&self) -> usize {
        if self.degree == 0 {
            return 1;
        }
        let d = self.degree;
        match self.cell {
            ReferenceCell::Interval => d + 1,
            ReferenceCell::Triangle => (d + 1) * (d + 2) / 2,
            ReferenceCell::Quadrilateral => (d + 1) * (d + 1),
            ReferenceCell::Tetrahedron => (d + 1) * (d + 2) * (d + 3) / 6,
            ReferenceCell::Hexahedron => (d + 1) * (d + 1) * (d + 1),
        }
    }

    /// The total number of local degrees of freedom. Vector and tensor
    /// elements are blocked by component: local basis function
    /// `I = c * n + i` is the scalar basis function `i` placed in
    /// component `c`, where `n` is [`Self::scalar_dimension`].
    pub fn local_dimension(&self) -> usize {
        self.num_components() * self.scalar_dimension()
    }

    /// Splits a local basis index into (component, scalar basis index).
    pub fn split_local_index(&self, index: usize) -> (usize, usize) {
        let n = self.scalar_dimension();
        (index / n, index % n)
    }

    /// Evaluates all scalar basis functions at the given reference point.
    pub fn evaluate_reference_basis<T>(&self, xi: &[T]) -> DVector<T>
    where
        T: Real,
    {
        assert_eq!(xi.len(), self.cell.dimension());
        if self.degree == 0 {
            return DVector::from_element(1, T::one());
        }
        match self.cell {
            ReferenceCell::Interval => interval::evaluate_basis(self.degree, xi[0]),
            ReferenceCell::Triangle => triangle::evaluate_basis(self.degree, xi),
            ReferenceCell::Quadrilateral => quadrilateral::evaluate_basis(self.degree, xi),
            ReferenceCell::Tetrahedron => tetrahedron::evaluate_basis(self.degree, xi),
            ReferenceCell::Hexahedron => hexahedron::evaluate_basis(self.degree, xi),
        }
    }

    /// Evaluates the reference-coordinate gradients of all scalar basis
    /// functions at the given reference point. The result has one column
    /// per basis function and one row per reference coordinate.
    pub fn evaluate_reference_basis_gradients<T>(&self, xi: &[T]) -> DMatrix<T>
    where
        T: Real,
    {
        assert_eq!(xi.len(), self.cell.dimension());
        if self.degree == 0 {
            return DMatrix::zeros(self.cell.dimension(), 1);
        }
        match self.cell {
            ReferenceCell::Interval => interval::evaluate_basis_gradients(self.degree, xi[0]),
            ReferenceCell::Triangle => triangle::evaluate_basis_gradients(self.degree, xi),
            ReferenceCell::Quadrilateral => quadrilateral::evaluate_basis_gradients(self.degree, xi),
            ReferenceCell::Tetrahedron => tetrahedron::evaluate_basis_gradients(self.degree, xi),
            ReferenceCell::Hexahedron => hexahedron::evaluate_basis_gradients(self.degree, xi),
        }
    }

    /// The reference nodes of the scalar basis, in basis-function order.
    /// Basis function `i` is one at node `i` and zero at the others.
    pub fn reference_nodes(&self) -> Vec<DVector<f64>> {
        if self.degree == 0 {
            // The single piecewise-constant dof sits at the cell midpoint
            let vertices = self.cell.vertices();
            let dim = self.cell.dimension();
            let mut midpoint = DVector::zeros(dim);
            for v in &vertices {
                midpoint += v;
            }
            midpoint /= vertices.len() as f64;
            return vec![midpoint];
        }
        match self.cell {
            ReferenceCell::Interval => interval::reference_nodes(self.degree),
            ReferenceCell::Triangle => triangle::reference_nodes(self.degree),
            ReferenceCell::Quadrilateral => quadrilateral::reference_nodes(self.degree),
            ReferenceCell::Tetrahedron => tetrahedron::reference_nodes(self.degree),
            ReferenceCell::Hexahedron => hexahedron::reference_nodes(self.degree),
        }
    }
}

impl Display for ElementDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.value_shape.is_scalar() {
            write!(f, "{} degree {} on {}", self.family, self.degree, self.cell)
        } else {
            write!(
                f,
                "{} degree {} on {} with value shape {}",
                self.family, self.degree, self.cell, self.value_shape
            )
        }
    }
}
