//! Per-cell geometry: the map from the reference cell to a physical cell.
//!
//! The geometry map is interpolated with the degree-1 basis of the cell, so
//! it is affine for simplices and multilinear for tensor-product cells. The
//! compiler evaluates these maps when it precomputes reference tensors and
//! when representation plans are evaluated in-memory; generated code
//! performs the same computations from raw vertex coordinates.

use crate::element::{ElementDescriptor, ElementFamily, ReferenceCell};
use eyre::eyre;
use nalgebra::{DMatrix, DVector};

/// The Jacobian of the geometry map at a point, together with its inverse
/// and determinant.
#[derive(Debug, Clone)]
pub struct JacobianData {
    pub matrix: DMatrix<f64>,
    pub inverse: DMatrix<f64>,
    pub determinant: f64,
}

impl JacobianData {
    /// Transforms a reference gradient (one column per basis function) to
    /// physical gradients through K^T, where K is the Jacobian inverse.
    pub fn physical_gradients(&self, reference_gradients: &DMatrix<f64>) -> DMatrix<f64> {
        self.inverse.transpose() * reference_gradients
    }
}

/// The coordinates of one physical cell, column per vertex, in the vertex
/// order of the reference cell.
#[derive(Debug, Clone)]
pub struct CellGeometry {
    cell: ReferenceCell,
    coordinates: DMatrix<f64>,
}

impl CellGeometry {
    /// Creates a cell geometry from a coordinate matrix with one column per
    /// vertex.
    ///
    /// # Panics
    ///
    /// Panics if the matrix dimensions do not match the cell.
    pub fn new(cell: ReferenceCell, coordinates: DMatrix<f64>) -> Self {
        assert_eq!(coordinates.nrows(), cell.dimension(), "Coordinate dimension mismatch");
        assert_eq!(coordinates.ncols(), cell.num_vertices(), "Vertex count mismatch");
        Self { cell, coordinates }
    }

    /// Creates a cell geometry from vertex coordinate slices.
    pub fn from_vertices(cell: ReferenceCell, vertices: &[&[f64]]) -> Self {
        assert_eq!(vertices.len(), cell.num_vertices(), "Vertex count mismatch");
        let dim = cell.dimension();
        let mut coordinates = DMatrix::zeros(dim, vertices.len());
        for (j, vertex) in vertices.iter().enumerate() {
            assert_eq!(vertex.len(), dim, "Coordinate dimension mismatch");
            for i in 0..dim {
                coordinates[(i, j)] = vertex[i];
            }
        }
        Self { cell, coordinates }
    }

    /// The geometry of the reference cell itself (the identity map).
    pub fn reference(cell: ReferenceCell) -> Self {
        let vertices = cell.vertices();
        let dim = cell.dimension();
        let mut coordinates = DMatrix::zeros(dim, vertices.len());
        for (j, vertex) in vertices.iter().enumerate() {
            coordinates.column_mut(j).copy_from(vertex);
        }
        Self { cell, coordinates }
    }

    pub fn cell(&self) -> ReferenceCell {
        self.cell
    }

    pub fn coordinates(&self) -> &DMatrix<f64> {
        &self.coordinates
    }

    fn geometry_element(&self) -> ElementDescriptor {
        ElementDescriptor::scalar(ElementFamily::Lagrange, self.cell, 1)
            .expect("Degree-1 geometry element exists for every cell")
    }

    /// Maps reference coordinates to physical coordinates.
    pub fn map_point(&self, xi: &[f64]) -> DVector<f64> {
        let basis = self.geometry_element().evaluate_reference_basis(xi);
        &self.coordinates * basis
    }

    /// The Jacobian of the geometry map at the given reference point. For
    /// simplex cells the Jacobian is constant.
    pub fn jacobian_at(&self, xi: &[f64]) -> DMatrix<f64> {
        let gradients = self.geometry_element().evaluate_reference_basis_gradients(xi);
        &self.coordinates * gradients.transpose()
    }

    /// The Jacobian together with its inverse and determinant at the given
    /// reference point. Fails if the map is degenerate there.
    pub fn jacobian_data_at(&self, xi: &[f64]) -> eyre::Result<JacobianData> {
        let matrix = self.jacobian_at(xi);
        let determinant = matrix.determinant();
        let inverse = matrix
            .clone()
            .try_inverse()
            .ok_or_else(|| eyre!("geometry map is degenerate (singular Jacobian)"))?;
        Ok(JacobianData {
            matrix,
            inverse,
            determinant,
        })
    }

    /// The constant Jacobian data of an affine (simplex) cell.
    pub fn affine_jacobian_data(&self) -> eyre::Result<JacobianData> {
        debug_assert!(self.cell.is_simplex());
        let origin = vec![0.0; self.cell.dimension()];
        self.jacobian_data_at(&origin)
    }

    /// The outward unit normal and the facet volume scale at a reference
    /// point of the cell lying on the given facet.
    ///
    /// The scale is the ratio between the physical surface measure and the
    /// parameter measure of the facet reference cell: with `E` the facet
    /// embedding tangents and `G = J E`, the scale is `sqrt(det(G^T G))`.
    /// The normal direction follows Nanson's formula,
    /// `n ds = det(J) J^{-T} n_ref ds_ref`. For interval cells (point
    /// facets) the scale is one and only the sign of the normal matters.
    pub fn facet_normal_and_scale(
        &self,
        facet: usize,
        xi: &[f64],
    ) -> eyre::Result<(DVector<f64>, f64)> {
        let jacobian = self.jacobian_data_at(xi)?;
        let reference_normal = self.cell.facet_reference_normal(facet);
        let cofactor = jacobian.determinant * (jacobian.inverse.transpose() * reference_normal);
        let direction_norm = cofactor.norm();
        if direction_norm == 0.0 {
            return Err(eyre!("geometry map collapses facet {}", facet));
        }
        if self.cell.dimension() == 1 {
            // Point facets carry no measure; only the direction matters
            let normal = DVector::from_column_slice(&[cofactor[0].signum()]);
            return Ok((normal, 1.0));
        }
        let embedding = FacetEmbedding::new(self.cell, facet);
        let tangent_map = &jacobian.matrix * embedding.tangents();
        let metric = tangent_map.transpose() * &tangent_map;
        let scale = metric.determinant().sqrt();
        Ok((&cofactor / direction_norm, scale))
    }
}

/// The affine embedding of a facet's reference cell into the reference
/// coordinates of its parent cell.
#[derive(Debug, Clone)]
pub struct FacetEmbedding {
    origin: DVector<f64>,
    tangents: DMatrix<f64>,
}

impl FacetEmbedding {
    pub fn new(cell: ReferenceCell, facet: usize) -> Self {
        let vertices = cell.vertices();
        let facet_vertices = cell.facet_vertex_indices(facet);
        let dim = cell.dimension();
        let facet_dim = dim - 1;
        let origin = vertices[facet_vertices[0]].clone();
        let mut tangents = DMatrix::zeros(dim, facet_dim);
        // For affine embeddings the tangent vectors are spanned by the
        // first facet_dim + 1 vertices of the facet
        for k in 0..facet_dim {
            let delta = &vertices[facet_vertices[k + 1]] - &origin;
            tangents.column_mut(k).copy_from(&delta);
        }
        Self { origin, tangents }
    }

    /// Maps facet reference coordinates to cell reference coordinates.
    pub fn map(&self, eta: &[f64]) -> DVector<f64> {
        let eta = DVector::from_column_slice(eta);
        &self.origin + &self.tangents * eta
    }

    /// The tangent columns of the embedding.
    pub fn tangents(&self) -> &DMatrix<f64> {
        &self.tangents
    }
}
