//! Lagrange basis functions on the unit hexahedron.
//!
//! The basis is the tensor product of one-dimensional nodal Lagrange bases,
//! ordered lexicographically with x varying fastest, matching the
//! reference-cell vertex ordering at degree 1.

use crate::element::quadrilateral::{
    lagrange_basis_1d, lagrange_basis_1d_derivatives, lagrange_nodes_1d,
};
use crate::Real;
use nalgebra::{DMatrix, DVector};

pub fn evaluate_basis<T>(degree: usize, xi: &[T]) -> DVector<T>
where
    T: Real,
{
    let lx = lagrange_basis_1d(degree, xi[0]);
    let ly = lagrange_basis_1d(degree, xi[1]);
    let lz = lagrange_basis_1d(degree, xi[2]);
    let n = degree + 1;
    let mut values = Vec::with_capacity(n * n * n);
    for iz in 0..n {
        for iy in 0..n {
            for ix in 0..n {
                values.push(lx[ix] * ly[iy] * lz[iz]);
            }
        }
    }
    DVector::from_vec(values)
}

pub fn evaluate_basis_gradients<T>(degree: usize, xi: &[T]) -> DMatrix<T>
where
    T: Real,
{
    let lx = lagrange_basis_1d(degree, xi[0]);
    let ly = lagrange_basis_1d(degree, xi[1]);
    let lz = lagrange_basis_1d(degree, xi[2]);
    let dx = lagrange_basis_1d_derivatives(degree, xi[0]);
    let dy = lagrange_basis_1d_derivatives(degree, xi[1]);
    let dz = lagrange_basis_1d_derivatives(degree, xi[2]);
    let n = degree + 1;
    let mut gradients = DMatrix::zeros(3, n * n * n);
    for iz in 0..n {
        for iy in 0..n {
            for ix in 0..n {
                let col = (iz * n + iy) * n + ix;
                gradients[(0, col)] = dx[ix] * ly[iy] * lz[iz];
                gradients[(1, col)] = lx[ix] * dy[iy] * lz[iz];
                gradients[(2, col)] = lx[ix] * ly[iy] * dz[iz];
            }
        }
    }
    gradients
}

pub fn reference_nodes(degree: usize) -> Vec<DVector<f64>> {
    let nodes_1d = lagrange_nodes_1d(degree);
    let n = nodes_1d.len();
    let mut nodes = Vec::with_capacity(n * n * n);
    for &z in &nodes_1d {
        for &y in &nodes_1d {
            for &x in &nodes_1d {
                nodes.push(DVector::from_column_slice(&[x, y, z]));
            }
        }
    }
    nodes
}
