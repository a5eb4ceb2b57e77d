//! Lagrange basis functions on the unit quadrilateral.
//!
//! The basis is the tensor product of one-dimensional nodal Lagrange bases
//! at equispaced nodes. Nodes are ordered lexicographically by coordinate
//! with x varying fastest, so the degree-1 ordering coincides with the
//! reference-cell vertex ordering.

use crate::Real;
use nalgebra::{DMatrix, DVector};

/// Values of the equispaced 1D nodal Lagrange basis of the given degree.
pub(crate) fn lagrange_basis_1d<T>(degree: usize, x: T) -> Vec<T>
where
    T: Real,
{
    let node = |i: usize| T::from_f64(i as f64 / degree as f64).expect("Node must fit in T");
    (0..=degree)
        .map(|i| {
            let mut value = T::one();
            for j in (0..=degree).filter(|&j| j != i) {
                value *= (x - node(j)) / (node(i) - node(j));
            }
            value
        })
        .collect()
}

/// Derivatives of the equispaced 1D nodal Lagrange basis of the given degree.
pub(crate) fn lagrange_basis_1d_derivatives<T>(degree: usize, x: T) -> Vec<T>
where
    T: Real,
{
    let node = |i: usize| T::from_f64(i as f64 / degree as f64).expect("Node must fit in T");
    (0..=degree)
        .map(|i| {
            let mut derivative = T::zero();
            for k in (0..=degree).filter(|&k| k != i) {
                let mut term = T::one() / (node(i) - node(k));
                for j in (0..=degree).filter(|&j| j != i && j != k) {
                    term *= (x - node(j)) / (node(i) - node(j));
                }
                derivative += term;
            }
            derivative
        })
        .collect()
}

pub(crate) fn lagrange_nodes_1d(degree: usize) -> Vec<f64> {
    (0..=degree).map(|i| i as f64 / degree as f64).collect()
}

pub fn evaluate_basis<T>(degree: usize, xi: &[T]) -> DVector<T>
where
    T: Real,
{
    let lx = lagrange_basis_1d(degree, xi[0]);
    let ly = lagrange_basis_1d(degree, xi[1]);
    let n = degree + 1;
    let mut values = Vec::with_capacity(n * n);
    for iy in 0..n {
        for ix in 0..n {
            values.push(lx[ix] * ly[iy]);
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
    let dx = lagrange_basis_1d_derivatives(degree, xi[0]);
    let dy = lagrange_basis_1d_derivatives(degree, xi[1]);
    let n = degree + 1;
    let mut gradients = DMatrix::zeros(2, n * n);
    for iy in 0..n {
        for ix in 0..n {
            let col = iy * n + ix;
            gradients[(0, col)] = dx[ix] * ly[iy];
            gradients[(1, col)] = lx[ix] * dy[iy];
        }
    }
    gradients
}

pub fn reference_nodes(degree: usize) -> Vec<DVector<f64>> {
    let nodes_1d = lagrange_nodes_1d(degree);
    let mut nodes = Vec::with_capacity(nodes_1d.len() * nodes_1d.len());
    for &y in &nodes_1d {
        for &x in &nodes_1d {
            nodes.push(DVector::from_column_slice(&[x, y]));
        }
    }
    nodes
}
