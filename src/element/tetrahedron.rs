//! Lagrange basis functions on the unit tetrahedron.
//!
//! The reference tetrahedron has vertices (0,0,0), (1,0,0), (0,1,0),
//! (0,0,1). Basis functions are expressed through the barycentric
//! coordinates `l0 = 1 - x - y - z`, `l1 = x`, `l2 = y`, `l3 = z`.
//! Node ordering: vertices, then edge nodes with edges in lexicographic
//! vertex-pair order, then face nodes in facet order.

use crate::Real;
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;

const EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
const FACES: [(usize, usize, usize); 4] = [(1, 2, 3), (0, 2, 3), (0, 1, 3), (0, 1, 2)];

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_basis<T>(degree: usize, xi: &[T]) -> DVector<T>
where
    T: Real,
{
    let (x, y, z) = (xi[0], xi[1], xi[2]);
    let l = [1.0 - x - y - z, x, y, z];
    match degree {
        1 => DVector::from_column_slice(&[l[0], l[1], l[2], l[3]]),
        2 => {
            let mut values = Vec::with_capacity(10);
            for i in 0..4 {
                values.push(l[i] * (2.0 * l[i] - 1.0));
            }
            for &(i, j) in &EDGES {
                values.push(4.0 * l[i] * l[j]);
            }
            DVector::from_vec(values)
        }
        3 => {
            let mut values = Vec::with_capacity(20);
            for i in 0..4 {
                values.push(0.5 * l[i] * (3.0 * l[i] - 1.0) * (3.0 * l[i] - 2.0));
            }
            for &(i, j) in &EDGES {
                values.push(4.5 * l[i] * l[j] * (3.0 * l[i] - 1.0));
                values.push(4.5 * l[i] * l[j] * (3.0 * l[j] - 1.0));
            }
            for &(i, j, k) in &FACES {
                values.push(27.0 * l[i] * l[j] * l[k]);
            }
            DVector::from_vec(values)
        }
        _ => panic!("unsupported tetrahedron basis degree {}", degree),
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_basis_gradients<T>(degree: usize, xi: &[T]) -> DMatrix<T>
where
    T: Real,
{
    let (x, y, z) = (xi[0], xi[1], xi[2]);
    let l = [1.0 - x - y - z, x, y, z];
    // Reference gradients of the barycentric coordinates
    let dl = [
        [-1.0, -1.0, -1.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ];
    // Accumulates sum_i (df/dl_i) grad l_i
    let combine = |terms: &[(usize, T)]| {
        let mut g = [T::zero(); 3];
        for &(i, df) in terms {
            for a in 0..3 {
                g[a] += df * dl[i][a];
            }
        }
        g
    };

    let columns: Vec<[T; 3]> = match degree {
        1 => dl.to_vec(),
        2 => {
            let mut columns = Vec::with_capacity(10);
            for i in 0..4 {
                columns.push(combine(&[(i, 4.0 * l[i] - 1.0)]));
            }
            for &(i, j) in &EDGES {
                columns.push(combine(&[(i, 4.0 * l[j]), (j, 4.0 * l[i])]));
            }
            columns
        }
        3 => {
            let mut columns = Vec::with_capacity(20);
            for i in 0..4 {
                let df = 0.5 * (27.0 * l[i] * l[i] - 18.0 * l[i] + 2.0);
                columns.push(combine(&[(i, df)]));
            }
            for &(i, j) in &EDGES {
                columns.push(combine(&[
                    (i, 4.5 * l[j] * (6.0 * l[i] - 1.0)),
                    (j, 4.5 * l[i] * (3.0 * l[i] - 1.0)),
                ]));
                columns.push(combine(&[
                    (i, 4.5 * l[j] * (3.0 * l[j] - 1.0)),
                    (j, 4.5 * l[i] * (6.0 * l[j] - 1.0)),
                ]));
            }
            for &(i, j, k) in &FACES {
                columns.push(combine(&[
                    (i, 27.0 * l[j] * l[k]),
                    (j, 27.0 * l[i] * l[k]),
                    (k, 27.0 * l[i] * l[j]),
                ]));
            }
            columns
        }
        _ => panic!("unsupported tetrahedron basis degree {}", degree),
    };

    let mut gradients = DMatrix::zeros(3, columns.len());
    for (col, column) in columns.iter().enumerate() {
        for row in 0..3 {
            gradients[(row, col)] = column[row];
        }
    }
    gradients
}

pub fn reference_nodes(degree: usize) -> Vec<DVector<f64>> {
    let vertices = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ];
    let blend = |coeffs: &[(usize, f64)]| {
        let mut p = [0.0; 3];
        for &(i, w) in coeffs {
            for a in 0..3 {
                p[a] += w * vertices[i][a];
            }
        }
        DVector::from_column_slice(&p)
    };
    match degree {
        1 => vertices.iter().map(|v| DVector::from_column_slice(v)).collect(),
        2 => {
            let mut nodes: Vec<_> = vertices.iter().map(|v| DVector::from_column_slice(v)).collect();
            for &(i, j) in &EDGES {
                nodes.push(blend(&[(i, 0.5), (j, 0.5)]));
            }
            nodes
        }
        3 => {
            let third = 1.0 / 3.0;
            let two_thirds = 2.0 / 3.0;
            let mut nodes: Vec<_> = vertices.iter().map(|v| DVector::from_column_slice(v)).collect();
            for &(i, j) in &EDGES {
                nodes.push(blend(&[(i, two_thirds), (j, third)]));
                nodes.push(blend(&[(i, third), (j, two_thirds)]));
            }
            for &(i, j, k) in &FACES {
                nodes.push(blend(&[(i, third), (j, third), (k, third)]));
            }
            nodes
        }
        _ => panic!("unsupported tetrahedron basis degree {}", degree),
    }
}
