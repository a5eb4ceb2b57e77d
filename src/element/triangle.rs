//! Lagrange basis functions on the unit triangle.
//!
//! The reference triangle has vertices (0, 0), (1, 0), (0, 1). Basis
//! functions are expressed through the barycentric coordinates
//! `l0 = 1 - x - y`, `l1 = x`, `l2 = y`, whose reference gradients are
//! constant. Node ordering: vertices first, then edge nodes in facet order
//! ((1,2), (0,2), (0,1)), then interior nodes.

use crate::Real;
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_basis<T>(degree: usize, xi: &[T]) -> DVector<T>
where
    T: Real,
{
    let (x, y) = (xi[0], xi[1]);
    let l = [1.0 - x - y, x, y];
    match degree {
        1 => DVector::from_column_slice(&[l[0], l[1], l[2]]),
        2 => {
            // Vertex functions followed by one midpoint function per edge,
            // edges in facet order (1,2), (0,2), (0,1)
            DVector::from_column_slice(&[
                l[0] * (2.0 * l[0] - 1.0),
                l[1] * (2.0 * l[1] - 1.0),
                l[2] * (2.0 * l[2] - 1.0),
                4.0 * l[1] * l[2],
                4.0 * l[0] * l[2],
                4.0 * l[0] * l[1],
            ])
        }
        3 => {
            let vertex = |i: usize| 0.5 * l[i] * (3.0 * l[i] - 1.0) * (3.0 * l[i] - 2.0);
            // Two nodes per edge (i, j): the first sits closer to vertex i
            let edge = |i: usize, j: usize| 4.5 * l[i] * l[j] * (3.0 * l[i] - 1.0);
            DVector::from_column_slice(&[
                vertex(0),
                vertex(1),
                vertex(2),
                edge(1, 2),
                edge(2, 1),
                edge(0, 2),
                edge(2, 0),
                edge(0, 1),
                edge(1, 0),
                27.0 * l[0] * l[1] * l[2],
            ])
        }
        _ => panic!("unsupported triangle basis degree {}", degree),
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_basis_gradients<T>(degree: usize, xi: &[T]) -> DMatrix<T>
where
    T: Real,
{
    let (x, y) = (xi[0], xi[1]);
    let l = [1.0 - x - y, x, y];
    // Reference gradients of the barycentric coordinates
    let dl = [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]];

    let columns: Vec<[T; 2]> = match degree {
        1 => dl.to_vec(),
        2 => {
            let vertex = |i: usize| {
                let s = 4.0 * l[i] - 1.0;
                [s * dl[i][0], s * dl[i][1]]
            };
            let edge = |i: usize, j: usize| {
                [
                    4.0 * (l[j] * dl[i][0] + l[i] * dl[j][0]),
                    4.0 * (l[j] * dl[i][1] + l[i] * dl[j][1]),
                ]
            };
            vec![
                vertex(0),
                vertex(1),
                vertex(2),
                edge(1, 2),
                edge(0, 2),
                edge(0, 1),
            ]
        }
        3 => {
            let vertex = |i: usize| {
                // d/dl of l (3l - 1) (3l - 2) / 2
                let s = 0.5 * (27.0 * l[i] * l[i] - 18.0 * l[i] + 2.0);
                [s * dl[i][0], s * dl[i][1]]
            };
            let edge = |i: usize, j: usize| {
                let di = 4.5 * l[j] * (6.0 * l[i] - 1.0);
                let dj = 4.5 * l[i] * (3.0 * l[i] - 1.0);
                [
                    di * dl[i][0] + dj * dl[j][0],
                    di * dl[i][1] + dj * dl[j][1],
                ]
            };
            let interior = {
                let d0 = 27.0 * l[1] * l[2];
                let d1 = 27.0 * l[0] * l[2];
                let d2 = 27.0 * l[0] * l[1];
                [
                    d0 * dl[0][0] + d1 * dl[1][0] + d2 * dl[2][0],
                    d0 * dl[0][1] + d1 * dl[1][1] + d2 * dl[2][1],
                ]
            };
            vec![
                vertex(0),
                vertex(1),
                vertex(2),
                edge(1, 2),
                edge(2, 1),
                edge(0, 2),
                edge(2, 0),
                edge(0, 1),
                edge(1, 0),
                interior,
            ]
        }
        _ => panic!("unsupported triangle basis degree {}", degree),
    };

    let mut gradients = DMatrix::zeros(2, columns.len());
    for (k, column) in columns.iter().enumerate() {
        gradients[(0, k)] = column[0];
        gradients[(1, k)] = column[1];
    }
    gradients
}

pub fn reference_nodes(degree: usize) -> Vec<DVector<f64>> {
    let node = |x: f64, y: f64| DVector::from_column_slice(&[x, y]);
    match degree {
        1 => vec![node(0.0, 0.0), node(1.0, 0.0), node(0.0, 1.0)],
        2 => vec![
            node(0.0, 0.0),
            node(1.0, 0.0),
            node(0.0, 1.0),
            node(0.5, 0.5),
            node(0.0, 0.5),
            node(0.5, 0.0),
        ],
        3 => {
            let third = 1.0 / 3.0;
            let two_thirds = 2.0 / 3.0;
            vec![
                node(0.0, 0.0),
                node(1.0, 0.0),
                node(0.0, 1.0),
                // Edge (1, 2), first node closer to vertex 1
                node(two_thirds, third),
                node(third, two_thirds),
                // Edge (0, 2)
                node(0.0, third),
                node(0.0, two_thirds),
                // Edge (0, 1)
                node(third, 0.0),
                node(two_thirds, 0.0),
                node(third, third),
            ]
        }
        _ => panic!("unsupported triangle basis degree {}", degree),
    }
}
