//! Lagrange basis functions on the unit interval.
//!
//! Node ordering follows the simplex convention: the two endpoints first,
//! then interior nodes from left to right.

use crate::Real;
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_basis<T>(degree: usize, x: T) -> DVector<T>
where
    T: Real,
{
    let l = [1.0 - x, x];
    match degree {
        1 => DVector::from_column_slice(&[l[0], l[1]]),
        2 => DVector::from_column_slice(&[
            l[0] * (2.0 * l[0] - 1.0),
            l[1] * (2.0 * l[1] - 1.0),
            4.0 * l[0] * l[1],
        ]),
        3 => DVector::from_column_slice(&[
            0.5 * l[0] * (3.0 * l[0] - 1.0) * (3.0 * l[0] - 2.0),
            0.5 * l[1] * (3.0 * l[1] - 1.0) * (3.0 * l[1] - 2.0),
            4.5 * l[0] * l[1] * (3.0 * l[0] - 1.0),
            4.5 * l[0] * l[1] * (3.0 * l[1] - 1.0),
        ]),
        _ => panic!("unsupported interval basis degree {}", degree),
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_basis_gradients<T>(degree: usize, x: T) -> DMatrix<T>
where
    T: Real,
{
    let l = [1.0 - x, x];
    // Derivatives with respect to x; dl0/dx = -1, dl1/dx = 1
    let derivatives: Vec<T> = match degree {
        1 => vec![-1.0, 1.0],
        2 => vec![
            -(4.0 * l[0] - 1.0),
            4.0 * l[1] - 1.0,
            4.0 * (l[0] - l[1]),
        ],
        3 => {
            let vertex = |i: usize| 0.5 * (27.0 * l[i] * l[i] - 18.0 * l[i] + 2.0);
            let edge = |i: usize, j: usize| {
                // d/dl_i and d/dl_j of 4.5 l_i l_j (3 l_i - 1)
                (4.5 * l[j] * (6.0 * l[i] - 1.0), 4.5 * l[i] * (3.0 * l[i] - 1.0))
            };
            let (e0_i, e0_j) = edge(0, 1);
            let (e1_i, e1_j) = edge(1, 0);
            vec![
                -vertex(0),
                vertex(1),
                -e0_i + e0_j,
                e1_i - e1_j,
            ]
        }
        _ => panic!("unsupported interval basis degree {}", degree),
    };
    DMatrix::from_row_slice(1, derivatives.len(), &derivatives)
}

pub fn reference_nodes(degree: usize) -> Vec<DVector<f64>> {
    let node = |x: f64| DVector::from_column_slice(&[x]);
    match degree {
        1 => vec![node(0.0), node(1.0)],
        2 => vec![node(0.0), node(1.0), node(0.5)],
        3 => vec![node(0.0), node(1.0), node(1.0 / 3.0), node(2.0 / 3.0)],
        _ => panic!("unsupported interval basis degree {}", degree),
    }
}
