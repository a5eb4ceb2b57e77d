//! Quadrature rules for simplex reference domains.
//!
//! Rules for the unit triangle and unit tetrahedron are constructed by
//! collapsing tensor-product Gauss rules through the Duffy substitution.
//! For the triangle the substitution is
//!
//! ```text
//! (u, v) -> (x, y) = (u, v (1 - u)),    dx dy = (1 - u) du dv,
//! ```
//!
//! which maps the unit square onto the unit triangle. A polynomial of total
//! degree `d` pulls back to a polynomial of degree at most `d + 1` in `u`
//! (the extra power comes from the area factor) and `d` in `v`, so choosing
//! the per-axis Gauss point counts accordingly preserves exactness. The
//! tetrahedral rule applies the same substitution twice.
//!
//! Collapsed rules use slightly more points than the best known symmetric
//! rules of the same strength, but they exist for every degree and are fully
//! deterministic, which is what the form compiler needs when it embeds rule
//! data in generated code.

use crate::univariate::gauss_unit;
use crate::Rule;

fn axis_points(required_degree: usize) -> usize {
    // An n-point Gauss rule is exact for 1D degree 2n - 1
    required_degree / 2 + 1
}

/// A collapsed Gauss rule for the unit triangle, exact for polynomials of
/// total degree up to `degree`.
pub fn triangle_collapsed(degree: usize) -> Rule<2> {
    let (weights_u, points_u) = gauss_unit(axis_points(degree + 1));
    let (weights_v, points_v) = gauss_unit(axis_points(degree));

    let mut weights = Vec::with_capacity(weights_u.len() * weights_v.len());
    let mut points = Vec::with_capacity(weights_u.len() * weights_v.len());

    for (&wu, &[u]) in weights_u.iter().zip(&points_u) {
        for (&wv, &[v]) in weights_v.iter().zip(&points_v) {
            weights.push(wu * wv * (1.0 - u));
            points.push([u, v * (1.0 - u)]);
        }
    }

    (weights, points)
}

/// A collapsed Gauss rule for the unit tetrahedron, exact for polynomials of
/// total degree up to `degree`.
pub fn tetrahedron_collapsed(degree: usize) -> Rule<3> {
    let (weights_u, points_u) = gauss_unit(axis_points(degree + 2));
    let (weights_v, points_v) = gauss_unit(axis_points(degree + 1));
    let (weights_w, points_w) = gauss_unit(axis_points(degree));

    let num_points = weights_u.len() * weights_v.len() * weights_w.len();
    let mut weights = Vec::with_capacity(num_points);
    let mut points = Vec::with_capacity(num_points);

    for (&wu, &[u]) in weights_u.iter().zip(&points_u) {
        for (&wv, &[v]) in weights_v.iter().zip(&points_v) {
            for (&ww, &[w]) in weights_w.iter().zip(&points_w) {
                let jacobian = (1.0 - u) * (1.0 - u) * (1.0 - v);
                weights.push(wu * wv * ww * jacobian);
                points.push([u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)]);
            }
        }
    }

    (weights, points)
}
