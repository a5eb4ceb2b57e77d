//! Quadrature rules for finite element reference domains.
//!
//! The main purpose of this crate is to support the `skald` form compiler,
//! which integrates products of reference-cell basis functions exactly when
//! it precomputes reference tensors. However, the rules here have no
//! dependence on the rest of `skald` and may be used independently.
//!
//! All rules are stated on the *unit* reference domains:
//!
//! - interval `[0, 1]`,
//! - triangle with vertices `(0, 0)`, `(1, 0)`, `(0, 1)`,
//! - quadrilateral `[0, 1]^2`,
//! - tetrahedron with vertices `(0, 0, 0)`, `(1, 0, 0)`, `(0, 1, 0)`, `(0, 0, 1)`,
//! - hexahedron `[0, 1]^3`.
//!
//! Every rule constructor is deterministic: for the same input it produces
//! the exact same sequence of weights and points on every call. Reproducible
//! output is part of the crate's contract, since generated code embeds these
//! numbers verbatim.

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional quadrature rule: weights and the associated points.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional quadrature rule.
pub type Rule3d = Rule<3>;

/// Approximates the integral of the given function with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    assert_eq!(
        weights.len(),
        points.len(),
        "Number of weights and points in rule must be equal"
    );
    weights.iter().zip(points).map(|(w, p)| w * f(p)).sum()
}

/// Returns a rule for the unit interval that exactly integrates polynomials
/// up to the given total degree.
pub fn interval(degree: usize) -> Rule1d {
    univariate::gauss_unit(num_points_for_degree(degree))
}

/// Returns a rule for the unit triangle that exactly integrates polynomials
/// up to the given total degree.
pub fn triangle(degree: usize) -> Rule2d {
    simplex::triangle_collapsed(degree)
}

/// Returns a rule for the unit quadrilateral that exactly integrates
/// polynomials up to the given *per-dimension* degree.
pub fn quadrilateral(degree: usize) -> Rule2d {
    tensor::quadrilateral_gauss(num_points_for_degree(degree))
}

/// Returns a rule for the unit tetrahedron that exactly integrates
/// polynomials up to the given total degree.
pub fn tetrahedron(degree: usize) -> Rule3d {
    simplex::tetrahedron_collapsed(degree)
}

/// Returns a rule for the unit hexahedron that exactly integrates
/// polynomials up to the given *per-dimension* degree.
pub fn hexahedron(degree: usize) -> Rule3d {
    tensor::hexahedron_gauss(num_points_for_degree(degree))
}

/// The number of Gauss points needed to exactly integrate one-dimensional
/// polynomials of the given degree.
pub(crate) fn num_points_for_degree(degree: usize) -> usize {
    // An n-point Gauss rule is exact for degree 2n - 1
    degree / 2 + 1
}
