//! Quadrature rule selection for reference cells.
//!
//! [`reference_rule`] returns, for a (cell, degree) pair, a deterministic
//! rule that integrates polynomials up to the requested total degree
//! exactly on the unit reference cell. Rules are pure functions of their
//! key and are memoized in a process-wide table; for a given key the same
//! weights and points are returned on every call, which the determinism of
//! generated output relies on.
//!
//! The raw rules come from the `skald-quadrature` crate; this module
//! converts them to `nalgebra` points and derives facet rules by mapping
//! the facet cell's rule through the facet embedding.

use crate::element::ReferenceCell;
use crate::geometry::FacetEmbedding;
use nalgebra::DVector;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// A quadrature rule: weights and points on a reference domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub weights: Vec<f64>,
    pub points: Vec<DVector<f64>>,
}

impl Rule {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn from_raw<const D: usize>((weights, points): skald_quadrature::Rule<D>) -> Self {
        let points = points
            .into_iter()
            .map(|p| DVector::from_column_slice(&p))
            .collect();
        Self { weights, points }
    }
}

fn rule_cache() -> &'static Mutex<FxHashMap<(ReferenceCell, usize), Rule>> {
    static CACHE: OnceLock<Mutex<FxHashMap<(ReferenceCell, usize), Rule>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(FxHashMap::default()))
}

fn compute_reference_rule(cell: ReferenceCell, degree: usize) -> Rule {
    match cell {
        ReferenceCell::Interval => Rule::from_raw(skald_quadrature::interval(degree)),
        ReferenceCell::Triangle => Rule::from_raw(skald_quadrature::triangle(degree)),
        ReferenceCell::Quadrilateral => Rule::from_raw(skald_quadrature::quadrilateral(degree)),
        ReferenceCell::Tetrahedron => Rule::from_raw(skald_quadrature::tetrahedron(degree)),
        ReferenceCell::Hexahedron => Rule::from_raw(skald_quadrature::hexahedron(degree)),
    }
}

/// Returns a rule that exactly integrates polynomials of total degree at
/// most `degree` on the unit reference cell. Stable across calls for a
/// given (cell, degree) pair.
pub fn reference_rule(cell: ReferenceCell, degree: usize) -> Rule {
    let mut cache = rule_cache().lock();
    cache
        .entry((cell, degree))
        .or_insert_with(|| compute_reference_rule(cell, degree))
        .clone()
}

/// Returns a rule for integration over one facet of a cell.
///
/// The weights are those of the facet reference cell's rule; the points
/// are expressed in the *cell's* reference coordinates through the facet
/// embedding. The physical surface scale is applied at evaluation time.
/// For interval cells the facets are points: the rule is a single point
/// with unit weight.
pub fn facet_rule(cell: ReferenceCell, facet: usize, degree: usize) -> Rule {
    match cell.facet_cell() {
        None => {
            // Point evaluation at the facet vertex
            let vertex_index = cell.facet_vertex_indices(facet)[0];
            let point = cell.vertices()[vertex_index].clone();
            Rule {
                weights: vec![1.0],
                points: vec![point],
            }
        }
        Some(facet_cell) => {
            let facet_rule = reference_rule(facet_cell, degree);
            let embedding = FacetEmbedding::new(cell, facet);
            let points = facet_rule
                .points
                .iter()
                .map(|eta| embedding.map(eta.as_slice()))
                .collect();
            Rule {
                weights: facet_rule.weights,
                points,
            }
        }
    }
}
