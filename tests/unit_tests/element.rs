use matrixcompare::assert_scalar_eq;
use paste::paste;
use skald::element::{ElementDescriptor, ElementError, ElementFamily, ReferenceCell, Shape};
use skald::quadrature::reference_rule;

fn scalar_lagrange(cell: ReferenceCell, degree: usize) -> ElementDescriptor {
    ElementDescriptor::scalar(ElementFamily::Lagrange, cell, degree)
        .expect("Element is supported")
}

/// Interior sample points of a cell, taken from a quadrature rule so they
/// are deterministic.
fn sample_points(cell: ReferenceCell) -> Vec<Vec<f64>> {
    reference_rule(cell, 3)
        .points
        .iter()
        .map(|point| point.as_slice().to_vec())
        .collect()
}

macro_rules! nodal_basis_tests {
    ($name:ident, $cell:expr, $degree:expr) => {
        paste! {
            #[test]
            fn [<$name _basis_is_nodal>]() {
                let element = scalar_lagrange($cell, $degree);
                let nodes = element.reference_nodes();
                assert_eq!(nodes.len(), element.scalar_dimension());
                for (j, node) in nodes.iter().enumerate() {
                    let values = element.evaluate_reference_basis(node.as_slice());
                    for i in 0..element.scalar_dimension() {
                        let expected = if i == j { 1.0 } else { 0.0 };
                        assert_scalar_eq!(values[i], expected, comp = abs, tol = 1e-12);
                    }
                }
            }

            #[test]
            fn [<$name _basis_is_partition_of_unity>]() {
                let element = scalar_lagrange($cell, $degree);
                for point in sample_points($cell) {
                    let values = element.evaluate_reference_basis(point.as_slice());
                    let sum: f64 = values.iter().sum();
                    assert_scalar_eq!(sum, 1.0, comp = abs, tol = 1e-12);
                }
            }

            #[test]
            fn [<$name _gradients_match_finite_differences>]() {
                let element = scalar_lagrange($cell, $degree);
                let dim = $cell.dimension();
                let h = 1e-6;
                for point in sample_points($cell) {
                    let gradients = element.evaluate_reference_basis_gradients(point.as_slice());
                    for a in 0..dim {
                        let mut forward = point.clone();
                        let mut backward = point.clone();
                        forward[a] += h;
                        backward[a] -= h;
                        let values_forward = element.evaluate_reference_basis(forward.as_slice());
                        let values_backward = element.evaluate_reference_basis(backward.as_slice());
                        for i in 0..element.scalar_dimension() {
                            let estimated = (values_forward[i] - values_backward[i]) / (2.0 * h);
                            assert_scalar_eq!(gradients[(a, i)], estimated, comp = abs, tol = 1e-5);
                        }
                    }
                }
            }
        }
    };
}

nodal_basis_tests!(interval_p1, ReferenceCell::Interval, 1);
nodal_basis_tests!(interval_p2, ReferenceCell::Interval, 2);
nodal_basis_tests!(interval_p3, ReferenceCell::Interval, 3);
nodal_basis_tests!(triangle_p1, ReferenceCell::Triangle, 1);
nodal_basis_tests!(triangle_p2, ReferenceCell::Triangle, 2);
nodal_basis_tests!(triangle_p3, ReferenceCell::Triangle, 3);
nodal_basis_tests!(quadrilateral_q1, ReferenceCell::Quadrilateral, 1);
nodal_basis_tests!(quadrilateral_q2, ReferenceCell::Quadrilateral, 2);
nodal_basis_tests!(tetrahedron_p1, ReferenceCell::Tetrahedron, 1);
nodal_basis_tests!(tetrahedron_p2, ReferenceCell::Tetrahedron, 2);
nodal_basis_tests!(tetrahedron_p3, ReferenceCell::Tetrahedron, 3);
nodal_basis_tests!(hexahedron_q1, ReferenceCell::Hexahedron, 1);
nodal_basis_tests!(hexahedron_q2, ReferenceCell::Hexahedron, 2);

#[test]
fn local_dimensions_match_closed_forms() {
    let expectations = [
        (ReferenceCell::Interval, 1, 2),
        (ReferenceCell::Interval, 3, 4),
        (ReferenceCell::Triangle, 1, 3),
        (ReferenceCell::Triangle, 2, 6),
        (ReferenceCell::Triangle, 3, 10),
        (ReferenceCell::Quadrilateral, 2, 9),
        (ReferenceCell::Tetrahedron, 2, 10),
        (ReferenceCell::Tetrahedron, 3, 20),
        (ReferenceCell::Hexahedron, 2, 27),
    ];
    for (cell, degree, expected) in expectations {
        let element = scalar_lagrange(cell, degree);
        assert_eq!(element.local_dimension(), expected, "{} degree {}", cell, degree);
    }
}

#[test]
fn vector_elements_are_blocked_by_component() {
    let element = ElementDescriptor::vector(ElementFamily::Lagrange, ReferenceCell::Triangle, 2)
        .expect("Element is supported");
    assert_eq!(element.value_shape(), &Shape::vector(2));
    assert_eq!(element.scalar_dimension(), 6);
    assert_eq!(element.local_dimension(), 12);
    assert_eq!(element.split_local_index(0), (0, 0));
    assert_eq!(element.split_local_index(5), (0, 5));
    assert_eq!(element.split_local_index(6), (1, 0));
    assert_eq!(element.split_local_index(11), (1, 5));
}

#[test]
fn piecewise_constants_have_a_single_basis_function() {
    let element =
        ElementDescriptor::scalar(ElementFamily::DiscontinuousLagrange, ReferenceCell::Triangle, 0)
            .expect("Element is supported");
    assert_eq!(element.local_dimension(), 1);
    let values = element.evaluate_reference_basis(&[0.25, 0.25]);
    assert_scalar_eq!(values[0], 1.0, comp = abs, tol = 1e-15);
    let gradients = element.evaluate_reference_basis_gradients(&[0.25, 0.25]);
    assert_scalar_eq!(gradients[(0, 0)], 0.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(gradients[(1, 0)], 0.0, comp = abs, tol = 1e-15);
}

#[test]
fn unsupported_configurations_are_rejected() {
    // Degree 0 requires the discontinuous family
    assert_eq!(
        ElementDescriptor::scalar(ElementFamily::Lagrange, ReferenceCell::Triangle, 0),
        Err(ElementError::Unsupported {
            family: ElementFamily::Lagrange,
            cell: ReferenceCell::Triangle,
            degree: 0,
        })
    );
    // Degree caps per cell
    assert!(ElementDescriptor::scalar(ElementFamily::Lagrange, ReferenceCell::Triangle, 4).is_err());
    assert!(ElementDescriptor::scalar(ElementFamily::Lagrange, ReferenceCell::Hexahedron, 3).is_err());
}

#[test]
fn facet_data_is_consistent() {
    for cell in [
        ReferenceCell::Interval,
        ReferenceCell::Triangle,
        ReferenceCell::Quadrilateral,
        ReferenceCell::Tetrahedron,
        ReferenceCell::Hexahedron,
    ] {
        for facet in 0..cell.num_facets() {
            let normal = cell.facet_reference_normal(facet);
            assert_scalar_eq!(normal.norm(), 1.0, comp = abs, tol = 1e-15);
            let vertex_count = cell.facet_vertex_indices(facet).len();
            match cell.facet_cell() {
                None => assert_eq!(vertex_count, 1),
                Some(facet_cell) => assert_eq!(vertex_count, facet_cell.num_vertices()),
            }
        }
    }
}
