use matrixcompare::assert_scalar_eq;
use skald::element::ReferenceCell;
use skald::quadrature::{facet_rule, reference_rule};

#[test]
fn rules_are_stable_across_calls() {
    for cell in [
        ReferenceCell::Interval,
        ReferenceCell::Triangle,
        ReferenceCell::Quadrilateral,
        ReferenceCell::Tetrahedron,
        ReferenceCell::Hexahedron,
    ] {
        for degree in 0..=4 {
            let first = reference_rule(cell, degree);
            let second = reference_rule(cell, degree);
            assert_eq!(first, second, "{} degree {}", cell, degree);
        }
    }
}

#[test]
fn rules_integrate_the_reference_volume() {
    for cell in [
        ReferenceCell::Interval,
        ReferenceCell::Triangle,
        ReferenceCell::Quadrilateral,
        ReferenceCell::Tetrahedron,
        ReferenceCell::Hexahedron,
    ] {
        let rule = reference_rule(cell, 2);
        let total: f64 = rule.weights.iter().sum();
        assert_scalar_eq!(total, cell.reference_volume(), comp = abs, tol = 1e-14);
    }
}

#[test]
fn facet_rule_points_lie_on_the_facet() {
    // Triangle facet 0 is the edge x + y = 1
    let rule = facet_rule(ReferenceCell::Triangle, 0, 3);
    for point in &rule.points {
        assert_scalar_eq!(point[0] + point[1], 1.0, comp = abs, tol = 1e-14);
    }
    // Triangle facet 1 is the edge x = 0
    let rule = facet_rule(ReferenceCell::Triangle, 1, 3);
    for point in &rule.points {
        assert_scalar_eq!(point[0], 0.0, comp = abs, tol = 1e-14);
    }
    // Tetrahedron facet 2 is the face y = 0
    let rule = facet_rule(ReferenceCell::Tetrahedron, 2, 2);
    for point in &rule.points {
        assert_scalar_eq!(point[1], 0.0, comp = abs, tol = 1e-14);
    }
    // Hexahedron facet 5 is the face x = 1
    let rule = facet_rule(ReferenceCell::Hexahedron, 5, 2);
    for point in &rule.points {
        assert_scalar_eq!(point[0], 1.0, comp = abs, tol = 1e-14);
    }
}

#[test]
fn facet_rule_weights_sum_to_the_facet_cell_volume() {
    let rule = facet_rule(ReferenceCell::Triangle, 0, 3);
    let total: f64 = rule.weights.iter().sum();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-14);

    let rule = facet_rule(ReferenceCell::Tetrahedron, 0, 3);
    let total: f64 = rule.weights.iter().sum();
    assert_scalar_eq!(total, 0.5, comp = abs, tol = 1e-14);
}

#[test]
fn interval_facets_are_point_evaluations() {
    let rule = facet_rule(ReferenceCell::Interval, 1, 4);
    assert_eq!(rule.len(), 1);
    assert_eq!(rule.weights, vec![1.0]);
    assert_scalar_eq!(rule.points[0][0], 1.0, comp = abs, tol = 1e-15);
}
