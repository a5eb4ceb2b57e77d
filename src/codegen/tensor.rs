//! Emission of tensor-represented terms.
//!
//! The emitted code mirrors [`TensorPlan::accumulate`]: it computes the
//! affine Jacobian data, binds one geometry-tensor entry per (term,
//! reference-axis assignment) pair, and accumulates the fully unrolled
//! contraction of the precomputed reference tensor with the geometry
//! entries (and, when coefficients are present, the runtime dof values).

use crate::codegen::{emit_affine_jacobian, format_float, SourceBuilder};
use crate::element::ReferenceCell;
use crate::representation::tensor::TensorPlan;
use itertools::Itertools;

pub(super) fn emit_cell_term(source: &mut SourceBuilder, plan: &TensorPlan) {
    source.open("{");
    emit_affine_jacobian(source, plan.cell, "coordinates");
    emit_terms(source, plan, 0, "det_abs");
    source.close("}");
}

pub(super) fn emit_exterior_facet_term(source: &mut SourceBuilder, plan: &TensorPlan) {
    source.open("{");
    emit_affine_jacobian(source, plan.cell, "coordinates");
    source.open("match facet {");
    for facet in 0..plan.cell.num_facets() {
        source.open(format!("{} => {{", facet));
        emit_facet_scale(source, plan.cell, facet);
        emit_terms(source, plan, facet, "scale");
        source.close("}");
    }
    source.line("_ => {}");
    source.close("}");
    source.close("}");
}

/// Emits `scale`, the physical volume of the facet relative to its
/// reference cell, from the physical facet vertex coordinates.
fn emit_facet_scale(source: &mut SourceBuilder, cell: ReferenceCell, facet: usize) {
    let dim = cell.dimension();
    let vertices = cell.facet_vertex_indices(facet);
    match dim {
        1 => source.line("let scale = 1.0;"),
        2 => {
            let (a, b) = (vertices[0], vertices[1]);
            for r in 0..2 {
                source.line(format!(
                    "let e{} = coordinates[{}] - coordinates[{}];",
                    r,
                    b * dim + r,
                    a * dim + r
                ));
            }
            source.line("let scale = (e0 * e0 + e1 * e1).sqrt();");
        }
        3 => {
            let (a, b, c) = (vertices[0], vertices[1], vertices[2]);
            for r in 0..3 {
                source.line(format!(
                    "let e1_{} = coordinates[{}] - coordinates[{}];",
                    r,
                    b * dim + r,
                    a * dim + r
                ));
            }
            for r in 0..3 {
                source.line(format!(
                    "let e2_{} = coordinates[{}] - coordinates[{}];",
                    r,
                    c * dim + r,
                    a * dim + r
                ));
            }
            source.line("let g11 = e1_0 * e1_0 + e1_1 * e1_1 + e1_2 * e1_2;");
            source.line("let g22 = e2_0 * e2_0 + e2_1 * e2_1 + e2_2 * e2_2;");
            source.line("let g12 = e1_0 * e2_0 + e1_1 * e2_1 + e1_2 * e2_2;");
            source.line("let scale = (g11 * g22 - g12 * g12).sqrt();");
        }
        _ => unreachable!("unsupported dimension {}", dim),
    }
}

fn geometry_name(term_index: usize, axes: &[usize]) -> String {
    if axes.is_empty() {
        format!("g{}", term_index)
    } else {
        format!(
            "g{}_{}",
            term_index,
            axes.iter().map(|axis| axis.to_string()).collect::<String>()
        )
    }
}

fn emit_terms(source: &mut SourceBuilder, plan: &TensorPlan, variant: usize, scale_var: &str) {
    let dim = plan.cell.dimension();
    let arg_count = plan.argument_dimensions.len();
    let trial_stride = if arg_count == 2 {
        plan.argument_dimensions[1]
    } else {
        1
    };

    for (term_index, term) in plan.variants[variant].iter().enumerate() {
        let slots = term.physical_axes.len();

        // Geometry tensor entries, one per reference-axis assignment
        let axis_tuples: Vec<Vec<usize>> = if slots == 0 {
            vec![Vec::new()]
        } else {
            std::iter::repeat(0..dim)
                .take(slots)
                .multi_cartesian_product()
                .collect()
        };
        for axes in &axis_tuples {
            let mut factors = vec![format_float(term.coefficient), scale_var.to_string()];
            for (slot, &reference_axis) in axes.iter().enumerate() {
                factors.push(format!("k{}_{}", reference_axis, term.physical_axes[slot]));
            }
            source.line(format!(
                "let {} = {};",
                geometry_name(term_index, axes),
                factors.join(" * ")
            ));
        }

        let mut dims: Vec<usize> = plan.argument_dimensions.clone();
        dims.extend(term.auxiliary.iter().map(|&(_, local_dim)| local_dim));
        dims.extend(std::iter::repeat(dim).take(slots));
        let aux_count = term.auxiliary.len();

        if dims.is_empty() {
            source.line(format!(
                "local_tensor[0] += {} * {};",
                format_float(term.reference[0]),
                geometry_name(term_index, &[])
            ));
            continue;
        }

        // Group the unrolled contraction by output entry; argument indices
        // lead the tuple order, so entries arrive contiguously
        let mut current_output: Option<usize> = None;
        let mut parts: Vec<String> = Vec::new();
        let mut flush = |source: &mut SourceBuilder, output: Option<usize>, parts: &mut Vec<String>| {
            if let Some(index) = output {
                if !parts.is_empty() {
                    source.line(format!("local_tensor[{}] += {};", index, parts.join(" + ")));
                    parts.clear();
                }
            }
        };

        let tuples = dims
            .iter()
            .map(|&extent| 0..extent)
            .multi_cartesian_product();
        for (flat, tuple) in tuples.enumerate() {
            let output_index = match arg_count {
                0 => 0,
                1 => tuple[0],
                _ => tuple[0] * trial_stride + tuple[1],
            };
            if current_output != Some(output_index) {
                flush(source, current_output, &mut parts);
                current_output = Some(output_index);
            }
            let entry = term.reference[flat];
            if entry == 0.0 {
                continue;
            }
            let mut factors = vec![format_float(entry)];
            for (slot, &(coefficient_index, _)) in term.auxiliary.iter().enumerate() {
                factors.push(format!(
                    "coefficients[{}][{}]",
                    coefficient_index,
                    tuple[arg_count + slot]
                ));
            }
            factors.push(geometry_name(term_index, &tuple[arg_count + aux_count..]));
            parts.push(factors.join(" * "));
        }
        flush(source, current_output, &mut parts);
    }
}
