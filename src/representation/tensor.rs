//! The tensor representation: precomputed reference tensors contracted
//! with per-cell geometry tensors.
//!
//! For an affinely mapped term, every physical derivative factors as
//! `d phi / dx_a = sum_b K[b][a] d phihat / dxi_b` with `K` the constant
//! Jacobian inverse. Pulling the (constant) `K` factors and the volume
//! scale out of the integral leaves a reference tensor that is integrated
//! exactly, once, on the reference cell:
//!
//! ```text
//! A[i, j] = sum_m sum_{k, b} A0_m[i, j, k, b] * w<k> * G_m[b]
//! G_m[b]  = c_m * |det J| * prod_d K[b_d][a_d]
//! ```
//!
//! where `k` ranges over coefficient dof tuples (contracted with the
//! runtime coefficient values `w`) and `b` over reference derivative axes.
//! Exterior facet terms carry one reference tensor per facet, with the
//! facet volume scale taking the place of `|det J|`.

use crate::element::ReferenceCell;
use crate::form::DomainKind;
use crate::geometry::JacobianData;
use crate::quadrature::{facet_rule, reference_rule, Rule};
use crate::representation::monomial::{
    check_multilinearity, expand_integrand, ExpansionIssue, FactorSource, Monomial,
};
use crate::representation::{tabulate_elements, FormContext};
use itertools::Itertools;

/// One monomial term of a tensor-represented integral.
#[derive(Debug, Clone)]
pub struct TensorTerm {
    /// The scalar coefficient of the monomial.
    pub coefficient: f64,
    /// The fixed physical axis of each derivative contraction slot.
    pub physical_axes: Vec<usize>,
    /// Coefficient contraction slots: (coefficient index, local dimension),
    /// one per coefficient factor occurrence.
    pub auxiliary: Vec<(usize, usize)>,
    /// The precomputed reference tensor, flattened row-major over
    /// [argument dofs..., auxiliary dofs..., reference axes...].
    pub reference: Vec<f64>,
}

/// The tensor representation of one integral.
#[derive(Debug, Clone)]
pub struct TensorPlan {
    pub cell: ReferenceCell,
    /// Argument local dimensions in slot order (test first).
    pub argument_dimensions: Vec<usize>,
    /// One term list per variant: a single list for cell integrals, one
    /// list per facet for exterior facet integrals.
    pub variants: Vec<Vec<TensorTerm>>,
}

pub(crate) fn plan(
    ctx: &FormContext<'_>,
    integrand: &crate::form::Expr,
    degree: usize,
    cell: ReferenceCell,
    domain: DomainKind,
) -> Result<TensorPlan, ExpansionIssue> {
    let poly = expand_integrand(integrand)?;
    check_multilinearity(&poly, ctx.test.is_some(), ctx.trial.is_some())?;

    let rules: Vec<Rule> = match domain {
        DomainKind::Cell => vec![reference_rule(cell, degree)],
        DomainKind::ExteriorFacet => (0..cell.num_facets())
            .map(|facet| facet_rule(cell, facet, degree))
            .collect(),
        // Rejected by representation selection
        DomainKind::InteriorFacet => {
            unreachable!("tensor representation is never selected for interior facet integrals")
        }
    };

    let argument_dimensions = ctx.argument_dimensions();
    let variants = rules
        .iter()
        .map(|rule| {
            poly.iter()
                .map(|monomial| build_term(ctx, monomial, rule, cell))
                .collect()
        })
        .collect();

    Ok(TensorPlan {
        cell,
        argument_dimensions,
        variants,
    })
}

fn build_term(
    ctx: &FormContext<'_>,
    monomial: &Monomial,
    rule: &Rule,
    cell: ReferenceCell,
) -> TensorTerm {
    let arg_count = ctx.argument_dimensions().len();
    let dim = cell.dimension();

    // Assign tuple positions: argument dofs, then one auxiliary dof per
    // coefficient factor occurrence, then one reference axis per derivative
    let mut auxiliary = Vec::new();
    let mut physical_axes = Vec::new();
    // Per factor: (dof tuple position, derivative slot tuple positions)
    let mut factor_positions = Vec::with_capacity(monomial.factors.len());
    let mut next_aux_position = arg_count;
    for factor in &monomial.factors {
        let dof_position = match factor.source {
            FactorSource::Test => 0,
            FactorSource::Trial => arg_count - 1,
            FactorSource::Coefficient(index) => {
                auxiliary.push((index, factor.element.local_dimension()));
                let position = next_aux_position;
                next_aux_position += 1;
                position
            }
        };
        factor_positions.push((dof_position, Vec::new()));
    }
    let mut next_slot_position = arg_count + auxiliary.len();
    for (factor, positions) in monomial.factors.iter().zip(&mut factor_positions) {
        for &axis in &factor.derivatives {
            physical_axes.push(axis);
            positions.1.push(next_slot_position);
            next_slot_position += 1;
        }
    }

    let mut dims: Vec<usize> = ctx.argument_dimensions();
    dims.extend(auxiliary.iter().map(|&(_, local_dim)| local_dim));
    dims.extend(std::iter::repeat(dim).take(physical_axes.len()));

    let tables = tabulate_elements(
        monomial.factors.iter().map(|factor| &factor.element),
        &rule.points,
    );

    // Integrate the reference basis product for every index tuple
    let num_entries: usize = dims.iter().product();
    let mut reference = Vec::with_capacity(num_entries.max(1));
    let tuples = dims
        .iter()
        .map(|&extent| 0..extent)
        .multi_cartesian_product();
    let mut wrote_entries = false;
    for tuple in tuples {
        wrote_entries = true;
        let mut entry = 0.0;
        for (point_index, &weight) in rule.weights.iter().enumerate() {
            let mut product = weight;
            for (factor, (dof_position, slot_positions)) in
                monomial.factors.iter().zip(&factor_positions)
            {
                let dof = tuple[*dof_position];
                let (block, scalar_index) = factor.element.split_local_index(dof);
                if block != factor.component {
                    product = 0.0;
                    break;
                }
                let table = &tables[&factor.element];
                let value = if slot_positions.is_empty() {
                    table.values[point_index][scalar_index]
                } else {
                    let axis = tuple[slot_positions[0]];
                    table.gradients[point_index][(axis, scalar_index)]
                };
                product *= value;
            }
            entry += product;
        }
        reference.push(entry);
    }
    if !wrote_entries {
        // A constant monomial of a functional: a single entry, the measure
        // of the reference integration domain
        reference.push(rule.weights.iter().sum());
    }

    TensorTerm {
        coefficient: monomial.coefficient,
        physical_axes,
        auxiliary,
        reference,
    }
}

impl TensorPlan {
    /// Accumulates this integral's contribution into the flat output
    /// buffer for one cell (or one facet, for exterior facet variants).
    ///
    /// `scale` is the volume scale of the integration domain: `|det J|`
    /// for cell integrals, the facet volume scale for facet integrals.
    pub fn accumulate(
        &self,
        variant: usize,
        jacobian: &JacobianData,
        scale: f64,
        coefficients: &[Vec<f64>],
        output: &mut [f64],
    ) {
        let dim = self.cell.dimension();
        let trial_stride = if self.argument_dimensions.len() == 2 {
            self.argument_dimensions[1]
        } else {
            1
        };

        for term in &self.variants[variant] {
            let mut dims: Vec<usize> = self.argument_dimensions.clone();
            dims.extend(term.auxiliary.iter().map(|&(_, local_dim)| local_dim));
            dims.extend(std::iter::repeat(dim).take(term.physical_axes.len()));
            let arg_count = self.argument_dimensions.len();
            let aux_count = term.auxiliary.len();

            if dims.is_empty() {
                output[0] += term.coefficient * scale * term.reference[0];
                continue;
            }

            let tuples = dims
                .iter()
                .map(|&extent| 0..extent)
                .multi_cartesian_product();
            for (flat, tuple) in tuples.enumerate() {
                let entry = term.reference[flat];
                if entry == 0.0 {
                    continue;
                }
                // Geometry tensor entry for this assignment of reference axes
                let mut geometry = term.coefficient * scale;
                for (slot, &physical_axis) in term.physical_axes.iter().enumerate() {
                    let reference_axis = tuple[arg_count + aux_count + slot];
                    geometry *= jacobian.inverse[(reference_axis, physical_axis)];
                }
                // Contraction with runtime coefficient dof values
                let mut weight = 1.0;
                for (slot, &(coefficient_index, _)) in term.auxiliary.iter().enumerate() {
                    weight *= coefficients[coefficient_index][tuple[arg_count + slot]];
                }
                let output_index = match arg_count {
                    0 => 0,
                    1 => tuple[0],
                    _ => tuple[0] * trial_stride + tuple[1],
                };
                output[output_index] += entry * weight * geometry;
            }
        }
    }
}
