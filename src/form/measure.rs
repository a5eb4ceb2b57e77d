//! Integration measures: domain kind, subdomain id and per-term options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// The kind of integration domain of an integral.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DomainKind {
    /// Integration over the cell interior (the `dx` measure).
    Cell,
    /// Integration over facets on the domain boundary (the `ds` measure).
    ExteriorFacet,
    /// Integration over facets shared by two cells (the `dS` measure).
    InteriorFacet,
}

impl DomainKind {
    pub const ALL: [DomainKind; 3] = [Self::Cell, Self::ExteriorFacet, Self::InteriorFacet];

    /// The name of the generated procedure for this domain kind.
    pub fn procedure_name(&self) -> &'static str {
        match self {
            Self::Cell => "cell_interior",
            Self::ExteriorFacet => "exterior_facet",
            Self::InteriorFacet => "interior_facet",
        }
    }
}

impl Display for DomainKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell => write!(f, "cell interior"),
            Self::ExteriorFacet => write!(f, "exterior facet"),
            Self::InteriorFacet => write!(f, "interior facet"),
        }
    }
}

/// The representation requested for an integral term.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepresentationChoice {
    /// Let the compiler pick (tensor when the term admits it).
    #[default]
    Auto,
    /// Precomputed reference tensor contracted with a per-cell geometry
    /// tensor. Fails at compile time if the term does not admit it.
    Tensor,
    /// Runtime numerical quadrature. Always applicable.
    Quadrature,
}

impl Display for RepresentationChoice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Tensor => write!(f, "tensor"),
            Self::Quadrature => write!(f, "quadrature"),
        }
    }
}

/// The quadrature degree requested for an integral term.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DegreeChoice {
    /// Estimate a sufficient degree from the term.
    #[default]
    Auto,
    /// Use exactly this degree, overriding the estimate.
    Fixed(usize),
}

/// An integration measure: domain kind, subdomain id and the per-term
/// options of the input language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub domain: DomainKind,
    pub subdomain: usize,
    pub representation: RepresentationChoice,
    pub degree: DegreeChoice,
}

impl Measure {
    /// The cell-interior measure `dx(subdomain)`.
    pub fn cell(subdomain: usize) -> Self {
        Self::new(DomainKind::Cell, subdomain)
    }

    /// The exterior-facet measure `ds(subdomain)`.
    pub fn exterior_facet(subdomain: usize) -> Self {
        Self::new(DomainKind::ExteriorFacet, subdomain)
    }

    /// The interior-facet measure `dS(subdomain)`.
    pub fn interior_facet(subdomain: usize) -> Self {
        Self::new(DomainKind::InteriorFacet, subdomain)
    }

    pub fn new(domain: DomainKind, subdomain: usize) -> Self {
        Self {
            domain,
            subdomain,
            representation: RepresentationChoice::Auto,
            degree: DegreeChoice::Auto,
        }
    }

    /// Overrides the representation for this term.
    pub fn with_representation(mut self, representation: RepresentationChoice) -> Self {
        self.representation = representation;
        self
    }

    /// Overrides the quadrature degree for this term.
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = DegreeChoice::Fixed(degree);
        self
    }
}
