//! `skald` is a compiler from symbolic finite element variational forms to
//! low-level procedures that compute per-cell local tensors.
//!
//! The pipeline is a pure batch transformation:
//!
//! 1. a [`form::Form`] is built from shape-checked expression trees over
//!    [`element::ElementDescriptor`]s and integration measures;
//! 2. [`representation::plan_form`] resolves, per integral term, a
//!    quadrature degree and a representation — a precomputed reference
//!    tensor contracted with a small per-cell geometry tensor, or runtime
//!    quadrature — and derives the corresponding plan;
//! 3. [`codegen::emit_module`] turns the plans into a self-contained
//!    generated module plus a metadata descriptor for the assembly engine;
//! 4. [`compiler::compile_many`] drives the above over independent form
//!    files, in parallel.
//!
//! Representation plans can also be evaluated in-memory (see
//! [`representation::CompiledForm`]), which serves as the semantic
//! reference for the generated code and is how the test suite validates
//! both representations against closed-form local tensors.

pub mod codegen;
pub mod compiler;
pub mod element;
pub mod estimate;
pub mod form;
pub mod geometry;
pub mod quadrature;
pub mod representation;

pub extern crate nalgebra;
pub extern crate skald_quadrature;

/// Scalar types the reference-basis code is generic over.
///
/// Used as a trait alias wherever closed-form basis evaluation needs to
/// convert floating-point literals into the scalar type.
pub trait Real: nalgebra::RealField + num::FromPrimitive + Copy {}

impl<T> Real for T where T: nalgebra::RealField + num::FromPrimitive + Copy {}
