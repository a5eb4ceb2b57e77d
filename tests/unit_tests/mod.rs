mod codegen;
mod compiler;
mod element;
mod estimate;
mod form;
mod quadrature;
mod representation;
