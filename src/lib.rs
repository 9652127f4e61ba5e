pub mod access;
pub mod codegen;
pub mod execution;
pub mod expression;
