//! Expression trees for query execution.
//!
//! This module provides:
//! - Expression tree representation over a closed set of node kinds
//! - Construction that resolves parameters and columns against an
//!   execution context
//! - Tree-walking evaluation against a row
//!
//! Native code generation for the same trees lives in [`crate::codegen`].

pub mod builder;
pub mod error;
pub mod eval;
pub mod expr;
pub mod operator;

pub use builder::ExpressionBuilder;
pub use error::{ExpressionError, ExpressionResult};
pub use eval::{evaluate_binary_op, evaluate_unary_op, ExpressionEvaluator};
pub use expr::{BinaryExpr, ColumnRef, Expression, Literal, ParameterRef, SlotRef, UnaryExpr};
pub use operator::{BinaryOperator, UnaryOperator};
