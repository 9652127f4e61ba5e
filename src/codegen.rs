//! Native code generation for expression trees.
//!
//! - **CodegenBackend**: host target setup; compiles one tree per call
//! - **FunctionEmitter**: slot loads, constants and status tracking
//! - **CompiledExpression / BoundFunction**: owned native code and its
//!   attachment to one execution
//! - **PreparedExpression**: compiled code with interpreted fallback
//!
//! Compiled code reads parameter slots and row columns through base
//! pointers supplied at call time. Results agree with
//! [`Expression::evaluate`](crate::expression::Expression::evaluate) for
//! the same bindings and row.

pub mod backend;
pub mod compiled;
pub mod emitter;
pub mod lower;
pub mod prepared;

pub use backend::{CodegenBackend, CodegenConfig, OptLevel};
pub use compiled::{BoundFunction, CompiledExpression};
pub use emitter::{CodeValue, FunctionEmitter, SlotLoad};
pub use prepared::{ExecutionMode, PreparedExpression};
