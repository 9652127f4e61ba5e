//! Execution-scoped state: parameter bindings and the execution context
//! that owns them.

pub mod bindings;
pub mod context;

pub use bindings::ParameterBindings;
pub use context::{ExecutionContext, ExecutionId};
