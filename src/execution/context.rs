//! Per-execution state that expressions resolve their external references
//! against.

use crate::access::{ColumnLayout, Value};
use crate::execution::ParameterBindings;
use crate::expression::ExpressionResult;
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for one statement execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionId(u64);

impl ExecutionId {
    fn next() -> Self {
        Self(NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the inner u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Exec{}", self.0)
    }
}

/// State of one statement execution.
///
/// Owns the parameter bindings and the layout of the rows the execution
/// feeds to its expressions. Expressions and compiled code only ever read
/// from it; rebinding takes `&mut self`, so it cannot happen while any
/// compiled function is bound to the context.
#[derive(Debug)]
pub struct ExecutionContext {
    id: ExecutionId,
    bindings: ParameterBindings,
    column_layout: ColumnLayout,
}

impl ExecutionContext {
    pub fn new(bindings: ParameterBindings, column_layout: ColumnLayout) -> Self {
        let id = ExecutionId::next();
        debug!(
            "{}: started with {} parameters and {} columns",
            id,
            bindings.len(),
            column_layout.len()
        );
        Self {
            id,
            bindings,
            column_layout,
        }
    }

    /// Context with parameters only, for expressions that read no columns
    pub fn with_parameters(values: Vec<Value>) -> Self {
        Self::new(ParameterBindings::new(values), ColumnLayout::default())
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn bindings(&self) -> &ParameterBindings {
        &self.bindings
    }

    pub fn column_layout(&self) -> &ColumnLayout {
        &self.column_layout
    }

    /// Rebind one parameter slot in place
    pub fn rebind(&mut self, index: usize, value: Value) -> ExpressionResult<()> {
        trace!("{}: rebinding parameter {} to {}", self.id, index, value);
        self.bindings.set(index, value)?;
        Ok(())
    }

    /// Rebind every parameter slot; the slot count cannot change
    pub fn rebind_all(&mut self, values: Vec<Value>) -> ExpressionResult<()> {
        trace!("{}: rebinding {} parameters", self.id, values.len());
        self.bindings.set_all(values)
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        debug!("{}: finished", self.id);
    }
}
