//! Compiled expression functions and their binding to an execution.

use crate::access::{DataType, Value};
use crate::codegen::emitter::{status, SlotLoad};
use crate::execution::ExecutionContext;
use crate::expression::eval::predicate_result;
use crate::expression::{Expression, ExpressionError, ExpressionResult, SlotRef};
use cranelift_jit::JITModule;
use log::{debug, trace};

/// Native signature of a compiled expression.
///
/// `params` and `row` point at the first slot of the parameter bindings and
/// of the row; `out` receives the payload bits of a non-NULL result. The
/// return value is one of the codes in [`status`].
pub(crate) type CompiledFn =
    unsafe extern "C" fn(params: *const u8, row: *const u8, out: *mut u64) -> u8;

/// Native code for one expression, owned together with its code pages.
///
/// The code reads parameters and columns through the base pointers it is
/// called with, never through fixed addresses, so one compiled expression
/// can serve any number of executions, concurrently, as long as each call
/// goes through [`CompiledExpression::bind`].
pub struct CompiledExpression {
    function: CompiledFn,
    /// `None` once the code pages are released
    module: Option<JITModule>,
    source: String,
    result_type: DataType,
    loads: Vec<SlotLoad>,
    required_parameters: usize,
    required_columns: usize,
}

// SAFETY: after finalization the code pages are immutable and `function` is a
// plain function pointer. The module is only touched again on drop.
unsafe impl Send for CompiledExpression {}
unsafe impl Sync for CompiledExpression {}

impl CompiledExpression {
    pub(crate) fn new(
        function: CompiledFn,
        module: JITModule,
        expr: &Expression,
        result_type: DataType,
        loads: Vec<SlotLoad>,
    ) -> Self {
        Self {
            function,
            module: Some(module),
            source: expr.to_string(),
            result_type,
            loads,
            required_parameters: expr.required_parameters(),
            required_columns: expr.required_columns(),
        }
    }

    pub fn result_type(&self) -> DataType {
        self.result_type
    }

    /// Number of parameter slots the code reads
    pub fn required_parameters(&self) -> usize {
        self.required_parameters
    }

    /// Number of row columns the code reads
    pub fn required_columns(&self) -> usize {
        self.required_columns
    }

    /// Attach the compiled code to one execution.
    ///
    /// Fails with [`ExpressionError::StaleBindingUse`] when the execution
    /// cannot back every slot the code reads: too few parameter slots, or a
    /// column layout that disagrees with the one compiled against. While the
    /// returned handle lives the execution cannot be rebound.
    pub fn bind<'a>(
        &'a self,
        context: &'a ExecutionContext,
    ) -> ExpressionResult<BoundFunction<'a>> {
        let stale = |reason: String| ExpressionError::StaleBindingUse {
            execution: context.id().value(),
            reason,
        };

        let available = context.bindings().len();
        if available < self.required_parameters {
            return Err(stale(format!(
                "code reads {} parameter slots, execution has {}",
                self.required_parameters, available
            )));
        }
        for load in &self.loads {
            if let SlotRef::Column(index) = load.slot {
                match context.column_layout().data_type(index) {
                    Some(data_type) if data_type == load.data_type => {}
                    found => {
                        return Err(stale(format!(
                            "code reads column {} as {:?}, execution layout has {:?}",
                            index, load.data_type, found
                        )))
                    }
                }
            }
        }

        trace!("{}: bound compiled {}", context.id(), self.source);
        Ok(BoundFunction {
            compiled: self,
            context,
        })
    }
}

impl Drop for CompiledExpression {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            debug!("releasing code for {}", self.source);
            // SAFETY: `function` points into this module and is unreachable
            // once `self` is gone; every `BoundFunction` borrows `self`.
            unsafe { module.free_memory() };
        }
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.source)
            .field("result_type", &self.result_type)
            .field("loads", &self.loads)
            .finish()
    }
}

/// A compiled expression attached to one execution
#[derive(Debug, Clone, Copy)]
pub struct BoundFunction<'a> {
    compiled: &'a CompiledExpression,
    context: &'a ExecutionContext,
}

impl<'a> BoundFunction<'a> {
    /// Run the code against `row` with the execution's current bindings
    pub fn call(&self, row: &[Value]) -> ExpressionResult<Value> {
        let compiled = self.compiled;
        if row.len() < compiled.required_columns {
            return Err(ExpressionError::ColumnIndexOutOfBounds {
                index: compiled.required_columns - 1,
                tuple_size: row.len(),
            });
        }

        let params = self.context.bindings().as_slice();
        let mut out: u64 = 0;
        // SAFETY: `bind` checked the bindings cover every parameter slot the
        // code reads and the length check above covers every column slot.
        // Both slices keep the `Value` layout the code was emitted for.
        let code = unsafe {
            (compiled.function)(
                params.as_ptr().cast::<u8>(),
                row.as_ptr().cast::<u8>(),
                &mut out,
            )
        };

        match code {
            status::VALUE => {
                Value::from_payload_bits(compiled.result_type, out).ok_or_else(|| {
                    ExpressionError::Codegen(format!(
                        "cannot decode {:?} result of {}",
                        compiled.result_type, compiled.source
                    ))
                })
            }
            status::NULL => Ok(Value::Null),
            status::DIVISION_BY_ZERO => Err(ExpressionError::DivisionByZero),
            status::TYPE_MISMATCH => Err(self.diagnose_type_mismatch(row)),
            other => Err(ExpressionError::Codegen(format!(
                "unknown status {} from {}",
                other, compiled.source
            ))),
        }
    }

    /// Run the code as a WHERE-clause predicate: NULL counts as false
    pub fn matches(&self, row: &[Value]) -> ExpressionResult<bool> {
        predicate_result(self.call(row)?)
    }

    /// Find the first slot, in load order, whose value has a type other than
    /// the one the code decoded it as.
    fn diagnose_type_mismatch(&self, row: &[Value]) -> ExpressionError {
        let bindings = self.context.bindings().as_slice();
        for load in &self.compiled.loads {
            let value = match load.slot {
                SlotRef::Parameter(index) => bindings.get(index),
                SlotRef::Column(index) => row.get(index),
            };
            if let Some(actual) = value.and_then(Value::data_type) {
                if actual != load.data_type {
                    return ExpressionError::TypeMismatch {
                        expected: load.data_type,
                        actual: Some(actual),
                        context: load.slot.to_string(),
                    };
                }
            }
        }
        ExpressionError::Codegen(format!(
            "type mismatch reported by {} but every slot conforms",
            self.compiled.source
        ))
    }
}
