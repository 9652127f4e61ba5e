//! Expressions prepared for repeated evaluation, compiled when possible.

use crate::access::Value;
use crate::codegen::{CodegenBackend, CompiledExpression};
use crate::execution::ExecutionContext;
use crate::expression::eval::predicate_result;
use crate::expression::{Expression, ExpressionResult};
use log::debug;

/// How a prepared expression runs
#[derive(Debug)]
pub enum ExecutionMode {
    Compiled(CompiledExpression),
    Interpreted,
}

/// An expression plus native code for it, or a note that it is interpreted.
///
/// Compilation errors that only mean "this tree has no inline
/// representation" select interpretation; every other error is returned.
#[derive(Debug)]
pub struct PreparedExpression {
    expr: Expression,
    mode: ExecutionMode,
}

impl PreparedExpression {
    pub fn prepare(backend: &CodegenBackend, expr: Expression) -> ExpressionResult<Self> {
        let mode = match backend.compile(&expr) {
            Ok(compiled) => ExecutionMode::Compiled(compiled),
            Err(e) if e.is_codegen_fallback() => {
                debug!("interpreting {}: {}", expr, e);
                ExecutionMode::Interpreted
            }
            Err(e) => return Err(e),
        };
        Ok(Self { expr, mode })
    }

    /// Prepare for interpretation only
    pub fn interpreted(expr: Expression) -> Self {
        Self {
            expr,
            mode: ExecutionMode::Interpreted,
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.mode, ExecutionMode::Compiled(_))
    }

    pub fn evaluate(&self, context: &ExecutionContext, row: &[Value]) -> ExpressionResult<Value> {
        match &self.mode {
            ExecutionMode::Compiled(compiled) => compiled.bind(context)?.call(row),
            ExecutionMode::Interpreted => self.expr.evaluate(context, row),
        }
    }

    pub fn evaluate_predicate(
        &self,
        context: &ExecutionContext,
        row: &[Value],
    ) -> ExpressionResult<bool> {
        predicate_result(self.evaluate(context, row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ColumnLayout, DataType};
    use crate::execution::ParameterBindings;
    use crate::expression::{BinaryOperator, ExpressionBuilder};

    #[test]
    fn test_prepare_chooses_mode() {
        let backend = CodegenBackend::new().unwrap();
        let ctx = ExecutionContext::with_parameters(vec![Value::Integer(2), Value::string("ab")]);
        let b = ExpressionBuilder::new(&ctx);

        let numeric = b.mul(b.parameter(0).unwrap(), b.literal(21i64)).unwrap();
        let prepared = PreparedExpression::prepare(&backend, numeric).unwrap();
        assert!(prepared.is_compiled());
        assert_eq!(prepared.evaluate(&ctx, &[]), Ok(Value::Integer(42)));

        let text = b
            .binary(BinaryOperator::Concat, b.parameter(1).unwrap(), b.literal("c"))
            .unwrap();
        let prepared = PreparedExpression::prepare(&backend, text).unwrap();
        assert!(!prepared.is_compiled());
        assert_eq!(prepared.evaluate(&ctx, &[]), Ok(Value::string("abc")));
    }

    #[test]
    fn test_predicate_modes_agree() {
        let backend = CodegenBackend::new().unwrap();
        let ctx = ExecutionContext::new(
            ParameterBindings::new(vec![Value::Float(1.5)]),
            ColumnLayout::from_types(&[DataType::Float]),
        );
        let b = ExpressionBuilder::new(&ctx);
        let expr = b.lt(b.column(0).unwrap(), b.parameter(0).unwrap()).unwrap();

        let compiled = PreparedExpression::prepare(&backend, expr.clone()).unwrap();
        let interpreted = PreparedExpression::interpreted(expr);
        assert!(compiled.is_compiled());
        for value in [Value::Float(1.0), Value::Float(2.0), Value::Null] {
            let row = [value];
            assert_eq!(
                compiled.evaluate_predicate(&ctx, &row),
                interpreted.evaluate_predicate(&ctx, &row)
            );
        }
    }
}
