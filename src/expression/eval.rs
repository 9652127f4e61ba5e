//! Tree-walking expression evaluation.

use crate::access::{DataType, Value};
use crate::execution::ExecutionContext;
use crate::expression::{
    BinaryOperator, ColumnRef, Expression, ExpressionError, ExpressionResult, UnaryOperator,
};

/// Evaluator for expressions against one execution and one row
pub struct ExpressionEvaluator<'a> {
    context: &'a ExecutionContext,
    /// The row values to evaluate against
    row: &'a [Value],
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(context: &'a ExecutionContext, row: &'a [Value]) -> Self {
        Self { context, row }
    }

    /// Evaluate an expression and return the result
    pub fn evaluate(&self, expr: &Expression) -> ExpressionResult<Value> {
        match expr {
            // Re-read on every call: the slot may have been rebound.
            Expression::Parameter(param) => {
                self.context.bindings().get(param.index()).cloned()
            }

            Expression::ColumnRef(col) => self.evaluate_column_ref(col),

            Expression::Literal(lit) => Ok(lit.value.clone()),

            Expression::BinaryOp(binary) => {
                let left_val = self.evaluate(binary.left())?;
                let right_val = self.evaluate(binary.right())?;
                evaluate_binary_op(binary.op(), left_val, right_val)
            }

            Expression::UnaryOp(unary) => {
                let operand_val = self.evaluate(unary.operand())?;
                evaluate_unary_op(unary.op(), operand_val)
            }
        }
    }

    /// Evaluate a column reference
    fn evaluate_column_ref(&self, col: &ColumnRef) -> ExpressionResult<Value> {
        let value = self
            .row
            .get(col.index())
            .ok_or(ExpressionError::ColumnIndexOutOfBounds {
                index: col.index(),
                tuple_size: self.row.len(),
            })?;
        if !value.is_compatible_with(col.data_type()) {
            return Err(ExpressionError::TypeMismatch {
                expected: col.data_type(),
                actual: value.data_type(),
                context: col.slot().to_string(),
            });
        }
        Ok(value.clone())
    }
}

impl Expression {
    /// Evaluate this expression against an execution and a row
    pub fn evaluate(&self, context: &ExecutionContext, row: &[Value]) -> ExpressionResult<Value> {
        ExpressionEvaluator::new(context, row).evaluate(self)
    }

    /// Evaluate as a WHERE-clause predicate: NULL counts as false
    pub fn evaluate_predicate(
        &self,
        context: &ExecutionContext,
        row: &[Value],
    ) -> ExpressionResult<bool> {
        predicate_result(self.evaluate(context, row)?)
    }
}

pub(crate) fn predicate_result(value: Value) -> ExpressionResult<bool> {
    match value {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(ExpressionError::TypeMismatch {
            expected: DataType::Boolean,
            actual: other.data_type(),
            context: "predicate".to_string(),
        }),
    }
}

fn invalid_operands(op: BinaryOperator, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::InvalidOperandTypes {
        operator: op.as_str().to_string(),
        left_type: left.data_type(),
        right_type: right.data_type(),
    }
}

/// Evaluate a binary operation on already-evaluated operands
pub fn evaluate_binary_op(
    op: BinaryOperator,
    left: Value,
    right: Value,
) -> ExpressionResult<Value> {
    match op {
        BinaryOperator::And => return evaluate_and(&left, &right),
        BinaryOperator::Or => return evaluate_or(&left, &right),
        _ => {}
    }

    // NULL propagates through every other operator
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => evaluate_arithmetic(op, &left, &right),

        BinaryOperator::Eq
        | BinaryOperator::Ne
        | BinaryOperator::Lt
        | BinaryOperator::Le
        | BinaryOperator::Gt
        | BinaryOperator::Ge => compare_values(op, &left, &right),

        BinaryOperator::Concat => match (&left, &right) {
            (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{}{}", a, b))),
            _ => Err(invalid_operands(op, &left, &right)),
        },

        BinaryOperator::And | BinaryOperator::Or => Err(invalid_operands(op, &left, &right)),
    }
}

fn as_logical(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
) -> ExpressionResult<(Option<bool>, Option<bool>)> {
    let operand = |value: &Value| match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        _ => Err(invalid_operands(op, left, right)),
    };
    Ok((operand(left)?, operand(right)?))
}

/// Three-valued AND: false wins over NULL, NULL wins over true
fn evaluate_and(left: &Value, right: &Value) -> ExpressionResult<Value> {
    match as_logical(BinaryOperator::And, left, right)? {
        (Some(false), _) | (_, Some(false)) => Ok(Value::Boolean(false)),
        (Some(true), Some(true)) => Ok(Value::Boolean(true)),
        _ => Ok(Value::Null),
    }
}

/// Three-valued OR: true wins over NULL, NULL wins over false
fn evaluate_or(left: &Value, right: &Value) -> ExpressionResult<Value> {
    match as_logical(BinaryOperator::Or, left, right)? {
        (Some(true), _) | (_, Some(true)) => Ok(Value::Boolean(true)),
        (Some(false), Some(false)) => Ok(Value::Boolean(false)),
        _ => Ok(Value::Null),
    }
}

fn evaluate_arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> ExpressionResult<Value> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b),
        (Value::Integer(a), Value::Float(b)) => float_arithmetic(op, *a as f64, *b),
        (Value::Float(a), Value::Integer(b)) => float_arithmetic(op, *a, *b as f64),
        (Value::Float(a), Value::Float(b)) => float_arithmetic(op, *a, *b),
        _ => Err(invalid_operands(op, left, right)),
    }
}

/// Integer arithmetic wraps on overflow, including `i64::MIN / -1`
fn integer_arithmetic(op: BinaryOperator, a: i64, b: i64) -> ExpressionResult<Value> {
    let result = match op {
        BinaryOperator::Add => a.wrapping_add(b),
        BinaryOperator::Sub => a.wrapping_sub(b),
        BinaryOperator::Mul => a.wrapping_mul(b),
        BinaryOperator::Div if b == 0 => return Err(ExpressionError::DivisionByZero),
        BinaryOperator::Div => a.wrapping_div(b),
        BinaryOperator::Mod if b == 0 => return Err(ExpressionError::DivisionByZero),
        BinaryOperator::Mod => a.wrapping_rem(b),
        _ => {
            return Err(invalid_operands(
                op,
                &Value::Integer(a),
                &Value::Integer(b),
            ))
        }
    };
    Ok(Value::Integer(result))
}

/// Float arithmetic follows IEEE 754; dividing by zero yields an infinity
fn float_arithmetic(op: BinaryOperator, a: f64, b: f64) -> ExpressionResult<Value> {
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => a / b,
        BinaryOperator::Mod => a % b,
        _ => return Err(invalid_operands(op, &Value::Float(a), &Value::Float(b))),
    };
    Ok(Value::Float(result))
}

/// Compare two non-NULL values
fn compare_values(op: BinaryOperator, left: &Value, right: &Value) -> ExpressionResult<Value> {
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Integer(a), Value::Float(b)) => return Ok(compare_floats(op, *a as f64, *b)),
        (Value::Float(a), Value::Integer(b)) => return Ok(compare_floats(op, *a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => return Ok(compare_floats(op, *a, *b)),
        _ => return Err(invalid_operands(op, left, right)),
    };
    Ok(Value::Boolean(op.holds_for(ordering)))
}

/// IEEE comparison: every comparison with NaN is false except `!=`
fn compare_floats(op: BinaryOperator, a: f64, b: f64) -> Value {
    let result = match op {
        BinaryOperator::Eq => a == b,
        BinaryOperator::Ne => a != b,
        BinaryOperator::Lt => a < b,
        BinaryOperator::Le => a <= b,
        BinaryOperator::Gt => a > b,
        BinaryOperator::Ge => a >= b,
        _ => false,
    };
    Value::Boolean(result)
}

/// Evaluate a unary operation on an already-evaluated operand
pub fn evaluate_unary_op(op: UnaryOperator, operand: Value) -> ExpressionResult<Value> {
    let invalid = |operand: &Value| ExpressionError::InvalidOperandTypes {
        operator: op.as_str().to_string(),
        left_type: operand.data_type(),
        right_type: None,
    };

    match op {
        UnaryOperator::IsNull => Ok(Value::Boolean(operand.is_null())),

        UnaryOperator::IsNotNull => Ok(Value::Boolean(!operand.is_null())),

        UnaryOperator::Not => match operand {
            Value::Null => Ok(Value::Null),
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            _ => Err(invalid(&operand)),
        },

        UnaryOperator::Plus => match operand {
            Value::Null | Value::Integer(_) | Value::Float(_) => Ok(operand),
            _ => Err(invalid(&operand)),
        },

        UnaryOperator::Minus => match operand {
            Value::Null => Ok(Value::Null),
            Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            _ => Err(invalid(&operand)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ColumnLayout;
    use crate::execution::ParameterBindings;
    use crate::expression::ExpressionBuilder;

    fn empty_context() -> ExecutionContext {
        ExecutionContext::with_parameters(vec![])
    }

    fn eval(expr: &Expression) -> ExpressionResult<Value> {
        expr.evaluate(&empty_context(), &[])
    }

    fn binary(op: BinaryOperator, left: Value, right: Value) -> ExpressionResult<Value> {
        evaluate_binary_op(op, left, right)
    }

    #[test]
    fn test_literal_evaluation() {
        assert_eq!(eval(&Expression::literal(42i64)).unwrap(), Value::Integer(42));
        assert_eq!(eval(&Expression::literal(true)).unwrap(), Value::Boolean(true));
        assert_eq!(eval(&Expression::literal("hello")).unwrap(), Value::string("hello"));
        assert_eq!(eval(&Expression::null()).unwrap(), Value::Null);
    }

    #[test]
    fn test_parameter_evaluation_ignores_row() {
        let ctx = ExecutionContext::with_parameters(vec![Value::Integer(42), Value::string("abc")]);
        let b = ExpressionBuilder::new(&ctx);
        let p0 = b.parameter(0).unwrap();
        let p1 = b.parameter(1).unwrap();

        assert_eq!(p0.evaluate(&ctx, &[]).unwrap(), Value::Integer(42));
        assert_eq!(
            p0.evaluate(&ctx, &[Value::Integer(7)]).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(p1.evaluate(&ctx, &[]).unwrap(), Value::string("abc"));
    }

    #[test]
    fn test_parameter_sees_rebinding() {
        let mut ctx = ExecutionContext::with_parameters(vec![Value::Integer(1)]);
        let p0 = ExpressionBuilder::new(&ctx).parameter(0).unwrap();

        assert_eq!(p0.evaluate(&ctx, &[]).unwrap(), Value::Integer(1));
        ctx.rebind(0, Value::Integer(2)).unwrap();
        assert_eq!(p0.evaluate(&ctx, &[]).unwrap(), Value::Integer(2));
        ctx.rebind(0, Value::Null).unwrap();
        assert_eq!(p0.evaluate(&ctx, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_parameter_against_smaller_context() {
        let big = ExecutionContext::with_parameters(vec![Value::Null, Value::Integer(1)]);
        let p1 = ExpressionBuilder::new(&big).parameter(1).unwrap();
        let small = ExecutionContext::with_parameters(vec![Value::Null]);
        assert_eq!(
            p1.evaluate(&small, &[]),
            Err(ExpressionError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_column_ref_evaluation() {
        let ctx = ExecutionContext::new(
            ParameterBindings::default(),
            ColumnLayout::from_types(&[DataType::Integer, DataType::Varchar]),
        );
        let b = ExpressionBuilder::new(&ctx);
        let c0 = b.column(0).unwrap();
        let c1 = b.column(1).unwrap();

        let row = vec![Value::Integer(1), Value::string("test")];
        assert_eq!(c0.evaluate(&ctx, &row).unwrap(), Value::Integer(1));
        assert_eq!(c1.evaluate(&ctx, &row).unwrap(), Value::string("test"));

        // Short row
        assert_eq!(
            c1.evaluate(&ctx, &row[..1]),
            Err(ExpressionError::ColumnIndexOutOfBounds {
                index: 1,
                tuple_size: 1
            })
        );

        // Value that does not match the layout
        assert_eq!(
            c0.evaluate(&ctx, &[Value::Float(1.0), Value::Null]),
            Err(ExpressionError::TypeMismatch {
                expected: DataType::Integer,
                actual: Some(DataType::Float),
                context: "column 0".to_string(),
            })
        );
    }

    #[test]
    fn test_integer_arithmetic() {
        use BinaryOperator::*;
        assert_eq!(binary(Add, 10.into(), 5.into()).unwrap(), Value::Integer(15));
        assert_eq!(binary(Sub, 10.into(), 15.into()).unwrap(), Value::Integer(-5));
        assert_eq!(binary(Mul, 4.into(), 3.into()).unwrap(), Value::Integer(12));
        assert_eq!(binary(Div, 10.into(), 3.into()).unwrap(), Value::Integer(3));
        assert_eq!(binary(Div, (-7).into(), 2.into()).unwrap(), Value::Integer(-3));
        assert_eq!(binary(Mod, (-7).into(), 2.into()).unwrap(), Value::Integer(-1));

        assert_eq!(binary(Div, 10.into(), 0.into()), Err(ExpressionError::DivisionByZero));
        assert_eq!(binary(Mod, 10.into(), 0.into()), Err(ExpressionError::DivisionByZero));
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        use BinaryOperator::*;
        assert_eq!(
            binary(Add, i64::MAX.into(), 1.into()).unwrap(),
            Value::Integer(i64::MIN)
        );
        assert_eq!(
            binary(Div, i64::MIN.into(), (-1).into()).unwrap(),
            Value::Integer(i64::MIN)
        );
        assert_eq!(
            binary(Mod, i64::MIN.into(), (-1).into()).unwrap(),
            Value::Integer(0)
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Minus, Value::Integer(i64::MIN)).unwrap(),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_float_arithmetic() {
        use BinaryOperator::*;
        assert_eq!(binary(Add, 1.5.into(), 2.into()).unwrap(), Value::Float(3.5));
        assert_eq!(binary(Mul, 2.into(), 0.25.into()).unwrap(), Value::Float(0.5));
        assert_eq!(
            binary(Div, 1.0.into(), 0.0.into()).unwrap(),
            Value::Float(f64::INFINITY)
        );
        assert_eq!(binary(Mod, 7.5.into(), 2.0.into()).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_comparisons() {
        use BinaryOperator::*;
        assert_eq!(binary(Lt, 1.into(), 2.into()).unwrap(), Value::Boolean(true));
        assert_eq!(binary(Ge, 1.into(), 2.into()).unwrap(), Value::Boolean(false));
        assert_eq!(binary(Eq, 2.into(), 2.0.into()).unwrap(), Value::Boolean(true));
        assert_eq!(binary(Lt, false.into(), true.into()).unwrap(), Value::Boolean(true));
        assert_eq!(binary(Gt, "b".into(), "a".into()).unwrap(), Value::Boolean(true));

        let nan = Value::Float(f64::NAN);
        assert_eq!(binary(Eq, nan.clone(), nan.clone()).unwrap(), Value::Boolean(false));
        assert_eq!(binary(Ne, nan.clone(), nan.clone()).unwrap(), Value::Boolean(true));
        assert_eq!(binary(Le, nan, 1.0.into()).unwrap(), Value::Boolean(false));

        assert!(matches!(
            binary(Eq, 1.into(), "1".into()),
            Err(ExpressionError::InvalidOperandTypes { .. })
        ));
    }

    #[test]
    fn test_null_propagation() {
        use BinaryOperator::*;
        assert_eq!(binary(Add, Value::Null, 1.into()).unwrap(), Value::Null);
        assert_eq!(binary(Eq, 1.into(), Value::Null).unwrap(), Value::Null);
        // NULL is checked before the divisor
        assert_eq!(binary(Div, Value::Null, 0.into()).unwrap(), Value::Null);
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Minus, Value::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_three_valued_logic() {
        use BinaryOperator::*;
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);
        let n = Value::Null;

        assert_eq!(binary(And, t.clone(), t.clone()).unwrap(), t);
        assert_eq!(binary(And, t.clone(), f.clone()).unwrap(), f);
        assert_eq!(binary(And, n.clone(), f.clone()).unwrap(), f);
        assert_eq!(binary(And, n.clone(), t.clone()).unwrap(), n);

        assert_eq!(binary(Or, f.clone(), f.clone()).unwrap(), f);
        assert_eq!(binary(Or, n.clone(), t.clone()).unwrap(), t);
        assert_eq!(binary(Or, f.clone(), n.clone()).unwrap(), n);
        assert_eq!(binary(Or, n.clone(), n.clone()).unwrap(), n);

        assert!(matches!(
            binary(And, n, 1.into()),
            Err(ExpressionError::InvalidOperandTypes { .. })
        ));
    }

    #[test]
    fn test_unary_operations() {
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Not, true.into()).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::IsNull, Value::Null).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::IsNotNull, "x".into()).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Minus, 2.5.into()).unwrap(),
            Value::Float(-2.5)
        );
        assert!(evaluate_unary_op(UnaryOperator::Not, 1.into()).is_err());
        assert!(evaluate_unary_op(UnaryOperator::Plus, "x".into()).is_err());
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            binary(BinaryOperator::Concat, "ab".into(), "cd".into()).unwrap(),
            Value::string("abcd")
        );
    }

    #[test]
    fn test_predicate() {
        let ctx = ExecutionContext::with_parameters(vec![Value::Integer(5), Value::Null]);
        let b = ExpressionBuilder::new(&ctx);

        let gt = b.gt(b.parameter(0).unwrap(), b.literal(3i64)).unwrap();
        assert!(gt.evaluate_predicate(&ctx, &[]).unwrap());

        let null_cmp = b
            .gt(b.typed_parameter(1, DataType::Integer).unwrap(), b.literal(3i64))
            .unwrap();
        assert!(!null_cmp.evaluate_predicate(&ctx, &[]).unwrap());

        assert!(matches!(
            b.parameter(0).unwrap().evaluate_predicate(&ctx, &[]),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }
}
