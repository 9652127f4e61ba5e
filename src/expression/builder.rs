//! Construction of validated expression trees.

use crate::access::{DataType, Value};
use crate::execution::ExecutionContext;
use crate::expression::expr::{BinaryExpr, ColumnRef, ParameterRef, SlotRef, UnaryExpr};
use crate::expression::{
    BinaryOperator, Expression, ExpressionError, ExpressionResult, UnaryOperator,
};
use log::debug;

/// Builds expression trees, resolving parameter and column references
/// against an execution context at construction time.
///
/// A detached builder (no context) can still build literals and operators,
/// but any node that needs the context fails with
/// [`ExpressionError::NoActiveContext`]. Operator nodes get their result
/// type inferred here; an operator applied to incompatible types fails
/// with [`ExpressionError::InvalidOperandTypes`].
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder<'ctx> {
    context: Option<&'ctx ExecutionContext>,
}

impl<'ctx> ExpressionBuilder<'ctx> {
    pub fn new(context: &'ctx ExecutionContext) -> Self {
        Self {
            context: Some(context),
        }
    }

    pub fn detached() -> Self {
        Self { context: None }
    }

    fn context_for(&self, slot: SlotRef) -> ExpressionResult<&'ctx ExecutionContext> {
        self.context.ok_or_else(|| ExpressionError::NoActiveContext {
            reference: slot.to_string(),
        })
    }

    /// Parameter node typed after the value currently bound at `index`
    pub fn parameter(&self, index: usize) -> ExpressionResult<Expression> {
        let ctx = self.context_for(SlotRef::Parameter(index))?;
        let data_type = ctx.bindings().get(index)?.data_type();
        debug!("{}: bound parameter {} as {:?}", ctx.id(), index, data_type);
        Ok(Expression::Parameter(ParameterRef::new(index, data_type)))
    }

    /// Parameter node with a type declared by the planner
    pub fn typed_parameter(
        &self,
        index: usize,
        data_type: DataType,
    ) -> ExpressionResult<Expression> {
        let ctx = self.context_for(SlotRef::Parameter(index))?;
        ctx.bindings().get(index)?;
        debug!("{}: bound parameter {} as {:?}", ctx.id(), index, data_type);
        Ok(Expression::Parameter(ParameterRef::new(
            index,
            Some(data_type),
        )))
    }

    /// Column node typed after the context's column layout
    pub fn column(&self, index: usize) -> ExpressionResult<Expression> {
        let ctx = self.context_for(SlotRef::Column(index))?;
        let layout = ctx.column_layout();
        let column = layout
            .column(index)
            .ok_or(ExpressionError::ColumnIndexOutOfBounds {
                index,
                tuple_size: layout.len(),
            })?;
        Ok(Expression::ColumnRef(ColumnRef::new(
            index,
            Some(column.name.clone()),
            column.data_type,
        )))
    }

    pub fn literal(&self, value: impl Into<Value>) -> Expression {
        Expression::literal(value)
    }

    pub fn binary(
        &self,
        op: BinaryOperator,
        left: Expression,
        right: Expression,
    ) -> ExpressionResult<Expression> {
        let data_type = infer_binary_type(op, left.result_type(), right.result_type())?;
        Ok(Expression::BinaryOp(BinaryExpr::new(
            op, left, right, data_type,
        )))
    }

    pub fn unary(&self, op: UnaryOperator, operand: Expression) -> ExpressionResult<Expression> {
        let data_type = match (op, operand.result_type()) {
            (UnaryOperator::IsNull | UnaryOperator::IsNotNull, _) => Some(DataType::Boolean),
            (UnaryOperator::Not, None) => Some(DataType::Boolean),
            (_, None) => None,
            (_, Some(operand_type)) => Some(op.output_type(operand_type).ok_or_else(|| {
                ExpressionError::InvalidOperandTypes {
                    operator: op.as_str().to_string(),
                    left_type: Some(operand_type),
                    right_type: None,
                }
            })?),
        };
        Ok(Expression::UnaryOp(UnaryExpr::new(op, operand, data_type)))
    }

    pub fn add(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Add, left, right)
    }

    pub fn sub(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Sub, left, right)
    }

    pub fn mul(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Mul, left, right)
    }

    pub fn div(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Div, left, right)
    }

    pub fn eq(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Eq, left, right)
    }

    pub fn lt(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Lt, left, right)
    }

    pub fn gt(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Gt, left, right)
    }

    pub fn and(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::And, left, right)
    }

    pub fn or(&self, left: Expression, right: Expression) -> ExpressionResult<Expression> {
        self.binary(BinaryOperator::Or, left, right)
    }

    pub fn not(&self, operand: Expression) -> ExpressionResult<Expression> {
        self.unary(UnaryOperator::Not, operand)
    }

    pub fn neg(&self, operand: Expression) -> ExpressionResult<Expression> {
        self.unary(UnaryOperator::Minus, operand)
    }

    pub fn is_null(&self, operand: Expression) -> ExpressionResult<Expression> {
        self.unary(UnaryOperator::IsNull, operand)
    }

    pub fn is_not_null(&self, operand: Expression) -> ExpressionResult<Expression> {
        self.unary(UnaryOperator::IsNotNull, operand)
    }
}

/// Result type of `left op right`. An untyped (NULL) side takes the type of
/// the other side; two untyped sides give BOOLEAN for comparisons and logic
/// and stay untyped for arithmetic.
fn infer_binary_type(
    op: BinaryOperator,
    left: Option<DataType>,
    right: Option<DataType>,
) -> ExpressionResult<Option<DataType>> {
    let (lt, rt) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        (Some(t), None) | (None, Some(t)) => (t, t),
        (None, None) if op.is_comparison() || op.is_logical() => {
            return Ok(Some(DataType::Boolean))
        }
        (None, None) => return Ok(None),
    };
    op.output_type(lt, rt)
        .map(Some)
        .ok_or_else(|| ExpressionError::InvalidOperandTypes {
            operator: op.as_str().to_string(),
            left_type: left,
            right_type: right,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ColumnLayout;
    use crate::execution::ParameterBindings;

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            ParameterBindings::new(vec![Value::Integer(42), Value::Null, Value::string("abc")]),
            ColumnLayout::from_types(&[DataType::Float, DataType::Boolean]),
        )
    }

    #[test]
    fn test_parameter_binding() {
        let ctx = context();
        let builder = ExpressionBuilder::new(&ctx);

        let p0 = builder.parameter(0).unwrap();
        assert_eq!(p0.result_type(), Some(DataType::Integer));
        let p1 = builder.parameter(1).unwrap();
        assert_eq!(p1.result_type(), None);
        let p1 = builder.typed_parameter(1, DataType::Float).unwrap();
        assert_eq!(p1.result_type(), Some(DataType::Float));
    }

    #[test]
    fn test_parameter_index_out_of_range() {
        let ctx = context();
        let builder = ExpressionBuilder::new(&ctx);
        assert_eq!(
            builder.parameter(3),
            Err(ExpressionError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(
            builder.typed_parameter(10, DataType::Integer),
            Err(ExpressionError::IndexOutOfRange { index: 10, len: 3 })
        );
    }

    #[test]
    fn test_detached_builder() {
        let builder = ExpressionBuilder::detached();
        assert!(matches!(
            builder.parameter(0),
            Err(ExpressionError::NoActiveContext { .. })
        ));
        assert!(matches!(
            builder.column(0),
            Err(ExpressionError::NoActiveContext { .. })
        ));

        // Context-free nodes still build
        let expr = builder
            .add(builder.literal(1i64), builder.literal(2i64))
            .unwrap();
        assert_eq!(expr.result_type(), Some(DataType::Integer));
    }

    #[test]
    fn test_column_resolution() {
        let ctx = context();
        let builder = ExpressionBuilder::new(&ctx);
        let col = builder.column(1).unwrap();
        assert_eq!(col.result_type(), Some(DataType::Boolean));
        assert_eq!(col.to_string(), "c1");
        assert_eq!(
            builder.column(2),
            Err(ExpressionError::ColumnIndexOutOfBounds {
                index: 2,
                tuple_size: 2
            })
        );
    }

    #[test]
    fn test_type_inference() {
        let ctx = context();
        let b = ExpressionBuilder::new(&ctx);

        let sum = b.add(b.parameter(0).unwrap(), b.column(0).unwrap()).unwrap();
        assert_eq!(sum.result_type(), Some(DataType::Float));

        let cmp = b.lt(b.parameter(0).unwrap(), b.literal(10i64)).unwrap();
        assert_eq!(cmp.result_type(), Some(DataType::Boolean));

        // NULL takes the other side's type
        let with_null = b.mul(Expression::null(), b.literal(2.0)).unwrap();
        assert_eq!(with_null.result_type(), Some(DataType::Float));
        let untyped = b.add(Expression::null(), Expression::null()).unwrap();
        assert_eq!(untyped.result_type(), None);
        let logic = b.and(Expression::null(), Expression::null()).unwrap();
        assert_eq!(logic.result_type(), Some(DataType::Boolean));

        let not_null = b.not(Expression::null()).unwrap();
        assert_eq!(not_null.result_type(), Some(DataType::Boolean));
        let is_null = b.is_null(b.parameter(2).unwrap()).unwrap();
        assert_eq!(is_null.result_type(), Some(DataType::Boolean));
    }

    #[test]
    fn test_invalid_operand_types() {
        let ctx = context();
        let b = ExpressionBuilder::new(&ctx);

        assert_eq!(
            b.add(b.parameter(0).unwrap(), b.parameter(2).unwrap()),
            Err(ExpressionError::InvalidOperandTypes {
                operator: "+".to_string(),
                left_type: Some(DataType::Integer),
                right_type: Some(DataType::Varchar),
            })
        );
        assert!(b.and(b.column(1).unwrap(), b.literal(1i64)).is_err());
        assert!(b.not(b.literal(1i64)).is_err());
        assert!(b.neg(b.literal("x")).is_err());
    }
}
