//! Lowering of expression nodes to Cranelift IR.
//!
//! Each node emits code whose result matches what
//! [`Expression::evaluate`] returns for the same bindings and row.

use crate::access::DataType;
use crate::codegen::emitter::{status, CodeValue, FunctionEmitter};
use crate::expression::{
    BinaryExpr, BinaryOperator, Expression, ExpressionError, ExpressionResult, UnaryExpr,
    UnaryOperator,
};
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, Value as IrValue};

impl Expression {
    /// Emit code computing this node as `result_type`.
    ///
    /// Every node must already have that type; only an untyped NULL literal
    /// takes it. A parameter that was NULL when the tree was built has no
    /// type to decode its slot as and is not compiled.
    pub fn codegen(
        &self,
        emitter: &mut FunctionEmitter<'_>,
        result_type: DataType,
    ) -> ExpressionResult<CodeValue> {
        match self {
            Expression::Parameter(param) => match param.data_type() {
                Some(declared) => {
                    check_declared(self, Some(declared), result_type)?;
                    emitter.emit_load(param.slot(), result_type)
                }
                None => Err(unsupported(None, self)),
            },
            Expression::ColumnRef(col) => {
                check_declared(self, Some(col.data_type()), result_type)?;
                emitter.emit_load(col.slot(), result_type)
            }
            Expression::Literal(lit) => emitter.emit_constant(&lit.value, result_type),
            Expression::BinaryOp(binary) => {
                check_declared(self, binary.data_type(), result_type)?;
                lower_binary(emitter, binary, result_type)
            }
            Expression::UnaryOp(unary) => {
                check_declared(self, unary.data_type(), result_type)?;
                lower_unary(emitter, unary, result_type)
            }
        }
    }

    /// Emit the root of a compiled function. An untyped parameter at the
    /// root is decoded as the type the caller asked for.
    pub(crate) fn codegen_root(
        &self,
        emitter: &mut FunctionEmitter<'_>,
        result_type: DataType,
    ) -> ExpressionResult<CodeValue> {
        match self {
            Expression::Parameter(param) if param.data_type().is_none() => {
                emitter.emit_load(param.slot(), result_type)
            }
            _ => self.codegen(emitter, result_type),
        }
    }
}

fn check_declared(
    expr: &Expression,
    declared: Option<DataType>,
    requested: DataType,
) -> ExpressionResult<()> {
    match declared {
        Some(declared) if declared != requested => Err(ExpressionError::TypeMismatch {
            expected: requested,
            actual: Some(declared),
            context: expr.to_string(),
        }),
        _ => Ok(()),
    }
}

fn unsupported(data_type: Option<DataType>, expr: &impl ToString) -> ExpressionError {
    ExpressionError::UnsupportedTypeForCodegen {
        data_type,
        context: expr.to_string(),
    }
}

/// Type to request from an operand: its own, else its sibling's, else the
/// fallback for an all-NULL pair.
fn operand_type(own: &Expression, sibling: &Expression, fallback: DataType) -> DataType {
    own.result_type()
        .or_else(|| sibling.result_type())
        .unwrap_or(fallback)
}

fn lower_binary(
    emitter: &mut FunctionEmitter<'_>,
    binary: &BinaryExpr,
    result_type: DataType,
) -> ExpressionResult<CodeValue> {
    let op = binary.op();
    let fallback = if op.is_logical() {
        DataType::Boolean
    } else if op.is_comparison() {
        DataType::Integer
    } else {
        result_type
    };
    let left_type = operand_type(binary.left(), binary.right(), fallback);
    let right_type = operand_type(binary.right(), binary.left(), fallback);

    let left = binary.left().codegen(emitter, left_type)?;
    let right = binary.right().codegen(emitter, right_type)?;

    match op {
        BinaryOperator::And => Ok(lower_and(emitter, left, right)),
        BinaryOperator::Or => Ok(lower_or(emitter, left, right)),
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => lower_arithmetic(emitter, binary, left, right, result_type),
        BinaryOperator::Eq
        | BinaryOperator::Ne
        | BinaryOperator::Lt
        | BinaryOperator::Le
        | BinaryOperator::Gt
        | BinaryOperator::Ge => lower_comparison(emitter, binary, left, right),
        BinaryOperator::Concat => Err(unsupported(
            Some(DataType::Varchar),
            &binary_display(binary),
        )),
    }
}

fn binary_display(binary: &BinaryExpr) -> String {
    format!("{} {} {}", binary.left(), binary.op().as_str(), binary.right())
}

/// `false` if either side is a non-NULL false, else NULL if either side is
/// NULL, else `true`
fn lower_and(emitter: &mut FunctionEmitter<'_>, left: CodeValue, right: CodeValue) -> CodeValue {
    let left_false = definitely(emitter, left, false);
    let right_false = definitely(emitter, right, false);
    let any_false = emitter.or(left_false, right_false);
    let any_null = emitter.or(left.null, right.null);
    let not_false = emitter.not(any_false);
    let null = emitter.and(any_null, not_false);
    CodeValue {
        value: not_false,
        null,
        data_type: DataType::Boolean,
    }
}

/// `true` if either side is a non-NULL true, else NULL if either side is
/// NULL, else `false`
fn lower_or(emitter: &mut FunctionEmitter<'_>, left: CodeValue, right: CodeValue) -> CodeValue {
    let left_true = definitely(emitter, left, true);
    let right_true = definitely(emitter, right, true);
    let any_true = emitter.or(left_true, right_true);
    let any_null = emitter.or(left.null, right.null);
    let not_true = emitter.not(any_true);
    let null = emitter.and(any_null, not_true);
    CodeValue {
        value: any_true,
        null,
        data_type: DataType::Boolean,
    }
}

/// Flag set when `operand` is non-NULL and equal to `truth`
fn definitely(emitter: &mut FunctionEmitter<'_>, operand: CodeValue, truth: bool) -> IrValue {
    let present = emitter.not(operand.null);
    let matches = if truth {
        operand.value
    } else {
        emitter.not(operand.value)
    };
    emitter.and(present, matches)
}

/// Convert an integer operand to float; floats pass through
fn promote(emitter: &mut FunctionEmitter<'_>, operand: CodeValue) -> IrValue {
    match operand.data_type {
        DataType::Integer => emitter
            .builder()
            .ins()
            .fcvt_from_sint(types::F64, operand.value),
        _ => operand.value,
    }
}

fn lower_arithmetic(
    emitter: &mut FunctionEmitter<'_>,
    binary: &BinaryExpr,
    left: CodeValue,
    right: CodeValue,
    result_type: DataType,
) -> ExpressionResult<CodeValue> {
    let null = emitter.or(left.null, right.null);
    let value = match result_type {
        DataType::Integer => lower_integer_arithmetic(emitter, binary.op(), left, right, null),
        DataType::Float => {
            let a = promote(emitter, left);
            let b = promote(emitter, right);
            let ins = emitter.builder().ins();
            match binary.op() {
                BinaryOperator::Add => ins.fadd(a, b),
                BinaryOperator::Sub => ins.fsub(a, b),
                BinaryOperator::Mul => ins.fmul(a, b),
                BinaryOperator::Div => ins.fdiv(a, b),
                // No native float remainder instruction
                _ => return Err(unsupported(Some(DataType::Float), &binary_display(binary))),
            }
        }
        other => return Err(unsupported(Some(other), &binary_display(binary))),
    };
    Ok(CodeValue {
        value,
        null,
        data_type: result_type,
    })
}

/// Wrapping integer arithmetic. Division never traps: the divisor is
/// replaced by 1 when it is 0 or -1, a zero divisor on non-NULL operands
/// raises the division-by-zero status, and `x / -1` is computed as a
/// wrapping negation.
fn lower_integer_arithmetic(
    emitter: &mut FunctionEmitter<'_>,
    op: BinaryOperator,
    left: CodeValue,
    right: CodeValue,
    null: IrValue,
) -> IrValue {
    let (a, b) = (left.value, right.value);
    match op {
        BinaryOperator::Add => emitter.builder().ins().iadd(a, b),
        BinaryOperator::Sub => emitter.builder().ins().isub(a, b),
        BinaryOperator::Mul => emitter.builder().ins().imul(a, b),
        _ => {
            let ins = emitter.builder().ins();
            let is_zero = ins.icmp_imm(IntCC::Equal, b, 0);
            let is_minus_one = emitter.builder().ins().icmp_imm(IntCC::Equal, b, -1);
            let unsafe_divisor = emitter.or(is_zero, is_minus_one);
            let one = emitter.builder().ins().iconst(types::I64, 1);
            let divisor = emitter.builder().ins().select(unsafe_divisor, one, b);

            let present = emitter.not(null);
            let division_by_zero = emitter.and(is_zero, present);
            emitter.raise(division_by_zero, status::DIVISION_BY_ZERO);

            if op == BinaryOperator::Div {
                let quotient = emitter.builder().ins().sdiv(a, divisor);
                let negated = emitter.builder().ins().ineg(a);
                emitter.builder().ins().select(is_minus_one, negated, quotient)
            } else {
                let remainder = emitter.builder().ins().srem(a, divisor);
                let zero = emitter.builder().ins().iconst(types::I64, 0);
                emitter.builder().ins().select(is_minus_one, zero, remainder)
            }
        }
    }
}

fn lower_comparison(
    emitter: &mut FunctionEmitter<'_>,
    binary: &BinaryExpr,
    left: CodeValue,
    right: CodeValue,
) -> ExpressionResult<CodeValue> {
    let op = binary.op();
    let null = emitter.or(left.null, right.null);
    let value = match (left.data_type, right.data_type) {
        (DataType::Integer, DataType::Integer) => {
            let cc = int_condition(op, true);
            emitter.builder().ins().icmp(cc, left.value, right.value)
        }
        (DataType::Boolean, DataType::Boolean) => {
            // false < true, both stored as 0/1
            let cc = int_condition(op, false);
            emitter.builder().ins().icmp(cc, left.value, right.value)
        }
        (DataType::Integer | DataType::Float, DataType::Integer | DataType::Float) => {
            let a = promote(emitter, left);
            let b = promote(emitter, right);
            emitter.builder().ins().fcmp(float_condition(op), a, b)
        }
        (other, _) => return Err(unsupported(Some(other), &binary_display(binary))),
    };
    Ok(CodeValue {
        value,
        null,
        data_type: DataType::Boolean,
    })
}

fn int_condition(op: BinaryOperator, signed: bool) -> IntCC {
    match (op, signed) {
        (BinaryOperator::Eq, _) => IntCC::Equal,
        (BinaryOperator::Ne, _) => IntCC::NotEqual,
        (BinaryOperator::Lt, true) => IntCC::SignedLessThan,
        (BinaryOperator::Le, true) => IntCC::SignedLessThanOrEqual,
        (BinaryOperator::Gt, true) => IntCC::SignedGreaterThan,
        (BinaryOperator::Ge, true) => IntCC::SignedGreaterThanOrEqual,
        (BinaryOperator::Lt, false) => IntCC::UnsignedLessThan,
        (BinaryOperator::Le, false) => IntCC::UnsignedLessThanOrEqual,
        (BinaryOperator::Gt, false) => IntCC::UnsignedGreaterThan,
        (BinaryOperator::Ge, false) => IntCC::UnsignedGreaterThanOrEqual,
        _ => IntCC::Equal,
    }
}

/// `NotEqual` is true for unordered operands, every other condition is
/// false, matching Rust's float operators
fn float_condition(op: BinaryOperator) -> FloatCC {
    match op {
        BinaryOperator::Ne => FloatCC::NotEqual,
        BinaryOperator::Lt => FloatCC::LessThan,
        BinaryOperator::Le => FloatCC::LessThanOrEqual,
        BinaryOperator::Gt => FloatCC::GreaterThan,
        BinaryOperator::Ge => FloatCC::GreaterThanOrEqual,
        _ => FloatCC::Equal,
    }
}

fn lower_unary(
    emitter: &mut FunctionEmitter<'_>,
    unary: &UnaryExpr,
    result_type: DataType,
) -> ExpressionResult<CodeValue> {
    let op = unary.op();
    let operand = unary.operand();

    if matches!(op, UnaryOperator::IsNull | UnaryOperator::IsNotNull) {
        let null = null_flag(emitter, operand)?;
        let value = match op {
            UnaryOperator::IsNull => null,
            _ => emitter.not(null),
        };
        let never_null = emitter.flag(false);
        return Ok(CodeValue {
            value,
            null: never_null,
            data_type: DataType::Boolean,
        });
    }

    let inner = operand.codegen(emitter, operand.result_type().unwrap_or(result_type))?;
    let value = match (op, inner.data_type) {
        (UnaryOperator::Not, DataType::Boolean) => emitter.not(inner.value),
        (UnaryOperator::Plus, DataType::Integer | DataType::Float) => inner.value,
        (UnaryOperator::Minus, DataType::Integer) => emitter.builder().ins().ineg(inner.value),
        (UnaryOperator::Minus, DataType::Float) => emitter.builder().ins().fneg(inner.value),
        (_, other) => return Err(unsupported(Some(other), &unary_display(unary))),
    };
    Ok(CodeValue {
        value,
        null: inner.null,
        data_type: inner.data_type,
    })
}

fn unary_display(unary: &UnaryExpr) -> String {
    format!("{} {}", unary.op().as_str(), unary.operand())
}

/// Null flag of an `IS [NOT] NULL` operand. Slots are checked through their
/// tag alone, so string parameters and columns qualify too.
fn null_flag(emitter: &mut FunctionEmitter<'_>, operand: &Expression) -> ExpressionResult<IrValue> {
    match operand {
        Expression::Parameter(param) => match param.data_type() {
            Some(data_type) => emitter.emit_null_check(param.slot(), data_type),
            None => Err(unsupported(None, operand)),
        },
        Expression::ColumnRef(col) => emitter.emit_null_check(col.slot(), col.data_type()),
        Expression::Literal(lit) => Ok(emitter.flag(lit.value.is_null())),
        _ => {
            let data_type = operand
                .result_type()
                .ok_or_else(|| unsupported(None, operand))?;
            Ok(operand.codegen(emitter, data_type)?.null)
        }
    }
}
