//! Expression tree definitions.
//!
//! Nodes that reference execution state (parameters, columns) can only be
//! built through [`ExpressionBuilder`](crate::expression::ExpressionBuilder),
//! which validates the reference against an execution context. Nodes store
//! slot indices, never addresses, so a tree can be reused across executions.

use crate::access::{DataType, Value};
use crate::expression::operator::{BinaryOperator, UnaryOperator};
use std::fmt;

/// An index-addressed storage location an expression reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRef {
    /// A slot in the execution's parameter bindings
    Parameter(usize),
    /// A column of the row being processed
    Column(usize),
}

impl SlotRef {
    pub fn index(&self) -> usize {
        match self {
            SlotRef::Parameter(index) | SlotRef::Column(index) => *index,
        }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Parameter(index) => write!(f, "parameter {}", index),
            SlotRef::Column(index) => write!(f, "column {}", index),
        }
    }
}

/// Reference to a runtime-bound parameter slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterRef {
    index: usize,
    data_type: Option<DataType>,
}

impl ParameterRef {
    pub(crate) fn new(index: usize, data_type: Option<DataType>) -> Self {
        Self { index, data_type }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Declared type; `None` if the slot held NULL when the node was built
    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn slot(&self) -> SlotRef {
        SlotRef::Parameter(self.index)
    }
}

/// Column reference in an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    index: usize,
    name: Option<String>,
    data_type: DataType,
}

impl ColumnRef {
    pub(crate) fn new(index: usize, name: Option<String>, data_type: DataType) -> Self {
        Self {
            index,
            name,
            data_type,
        }
    }

    /// Column index in the row (0-based)
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn slot(&self) -> SlotRef {
        SlotRef::Column(self.index)
    }
}

/// Literal value in an expression
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: Value,
}

impl Literal {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// A binary operation with its inferred result type
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    op: BinaryOperator,
    left: Box<Expression>,
    right: Box<Expression>,
    data_type: Option<DataType>,
}

impl BinaryExpr {
    pub(crate) fn new(
        op: BinaryOperator,
        left: Expression,
        right: Expression,
        data_type: Option<DataType>,
    ) -> Self {
        Self {
            op,
            left: Box::new(left),
            right: Box::new(right),
            data_type,
        }
    }

    pub fn op(&self) -> BinaryOperator {
        self.op
    }

    pub fn left(&self) -> &Expression {
        &self.left
    }

    pub fn right(&self) -> &Expression {
        &self.right
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }
}

/// A unary operation with its inferred result type
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    op: UnaryOperator,
    operand: Box<Expression>,
    data_type: Option<DataType>,
}

impl UnaryExpr {
    pub(crate) fn new(op: UnaryOperator, operand: Expression, data_type: Option<DataType>) -> Self {
        Self {
            op,
            operand: Box::new(operand),
            data_type,
        }
    }

    pub fn op(&self) -> UnaryOperator {
        self.op
    }

    pub fn operand(&self) -> &Expression {
        &self.operand
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Runtime-bound parameter
    Parameter(ParameterRef),

    /// Column reference
    ColumnRef(ColumnRef),

    /// Literal constant value
    Literal(Literal),

    /// Binary operation
    BinaryOp(BinaryExpr),

    /// Unary operation
    UnaryOp(UnaryExpr),
}

impl Expression {
    /// Create a literal expression
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(Literal::new(value.into()))
    }

    /// Create a NULL literal
    pub fn null() -> Self {
        Expression::Literal(Literal::new(Value::Null))
    }

    /// Declared result type; `None` for untyped NULLs
    pub fn result_type(&self) -> Option<DataType> {
        match self {
            Expression::Parameter(param) => param.data_type(),
            Expression::ColumnRef(col) => Some(col.data_type()),
            Expression::Literal(lit) => lit.value.data_type(),
            Expression::BinaryOp(binary) => binary.data_type(),
            Expression::UnaryOp(unary) => unary.data_type(),
        }
    }

    /// Number of parameter slots an execution must provide for this tree
    pub fn required_parameters(&self) -> usize {
        self.max_slot(&|slot| match slot {
            SlotRef::Parameter(index) => Some(index),
            SlotRef::Column(_) => None,
        })
    }

    /// Number of columns a row must provide for this tree
    pub fn required_columns(&self) -> usize {
        self.max_slot(&|slot| match slot {
            SlotRef::Column(index) => Some(index),
            SlotRef::Parameter(_) => None,
        })
    }

    fn max_slot(&self, select: &dyn Fn(SlotRef) -> Option<usize>) -> usize {
        match self {
            Expression::Parameter(param) => select(param.slot()).map_or(0, |i| i + 1),
            Expression::ColumnRef(col) => select(col.slot()).map_or(0, |i| i + 1),
            Expression::Literal(_) => 0,
            Expression::BinaryOp(binary) => binary
                .left()
                .max_slot(select)
                .max(binary.right().max_slot(select)),
            Expression::UnaryOp(unary) => unary.operand().max_slot(select),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Parameter(param) => write!(f, "${}", param.index()),
            Expression::ColumnRef(col) => match col.name() {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "#{}", col.index()),
            },
            Expression::Literal(lit) => write!(f, "{}", lit.value),
            Expression::BinaryOp(binary) => write!(
                f,
                "({} {} {})",
                binary.left(),
                binary.op().as_str(),
                binary.right()
            ),
            Expression::UnaryOp(unary) if unary.op().is_postfix() => {
                write!(f, "({} {})", unary.operand(), unary.op().as_str())
            }
            Expression::UnaryOp(unary) => match unary.op() {
                UnaryOperator::Not => write!(f, "(NOT {})", unary.operand()),
                op => write!(f, "({}{})", op.as_str(), unary.operand()),
            },
        }
    }
}
