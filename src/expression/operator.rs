//! Operator definitions for expressions.

use crate::access::DataType;
use std::cmp::Ordering;

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // String
    Concat,
}

impl BinaryOperator {
    /// Get the output type of this operator given input types
    pub fn output_type(&self, left: DataType, right: DataType) -> Option<DataType> {
        use DataType::*;
        if self.is_arithmetic() {
            return match (left, right) {
                (Integer, Integer) => Some(Integer),
                (Integer | Float, Integer | Float) => Some(Float),
                _ => None,
            };
        }
        if self.is_comparison() {
            return if left == right || (left.is_numeric() && right.is_numeric()) {
                Some(Boolean)
            } else {
                None
            };
        }
        match (self, left, right) {
            (BinaryOperator::And | BinaryOperator::Or, Boolean, Boolean) => Some(Boolean),
            (BinaryOperator::Concat, Varchar, Varchar) => Some(Varchar),
            _ => None,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// Whether a comparison operator holds for the given ordering.
    /// Always false for non-comparison operators.
    pub fn holds_for(&self, ordering: Ordering) -> bool {
        match self {
            BinaryOperator::Eq => ordering == Ordering::Equal,
            BinaryOperator::Ne => ordering != Ordering::Equal,
            BinaryOperator::Lt => ordering == Ordering::Less,
            BinaryOperator::Le => ordering != Ordering::Greater,
            BinaryOperator::Gt => ordering == Ordering::Greater,
            BinaryOperator::Ge => ordering != Ordering::Less,
            _ => false,
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Concat => "||",
        }
    }

    /// Parse an operator from its display string (case-insensitive keywords)
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol.to_ascii_uppercase().as_str() {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "%" => BinaryOperator::Mod,
            "=" => BinaryOperator::Eq,
            "!=" | "<>" => BinaryOperator::Ne,
            "<" => BinaryOperator::Lt,
            "<=" => BinaryOperator::Le,
            ">" => BinaryOperator::Gt,
            ">=" => BinaryOperator::Ge,
            "AND" => BinaryOperator::And,
            "OR" => BinaryOperator::Or,
            "||" => BinaryOperator::Concat,
            _ => return None,
        };
        Some(op)
    }
}

/// Unary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    // Logical
    Not,

    // NULL checks
    IsNull,
    IsNotNull,

    // Arithmetic
    Plus,
    Minus,
}

impl UnaryOperator {
    /// Get the output type of this operator given input type
    pub fn output_type(&self, operand: DataType) -> Option<DataType> {
        match self {
            UnaryOperator::Not => match operand {
                DataType::Boolean => Some(DataType::Boolean),
                _ => None,
            },

            // NULL checks always return boolean regardless of input type
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => Some(DataType::Boolean),

            UnaryOperator::Plus | UnaryOperator::Minus => match operand {
                DataType::Integer | DataType::Float => Some(operand),
                _ => None,
            },
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::IsNull => "IS NULL",
            UnaryOperator::IsNotNull => "IS NOT NULL",
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
        }
    }

    /// Whether the operator is written after its operand
    pub fn is_postfix(&self) -> bool {
        matches!(self, UnaryOperator::IsNull | UnaryOperator::IsNotNull)
    }
}
