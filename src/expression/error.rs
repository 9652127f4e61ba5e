//! Error types for expression construction, evaluation and code generation.

use crate::access::DataType;
use thiserror::Error;

/// Errors that can occur while building, evaluating or compiling expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// A context-dependent node was built without an execution context
    #[error("No active execution context to resolve {reference}")]
    NoActiveContext { reference: String },

    /// Parameter index exceeds the number of bound parameters
    #[error("Parameter index {index} out of range for {len} bound parameters")]
    IndexOutOfRange { index: usize, len: usize },

    /// Rebinding supplied a different number of values than there are slots
    #[error("Expected {expected} parameter values, got {actual}")]
    BindingCountMismatch { expected: usize, actual: usize },

    /// Generated code cannot decode this type inline; interpret instead
    #[error("Type {data_type:?} cannot be decoded inline by generated code in {context}")]
    UnsupportedTypeForCodegen {
        data_type: Option<DataType>,
        context: String,
    },

    /// Compiled code was bound to an execution that cannot satisfy it
    #[error("Compiled expression cannot run against execution {execution}: {reason}")]
    StaleBindingUse { execution: u64, reason: String },

    /// Column index out of bounds
    #[error("Column index {index} out of bounds for tuple with {tuple_size} columns")]
    ColumnIndexOutOfBounds { index: usize, tuple_size: usize },

    /// A value does not have the type its slot or column declares
    #[error("Type mismatch in {context}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: DataType,
        actual: Option<DataType>,
        context: String,
    },

    /// Invalid operand types for operator
    #[error(
        "Invalid operand types for operator {operator}: left={left_type:?}, right={right_type:?}"
    )]
    InvalidOperandTypes {
        operator: String,
        left_type: Option<DataType>,
        right_type: Option<DataType>,
    },

    #[error("Division by zero")]
    DivisionByZero,

    /// The native code target could not be set up
    #[error("Codegen setup failed: {0}")]
    CodegenSetup(String),

    /// The native code target rejected generated code
    #[error("Codegen failed: {0}")]
    Codegen(String),
}

impl ExpressionError {
    /// Whether the caller should fall back to interpreted evaluation
    pub fn is_codegen_fallback(&self) -> bool {
        matches!(self, ExpressionError::UnsupportedTypeForCodegen { .. })
    }
}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExpressionError::NoActiveContext {
            reference: "parameter 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No active execution context to resolve parameter 0"
        );

        let err = ExpressionError::IndexOutOfRange { index: 1, len: 1 };
        assert_eq!(
            err.to_string(),
            "Parameter index 1 out of range for 1 bound parameters"
        );

        let err = ExpressionError::UnsupportedTypeForCodegen {
            data_type: Some(DataType::Varchar),
            context: "parameter 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type Some(Varchar) cannot be decoded inline by generated code in parameter 0"
        );

        let err = ExpressionError::TypeMismatch {
            expected: DataType::Integer,
            actual: Some(DataType::Float),
            context: "column 2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch in column 2: expected Integer, got Some(Float)"
        );

        let err = ExpressionError::InvalidOperandTypes {
            operator: "+".to_string(),
            left_type: Some(DataType::Integer),
            right_type: Some(DataType::Varchar),
        };
        assert_eq!(
            err.to_string(),
            "Invalid operand types for operator +: left=Some(Integer), right=Some(Varchar)"
        );

        assert_eq!(ExpressionError::DivisionByZero.to_string(), "Division by zero");
    }

    #[test]
    fn test_only_unsupported_type_falls_back() {
        assert!(ExpressionError::UnsupportedTypeForCodegen {
            data_type: None,
            context: "NULL".to_string(),
        }
        .is_codegen_fallback());
        assert!(!ExpressionError::DivisionByZero.is_codegen_fallback());
        assert!(!ExpressionError::IndexOutOfRange { index: 0, len: 0 }.is_codegen_fallback());
        assert!(!ExpressionError::Codegen("verifier".to_string()).is_codegen_fallback());
    }
}
