//! Value and row representation shared by interpreted and compiled
//! expressions.
//!
//! - **Value**: tagged scalar with a fixed, tested memory layout
//! - **DataType**: supported types and their inline widths
//! - **Row / ColumnLayout**: rows handed to expressions and their schema

pub mod tuple;
pub mod value;

pub use tuple::{Column, ColumnLayout, Row};
pub use value::{DataType, Value, ValueLayout};
