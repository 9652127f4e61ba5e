use anyhow::{bail, Context, Result};
use std::fmt;
use std::mem;
use std::sync::Arc;

/// Data types supported by the expression engine
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean = 1,
    Integer = 2,
    Float = 3,
    Varchar = 4,
}

impl DataType {
    /// Tag byte a non-NULL [`Value`] of this type carries in memory
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Width of the inline payload, or `None` when the payload is a handle
    /// that cannot be decoded by a fixed-width load.
    pub fn byte_width(self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Integer => Some(mem::size_of::<i64>()),
            DataType::Float => Some(mem::size_of::<f64>()),
            DataType::Varchar => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }
}

/// A tagged scalar value.
///
/// The representation is `#[repr(C, u8)]`: a tag byte followed by a payload
/// union placed at the alignment of the enum. Generated code reads values
/// straight out of `[Value]` slices using [`ValueLayout`], so the layout is
/// part of the public contract and must not change.
#[repr(C, u8)]
#[derive(Debug, Clone)]
pub enum Value {
    Null = 0,
    Boolean(bool) = 1,
    Integer(i64) = 2,
    Float(f64) = 3,
    String(Arc<str>) = 4,
}

/// Memory layout of [`Value`] as seen by generated code.
pub struct ValueLayout;

impl ValueLayout {
    /// Stride between consecutive values in a `[Value]` slice
    pub const SIZE: usize = mem::size_of::<Value>();
    /// Offset of the tag byte
    pub const TAG_OFFSET: usize = 0;
    /// Offset of the payload union
    pub const PAYLOAD_OFFSET: usize = mem::align_of::<Value>();
    /// Tag byte of [`Value::Null`]
    pub const NULL_TAG: u8 = 0;

    /// Byte offset of slot `index` from the start of a `[Value]` slice
    pub fn slot_offset(index: usize) -> Option<usize> {
        index.checked_mul(Self::SIZE)
    }
}

const _: () = assert!(ValueLayout::PAYLOAD_OFFSET > ValueLayout::TAG_OFFSET);
const _: () = assert!(ValueLayout::PAYLOAD_OFFSET + mem::size_of::<i64>() <= ValueLayout::SIZE);
const _: () = assert!(ValueLayout::PAYLOAD_OFFSET + mem::size_of::<f64>() <= ValueLayout::SIZE);

impl Value {
    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Value::String(value.into())
    }

    /// Get the data type of this value
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::String(_) => Some(DataType::Varchar),
        }
    }

    /// Tag byte stored at [`ValueLayout::TAG_OFFSET`]
    pub fn tag(&self) -> u8 {
        self.data_type()
            .map(DataType::tag)
            .unwrap_or(ValueLayout::NULL_TAG)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is compatible with the given data type
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        match self.data_type() {
            None => true, // NULL is compatible with any type
            Some(actual) => actual == data_type,
        }
    }

    /// Rebuild a value from the 64 payload bits written by generated code.
    pub fn from_payload_bits(data_type: DataType, bits: u64) -> Option<Value> {
        match data_type {
            DataType::Boolean => Some(Value::Boolean(bits & 0xff != 0)),
            DataType::Integer => Some(Value::Integer(bits as i64)),
            DataType::Float => Some(Value::Float(f64::from_bits(bits))),
            DataType::Varchar => None,
        }
    }

    /// Parse a typed literal as accepted on the command line:
    /// `i:42`, `f:2.5`, `b:true`, `s:text` or `null`.
    pub fn parse_typed(input: &str) -> Result<Value> {
        if input.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        let Some((kind, raw)) = input.split_once(':') else {
            bail!("Missing type prefix in value '{}'", input);
        };
        let value = match kind {
            "i" | "int" => Value::Integer(
                raw.parse::<i64>()
                    .with_context(|| format!("Invalid integer '{}'", raw))?,
            ),
            "f" | "float" => Value::Float(
                raw.parse::<f64>()
                    .with_context(|| format!("Invalid float '{}'", raw))?,
            ),
            "b" | "bool" => Value::Boolean(
                raw.parse::<bool>()
                    .with_context(|| format!("Invalid boolean '{}'", raw))?,
            ),
            "s" | "str" => Value::string(raw),
            _ => bail!("Unknown type prefix '{}' in value '{}'", kind, input),
        };
        Ok(value)
    }
}

/// Structural equality: floats compare by bit pattern, so `NaN == NaN` and
/// `0.0 != -0.0`. SQL comparison semantics live in the evaluator.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tag(value: &Value) -> u8 {
        let ptr = value as *const Value as *const u8;
        unsafe { ptr.add(ValueLayout::TAG_OFFSET).read() }
    }

    fn raw_payload<T: Copy>(value: &Value) -> T {
        let ptr = value as *const Value as *const u8;
        unsafe { ptr.add(ValueLayout::PAYLOAD_OFFSET).cast::<T>().read_unaligned() }
    }

    #[test]
    fn test_byte_width() {
        assert_eq!(DataType::Boolean.byte_width(), Some(1));
        assert_eq!(DataType::Integer.byte_width(), Some(8));
        assert_eq!(DataType::Float.byte_width(), Some(8));
        assert_eq!(DataType::Varchar.byte_width(), None);
    }

    #[test]
    fn test_tag_byte_matches_layout() {
        let values = [
            Value::Null,
            Value::Boolean(true),
            Value::Integer(-7),
            Value::Float(1.5),
            Value::string("abc"),
        ];
        for value in &values {
            assert_eq!(raw_tag(value), value.tag(), "tag of {}", value);
        }
        assert_eq!(raw_tag(&Value::Null), ValueLayout::NULL_TAG);
        assert_eq!(raw_tag(&Value::Integer(0)), DataType::Integer.tag());
    }

    #[test]
    fn test_inline_payloads_at_fixed_offset() {
        assert_eq!(
            raw_payload::<i64>(&Value::Integer(0x0102_0304_0506_0708)),
            0x0102_0304_0506_0708
        );
        assert_eq!(raw_payload::<i64>(&Value::Integer(i64::MIN)), i64::MIN);
        assert_eq!(
            raw_payload::<u64>(&Value::Float(-2.75)),
            (-2.75f64).to_bits()
        );
        assert_eq!(raw_payload::<u8>(&Value::Boolean(true)), 1);
        assert_eq!(raw_payload::<u8>(&Value::Boolean(false)), 0);
    }

    #[test]
    fn test_slice_stride() {
        let values = vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)];
        let base = values.as_ptr() as *const u8;
        for (index, expected) in [10i64, 20, 30].iter().enumerate() {
            let offset = ValueLayout::slot_offset(index).unwrap() + ValueLayout::PAYLOAD_OFFSET;
            let read = unsafe { base.add(offset).cast::<i64>().read_unaligned() };
            assert_eq!(read, *expected);
        }
        assert_eq!(
            ValueLayout::slot_offset(2),
            Some(2 * mem::size_of::<Value>())
        );
        assert_eq!(ValueLayout::slot_offset(usize::MAX), None);
    }

    #[test]
    fn test_value_compatibility() {
        assert!(Value::Null.is_compatible_with(DataType::Integer));
        assert!(Value::Boolean(true).is_compatible_with(DataType::Boolean));
        assert!(Value::Integer(42).is_compatible_with(DataType::Integer));
        assert!(Value::Float(4.2).is_compatible_with(DataType::Float));
        assert!(Value::string("hello").is_compatible_with(DataType::Varchar));

        assert!(!Value::Boolean(true).is_compatible_with(DataType::Integer));
        assert!(!Value::Integer(42).is_compatible_with(DataType::Float));
    }

    #[test]
    fn test_structural_equality_uses_float_bits() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_eq!(Value::string("a"), Value::from("a"));
    }

    #[test]
    fn test_from_payload_bits() {
        assert_eq!(
            Value::from_payload_bits(DataType::Integer, (-5i64) as u64),
            Some(Value::Integer(-5))
        );
        assert_eq!(
            Value::from_payload_bits(DataType::Float, 3.5f64.to_bits()),
            Some(Value::Float(3.5))
        );
        assert_eq!(
            Value::from_payload_bits(DataType::Boolean, 1),
            Some(Value::Boolean(true))
        );
        assert_eq!(Value::from_payload_bits(DataType::Varchar, 0), None);
    }

    #[test]
    fn test_parse_typed() -> Result<()> {
        assert_eq!(Value::parse_typed("i:42")?, Value::Integer(42));
        assert_eq!(Value::parse_typed("f:2.5")?, Value::Float(2.5));
        assert_eq!(Value::parse_typed("b:true")?, Value::Boolean(true));
        assert_eq!(Value::parse_typed("s:a:b")?, Value::string("a:b"));
        assert_eq!(Value::parse_typed("NULL")?, Value::Null);
        assert!(Value::parse_typed("42").is_err());
        assert!(Value::parse_typed("i:abc").is_err());
        assert!(Value::parse_typed("x:1").is_err());
        Ok(())
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::string("x").to_string(), "'x'");
    }
}
