//! Instruction emission for one compiled expression function.
//!
//! Every emitted value travels with an `i8` null flag (0 = valid, 1 = NULL).
//! Runtime failures are folded into a single `i8` status: the first
//! non-zero status raised in emission order wins, which is the order the
//! interpreter would have hit the same error in.

use crate::access::{DataType, Value, ValueLayout};
use crate::expression::{ExpressionError, ExpressionResult, SlotRef};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Type, Value as IrValue};
use cranelift_frontend::FunctionBuilder;
use log::trace;

/// Status codes returned by compiled expression functions
pub(crate) mod status {
    pub const VALUE: u8 = 0;
    pub const NULL: u8 = 1;
    pub const DIVISION_BY_ZERO: u8 = 2;
    pub const TYPE_MISMATCH: u8 = 3;
}

/// An emitted value plus its null flag
#[derive(Debug, Clone, Copy)]
pub struct CodeValue {
    pub value: IrValue,
    /// `i8`: 0 = valid, 1 = NULL
    pub null: IrValue,
    pub data_type: DataType,
}

/// A typed slot load recorded while emitting, used to diagnose a
/// type-mismatch status after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLoad {
    pub slot: SlotRef,
    pub data_type: DataType,
}

/// Cranelift type a value of `data_type` is carried in, if it is inline
pub(crate) fn ir_type(data_type: DataType) -> Option<Type> {
    match data_type {
        DataType::Boolean => Some(types::I8),
        DataType::Integer => Some(types::I64),
        DataType::Float => Some(types::F64),
        DataType::Varchar => None,
    }
}

fn unsupported(data_type: Option<DataType>, context: impl Into<String>) -> ExpressionError {
    ExpressionError::UnsupportedTypeForCodegen {
        data_type,
        context: context.into(),
    }
}

/// Emits the body of one function
/// `fn(params: *const Value, row: *const Value, out: *mut u64) -> u8`.
pub struct FunctionEmitter<'a> {
    builder: FunctionBuilder<'a>,
    params: IrValue,
    row: IrValue,
    status: Option<IrValue>,
    loads: Vec<SlotLoad>,
}

impl<'a> FunctionEmitter<'a> {
    pub(crate) fn new(builder: FunctionBuilder<'a>, params: IrValue, row: IrValue) -> Self {
        Self {
            builder,
            params,
            row,
            status: None,
            loads: Vec::new(),
        }
    }

    /// Underlying builder, for instructions without a helper here
    pub fn builder(&mut self) -> &mut FunctionBuilder<'a> {
        &mut self.builder
    }

    fn slot_offsets(&self, slot: SlotRef) -> ExpressionResult<(i32, i32)> {
        let offset = |within: usize| {
            ValueLayout::slot_offset(slot.index())
                .and_then(|base| base.checked_add(within))
                .and_then(|offset| i32::try_from(offset).ok())
                .ok_or_else(|| {
                    ExpressionError::Codegen(format!("{} is beyond addressable offsets", slot))
                })
        };
        Ok((
            offset(ValueLayout::TAG_OFFSET)?,
            offset(ValueLayout::PAYLOAD_OFFSET)?,
        ))
    }

    fn base(&self, slot: SlotRef) -> IrValue {
        match slot {
            SlotRef::Parameter(_) => self.params,
            SlotRef::Column(_) => self.row,
        }
    }

    /// Load the tag of `slot` and derive its null flag. Records a
    /// type-mismatch status when the tag is neither NULL nor `data_type`.
    fn emit_tag_check(&mut self, slot: SlotRef, data_type: DataType) -> ExpressionResult<IrValue> {
        let (tag_offset, _) = self.slot_offsets(slot)?;
        let base = self.base(slot);
        let ins = self.builder.ins();
        let tag = ins.load(types::I8, MemFlags::trusted(), base, tag_offset);
        let null = self
            .builder
            .ins()
            .icmp_imm(IntCC::Equal, tag, i64::from(ValueLayout::NULL_TAG));
        let wrong = self
            .builder
            .ins()
            .icmp_imm(IntCC::NotEqual, tag, i64::from(data_type.tag()));
        let present = self.not(null);
        let mismatch = self.builder.ins().band(wrong, present);
        self.raise(mismatch, status::TYPE_MISMATCH);
        self.loads.push(SlotLoad { slot, data_type });
        Ok(null)
    }

    /// Emit a load of the value in `slot`, decoded as `data_type`.
    ///
    /// The slot address is computed from the base pointer the function
    /// receives at call time, so the same code reads whichever bindings or
    /// row it is handed. Types without a fixed-width inline payload fail
    /// with [`ExpressionError::UnsupportedTypeForCodegen`].
    pub fn emit_load(&mut self, slot: SlotRef, data_type: DataType) -> ExpressionResult<CodeValue> {
        let ty = ir_type(data_type).ok_or_else(|| unsupported(Some(data_type), slot.to_string()))?;
        let (_, payload_offset) = self.slot_offsets(slot)?;
        trace!(
            "emit load of {} as {:?} at payload offset {}",
            slot,
            data_type,
            payload_offset
        );

        let null = self.emit_tag_check(slot, data_type)?;
        let base = self.base(slot);
        let raw = self
            .builder
            .ins()
            .load(ty, MemFlags::trusted(), base, payload_offset);
        let value = match data_type {
            // Normalize to 0/1 whatever byte is stored
            DataType::Boolean => self.builder.ins().icmp_imm(IntCC::NotEqual, raw, 0),
            _ => raw,
        };
        Ok(CodeValue {
            value,
            null,
            data_type,
        })
    }

    /// Emit only the null flag of `slot`; works for every type since the
    /// payload is never read.
    pub fn emit_null_check(
        &mut self,
        slot: SlotRef,
        data_type: DataType,
    ) -> ExpressionResult<IrValue> {
        trace!("emit null check of {} as {:?}", slot, data_type);
        self.emit_tag_check(slot, data_type)
    }

    /// Emit a constant. NULL becomes a zero of `data_type` with the null
    /// flag set.
    pub fn emit_constant(
        &mut self,
        value: &Value,
        data_type: DataType,
    ) -> ExpressionResult<CodeValue> {
        if let Some(actual) = value.data_type() {
            if actual != data_type {
                return Err(ExpressionError::TypeMismatch {
                    expected: data_type,
                    actual: Some(actual),
                    context: format!("literal {}", value),
                });
            }
        }
        let emitted = match value {
            Value::Null => self.zero(data_type, "literal NULL")?,
            Value::Boolean(b) => self.builder.ins().iconst(types::I8, i64::from(*b)),
            Value::Integer(i) => self.builder.ins().iconst(types::I64, *i),
            Value::Float(x) => self.builder.ins().f64const(*x),
            Value::String(_) => {
                return Err(unsupported(Some(data_type), format!("literal {}", value)))
            }
        };
        let null = self.flag(value.is_null());
        Ok(CodeValue {
            value: emitted,
            null,
            data_type,
        })
    }

    fn zero(&mut self, data_type: DataType, context: &str) -> ExpressionResult<IrValue> {
        let ins = self.builder.ins();
        match data_type {
            DataType::Boolean => Ok(ins.iconst(types::I8, 0)),
            DataType::Integer => Ok(ins.iconst(types::I64, 0)),
            DataType::Float => Ok(ins.f64const(0.0)),
            DataType::Varchar => Err(unsupported(Some(data_type), context)),
        }
    }

    /// Constant `i8` flag
    pub fn flag(&mut self, set: bool) -> IrValue {
        self.builder.ins().iconst(types::I8, i64::from(set))
    }

    /// Logical not of an `i8` 0/1 flag
    pub fn not(&mut self, flag: IrValue) -> IrValue {
        self.builder.ins().bxor_imm(flag, 1)
    }

    pub fn and(&mut self, a: IrValue, b: IrValue) -> IrValue {
        self.builder.ins().band(a, b)
    }

    pub fn or(&mut self, a: IrValue, b: IrValue) -> IrValue {
        self.builder.ins().bor(a, b)
    }

    /// Record `code` as the function status when `condition` (an `i8`
    /// flag) is set, unless an earlier status was already recorded.
    pub fn raise(&mut self, condition: IrValue, code: u8) {
        let ins = self.builder.ins();
        let code = ins.iconst(types::I8, i64::from(code));
        let zero = self.builder.ins().iconst(types::I8, 0);
        let candidate = self.builder.ins().select(condition, code, zero);
        let status = match self.status {
            None => candidate,
            Some(previous) => {
                let already = self.builder.ins().icmp_imm(IntCC::NotEqual, previous, 0);
                self.builder.ins().select(already, previous, candidate)
            }
        };
        self.status = Some(status);
    }

    /// Store the result, return the status and seal the function.
    /// Returns the slot loads emitted, in emission order.
    pub(crate) fn finish(mut self, result: CodeValue, out: IrValue) -> Vec<SlotLoad> {
        let stored = match result.data_type {
            DataType::Boolean => self.builder.ins().uextend(types::I64, result.value),
            _ => result.value,
        };
        self.builder
            .ins()
            .store(MemFlags::trusted(), stored, out, 0);

        // The null flag doubles as the NULL status
        let code = match self.status {
            None => result.null,
            Some(failure) => {
                let failed = self.builder.ins().icmp_imm(IntCC::NotEqual, failure, 0);
                self.builder.ins().select(failed, failure, result.null)
            }
        };
        self.builder.ins().return_(&[code]);
        self.builder.finalize();
        self.loads
    }
}

const _: () = assert!(status::NULL == 1);
const _: () = assert!(status::VALUE == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_width_matches_payload_width() {
        for data_type in [
            DataType::Boolean,
            DataType::Integer,
            DataType::Float,
            DataType::Varchar,
        ] {
            assert_eq!(
                ir_type(data_type).map(|ty| ty.bytes() as usize),
                data_type.byte_width(),
                "{:?}",
                data_type
            );
        }
    }
}
