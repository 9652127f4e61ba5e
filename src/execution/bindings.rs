use crate::access::Value;
use crate::expression::{ExpressionError, ExpressionResult};

/// Parameter values supplied for one statement execution.
///
/// The slot count is fixed when the bindings are created and the storage is
/// never reallocated; rebinding overwrites a slot in place. Only the owning
/// [`ExecutionContext`](crate::execution::ExecutionContext) can rebind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBindings {
    slots: Box<[Value]>,
}

impl ParameterBindings {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            slots: values.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> ExpressionResult<&Value> {
        self.slots.get(index).ok_or(ExpressionError::IndexOutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.slots
    }

    /// Overwrite one slot, returning the previous value
    pub(crate) fn set(&mut self, index: usize, value: Value) -> ExpressionResult<Value> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ExpressionError::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, value))
    }

    /// Overwrite every slot; the number of values must match the slot count
    pub(crate) fn set_all(&mut self, values: Vec<Value>) -> ExpressionResult<()> {
        if values.len() != self.slots.len() {
            return Err(ExpressionError::BindingCountMismatch {
                expected: self.slots.len(),
                actual: values.len(),
            });
        }
        for (slot, value) in self.slots.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }
}
