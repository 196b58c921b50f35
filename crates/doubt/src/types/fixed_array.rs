use crate::{
    errors::{RunError, RunResult},
    value::Value,
};

/// Array with capacity fixed at creation.
///
/// Pushing past capacity fails with a structured error rather than growing;
/// unknown-size accumulation belongs to [`crate::types::FlexArray`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FixedArray {
    items: Vec<Value>,
    capacity: usize,
}

impl FixedArray {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a full array from existing values; capacity equals length.
    pub fn from_values(items: Vec<Value>) -> Self {
        let capacity = items.len();
        Self { items, capacity }
    }

    pub fn push(&mut self, value: Value) -> RunResult<()> {
        if self.items.len() >= self.capacity {
            return Err(RunError::native(format!(
                "fixed array is full (capacity {})",
                self.capacity
            )));
        }
        self.items.push(value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: Value) -> RunResult<()> {
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RunError::native(format!(
                "index {index} out of bounds for array of length {}",
                self.items.len()
            ))),
        }
    }

    /// Replaces the slot with null without shrinking the array.
    pub fn unset_weak(&mut self, index: usize) {
        if let Some(slot) = self.items.get_mut(index) {
            *slot = Value::Null;
        }
    }

    /// Removes preserving order (shifts the tail down).
    pub fn remove_ordered(&mut self, index: usize) -> Option<Value> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Removes by swapping the last element into the hole.
    pub fn remove_swap(&mut self, index: usize) -> Option<Value> {
        (index < self.items.len()).then(|| self.items.swap_remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn push_fails_on_overflow_with_native_error() {
        let mut array = FixedArray::with_capacity(2);
        array.push(Value::Int(1)).unwrap();
        array.push(Value::Int(2)).unwrap();
        let err = array.push(Value::Int(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Native);
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn weak_unset_keeps_length() {
        let mut array = FixedArray::from_values(vec![Value::Int(1), Value::Int(2)]);
        array.unset_weak(0);
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0), Some(Value::Null));
        assert_eq!(array.get(1), Some(Value::Int(2)));
    }

    #[test]
    fn ordered_remove_shifts() {
        let mut array = FixedArray::from_values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(array.remove_ordered(0), Some(Value::Int(1)));
        assert_eq!(array.as_slice(), &[Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn swap_remove_moves_last_into_hole() {
        let mut array = FixedArray::from_values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(array.remove_swap(0), Some(Value::Int(1)));
        assert_eq!(array.as_slice(), &[Value::Int(3), Value::Int(2)]);
    }

    #[test]
    fn set_out_of_bounds_errors() {
        let mut array = FixedArray::with_capacity(1);
        assert!(array.set(0, Value::Int(1)).is_err());
    }
}
