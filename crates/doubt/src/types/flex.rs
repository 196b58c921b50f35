use crate::{intern::StringId, types::next_prime, value::Value};

/// Growable array whose capacity steps through the prime table.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct FlexArray {
    items: Vec<Value>,
}

impl FlexArray {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, value: Value) {
        if self.items.len() == self.items.capacity() {
            let want = next_prime(self.items.len() + 1);
            self.items.reserve_exact(want - self.items.len());
        }
        self.items.push(value);
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FlexSlot {
    Empty,
    Occupied { hash: u64, key: StringId, value: Value },
}

/// Open-addressing dictionary with linear probing.
///
/// The table rehashes into the next prime capacity once three quarters
/// full, keeping probe sequences short. Keys are never removed, so no
/// tombstones are needed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlexDict {
    slots: Vec<FlexSlot>,
    len: usize,
}

impl FlexDict {
    pub fn new() -> Self {
        Self {
            slots: vec![FlexSlot::Empty; next_prime(0)],
            len: 0,
        }
    }

    /// Inserts or overwrites; returns the previous value on overwrite.
    pub fn insert(&mut self, key: StringId, hash: u64, value: Value) -> Option<Value> {
        if (self.len + 1) * 4 >= self.slots.len() * 3 {
            self.grow();
        }
        let mut index = (hash % self.slots.len() as u64) as usize;
        loop {
            match self.slots[index] {
                FlexSlot::Empty => {
                    self.slots[index] = FlexSlot::Occupied { hash, key, value };
                    self.len += 1;
                    return None;
                }
                FlexSlot::Occupied {
                    hash: occupied_hash,
                    key: occupied_key,
                    value: previous,
                } => {
                    if occupied_hash == hash && occupied_key == key {
                        self.slots[index] = FlexSlot::Occupied { hash, key, value };
                        return Some(previous);
                    }
                }
            }
            index = (index + 1) % self.slots.len();
        }
    }

    pub fn find(&self, key: StringId, hash: u64) -> Option<Value> {
        let mut index = (hash % self.slots.len() as u64) as usize;
        loop {
            match self.slots[index] {
                FlexSlot::Empty => return None,
                FlexSlot::Occupied {
                    hash: occupied_hash,
                    key: occupied_key,
                    value,
                } => {
                    if occupied_hash == hash && occupied_key == key {
                        return Some(value);
                    }
                }
            }
            index = (index + 1) % self.slots.len();
        }
    }

    pub fn contains(&self, key: StringId, hash: u64) -> bool {
        self.find(key, hash).is_some()
    }

    fn grow(&mut self) {
        let bigger = next_prime(self.slots.len() + 1);
        let old = std::mem::replace(&mut self.slots, vec![FlexSlot::Empty; bigger]);
        self.len = 0;
        for slot in old {
            if let FlexSlot::Occupied { hash, key, value } = slot {
                self.reinsert(key, hash, value);
            }
        }
    }

    /// Insert during rehash: keys are known distinct, no overwrite check.
    fn reinsert(&mut self, key: StringId, hash: u64, value: Value) {
        let mut index = (hash % self.slots.len() as u64) as usize;
        while !matches!(self.slots[index], FlexSlot::Empty) {
            index = (index + 1) % self.slots.len();
        }
        self.slots[index] = FlexSlot::Occupied { hash, key, value };
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates occupied slots in table storage order.
    pub fn iter(&self) -> impl Iterator<Item = (StringId, Value)> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            FlexSlot::Empty => None,
            FlexSlot::Occupied { key, value, .. } => Some((*key, *value)),
        })
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.iter().map(|(_, value)| value)
    }
}

impl Default for FlexDict {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    #[test]
    fn flex_array_grows_through_prime_capacities() {
        let mut flex = FlexArray::new();
        for i in 0..100 {
            flex.push(Value::Int(i));
        }
        assert_eq!(flex.len(), 100);
        assert_eq!(flex.get(99), Some(Value::Int(99)));
        assert_eq!(flex.get(100), None);
    }

    #[test]
    fn flex_dict_insert_find_overwrite() {
        let mut interns = Interns::new();
        let mut dict = FlexDict::new();
        let key = interns.intern("weight");
        let hash = interns.hash(key);
        assert_eq!(dict.insert(key, hash, Value::Int(1)), None);
        assert_eq!(dict.insert(key, hash, Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(dict.find(key, hash), Some(Value::Int(2)));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn flex_dict_rehashes_when_filling_up() {
        let mut interns = Interns::new();
        let mut dict = FlexDict::new();
        let initial_capacity = dict.capacity();
        let keys: Vec<_> = (0..200)
            .map(|i| {
                let key = interns.intern(&format!("field{i}"));
                (key, interns.hash(key))
            })
            .collect();
        for (i, &(key, hash)) in keys.iter().enumerate() {
            dict.insert(key, hash, Value::Int(i as i64));
        }
        assert!(dict.capacity() > initial_capacity);
        for (i, &(key, hash)) in keys.iter().enumerate() {
            assert_eq!(dict.find(key, hash), Some(Value::Int(i as i64)));
        }
    }

    #[test]
    fn flex_dict_missing_key_is_none() {
        let mut interns = Interns::new();
        let dict = FlexDict::new();
        let key = interns.intern("absent");
        assert_eq!(dict.find(key, interns.hash(key)), None);
    }
}
