use crate::{intern::StringId, types::next_prime, value::Value};

/// One entry in a chained bucket. The key's FNV-1a hash is memoized so
/// chain walks and re-inserts never re-hash the bytes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DictEntry {
    pub hash: u64,
    pub key: StringId,
    pub value: Value,
    next: Option<Box<DictEntry>>,
}

/// Chained hash table with a bucket count fixed at creation.
///
/// Buckets hold singly-linked entry chains; insert overwrites on key
/// equality, remove unlinks and returns the entry. Iteration visits buckets
/// in storage order, chains front to back.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dict {
    buckets: Vec<Option<Box<DictEntry>>>,
    len: usize,
}

impl Dict {
    pub fn with_buckets(want: usize) -> Self {
        let count = next_prime(want.max(1));
        Self {
            buckets: (0..count).map(|_| None).collect(),
            len: 0,
        }
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Inserts or overwrites; returns the previous value on overwrite.
    pub fn insert(&mut self, key: StringId, hash: u64, value: Value) -> Option<Value> {
        let bucket = self.bucket_of(hash);
        let mut cursor = &mut self.buckets[bucket];
        while let Some(entry) = cursor {
            if entry.hash == hash && entry.key == key {
                return Some(std::mem::replace(&mut entry.value, value));
            }
            cursor = &mut entry.next;
        }
        *cursor = Some(Box::new(DictEntry {
            hash,
            key,
            value,
            next: None,
        }));
        self.len += 1;
        None
    }

    pub fn find(&self, key: StringId, hash: u64) -> Option<Value> {
        let mut cursor = self.buckets[self.bucket_of(hash)].as_deref();
        while let Some(entry) = cursor {
            if entry.hash == hash && entry.key == key {
                return Some(entry.value);
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    pub fn contains(&self, key: StringId, hash: u64) -> bool {
        self.find(key, hash).is_some()
    }

    /// Unlinks the entry for `key` and returns it.
    pub fn remove(&mut self, key: StringId, hash: u64) -> Option<Box<DictEntry>> {
        let bucket = self.bucket_of(hash);
        let mut cursor = &mut self.buckets[bucket];
        while cursor
            .as_ref()
            .is_some_and(|entry| !(entry.hash == hash && entry.key == key))
        {
            cursor = &mut cursor.as_mut().expect("chain link checked above").next;
        }
        let mut removed = cursor.take()?;
        *cursor = removed.next.take();
        self.len -= 1;
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates entries in bucket storage order.
    pub fn iter(&self) -> DictIter<'_> {
        DictIter {
            buckets: &self.buckets,
            bucket: 0,
            entry: None,
        }
    }

    /// Iterates the stored values (for display and garbage-collection
    /// tracing).
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.iter().map(|entry| entry.value)
    }
}

pub(crate) struct DictIter<'a> {
    buckets: &'a [Option<Box<DictEntry>>],
    bucket: usize,
    entry: Option<&'a DictEntry>,
}

impl<'a> Iterator for DictIter<'a> {
    type Item = &'a DictEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entry.take() {
                self.entry = entry.next.as_deref();
                return Some(entry);
            }
            if self.bucket >= self.buckets.len() {
                return None;
            }
            self.entry = self.buckets[self.bucket].as_deref();
            self.bucket += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    fn keyed(interns: &mut Interns, name: &str) -> (StringId, u64) {
        let id = interns.intern(name);
        (id, interns.hash(id))
    }

    #[test]
    fn insert_find_overwrite() {
        let mut interns = Interns::new();
        let mut dict = Dict::with_buckets(4);
        let (key, hash) = keyed(&mut interns, "alpha");
        assert_eq!(dict.insert(key, hash, Value::Int(1)), None);
        assert_eq!(dict.find(key, hash), Some(Value::Int(1)));
        assert_eq!(dict.insert(key, hash, Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(dict.find(key, hash), Some(Value::Int(2)));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn remove_unlinks_and_returns_entry() {
        let mut interns = Interns::new();
        let mut dict = Dict::with_buckets(2);
        let (a, ha) = keyed(&mut interns, "a");
        let (b, hb) = keyed(&mut interns, "b");
        dict.insert(a, ha, Value::Int(1));
        dict.insert(b, hb, Value::Int(2));
        let removed = dict.remove(a, ha).unwrap();
        assert_eq!(removed.value, Value::Int(1));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.find(a, ha), None);
        assert_eq!(dict.find(b, hb), Some(Value::Int(2)));
    }

    #[test]
    fn chains_survive_colliding_buckets() {
        // One bucket forces every entry onto a single chain.
        let mut interns = Interns::new();
        let mut dict = Dict {
            buckets: vec![None],
            len: 0,
        };
        let keys: Vec<(StringId, u64)> = (0..20)
            .map(|i| keyed(&mut interns, &format!("key{i}")))
            .collect();
        for (i, &(key, hash)) in keys.iter().enumerate() {
            dict.insert(key, hash, Value::Int(i as i64));
        }
        for (i, &(key, hash)) in keys.iter().enumerate() {
            assert_eq!(dict.find(key, hash), Some(Value::Int(i as i64)));
        }
        assert_eq!(dict.len(), 20);
        assert_eq!(dict.iter().count(), 20);
    }

    #[test]
    fn iteration_visits_every_entry_once() {
        let mut interns = Interns::new();
        let mut dict = Dict::with_buckets(8);
        for i in 0..10 {
            let (key, hash) = keyed(&mut interns, &format!("k{i}"));
            dict.insert(key, hash, Value::Int(i));
        }
        let mut seen: Vec<i64> = dict
            .iter()
            .map(|entry| match entry.value {
                Value::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
