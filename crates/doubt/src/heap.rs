use std::collections::BTreeMap;

use crate::{
    intern::StringId,
    types::{next_prime, FixedArray, FlexArray, FunctionRecord, Generator, Instance, Sampler, Scope, StructDef},
    value::Value,
};

/// Bytes of allocation between collection triggers.
const DEFAULT_COLLECT_THRESHOLD: usize = 1 << 20;

/// Unique identifier for an object stored on the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(usize);

impl HeapId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Concrete object payload held in a live heap slot.
///
/// The chained and open-addressing dictionaries are not standalone heap
/// objects: they only ever back a `Scope` or an `Instance` as embedded
/// fields.
#[derive(Debug)]
pub(crate) enum HeapData {
    /// 64-bit float cell (the unboxed scalar float is 32-bit).
    Double(f64),
    Array(FixedArray),
    Flex(FlexArray),
    Scope(Scope),
    StructDef(StructDef),
    Instance(Instance),
    Function(FunctionRecord),
    Generator(Generator),
    Sampler(Sampler),
}

impl HeapData {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "Double",
            Self::Array(_) => "Array",
            Self::Flex(_) => "Flex",
            Self::Scope(_) => "Scope",
            Self::StructDef(_) => "StructDef",
            Self::Instance(_) => "Instance",
            Self::Function(_) => "Function",
            Self::Generator(_) => "Generator",
            Self::Sampler(_) => "Sampler",
        }
    }

    /// Rough payload size for the collection trigger accounting.
    fn estimate_size(&self) -> usize {
        let value_size = std::mem::size_of::<Value>();
        match self {
            Self::Double(_) => 8,
            Self::Array(array) => 32 + array.capacity() * value_size,
            Self::Flex(flex) => 32 + flex.len() * value_size,
            Self::Scope(scope) => 64 + scope.len() * 48,
            Self::StructDef(def) => 32 + def.fields.len() * 24,
            Self::Instance(instance) => 32 + instance.fields.capacity() * 32,
            Self::Function(_) | Self::Sampler(_) => 24,
            Self::Generator(_) => 48,
        }
    }

    /// Pushes every heap id this object references onto the mark worklist.
    fn trace(&self, worklist: &mut Vec<HeapId>) {
        let mut push_value = |value: Value| {
            if let Value::Ref(id) = value {
                worklist.push(id);
            }
        };
        match self {
            Self::Double(_) => {}
            Self::Array(array) => array.as_slice().iter().copied().for_each(&mut push_value),
            Self::Flex(flex) => flex.as_slice().iter().copied().for_each(&mut push_value),
            Self::Scope(scope) => {
                scope.values().for_each(&mut push_value);
                if let Some(parent) = scope.parent() {
                    worklist.push(parent);
                }
            }
            Self::StructDef(def) => def.fields.iter().map(|field| field.default).for_each(&mut push_value),
            Self::Instance(instance) => {
                instance.fields.values().for_each(&mut push_value);
                worklist.push(instance.template);
            }
            Self::Function(record) => worklist.push(record.captured),
            Self::Generator(generator) => {
                worklist.push(generator.scope);
                // Scopes and sequence values captured in a suspended
                // generator's resume path stay reachable between steps.
                for frame in &generator.resume {
                    for id in frame.heap_refs().into_iter().flatten() {
                        worklist.push(id);
                    }
                }
            }
            Self::Sampler(sampler) => push_value(sampler.model),
        }
    }
}

/// One handle-table slot. The free list is threaded intrusively through the
/// slots themselves: a free slot stores the index of the next free slot.
#[derive(Debug)]
enum Slot {
    Live { data: HeapData, marked: bool },
    Free { next: Option<usize> },
}

/// Snapshot of heap state, used by tests and debug output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeapStats {
    pub live_objects: usize,
    pub free_slots: usize,
    pub total_slots: usize,
    /// Live objects by `HeapData` variant name, deterministically ordered.
    pub objects_by_type: BTreeMap<&'static str, usize>,
    pub collections: usize,
}

/// The garbage-collected object heap.
///
/// A growable vector of handles plus an intrusive free list. Allocation pops
/// the free list when possible; otherwise the handle vector grows to the
/// next prime capacity. Collection is mark-and-sweep, triggered by a byte
/// threshold and run only from the evaluator's safe points, where the root
/// set is fully enumerable. Objects never move.
#[derive(Debug)]
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    free_len: usize,
    bytes_since_collect: usize,
    collect_threshold: usize,
    collections: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_COLLECT_THRESHOLD)
    }

    pub fn with_threshold(collect_threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            free_len: 0,
            bytes_since_collect: 0,
            collect_threshold,
            collections: 0,
        }
    }

    /// Allocates a heap object and returns its handle.
    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        self.bytes_since_collect += data.estimate_size();
        if let Some(index) = self.free_head {
            let next = match &self.slots[index] {
                Slot::Free { next } => *next,
                Slot::Live { .. } => unreachable!("free list points at a live slot"),
            };
            self.free_head = next;
            self.free_len -= 1;
            self.slots[index] = Slot::Live { data, marked: false };
            return HeapId(index);
        }
        if self.slots.len() == self.slots.capacity() {
            let want = next_prime(self.slots.len() + 1);
            self.slots.reserve_exact(want - self.slots.len());
        }
        let index = self.slots.len();
        self.slots.push(Slot::Live { data, marked: false });
        HeapId(index)
    }

    /// # Panics
    /// Panics when the handle points at a freed slot; handles held by live
    /// values are always live (the collector only frees unreachable slots).
    pub fn get(&self, id: HeapId) -> &HeapData {
        match &self.slots[id.index()] {
            Slot::Live { data, .. } => data,
            Slot::Free { .. } => panic!("heap handle {} points at a freed slot", id.index()),
        }
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        match &mut self.slots[id.index()] {
            Slot::Live { data, .. } => data,
            Slot::Free { .. } => panic!("heap handle {} points at a freed slot", id.index()),
        }
    }

    /// Whether enough allocation happened to warrant a collection.
    pub fn should_collect(&self) -> bool {
        self.bytes_since_collect >= self.collect_threshold
    }

    /// Mark-and-sweep over the given roots. Returns the number of slots
    /// swept onto the free list.
    ///
    /// Marks persist until the next collection's mark phase, so tests can
    /// observe that every reachable object is marked after a sweep.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = HeapId>) -> usize {
        // Mark phase: clear old marks, then flood from the roots.
        for slot in &mut self.slots {
            if let Slot::Live { marked, .. } = slot {
                *marked = false;
            }
        }
        let mut worklist: Vec<HeapId> = roots.into_iter().collect();
        while let Some(id) = worklist.pop() {
            match &mut self.slots[id.index()] {
                Slot::Live { marked, .. } if *marked => {}
                Slot::Live { marked, data } => {
                    *marked = true;
                    data.trace(&mut worklist);
                }
                Slot::Free { .. } => unreachable!("root or traced edge points at a freed slot"),
            }
        }

        // Sweep phase: thread unmarked slots onto the free list.
        let mut swept = 0;
        for index in 0..self.slots.len() {
            if matches!(self.slots[index], Slot::Live { marked: false, .. }) {
                self.slots[index] = Slot::Free { next: self.free_head };
                self.free_head = Some(index);
                self.free_len += 1;
                swept += 1;
            }
        }
        self.bytes_since_collect = 0;
        self.collections += 1;
        swept
    }

    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut live_objects = 0;
        for slot in &self.slots {
            if let Slot::Live { data, .. } = slot {
                live_objects += 1;
                *objects_by_type.entry(data.type_name()).or_insert(0) += 1;
            }
        }
        HeapStats {
            live_objects,
            free_slots: self.free_len,
            total_slots: self.slots.len(),
            objects_by_type,
            collections: self.collections,
        }
    }

    /// Whether the slot behind `id` is on the free list.
    pub fn is_free(&self, id: HeapId) -> bool {
        matches!(self.slots[id.index()], Slot::Free { .. })
    }

    /// Whether the slot behind `id` is live and marked from the last
    /// collection.
    pub fn is_marked(&self, id: HeapId) -> bool {
        matches!(self.slots[id.index()], Slot::Live { marked: true, .. })
    }

    // --- typed accessors ------------------------------------------------

    pub fn scope(&self, id: HeapId) -> &Scope {
        match self.get(id) {
            HeapData::Scope(scope) => scope,
            other => panic!("expected scope, found {}", other.type_name()),
        }
    }

    pub fn scope_mut(&mut self, id: HeapId) -> &mut Scope {
        match self.get_mut(id) {
            HeapData::Scope(scope) => scope,
            other => panic!("expected scope, found {}", other.type_name()),
        }
    }

    pub fn struct_def(&self, id: HeapId) -> &StructDef {
        match self.get(id) {
            HeapData::StructDef(def) => def,
            other => panic!("expected struct template, found {}", other.type_name()),
        }
    }

    /// Walks the scope chain from `scope` looking for `key`.
    pub fn scope_lookup(&self, scope: HeapId, key: StringId, hash: u64) -> Option<Value> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(value) = scope.local_lookup(key, hash) {
                return Some(value);
            }
            current = scope.parent();
        }
        None
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_get_round_trip() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapData::Double(2.5));
        match heap.get(id) {
            HeapData::Double(d) => assert_eq!(*d, 2.5),
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn collect_sweeps_unreachable_objects_onto_free_list() {
        let mut heap = Heap::new();
        let keep = heap.allocate(HeapData::Double(1.0));
        let drop = heap.allocate(HeapData::Double(2.0));
        let swept = heap.collect([keep]);
        assert_eq!(swept, 1);
        assert!(heap.is_marked(keep));
        assert!(!heap.is_free(keep));
        assert!(heap.is_free(drop));
    }

    #[test]
    fn reachability_follows_container_edges() {
        let mut heap = Heap::new();
        let inner = heap.allocate(HeapData::Double(9.0));
        let outer = heap.allocate(HeapData::Array(FixedArray::from_values(vec![Value::Ref(inner)])));
        let orphan = heap.allocate(HeapData::Double(0.0));
        heap.collect([outer]);
        assert!(heap.is_marked(outer));
        assert!(heap.is_marked(inner));
        assert!(heap.is_free(orphan));
    }

    #[test]
    fn reachability_follows_scope_parents() {
        let mut heap = Heap::new();
        let parent = heap.allocate(HeapData::Scope(Scope::new(None, "globals")));
        let child = heap.allocate(HeapData::Scope(Scope::new(Some(parent), "block")));
        heap.collect([child]);
        assert!(heap.is_marked(parent));
        assert!(heap.is_marked(child));
    }

    #[test]
    fn freed_slots_are_reused_before_growth() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapData::Double(1.0));
        let total_before = heap.stats().total_slots;
        heap.collect([]);
        assert!(heap.is_free(a));
        let b = heap.allocate(HeapData::Double(2.0));
        assert_eq!(b.index(), a.index());
        assert_eq!(heap.stats().total_slots, total_before);
    }

    #[test]
    fn threshold_drives_should_collect() {
        let mut heap = Heap::with_threshold(64);
        assert!(!heap.should_collect());
        for _ in 0..16 {
            heap.allocate(HeapData::Double(0.0));
        }
        assert!(heap.should_collect());
        heap.collect([]);
        assert!(!heap.should_collect());
    }

    #[test]
    fn stats_report_types_and_counts() {
        let mut heap = Heap::new();
        heap.allocate(HeapData::Double(1.0));
        heap.allocate(HeapData::Flex(FlexArray::new()));
        let stats = heap.stats();
        assert_eq!(stats.live_objects, 2);
        assert_eq!(stats.objects_by_type.get("Double"), Some(&1));
        assert_eq!(stats.objects_by_type.get("Flex"), Some(&1));
    }
}
