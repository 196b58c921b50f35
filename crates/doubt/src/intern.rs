use hashbrown::HashTable;

use crate::{
    arena::{Arena, ArenaStr, LifetimeClass},
    strings::fnv1a,
};

/// Unique identifier for an interned string.
///
/// Look the id up in [`Interns`] to get the actual text. Ids are stable for
/// the lifetime of the interner and identical contents always map to the
/// same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct StringId(u32);

impl StringId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct InternEntry {
    view: ArenaStr,
    /// FNV-1a of the bytes, memoized at intern time.
    hash: u64,
}

/// Arena-backed string storage with content deduplication.
///
/// Every string the interpreter touches lives here: the source copy, token
/// text, identifiers, literals, and runtime-built strings. The arena carries
/// the module lifetime class — it is reset only when the whole program run
/// is torn down, which is what makes `Value::Str` a plain `Copy` id.
#[derive(Debug)]
pub(crate) struct Interns {
    arena: Arena,
    entries: Vec<InternEntry>,
    table: HashTable<StringId>,
}

impl Interns {
    /// Id of the pre-interned `"main"`.
    pub const MAIN: StringId = StringId(0);
    /// Id of the pre-interned `"sample"` (method name probed by the
    /// `sample` native).
    pub const SAMPLE: StringId = StringId(1);
    /// Id of the pre-interned empty string.
    pub const EMPTY: StringId = StringId(2);

    pub fn new() -> Self {
        let mut interns = Self {
            arena: Arena::with_lifetime(LifetimeClass::Module),
            entries: Vec::new(),
            table: HashTable::new(),
        };
        let main = interns.intern("main");
        let sample = interns.intern("sample");
        let empty = interns.intern("");
        debug_assert_eq!(main, Self::MAIN);
        debug_assert_eq!(sample, Self::SAMPLE);
        debug_assert_eq!(empty, Self::EMPTY);
        interns
    }

    /// Interns `text`, copying it into the arena unless already present.
    pub fn intern(&mut self, text: &str) -> StringId {
        let hash = fnv1a(text.as_bytes());
        if let Some(&id) = self
            .table
            .find(hash, |&id| self.arena.get(self.entries[id.index()].view) == text.as_bytes())
        {
            return id;
        }
        let view = self.arena.alloc_str(text);
        self.insert_entry(view, hash)
    }

    /// Interns an existing arena view without copying its bytes.
    ///
    /// This is how `split` and `trim` return views that share the source
    /// block: a previously unseen piece gets an entry pointing at the
    /// original bytes.
    pub fn intern_view(&mut self, view: ArenaStr) -> StringId {
        let hash = fnv1a(self.arena.get(view));
        if let Some(&id) = self.table.find(hash, |&id| {
            self.arena.get(self.entries[id.index()].view) == self.arena.get(view)
        }) {
            return id;
        }
        self.insert_entry(view, hash)
    }

    fn insert_entry(&mut self, view: ArenaStr, hash: u64) -> StringId {
        let id = StringId(u32::try_from(self.entries.len()).expect("intern table overflow"));
        self.entries.push(InternEntry { view, hash });
        let entries = &self.entries;
        self.table.insert_unique(hash, id, |&id| entries[id.index()].hash);
        id
    }

    pub fn get(&self, id: StringId) -> &str {
        self.arena.get_str(self.entries[id.index()].view)
    }

    /// The memoized FNV-1a hash of an interned string.
    pub fn hash(&self, id: StringId) -> u64 {
        self.entries[id.index()].hash
    }

    pub fn view(&self, id: StringId) -> ArenaStr {
        self.entries[id.index()].view
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Bytes held by the backing arena.
    pub fn arena_used(&self) -> usize {
        self.arena.used()
    }
}

impl Default for Interns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_contents_share_an_id() {
        let mut interns = Interns::new();
        let a = interns.intern("scope");
        let b = interns.intern(&format!("sco{}", "pe"));
        assert_eq!(a, b);
        assert_eq!(interns.get(a), "scope");
    }

    #[test]
    fn distinct_contents_get_distinct_ids() {
        let mut interns = Interns::new();
        let a = interns.intern("left");
        let b = interns.intern("right");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_memoized_per_entry() {
        let mut interns = Interns::new();
        let id = interns.intern("memo");
        assert_eq!(interns.hash(id), fnv1a(b"memo"));
    }

    #[test]
    fn statics_are_pre_interned() {
        let mut interns = Interns::new();
        assert_eq!(interns.get(Interns::MAIN), "main");
        assert_eq!(interns.get(Interns::SAMPLE), "sample");
        assert_eq!(interns.get(Interns::EMPTY), "");
        assert_eq!(interns.intern("main"), Interns::MAIN);
    }

    #[test]
    fn intern_view_dedups_against_copied_strings() {
        let mut interns = Interns::new();
        let whole = interns.intern("x,y");
        let x = interns.intern("x");
        let piece = interns.view(whole).slice(0, 1);
        assert_eq!(interns.intern_view(piece), x);
    }
}
