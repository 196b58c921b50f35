use crate::{
    heap::HeapId,
    intern::StringId,
    types::Dict,
    value::Value,
};

/// A mutable mapping from names to values, linked to a parent scope.
///
/// `lookup` walks the parent chain; `define_local` always writes into the
/// local dict, shadowing any parent binding. Every scope has either a parent
/// or is the root (global) scope. Scopes live on the GC heap so closures can
/// keep their defining scope alive by reference.
#[derive(Debug)]
pub(crate) struct Scope {
    vars: Dict,
    /// Names bound with `const` in this scope. Redefinition checks consult
    /// only the defining scope, so shadowing a parent's const is allowed.
    consts: Vec<StringId>,
    parent: Option<HeapId>,
    doc: &'static str,
}

impl Scope {
    /// Default bucket count for a scope's dict; function and block scopes
    /// rarely hold more than a handful of names.
    const DEFAULT_BUCKETS: usize = 8;

    pub fn new(parent: Option<HeapId>, doc: &'static str) -> Self {
        Self {
            vars: Dict::with_buckets(Self::DEFAULT_BUCKETS),
            consts: Vec::new(),
            parent,
            doc,
        }
    }

    pub fn parent(&self) -> Option<HeapId> {
        self.parent
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    /// Looks a name up in this scope only (no parent walk).
    pub fn local_lookup(&self, key: StringId, hash: u64) -> Option<Value> {
        self.vars.find(key, hash)
    }

    pub fn has_local(&self, key: StringId, hash: u64) -> bool {
        self.vars.contains(key, hash)
    }

    /// Binds a name in this scope, shadowing any parent binding.
    pub fn define_local(&mut self, key: StringId, hash: u64, value: Value) {
        self.vars.insert(key, hash, value);
    }

    /// Binds a name as a constant in this scope.
    pub fn define_const(&mut self, key: StringId, hash: u64, value: Value) {
        self.vars.insert(key, hash, value);
        if !self.consts.contains(&key) {
            self.consts.push(key);
        }
    }

    /// Whether `key` was bound with `const` in this scope.
    pub fn is_const(&self, key: StringId) -> bool {
        self.consts.contains(&key)
    }

    /// Copies all local entries of `source` into this scope's local dict.
    /// Overwrites are allowed; const-ness travels with the entry. This is
    /// how the native prelude is spliced into the global scope at startup.
    pub fn merge_from(&mut self, source: &Self) {
        for entry in source.vars.iter() {
            self.vars.insert(entry.key, entry.hash, entry.value);
        }
        for &key in &source.consts {
            if !self.consts.contains(&key) {
                self.consts.push(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Stored values, for garbage-collection tracing.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.vars.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    #[test]
    fn local_define_and_lookup() {
        let mut interns = Interns::new();
        let mut scope = Scope::new(None, "globals");
        let name = interns.intern("x");
        let hash = interns.hash(name);
        assert_eq!(scope.local_lookup(name, hash), None);
        scope.define_local(name, hash, Value::Int(3));
        assert_eq!(scope.local_lookup(name, hash), Some(Value::Int(3)));
    }

    #[test]
    fn const_tracking_is_per_scope() {
        let mut interns = Interns::new();
        let mut outer = Scope::new(None, "globals");
        let name = interns.intern("limit");
        let hash = interns.hash(name);
        outer.define_const(name, hash, Value::Int(10));
        assert!(outer.is_const(name));

        let inner = Scope::new(None, "block");
        assert!(!inner.is_const(name));
    }

    #[test]
    fn merge_copies_entries_and_const_flags() {
        let mut interns = Interns::new();
        let mut source = Scope::new(None, "module");
        let a = interns.intern("a");
        let b = interns.intern("b");
        source.define_local(a, interns.hash(a), Value::Int(1));
        source.define_const(b, interns.hash(b), Value::Int(2));

        let mut dest = Scope::new(None, "globals");
        dest.merge_from(&source);
        assert_eq!(dest.local_lookup(a, interns.hash(a)), Some(Value::Int(1)));
        assert_eq!(dest.local_lookup(b, interns.hash(b)), Some(Value::Int(2)));
        assert!(dest.is_const(b));
        assert!(!dest.is_const(a));
    }
}
