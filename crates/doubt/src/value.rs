use std::fmt::Write;

use strum::Display as StrumDisplay;

use crate::{
    builtins::NativeFn,
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StringId},
};

/// Maximum depth `fmt_value` will follow container references before
/// printing an ellipsis. Guards against cyclic structures.
const MAX_FMT_DEPTH: usize = 32;

/// Control-flow sentinel carried inside a [`Value::State`].
///
/// Sentinels propagate unchanged through expression contexts and are
/// consumed by the innermost loop or function boundary that recognizes
/// them. `Return` and `Yield` payloads ride in the evaluator's pending
/// slot; the sentinel itself stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
#[strum(serialize_all = "UPPERCASE")]
pub(crate) enum StateKind {
    Break,
    Continue,
    Return,
    Yield,
    Done,
    Exit,
}

/// A symbol tag: up to 11 characters of `[A-Z0-9]`, base-37 packed into a
/// single word. The printable form is `#NAME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Symbol(u64);

const TAG_RADIX: u64 = 37;
pub(crate) const TAG_MAX_CHARS: usize = 11;

impl Symbol {
    /// Packs a bare symbol name (without the leading `#`).
    ///
    /// Returns `None` for the empty string, names longer than 11
    /// characters, or characters outside `[A-Z0-9]`.
    pub fn pack(name: &str) -> Option<Self> {
        if name.is_empty() || name.len() > TAG_MAX_CHARS {
            return None;
        }
        let mut packed = 0u64;
        let mut scale = 1u64;
        for ch in name.chars() {
            let digit = match ch {
                'A'..='Z' => ch as u64 - 'A' as u64 + 1,
                '0'..='9' => ch as u64 - '0' as u64 + 27,
                _ => return None,
            };
            packed += digit * scale;
            scale = scale.wrapping_mul(TAG_RADIX);
        }
        Some(Self(packed))
    }

    /// Decodes back to the bare symbol name.
    pub fn unpack(self) -> String {
        let mut out = String::new();
        let mut rest = self.0;
        while rest != 0 {
            let digit = rest % TAG_RADIX;
            rest /= TAG_RADIX;
            let ch = match digit {
                1..=26 => (b'A' + (digit as u8 - 1)) as char,
                27..=36 => (b'0' + (digit as u8 - 27)) as char,
                _ => '?',
            };
            out.push(ch);
        }
        out
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.unpack())
    }
}

/// Runtime type of a value, used in error messages and method resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Type {
    Null,
    Bool,
    Int,
    Byte,
    Char,
    Float,
    Double,
    Tag,
    State,
    Str,
    Native,
    Array,
    Scope,
    Struct,
    Instance,
    Function,
    Generator,
    Sampler,
}

impl Type {
    /// The capitalized prefix method resolution uses for `TypeName_method`
    /// lookups. Instances use their struct name instead.
    pub fn method_prefix(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Byte => "Byte",
            Self::Char => "Char",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Tag => "Tag",
            Self::State => "State",
            Self::Str => "Str",
            Self::Native => "Native",
            Self::Array => "Array",
            Self::Scope => "Scope",
            Self::Struct => "Struct",
            Self::Instance => "Instance",
            Self::Function => "Fn",
            Self::Generator => "Generator",
            Self::Sampler => "Sampler",
        }
    }
}

/// Primary runtime value.
///
/// Small scalars are stored inline; everything else is either an interned
/// string id or a [`HeapId`] into the garbage-collected heap. The whole enum
/// is `Copy` — liveness is the tracing collector's job, so values can be
/// duplicated freely without bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Byte(u8),
    Char(char),
    /// 32-bit float scalar. Wrap/unwrap is bit-preserving.
    Float(f32),
    /// Base-37 packed symbol (`#NAME`).
    Tag(Symbol),
    /// Control-flow sentinel.
    State(StateKind),
    /// Interned, arena-backed string view.
    Str(StringId),
    /// Prelude function reference.
    Native(NativeFn),
    /// Handle to a heap object (arrays, dicts, scopes, doubles, functions...).
    Ref(HeapId),
}

impl Value {
    pub fn wrap_float(f: f32) -> Self {
        Self::Float(f)
    }

    pub fn as_float(self) -> Option<f32> {
        match self {
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn ref_id(self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_state(self) -> bool {
        matches!(self, Self::State(_))
    }

    pub fn as_state(self) -> Option<StateKind> {
        match self {
            Self::State(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn type_of(self, heap: &Heap) -> Type {
        match self {
            Self::Null => Type::Null,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Byte(_) => Type::Byte,
            Self::Char(_) => Type::Char,
            Self::Float(_) => Type::Float,
            Self::Tag(_) => Type::Tag,
            Self::State(_) => Type::State,
            Self::Str(_) => Type::Str,
            Self::Native(_) => Type::Native,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Double(_) => Type::Double,
                HeapData::Array(_) | HeapData::Flex(_) => Type::Array,
                HeapData::Scope(_) => Type::Scope,
                HeapData::StructDef(_) => Type::Struct,
                HeapData::Instance(_) => Type::Instance,
                HeapData::Function(_) => Type::Function,
                HeapData::Generator(_) => Type::Generator,
                HeapData::Sampler(_) => Type::Sampler,
            },
        }
    }

    /// Numeric view as `f64`, when the value is numeric at all.
    pub fn as_f64(self, heap: &Heap) -> Option<f64> {
        match self {
            Self::Int(v) => Some(v as f64),
            Self::Byte(v) => Some(f64::from(v)),
            Self::Float(v) => Some(f64::from(v)),
            Self::Ref(id) => match heap.get(id) {
                HeapData::Double(d) => Some(*d),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_numeric(self, heap: &Heap) -> bool {
        self.as_f64(heap).is_some()
    }

    /// Truthiness: `false`, numeric zero, the empty string, and empty
    /// containers are falsy; everything else is truthy.
    pub fn truthy(self, heap: &Heap, interns: &Interns) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => b,
            Self::Int(v) => v != 0,
            Self::Byte(v) => v != 0,
            Self::Char(c) => c != '\0',
            Self::Float(f) => f != 0.0,
            Self::Tag(_) | Self::State(_) | Self::Native(_) => true,
            Self::Str(id) => !interns.get(id).is_empty(),
            Self::Ref(id) => match heap.get(id) {
                HeapData::Double(d) => *d != 0.0,
                HeapData::Array(array) => !array.is_empty(),
                HeapData::Flex(flex) => !flex.is_empty(),
                _ => true,
            },
        }
    }

    /// Tag-aware equality.
    ///
    /// Numbers compare across Int/Byte/Float/Double; strings compare by
    /// contents (id equality after interning); container references compare
    /// elementwise with identical-handle fast path.
    pub fn eq_value(self, other: Self, heap: &Heap, interns: &Interns) -> bool {
        if let (Self::Ref(a), Self::Ref(b)) = (self, other)
            && a == b
        {
            return true;
        }
        if let (Some(a), Some(b)) = (self.as_f64(heap), other.as_f64(heap)) {
            return a == b;
        }
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Tag(a), Self::Tag(b)) => a == b,
            (Self::State(a), Self::State(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b || interns.get(a) == interns.get(b),
            (Self::Native(a), Self::Native(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => match (heap.get(a), heap.get(b)) {
                (HeapData::Array(lhs), HeapData::Array(rhs)) => {
                    arrays_eq(lhs.as_slice(), rhs.as_slice(), heap, interns)
                }
                (HeapData::Flex(lhs), HeapData::Flex(rhs)) => {
                    arrays_eq(lhs.as_slice(), rhs.as_slice(), heap, interns)
                }
                (HeapData::Array(lhs), HeapData::Flex(rhs)) => {
                    arrays_eq(lhs.as_slice(), rhs.as_slice(), heap, interns)
                }
                (HeapData::Flex(lhs), HeapData::Array(rhs)) => {
                    arrays_eq(lhs.as_slice(), rhs.as_slice(), heap, interns)
                }
                _ => false,
            },
            _ => false,
        }
    }
}

fn arrays_eq(lhs: &[Value], rhs: &[Value], heap: &Heap, interns: &Interns) -> bool {
    lhs.len() == rhs.len()
        && lhs
            .iter()
            .zip(rhs)
            .all(|(&a, &b)| a.eq_value(b, heap, interns))
}

/// Writes the display form of a value.
///
/// `repr` selects the form used inside containers: strings and chars gain
/// quotes, everything else is unchanged.
pub(crate) fn fmt_value(value: Value, heap: &Heap, interns: &Interns, out: &mut String, repr: bool) {
    fmt_value_depth(value, heap, interns, out, repr, 0);
}

fn fmt_value_depth(value: Value, heap: &Heap, interns: &Interns, out: &mut String, repr: bool, depth: usize) {
    if depth > MAX_FMT_DEPTH {
        out.push_str("...");
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Byte(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Char(c) => {
            if repr {
                let _ = write!(out, "'{c}'");
            } else {
                out.push(c);
            }
        }
        Value::Float(f) => out.push_str(ryu::Buffer::new().format(f)),
        Value::Tag(symbol) => {
            let _ = write!(out, "{symbol}");
        }
        Value::State(kind) => {
            let _ = write!(out, "{kind}");
        }
        Value::Str(id) => {
            if repr {
                let _ = write!(out, "'{}'", interns.get(id));
            } else {
                out.push_str(interns.get(id));
            }
        }
        Value::Native(native) => {
            let _ = write!(out, "<native {native}>");
        }
        Value::Ref(id) => fmt_heap_value(id, heap, interns, out, depth),
    }
}

fn fmt_heap_value(id: HeapId, heap: &Heap, interns: &Interns, out: &mut String, depth: usize) {
    match heap.get(id) {
        HeapData::Double(d) => out.push_str(ryu::Buffer::new().format(*d)),
        HeapData::Array(array) => fmt_values(array.as_slice(), heap, interns, out, depth),
        HeapData::Flex(flex) => fmt_values(flex.as_slice(), heap, interns, out, depth),
        HeapData::Scope(scope) => {
            let _ = write!(out, "<scope {}>", scope.doc());
        }
        HeapData::StructDef(def) => {
            let _ = write!(out, "<struct {}>", interns.get(def.name));
        }
        HeapData::Instance(instance) => {
            let template = heap.struct_def(instance.template);
            let _ = write!(out, "{} {{", interns.get(template.name));
            for (i, field) in template.fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} = ", interns.get(field.name));
                let value = instance
                    .fields
                    .find(field.name, interns.hash(field.name))
                    .unwrap_or(Value::Null);
                fmt_value_depth(value, heap, interns, out, true, depth + 1);
            }
            out.push('}');
        }
        HeapData::Function(record) => match record.name {
            Some(name) => {
                let _ = write!(out, "<fn {}>", interns.get(name));
            }
            None => out.push_str("<fn>"),
        },
        HeapData::Generator(generator) => {
            let _ = write!(out, "<generator {}>", generator.state);
        }
        HeapData::Sampler(sampler) => {
            let _ = write!(out, "<sampler {}>", sampler.method);
        }
    }
}

fn fmt_values(values: &[Value], heap: &Heap, interns: &Interns, out: &mut String, depth: usize) {
    out.push('[');
    for (i, &value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_value_depth(value, heap, interns, out, true, depth + 1);
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_wrap_unwrap_is_bit_identical() {
        for f in [0.0f32, -0.0, 1.5, -3.25, f32::MIN_POSITIVE, f32::MAX, f32::INFINITY] {
            let wrapped = Value::wrap_float(f);
            let unwrapped = wrapped.as_float().unwrap();
            assert_eq!(unwrapped.to_bits(), f.to_bits());
        }
    }

    #[test]
    fn tag_pack_unpack_is_identity() {
        for name in ["A", "MCMC", "HMC", "Z9", "ABCDEFGHIJK", "X0X0X0X0X0X"] {
            let symbol = Symbol::pack(name).unwrap();
            assert_eq!(symbol.unpack(), name);
        }
    }

    #[test]
    fn tag_rejects_invalid_symbols() {
        assert!(Symbol::pack("").is_none());
        assert!(Symbol::pack("lowercase").is_none());
        assert!(Symbol::pack("TOOLONGTOFIT").is_none());
        assert!(Symbol::pack("WITH-DASH").is_none());
    }

    #[test]
    fn distinct_symbols_pack_distinctly() {
        let a = Symbol::pack("AB").unwrap();
        let b = Symbol::pack("BA").unwrap();
        assert_ne!(a.raw(), b.raw());
    }

    #[test]
    fn symbol_displays_with_hash_prefix() {
        assert_eq!(Symbol::pack("MCMC").unwrap().to_string(), "#MCMC");
    }

    #[test]
    fn state_kinds_render_uppercase() {
        assert_eq!(StateKind::Break.to_string(), "BREAK");
        assert_eq!(StateKind::Exit.to_string(), "EXIT");
    }

    #[test]
    fn scalar_truthiness() {
        let heap = Heap::new();
        let interns = Interns::new();
        assert!(!Value::Null.truthy(&heap, &interns));
        assert!(!Value::Int(0).truthy(&heap, &interns));
        assert!(Value::Int(-1).truthy(&heap, &interns));
        assert!(!Value::Float(0.0).truthy(&heap, &interns));
        assert!(!Value::Str(Interns::EMPTY).truthy(&heap, &interns));
        assert!(Value::Bool(true).truthy(&heap, &interns));
    }

    #[test]
    fn numbers_compare_across_tags() {
        let heap = Heap::new();
        let interns = Interns::new();
        assert!(Value::Int(2).eq_value(Value::Float(2.0), &heap, &interns));
        assert!(Value::Byte(7).eq_value(Value::Int(7), &heap, &interns));
        assert!(!Value::Int(2).eq_value(Value::Str(Interns::EMPTY), &heap, &interns));
    }
}
