use std::fmt::{self, Display};

use crate::{
    heap::{Heap, HeapData},
    intern::Interns,
    value::{fmt_value, Value},
};

/// Public mirror of a runtime value, detached from the interpreter's heap
/// and interner so API consumers can inspect results after the run ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Byte(u8),
    Char(char),
    Float(f32),
    Double(f64),
    Str(String),
    /// A `#NAME` symbol, rendered with its `#` prefix.
    Tag(String),
    /// A control-flow sentinel name (`BREAK`, `EXIT`, ...).
    State(String),
    Array(Vec<Object>),
    /// A struct instance: type name plus fields in declaration order.
    Instance {
        name: String,
        fields: Vec<(String, Object)>,
    },
    /// Anything without a structural mirror (functions, generators,
    /// scopes); carries the display form.
    Opaque(String),
}

impl Object {
    pub(crate) fn from_value(value: Value, heap: &Heap, interns: &Interns) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(v) => Self::Int(v),
            Value::Byte(v) => Self::Byte(v),
            Value::Char(c) => Self::Char(c),
            Value::Float(f) => Self::Float(f),
            Value::Tag(symbol) => Self::Tag(symbol.to_string()),
            Value::State(kind) => Self::State(kind.to_string()),
            Value::Str(id) => Self::Str(interns.get(id).to_owned()),
            Value::Ref(id) => match heap.get(id) {
                HeapData::Double(d) => Self::Double(*d),
                HeapData::Array(array) => Self::Array(
                    array
                        .as_slice()
                        .iter()
                        .map(|&item| Self::from_value(item, heap, interns))
                        .collect(),
                ),
                HeapData::Flex(flex) => Self::Array(
                    flex.as_slice()
                        .iter()
                        .map(|&item| Self::from_value(item, heap, interns))
                        .collect(),
                ),
                HeapData::Instance(instance) => {
                    let template = heap.struct_def(instance.template);
                    let fields = template
                        .fields
                        .iter()
                        .map(|field| {
                            let field_value = instance
                                .fields
                                .find(field.name, interns.hash(field.name))
                                .unwrap_or(Value::Null);
                            (
                                interns.get(field.name).to_owned(),
                                Self::from_value(field_value, heap, interns),
                            )
                        })
                        .collect();
                    Self::Instance {
                        name: interns.get(template.name).to_owned(),
                        fields,
                    }
                }
                _ => {
                    let mut out = String::new();
                    fmt_value(value, heap, interns, &mut out, false);
                    Self::Opaque(out)
                }
            },
            Value::Native(native) => Self::Opaque(format!("<native {native}>")),
        }
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Char(c) => write!(f, "{c}"),
            Self::Float(v) => write!(f, "{}", ryu::Buffer::new().format(*v)),
            Self::Double(v) => write!(f, "{}", ryu::Buffer::new().format(*v)),
            Self::Str(s) => write!(f, "{s}"),
            Self::Tag(t) | Self::State(t) | Self::Opaque(t) => write!(f, "{t}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Instance { name, fields } => {
                write!(f, "{name} {{")?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field} = {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
