use crate::{
    heap::HeapId,
    intern::StringId,
    types::FlexDict,
    value::Value,
};

/// One declared field of a struct template.
///
/// The default is the value the field takes when an object literal does not
/// override it: the declared default expression's value, the declared type's
/// zero value, or null.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldDef {
    pub name: StringId,
    pub default: Value,
}

/// A struct template: the shared shape behind every instance.
#[derive(Debug)]
pub(crate) struct StructDef {
    pub name: StringId,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn field(&self, name: StringId) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// An object instance: a pointer to its struct template plus its own field
/// storage, initialized from the template's defaults.
#[derive(Debug)]
pub(crate) struct Instance {
    pub template: HeapId,
    pub fields: FlexDict,
}

impl Instance {
    /// Creates an instance with every declared field at its default.
    ///
    /// `hash_of` supplies the memoized hash for each field name.
    pub fn from_template(template: HeapId, def: &StructDef, hash_of: impl Fn(StringId) -> u64) -> Self {
        let mut fields = FlexDict::new();
        for field in &def.fields {
            fields.insert(field.name, hash_of(field.name), field.default);
        }
        Self { template, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    #[test]
    fn instances_start_from_template_defaults() {
        let mut interns = Interns::new();
        let x = interns.intern("x");
        let y = interns.intern("y");
        let def = StructDef {
            name: interns.intern("Point"),
            fields: vec![
                FieldDef { name: x, default: Value::Int(0) },
                FieldDef { name: y, default: Value::Null },
            ],
        };
        let instance = Instance::from_template(HeapId::new(0), &def, |id| interns.hash(id));
        assert_eq!(instance.fields.find(x, interns.hash(x)), Some(Value::Int(0)));
        assert_eq!(instance.fields.find(y, interns.hash(y)), Some(Value::Null));
    }

    #[test]
    fn field_lookup_by_name() {
        let mut interns = Interns::new();
        let x = interns.intern("x");
        let def = StructDef {
            name: interns.intern("Point"),
            fields: vec![FieldDef { name: x, default: Value::Int(1) }],
        };
        assert!(def.field(x).is_some());
        assert!(def.field(interns.intern("missing")).is_none());
    }
}
