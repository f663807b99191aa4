//! Field kinds usable inside an extended block
//!
//! Every supported kind knows its column layout and how to move a value between
//! its edit representation ([`serde_json::Value`]) and stored columns. Kinds
//! without a registry entry produce no columns at all.

use std::collections::HashMap;

use serde_json::Value;

use crate::{ErrorDetail, config::KindTag, db::SqlValue};

mod kinds;

pub use kinds::{
    CheckboxKind, DateKind, ImageKind, JsonKind, MultiselectKind, NumericKind, RelationKind,
    TextKind,
};

/// Physical layout of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSpec {
    Single(&'static str),
    /// One column per `(suffix, type)` pair, named `{field}__{suffix}`.
    Set(Vec<(&'static str, &'static str)>),
}

impl ColumnSpec {
    pub fn column_names(&self, field: &str) -> Vec<(String, &'static str)> {
        match self {
            Self::Single(ty) => vec![(field.to_owned(), *ty)],
            Self::Set(columns) => columns
                .iter()
                .map(|(suffix, ty)| (format!("{field}__{suffix}"), *ty))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Set(columns) => columns.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait FieldKind {
    fn columns(&self) -> ColumnSpec;

    /// Encodes a value into one [`SqlValue`] per column of [`FieldKind::columns`].
    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail>;

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail>;

    fn is_equal(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

pub struct FieldKindRegistry {
    kinds: HashMap<KindTag, Box<dyn FieldKind>>,
}

impl FieldKindRegistry {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(KindTag::Input, TextKind::short());
        registry.register(KindTag::Select, TextKind::short());
        registry.register(KindTag::Language, TextKind::code());
        registry.register(KindTag::Country, TextKind::code());
        registry.register(KindTag::Textarea, TextKind::long());
        registry.register(KindTag::Wysiwyg, TextKind::long());
        registry.register(KindTag::Numeric, NumericKind);
        registry.register(KindTag::Checkbox, CheckboxKind);
        registry.register(KindTag::Date, DateKind);
        registry.register(KindTag::Multiselect, MultiselectKind);
        registry.register(KindTag::Link, JsonKind::object());
        registry.register(KindTag::Image, ImageKind);
        registry.register(KindTag::ManyToOneRelation, RelationKind);
        registry.register(KindTag::ManyToManyRelation, JsonKind::array());
        registry
    }

    pub fn register(&mut self, tag: KindTag, kind: impl FieldKind + 'static) -> &mut Self {
        self.kinds.insert(tag, Box::new(kind));
        self
    }

    pub fn get(&self, tag: KindTag) -> Option<&dyn FieldKind> {
        self.kinds.get(&tag).map(|kind| kind.as_ref())
    }
}

impl Default for FieldKindRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
