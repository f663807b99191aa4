use indexmap::IndexMap;
use serde_json::Value;

use crate::schema::DEFAULT_BLOCK_TYPE;

pub type FieldValues = IndexMap<String, Value>;

/// Language code to localized field values.
pub type LocalizedData = IndexMap<String, FieldValues>;

/// One repeatable record of an extended-block field.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockItem {
    id: Option<i64>,
    block_type: String,
    index: usize,
    field_values: FieldValues,
    localized_data: LocalizedData,
    modified: bool,
    object_id: Option<i64>,
    field_name: Option<String>,
}

impl Default for BlockItem {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_TYPE)
    }
}

impl BlockItem {
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            id: None,
            block_type: block_type.into(),
            index: 0,
            field_values: IndexMap::new(),
            localized_data: IndexMap::new(),
            modified: false,
            object_id: None,
            field_name: None,
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_localized_value(
        mut self,
        language: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set_localized_value(language, name, value);
        self
    }

    pub(crate) fn with_id(mut self, id: Option<i64>) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn object_id(&self) -> Option<i64> {
        self.object_id
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    pub(crate) fn bind(&mut self, object_id: Option<i64>, field_name: &str) {
        self.object_id = object_id;
        self.field_name = Some(field_name.to_owned());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field_values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.field_values.insert(name.into(), value.into());
        self.modified = true;
    }

    pub fn has(&self, name: &str) -> bool {
        self.field_values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.field_values.shift_remove(name);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn field_values(&self) -> &FieldValues {
        &self.field_values
    }

    pub fn get_localized_value(&self, language: &str, name: &str) -> Option<&Value> {
        self.localized_data.get(language)?.get(name)
    }

    pub fn set_localized_value(
        &mut self,
        language: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.localized_data
            .entry(language.into())
            .or_default()
            .insert(name.into(), value.into());
        self.modified = true;
    }

    pub fn localized_data(&self) -> &LocalizedData {
        &self.localized_data
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.localized_data.keys().map(String::as_str)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_clean(&mut self) {
        self.modified = false;
    }
}
