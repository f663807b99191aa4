//! Parent objects owning extended-block fields

use indexmap::IndexMap;
use serde_json::Value;

use crate::block::BlockContainer;

/// What the adapter needs to know about the object a field belongs to.
pub trait ParentObject {
    fn object_id(&self) -> i64;

    fn class_id(&self) -> &str;

    /// The block container stored under `field`, `None` when absent or not a container.
    fn blocks_mut(&mut self, field: &str) -> Option<&mut BlockContainer>;
}

#[derive(Debug)]
pub enum FieldData {
    Blocks(BlockContainer),
    Value(Value),
}

/// Minimal in-memory object, used by the command line and tests.
#[derive(Debug)]
pub struct DataObject {
    id: i64,
    class_id: String,
    fields: IndexMap<String, FieldData>,
}

impl DataObject {
    pub fn new(id: i64, class_id: impl Into<String>) -> Self {
        Self {
            id,
            class_id: class_id.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn set_blocks(&mut self, field: impl Into<String>, container: BlockContainer) {
        self.fields.insert(field.into(), FieldData::Blocks(container));
    }

    pub fn set_value(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), FieldData::Value(value.into()));
    }

    pub fn take(&mut self, field: &str) -> Option<FieldData> {
        self.fields.shift_remove(field)
    }
}

impl ParentObject for DataObject {
    fn object_id(&self) -> i64 {
        self.id
    }

    fn class_id(&self) -> &str {
        &self.class_id
    }

    fn blocks_mut(&mut self, field: &str) -> Option<&mut BlockContainer> {
        match self.fields.get_mut(field)? {
            FieldData::Blocks(container) => Some(container),
            FieldData::Value(_) => None,
        }
    }
}
