use std::fmt;

use super::BlockItem;
use crate::Error;

/// Fetches the persisted items of a lazily loaded container.
pub type Loader = Box<dyn FnMut() -> Result<Vec<BlockItem>, Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
    Persisted,
}

/// Ordered block items of one field on one parent object.
///
/// Every mutation reindexes immediately, so `items[i].index() == i` holds
/// between calls. Accessors that read or mutate items load a lazy container
/// first.
pub struct BlockContainer {
    object_id: Option<i64>,
    field_name: String,
    items: Vec<BlockItem>,
    loader: Option<Loader>,
    state: LoadState,
}

impl fmt::Debug for BlockContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockContainer")
            .field("object_id", &self.object_id)
            .field("field_name", &self.field_name)
            .field("items", &self.items)
            .field("state", &self.state)
            .finish()
    }
}

impl BlockContainer {
    pub fn new(object_id: Option<i64>, field_name: impl Into<String>) -> Self {
        Self {
            object_id,
            field_name: field_name.into(),
            items: Vec::new(),
            loader: None,
            state: LoadState::Loaded,
        }
    }

    pub fn with_items(
        object_id: Option<i64>,
        field_name: impl Into<String>,
        items: Vec<BlockItem>,
    ) -> Self {
        let mut container = Self::new(object_id, field_name);
        container.replace(items);
        container
    }

    pub fn lazy(object_id: i64, field_name: impl Into<String>, loader: Loader) -> Self {
        Self {
            object_id: Some(object_id),
            field_name: field_name.into(),
            items: Vec::new(),
            loader: Some(loader),
            state: LoadState::Unloaded,
        }
    }

    pub fn object_id(&self) -> Option<i64> {
        self.object_id
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state != LoadState::Unloaded
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.state = LoadState::Persisted;
    }

    /// Runs the loader once. A failed load leaves the container unloaded.
    pub fn ensure_loaded(&mut self) -> Result<(), Error> {
        if self.state != LoadState::Unloaded {
            return Ok(());
        }
        if let Some(loader) = self.loader.as_mut() {
            let items = loader()?;
            self.replace(items);
        }
        self.loader = None;
        self.state = LoadState::Loaded;
        Ok(())
    }

    /// Items without triggering a load; `None` while unloaded.
    pub fn loaded_items(&self) -> Option<&[BlockItem]> {
        self.is_loaded().then_some(self.items.as_slice())
    }

    pub fn items(&mut self) -> Result<&[BlockItem], Error> {
        self.ensure_loaded()?;
        Ok(&self.items)
    }

    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, BlockItem>, Error> {
        self.ensure_loaded()?;
        Ok(self.items.iter())
    }

    pub fn len(&mut self) -> Result<usize, Error> {
        self.ensure_loaded()?;
        Ok(self.items.len())
    }

    pub fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    pub fn get(&mut self, index: usize) -> Result<Option<&BlockItem>, Error> {
        self.ensure_loaded()?;
        Ok(self.items.get(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<Option<&mut BlockItem>, Error> {
        self.ensure_loaded()?;
        Ok(self.items.get_mut(index))
    }

    pub(crate) fn items_mut(&mut self) -> &mut [BlockItem] {
        &mut self.items
    }

    pub fn add_item(&mut self, mut item: BlockItem) -> Result<(), Error> {
        self.ensure_loaded()?;
        item.set_index(self.items.len());
        item.bind(self.object_id, &self.field_name);
        self.items.push(item);
        Ok(())
    }

    /// Removes the item at `index`; out-of-range indices are ignored.
    pub fn remove_item(&mut self, index: usize) -> Result<Option<BlockItem>, Error> {
        self.ensure_loaded()?;
        if index >= self.items.len() {
            return Ok(None);
        }
        let removed = self.items.remove(index);
        self.reindex();
        Ok(Some(removed))
    }

    /// Moves the item at `from` before position `to` of the sequence without it.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), Error> {
        self.ensure_loaded()?;
        if from >= self.items.len() {
            return Ok(());
        }
        let item = self.items.remove(from);
        let to = to.min(self.items.len());
        self.items.insert(to, item);
        self.reindex();
        Ok(())
    }

    pub fn items_by_type(&mut self, block_type: &str) -> Result<Vec<&BlockItem>, Error> {
        self.ensure_loaded()?;
        Ok(self
            .items
            .iter()
            .filter(|item| item.block_type() == block_type)
            .collect())
    }

    /// Replaces all items; a pending lazy load is discarded.
    pub fn set_items(&mut self, items: Vec<BlockItem>) {
        self.loader = None;
        self.state = LoadState::Loaded;
        self.replace(items);
    }

    fn replace(&mut self, items: Vec<BlockItem>) {
        self.items = items;
        for item in &mut self.items {
            item.bind(self.object_id, &self.field_name);
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.set_index(index);
        }
    }

    /// Pairwise comparison by position, loading both sides first.
    pub fn is_equal_by(
        &mut self,
        other: &mut Self,
        mut eq: impl FnMut(&BlockItem, &BlockItem) -> bool,
    ) -> Result<bool, Error> {
        self.ensure_loaded()?;
        other.ensure_loaded()?;
        Ok(self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.block_type() == b.block_type() && eq(a, b)))
    }
}
