//! The extended-block field type
//!
//! [`ExtendedBlock`] is what the host persistence layer talks to: it converts
//! edit payloads into [`BlockContainer`]s, keeps the block tables in sync on
//! save and maps rows back into items on load.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    Error, ErrorContext, ErrorDetail,
    block::{BlockContainer, BlockItem, FieldValues, LoadState, LocalizedData},
    config::{BlockDefinition, FieldDeclaration, FieldTypeDefinition, Kind, Settings},
    db::{self, Database, Row, SqlValue},
    field::{FieldKind, FieldKindRegistry},
    identifier,
    object::ParentObject,
    schema::{
        self, BlockTableSchema, COLUMN_FIELDNAME, COLUMN_ID, COLUMN_INDEX, COLUMN_LANGUAGE,
        COLUMN_OBJECT_ID, COLUMN_PARENT_ITEM, COLUMN_TYPE, DEFAULT_BLOCK_TYPE, TableNames,
    },
    sql,
    sync::{SyncReport, TableSchemaService},
};

/// Upper bound of bound parameters per localized-row query.
const LOCALIZED_BATCH: usize = 500;

fn default_block_type() -> String {
    DEFAULT_BLOCK_TYPE.to_owned()
}

/// One block item as exchanged with editors and API clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default, alias = "fieldValues")]
    pub data: FieldValues,
    #[serde(default)]
    pub localized_data: LocalizedData,
}

/// Columns and values of one row to insert.
struct PendingRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

struct PendingItem {
    main: PendingRow,
    localized: Vec<PendingRow>,
}

pub struct ExtendedBlock<D> {
    name: String,
    definition: Rc<FieldTypeDefinition>,
    registry: Rc<FieldKindRegistry>,
    db: Rc<D>,
    settings: Rc<Settings>,
}

impl<D> Clone for ExtendedBlock<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            definition: self.definition.clone(),
            registry: self.registry.clone(),
            db: self.db.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<D: Database + 'static> ExtendedBlock<D> {
    pub fn new(
        name: impl Into<String>,
        definition: FieldTypeDefinition,
        registry: Rc<FieldKindRegistry>,
        db: Rc<D>,
        settings: Settings,
    ) -> Result<Self, Error> {
        let name = name.into();
        let ctx = ErrorContext {
            field: Some(name.clone()),
            ..Default::default()
        };
        identifier::validate(&name, "field")
            .map_err(|e| ctx.error(ErrorDetail::InvalidIdentifier(e)))?;
        let prefix = definition
            .table_prefix
            .as_deref()
            .unwrap_or(&settings.table_prefix);
        identifier::validate(prefix, "table prefix")
            .map_err(|e| ctx.error(ErrorDetail::InvalidIdentifier(e)))?;
        Ok(Self {
            name,
            definition: Rc::new(definition),
            registry,
            db,
            settings: Rc::new(settings),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &FieldTypeDefinition {
        &self.definition
    }

    fn ctx(&self, class_id: Option<&str>) -> ErrorContext {
        ErrorContext {
            class_id: class_id.map(str::to_owned),
            field: Some(self.name.clone()),
            table: None,
        }
    }

    fn table_prefix(&self) -> &str {
        self.definition
            .table_prefix
            .as_deref()
            .unwrap_or(&self.settings.table_prefix)
    }

    pub fn table_names(&self, class_id: &str) -> Result<TableNames, Error> {
        TableNames::new(self.table_prefix(), class_id, &self.name)
            .map_err(|e| self.ctx(Some(class_id)).error(e))
    }

    pub fn schema(&self, class_id: &str) -> Result<BlockTableSchema, Error> {
        let names = self.table_names(class_id)?;
        BlockTableSchema::compile(&names, &self.definition, &self.registry)
            .map_err(|e| self.ctx(Some(class_id)).error(e))
    }

    /// Statements that would create the tables of this field, without running them.
    pub fn ddl(&self, class_id: &str) -> Result<Vec<String>, Error> {
        let schema = self.schema(class_id)?;
        let quote = |name: &str| self.db.quote_identifier(name);
        let mut statements = Vec::new();
        for table in std::iter::once(&schema.main).chain(schema.localized.as_ref()) {
            statements.push(sql::create_table(&quote, table));
            statements.extend(sql::create_indexes(&quote, table));
        }
        Ok(statements)
    }

    pub fn sync_schema(&self, class_id: &str) -> Result<SyncReport, Error> {
        TableSchemaService::new(self.db.as_ref(), &self.registry, &self.settings.table_prefix)
            .create_or_update_table(class_id, &self.name, &self.definition)
    }

    fn kind(&self, field: &FieldDeclaration) -> Option<&dyn FieldKind> {
        self.registry.get(field.kind.tag())
    }

    fn block(&self, block_type: &str) -> Option<&BlockDefinition> {
        self.definition.block_definitions.get(block_type)
    }

    /// Container for a freshly loaded parent: lazy when lazy loading is enabled.
    pub fn load<P: ParentObject + ?Sized>(&self, parent: &P) -> Result<BlockContainer, Error> {
        if !self.definition.lazy_loading {
            return self.load_block_data(parent);
        }
        let this = self.clone();
        let class_id = parent.class_id().to_owned();
        let object_id = parent.object_id();
        Ok(BlockContainer::lazy(
            object_id,
            self.name.clone(),
            Box::new(move || this.fetch_items(&class_id, object_id)),
        ))
    }

    pub fn load_block_data<P: ParentObject + ?Sized>(
        &self,
        parent: &P,
    ) -> Result<BlockContainer, Error> {
        let items = self.fetch_items(parent.class_id(), parent.object_id())?;
        Ok(BlockContainer::with_items(
            Some(parent.object_id()),
            self.name.clone(),
            items,
        ))
    }

    fn fetch_items(&self, class_id: &str, object_id: i64) -> Result<Vec<BlockItem>, Error> {
        let names = self.table_names(class_id)?;
        let ctx = self.ctx(Some(class_id)).with_table(&names.main);
        let load_err = |e: db::Error| ctx.error(ErrorDetail::Load(e));
        if !self.db.table_exists(&names.main).map_err(load_err)? {
            debug!(table = names.main, "block table missing, treating as empty");
            return Ok(Vec::new());
        }
        let quote = |name: &str| self.db.quote_identifier(name);
        let rows = self
            .db
            .query(
                &sql::select_items(&quote, &names.main),
                &[SqlValue::Integer(object_id), SqlValue::from(self.name.as_str())],
            )
            .map_err(load_err)?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id = match row.get(COLUMN_ID) {
                Some(SqlValue::Integer(id)) => Some(*id),
                _ => None,
            };
            let block_type = match row.get(COLUMN_TYPE) {
                Some(SqlValue::Text(ty)) => ty.clone(),
                _ => DEFAULT_BLOCK_TYPE.to_owned(),
            };
            let Some(block) = self.block(&block_type) else {
                warn!(
                    table = names.main,
                    block_type, ?id, "skipping row of undefined block type"
                );
                continue;
            };
            let mut item = BlockItem::new(block_type.as_str()).with_id(id);
            for field in block.plain_fields() {
                if let Some(value) = self.decode_field(field, &row).map_err(|e| ctx.error(e))? {
                    item.set(field.name.as_str(), value);
                }
            }
            items.push(item);
        }
        if self.definition.has_localized_fields() {
            self.attach_localized(&ctx, &names.localized, &mut items)?;
        }
        for item in &mut items {
            item.mark_clean();
        }
        Ok(items)
    }

    fn decode_field(&self, field: &FieldDeclaration, row: &Row) -> Result<Option<Value>, ErrorDetail> {
        let Some(kind) = self.kind(field) else {
            return Ok(None);
        };
        let raw = kind
            .columns()
            .column_names(&field.name)
            .into_iter()
            .map(|(column, _)| {
                row.get(&column)
                    .or_else(|| {
                        row.iter()
                            .find(|(name, _)| name.eq_ignore_ascii_case(&column))
                            .map(|(_, value)| value)
                    })
                    .cloned()
                    .unwrap_or(SqlValue::Null)
            })
            .collect();
        kind.decode(&field.name, raw).map(Some)
    }

    fn attach_localized(
        &self,
        ctx: &ErrorContext,
        table: &str,
        items: &mut [BlockItem],
    ) -> Result<(), Error> {
        let ctx = ctx.with_table(table);
        let load_err = |e: db::Error| ctx.error(ErrorDetail::Load(e));
        if !self.db.table_exists(table).map_err(load_err)? {
            return Ok(());
        }
        let ids = items.iter().filter_map(BlockItem::id).collect::<Vec<_>>();
        let quote = |name: &str| self.db.quote_identifier(name);
        let mut by_item: HashMap<i64, Vec<Row>> = HashMap::new();
        for chunk in &ids.iter().chunks(LOCALIZED_BATCH) {
            let params = chunk.map(|id| SqlValue::Integer(*id)).collect::<Vec<_>>();
            let rows = self
                .db
                .query(&sql::select_localized(&quote, table, params.len()), &params)
                .map_err(load_err)?;
            for row in rows {
                if let Some(SqlValue::Integer(parent)) = row.get(COLUMN_PARENT_ITEM) {
                    by_item.entry(*parent).or_default().push(row);
                }
            }
        }
        for item in items.iter_mut() {
            let Some(rows) = item.id().and_then(|id| by_item.remove(&id)) else {
                continue;
            };
            let Some(block) = self.block(item.block_type()) else {
                continue;
            };
            let fields = block.localized_fields().collect::<Vec<_>>();
            for row in rows {
                let Some(SqlValue::Text(language)) = row.get(COLUMN_LANGUAGE) else {
                    continue;
                };
                for field in &fields {
                    if let Some(value) = self.decode_field(field, &row).map_err(|e| ctx.error(e))? {
                        item.set_localized_value(language.as_str(), field.name.as_str(), value);
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_fields<'f>(
        &self,
        fields: impl Iterator<Item = &'f FieldDeclaration>,
        values: &FieldValues,
        row: &mut PendingRow,
    ) -> Result<(), ErrorDetail> {
        for field in fields {
            let Some(kind) = self.kind(field) else {
                continue;
            };
            let value = values.get(&field.name).unwrap_or(&Value::Null);
            let encoded = kind.encode(&field.name, value)?;
            let columns = kind.columns().column_names(&field.name);
            for ((column, _), value) in columns.into_iter().zip(encoded) {
                if row.columns.contains(&column) {
                    continue;
                }
                row.columns.push(column);
                row.values.push(value);
            }
        }
        Ok(())
    }

    fn encode_item(
        &self,
        object_id: i64,
        item: &BlockItem,
        with_localized: bool,
    ) -> Result<PendingItem, ErrorDetail> {
        let block = self
            .block(item.block_type())
            .ok_or_else(|| ErrorDetail::UnknownBlockType(item.block_type().to_owned()))?;
        let mut main = PendingRow {
            columns: vec![
                COLUMN_OBJECT_ID.to_owned(),
                COLUMN_FIELDNAME.to_owned(),
                COLUMN_INDEX.to_owned(),
                COLUMN_TYPE.to_owned(),
            ],
            values: vec![
                SqlValue::Integer(object_id),
                SqlValue::from(self.name.as_str()),
                SqlValue::Integer(item.index() as i64),
                SqlValue::from(item.block_type()),
            ],
        };
        self.encode_fields(block.plain_fields(), item.field_values(), &mut main)?;
        let mut localized = Vec::new();
        if with_localized {
            for (language, values) in item.localized_data() {
                let declared = block
                    .localized_fields()
                    .filter(|field| values.contains_key(&field.name))
                    .collect::<Vec<_>>();
                if declared.is_empty() {
                    continue;
                }
                let mut row = PendingRow {
                    columns: vec![COLUMN_LANGUAGE.to_owned()],
                    values: vec![SqlValue::from(language.as_str())],
                };
                self.encode_fields(declared.into_iter(), values, &mut row)?;
                localized.push(row);
            }
        }
        Ok(PendingItem { main, localized })
    }

    /// Replaces the persisted rows of this field with the parent's current items.
    ///
    /// Every item gets a fresh row id. Unloaded lazy containers were never
    /// touched and are left alone.
    pub fn save<P: ParentObject + ?Sized>(&self, parent: &mut P) -> Result<(), Error> {
        let class_id = parent.class_id().to_owned();
        let object_id = parent.object_id();
        let Some(container) = parent.blocks_mut(&self.name) else {
            debug!(class_id, field = self.name, "no block container to save");
            return Ok(());
        };
        if container.state() == LoadState::Unloaded {
            debug!(class_id, field = self.name, "lazy container untouched, skipping save");
            return Ok(());
        }
        let schema = self.schema(&class_id)?;
        self.sync_schema(&class_id)?;

        let ctx = self.ctx(Some(&class_id)).with_table(&schema.main.name);
        let pending = container
            .items()?
            .iter()
            .map(|item| self.encode_item(object_id, item, schema.localized.is_some()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ctx.error(e))?;

        let quote = |name: &str| self.db.quote_identifier(name);
        let main_table = schema.main.name.as_str();
        let localized_table = schema.localized.as_ref().map(|table| table.name.as_str());
        let owner = [SqlValue::Integer(object_id), SqlValue::from(self.name.as_str())];
        let ids = db::transaction(self.db.as_ref(), |tx| -> Result<Vec<i64>, db::Error> {
            self.delete_rows(tx, main_table, &owner)?;
            let mut ids = Vec::with_capacity(pending.len());
            for item in &pending {
                tx.execute(
                    &sql::insert(&quote, main_table, item.main.columns.iter().map(String::as_str)),
                    &item.main.values,
                )?;
                let id = tx.last_insert_id()?;
                if let Some(localized_table) = localized_table {
                    for row in &item.localized {
                        let columns = std::iter::once(COLUMN_PARENT_ITEM)
                            .chain(row.columns.iter().map(String::as_str));
                        let values = std::iter::once(SqlValue::Integer(id))
                            .chain(row.values.iter().cloned())
                            .collect::<Vec<_>>();
                        tx.execute(&sql::insert(&quote, localized_table, columns), &values)?;
                    }
                }
                ids.push(id);
            }
            Ok(ids)
        })
        .map_err(|e| {
            error!(
                class_id,
                field = self.name,
                table = main_table,
                object_id,
                %e,
                "saving block items failed"
            );
            ctx.error(ErrorDetail::Persistence(e))
        })?;

        for (item, id) in container.items_mut().iter_mut().zip(ids) {
            item.set_id(id);
            item.mark_clean();
        }
        container.mark_persisted();
        debug!(class_id, field = self.name, object_id, "saved block items");
        Ok(())
    }

    /// Deletes main rows of an owner, and their localized rows when that table exists.
    fn delete_rows(&self, tx: &D, main_table: &str, owner: &[SqlValue]) -> Result<(), db::Error> {
        let quote = |name: &str| tx.quote_identifier(name);
        let localized_table = format!("{main_table}{}", schema::LOCALIZED_SUFFIX);
        if tx.table_exists(&localized_table)? {
            tx.execute(&sql::delete_localized(&quote, &localized_table, main_table), owner)?;
        }
        tx.execute(&sql::delete_items(&quote, main_table), owner)?;
        Ok(())
    }

    /// Removes every persisted row of this field for the parent. Missing tables are fine.
    pub fn delete<P: ParentObject + ?Sized>(&self, parent: &P) -> Result<(), Error> {
        let class_id = parent.class_id();
        let object_id = parent.object_id();
        let names = self.table_names(class_id)?;
        let ctx = self.ctx(Some(class_id)).with_table(&names.main);
        let exists = self
            .db
            .table_exists(&names.main)
            .map_err(|e| ctx.error(ErrorDetail::Persistence(e)))?;
        if !exists {
            return Ok(());
        }
        let owner = [SqlValue::Integer(object_id), SqlValue::from(self.name.as_str())];
        db::transaction(self.db.as_ref(), |tx| self.delete_rows(tx, &names.main, &owner)).map_err(
            |e| {
                error!(
                    class_id,
                    field = self.name,
                    table = names.main,
                    object_id,
                    %e,
                    "deleting block items failed"
                );
                ctx.error(ErrorDetail::Persistence(e))
            },
        )
    }

    pub fn get_data_for_editmode(
        &self,
        container: &mut BlockContainer,
    ) -> Result<Vec<EditItem>, Error> {
        Ok(container
            .items()?
            .iter()
            .map(|item| {
                let data = match self.block(item.block_type()) {
                    Some(block) => block
                        .plain_fields()
                        .map(|field| {
                            let value = item.get(&field.name).cloned().unwrap_or(Value::Null);
                            (field.name.clone(), value)
                        })
                        .collect(),
                    None => item.field_values().clone(),
                };
                EditItem {
                    id: item.id(),
                    block_type: item.block_type().to_owned(),
                    index: item.index(),
                    data,
                    localized_data: item.localized_data().clone(),
                }
            })
            .collect())
    }

    /// Builds a fresh container from an edit payload (an array of block items).
    ///
    /// Unknown field names are ignored and missing ones become `null`. Items of
    /// an unknown block type are skipped, or rejected under strict validation.
    pub fn get_data_from_editmode(
        &self,
        payload: Value,
        object_id: Option<i64>,
    ) -> Result<BlockContainer, Error> {
        let ctx = self.ctx(None);
        let mut payload = match payload {
            Value::Null => Vec::new(),
            payload => serde_json::from_value::<Vec<EditItem>>(payload.clone()).map_err(|_| {
                ctx.error(ErrorDetail::TypeMismatch {
                    field: self.name.clone(),
                    expected: "array of block items",
                    got: payload,
                })
            })?,
        };
        payload.sort_by_key(|item| item.index);
        let mut items = Vec::with_capacity(payload.len());
        for edit in payload {
            let Some(block) = self.block(&edit.block_type) else {
                if self.settings.strict_validation {
                    return Err(ctx.error(ErrorDetail::UnknownBlockType(edit.block_type)));
                }
                warn!(field = self.name, block_type = edit.block_type, "ignoring unknown block type");
                continue;
            };
            let mut item = BlockItem::new(edit.block_type.as_str()).with_id(edit.id);
            for field in block.plain_fields() {
                let value = edit.data.get(&field.name).cloned().unwrap_or(Value::Null);
                if let Some(kind) = self.kind(field) {
                    kind.encode(&field.name, &value).map_err(|e| ctx.error(e))?;
                }
                item.set(field.name.as_str(), value);
            }
            for (language, values) in &edit.localized_data {
                for field in block.localized_fields() {
                    let Some(value) = values.get(&field.name) else {
                        continue;
                    };
                    if let Some(kind) = self.kind(field) {
                        kind.encode(&field.name, value).map_err(|e| ctx.error(e))?;
                    }
                    item.set_localized_value(language.as_str(), field.name.as_str(), value.clone());
                }
            }
            items.push(item);
        }
        Ok(BlockContainer::with_items(object_id, self.name.clone(), items))
    }

    /// Rejects definitions that would nest containers or collide with the table layout.
    pub fn validate(&self) -> Result<(), Error> {
        validate_definition(&self.name, &self.definition).map_err(|e| self.ctx(None).error(e))
    }

    pub fn check_validity(&self, container: &mut BlockContainer) -> Result<(), Error> {
        let count = container.len()?;
        let max = match (self.definition.max_items, self.settings.max_items) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let Some(max) = max
            && count > max
        {
            return Err(self
                .ctx(None)
                .error(ErrorDetail::TooManyItems { max, got: count }));
        }
        if let Some(min) = self.definition.min_items
            && count < min
        {
            return Err(self
                .ctx(None)
                .error(ErrorDetail::TooFewItems { min, got: count }));
        }
        Ok(())
    }

    /// Whether two containers hold the same data, compared field by field with each kind's equality.
    pub fn is_equal(
        &self,
        old: &mut BlockContainer,
        new: &mut BlockContainer,
    ) -> Result<bool, Error> {
        old.is_equal_by(new, |a, b| self.items_equal(a, b))
    }

    fn items_equal(&self, a: &BlockItem, b: &BlockItem) -> bool {
        let Some(block) = self.block(a.block_type()) else {
            return a.field_values() == b.field_values() && a.localized_data() == b.localized_data();
        };
        let null = Value::Null;
        let same = |field: &FieldDeclaration, x: Option<&Value>, y: Option<&Value>| {
            let (x, y) = (x.unwrap_or(&null), y.unwrap_or(&null));
            match self.kind(field) {
                Some(kind) => kind.is_equal(x, y),
                None => x == y,
            }
        };
        let plain = block
            .plain_fields()
            .all(|field| same(field, a.get(&field.name), b.get(&field.name)));
        if !plain {
            return false;
        }
        let languages = a.languages().chain(b.languages()).unique().collect::<Vec<_>>();
        languages.into_iter().all(|language| {
            block.localized_fields().all(|field| {
                same(
                    field,
                    a.get_localized_value(language, &field.name),
                    b.get_localized_value(language, &field.name),
                )
            })
        })
    }
}

/// Checks one extended-block definition on its own.
pub fn validate_definition(name: &str, definition: &FieldTypeDefinition) -> Result<(), ErrorDetail> {
    for (block_type, block) in &definition.block_definitions {
        if block_type.trim().is_empty() {
            return Err(ErrorDetail::StructuralViolation(format!(
                "extended block \"{name}\" has a block type with an empty name"
            )));
        }
        let mut seen = HashSet::new();
        for field in &block.fields {
            if let Kind::ExtendedBlock(_) = field.kind {
                return Err(ErrorDetail::StructuralViolation(format!(
                    "extended block \"{name}\" cannot contain itself: field \"{}\" in block type \"{block_type}\" is an extended block",
                    field.name
                )));
            }
            let tag = field.kind.tag();
            if tag.is_forbidden_in_block() {
                return Err(ErrorDetail::StructuralViolation(format!(
                    "field \"{}\" in block type \"{block_type}\" of extended block \"{name}\" uses forbidden kind {tag}",
                    field.name
                )));
            }
            identifier::validate(&field.name, "column").map_err(ErrorDetail::InvalidIdentifier)?;
            if schema::is_reserved_column(&field.name) {
                return Err(ErrorDetail::StructuralViolation(format!(
                    "field \"{}\" in block type \"{block_type}\" uses a reserved column name",
                    field.name
                )));
            }
            if !seen.insert(field.name.to_ascii_lowercase()) {
                return Err(ErrorDetail::StructuralViolation(format!(
                    "field \"{}\" is declared twice in block type \"{block_type}\"",
                    field.name
                )));
            }
        }
    }
    if definition.inside_localizedfields && definition.has_localized_fields() {
        return Err(ErrorDetail::StructuralViolation(format!(
            "extended block \"{name}\" declares localized fields and is placed inside localized fields"
        )));
    }
    if let (Some(min), Some(max)) = (definition.min_items, definition.max_items)
        && min > max
    {
        return Err(ErrorDetail::StructuralViolation(format!(
            "extended block \"{name}\" requires at least {min} items but allows at most {max}"
        )));
    }
    Ok(())
}
