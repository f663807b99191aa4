//! Derived table layout of an extended-block field
//!
//! One main table per `(class, field)` holding a row per block item, and an
//! optional localized table holding a row per `(item, language)`.

use indexmap::IndexMap;

use crate::{
    ErrorDetail,
    config::{FieldDeclaration, FieldTypeDefinition},
    field::{ColumnSpec, FieldKindRegistry},
    identifier,
};

pub const LOCALIZED_SUFFIX: &str = "_localized";

pub const COLUMN_ID: &str = "id";
pub const COLUMN_OBJECT_ID: &str = "o_id";
pub const COLUMN_FIELDNAME: &str = "fieldname";
pub const COLUMN_INDEX: &str = "index";
pub const COLUMN_TYPE: &str = "type";
pub const COLUMN_PARENT_ITEM: &str = "ooo_id";
pub const COLUMN_LANGUAGE: &str = "language";

pub const DEFAULT_BLOCK_TYPE: &str = "default";

const MAIN_FIXED: [(&str, &str); 5] = [
    (COLUMN_ID, "INTEGER PRIMARY KEY AUTOINCREMENT"),
    (COLUMN_OBJECT_ID, "INTEGER NOT NULL"),
    (COLUMN_FIELDNAME, "VARCHAR(70) NOT NULL"),
    (COLUMN_INDEX, "INTEGER UNSIGNED NOT NULL DEFAULT 0"),
    (COLUMN_TYPE, "VARCHAR(100) NOT NULL DEFAULT 'default'"),
];

const LOCALIZED_FIXED: [(&str, &str); 3] = [
    (COLUMN_ID, "INTEGER PRIMARY KEY AUTOINCREMENT"),
    (COLUMN_PARENT_ITEM, "INTEGER NOT NULL"),
    (COLUMN_LANGUAGE, "VARCHAR(10) NOT NULL"),
];

/// Column names compare case-insensitively, as SQL identifiers do.
pub fn is_reserved_column(name: &str) -> bool {
    MAIN_FIXED
        .iter()
        .chain(&LOCALIZED_FIXED)
        .any(|(fixed, _)| fixed.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub main: String,
    /// Only validated once a definition actually declares localized fields.
    pub localized: String,
}

impl TableNames {
    pub fn new(prefix: &str, class_id: &str, field: &str) -> Result<Self, ErrorDetail> {
        identifier::validate(prefix, "table prefix").map_err(ErrorDetail::InvalidIdentifier)?;
        let main = format!("{prefix}{class_id}_{field}");
        let localized = format!("{main}{LOCALIZED_SUFFIX}");
        identifier::validate(&main, "table").map_err(ErrorDetail::InvalidIdentifier)?;
        Ok(Self { main, localized })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    /// Column name to column definition (type and constraints), in table order.
    pub columns: IndexMap<String, String>,
    pub unique: Vec<Vec<String>>,
    pub indexes: Vec<(String, Vec<String>)>,
}

impl TableSpec {
    fn new(name: String, fixed: &[(&str, &str)]) -> Self {
        Self {
            name,
            columns: fixed
                .iter()
                .map(|(name, def)| ((*name).to_owned(), (*def).to_owned()))
                .collect(),
            unique: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns
            .keys()
            .any(|column| column.eq_ignore_ascii_case(name))
    }

    /// Adds the columns of a declared field; first declaration of a name wins.
    fn push_field(
        &mut self,
        field: &FieldDeclaration,
        registry: &FieldKindRegistry,
    ) -> Result<(), ErrorDetail> {
        let Some(spec) = field_columns(field, registry) else {
            return Ok(());
        };
        for (column, ty) in spec.column_names(&field.name) {
            identifier::validate(&column, "column").map_err(ErrorDetail::InvalidIdentifier)?;
            if self.has_column(&column) {
                continue;
            }
            self.columns.insert(column, ty.to_owned());
        }
        Ok(())
    }
}

/// Column layout of a declared field, `None` when its kind is not storable.
pub fn field_columns(field: &FieldDeclaration, registry: &FieldKindRegistry) -> Option<ColumnSpec> {
    registry.get(field.kind.tag()).map(|kind| kind.columns())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTableSchema {
    pub main: TableSpec,
    pub localized: Option<TableSpec>,
}

impl BlockTableSchema {
    pub fn compile(
        names: &TableNames,
        definition: &FieldTypeDefinition,
        registry: &FieldKindRegistry,
    ) -> Result<Self, ErrorDetail> {
        let mut main = TableSpec::new(names.main.clone(), &MAIN_FIXED);
        main.indexes.push((
            format!("{}_{COLUMN_OBJECT_ID}_{COLUMN_FIELDNAME}", names.main),
            vec![COLUMN_OBJECT_ID.to_owned(), COLUMN_FIELDNAME.to_owned()],
        ));
        let mut localized = TableSpec::new(names.localized.clone(), &LOCALIZED_FIXED);
        localized.unique.push(vec![
            COLUMN_PARENT_ITEM.to_owned(),
            COLUMN_LANGUAGE.to_owned(),
        ]);
        let mut has_localized = false;
        for (block_type, block) in &definition.block_definitions {
            for field in &block.fields {
                if is_reserved_column(&field.name) {
                    return Err(ErrorDetail::StructuralViolation(format!(
                        "field \"{}\" in block type \"{block_type}\" uses a reserved column name",
                        field.name
                    )));
                }
                if field.localized {
                    has_localized = true;
                    localized.push_field(field, registry)?;
                } else {
                    main.push_field(field, registry)?;
                }
            }
        }
        if has_localized {
            identifier::validate(&localized.name, "table").map_err(ErrorDetail::InvalidIdentifier)?;
        }
        Ok(Self {
            main,
            localized: has_localized.then_some(localized),
        })
    }
}
