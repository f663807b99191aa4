use std::{cell::RefCell, rc::Rc};

use crate::{
    ExtendedBlock,
    config::{ClassDefinition, FieldTypeDefinition, Settings},
    db::{Database, Error, Row, SqlValue, sqlite::SqliteDatabase},
    field::FieldKindRegistry,
};

mod persistence;
mod schema_sync;

pub fn load_class(path: &str) -> ClassDefinition {
    let content = std::fs::read_to_string(path).unwrap();
    serde_yaml::from_str(&content).unwrap()
}

pub fn field_definition(class: &ClassDefinition, field: &str) -> FieldTypeDefinition {
    class
        .extended_blocks()
        .find(|(name, _)| *name == field)
        .map(|(_, definition)| definition.clone())
        .unwrap()
}

/// SQLite gateway that remembers every statement it executed.
pub struct RecordingDatabase {
    inner: SqliteDatabase,
    statements: RefCell<Vec<String>>,
}

impl RecordingDatabase {
    pub fn in_memory() -> Self {
        Self {
            inner: SqliteDatabase::open_in_memory().unwrap(),
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.statements
            .borrow()
            .iter()
            .filter(|statement| statement.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.statements.borrow_mut().clear();
    }
}

impl Database for RecordingDatabase {
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<usize, Error> {
        self.statements.borrow_mut().push(statement.to_owned());
        self.inner.execute(statement, params)
    }

    fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, Error> {
        self.inner.query(statement, params)
    }

    fn last_insert_id(&self) -> Result<i64, Error> {
        self.inner.last_insert_id()
    }

    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        self.inner.table_exists(table)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, Error> {
        self.inner.columns(table)
    }

    fn begin(&self) -> Result<(), Error> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<(), Error> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), Error> {
        self.inner.rollback()
    }
}

pub fn adapter(
    class: &ClassDefinition,
    field: &str,
    db: Rc<RecordingDatabase>,
    settings: Settings,
) -> ExtendedBlock<RecordingDatabase> {
    ExtendedBlock::new(
        field,
        field_definition(class, field),
        Rc::new(FieldKindRegistry::builtin()),
        db,
        settings,
    )
    .unwrap()
}

pub fn select(db: &RecordingDatabase, sql: &str, params: &[SqlValue]) -> Vec<Row> {
    db.query(sql, params).unwrap()
}
