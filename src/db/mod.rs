//! Database gateway
//!
//! The synchronizer and the adapter only talk to the database through
//! [`Database`], so hosts can plug in their own connection and tests can wrap
//! the bundled SQLite implementation.

use indexmap::IndexMap;

pub mod sqlite;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One fetched row, keyed by column name in select order.
pub type Row = IndexMap<String, SqlValue>;

pub trait Database {
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<usize, Error>;

    fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, Error>;

    /// Row id generated by the most recent insert on this connection.
    fn last_insert_id(&self) -> Result<i64, Error>;

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn table_exists(&self, table: &str) -> Result<bool, Error>;

    /// Column names of an existing table, in table order.
    fn columns(&self, table: &str) -> Result<Vec<String>, Error>;

    fn begin(&self) -> Result<(), Error>;

    fn commit(&self) -> Result<(), Error>;

    fn rollback(&self) -> Result<(), Error>;
}

/// Runs `f` inside a transaction, rolling back when it or the commit fails.
pub fn transaction<D, T, E>(db: &D, f: impl FnOnce(&D) -> Result<T, E>) -> Result<T, E>
where
    D: Database + ?Sized,
    E: From<Error>,
{
    db.begin()?;
    match f(db) {
        Ok(value) => match db.commit() {
            Ok(()) => Ok(value),
            Err(e) => {
                rollback(db);
                Err(e.into())
            }
        },
        Err(e) => {
            rollback(db);
            Err(e)
        }
    }
}

fn rollback<D: Database + ?Sized>(db: &D) {
    if let Err(rollback) = db.rollback() {
        tracing::error!(%rollback, "rollback failed");
    }
}
