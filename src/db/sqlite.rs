use std::path::Path;

use rusqlite::{
    Connection, params_from_iter,
    types::{ToSqlOutput, Value, ValueRef},
};
use tracing::debug;

use super::{Database, Error, Row, SqlValue};

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

pub struct SqliteDatabase {
    conn: Connection,
    query_debug: bool,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            query_debug: false,
        }
    }

    pub fn with_query_debug(mut self, query_debug: bool) -> Self {
        self.query_debug = query_debug;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn trace(&self, statement: &str, params: &[SqlValue]) {
        if self.query_debug {
            debug!(statement, params = params.len(), "sql");
        }
    }
}

impl Database for SqliteDatabase {
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<usize, Error> {
        self.trace(statement, params);
        Ok(self.conn.execute(statement, params_from_iter(params.iter()))?)
    }

    fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, Error> {
        self.trace(statement, params);
        let mut stmt = self.conn.prepare(statement)?;
        let names = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut fetched = Row::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    fetched.insert(name.clone(), SqlValue::from(row.get_ref(idx)?));
                }
                Ok(fetched)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn last_insert_id(&self) -> Result<i64, Error> {
        Ok(self.conn.last_insert_rowid())
    }

    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn begin(&self) -> Result<(), Error> {
        self.trace("BEGIN", &[]);
        Ok(self.conn.execute_batch("BEGIN")?)
    }

    fn commit(&self) -> Result<(), Error> {
        self.trace("COMMIT", &[]);
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&self) -> Result<(), Error> {
        self.trace("ROLLBACK", &[]);
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_returns_named_columns() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (a INTEGER, b TEXT)", &[]).unwrap();
        db.execute(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            &[SqlValue::Integer(1), SqlValue::Null],
        )
        .unwrap();
        let rows = db.query("SELECT a, b FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&SqlValue::Integer(1)));
        assert_eq!(rows[0].get("b"), Some(&SqlValue::Null));
        assert!(db.table_exists("t").unwrap());
        assert!(!db.table_exists("missing").unwrap());
        assert_eq!(db.columns("t").unwrap(), vec!["a", "b"]);
        assert!(db.columns("missing").unwrap().is_empty());
    }

    #[test]
    fn rollback_discards_writes() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        let result: Result<(), Error> = crate::db::transaction(&db, |db| {
            db.execute("INSERT INTO t (a) VALUES (1)", &[])?;
            Err(Error::Backend("boom".into()))
        });
        assert!(result.is_err());
        assert!(db.query("SELECT a FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn failed_commit_leaves_no_open_transaction() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.connection()
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE child (parent_id INTEGER REFERENCES parent (id) DEFERRABLE INITIALLY DEFERRED);",
            )
            .unwrap();
        let result: Result<(), Error> = crate::db::transaction(&db, |db| {
            db.execute("INSERT INTO child (parent_id) VALUES (1)", &[])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(db.connection().is_autocommit());
        assert!(db.query("SELECT * FROM child", &[]).unwrap().is_empty());

        crate::db::transaction(&db, |db| -> Result<(), Error> {
            db.execute("INSERT INTO parent (id) VALUES (1)", &[])?;
            db.execute("INSERT INTO child (parent_id) VALUES (1)", &[])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.query("SELECT * FROM child", &[]).unwrap().len(), 1);
    }
}
