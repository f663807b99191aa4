use std::fmt::Write as _;

use super::{Quote, placeholders, write_comma_separated};
use crate::schema::{
    COLUMN_FIELDNAME, COLUMN_ID, COLUMN_INDEX, COLUMN_LANGUAGE, COLUMN_OBJECT_ID,
    COLUMN_PARENT_ITEM,
};

pub fn insert<'c>(
    out: &mut String,
    quote: Quote,
    table: &str,
    columns: impl IntoIterator<Item = &'c str>,
) -> std::fmt::Result {
    let columns = columns.into_iter().collect::<Vec<_>>();
    write!(out, "INSERT INTO {} (", quote(table))?;
    write_comma_separated(out, &columns, |out, column| write!(out, "{}", quote(*column)))?;
    write!(out, ") VALUES (")?;
    placeholders(out, columns.len())?;
    write!(out, ")")
}

pub fn select_items(out: &mut String, quote: Quote, table: &str) -> std::fmt::Result {
    write!(
        out,
        "SELECT * FROM {} WHERE {} = ? AND {} = ? ORDER BY {} ASC",
        quote(table),
        quote(COLUMN_OBJECT_ID),
        quote(COLUMN_FIELDNAME),
        quote(COLUMN_INDEX)
    )
}

pub fn select_localized(out: &mut String, quote: Quote, table: &str, ids: usize) -> std::fmt::Result {
    write!(
        out,
        "SELECT * FROM {} WHERE {} IN (",
        quote(table),
        quote(COLUMN_PARENT_ITEM)
    )?;
    placeholders(out, ids)?;
    write!(
        out,
        ") ORDER BY {}, {}",
        quote(COLUMN_PARENT_ITEM),
        quote(COLUMN_LANGUAGE)
    )
}

pub fn delete_items(out: &mut String, quote: Quote, table: &str) -> std::fmt::Result {
    write!(
        out,
        "DELETE FROM {} WHERE {} = ? AND {} = ?",
        quote(table),
        quote(COLUMN_OBJECT_ID),
        quote(COLUMN_FIELDNAME)
    )
}

pub fn delete_localized(
    out: &mut String,
    quote: Quote,
    localized: &str,
    main: &str,
) -> std::fmt::Result {
    write!(
        out,
        "DELETE FROM {} WHERE {} IN (SELECT {} FROM {} WHERE {} = ? AND {} = ?)",
        quote(localized),
        quote(COLUMN_PARENT_ITEM),
        quote(COLUMN_ID),
        quote(main),
        quote(COLUMN_OBJECT_ID),
        quote(COLUMN_FIELDNAME)
    )
}
