use std::fmt::Write as _;

use super::{Quote, write_comma_separated};
use crate::schema::TableSpec;

pub fn create_table(out: &mut String, quote: Quote, table: &TableSpec) -> std::fmt::Result {
    writeln!(out, "CREATE TABLE IF NOT EXISTS {} (", quote(table.name.as_str()))?;
    let mut lines = table
        .columns
        .iter()
        .map(|(name, definition)| format!("  {} {definition}", quote(name.as_str())))
        .collect::<Vec<_>>();
    for unique in &table.unique {
        let mut line = String::from("  UNIQUE (");
        write_comma_separated(&mut line, unique, |out, column| {
            write!(out, "{}", quote(column.as_str()))
        })?;
        line.push(')');
        lines.push(line);
    }
    writeln!(out, "{}", lines.join(",\n"))?;
    write!(out, ")")?;
    Ok(())
}

pub fn create_index(
    out: &mut String,
    quote: Quote,
    table: &str,
    name: &str,
    columns: &[String],
) -> std::fmt::Result {
    write!(
        out,
        "CREATE INDEX IF NOT EXISTS {} ON {} (",
        quote(name),
        quote(table)
    )?;
    write_comma_separated(out, columns, |out, column| {
        write!(out, "{}", quote(column.as_str()))
    })?;
    write!(out, ")")
}

pub fn add_column(
    out: &mut String,
    quote: Quote,
    table: &str,
    column: &str,
    definition: &str,
) -> std::fmt::Result {
    write!(
        out,
        "ALTER TABLE {} ADD COLUMN {} {definition}",
        quote(table),
        quote(column)
    )
}
