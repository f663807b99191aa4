//! SQL text for the block tables
//!
//! Identifiers are quoted through the caller-supplied `quote` function and are
//! expected to be validated already; values are always bound as parameters.

use std::fmt::Write;

use crate::schema::TableSpec;

mod ddl;
mod dml;

pub type Quote<'a> = &'a dyn Fn(&str) -> String;

/// Write a comma-separated list of items.
fn write_comma_separated<I, F>(out: &mut String, items: I, mut write_item: F) -> std::fmt::Result
where
    I: IntoIterator,
    F: FnMut(&mut String, I::Item) -> std::fmt::Result,
{
    let mut first = true;
    for item in items {
        if !first {
            write!(out, ", ")?;
        }
        first = false;
        write_item(out, item)?;
    }
    Ok(())
}

fn placeholders(out: &mut String, count: usize) -> std::fmt::Result {
    write_comma_separated(out, 0..count, |out, _| write!(out, "?"))
}

pub fn create_table(quote: Quote, table: &TableSpec) -> String {
    let mut out = String::new();
    ddl::create_table(&mut out, quote, table).unwrap();
    out
}

pub fn create_indexes(quote: Quote, table: &TableSpec) -> Vec<String> {
    table
        .indexes
        .iter()
        .map(|(name, columns)| {
            let mut out = String::new();
            ddl::create_index(&mut out, quote, &table.name, name, columns).unwrap();
            out
        })
        .collect()
}

pub fn add_column(quote: Quote, table: &str, column: &str, definition: &str) -> String {
    let mut out = String::new();
    ddl::add_column(&mut out, quote, table, column, definition).unwrap();
    out
}

pub fn insert<'c>(quote: Quote, table: &str, columns: impl IntoIterator<Item = &'c str>) -> String {
    let mut out = String::new();
    dml::insert(&mut out, quote, table, columns).unwrap();
    out
}

pub fn select_items(quote: Quote, table: &str) -> String {
    let mut out = String::new();
    dml::select_items(&mut out, quote, table).unwrap();
    out
}

pub fn select_localized(quote: Quote, table: &str, ids: usize) -> String {
    let mut out = String::new();
    dml::select_localized(&mut out, quote, table, ids).unwrap();
    out
}

pub fn delete_items(quote: Quote, table: &str) -> String {
    let mut out = String::new();
    dml::delete_items(&mut out, quote, table).unwrap();
    out
}

pub fn delete_localized(quote: Quote, localized: &str, main: &str) -> String {
    let mut out = String::new();
    dml::delete_localized(&mut out, quote, localized, main).unwrap();
    out
}
