//! Schema synchronization
//!
//! Creates the block tables of a field when missing and adds columns for newly
//! declared fields. Existing columns are never dropped or altered, so removing a
//! field from a definition keeps its historical data.

use std::collections::HashSet;

use tracing::{debug, error, info};

use crate::{
    Error, ErrorContext, ErrorDetail,
    config::FieldTypeDefinition,
    db::Database,
    field::FieldKindRegistry,
    schema::{BlockTableSchema, TableNames, TableSpec},
    sql,
};

/// What a synchronization run changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub created_tables: Vec<String>,
    /// `(table, column)` pairs added to existing tables.
    pub added_columns: Vec<(String, String)>,
}

impl SyncReport {
    pub fn is_unchanged(&self) -> bool {
        self.created_tables.is_empty() && self.added_columns.is_empty()
    }
}

pub struct TableSchemaService<'a, D: ?Sized> {
    db: &'a D,
    registry: &'a FieldKindRegistry,
    table_prefix: &'a str,
}

impl<'a, D: Database + ?Sized> TableSchemaService<'a, D> {
    pub fn new(db: &'a D, registry: &'a FieldKindRegistry, table_prefix: &'a str) -> Self {
        Self {
            db,
            registry,
            table_prefix,
        }
    }

    pub fn create_or_update_table(
        &self,
        class_id: &str,
        field_name: &str,
        definition: &FieldTypeDefinition,
    ) -> Result<SyncReport, Error> {
        let ctx = ErrorContext::field(class_id, field_name);
        let prefix = definition
            .table_prefix
            .as_deref()
            .unwrap_or(self.table_prefix);
        let names = TableNames::new(prefix, class_id, field_name).map_err(|e| ctx.error(e))?;
        let schema = BlockTableSchema::compile(&names, definition, self.registry)
            .map_err(|e| ctx.error(e))?;
        let mut report = SyncReport::default();
        self.sync_table(&ctx, &schema.main, &mut report)?;
        if let Some(localized) = &schema.localized {
            self.sync_table(&ctx, localized, &mut report)?;
        }
        Ok(report)
    }

    fn sync_table(
        &self,
        ctx: &ErrorContext,
        table: &TableSpec,
        report: &mut SyncReport,
    ) -> Result<(), Error> {
        let ctx = ctx.with_table(&table.name);
        let quote = |name: &str| self.db.quote_identifier(name);
        let exists = self
            .db
            .table_exists(&table.name)
            .map_err(|e| self.fail(&ctx, e))?;
        if !exists {
            let mut statements = vec![sql::create_table(&quote, table)];
            statements.extend(sql::create_indexes(&quote, table));
            for statement in statements {
                debug!(table = table.name, statement, "create table");
                self.db
                    .execute(&statement, &[])
                    .map_err(|e| self.fail(&ctx, e))?;
            }
            info!(table = table.name, columns = table.columns.len(), "created table");
            report.created_tables.push(table.name.clone());
            return Ok(());
        }
        let existing = self
            .db
            .columns(&table.name)
            .map_err(|e| self.fail(&ctx, e))?
            .into_iter()
            .map(|column| column.to_ascii_lowercase())
            .collect::<HashSet<_>>();
        for (column, definition) in &table.columns {
            if existing.contains(&column.to_ascii_lowercase()) {
                continue;
            }
            let statement = sql::add_column(&quote, &table.name, column, definition);
            debug!(table = table.name, statement, "add column");
            self.db
                .execute(&statement, &[])
                .map_err(|e| self.fail(&ctx, e))?;
            info!(table = table.name, column, "added column");
            report
                .added_columns
                .push((table.name.clone(), column.clone()));
        }
        Ok(())
    }

    fn fail(&self, ctx: &ErrorContext, e: crate::db::Error) -> Error {
        error!(
            class_id = ?ctx.class_id,
            field = ?ctx.field,
            table = ?ctx.table,
            %e,
            "schema synchronization failed"
        );
        ctx.error(ErrorDetail::SchemaSync(e))
    }
}
