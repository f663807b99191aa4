pub mod adapter;
pub mod block;
pub mod config;
pub mod db;
pub mod field;
pub mod identifier;
pub mod listener;
pub mod object;
pub mod schema;
pub mod sql;
pub mod sync;

#[cfg(test)]
mod tests;

pub use adapter::ExtendedBlock;
pub use block::{BlockContainer, BlockItem};
pub use sync::TableSchemaService;

#[derive(Debug, thiserror::Error)]
#[error("{context}: {detail}")]
pub struct Error {
    pub context: Box<ErrorContext>,
    pub detail: Box<ErrorDetail>,
}

impl Error {
    pub fn detail(&self) -> &ErrorDetail {
        &self.detail
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub class_id: Option<String>,
    pub field: Option<String>,
    pub table: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(class_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            class_id: Some(class_id.into()),
            field: Some(field.into()),
            table: None,
        }
    }

    pub fn with_table(&self, table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..self.clone()
        }
    }

    pub fn error(&self, detail: ErrorDetail) -> Error {
        Error {
            context: Box::new(self.clone()),
            detail: Box::new(detail),
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.class_id, &self.field) {
            (Some(class_id), Some(field)) => write!(f, "{class_id}.{field}")?,
            (Some(class_id), None) => write!(f, "{class_id}")?,
            (None, Some(field)) => write!(f, "{field}")?,
            (None, None) => write!(f, "extended block")?,
        }
        if let Some(table) = &self.table {
            write!(f, " ({table})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorDetail {
    #[error("{0}")]
    InvalidIdentifier(identifier::InvalidIdentifier),
    #[error("Structural violation: {0}")]
    StructuralViolation(String),
    #[error("Schema synchronization failed: {0}")]
    SchemaSync(db::Error),
    #[error("Persistence failed: {0}")]
    Persistence(db::Error),
    #[error("Failed to load block items: {0}")]
    Load(db::Error),
    #[error("Type mismatch in {field}: expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: serde_json::Value,
    },
    #[error("Invalid date in {field}: {value}")]
    InvalidDate { field: String, value: String },
    #[error("Unknown block type: {0}")]
    UnknownBlockType(String),
    #[error("Too many items: at most {max} allowed, got {got}")]
    TooManyItems { max: usize, got: usize },
    #[error("Too few items: at least {min} required, got {got}")]
    TooFewItems { min: usize, got: usize },
}
