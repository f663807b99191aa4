//! Class-definition checks for extended-block placement
//!
//! Runs whenever a class definition is saved, independent of any object data.

use tracing::warn;

use crate::{
    Error, ErrorContext, ErrorDetail,
    adapter::validate_definition,
    config::{ClassDefinition, FieldDeclaration, Kind, Settings},
};

pub struct ClassDefinitionListener {
    strict: bool,
}

impl ClassDefinitionListener {
    pub fn new(settings: &Settings) -> Self {
        Self {
            strict: settings.strict_validation,
        }
    }

    pub fn on_pre_save(&self, class: &ClassDefinition) -> Result<(), Error> {
        for field in &class.fields {
            let ctx = ErrorContext {
                class_id: Some(class.id.clone()),
                field: Some(field.name.clone()),
                table: None,
            };
            self.check_field(field)
                .map_err(|detail| ctx.error(detail))?;
        }
        Ok(())
    }

    fn check_field(&self, field: &FieldDeclaration) -> Result<(), ErrorDetail> {
        match &field.kind {
            Kind::ExtendedBlock(definition) => validate_definition(&field.name, definition),
            Kind::Localizedfields { children } => {
                reject_nested_blocks(children, "localized fields", &field.name)
            }
            Kind::Block { children } => reject_nested_blocks(children, "block", &field.name),
            Kind::Fieldcollections { allowed } | Kind::Objectbricks { allowed } => {
                let container = field.kind.tag();
                if self.strict && !allowed.is_empty() {
                    return Err(ErrorDetail::StructuralViolation(format!(
                        "{container} \"{}\" references definitions that cannot be checked for extended blocks: {}",
                        field.name,
                        allowed.join(", ")
                    )));
                }
                warn!(
                    field = field.name,
                    %container,
                    ?allowed,
                    "extended blocks inside referenced definitions are not checked"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Fails when an extended block sits anywhere below a legacy block or localized-fields container.
fn reject_nested_blocks(
    children: &[FieldDeclaration],
    container_kind: &str,
    container: &str,
) -> Result<(), ErrorDetail> {
    for child in children {
        match &child.kind {
            Kind::ExtendedBlock(_) => {
                return Err(ErrorDetail::StructuralViolation(format!(
                    "extended block \"{}\" cannot be placed inside {container_kind} \"{container}\"",
                    child.name
                )));
            }
            Kind::Localizedfields { children } | Kind::Block { children } => {
                reject_nested_blocks(children, container_kind, container)?;
            }
            _ => {}
        }
    }
    Ok(())
}
