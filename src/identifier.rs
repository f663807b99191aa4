//! SQL identifier validation
//!
//! Table and column names cannot be bound as parameters, so every name that is
//! interpolated into statement text has to pass through [`validate`] first.

use std::sync::LazyLock;

pub const MAX_LENGTH: usize = 64;

static IDENTIFIER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {role} identifier {candidate:?}")]
pub struct InvalidIdentifier {
    pub role: String,
    pub candidate: String,
}

pub fn is_valid(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.len() <= MAX_LENGTH && IDENTIFIER.is_match(candidate)
}

/// Returns the candidate unchanged when it is a safe identifier.
///
/// `role` names what the identifier is used for ("table", "column", "table prefix")
/// and only shows up in the error.
pub fn validate<'a>(candidate: &'a str, role: &str) -> Result<&'a str, InvalidIdentifier> {
    if is_valid(candidate) {
        Ok(candidate)
    } else {
        Err(InvalidIdentifier {
            role: role.to_owned(),
            candidate: candidate.to_owned(),
        })
    }
}
