//! Identifier validation and table name parsing.
//!
//! SQL identifiers cannot be bound as statement parameters, so table and
//! column names are interpolated into statement text. Every name is validated
//! here and then quoted by the target engine's [`Dialect`](super::Dialect).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Maximum number of dot-separated parts (`database.schema.table`).
const MAX_NAME_PARTS: usize = 3;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing NUL or other control
/// characters, and identifiers longer than 128 bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(SyncError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(SyncError::Config(format!(
            "Identifier contains control characters: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// A validated, possibly qualified table name.
///
/// `users`, `public.users` and `crm.dbo.users` are all accepted. Each part is
/// kept exactly as written; quoting happens at statement build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    parts: Vec<String>,
}

impl TableName {
    /// Parse and validate a dotted table name.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SyncError::Config("Table name cannot be empty".to_string()));
        }

        let parts: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if parts.len() > MAX_NAME_PARTS {
            return Err(SyncError::Config(format!(
                "Table name {:?} has {} parts (at most {} allowed)",
                trimmed,
                parts.len(),
                MAX_NAME_PARTS
            )));
        }

        for part in &parts {
            validate_identifier(part).map_err(|e| {
                SyncError::Config(format!("Invalid table name {:?}: {}", trimmed, e))
            })?;
        }

        Ok(Self { parts })
    }

    /// Name parts from outermost (database/schema) to the table itself.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

impl std::str::FromStr for TableName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.to_string()
    }
}
