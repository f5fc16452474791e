//! Sync requests and named jobs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::TableName;
use crate::error::{Result, SyncError};

/// One point-to-point table sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Logical name of the database to read from.
    pub source_db: String,

    /// Table read with `SELECT *`.
    pub source_table: String,

    /// Logical name of the database to write to.
    pub target_db: String,

    /// Table cleared and then filled.
    pub target_table: String,

    /// Stop after this many rows. Must be positive when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u64>,
}

/// Table names of a request that passed validation.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedTables {
    pub source: TableName,
    pub target: TableName,
}

impl SyncRequest {
    pub fn new(
        source_db: impl Into<String>,
        source_table: impl Into<String>,
        target_db: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        Self {
            source_db: source_db.into(),
            source_table: source_table.into(),
            target_db: target_db.into(),
            target_table: target_table.into(),
            max_rows: None,
        }
    }

    /// Cap the number of rows copied.
    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Check names, table identifiers and the row cap.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    pub(crate) fn resolve(&self) -> Result<ResolvedTables> {
        if self.source_db.trim().is_empty() {
            return Err(SyncError::Config("source_db is required".into()));
        }
        if self.target_db.trim().is_empty() {
            return Err(SyncError::Config("target_db is required".into()));
        }
        if self.max_rows == Some(0) {
            return Err(SyncError::Config(
                "max_rows must be at least 1 when set".into(),
            ));
        }

        Ok(ResolvedTables {
            source: TableName::parse(&self.source_table)?,
            target: TableName::parse(&self.target_table)?,
        })
    }
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source_db, self.source_table, self.target_db, self.target_table
        )?;
        if let Some(max) = self.max_rows {
            write!(f, " (max_rows={})", max)?;
        }
        Ok(())
    }
}

/// A named request from the `jobs` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub name: String,

    #[serde(flatten)]
    pub request: SyncRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_qualified_names() {
        let req = SyncRequest::new("a", "dbo.users", "b", "public.users").with_max_rows(10);
        let tables = req.resolve().unwrap();
        assert_eq!(tables.source.to_string(), "dbo.users");
        assert_eq!(tables.target.to_string(), "public.users");
    }

    #[test]
    fn test_validate_rejects_zero_max_rows() {
        let req = SyncRequest::new("a", "t", "b", "t").with_max_rows(0);
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("max_rows"));
    }

    #[test]
    fn test_validate_rejects_missing_parts() {
        assert!(SyncRequest::new("", "t", "b", "t").validate().is_err());
        assert!(SyncRequest::new("a", "t", " ", "t").validate().is_err());
        assert!(SyncRequest::new("a", "", "b", "t").validate().is_err());
        assert!(SyncRequest::new("a", "t", "b", "x\0y").validate().is_err());
    }

    #[test]
    fn test_display() {
        let req = SyncRequest::new("legacy", "users", "rpt", "users_copy");
        assert_eq!(req.to_string(), "legacy:users -> rpt:users_copy");
        assert_eq!(
            req.with_max_rows(5).to_string(),
            "legacy:users -> rpt:users_copy (max_rows=5)"
        );
    }

    #[test]
    fn test_job_yaml_is_flat() {
        let yaml = r#"
name: nightly
source_db: legacy
source_table: users
target_db: rpt
target_table: users
"#;
        let job: SyncJob = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.name, "nightly");
        assert_eq!(job.request.target_db, "rpt");
        assert_eq!(job.request.max_rows, None);
    }
}
