//! Configuration validation.

use std::collections::HashSet;

use super::{Config, DbConnectionParams};
use crate::drivers::{Driver, SslMode};
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.datasources.is_empty() {
        return Err(SyncError::Config(
            "at least one entry under datasources is required".into(),
        ));
    }

    for (name, params) in &config.datasources {
        validate_datasource(name, params)?;
    }

    if config.sync.batch_size == 0 {
        return Err(SyncError::Config("sync.batch_size must be at least 1".into()));
    }

    let mut seen = HashSet::new();
    for job in &config.jobs {
        if job.name.trim().is_empty() {
            return Err(SyncError::Config("jobs[].name is required".into()));
        }
        if !seen.insert(job.name.as_str()) {
            return Err(SyncError::Config(format!(
                "duplicate job name '{}'",
                job.name
            )));
        }

        for db in [&job.request.source_db, &job.request.target_db] {
            if !config.datasources.contains_key(db.as_str()) {
                return Err(SyncError::Config(format!(
                    "job '{}' references unknown data source '{}'",
                    job.name, db
                )));
            }
        }

        job.request
            .validate()
            .map_err(|e| SyncError::Config(format!("job '{}': {}", job.name, e)))?;
    }

    Ok(())
}

/// Validate the parameters of one data source.
pub fn validate_datasource(name: &str, params: &DbConnectionParams) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SyncError::Config("data source names cannot be empty".into()));
    }

    let driver = Driver::from_identifier(&params.driver)
        .map_err(|_| {
            SyncError::Config(format!(
                "datasources.{}.driver: unknown driver '{}' (supported: postgres, mysql, mssql)",
                name, params.driver
            ))
        })?;

    if params.url.trim().is_empty() {
        return Err(SyncError::Config(format!(
            "datasources.{}.url is required",
            name
        )));
    }
    if params.username.trim().is_empty() {
        return Err(SyncError::Config(format!(
            "datasources.{}.username is required",
            name
        )));
    }
    if params.pool.max_size == 0 {
        return Err(SyncError::Config(format!(
            "datasources.{}.pool.max_size must be at least 1",
            name
        )));
    }
    if params.pool.connect_timeout_secs == 0 {
        return Err(SyncError::Config(format!(
            "datasources.{}.pool.connect_timeout_secs must be at least 1",
            name
        )));
    }

    if let Some(ref mode) = params.ssl_mode {
        if driver != Driver::Postgres {
            return Err(SyncError::Config(format!(
                "datasources.{}.ssl_mode is only supported for postgres",
                name
            )));
        }
        SslMode::parse(mode)
            .map_err(|e| SyncError::Config(format!("datasources.{}.ssl_mode: {}", name, e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolSettings, SyncSettings};
    use crate::sync::{SyncJob, SyncRequest};
    use std::collections::BTreeMap;

    fn params(driver: &str) -> DbConnectionParams {
        DbConnectionParams::new(driver, "postgresql://localhost/app", "app", "secret")
    }

    fn valid_config() -> Config {
        let mut datasources = BTreeMap::new();
        datasources.insert("legacy".to_string(), params("postgres"));
        datasources.insert(
            "reporting".to_string(),
            DbConnectionParams::new("mysql", "mysql://localhost/rpt", "rpt", "secret"),
        );
        Config {
            datasources,
            sync: SyncSettings::default(),
            jobs: vec![SyncJob {
                name: "users".to_string(),
                request: SyncRequest::new("legacy", "public.users", "reporting", "users"),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_requires_datasources() {
        let mut config = valid_config();
        config.datasources.clear();
        config.jobs.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_driver() {
        let mut config = valid_config();
        config.datasources.insert("x".to_string(), params("oracle"));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("datasources.x.driver"));
    }

    #[test]
    fn test_missing_url_and_username() {
        let mut p = params("pg");
        p.url = "  ".to_string();
        assert!(validate_datasource("a", &p).is_err());

        let mut p = params("pg");
        p.username = String::new();
        assert!(validate_datasource("a", &p).is_err());
    }

    #[test]
    fn test_pool_settings_bounds() {
        let mut p = params("postgres");
        p.pool = PoolSettings {
            max_size: 0,
            connect_timeout_secs: 30,
        };
        assert!(validate_datasource("a", &p).is_err());

        p.pool = PoolSettings {
            max_size: 4,
            connect_timeout_secs: 0,
        };
        assert!(validate_datasource("a", &p).is_err());
    }

    #[test]
    fn test_ssl_mode() {
        let mut p = params("postgres");
        p.ssl_mode = Some("verify-full".to_string());
        assert!(validate_datasource("a", &p).is_ok());

        p.ssl_mode = Some("sometimes".to_string());
        assert!(validate_datasource("a", &p).is_err());

        let mut p = params("mssql");
        p.ssl_mode = Some("require".to_string());
        assert!(validate_datasource("a", &p).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.sync.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_job_names() {
        let mut config = valid_config();
        let dup = config.jobs[0].clone();
        config.jobs.push(dup);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate job name"));
    }

    #[test]
    fn test_job_references_unknown_datasource() {
        let mut config = valid_config();
        config.jobs[0].request.target_db = "warehouse".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("unknown data source 'warehouse'"));
    }

    #[test]
    fn test_job_with_zero_max_rows() {
        let mut config = valid_config();
        config.jobs[0].request.max_rows = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_params_debug_redacts_password() {
        let mut p = params("postgres");
        p.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", p);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
