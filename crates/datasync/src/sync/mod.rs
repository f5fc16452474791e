//! Sync executor: replace a target table with the rows of a source table.
//!
//! One sync runs in a single task and a single target transaction:
//!
//! 1. `DELETE FROM <target_table>` on the target connection
//! 2. `SELECT * FROM <source_table>` on the source connection
//! 3. rows are queued and flushed as multi-row INSERTs every `batch_size` rows
//! 4. the tail batch is flushed and the transaction committed
//!
//! Any failure after the transaction starts rolls it back before the error
//! is returned, so the target keeps its previous contents.

mod report;
mod request;

pub use report::SyncReport;
pub use request::{SyncJob, SyncRequest};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::core::{Row, SyncConnection, TableName};
use crate::error::{Result, SyncError};
use crate::registry::PoolRegistry;
use request::ResolvedTables;

/// Result of one named job.
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub result: Result<SyncReport>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs sync requests against the pools of a [`PoolRegistry`].
pub struct SyncExecutor {
    registry: Arc<PoolRegistry>,
    batch_size: usize,
    cancel: Option<CancellationToken>,
}

impl SyncExecutor {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
        }
    }

    /// Rows per flushed batch (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Abort running syncs when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Replace the contents of the target table with the source table's rows.
    ///
    /// Errors are always returned to the caller. If the target transaction
    /// was started it is rolled back first.
    pub async fn data_sync(&self, request: &SyncRequest) -> Result<SyncReport> {
        let tables = request.resolve()?;
        let sync_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut report = SyncReport::new(sync_id.clone(), request, Utc::now());

        info!("Starting sync {}: {}", sync_id, request);

        if let Err(e) = self.execute(request, &tables, &mut report).await {
            error!("Sync {} failed: {}", sync_id, e);
            return Err(e);
        }

        report.finish(started.elapsed());
        info!(
            "Sync {} completed: {} rows deleted, {} rows copied in {} batches ({:.1}s, {} rows/s)",
            sync_id,
            report.rows_deleted,
            report.rows_copied,
            report.batches_flushed,
            report.duration_seconds,
            report.rows_per_second
        );
        Ok(report)
    }

    /// Run jobs in order, stopping early once cancelled.
    pub async fn run_jobs(&self, jobs: &[SyncJob]) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            if self.is_cancelled() {
                info!("Cancellation requested, skipping remaining jobs");
                break;
            }
            info!("Running job '{}'", job.name);
            let result = self.data_sync(&job.request).await;
            outcomes.push(JobOutcome {
                name: job.name.clone(),
                result,
            });
        }
        outcomes
    }

    async fn execute(
        &self,
        request: &SyncRequest,
        tables: &ResolvedTables,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut source = self.registry.get_connection(&request.source_db).await?;
        let mut target = self.registry.get_connection(&request.target_db).await?;

        target.begin().await?;

        let copied = self
            .copy(
                source.as_mut(),
                target.as_mut(),
                tables,
                request.max_rows,
                report,
            )
            .await;

        if let Err(e) = copied {
            if let Err(rollback_err) = target.rollback().await {
                warn!(
                    "Rollback on '{}' failed after sync error: {}",
                    request.target_db, rollback_err
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn copy(
        &self,
        source: &mut dyn SyncConnection,
        target: &mut dyn SyncConnection,
        tables: &ResolvedTables,
        max_rows: Option<u64>,
        report: &mut SyncReport,
    ) -> Result<()> {
        report.rows_deleted = target.delete_all(&tables.target).await?;
        info!("Deleted {} rows from {}", report.rows_deleted, tables.target);

        let mut cursor = source.select_all(&tables.source).await?;
        let columns = cursor.columns().to_vec();
        if columns.is_empty() {
            return Err(SyncError::statement(
                tables.source.to_string(),
                "result set has no columns",
            ));
        }
        debug!("Copying columns {:?}", columns);

        let mut batch: Vec<Row> = Vec::with_capacity(self.batch_size);
        let mut queued = 0u64;

        loop {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(row) = cursor.next_row().await? else {
                break;
            };
            if row.len() != columns.len() {
                return Err(SyncError::statement(
                    tables.source.to_string(),
                    format!(
                        "row has {} values but the result has {} columns",
                        row.len(),
                        columns.len()
                    ),
                ));
            }

            batch.push(row);
            queued += 1;

            if max_rows.is_some_and(|max| queued >= max) {
                report.row_cap_reached = true;
                info!("Row cap of {} reached, stopping read", queued);
                break;
            }
            if batch.len() >= self.batch_size {
                self.flush(target, &tables.target, &columns, &mut batch, report)
                    .await?;
            }
        }
        drop(cursor);

        if !batch.is_empty() {
            self.flush(target, &tables.target, &columns, &mut batch, report)
                .await?;
        }

        target.commit().await
    }

    async fn flush(
        &self,
        target: &mut dyn SyncConnection,
        table: &TableName,
        columns: &[String],
        batch: &mut Vec<Row>,
        report: &mut SyncReport,
    ) -> Result<()> {
        target.insert_batch(table, columns, batch).await?;
        report.rows_copied += batch.len() as u64;
        report.batches_flushed += 1;
        info!(
            "Flushed {} rows into {} ({} rows so far)",
            batch.len(),
            table,
            report.rows_copied
        );
        batch.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataSourceCatalog, DataSourceFactory};
    use crate::config::DbConnectionParams;

    struct NoSources;

    impl DataSourceCatalog for NoSources {
        fn params(&self, _name: &str) -> Option<DbConnectionParams> {
            None
        }
    }

    struct NeverCalled;

    impl DataSourceFactory for NeverCalled {
        fn create(
            &self,
            name: &str,
            _params: &DbConnectionParams,
        ) -> Result<Arc<dyn crate::core::DataSource>> {
            Err(SyncError::Config(format!("unexpected create for {}", name)))
        }
    }

    fn executor() -> SyncExecutor {
        let registry = PoolRegistry::new(Arc::new(NoSources), Arc::new(NeverCalled));
        SyncExecutor::new(Arc::new(registry))
    }

    #[test]
    fn test_batch_size_defaults_and_floor() {
        assert_eq!(executor().batch_size(), 500);
        assert_eq!(executor().with_batch_size(0).batch_size(), 1);
        assert_eq!(executor().with_batch_size(64).batch_size(), 64);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_connecting() {
        let req = SyncRequest::new("a", "t", "b", "t").with_max_rows(0);
        let err = executor().data_sync(&req).await.unwrap_err();
        assert!(err.to_string().contains("max_rows"));

        let req = SyncRequest::new("a", "", "b", "t");
        assert!(matches!(
            executor().data_sync(&req).await,
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_data_source_is_config_error() {
        let req = SyncRequest::new("missing", "t", "b", "t");
        let err = executor().data_sync(&req).await.unwrap_err();
        assert!(matches!(err, SyncError::Config(ref m) if m.contains("missing")));
    }

    #[tokio::test]
    async fn test_run_jobs_stops_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let exec = executor().with_cancellation(token);
        let jobs = vec![SyncJob {
            name: "users".to_string(),
            request: SyncRequest::new("a", "t", "b", "t"),
        }];
        assert!(exec.run_jobs(&jobs).await.is_empty());
    }
}
