//! Pool registry behavior with in-memory data sources.

mod common;

use std::sync::Arc;

use common::{MemoryCluster, MemoryDatabase};
use datasync::{
    Config, DataSourceCatalog, PoolRegistry, PoolState, SyncError, SyncRequest,
};

fn cluster() -> (Arc<MemoryDatabase>, Arc<MemoryCluster>, Arc<PoolRegistry>) {
    let db = MemoryDatabase::new();
    let (cluster, registry) = MemoryCluster::new()
        .with_database("app", db.clone())
        .with_database("other", MemoryDatabase::new())
        .into_registry();
    (db, cluster, registry)
}

#[tokio::test]
async fn test_same_name_shares_one_pool() {
    let (_db, cluster, registry) = cluster();

    let first = registry.create_data_source("app").await.unwrap();
    let second = registry.create_data_source("app").await.unwrap();
    registry.get_connection("app").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cluster.created(), 1);

    registry.get_connection("other").await.unwrap();
    assert_eq!(cluster.created(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_creates_one_pool() {
    let (_db, cluster, registry) = cluster();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_connection("app").await.map(|_| ()) })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(cluster.created(), 1);
}

#[tokio::test]
async fn test_destroy_closes_pool() {
    let (db, cluster, registry) = cluster();
    registry.get_connection("app").await.unwrap();

    registry.destroy_data_source("app").await;

    assert!(db.is_closed());
    assert_eq!(registry.state("app").await, Some(PoolState::Closed));
    assert!(matches!(
        registry.create_data_source("app").await,
        Err(SyncError::PoolClosed(_))
    ));
    let err = registry.get_connection("app").await.err().unwrap();
    assert_eq!(err.exit_code(), 2);
    assert_eq!(cluster.created(), 1);
}

#[tokio::test]
async fn test_destroy_is_per_name() {
    let (_db, _cluster, registry) = cluster();
    registry.create_data_source("app").await.unwrap();
    registry.create_data_source("other").await.unwrap();

    registry.destroy_data_source("app").await;

    assert_eq!(registry.state("other").await, Some(PoolState::Active));
    registry.get_connection("other").await.unwrap();
}

#[tokio::test]
async fn test_destroy_all_closes_every_pool() {
    let (db, _cluster, registry) = cluster();
    registry.create_data_source("app").await.unwrap();
    registry.create_data_source("other").await.unwrap();

    registry.destroy_all().await;

    assert!(db.is_closed());
    assert_eq!(registry.state("app").await, Some(PoolState::Closed));
    assert_eq!(registry.state("other").await, Some(PoolState::Closed));
}

#[tokio::test]
async fn test_health_check() {
    let (db, _cluster, registry) = cluster();
    registry.health_check("app").await.unwrap();

    db.set_unavailable(true);
    let err = registry.health_check("app").await.unwrap_err();
    assert!(matches!(err, SyncError::Connection { .. }));

    assert!(matches!(
        registry.health_check("missing").await,
        Err(SyncError::Config(_))
    ));
}

#[tokio::test]
async fn test_config_acts_as_catalog() {
    let yaml = r#"
datasources:
  legacy:
    driver: postgres
    url: postgresql://127.0.0.1:1/app?sslmode=disable
    username: app
    password: secret
jobs:
  - name: users
    source_db: legacy
    source_table: users
    target_db: legacy
    target_table: users_copy
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.params("legacy").unwrap().username, "app");
    assert!(config.params("reporting").is_none());
    assert_eq!(
        config.job("users").unwrap().request,
        SyncRequest::new("legacy", "users", "legacy", "users_copy")
    );

    // building the pool does not connect
    let registry = PoolRegistry::with_drivers(Arc::new(config));
    let source = registry.create_data_source("legacy").await.unwrap();
    assert_eq!(source.db_type(), "postgres");
    registry.destroy_all().await;
}
