/// Integration tests for the SQLite connection pool
///
/// File databases are created in temporary directories; nothing outside them
/// is touched.

use mildew_shared::db::pool::{close_pool, create_pool, get_pool_stats, health_check, DatabaseConfig};
use sqlx::Row;
use tempfile::TempDir;

fn file_config(dir: &TempDir, max_connections: u32) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("database.db").display()),
        max_connections,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_pool_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(file_config(&dir, 3)).await;
    assert!(pool.is_ok(), "Failed to create pool: {:?}", pool.err());

    assert!(dir.path().join("database.db").exists());

    close_pool(pool.unwrap()).await;
}

#[tokio::test]
async fn test_create_pool_in_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("no/such/dir/database.db").display()),
        connect_timeout_seconds: 2,
        ..Default::default()
    };

    let result = create_pool(config).await;
    assert!(result.is_err(), "Expected error for unreachable database file");
}

#[tokio::test]
async fn test_health_check_success() {
    let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();

    let result = health_check(&pool).await;
    assert!(result.is_ok(), "Health check failed: {:?}", result.err());

    close_pool(pool).await;
}

#[tokio::test]
async fn test_connection_pragmas() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(file_config(&dir, 2)).await.unwrap();

    let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(foreign_keys, 1);

    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");

    close_pool(pool).await;
}

#[tokio::test]
async fn test_pool_query_execution() {
    let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();

    let row = sqlx::query("SELECT $1 AS value, $2 AS label")
        .bind(42i64)
        .bind("soybean")
        .fetch_one(&pool)
        .await
        .unwrap();

    let value: i64 = row.get("value");
    let label: String = row.get("label");
    assert_eq!(value, 42);
    assert_eq!(label, "soybean");

    close_pool(pool).await;
}

#[tokio::test]
async fn test_pool_concurrent_queries() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(file_config(&dir, 4)).await.unwrap();

    let mut handles = vec![];
    for i in 0..10i64 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let (value,): (i64,) = sqlx::query_as("SELECT $1")
                .bind(i)
                .fetch_one(&pool)
                .await
                .unwrap();
            value
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results.sort_unstable();
    assert_eq!(results, (0..10).collect::<Vec<_>>());

    let stats = get_pool_stats(&pool);
    assert!(stats.total_connections <= 4);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_in_memory_pool_is_shared_by_queries() {
    let pool = create_pool(DatabaseConfig {
        max_connections: 4,
        ..DatabaseConfig::in_memory()
    })
    .await
    .unwrap();

    // Clamped to one connection, so the table is visible to later queries
    sqlx::query("CREATE TABLE leaf (id INTEGER PRIMARY KEY)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO leaf (id) VALUES (1)")
        .execute(&pool)
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leaf")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(get_pool_stats(&pool).total_connections, 1);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_pool_transaction() {
    let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();

    sqlx::query("CREATE TABLE leaf (id INTEGER PRIMARY KEY)")
        .execute(&pool)
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    sqlx::query("INSERT INTO leaf (id) VALUES (1)")
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leaf")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_close_pool() {
    let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();
    let handle = pool.clone();

    close_pool(pool).await;

    // Attempting to use the pool after close should fail
    let result = sqlx::query("SELECT 1").execute(&handle).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_database_config_defaults() {
    let config = DatabaseConfig::default();

    assert_eq!(config.url, "sqlite://database.db");
    assert_eq!(config.max_connections, 5);
    assert_eq!(config.connect_timeout_seconds, 30);
}
