/// Integration tests for database migrations
///
/// Each test works on its own SQLite file in a temporary directory.
/// Run with: cargo test -p mildew-shared --test db_migrations_tests

use mildew_shared::db::migrations::{get_migration_status, run_migrations};
use mildew_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn file_pool(dir: &TempDir) -> SqlitePool {
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("database.db").display()),
        max_connections: 2,
        ..Default::default()
    };
    create_pool(config).await.expect("Failed to create pool")
}

async fn table_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to list tables")
}

#[tokio::test]
async fn test_run_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;

    let result = run_migrations(&pool).await;
    assert!(result.is_ok(), "Migrations failed: {:?}", result.err());

    let status = get_migration_status(&pool).await.expect("Failed to get migration status");
    assert!(status.applied_migrations > 0, "No migrations were applied");
    assert!(status.is_up_to_date);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;

    run_migrations(&pool).await.expect("First migration run failed");
    let first = get_migration_status(&pool).await.unwrap();

    run_migrations(&pool).await.expect("Second migration run failed");
    let second = get_migration_status(&pool).await.unwrap();

    assert_eq!(first.applied_migrations, second.applied_migrations);
    assert_eq!(first.latest_version, second.latest_version);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migrations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let pool = file_pool(&dir).await;
    run_migrations(&pool).await.unwrap();
    close_pool(pool).await;

    let pool = file_pool(&dir).await;
    let status = get_migration_status(&pool).await.unwrap();
    assert!(status.is_up_to_date);
    run_migrations(&pool).await.unwrap();

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migration_creates_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    run_migrations(&pool).await.unwrap();

    let tables = table_names(&pool).await;
    for expected in ["_sqlx_migrations", "mildewdata", "user"] {
        assert!(tables.iter().any(|t| t == expected), "Missing table {}: {:?}", expected, tables);
    }

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migrations_adopt_existing_tables() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;

    // Layout written by the previous deployment, without a migrations table
    sqlx::query(
        r#"CREATE TABLE "user" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            nickname TEXT NOT NULL,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        r#"INSERT INTO "user" (username, password, nickname, created_at)
           VALUES ('legacy', 'hash', 'Legacy', '2023-05-01T00:00:00Z')"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    run_migrations(&pool).await.expect("Migrations should adopt the existing table");

    let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user""#)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_deleting_user_cascades_to_records() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    run_migrations(&pool).await.unwrap();

    let user_id: i64 = sqlx::query_scalar(
        r#"INSERT INTO "user" (username, password, nickname, created_at)
           VALUES ('grower', 'hash', 'Grower', '2024-06-01T00:00:00Z') RETURNING id"#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO mildewdata (type, data, created_at, user_id) VALUES ('downy', '{}', '2024-06-01T00:00:00Z', $1)")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query(r#"DELETE FROM "user" WHERE id = $1"#)
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mildewdata")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_record_type_defaults_to_legacy_value() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    run_migrations(&pool).await.unwrap();

    let kind: String = sqlx::query_scalar(
        "INSERT INTO mildewdata (created_at) VALUES ('2024-06-01T00:00:00Z') RETURNING type",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(kind, "mildew");

    close_pool(pool).await;
}
