//! Tests for database initialization

use tierview_common::db::init::init_database;

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("tierview.db");

    let pool = init_database(&db_path).await;

    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_schema_tables_present() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("tierview.db")).await.unwrap();

    let names = table_names(&pool).await;
    for expected in ["operation_logs", "reviews", "sessions", "tiers", "users"] {
        assert!(names.iter().any(|n| n == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tierview.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO tiers (tier_id, user_id, name, point_type) VALUES ('t1', 'u1', 'n', 'stars')")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    // Re-running the schema must keep existing rows
    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tiers")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_point_type_constraint() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("tierview.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO tiers (tier_id, user_id, name, point_type) VALUES ('t1', 'u1', 'n', 'percent')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
