//! Append-only audit trail of mutations

use sqlx::SqlitePool;
use tierview_common::Result;

pub async fn write_operation_log(
    pool: &SqlitePool,
    user_id: &str,
    operation: &str,
    content: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO operation_logs (user_id, operation, content, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(operation)
    .bind(content)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Operations recorded for a user, newest first
pub async fn list_operations(pool: &SqlitePool, user_id: &str) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as(
        "SELECT operation, content FROM operation_logs WHERE user_id = ? ORDER BY id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
