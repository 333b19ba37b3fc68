//! User profile rows

use super::parse_timestamp;
use crate::models::UserRecord;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use tierview_common::{Error, Result};

fn user_from_row(row: &SqliteRow) -> Result<UserRecord> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(UserRecord {
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        profile: row.try_get("profile")?,
        icon_url: row.try_get("icon_url")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub async fn get_user<'e, E>(executor: E, user_id: &str) -> Result<Option<UserRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT user_id, name, profile, icon_url, created_at, updated_at \
         FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn insert_user<'e, E>(executor: E, user: &UserRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO users (user_id, name, profile, icon_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.name)
    .bind(&user.profile)
    .bind(&user.icon_url)
    .bind(user.created_at.to_rfc3339())
    .bind(user.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn update_user<'e, E>(executor: E, user: &UserRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE users SET name = ?, profile = ?, icon_url = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(&user.name)
    .bind(&user.profile)
    .bind(&user.icon_url)
    .bind(user.updated_at.to_rfc3339())
    .bind(&user.user_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("user {}", user.user_id)));
    }
    Ok(())
}
