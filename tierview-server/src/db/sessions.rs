//! Session lookup and post throttling state
//!
//! Sessions are issued elsewhere; this service only reads them and records
//! the time of each successful mutation.

use super::parse_timestamp;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tierview_common::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub expired_time: DateTime<Utc>,
    pub last_post_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired_time <= now
    }
}

pub async fn find_session(pool: &SqlitePool, session_id: &str) -> Result<Option<SessionRecord>> {
    let row = sqlx::query(
        "SELECT session_id, user_id, expired_time, last_post_at FROM sessions WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expired_time: String = row.try_get("expired_time")?;
    let last_post_at: Option<String> = row.try_get("last_post_at")?;

    Ok(Some(SessionRecord {
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        expired_time: parse_timestamp(&expired_time)?,
        last_post_at: last_post_at.as_deref().map(parse_timestamp).transpose()?,
    }))
}

pub async fn insert_session(
    pool: &SqlitePool,
    session_id: &str,
    user_id: &str,
    expired_time: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO sessions (session_id, user_id, expired_time) VALUES (?, ?, ?)")
        .bind(session_id)
        .bind(user_id)
        .bind(expired_time.to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_post(pool: &SqlitePool, session_id: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE sessions SET last_post_at = ? WHERE session_id = ?")
        .bind(at.to_rfc3339())
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}
