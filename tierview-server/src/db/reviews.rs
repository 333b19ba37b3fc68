//! Review row operations

use super::{from_json, parse_timestamp, to_json};
use crate::models::ReviewRecord;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use std::collections::BTreeMap;
use tierview_common::content::ReviewFactor;
use tierview_common::{Error, Result};

const REVIEW_COLUMNS: &str = "review_id, user_id, tier_id, title, name, icon_url, \
     review_factors, sections, created_at, updated_at";

fn review_from_row(row: &SqliteRow) -> Result<ReviewRecord> {
    let factors: String = row.try_get("review_factors")?;
    let sections: String = row.try_get("sections")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ReviewRecord {
        review_id: row.try_get("review_id")?,
        user_id: row.try_get("user_id")?,
        tier_id: row.try_get("tier_id")?,
        title: row.try_get("title")?,
        name: row.try_get("name")?,
        icon_url: row.try_get("icon_url")?,
        factors: from_json(&factors)?,
        sections: from_json(&sections)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub async fn get_review<'e, E>(executor: E, review_id: &str) -> Result<Option<ReviewRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM reviews WHERE review_id = ?",
        REVIEW_COLUMNS
    ))
    .bind(review_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(review_from_row).transpose()
}

pub async fn review_exists<'e, E>(executor: E, review_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM reviews WHERE review_id = ?")
        .bind(review_id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

/// Reviews of a tier, oldest first
pub async fn list_reviews_in_tier<'e, E>(executor: E, tier_id: &str) -> Result<Vec<ReviewRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {} FROM reviews WHERE tier_id = ? ORDER BY created_at, review_id",
        REVIEW_COLUMNS
    ))
    .bind(tier_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(review_from_row).collect()
}

/// `(review_id, user_id)` of every review in a tier
pub async fn list_review_owners<'e, E>(executor: E, tier_id: &str) -> Result<Vec<(String, String)>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let owners = sqlx::query_as("SELECT review_id, user_id FROM reviews WHERE tier_id = ?")
        .bind(tier_id)
        .fetch_all(executor)
        .await?;
    Ok(owners)
}

pub async fn count_reviews_in_tier<'e, E>(executor: E, tier_id: &str) -> Result<usize>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE tier_id = ?")
        .bind(tier_id)
        .fetch_one(executor)
        .await?;
    Ok(count as usize)
}

/// Factor arrays of every review in a tier, keyed by review id
pub async fn load_factors_in_tier<'e, E>(
    executor: E,
    tier_id: &str,
) -> Result<BTreeMap<String, Vec<ReviewFactor>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT review_id, review_factors FROM reviews WHERE tier_id = ?")
            .bind(tier_id)
            .fetch_all(executor)
            .await?;

    rows.into_iter()
        .map(|(review_id, factors)| Ok((review_id, from_json(&factors)?)))
        .collect()
}

pub async fn update_factors<'e, E>(
    executor: E,
    review_id: &str,
    factors: &[ReviewFactor],
    updated_at: DateTime<Utc>,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE reviews SET review_factors = ?, updated_at = ? WHERE review_id = ?")
        .bind(to_json(factors)?)
        .bind(updated_at.to_rfc3339())
        .bind(review_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn insert_review<'e, E>(executor: E, review: &ReviewRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO reviews (
            review_id, user_id, tier_id, title, name, icon_url,
            review_factors, sections, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&review.review_id)
    .bind(&review.user_id)
    .bind(&review.tier_id)
    .bind(&review.title)
    .bind(&review.name)
    .bind(&review.icon_url)
    .bind(to_json(&review.factors)?)
    .bind(to_json(&review.sections)?)
    .bind(review.created_at.to_rfc3339())
    .bind(review.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Overwrite the editable columns of a review
pub async fn update_review<'e, E>(executor: E, review: &ReviewRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE reviews SET
            title = ?, name = ?, icon_url = ?, review_factors = ?, sections = ?, updated_at = ?
        WHERE review_id = ?
        "#,
    )
    .bind(&review.title)
    .bind(&review.name)
    .bind(&review.icon_url)
    .bind(to_json(&review.factors)?)
    .bind(to_json(&review.sections)?)
    .bind(review.updated_at.to_rfc3339())
    .bind(&review.review_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("review {}", review.review_id)));
    }
    Ok(())
}

pub async fn delete_review<'e, E>(executor: E, review_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM reviews WHERE review_id = ?")
        .bind(review_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_reviews_in_tier<'e, E>(executor: E, tier_id: &str) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM reviews WHERE tier_id = ?")
        .bind(tier_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
