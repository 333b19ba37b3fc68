//! Tier row operations

use super::{from_json, parse_timestamp, to_json};
use crate::models::TierRecord;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use tierview_common::content::PointType;
use tierview_common::{Error, Result};

const TIER_COLUMNS: &str = "tier_id, user_id, name, image_url, parags, point_type, \
     factor_params, pulling_up, pulling_down, created_at, updated_at";

fn tier_from_row(row: &SqliteRow) -> Result<TierRecord> {
    let point_type: String = row.try_get("point_type")?;
    let parags: String = row.try_get("parags")?;
    let factor_params: String = row.try_get("factor_params")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(TierRecord {
        tier_id: row.try_get("tier_id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        image_url: row.try_get("image_url")?,
        paragraphs: from_json(&parags)?,
        point_type: point_type.parse::<PointType>().map_err(Error::Internal)?,
        parameters: from_json(&factor_params)?,
        pulling_up: row.try_get("pulling_up")?,
        pulling_down: row.try_get("pulling_down")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub async fn get_tier<'e, E>(executor: E, tier_id: &str) -> Result<Option<TierRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM tiers WHERE tier_id = ?", TIER_COLUMNS))
        .bind(tier_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(tier_from_row).transpose()
}

/// Owner of a tier, without loading its content
pub async fn get_tier_owner<'e, E>(executor: E, tier_id: &str) -> Result<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let owner = sqlx::query_scalar("SELECT user_id FROM tiers WHERE tier_id = ?")
        .bind(tier_id)
        .fetch_optional(executor)
        .await?;
    Ok(owner)
}

pub async fn tier_exists<'e, E>(executor: E, tier_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(get_tier_owner(executor, tier_id).await?.is_some())
}

pub async fn insert_tier<'e, E>(executor: E, tier: &TierRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO tiers (
            tier_id, user_id, name, image_url, parags, point_type,
            factor_params, pulling_up, pulling_down, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&tier.tier_id)
    .bind(&tier.user_id)
    .bind(&tier.name)
    .bind(&tier.image_url)
    .bind(to_json(&tier.paragraphs)?)
    .bind(tier.point_type.as_str())
    .bind(to_json(&tier.parameters)?)
    .bind(tier.pulling_up)
    .bind(tier.pulling_down)
    .bind(tier.created_at.to_rfc3339())
    .bind(tier.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Overwrite every mutable column of an existing tier
pub async fn update_tier<'e, E>(executor: E, tier: &TierRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE tiers SET
            name = ?, image_url = ?, parags = ?, point_type = ?,
            factor_params = ?, pulling_up = ?, pulling_down = ?, updated_at = ?
        WHERE tier_id = ?
        "#,
    )
    .bind(&tier.name)
    .bind(&tier.image_url)
    .bind(to_json(&tier.paragraphs)?)
    .bind(tier.point_type.as_str())
    .bind(to_json(&tier.parameters)?)
    .bind(tier.pulling_up)
    .bind(tier.pulling_down)
    .bind(tier.updated_at.to_rfc3339())
    .bind(&tier.tier_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tier {}", tier.tier_id)));
    }
    Ok(())
}

pub async fn delete_tier<'e, E>(executor: E, tier_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM tiers WHERE tier_id = ?")
        .bind(tier_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
