//! Edit payloads and read views exchanged with clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierview_common::content::{
    EvaluationParameter, EvaluationParameterEdit, Paragraph, ParagraphEdit, PointType,
    ReviewFactor, Section, SectionEdit,
};

/// Requested change to a stored icon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconChange {
    Keep,
    Remove,
    /// New base64 payload
    Replace(String),
}

impl IconChange {
    pub fn from_flags(is_changed: bool, payload: &str) -> Self {
        match (is_changed, payload.trim().is_empty()) {
            (false, _) => IconChange::Keep,
            (true, true) => IconChange::Remove,
            (true, false) => IconChange::Replace(payload.to_string()),
        }
    }
}

/// Tier create/edit body
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierEdit {
    pub name: String,
    #[serde(default, alias = "parags")]
    pub paragraphs: Vec<ParagraphEdit>,
    pub point_type: PointType,
    #[serde(alias = "reviewFactorParams")]
    pub evaluation_parameters: Vec<EvaluationParameterEdit>,
    #[serde(default)]
    pub pulling_up: i64,
    #[serde(default)]
    pub pulling_down: i64,
    #[serde(default)]
    pub image_is_changed: bool,
    #[serde(default)]
    pub image_base64: String,
}

impl TierEdit {
    pub fn icon_change(&self) -> IconChange {
        IconChange::from_flags(self.image_is_changed, &self.image_base64)
    }
}

/// Review create/edit body
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEdit {
    /// Required on create, ignored on edit
    #[serde(default)]
    pub tier_id: Option<String>,
    pub title: String,
    pub name: String,
    #[serde(default)]
    pub icon_is_changed: bool,
    #[serde(default)]
    pub icon_base64: String,
    pub review_factors: Vec<ReviewFactor>,
    #[serde(default)]
    pub sections: Vec<SectionEdit>,
}

impl ReviewEdit {
    pub fn icon_change(&self) -> IconChange {
        IconChange::from_flags(self.icon_is_changed, &self.icon_base64)
    }
}

/// User profile create/edit body
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEdit {
    pub name: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub icon_is_changed: bool,
    #[serde(default)]
    pub icon_base64: String,
}

impl UserEdit {
    pub fn icon_change(&self) -> IconChange {
        IconChange::from_flags(self.icon_is_changed, &self.icon_base64)
    }
}

/// Stored user profile
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub profile: String,
    pub icon_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierRecord {
    pub tier_id: String,
    pub user_id: String,
    pub name: String,
    pub image_url: String,
    pub paragraphs: Vec<Paragraph>,
    pub point_type: PointType,
    pub parameters: Vec<EvaluationParameter>,
    pub pulling_up: i64,
    pub pulling_down: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored review
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub review_id: String,
    pub user_id: String,
    pub tier_id: String,
    pub title: String,
    pub name: String,
    pub icon_url: String,
    pub factors: Vec<ReviewFactor>,
    pub sections: Vec<Section>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub user_id: String,
    pub name: String,
    pub profile: String,
    pub icon_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserView {
    fn from(u: UserRecord) -> Self {
        Self {
            user_id: u.user_id,
            name: u.name,
            profile: u.profile,
            icon_url: u.icon_url,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Evaluation parameter as shown to clients, with its current position
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterView {
    pub id: String,
    pub name: String,
    pub is_point: bool,
    pub weight: i64,
    pub index: usize,
}

impl ParameterView {
    pub fn list(parameters: &[EvaluationParameter]) -> Vec<Self> {
        parameters
            .iter()
            .enumerate()
            .map(|(index, p)| Self {
                id: p.id.clone(),
                name: p.name.clone(),
                is_point: p.is_point,
                weight: p.weight,
                index,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub review_id: String,
    pub user_id: String,
    pub tier_id: String,
    pub title: String,
    pub name: String,
    pub icon_url: String,
    pub review_factors: Vec<ReviewFactor>,
    pub sections: Vec<Section>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReviewRecord> for ReviewView {
    fn from(r: ReviewRecord) -> Self {
        Self {
            review_id: r.review_id,
            user_id: r.user_id,
            tier_id: r.tier_id,
            title: r.title,
            name: r.name,
            icon_url: r.icon_url,
            review_factors: r.factors,
            sections: r.sections,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierView {
    pub tier_id: String,
    pub user_id: String,
    pub name: String,
    pub image_url: String,
    pub paragraphs: Vec<Paragraph>,
    pub point_type: PointType,
    pub evaluation_parameters: Vec<ParameterView>,
    pub pulling_up: i64,
    pub pulling_down: i64,
    pub reviews: Vec<ReviewView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TierView {
    pub fn new(tier: TierRecord, reviews: Vec<ReviewRecord>) -> Self {
        Self {
            evaluation_parameters: ParameterView::list(&tier.parameters),
            tier_id: tier.tier_id,
            user_id: tier.user_id,
            name: tier.name,
            image_url: tier.image_url,
            paragraphs: tier.paragraphs,
            point_type: tier.point_type,
            pulling_up: tier.pulling_up,
            pulling_down: tier.pulling_down,
            reviews: reviews.into_iter().map(ReviewView::from).collect(),
            created_at: tier.created_at,
            updated_at: tier.updated_at,
        }
    }
}

/// Review plus the schema needed to read its factors
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDetailView {
    #[serde(flatten)]
    pub review: ReviewView,
    pub point_type: PointType,
    pub evaluation_parameters: Vec<ParameterView>,
}
