//! Rich content and scoring schema models
//!
//! Tiers and reviews persist these as JSON text columns. Edit payloads use the
//! `*Edit` variants, which carry the extra client-side hints (`isChanged`,
//! `oldIndex`) that never reach storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Paragraph content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParagraphKind {
    /// Free-form text
    Text,
    /// Link to an external service (http/https)
    ServiceLink,
    /// Embedded uploaded image
    ImageLink,
}

/// Persisted paragraph
///
/// For `ImageLink`, `body` is the stored reference relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(rename = "type")]
    pub kind: ParagraphKind,
    pub body: String,
}

impl Paragraph {
    pub fn new(kind: ParagraphKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Stored image reference, if this paragraph embeds one
    pub fn image_ref(&self) -> Option<&str> {
        match self.kind {
            ParagraphKind::ImageLink if !self.body.is_empty() => Some(&self.body),
            _ => None,
        }
    }
}

/// Paragraph as submitted in an edit payload
///
/// An unchanged image paragraph carries its stored reference in `body`; a
/// changed one carries the base64-encoded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphEdit {
    #[serde(rename = "type")]
    pub kind: ParagraphKind,
    pub body: String,
    #[serde(default)]
    pub is_changed: bool,
}

impl ParagraphEdit {
    /// Edit entry that re-submits a persisted paragraph untouched
    pub fn unchanged(paragraph: &Paragraph) -> Self {
        Self {
            kind: paragraph.kind,
            body: paragraph.body.clone(),
            is_changed: false,
        }
    }
}

/// Persisted review section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(alias = "parags")]
    pub paragraphs: Vec<Paragraph>,
}

/// Review section as submitted in an edit payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEdit {
    pub title: String,
    #[serde(alias = "parags")]
    pub paragraphs: Vec<ParagraphEdit>,
}

impl SectionEdit {
    pub fn unchanged(section: &Section) -> Self {
        Self {
            title: section.title.clone(),
            paragraphs: section.paragraphs.iter().map(ParagraphEdit::unchanged).collect(),
        }
    }
}

/// All image references held by a flat paragraph list
pub fn paragraph_image_refs(paragraphs: &[Paragraph]) -> impl Iterator<Item = &str> {
    paragraphs.iter().filter_map(Paragraph::image_ref)
}

/// All image references held by a section tree
pub fn section_image_refs(sections: &[Section]) -> impl Iterator<Item = &str> {
    sections
        .iter()
        .flat_map(|section| paragraph_image_refs(&section.paragraphs))
}

/// Display format of a tier's scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointType {
    Stars,
    Rank7,
    Rank14,
    Score,
    Point,
    Unlimited,
}

impl PointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Stars => "stars",
            PointType::Rank7 => "rank7",
            PointType::Rank14 => "rank14",
            PointType::Score => "score",
            PointType::Point => "point",
            PointType::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stars" => Ok(PointType::Stars),
            "rank7" => Ok(PointType::Rank7),
            "rank14" => Ok(PointType::Rank14),
            "score" => Ok(PointType::Score),
            "point" => Ok(PointType::Point),
            "unlimited" => Ok(PointType::Unlimited),
            other => Err(format!("unknown point type '{}'", other)),
        }
    }
}

/// One column of a tier's scoring schema
///
/// `id` is assigned when the parameter is first persisted and survives
/// reordering. Rows written before ids existed deserialize with an empty id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationParameter {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub is_point: bool,
    pub weight: i64,
}

/// Evaluation parameter as submitted in a tier edit
///
/// `old_index` is the client's positional hint: a valid index into the
/// previous parameter list, or negative/absent for a new parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationParameterEdit {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub is_point: bool,
    pub weight: i64,
    #[serde(default, alias = "index")]
    pub old_index: Option<i64>,
}

/// One positional score/note of a review, aligned to its tier's parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFactor {
    pub info: String,
    pub point: f64,
}

impl ReviewFactor {
    pub fn new(info: impl Into<String>, point: f64) -> Self {
        Self {
            info: info.into(),
            point,
        }
    }
}
