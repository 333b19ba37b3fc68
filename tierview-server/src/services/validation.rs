//! Payload checks run before any file or row is touched

use crate::error::EditError;
use crate::models::{IconChange, ReviewEdit, TierEdit, UserEdit};
use tierview_common::config::{ImageProfile, Limits, SectionLimits};
use tierview_common::content::{EvaluationParameter, ParagraphEdit, ParagraphKind, PointType};

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn fail(code: &str, message: impl Into<String>) -> Result<(), EditError> {
    Err(EditError::validation(code, message))
}

fn check_payload(code: &str, profile: &ImageProfile, payload: &str) -> Result<(), EditError> {
    if payload.len() > profile.max_base64_len() {
        return fail(
            code,
            format!("image exceeds {} KiB", profile.max_payload_kib),
        );
    }
    Ok(())
}

fn check_icon(code: &str, profile: &ImageProfile, change: &IconChange) -> Result<(), EditError> {
    match change {
        IconChange::Replace(payload) => check_payload(code, profile, payload),
        IconChange::Keep | IconChange::Remove => Ok(()),
    }
}

/// Paragraph list rules shared by tier descriptions and review sections
///
/// `prefix` selects the code namespace (`vtir` or `vpgs`).
pub fn validate_paragraphs(
    paragraphs: &[ParagraphEdit],
    limits: &SectionLimits,
    prefix: &str,
) -> Result<(), EditError> {
    if paragraphs.len() > limits.paragraphs_len_max {
        return fail(
            &format!("{}-002", prefix),
            format!("at most {} paragraphs", limits.paragraphs_len_max),
        );
    }
    for paragraph in paragraphs {
        match paragraph.kind {
            ParagraphKind::Text => {
                if char_len(&paragraph.body) > limits.text_len_max {
                    return fail(
                        &format!("{}-003", prefix),
                        format!("text paragraphs hold at most {} characters", limits.text_len_max),
                    );
                }
            }
            ParagraphKind::ServiceLink => {
                let link = paragraph.body.trim();
                let scheme_ok = link.starts_with("http://") || link.starts_with("https://");
                if !scheme_ok || char_len(link) > limits.link_len_max {
                    return fail(
                        &format!("{}-004", prefix),
                        format!(
                            "links must be http(s) URLs of at most {} characters",
                            limits.link_len_max
                        ),
                    );
                }
            }
            ParagraphKind::ImageLink if paragraph.is_changed => {
                check_payload(&format!("{}-005", prefix), &limits.image, &paragraph.body)?;
            }
            ParagraphKind::ImageLink => {}
        }
    }
    Ok(())
}

pub fn validate_tier_edit(edit: &TierEdit, limits: &Limits) -> Result<(), EditError> {
    let tier = &limits.tier;

    let name_len = char_len(edit.name.trim());
    if name_len == 0 || name_len > tier.name_len_max {
        return fail(
            "vtir-001",
            format!("name must be 1-{} characters", tier.name_len_max),
        );
    }

    validate_paragraphs(&edit.paragraphs, &limits.section, "vtir")?;

    let params = &edit.evaluation_parameters;
    if params.is_empty() || params.len() > tier.params_len_max {
        return fail(
            "vtir-009",
            format!("1-{} evaluation parameters required", tier.params_len_max),
        );
    }
    if !params.iter().any(|p| p.is_point) {
        return fail("vtir-010", "at least one evaluation parameter must be a point");
    }
    for param in params {
        let len = char_len(param.name.trim());
        if len == 0 || len > tier.param_name_len_max {
            return fail(
                "vtir-011",
                format!(
                    "parameter names must be 1-{} characters",
                    tier.param_name_len_max
                ),
            );
        }
        if !(0..=tier.weight_max).contains(&param.weight) {
            return fail(
                "vtir-012",
                format!("weights must be within 0-{}", tier.weight_max),
            );
        }
    }

    let pulling = 0..=tier.pulling_max;
    if !pulling.contains(&edit.pulling_up) || !pulling.contains(&edit.pulling_down) {
        return fail(
            "vtir-013",
            format!("pulling values must be within 0-{}", tier.pulling_max),
        );
    }

    check_icon("vtir-008", &tier.icon, &edit.icon_change())
}

/// A review holds exactly one factor per evaluation parameter of its tier
pub fn check_factor_count(factors: usize, parameters: usize) -> Result<(), EditError> {
    if factors != parameters {
        return fail(
            "vrev-003",
            format!("expected {} review factors, got {}", parameters, factors),
        );
    }
    Ok(())
}

/// Review rules; factors are checked against the owning tier's schema
pub fn validate_review_edit(
    edit: &ReviewEdit,
    parameters: &[EvaluationParameter],
    point_type: PointType,
    limits: &Limits,
) -> Result<(), EditError> {
    let review = &limits.review;

    let name_len = char_len(edit.name.trim());
    if name_len == 0 || name_len > review.name_len_max {
        return fail(
            "vrev-001",
            format!("name must be 1-{} characters", review.name_len_max),
        );
    }
    if char_len(&edit.title) > review.title_len_max {
        return fail(
            "vrev-002",
            format!("title holds at most {} characters", review.title_len_max),
        );
    }

    check_factor_count(edit.review_factors.len(), parameters.len())?;
    for (factor, param) in edit.review_factors.iter().zip(parameters) {
        if param.is_point {
            let bounded = point_type != PointType::Unlimited;
            let in_range = factor.point.is_finite()
                && factor.point >= 0.0
                && (!bounded || factor.point <= review.point_max);
            if !in_range {
                return fail(
                    "vrev-004",
                    format!("point for '{}' is out of range", param.name),
                );
            }
        } else if char_len(&factor.info) > review.factor_info_len_max {
            return fail(
                "vrev-004",
                format!(
                    "info for '{}' holds at most {} characters",
                    param.name, review.factor_info_len_max
                ),
            );
        }
    }

    if edit.sections.len() > review.sections_len_max {
        return fail(
            "vrev-005",
            format!("at most {} sections", review.sections_len_max),
        );
    }
    for section in &edit.sections {
        if char_len(&section.title) > limits.section.title_len_max {
            return fail(
                "vrev-006",
                format!(
                    "section titles hold at most {} characters",
                    limits.section.title_len_max
                ),
            );
        }
        validate_paragraphs(&section.paragraphs, &limits.section, "vpgs")?;
    }

    check_icon("vrev-007", &review.icon, &edit.icon_change())
}

/// User profile rules
///
/// `prefix` selects the code namespace: `pusr` on create, `uusr` on edit.
pub fn validate_user_edit(edit: &UserEdit, limits: &Limits, prefix: &str) -> Result<(), EditError> {
    let user = &limits.user;

    let name_len = char_len(edit.name.trim());
    if name_len == 0 || name_len > user.name_len_max {
        return fail(
            &format!("{}-001", prefix),
            format!("name must be 1-{} characters", user.name_len_max),
        );
    }
    if char_len(&edit.profile) > user.profile_len_max {
        return fail(
            &format!("{}-002", prefix),
            format!("profile holds at most {} characters", user.profile_len_max),
        );
    }

    check_icon(&format!("{}-003", prefix), &user.icon, &edit.icon_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierview_common::content::{EvaluationParameterEdit, ReviewFactor, SectionEdit};

    fn tier_edit() -> TierEdit {
        TierEdit {
            name: "Ramen".to_string(),
            paragraphs: vec![],
            point_type: PointType::Score,
            evaluation_parameters: vec![EvaluationParameterEdit {
                id: None,
                name: "Taste".to_string(),
                is_point: true,
                weight: 5,
                old_index: None,
            }],
            pulling_up: 0,
            pulling_down: 0,
            image_is_changed: false,
            image_base64: String::new(),
        }
    }

    fn review_edit(points: &[f64]) -> ReviewEdit {
        ReviewEdit {
            tier_id: None,
            title: "t".to_string(),
            name: "Shop".to_string(),
            icon_is_changed: false,
            icon_base64: String::new(),
            review_factors: points.iter().map(|&p| ReviewFactor::new("", p)).collect(),
            sections: vec![],
        }
    }

    fn point_params(n: usize) -> Vec<EvaluationParameter> {
        (0..n)
            .map(|i| EvaluationParameter {
                id: format!("p{}", i),
                name: format!("P{}", i),
                is_point: true,
                weight: 1,
            })
            .collect()
    }

    fn code_of(result: Result<(), EditError>) -> String {
        result.unwrap_err().code().to_string()
    }

    #[test]
    fn test_valid_tier_passes() {
        assert!(validate_tier_edit(&tier_edit(), &Limits::default()).is_ok());
    }

    #[test]
    fn test_tier_rules() {
        let limits = Limits::default();

        let mut edit = tier_edit();
        edit.name = "  ".to_string();
        assert_eq!(code_of(validate_tier_edit(&edit, &limits)), "vtir-001");

        let mut edit = tier_edit();
        edit.evaluation_parameters[0].is_point = false;
        assert_eq!(code_of(validate_tier_edit(&edit, &limits)), "vtir-010");

        let mut edit = tier_edit();
        edit.evaluation_parameters[0].weight = 101;
        assert_eq!(code_of(validate_tier_edit(&edit, &limits)), "vtir-012");

        let mut edit = tier_edit();
        edit.paragraphs.push(ParagraphEdit {
            kind: ParagraphKind::ServiceLink,
            body: "ftp://x".to_string(),
            is_changed: false,
        });
        assert_eq!(code_of(validate_tier_edit(&edit, &limits)), "vtir-004");
    }

    #[test]
    fn test_oversized_icon_rejected() {
        let mut limits = Limits::default();
        limits.tier.icon.max_payload_kib = 1;
        let mut edit = tier_edit();
        edit.image_is_changed = true;
        edit.image_base64 = "A".repeat(2000);
        assert_eq!(code_of(validate_tier_edit(&edit, &limits)), "vtir-008");
    }

    #[test]
    fn test_factor_count_must_match_schema() {
        let err = validate_review_edit(
            &review_edit(&[1.0]),
            &point_params(2),
            PointType::Score,
            &Limits::default(),
        );
        assert_eq!(code_of(err), "vrev-003");
    }

    #[test]
    fn test_unlimited_point_type_lifts_upper_bound() {
        let limits = Limits::default();
        let edit = review_edit(&[250.0]);
        assert!(validate_review_edit(&edit, &point_params(1), PointType::Score, &limits).is_err());
        assert!(
            validate_review_edit(&edit, &point_params(1), PointType::Unlimited, &limits).is_ok()
        );
    }

    #[test]
    fn test_section_paragraph_limits_use_vpgs_codes() {
        let mut edit = review_edit(&[1.0]);
        edit.sections.push(SectionEdit {
            title: "s".to_string(),
            paragraphs: vec![
                ParagraphEdit {
                    kind: ParagraphKind::Text,
                    body: "x".to_string(),
                    is_changed: false,
                };
                17
            ],
        });
        let err = validate_review_edit(
            &edit,
            &point_params(1),
            PointType::Score,
            &Limits::default(),
        );
        assert_eq!(code_of(err), "vpgs-002");
    }

    #[test]
    fn test_user_rules_use_prefix() {
        let limits = Limits::default();
        let mut edit = UserEdit {
            name: "Kaede".to_string(),
            profile: String::new(),
            icon_is_changed: false,
            icon_base64: String::new(),
        };
        assert!(validate_user_edit(&edit, &limits, "uusr").is_ok());

        edit.name = " ".to_string();
        assert_eq!(code_of(validate_user_edit(&edit, &limits, "pusr")), "pusr-001");

        edit.name = "Kaede".to_string();
        edit.profile = "x".repeat(401);
        assert_eq!(code_of(validate_user_edit(&edit, &limits, "uusr")), "uusr-002");

        edit.profile = String::new();
        edit.icon_is_changed = true;
        edit.icon_base64 = "A".repeat(limits.user.icon.max_base64_len() + 1);
        assert_eq!(code_of(validate_user_edit(&edit, &limits, "uusr")), "uusr-003");
    }
}
