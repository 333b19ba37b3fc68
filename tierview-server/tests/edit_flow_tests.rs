//! End-to-end edit flows against a scratch database and storage root

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tierview_common::codes::{CodeGenerator, HashedRandomCodes};
use tierview_common::config::Limits;
use tierview_common::content::{
    EvaluationParameterEdit, ParagraphEdit, ParagraphKind, PointType, ReviewFactor, SectionEdit,
};
use tierview_common::db::init_database;
use tierview_server::db::{operation_log, reviews, tiers, users};
use tierview_server::error::EditError;
use tierview_server::models::{ReviewEdit, ReviewRecord, TierEdit, TierRecord, UserEdit};
use tierview_server::services::{AssetStore, EditCoordinator};

const USER: &str = "user1";

struct Harness {
    dir: TempDir,
    pool: SqlitePool,
    coordinator: EditCoordinator,
}

impl Harness {
    async fn new() -> Self {
        Self::with_codes(Arc::new(HashedRandomCodes)).await
    }

    async fn with_codes(codes: Arc<dyn CodeGenerator>) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("tierview.db")).await.unwrap();
        let coordinator = EditCoordinator::new(
            pool.clone(),
            AssetStore::new(dir.path().join("files")),
            codes,
            Limits::default(),
        );
        Self {
            dir,
            pool,
            coordinator,
        }
    }

    fn storage(&self) -> std::path::PathBuf {
        self.dir.path().join("files")
    }

    /// Every stored file, relative to the storage root
    fn stored_files(&self) -> BTreeSet<String> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let relative = path.strip_prefix(root).unwrap();
                    out.insert(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        let mut out = BTreeSet::new();
        walk(&self.storage(), &self.storage(), &mut out);
        out
    }

    fn exists(&self, reference: &str) -> bool {
        self.storage().join(reference).is_file()
    }

    async fn tier(&self, tier_id: &str) -> TierRecord {
        tiers::get_tier(&self.pool, tier_id).await.unwrap().unwrap()
    }

    async fn factors(&self, review_id: &str) -> Vec<ReviewFactor> {
        reviews::get_review(&self.pool, review_id)
            .await
            .unwrap()
            .unwrap()
            .factors
    }

    async fn review(&self, review_id: &str) -> ReviewRecord {
        reviews::get_review(&self.pool, review_id).await.unwrap().unwrap()
    }

    async fn fail_review_updates(&self) {
        sqlx::query(
            "CREATE TRIGGER fail_review_update BEFORE UPDATE ON reviews \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .execute(&self.pool)
        .await
        .unwrap();
    }

    async fn fail_tier_updates(&self) {
        sqlx::query(
            "CREATE TRIGGER fail_tier_update BEFORE UPDATE ON tiers \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .execute(&self.pool)
        .await
        .unwrap();
    }
}

struct FixedCodes(&'static str);

impl CodeGenerator for FixedCodes {
    fn generate(&self, _seed: &str, _len: usize) -> String {
        self.0.to_string()
    }
}

fn png_base64(width: u32, height: u32) -> String {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 160, 30])))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf.into_inner())
}

fn param(name: &str, old_index: Option<i64>) -> EvaluationParameterEdit {
    EvaluationParameterEdit {
        id: None,
        name: name.to_string(),
        is_point: true,
        weight: 1,
        old_index,
    }
}

fn text(body: &str) -> ParagraphEdit {
    ParagraphEdit {
        kind: ParagraphKind::Text,
        body: body.to_string(),
        is_changed: false,
    }
}

fn new_image() -> ParagraphEdit {
    ParagraphEdit {
        kind: ParagraphKind::ImageLink,
        body: png_base64(40, 30),
        is_changed: true,
    }
}

fn kept_image(reference: &str) -> ParagraphEdit {
    ParagraphEdit {
        kind: ParagraphKind::ImageLink,
        body: reference.to_string(),
        is_changed: false,
    }
}

fn tier_edit(params: Vec<EvaluationParameterEdit>, paragraphs: Vec<ParagraphEdit>) -> TierEdit {
    TierEdit {
        name: "Ramen shops".to_string(),
        paragraphs,
        point_type: PointType::Score,
        evaluation_parameters: params,
        pulling_up: 0,
        pulling_down: 0,
        image_is_changed: false,
        image_base64: String::new(),
    }
}

fn abc() -> Vec<EvaluationParameterEdit> {
    vec![param("A", None), param("B", None), param("C", None)]
}

fn review_edit(tier_id: &str, points: &[f64]) -> ReviewEdit {
    ReviewEdit {
        tier_id: Some(tier_id.to_string()),
        title: "Visited twice".to_string(),
        name: "Menya".to_string(),
        icon_is_changed: false,
        icon_base64: String::new(),
        review_factors: points.iter().map(|&p| ReviewFactor::new("", p)).collect(),
        sections: vec![],
    }
}

fn points(factors: &[ReviewFactor]) -> Vec<f64> {
    factors.iter().map(|f| f.point).collect()
}

/// Tier holding two stored paragraph images; returns (tier id, [img1, img2])
async fn tier_with_two_images(h: &Harness) -> (String, Vec<String>) {
    let tier_id = h
        .coordinator
        .create_tier(
            USER,
            tier_edit(abc(), vec![text("intro"), new_image(), new_image()]),
        )
        .await
        .unwrap();
    let refs = h
        .tier(&tier_id)
        .await
        .paragraphs
        .iter()
        .filter_map(|p| p.image_ref().map(str::to_string))
        .collect::<Vec<_>>();
    assert_eq!(refs.len(), 2);
    (tier_id, refs)
}

#[tokio::test]
async fn test_remap_example_and_alignment() {
    let h = Harness::new().await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();
    let r1 = h
        .coordinator
        .create_review(USER, review_edit(&tier_id, &[10.0, 20.0, 30.0]))
        .await
        .unwrap();
    let r2 = h
        .coordinator
        .create_review(USER, review_edit(&tier_id, &[1.0, 2.0, 3.0]))
        .await
        .unwrap();
    let old_b_id = h.tier(&tier_id).await.parameters[1].id.clone();

    let edit = tier_edit(
        vec![param("B", Some(1)), param("C", Some(2)), param("D", Some(-1))],
        vec![],
    );
    h.coordinator.edit_tier(&tier_id, edit).await.unwrap();

    assert_eq!(points(&h.factors(&r1).await), vec![20.0, 30.0, 0.0]);
    assert_eq!(points(&h.factors(&r2).await), vec![2.0, 3.0, 0.0]);

    let tier = h.tier(&tier_id).await;
    assert_eq!(tier.parameters.len(), 3);
    assert_eq!(tier.parameters[0].id, old_b_id);
    for review in reviews::list_reviews_in_tier(&h.pool, &tier_id).await.unwrap() {
        assert_eq!(review.factors.len(), tier.parameters.len());
    }
}

#[tokio::test]
async fn test_stable_ids_survive_reorder() {
    let h = Harness::new().await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();
    let review_id = h
        .coordinator
        .create_review(USER, review_edit(&tier_id, &[10.0, 20.0, 30.0]))
        .await
        .unwrap();
    let ids: Vec<String> = h.tier(&tier_id).await.parameters.iter().map(|p| p.id.clone()).collect();

    // C, A by id; the positional hints are deliberately wrong
    let mut c = param("C", Some(0));
    c.id = Some(ids[2].clone());
    let mut a = param("A", Some(1));
    a.id = Some(ids[0].clone());
    h.coordinator
        .edit_tier(&tier_id, tier_edit(vec![c, a], vec![]))
        .await
        .unwrap();

    assert_eq!(points(&h.factors(&review_id).await), vec![30.0, 10.0]);
}

#[tokio::test]
async fn test_identical_resubmit_creates_and_deletes_nothing() {
    let h = Harness::new().await;
    let mut edit = tier_edit(abc(), vec![text("a & b"), new_image()]);
    edit.image_is_changed = true;
    edit.image_base64 = png_base64(100, 30);
    let tier_id = h.coordinator.create_tier(USER, edit).await.unwrap();

    let before = h.stored_files();
    assert_eq!(before.len(), 2);
    let tier = h.tier(&tier_id).await;

    let resubmit = tier_edit(
        abc(),
        tier.paragraphs.iter().map(ParagraphEdit::unchanged).collect(),
    );
    h.coordinator.edit_tier(&tier_id, resubmit).await.unwrap();

    assert_eq!(h.stored_files(), before);
    let after = h.tier(&tier_id).await;
    assert_eq!(after.paragraphs, tier.paragraphs);
    assert_eq!(after.image_url, tier.image_url);
}

#[tokio::test]
async fn test_failed_transaction_keeps_orphans_and_removes_new_files() {
    let h = Harness::new().await;
    let (tier_id, refs) = tier_with_two_images(&h).await;
    let review_id = h
        .coordinator
        .create_review(USER, review_edit(&tier_id, &[10.0, 20.0, 30.0]))
        .await
        .unwrap();
    let before_files = h.stored_files();
    let before_tier = h.tier(&tier_id).await;

    h.fail_tier_updates().await;
    let edit = tier_edit(
        vec![param("C", Some(2)), param("A", Some(0))],
        vec![kept_image(&refs[0]), new_image()],
    );
    let err = h.coordinator.edit_tier(&tier_id, edit).await.unwrap_err();

    assert!(matches!(err, EditError::Transaction(_)));
    assert_eq!(err.code(), "etxn-001");
    assert!(h.exists(&refs[1]), "orphan deleted before commit");
    assert_eq!(h.stored_files(), before_files);
    assert_eq!(h.tier(&tier_id).await, before_tier);
    assert_eq!(points(&h.factors(&review_id).await), vec![10.0, 20.0, 30.0]);
}

/// Review with an icon and one section holding two stored images;
/// returns (tier id, review id, [img1, img2])
async fn review_with_two_images(h: &Harness) -> (String, String, Vec<String>) {
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();
    let mut create = review_edit(&tier_id, &[1.0, 2.0, 3.0]);
    create.icon_is_changed = true;
    create.icon_base64 = png_base64(48, 48);
    create.sections = vec![SectionEdit {
        title: "Broth".to_string(),
        paragraphs: vec![new_image(), text("rich"), new_image()],
    }];
    let review_id = h.coordinator.create_review(USER, create).await.unwrap();
    let refs = h
        .review(&review_id)
        .await
        .sections[0]
        .paragraphs
        .iter()
        .filter_map(|p| p.image_ref().map(str::to_string))
        .collect::<Vec<_>>();
    assert_eq!(refs.len(), 2);
    (tier_id, review_id, refs)
}

#[tokio::test]
async fn test_failed_review_transaction_keeps_old_files() {
    let h = Harness::new().await;
    let (tier_id, review_id, refs) = review_with_two_images(&h).await;
    let before_files = h.stored_files();
    let before = h.review(&review_id).await;

    h.fail_review_updates().await;
    let mut edit = review_edit(&tier_id, &[7.0, 8.0, 9.0]);
    edit.icon_is_changed = true;
    edit.icon_base64 = png_base64(50, 50);
    edit.sections = vec![SectionEdit {
        title: "Broth".to_string(),
        paragraphs: vec![kept_image(&refs[0]), new_image()],
    }];
    let err = h.coordinator.edit_review(&review_id, edit).await.unwrap_err();

    assert_eq!(err.code(), "etxn-001");
    assert!(h.exists(&before.icon_url));
    assert!(h.exists(&refs[1]), "orphan deleted before commit");
    assert_eq!(h.stored_files(), before_files);
    assert_eq!(h.review(&review_id).await, before);
}

#[tokio::test]
async fn test_dangling_reference_in_review_sections() {
    let h = Harness::new().await;
    let (tier_id, review_id, refs) = review_with_two_images(&h).await;
    let before_files = h.stored_files();
    let before = h.review(&review_id).await;

    let mut edit = review_edit(&tier_id, &[1.0, 2.0, 3.0]);
    edit.sections = vec![
        SectionEdit {
            title: "Broth".to_string(),
            paragraphs: vec![new_image(), kept_image(&refs[0])],
        },
        SectionEdit {
            title: "Borrowed".to_string(),
            paragraphs: vec![kept_image("user1/review/other/parag_x.jpg")],
        },
    ];
    let err = h.coordinator.edit_review(&review_id, edit).await.unwrap_err();

    assert_eq!(err.code(), "rcon-001");
    assert_eq!(h.stored_files(), before_files);
    assert_eq!(h.review(&review_id).await, before);
}

#[tokio::test]
async fn test_review_icon_removal_deletes_file_after_commit() {
    let h = Harness::new().await;
    let (tier_id, review_id, refs) = review_with_two_images(&h).await;
    let old_icon = h.review(&review_id).await.icon_url;
    assert!(h.exists(&old_icon));

    let mut edit = review_edit(&tier_id, &[1.0, 2.0, 3.0]);
    edit.icon_is_changed = true;
    edit.icon_base64 = String::new();
    edit.sections = h
        .review(&review_id)
        .await
        .sections
        .iter()
        .map(SectionEdit::unchanged)
        .collect();
    h.coordinator.edit_review(&review_id, edit).await.unwrap();

    let updated = h.review(&review_id).await;
    assert_eq!(updated.icon_url, "");
    assert!(!h.exists(&old_icon));
    assert!(h.exists(&refs[0]));
    assert!(h.exists(&refs[1]));
}

#[tokio::test]
async fn test_literal_entities_survive_resubmit() {
    let h = Harness::new().await;
    let tier_id = h
        .coordinator
        .create_tier(USER, tier_edit(abc(), vec![text("write &lt; for <")]))
        .await
        .unwrap();
    let stored = h.tier(&tier_id).await.paragraphs;
    assert_eq!(stored[0].body, "write &amp;lt; for &lt;");

    let resubmit = tier_edit(abc(), stored.iter().map(ParagraphEdit::unchanged).collect());
    h.coordinator.edit_tier(&tier_id, resubmit).await.unwrap();
    assert_eq!(h.tier(&tier_id).await.paragraphs, stored);
}

#[tokio::test]
async fn test_user_icon_replacement_retires_old_icon() {
    let h = Harness::new().await;
    let edit = |icon: String| UserEdit {
        name: "Aoi".to_string(),
        profile: String::new(),
        icon_is_changed: true,
        icon_base64: icon,
    };
    h.coordinator.create_user(USER, edit(png_base64(40, 40))).await.unwrap();
    let first = users::get_user(&h.pool, USER).await.unwrap().unwrap().icon_url;
    assert!(first.starts_with("user1/user/user/icon_"));

    h.coordinator.edit_user(USER, edit(png_base64(42, 40))).await.unwrap();
    let second = users::get_user(&h.pool, USER).await.unwrap().unwrap().icon_url;
    assert_ne!(second, first);
    assert!(!h.exists(&first));
    assert!(h.exists(&second));

    // Wrong shape: nothing written, current icon kept
    let err = h
        .coordinator
        .edit_user(USER, edit(png_base64(120, 40)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "timg-002");
    assert_eq!(h.stored_files(), BTreeSet::from([second]));
}

#[tokio::test]
async fn test_commit_collects_orphans() {
    let h = Harness::new().await;
    let (tier_id, refs) = tier_with_two_images(&h).await;

    let edit = tier_edit(abc(), vec![kept_image(&refs[0]), new_image()]);
    h.coordinator.edit_tier(&tier_id, edit).await.unwrap();

    let tier = h.tier(&tier_id).await;
    let img3 = tier.paragraphs[1].body.clone();
    assert_eq!(tier.paragraphs[0].body, refs[0]);
    assert!(h.exists(&refs[0]));
    assert!(!h.exists(&refs[1]));
    assert!(h.exists(&img3));
    assert!(img3.starts_with(&format!("{}/tier/{}/parag_", USER, tier_id)));
}

#[tokio::test]
async fn test_aspect_rejection_writes_nothing() {
    let h = Harness::new().await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();
    let before = h.stored_files();

    let mut edit = tier_edit(abc(), vec![new_image()]);
    edit.image_is_changed = true;
    edit.image_base64 = png_base64(100, 100);
    let err = h.coordinator.edit_tier(&tier_id, edit).await.unwrap_err();

    assert!(matches!(err, EditError::Aspect { .. }));
    assert_eq!(err.code(), "timg-002");
    // The paragraph image written before the icon failed is removed too
    assert_eq!(h.stored_files(), before);
    assert!(h.tier(&tier_id).await.paragraphs.is_empty());
}

#[tokio::test]
async fn test_collision_retry_bound() {
    let h = Harness::with_codes(Arc::new(FixedCodes("fixedcode0000001"))).await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();

    let taken = h
        .storage()
        .join(format!("{}/tier/{}/parag_fixedcode0000001.jpg", USER, tier_id));
    std::fs::create_dir_all(taken.parent().unwrap()).unwrap();
    std::fs::write(&taken, b"occupied").unwrap();
    let before = h.stored_files();

    let err = h
        .coordinator
        .edit_tier(&tier_id, tier_edit(abc(), vec![new_image()]))
        .await
        .unwrap_err();

    assert!(matches!(err, EditError::RetryExhausted { attempts: 3 }));
    assert_eq!(h.stored_files(), before);
    assert_eq!(std::fs::read(&taken).unwrap(), b"occupied");
}

#[tokio::test]
async fn test_dangling_reference_rejected() {
    let h = Harness::new().await;
    let (tier_id, refs) = tier_with_two_images(&h).await;
    let before = h.tier(&tier_id).await;

    let edit = tier_edit(
        abc(),
        vec![kept_image(&refs[0]), kept_image("user1/tier/x/parag_never.jpg")],
    );
    let err = h.coordinator.edit_tier(&tier_id, edit).await.unwrap_err();

    assert_eq!(err.code(), "rcon-001");
    assert_eq!(h.tier(&tier_id).await, before);
    assert!(h.exists(&refs[1]));
}

#[tokio::test]
async fn test_review_icon_replacement_and_sections() {
    let h = Harness::new().await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();

    let mut create = review_edit(&tier_id, &[1.0, 2.0, 3.0]);
    create.icon_is_changed = true;
    create.icon_base64 = png_base64(64, 64);
    create.sections = vec![SectionEdit {
        title: "<Noodles>".to_string(),
        paragraphs: vec![text("firm"), new_image()],
    }];
    let review_id = h.coordinator.create_review(USER, create).await.unwrap();

    let review = reviews::get_review(&h.pool, &review_id).await.unwrap().unwrap();
    let old_icon = review.icon_url.clone();
    assert_eq!(review.sections[0].title, "&lt;Noodles&gt;");
    assert!(h.exists(&old_icon));

    let mut edit = review_edit(&tier_id, &[4.0, 5.0, 6.0]);
    edit.icon_is_changed = true;
    edit.icon_base64 = png_base64(64, 60);
    edit.sections = review.sections.iter().map(SectionEdit::unchanged).collect();
    h.coordinator.edit_review(&review_id, edit).await.unwrap();

    let updated = reviews::get_review(&h.pool, &review_id).await.unwrap().unwrap();
    assert_ne!(updated.icon_url, old_icon);
    assert!(!h.exists(&old_icon));
    assert!(h.exists(&updated.icon_url));
    assert_eq!(updated.sections, review.sections);
    assert_eq!(points(&updated.factors), vec![4.0, 5.0, 6.0]);
}

#[tokio::test]
async fn test_review_factor_count_must_match() {
    let h = Harness::new().await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();

    let err = h
        .coordinator
        .create_review(USER, review_edit(&tier_id, &[1.0]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "vrev-003");
    assert_eq!(reviews::count_reviews_in_tier(&h.pool, &tier_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_tier_removes_rows_and_directories() {
    let h = Harness::new().await;
    let (tier_id, _) = tier_with_two_images(&h).await;
    let mut review = review_edit(&tier_id, &[1.0, 2.0, 3.0]);
    review.icon_is_changed = true;
    review.icon_base64 = png_base64(32, 32);
    let review_id = h.coordinator.create_review(USER, review).await.unwrap();
    assert_eq!(h.stored_files().len(), 3);

    h.coordinator.delete_tier(&tier_id).await.unwrap();

    assert!(tiers::get_tier(&h.pool, &tier_id).await.unwrap().is_none());
    assert!(reviews::get_review(&h.pool, &review_id).await.unwrap().is_none());
    assert!(h.stored_files().is_empty());

    let err = h.coordinator.delete_tier(&tier_id).await.unwrap_err();
    assert!(matches!(err, EditError::NotFound(_)));
}

#[tokio::test]
async fn test_mutations_are_logged() {
    let h = Harness::new().await;
    let tier_id = h.coordinator.create_tier(USER, tier_edit(abc(), vec![])).await.unwrap();
    h.coordinator
        .edit_tier(&tier_id, tier_edit(abc(), vec![text("more")]))
        .await
        .unwrap();

    let ops = operation_log::list_operations(&h.pool, USER).await.unwrap();
    assert_eq!(
        ops,
        vec![
            ("update tier".to_string(), tier_id.clone()),
            ("create tier".to_string(), tier_id),
        ]
    );
}
