//! Tier and review mutations, end to end
//!
//! Every mutation follows the same ordering:
//! 1. validate the payload (no side effects)
//! 2. stage images on a blocking thread: write new files, note superseded ones
//! 3. run one database transaction
//! 4. finalize the stage on commit (delete superseded files), or compensate on
//!    failure (delete the files written in step 2)
//!
//! File deletion never precedes the commit.

use crate::db::{operation_log, reviews, tiers, users};
use crate::error::EditError;
use crate::models::{
    IconChange, ReviewEdit, ReviewRecord, TierEdit, TierRecord, UserEdit, UserRecord,
};
use crate::services::asset_reconciler::{AssetReconciler, Reconciliation};
use crate::services::asset_stage::AssetStage;
use crate::services::asset_store::{AssetCategory, AssetStore, AssetTarget, CleanupReport};
use crate::services::image_transcoder::ImageTranscoder;
use crate::services::parameter_remap::RemapPlan;
use crate::services::validation::{
    check_factor_count, validate_review_edit, validate_tier_edit, validate_user_edit,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tierview_common::codes::CodeGenerator;
use tierview_common::config::{ImageProfile, Limits};
use tierview_common::content::ReviewFactor;
use tierview_common::sanitize::{escape_html, StoredText};
use tracing::{error, info, warn};

/// Images staged for one mutation plus the content tree that references them
struct StagedContent<T> {
    stage: AssetStage,
    tree: T,
    icon: String,
}

#[derive(Debug, Clone, Copy)]
enum EntityKind {
    Tier,
    Review,
}

/// Orchestrates validated, staged, transactional edits
pub struct EditCoordinator {
    db: SqlitePool,
    transcoder: Arc<ImageTranscoder>,
    codes: Arc<dyn CodeGenerator>,
    limits: Arc<Limits>,
}

impl EditCoordinator {
    pub fn new(
        db: SqlitePool,
        store: AssetStore,
        codes: Arc<dyn CodeGenerator>,
        limits: Limits,
    ) -> Self {
        let transcoder = Arc::new(ImageTranscoder::new(store, Arc::clone(&codes), &limits));
        Self {
            db,
            transcoder,
            codes,
            limits: Arc::new(limits),
        }
    }

    pub fn store(&self) -> &AssetStore {
        self.transcoder.store()
    }

    /// Replace a tier's content and schema, remapping every review's factors
    pub async fn edit_tier(&self, tier_id: &str, edit: TierEdit) -> Result<String, EditError> {
        validate_tier_edit(&edit, &self.limits)?;

        let current = tiers::get_tier(&self.db, tier_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("tier {}", tier_id)))?;

        let target = AssetTarget::new(&current.user_id, AssetCategory::Tier, tier_id);
        let new_paragraphs = edit.paragraphs.clone();
        let old_paragraphs = current.paragraphs.clone();
        let staged = self
            .stage(
                target,
                self.limits.tier.icon.clone(),
                edit.icon_change(),
                current.image_url.clone(),
                move |reconciler| reconciler.reconcile_paragraphs(&new_paragraphs, &old_paragraphs),
            )
            .await?;

        let plan = RemapPlan::new(&current.parameters, &edit.evaluation_parameters);
        let name = StoredText::new([current.name.as_str()]).escape(edit.name.trim());
        let updated = TierRecord {
            name,
            image_url: staged.icon,
            paragraphs: staged.tree,
            point_type: edit.point_type,
            parameters: plan.parameters().to_vec(),
            pulling_up: edit.pulling_up,
            pulling_down: edit.pulling_down,
            updated_at: Utc::now(),
            ..current
        };

        let created = staged.stage.created().len();
        match self.commit_tier_edit(&updated, &plan).await {
            Ok(review_count) => {
                let report = self.settle(staged.stage, true).await;
                info!(
                    tier_id,
                    reviews = review_count,
                    created,
                    orphaned = report.deleted.len(),
                    "Tier edited"
                );
                self.record(&updated.user_id, "update tier", tier_id).await;
                Ok(tier_id.to_string())
            }
            Err(e) => {
                warn!(tier_id, error = %e, "Tier edit rolled back");
                self.settle(staged.stage, false).await;
                Err(EditError::Transaction(e))
            }
        }
    }

    async fn commit_tier_edit(
        &self,
        tier: &TierRecord,
        plan: &RemapPlan,
    ) -> tierview_common::Result<usize> {
        let mut tx = self.db.begin().await?;

        let factors = reviews::load_factors_in_tier(&mut *tx, &tier.tier_id).await?;
        let remapped = plan.apply_all(&factors);
        for (review_id, review_factors) in &remapped {
            reviews::update_factors(&mut *tx, review_id, review_factors, tier.updated_at).await?;
        }
        tiers::update_tier(&mut *tx, tier).await?;

        tx.commit().await?;
        Ok(remapped.len())
    }

    /// Replace a review's content; the tier schema is untouched
    pub async fn edit_review(&self, review_id: &str, edit: ReviewEdit) -> Result<String, EditError> {
        let current = reviews::get_review(&self.db, review_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("review {}", review_id)))?;
        let tier = tiers::get_tier(&self.db, &current.tier_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("tier {}", current.tier_id)))?;

        validate_review_edit(&edit, &tier.parameters, tier.point_type, &self.limits)?;

        let target = AssetTarget::new(&current.user_id, AssetCategory::Review, review_id);
        let new_sections = edit.sections.clone();
        let old_sections = current.sections.clone();
        let staged = self
            .stage(
                target,
                self.limits.review.icon.clone(),
                edit.icon_change(),
                current.icon_url.clone(),
                move |reconciler| reconciler.reconcile_sections(&new_sections, &old_sections),
            )
            .await?;

        let title = StoredText::new([current.title.as_str()]).escape(&edit.title);
        let name = StoredText::new([current.name.as_str()]).escape(edit.name.trim());
        let factors = sanitize_factors(&edit.review_factors, &current.factors);
        let updated = ReviewRecord {
            title,
            name,
            icon_url: staged.icon,
            factors,
            sections: staged.tree,
            updated_at: Utc::now(),
            ..current
        };

        match self.commit_review_edit(&updated).await {
            Ok(()) => {
                let report = self.settle(staged.stage, true).await;
                info!(review_id, orphaned = report.deleted.len(), "Review edited");
                self.record(&updated.user_id, "update review", review_id).await;
                Ok(review_id.to_string())
            }
            Err(e) => {
                warn!(review_id, error = %e, "Review edit rolled back");
                self.settle(staged.stage, false).await;
                Err(e)
            }
        }
    }

    async fn commit_review_edit(&self, review: &ReviewRecord) -> Result<(), EditError> {
        let mut tx = self.db.begin().await.map_err(transaction_error)?;
        check_review_fits_tier(&mut *tx, review).await?;
        reviews::update_review(&mut *tx, review)
            .await
            .map_err(EditError::Transaction)?;
        tx.commit().await.map_err(transaction_error)
    }

    /// Insert a review, re-checking its tier's capacity inside the transaction
    async fn commit_review_insert(&self, review: &ReviewRecord) -> Result<(), EditError> {
        let mut tx = self.db.begin().await.map_err(transaction_error)?;
        check_review_fits_tier(&mut *tx, review).await?;
        let count = reviews::count_reviews_in_tier(&mut *tx, &review.tier_id)
            .await
            .map_err(EditError::Transaction)?;
        self.check_review_capacity(count)?;
        reviews::insert_review(&mut *tx, review)
            .await
            .map_err(EditError::Transaction)?;
        tx.commit().await.map_err(transaction_error)
    }

    fn check_review_capacity(&self, count: usize) -> Result<(), EditError> {
        let max = self.limits.review.reviews_per_tier_max;
        if count >= max {
            return Err(EditError::validation(
                "vrev-008",
                format!("a tier holds at most {} reviews", max),
            ));
        }
        Ok(())
    }

    /// Create a tier owned by `user_id`; every image in the payload must be new
    pub async fn create_tier(&self, user_id: &str, edit: TierEdit) -> Result<String, EditError> {
        validate_tier_edit(&edit, &self.limits)?;

        let tier_id = self.allocate_id(user_id, EntityKind::Tier).await?;
        let target = AssetTarget::new(user_id, AssetCategory::Tier, &tier_id);
        let new_paragraphs = edit.paragraphs.clone();
        let staged = self
            .stage(
                target,
                self.limits.tier.icon.clone(),
                edit.icon_change(),
                String::new(),
                move |reconciler| reconciler.reconcile_paragraphs(&new_paragraphs, &[]),
            )
            .await?;

        let now = Utc::now();
        let record = TierRecord {
            tier_id: tier_id.clone(),
            user_id: user_id.to_string(),
            name: escape_html(edit.name.trim()),
            image_url: staged.icon,
            paragraphs: staged.tree,
            point_type: edit.point_type,
            parameters: RemapPlan::new(&[], &edit.evaluation_parameters).into_parameters(),
            pulling_up: edit.pulling_up,
            pulling_down: edit.pulling_down,
            created_at: now,
            updated_at: now,
        };

        match tiers::insert_tier(&self.db, &record).await {
            Ok(()) => {
                self.settle(staged.stage, true).await;
                info!(tier_id = %tier_id, user_id, "Tier created");
                self.record(user_id, "create tier", &tier_id).await;
                Ok(tier_id)
            }
            Err(e) => {
                warn!(tier_id = %tier_id, error = %e, "Tier insert failed");
                self.settle(staged.stage, false).await;
                Err(EditError::Transaction(e))
            }
        }
    }

    /// Create a review in an existing tier
    pub async fn create_review(&self, user_id: &str, edit: ReviewEdit) -> Result<String, EditError> {
        let tier_id = edit
            .tier_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EditError::validation("vrev-009", "tierId is required"))?;
        let tier = tiers::get_tier(&self.db, &tier_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("tier {}", tier_id)))?;

        validate_review_edit(&edit, &tier.parameters, tier.point_type, &self.limits)?;

        let count = reviews::count_reviews_in_tier(&self.db, &tier_id).await?;
        self.check_review_capacity(count)?;

        let review_id = self
            .allocate_id(&format!("{}{}", user_id, tier_id), EntityKind::Review)
            .await?;
        let target = AssetTarget::new(user_id, AssetCategory::Review, &review_id);
        let new_sections = edit.sections.clone();
        let staged = self
            .stage(
                target,
                self.limits.review.icon.clone(),
                edit.icon_change(),
                String::new(),
                move |reconciler| reconciler.reconcile_sections(&new_sections, &[]),
            )
            .await?;

        let now = Utc::now();
        let record = ReviewRecord {
            review_id: review_id.clone(),
            user_id: user_id.to_string(),
            tier_id,
            title: escape_html(&edit.title),
            name: escape_html(edit.name.trim()),
            icon_url: staged.icon,
            factors: sanitize_factors(&edit.review_factors, &[]),
            sections: staged.tree,
            created_at: now,
            updated_at: now,
        };

        match self.commit_review_insert(&record).await {
            Ok(()) => {
                self.settle(staged.stage, true).await;
                info!(review_id = %review_id, tier_id = %record.tier_id, "Review created");
                self.record(user_id, "create review", &review_id).await;
                Ok(review_id)
            }
            Err(e) => {
                warn!(review_id = %review_id, error = %e, "Review insert failed");
                self.settle(staged.stage, false).await;
                Err(e)
            }
        }
    }

    /// Delete a tier with all its reviews, then their image directories
    pub async fn delete_tier(&self, tier_id: &str) -> Result<(), EditError> {
        let owner = tiers::get_tier_owner(&self.db, tier_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("tier {}", tier_id)))?;

        let review_owners = self
            .commit_tier_delete(tier_id)
            .await
            .map_err(EditError::Transaction)?;

        let mut targets = vec![AssetTarget::new(&owner, AssetCategory::Tier, tier_id)];
        targets.extend(
            review_owners
                .iter()
                .map(|(review_id, user_id)| AssetTarget::new(user_id, AssetCategory::Review, review_id)),
        );
        self.remove_dirs(targets).await;

        info!(tier_id, reviews = review_owners.len(), "Tier deleted");
        self.record(&owner, "delete tier", tier_id).await;
        Ok(())
    }

    async fn commit_tier_delete(
        &self,
        tier_id: &str,
    ) -> tierview_common::Result<Vec<(String, String)>> {
        let mut tx = self.db.begin().await?;
        let review_owners = reviews::list_review_owners(&mut *tx, tier_id).await?;
        reviews::delete_reviews_in_tier(&mut *tx, tier_id).await?;
        tiers::delete_tier(&mut *tx, tier_id).await?;
        tx.commit().await?;
        Ok(review_owners)
    }

    pub async fn delete_review(&self, review_id: &str) -> Result<(), EditError> {
        let review = reviews::get_review(&self.db, review_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("review {}", review_id)))?;

        reviews::delete_review(&self.db, review_id)
            .await
            .map_err(EditError::Transaction)?;

        self.remove_dirs(vec![AssetTarget::new(
            &review.user_id,
            AssetCategory::Review,
            review_id,
        )])
        .await;

        info!(review_id, tier_id = %review.tier_id, "Review deleted");
        self.record(&review.user_id, "delete review", review_id).await;
        Ok(())
    }

    /// Create the profile of a signed-in user
    pub async fn create_user(&self, user_id: &str, edit: UserEdit) -> Result<String, EditError> {
        validate_user_edit(&edit, &self.limits, "pusr")?;
        if users::get_user(&self.db, user_id).await?.is_some() {
            return Err(EditError::validation("pusr-004", "profile already exists"));
        }

        let staged = self
            .stage(
                user_icon_target(user_id),
                self.limits.user.icon.clone(),
                edit.icon_change(),
                String::new(),
                |_| Ok(Reconciliation::without_images(())),
            )
            .await?;

        let now = Utc::now();
        let record = UserRecord {
            user_id: user_id.to_string(),
            name: escape_html(edit.name.trim()),
            profile: escape_html(&edit.profile),
            icon_url: staged.icon,
            created_at: now,
            updated_at: now,
        };

        match users::insert_user(&self.db, &record).await {
            Ok(()) => {
                self.settle(staged.stage, true).await;
                info!(user_id, "User created");
                self.record(user_id, "create user", user_id).await;
                Ok(user_id.to_string())
            }
            Err(e) => {
                warn!(user_id, error = %e, "User insert failed");
                self.settle(staged.stage, false).await;
                Err(EditError::Transaction(e))
            }
        }
    }

    /// Replace a user's name, profile text and icon
    pub async fn edit_user(&self, user_id: &str, edit: UserEdit) -> Result<String, EditError> {
        validate_user_edit(&edit, &self.limits, "uusr")?;
        let current = users::get_user(&self.db, user_id)
            .await?
            .ok_or_else(|| EditError::NotFound(format!("user {}", user_id)))?;

        let staged = self
            .stage(
                user_icon_target(user_id),
                self.limits.user.icon.clone(),
                edit.icon_change(),
                current.icon_url.clone(),
                |_| Ok(Reconciliation::without_images(())),
            )
            .await?;

        let name = StoredText::new([current.name.as_str()]).escape(edit.name.trim());
        let profile = StoredText::new([current.profile.as_str()]).escape(&edit.profile);
        let updated = UserRecord {
            name,
            profile,
            icon_url: staged.icon,
            updated_at: Utc::now(),
            ..current
        };

        match users::update_user(&self.db, &updated).await {
            Ok(()) => {
                let report = self.settle(staged.stage, true).await;
                info!(user_id, orphaned = report.deleted.len(), "User edited");
                self.record(user_id, "update user", user_id).await;
                Ok(user_id.to_string())
            }
            Err(e) => {
                warn!(user_id, error = %e, "User edit rolled back");
                self.settle(staged.stage, false).await;
                Err(EditError::Transaction(e))
            }
        }
    }

    /// Write a mutation's new images on a blocking thread
    async fn stage<T, F>(
        &self,
        target: AssetTarget,
        icon_profile: ImageProfile,
        icon: IconChange,
        current_icon: String,
        reconcile: F,
    ) -> Result<StagedContent<T>, EditError>
    where
        T: Send + 'static,
        F: FnOnce(&AssetReconciler<'_>) -> Result<Reconciliation<T>, EditError> + Send + 'static,
    {
        let transcoder = Arc::clone(&self.transcoder);
        let limits = Arc::clone(&self.limits);
        tokio::task::spawn_blocking(move || {
            let mut stage = AssetStage::new(transcoder.store().clone());
            let reconciler = AssetReconciler::new(&transcoder, &target, &limits.section.image);
            let tree = stage.absorb(reconcile(&reconciler)?);

            let icon = match icon {
                IconChange::Keep => current_icon,
                IconChange::Remove => {
                    stage.retire(&current_icon);
                    String::new()
                }
                IconChange::Replace(payload) => {
                    match transcoder.transcode(&target, &icon_profile, &payload) {
                        Ok(reference) => {
                            stage.record_created(reference.clone());
                            stage.retire(&current_icon);
                            reference
                        }
                        Err(e) => {
                            stage.compensate();
                            return Err(e);
                        }
                    }
                }
            };

            Ok(StagedContent { stage, tree, icon })
        })
        .await
        .map_err(|e| EditError::Internal(format!("Image staging task failed: {}", e)))?
    }

    /// Finalize after a commit, compensate otherwise
    async fn settle(&self, stage: AssetStage, committed: bool) -> CleanupReport {
        let task = tokio::task::spawn_blocking(move || {
            if committed {
                stage.finalize()
            } else {
                stage.compensate()
            }
        });
        match task.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, committed, "Image cleanup task failed");
                CleanupReport::default()
            }
        }
    }

    async fn remove_dirs(&self, targets: Vec<AssetTarget>) {
        let store = self.store().clone();
        let task = tokio::task::spawn_blocking(move || {
            for target in &targets {
                if let Err(e) = store.remove_entity_dir(target) {
                    warn!(
                        dir = %target.dir_reference(),
                        error = %e,
                        "Failed to remove asset directory"
                    );
                }
            }
        });
        if let Err(e) = task.await {
            error!(error = %e, "Asset directory cleanup task failed");
        }
    }

    /// Unused random id for a new entity
    async fn allocate_id(&self, seed: &str, kind: EntityKind) -> Result<String, EditError> {
        for attempt in 0..self.limits.retry_count {
            let id = self
                .codes
                .generate(&format!("{}_{}", seed, attempt), self.limits.code_len);
            let taken = match kind {
                EntityKind::Tier => tiers::tier_exists(&self.db, &id).await?,
                EntityKind::Review => reviews::review_exists(&self.db, &id).await?,
            };
            if !taken {
                return Ok(id);
            }
        }
        Err(EditError::RetryExhausted {
            attempts: self.limits.retry_count,
        })
    }

    async fn record(&self, user_id: &str, operation: &str, content: &str) {
        if let Err(e) = operation_log::write_operation_log(&self.db, user_id, operation, content).await {
            warn!(user_id, operation, error = %e, "Failed to write operation log");
        }
    }
}

/// User icons live in a fixed `user` entity directory under the owner
fn user_icon_target(user_id: &str) -> AssetTarget {
    AssetTarget::new(user_id, AssetCategory::User, "user")
}

fn transaction_error(e: sqlx::Error) -> EditError {
    EditError::Transaction(e.into())
}

/// Re-read the review's tier inside the writing transaction
///
/// A schema edit committed after validation may have changed the parameter
/// count; the review must still hold one factor per parameter when it lands.
async fn check_review_fits_tier(
    conn: &mut SqliteConnection,
    review: &ReviewRecord,
) -> Result<(), EditError> {
    let tier = tiers::get_tier(&mut *conn, &review.tier_id)
        .await
        .map_err(EditError::Transaction)?
        .ok_or_else(|| EditError::NotFound(format!("tier {}", review.tier_id)))?;
    check_factor_count(review.factors.len(), tier.parameters.len())
}

fn sanitize_factors(factors: &[ReviewFactor], stored: &[ReviewFactor]) -> Vec<ReviewFactor> {
    let stored = StoredText::new(stored.iter().map(|f| f.info.as_str()));
    factors
        .iter()
        .map(|f| ReviewFactor::new(stored.escape(&f.info), f.point))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tierview_common::codes::HashedRandomCodes;
    use tierview_common::content::{EvaluationParameterEdit, PointType};
    use tierview_common::db::init_database;

    async fn coordinator(dir: &TempDir, limits: Limits) -> (SqlitePool, EditCoordinator) {
        let pool = init_database(&dir.path().join("edit.db")).await.unwrap();
        let coordinator = EditCoordinator::new(
            pool.clone(),
            AssetStore::new(dir.path().join("files")),
            Arc::new(HashedRandomCodes),
            limits,
        );
        (pool, coordinator)
    }

    fn tier_edit(params: &[&str]) -> TierEdit {
        TierEdit {
            name: "Bakeries".to_string(),
            paragraphs: vec![],
            point_type: PointType::Score,
            evaluation_parameters: params
                .iter()
                .map(|name| EvaluationParameterEdit {
                    id: None,
                    name: name.to_string(),
                    is_point: true,
                    weight: 1,
                    old_index: None,
                })
                .collect(),
            pulling_up: 0,
            pulling_down: 0,
            image_is_changed: false,
            image_base64: String::new(),
        }
    }

    fn review_edit(tier_id: &str, points: &[f64]) -> ReviewEdit {
        ReviewEdit {
            tier_id: Some(tier_id.to_string()),
            title: String::new(),
            name: "Crumb".to_string(),
            icon_is_changed: false,
            icon_base64: String::new(),
            review_factors: points.iter().map(|&p| ReviewFactor::new("", p)).collect(),
            sections: vec![],
        }
    }

    /// Commit a schema change behind the coordinator's back
    async fn shrink_schema(pool: &SqlitePool, tier_id: &str, len: usize) {
        let mut tier = tiers::get_tier(pool, tier_id).await.unwrap().unwrap();
        tier.parameters.truncate(len);
        tiers::update_tier(pool, &tier).await.unwrap();
    }

    #[tokio::test]
    async fn test_review_update_rechecks_schema_in_transaction() {
        let dir = TempDir::new().unwrap();
        let (pool, coordinator) = coordinator(&dir, Limits::default()).await;
        let tier_id = coordinator.create_tier("u1", tier_edit(&["A", "B", "C"])).await.unwrap();
        let review_id = coordinator
            .create_review("u1", review_edit(&tier_id, &[1.0, 2.0, 3.0]))
            .await
            .unwrap();

        // Validated against three parameters, committed against two
        let before = reviews::get_review(&pool, &review_id).await.unwrap().unwrap();
        shrink_schema(&pool, &tier_id, 2).await;
        let mut stale = before.clone();
        stale.name = "Renamed".to_string();

        let err = coordinator.commit_review_edit(&stale).await.unwrap_err();
        assert_eq!(err.code(), "vrev-003");
        assert_eq!(reviews::get_review(&pool, &review_id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_review_insert_rechecks_schema_and_capacity() {
        let dir = TempDir::new().unwrap();
        let mut limits = Limits::default();
        limits.review.reviews_per_tier_max = 1;
        let (pool, coordinator) = coordinator(&dir, limits).await;
        let tier_id = coordinator.create_tier("u1", tier_edit(&["A", "B"])).await.unwrap();
        let first = coordinator
            .create_review("u1", review_edit(&tier_id, &[1.0, 2.0]))
            .await
            .unwrap();

        let mut record = reviews::get_review(&pool, &first).await.unwrap().unwrap();
        record.review_id = "second".to_string();
        let err = coordinator.commit_review_insert(&record).await.unwrap_err();
        assert_eq!(err.code(), "vrev-008");

        shrink_schema(&pool, &tier_id, 1).await;
        let err = coordinator.commit_review_insert(&record).await.unwrap_err();
        assert_eq!(err.code(), "vrev-003");
        assert_eq!(reviews::count_reviews_in_tier(&pool, &tier_id).await.unwrap(), 1);
    }
}
