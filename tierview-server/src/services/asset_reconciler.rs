//! Diff of an entity's paragraph images between two versions
//!
//! [`plan`] is pure: it decides which old references survive, how many
//! uploads are needed and which old references become orphans, and rejects
//! dangling references before anything is written. [`AssetReconciler`] then
//! materializes the new tree, transcoding the uploads.

use crate::error::EditError;
use crate::services::asset_store::AssetTarget;
use crate::services::image_transcoder::ImageTranscoder;
use std::collections::BTreeSet;
use tierview_common::config::ImageProfile;
use tierview_common::content::{
    paragraph_image_refs, section_image_refs, Paragraph, ParagraphEdit, ParagraphKind, Section,
    SectionEdit,
};
use tierview_common::sanitize::StoredText;
use tracing::debug;

/// Outcome of the pure diff step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPlan {
    /// Old references re-submitted unchanged
    pub kept: BTreeSet<String>,
    /// Image paragraphs carrying a new payload
    pub uploads: usize,
    /// Old references no longer used
    pub orphaned: BTreeSet<String>,
}

/// Result of a successful reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// Tree ready to persist
    pub tree: T,
    pub kept: BTreeSet<String>,
    /// Files written by this reconcile, in tree order
    pub created: Vec<String>,
    pub orphaned: BTreeSet<String>,
}

impl<T> Reconciliation<T> {
    /// Content that carries no paragraph images
    pub fn without_images(tree: T) -> Self {
        Self {
            tree,
            kept: BTreeSet::new(),
            created: Vec::new(),
            orphaned: BTreeSet::new(),
        }
    }
}

/// Compare new paragraph edits against the references stored before the edit
pub fn plan<'a, 'b>(
    new: impl IntoIterator<Item = &'a ParagraphEdit>,
    old_refs: impl IntoIterator<Item = &'b str>,
) -> Result<AssetPlan, EditError> {
    let old: BTreeSet<&str> = old_refs.into_iter().collect();
    let mut kept = BTreeSet::new();
    let mut uploads = 0;

    for paragraph in new {
        if paragraph.kind != ParagraphKind::ImageLink {
            continue;
        }
        if paragraph.is_changed {
            uploads += 1;
            continue;
        }
        if !old.contains(paragraph.body.as_str()) {
            return Err(EditError::DanglingReference(paragraph.body.clone()));
        }
        kept.insert(paragraph.body.clone());
    }

    let orphaned = old
        .into_iter()
        .filter(|reference| !kept.contains(*reference))
        .map(str::to_string)
        .collect();

    Ok(AssetPlan {
        kept,
        uploads,
        orphaned,
    })
}

/// Materializes paragraph trees for one entity
pub struct AssetReconciler<'a> {
    transcoder: &'a ImageTranscoder,
    target: &'a AssetTarget,
    profile: &'a ImageProfile,
}

impl<'a> AssetReconciler<'a> {
    pub fn new(
        transcoder: &'a ImageTranscoder,
        target: &'a AssetTarget,
        profile: &'a ImageProfile,
    ) -> Self {
        Self {
            transcoder,
            target,
            profile,
        }
    }

    /// Reconcile a flat paragraph list (tier descriptions)
    pub fn reconcile_paragraphs(
        &self,
        new: &[ParagraphEdit],
        old: &[Paragraph],
    ) -> Result<Reconciliation<Vec<Paragraph>>, EditError> {
        let plan = plan(new, paragraph_image_refs(old))?;
        let texts = stored_texts(old);
        let mut created = Vec::with_capacity(plan.uploads);
        let tree = self.materialize(new, &texts, &mut created);
        self.finish(plan, tree, created)
    }

    /// Reconcile a section tree (review bodies)
    pub fn reconcile_sections(
        &self,
        new: &[SectionEdit],
        old: &[Section],
    ) -> Result<Reconciliation<Vec<Section>>, EditError> {
        let plan = plan(
            new.iter().flat_map(|s| s.paragraphs.iter()),
            section_image_refs(old),
        )?;
        let titles = StoredText::new(old.iter().map(|s| s.title.as_str()));
        let texts = stored_texts(old.iter().flat_map(|s| s.paragraphs.iter()));
        let mut created = Vec::with_capacity(plan.uploads);
        let tree = new
            .iter()
            .map(|section| {
                Ok(Section {
                    title: titles.escape(&section.title),
                    paragraphs: self.materialize(&section.paragraphs, &texts, &mut created)?,
                })
            })
            .collect::<Result<Vec<_>, EditError>>();
        self.finish(plan, tree, created)
    }

    fn materialize(
        &self,
        edits: &[ParagraphEdit],
        texts: &StoredText<'_>,
        created: &mut Vec<String>,
    ) -> Result<Vec<Paragraph>, EditError> {
        edits
            .iter()
            .map(|edit| {
                let body = match edit.kind {
                    ParagraphKind::Text => texts.escape(&edit.body),
                    ParagraphKind::ServiceLink => edit.body.trim().to_string(),
                    ParagraphKind::ImageLink if edit.is_changed => {
                        let reference =
                            self.transcoder.transcode(self.target, self.profile, &edit.body)?;
                        created.push(reference.clone());
                        reference
                    }
                    ParagraphKind::ImageLink => edit.body.clone(),
                };
                Ok(Paragraph::new(edit.kind, body))
            })
            .collect()
    }

    fn finish<T>(
        &self,
        plan: AssetPlan,
        tree: Result<T, EditError>,
        created: Vec<String>,
    ) -> Result<Reconciliation<T>, EditError> {
        match tree {
            Ok(tree) => {
                debug!(
                    target_dir = %self.target.dir_reference(),
                    kept = plan.kept.len(),
                    created = created.len(),
                    orphaned = plan.orphaned.len(),
                    "Reconciled paragraph images"
                );
                Ok(Reconciliation {
                    tree,
                    kept: plan.kept,
                    created,
                    orphaned: plan.orphaned,
                })
            }
            Err(e) => {
                self.transcoder
                    .store()
                    .delete_all(created.iter().map(String::as_str));
                Err(e)
            }
        }
    }
}

/// Text bodies as stored before the edit
fn stored_texts<'a>(old: impl IntoIterator<Item = &'a Paragraph>) -> StoredText<'a> {
    StoredText::new(
        old.into_iter()
            .filter(|p| p.kind == ParagraphKind::Text)
            .map(|p| p.body.as_str()),
    )
}
