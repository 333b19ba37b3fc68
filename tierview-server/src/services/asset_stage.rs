//! Files staged around one edit transaction
//!
//! New files are written before the database commit; superseded files are
//! deleted only after it. A stage ends in exactly one of [`AssetStage::finalize`]
//! (commit succeeded) or [`AssetStage::compensate`] (anything failed).

use crate::services::asset_reconciler::Reconciliation;
use crate::services::asset_store::{AssetStore, CleanupReport};
use std::collections::BTreeSet;
use tracing::{error, info, warn};

pub struct AssetStage {
    store: AssetStore,
    created: Vec<String>,
    retired: BTreeSet<String>,
}

impl AssetStage {
    pub fn new(store: AssetStore) -> Self {
        Self {
            store,
            created: Vec::new(),
            retired: BTreeSet::new(),
        }
    }

    /// Take over a reconcile's created and orphaned files, returning its tree
    pub fn absorb<T>(&mut self, reconciliation: Reconciliation<T>) -> T {
        self.created.extend(reconciliation.created);
        self.retired.extend(reconciliation.orphaned);
        reconciliation.tree
    }

    pub fn record_created(&mut self, reference: String) {
        self.created.push(reference);
    }

    /// Mark a stored file for deletion once the commit succeeds
    pub fn retire(&mut self, reference: &str) {
        if !reference.is_empty() {
            self.retired.insert(reference.to_string());
        }
    }

    pub fn created(&self) -> &[String] {
        &self.created
    }

    pub fn retired(&self) -> &BTreeSet<String> {
        &self.retired
    }

    /// Commit failed: remove what this request wrote, keep everything else
    pub fn compensate(self) -> CleanupReport {
        let report = self
            .store
            .delete_all(self.created.iter().map(String::as_str));
        if report.is_clean() {
            info!(removed = report.deleted.len(), "Compensated staged images");
        } else {
            error!(
                failures = report.failures.len(),
                "Could not remove every image written by a failed edit"
            );
        }
        report
    }

    /// Commit succeeded: remove superseded files
    pub fn finalize(self) -> CleanupReport {
        let report = self
            .store
            .delete_all(self.retired.iter().map(String::as_str));
        for failure in &report.failures {
            warn!(
                reference = %failure.reference,
                error = %failure.error,
                "Orphaned image left on disk"
            );
        }
        report
    }
}
