//! Review factor realignment after a tier schema change
//!
//! Each new evaluation parameter slot resolves to at most one source slot in
//! the old schema: a matching stable id first, then the client's `oldIndex`
//! hint. Every review's factor array is then rebuilt positionally from those
//! sources, zero-filling slots without one.

use std::collections::BTreeMap;
use tierview_common::content::{EvaluationParameter, EvaluationParameterEdit, ReviewFactor};
use uuid::Uuid;

/// Resolved schema change
#[derive(Debug, Clone, PartialEq)]
pub struct RemapPlan {
    sources: Vec<Option<usize>>,
    parameters: Vec<EvaluationParameter>,
}

impl RemapPlan {
    /// Resolve with random UUIDs for fresh parameter ids
    pub fn new(old: &[EvaluationParameter], new: &[EvaluationParameterEdit]) -> Self {
        Self::resolve(old, new, || Uuid::new_v4().to_string())
    }

    pub fn resolve(
        old: &[EvaluationParameter],
        new: &[EvaluationParameterEdit],
        mut fresh_id: impl FnMut() -> String,
    ) -> Self {
        let mut claimed = vec![false; old.len()];
        let mut sources = Vec::with_capacity(new.len());
        let mut parameters = Vec::with_capacity(new.len());

        for edit in new {
            let by_id = edit
                .id
                .as_deref()
                .filter(|id| !id.is_empty())
                .and_then(|id| old.iter().position(|p| p.id == id));
            let source = by_id.or_else(|| {
                edit.old_index
                    .filter(|&i| i >= 0)
                    .and_then(|i| usize::try_from(i).ok())
            });

            // Only the first claimant of an old slot keeps its id
            let inherited = match source {
                Some(i) if i < old.len() && !claimed[i] => {
                    claimed[i] = true;
                    Some(old[i].id.clone()).filter(|id| !id.is_empty())
                }
                _ => None,
            };

            sources.push(source);
            parameters.push(EvaluationParameter {
                id: inherited.unwrap_or_else(&mut fresh_id),
                name: edit.name.clone(),
                is_point: edit.is_point,
                weight: edit.weight,
            });
        }

        Self {
            sources,
            parameters,
        }
    }

    /// Old slot feeding each new slot
    pub fn sources(&self) -> &[Option<usize>] {
        &self.sources
    }

    /// New schema with ids assigned
    pub fn parameters(&self) -> &[EvaluationParameter] {
        &self.parameters
    }

    pub fn into_parameters(self) -> Vec<EvaluationParameter> {
        self.parameters
    }

    /// Realign one review's factors; the result always has one entry per new slot
    pub fn apply(&self, factors: &[ReviewFactor]) -> Vec<ReviewFactor> {
        self.sources
            .iter()
            .map(|source| {
                source
                    .and_then(|i| factors.get(i))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn apply_all<K: Ord + Clone>(
        &self,
        factors_by_review: &BTreeMap<K, Vec<ReviewFactor>>,
    ) -> BTreeMap<K, Vec<ReviewFactor>> {
        factors_by_review
            .iter()
            .map(|(review, factors)| (review.clone(), self.apply(factors)))
            .collect()
    }
}

/// One-shot remap of every review's factors
pub fn remap<K: Ord + Clone>(
    old: &[EvaluationParameter],
    new: &[EvaluationParameterEdit],
    factors_by_review: &BTreeMap<K, Vec<ReviewFactor>>,
) -> BTreeMap<K, Vec<ReviewFactor>> {
    RemapPlan::new(old, new).apply_all(factors_by_review)
}
