//! Evaluator version resolution for experiment submission.
//!
//! Turns the evaluators named in a submission into concrete version ids.
//! Identifiers are split into builtin-visible and pinned groups, each group
//! is resolved with one batch lookup, and the output is rebuilt by walking
//! the submission in order. Identifiers that cannot be resolved are skipped
//! and reported in [`ResolvedEvaluators::skipped`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::collaborators::EvaluatorLookupService;
use crate::domain::{
    EvalOrchError, EvaluatorFieldMapping, EvaluatorId, EvaluatorIdentifier, EvaluatorVersionId,
    EvaluatorVersionItem, Result, RunConfig, VersionSelector,
};

/// Inputs to one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub explicit_version_ids: Vec<EvaluatorVersionId>,
    pub items: Vec<EvaluatorVersionItem>,
    pub explicit_weights: BTreeMap<EvaluatorVersionId, f64>,
    /// Mappings with `evaluator_version_id == 0` are filled in from the
    /// versions the items resolved to. A mapping never adds an evaluator.
    pub field_mappings: Vec<EvaluatorFieldMapping>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedEvaluators {
    /// Explicit ids followed by resolved ids, first occurrence kept.
    pub version_ids: Vec<EvaluatorVersionId>,
    pub run_configs: BTreeMap<EvaluatorVersionId, RunConfig>,
    pub score_weights: BTreeMap<EvaluatorVersionId, f64>,
    pub field_mappings: Vec<EvaluatorFieldMapping>,
    /// Item identifiers that did not resolve, in submission order.
    pub skipped: Vec<EvaluatorIdentifier>,
}

/// Lookup results keyed the way identifiers ask for them.
#[derive(Debug, Default)]
struct VersionTables {
    builtin: BTreeMap<EvaluatorId, EvaluatorVersionId>,
    pinned: BTreeMap<(EvaluatorId, String), EvaluatorVersionId>,
}

impl VersionTables {
    fn get(&self, identifier: &EvaluatorIdentifier) -> Option<EvaluatorVersionId> {
        if !identifier.is_resolvable() {
            return None;
        }
        let found = match &identifier.version {
            VersionSelector::BuiltinVisible => self.builtin.get(&identifier.evaluator_id),
            VersionSelector::Pinned(v) => self.pinned.get(&(identifier.evaluator_id, v.clone())),
        };
        found.copied().filter(|id| *id > 0)
    }
}

pub struct EvaluatorVersionResolver {
    lookup: Arc<dyn EvaluatorLookupService>,
}

impl EvaluatorVersionResolver {
    pub fn new(lookup: Arc<dyn EvaluatorLookupService>) -> Self {
        Self { lookup }
    }

    /// Resolve `request` into concrete version ids, run configs and weights.
    ///
    /// At most two lookups are made regardless of how many identifiers are
    /// named. A failing lookup fails the whole call; an identifier that the
    /// lookups do not know is skipped.
    #[instrument(skip_all, fields(explicit = request.explicit_version_ids.len(), items = request.items.len()))]
    pub async fn resolve(&self, request: ResolveRequest) -> Result<ResolvedEvaluators> {
        let ResolveRequest {
            explicit_version_ids,
            items,
            explicit_weights,
            mut field_mappings,
        } = request;

        let tables = self.fetch_tables(items.iter().map(|i| &i.identifier)).await?;

        let mut version_ids = explicit_version_ids;
        let mut run_configs = BTreeMap::new();
        let mut score_weights: BTreeMap<EvaluatorVersionId, f64> = explicit_weights
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .collect();
        let mut skipped = Vec::new();

        for item in items {
            let Some(version_id) = tables.get(&item.identifier) else {
                debug!(identifier = %item.identifier, "evaluator identifier did not resolve");
                skipped.push(item.identifier);
                continue;
            };

            version_ids.push(version_id);
            if let Some(run_config) = item.run_config {
                run_configs.entry(version_id).or_insert(run_config);
            }
            if let Some(weight) = item.score_weight.filter(|w| *w > 0.0) {
                score_weights.entry(version_id).or_insert(weight);
            }
        }

        for mapping in field_mappings
            .iter_mut()
            .filter(|m| m.evaluator_version_id == 0)
        {
            if let Some(version_id) = mapping.evaluator.as_ref().and_then(|id| tables.get(id)) {
                mapping.evaluator_version_id = version_id;
            }
        }

        if !skipped.is_empty() {
            warn!(
                skipped = skipped.len(),
                "some evaluator identifiers did not resolve and were left out"
            );
        }

        Ok(ResolvedEvaluators {
            version_ids: dedup_preserving_order(version_ids),
            run_configs,
            score_weights,
            field_mappings,
            skipped,
        })
    }

    async fn fetch_tables<'a, I>(&self, identifiers: I) -> Result<VersionTables>
    where
        I: Iterator<Item = &'a EvaluatorIdentifier>,
    {
        let mut builtin_ids = BTreeSet::new();
        let mut pinned_pairs = BTreeSet::new();
        for identifier in identifiers.filter(|i| i.is_resolvable()) {
            match &identifier.version {
                VersionSelector::BuiltinVisible => {
                    builtin_ids.insert(identifier.evaluator_id);
                }
                VersionSelector::Pinned(v) => {
                    pinned_pairs.insert((identifier.evaluator_id, v.clone()));
                }
            }
        }

        let mut tables = VersionTables::default();

        if !builtin_ids.is_empty() {
            let ids: Vec<EvaluatorId> = builtin_ids.into_iter().collect();
            let found = self
                .lookup
                .batch_get_builtin(&ids)
                .await
                .map_err(|e| EvalOrchError::downstream("evaluator_lookup", e))?;
            for evaluator in found {
                tables
                    .builtin
                    .insert(evaluator.evaluator_id, evaluator.version_id);
            }
        }

        if !pinned_pairs.is_empty() {
            let pairs: Vec<(EvaluatorId, String)> = pinned_pairs.into_iter().collect();
            let found = self
                .lookup
                .batch_get_by_id_and_version(&pairs)
                .await
                .map_err(|e| EvalOrchError::downstream("evaluator_lookup", e))?;
            for evaluator in found {
                tables
                    .pinned
                    .insert((evaluator.evaluator_id, evaluator.version), evaluator.version_id);
            }
        }

        Ok(tables)
    }
}

/// Remove duplicates, keeping the first occurrence of each id.
pub fn dedup_preserving_order(ids: Vec<EvaluatorVersionId>) -> Vec<EvaluatorVersionId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        assert_eq!(dedup_preserving_order(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedup_preserving_order(vec![]).is_empty());
    }

    #[test]
    fn test_tables_ignore_zero_version_ids() {
        let mut tables = VersionTables::default();
        tables.builtin.insert(1, 0);
        tables.pinned.insert((2, "1.0".to_string()), 20);

        assert_eq!(tables.get(&EvaluatorIdentifier::builtin_visible(1)), None);
        assert_eq!(tables.get(&EvaluatorIdentifier::pinned(2, "1.0")), Some(20));
        assert_eq!(tables.get(&EvaluatorIdentifier::pinned(2, "2.0")), None);
        assert_eq!(tables.get(&EvaluatorIdentifier::pinned(0, "1.0")), None);
    }
}
