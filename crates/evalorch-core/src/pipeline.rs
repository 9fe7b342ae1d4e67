//! Experiment submission: resolve evaluators, create the experiment, run it.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::collaborators::{EvaluatorLookupService, ExperimentManager};
use crate::domain::{
    CreateExperimentParam, EvalOrchError, EvaluatorVersionId, Result, SubmissionOutcome,
    SubmitExperimentRequest,
};
use crate::obs;
use crate::resolver::{EvaluatorVersionResolver, ResolveRequest};

pub struct ExperimentSubmissionPipeline {
    resolver: EvaluatorVersionResolver,
    manager: Arc<dyn ExperimentManager>,
}

impl ExperimentSubmissionPipeline {
    pub fn new(
        lookup: Arc<dyn EvaluatorLookupService>,
        manager: Arc<dyn ExperimentManager>,
    ) -> Self {
        Self {
            resolver: EvaluatorVersionResolver::new(lookup),
            manager,
        }
    }

    /// Validate, resolve, create and run an experiment.
    ///
    /// Input problems are rejected before any collaborator is called. An
    /// experiment whose evaluators all fail to resolve is rejected after
    /// resolution and is never created.
    #[instrument(skip(self, request), fields(workspace_id = request.workspace_id, name = %request.name))]
    pub async fn submit(&self, request: SubmitExperimentRequest) -> Result<SubmissionOutcome> {
        validate(&request)?;

        let SubmitExperimentRequest {
            workspace_id,
            name,
            eval_set_id,
            eval_set_version_id,
            target_id,
            target_version_id,
            evaluator_version_ids,
            evaluators,
            score_weights,
            field_mappings,
            session,
        } = request;

        let resolved = self
            .resolver
            .resolve(ResolveRequest {
                explicit_version_ids: evaluator_version_ids,
                items: evaluators,
                explicit_weights: score_weights,
                field_mappings,
            })
            .await?;

        obs::emit_submission_resolved(
            workspace_id,
            resolved.version_ids.len(),
            resolved.skipped.len(),
        );

        if resolved.version_ids.is_empty() {
            return Err(EvalOrchError::InvalidInput(format!(
                "no evaluator version resolved ({} identifiers skipped)",
                resolved.skipped.len()
            )));
        }

        let param = CreateExperimentParam {
            workspace_id,
            name,
            eval_set_id,
            eval_set_version_id,
            target_id,
            target_version_id,
            evaluator_version_ids: resolved.version_ids,
            run_configs: resolved.run_configs,
            score_weights: resolved.score_weights,
            field_mappings: resolved.field_mappings,
        };

        let experiment = self
            .manager
            .create_experiment(&param, &session)
            .await
            .map_err(|e| EvalOrchError::downstream("experiment_manager", e))?;

        let run_id = self
            .manager
            .run_experiment(workspace_id, experiment.id, &session)
            .await
            .map_err(|e| EvalOrchError::downstream("experiment_manager", e))?;

        info!(experiment_id = experiment.id, run_id, "experiment submitted");

        Ok(SubmissionOutcome {
            experiment,
            run_id,
            skipped: resolved.skipped,
        })
    }
}

fn validate(request: &SubmitExperimentRequest) -> Result<()> {
    if request.workspace_id <= 0 {
        return Err(EvalOrchError::InvalidInput(
            "workspace_id must be positive".to_string(),
        ));
    }
    if let Some(dup) = first_duplicate(&request.evaluator_version_ids) {
        return Err(EvalOrchError::InvalidInput(format!(
            "duplicate evaluator version id {dup}"
        )));
    }
    Ok(())
}

fn first_duplicate(ids: &[EvaluatorVersionId]) -> Option<EvaluatorVersionId> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().find(|id| !seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_duplicate() {
        assert_eq!(first_duplicate(&[1, 2, 3]), None);
        assert_eq!(first_duplicate(&[4, 5, 4, 5]), Some(4));
    }
}
