//! Experiment submission payloads.

use std::collections::BTreeMap;

use evalorch_state::Session;
use serde::{Deserialize, Serialize};

use super::evaluator::{
    EvaluatorFieldMapping, EvaluatorIdentifier, EvaluatorVersionId, EvaluatorVersionItem,
    RunConfig,
};

/// A request to create and immediately run an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitExperimentRequest {
    pub workspace_id: i64,
    pub name: String,
    pub eval_set_id: i64,
    pub eval_set_version_id: i64,
    pub target_id: i64,
    pub target_version_id: i64,
    /// Version ids given directly by the caller. Must not contain duplicates.
    #[serde(default)]
    pub evaluator_version_ids: Vec<EvaluatorVersionId>,
    /// Evaluators named by `(id, version)`, resolved at submission.
    #[serde(default)]
    pub evaluators: Vec<EvaluatorVersionItem>,
    /// Explicit weights; these win over weights carried by `evaluators`.
    #[serde(default)]
    pub score_weights: BTreeMap<EvaluatorVersionId, f64>,
    #[serde(default)]
    pub field_mappings: Vec<EvaluatorFieldMapping>,
    pub session: Session,
}

/// Fully resolved parameters handed to the experiment manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateExperimentParam {
    pub workspace_id: i64,
    pub name: String,
    pub eval_set_id: i64,
    pub eval_set_version_id: i64,
    pub target_id: i64,
    pub target_version_id: i64,
    pub evaluator_version_ids: Vec<EvaluatorVersionId>,
    pub run_configs: BTreeMap<EvaluatorVersionId, RunConfig>,
    pub score_weights: BTreeMap<EvaluatorVersionId, f64>,
    pub field_mappings: Vec<EvaluatorFieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub evaluator_version_ids: Vec<EvaluatorVersionId>,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub experiment: Experiment,
    pub run_id: i64,
    /// Evaluator identifiers that could not be resolved and were left out.
    pub skipped: Vec<EvaluatorIdentifier>,
}
