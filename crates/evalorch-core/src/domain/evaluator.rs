//! Evaluator identity, version selection, and debug-run payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::run::{RunError, TokenUsage};

/// Parent evaluator id.
pub type EvaluatorId = i64;

/// Id of one immutable evaluator version.
pub type EvaluatorVersionId = i64;

/// Wire string of the builtin-visible selector.
pub const BUILTIN_VISIBLE: &str = "BuiltinVisible";

/// Which version of an evaluator to use.
///
/// Serialized as a plain string: [`BUILTIN_VISIBLE`] or the pinned version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VersionSelector {
    /// Whatever version is currently published as visible for a builtin
    /// evaluator.
    BuiltinVisible,
    /// A concrete version string such as `"0.0.3"`.
    Pinned(String),
}

impl VersionSelector {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw == BUILTIN_VISIBLE {
            VersionSelector::BuiltinVisible
        } else {
            VersionSelector::Pinned(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            VersionSelector::BuiltinVisible => BUILTIN_VISIBLE,
            VersionSelector::Pinned(v) => v,
        }
    }

    /// An empty pinned version cannot be resolved.
    pub fn is_empty(&self) -> bool {
        matches!(self, VersionSelector::Pinned(v) if v.trim().is_empty())
    }
}

impl From<String> for VersionSelector {
    fn from(raw: String) -> Self {
        VersionSelector::parse(raw)
    }
}

impl From<VersionSelector> for String {
    fn from(selector: VersionSelector) -> Self {
        match selector {
            VersionSelector::BuiltinVisible => BUILTIN_VISIBLE.to_string(),
            VersionSelector::Pinned(v) => v,
        }
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(evaluator id, version selector)` as supplied by a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluatorIdentifier {
    pub evaluator_id: EvaluatorId,
    pub version: VersionSelector,
}

impl EvaluatorIdentifier {
    pub fn pinned(evaluator_id: EvaluatorId, version: impl Into<String>) -> Self {
        Self {
            evaluator_id,
            version: VersionSelector::parse(version),
        }
    }

    pub fn builtin_visible(evaluator_id: EvaluatorId) -> Self {
        Self {
            evaluator_id,
            version: VersionSelector::BuiltinVisible,
        }
    }

    /// Zero ids and empty versions are skipped before any lookup.
    pub fn is_resolvable(&self) -> bool {
        self.evaluator_id > 0 && !self.version.is_empty()
    }
}

impl std::fmt::Display for EvaluatorIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.evaluator_id, self.version)
    }
}

/// Per-evaluator run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Named execution environment, if any.
    #[serde(default)]
    pub env: Option<String>,
    /// JSON text forwarded to the evaluator at run time.
    #[serde(default)]
    pub runtime_param: Option<String>,
}

/// One evaluator entry in a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorVersionItem {
    pub identifier: EvaluatorIdentifier,
    #[serde(default)]
    pub run_config: Option<RunConfig>,
    /// Only values > 0 are applied.
    #[serde(default)]
    pub score_weight: Option<f64>,
}

impl EvaluatorVersionItem {
    pub fn new(identifier: EvaluatorIdentifier) -> Self {
        Self {
            identifier,
            run_config: None,
            score_weight: None,
        }
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = Some(run_config);
        self
    }

    pub fn with_score_weight(mut self, weight: f64) -> Self {
        self.score_weight = Some(weight);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorType {
    Prompt,
    Code,
    Custom,
}

/// A concrete evaluator version as returned by the lookup service.
///
/// Also used as the snapshot handed to a debug run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluator {
    pub evaluator_id: EvaluatorId,
    pub version_id: EvaluatorVersionId,
    pub version: String,
    pub name: String,
    pub evaluator_type: EvaluatorType,
    pub builtin: bool,
    /// Type-specific definition (prompt template, code, endpoint).
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Maps one source field onto an evaluator input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field_name: String,
    pub from_field_name: String,
}

/// Input wiring for one evaluator version in an experiment.
///
/// Submissions may name the evaluator by identifier and leave
/// `evaluator_version_id` at 0; resolution fills it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorFieldMapping {
    #[serde(default)]
    pub evaluator_version_id: EvaluatorVersionId,
    #[serde(default)]
    pub evaluator: Option<EvaluatorIdentifier>,
    #[serde(default)]
    pub from_eval_set: Vec<FieldMapping>,
    #[serde(default)]
    pub from_target: Vec<FieldMapping>,
}

/// One input row for an evaluator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorInputData {
    #[serde(default)]
    pub input_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub ext: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorResult {
    pub score: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
}

/// Output of one evaluator run. A failed run carries `run_error` instead of
/// failing the surrounding call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorOutputData {
    #[serde(default)]
    pub result: Option<EvaluatorResult>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub run_error: Option<RunError>,
    #[serde(default)]
    pub time_consuming_ms: i64,
}

impl EvaluatorOutputData {
    pub fn failed(error: RunError) -> Self {
        Self {
            run_error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.run_error.is_none()
    }
}
