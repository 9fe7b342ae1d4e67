//! Evaluation target invocation payloads and status mapping.

use std::collections::BTreeMap;

use evalorch_state::{DownstreamEvent, InvocationId, Session};
use serde::{Deserialize, Serialize};

use super::run::{RunError, TokenUsage};

/// Run-error code attached when the external system reports a failed
/// target invocation.
pub const TARGET_INVOKE_FAIL_CODE: i32 = 601;

/// Output field holding the target's answer.
pub const ACTUAL_OUTPUT_FIELD: &str = "actual_output";

/// Internal run status of a target record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRunStatus {
    Unknown,
    Success,
    Fail,
}

/// Terminal status as delivered by the external callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalInvokeStatus {
    Unknown,
    Success,
    Failed,
}

impl From<ExternalInvokeStatus> for TargetRunStatus {
    fn from(status: ExternalInvokeStatus) -> Self {
        match status {
            ExternalInvokeStatus::Success => TargetRunStatus::Success,
            ExternalInvokeStatus::Failed => TargetRunStatus::Fail,
            ExternalInvokeStatus::Unknown => TargetRunStatus::Unknown,
        }
    }
}

/// Where an asynchronous target call sits inside an experiment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCtx {
    pub experiment_run_id: i64,
    pub eval_set_item_id: i64,
    pub turn_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetInputData {
    #[serde(default)]
    pub input_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub ext: BTreeMap<String, String>,
}

/// Everything needed to start one asynchronous target call.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub space_id: i64,
    pub target_id: i64,
    pub target_version_id: i64,
    pub execution_ctx: ExecutionCtx,
    pub input: TargetInputData,
    pub session: Session,
    /// Republished after the callback, if present.
    pub event: Option<DownstreamEvent>,
}

/// What the target execution service hands back when it accepts a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvocation {
    pub invocation_id: InvocationId,
    pub callee: Option<String>,
}

/// Result of `issue_async`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueOutcome {
    pub invocation_id: InvocationId,
    /// False when the context could not be stored; a later callback for this
    /// id will fail with `ContextNotFound`.
    pub context_persisted: bool,
}

/// Output payload of an external callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalOutput {
    #[serde(default)]
    pub actual_output: Option<serde_json::Value>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Callback payload reporting the end of an asynchronous target call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResultReport {
    pub space_id: i64,
    pub invocation_id: String,
    pub status: ExternalInvokeStatus,
    #[serde(default)]
    pub output: Option<ExternalOutput>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Target output as forwarded to the record-reporting collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetOutputData {
    #[serde(default)]
    pub output_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub run_error: Option<RunError>,
    #[serde(default)]
    pub time_consuming_ms: Option<i64>,
}

impl TargetOutputData {
    /// Map a callback payload onto the internal output shape.
    ///
    /// Success keeps the actual output and usage; failure keeps only a run
    /// error, and only when the message is non-empty; any other status maps
    /// to an empty output.
    pub fn from_report(report: &InvokeResultReport) -> Self {
        match report.status {
            ExternalInvokeStatus::Success => {
                let mut output_fields = BTreeMap::new();
                let mut usage = None;
                if let Some(out) = &report.output {
                    if let Some(actual) = &out.actual_output {
                        output_fields.insert(ACTUAL_OUTPUT_FIELD.to_string(), actual.clone());
                    }
                    usage = out.usage;
                }
                Self {
                    output_fields,
                    usage,
                    ..Default::default()
                }
            }
            ExternalInvokeStatus::Failed => Self {
                run_error: report
                    .error_message
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .map(|m| RunError::new(TARGET_INVOKE_FAIL_CODE, m)),
                ..Default::default()
            },
            ExternalInvokeStatus::Unknown => Self::default(),
        }
    }
}
