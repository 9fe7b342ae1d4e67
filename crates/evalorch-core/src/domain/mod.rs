//! Domain models for evalorch.
//!
//! - `evaluator`: evaluator identity, version selection, debug payloads
//! - `target`: asynchronous target invocation payloads and status mapping
//! - `experiment`: submission payloads
//! - `error`: the orchestration error taxonomy

pub mod error;
pub mod evaluator;
pub mod experiment;
pub mod run;
pub mod target;

pub use error::{EvalOrchError, Result};
pub use evaluator::{
    Evaluator, EvaluatorFieldMapping, EvaluatorId, EvaluatorIdentifier, EvaluatorInputData,
    EvaluatorOutputData, EvaluatorResult, EvaluatorType, EvaluatorVersionId,
    EvaluatorVersionItem, FieldMapping, RunConfig, VersionSelector, BUILTIN_VISIBLE,
};
pub use experiment::{CreateExperimentParam, Experiment, SubmissionOutcome, SubmitExperimentRequest};
pub use run::{RunError, TokenUsage};
pub use target::{
    ExecutionCtx, ExternalInvokeStatus, ExternalOutput, InvokeResultReport, IssueOutcome,
    IssueRequest, IssuedInvocation, TargetInputData, TargetOutputData, TargetRunStatus,
    ACTUAL_OUTPUT_FIELD, TARGET_INVOKE_FAIL_CODE,
};
