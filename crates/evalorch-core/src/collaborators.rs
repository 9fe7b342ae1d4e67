//! Collaborator contracts consumed by the orchestration core.
//!
//! Each trait is the seam to an external service. Implementations report
//! failures as `anyhow::Error`; the core wraps them as
//! [`EvalOrchError::Downstream`](crate::EvalOrchError::Downstream) without
//! altering the original error.

use std::time::Duration;

use async_trait::async_trait;
use evalorch_state::{DownstreamEvent, InvocationId, Session};

use crate::domain::{
    CreateExperimentParam, Evaluator, EvaluatorId, EvaluatorInputData, EvaluatorOutputData,
    ExecutionCtx, Experiment, IssuedInvocation, RunConfig, TargetInputData, TargetOutputData,
    TargetRunStatus,
};

/// Starts target calls and persists their authoritative records.
#[async_trait]
pub trait TargetExecutionService: Send + Sync {
    /// Start an asynchronous call. Returns once the call is accepted.
    async fn issue_async(
        &self,
        space_id: i64,
        target_id: i64,
        target_version_id: i64,
        ctx: &ExecutionCtx,
        input: &TargetInputData,
    ) -> anyhow::Result<IssuedInvocation>;

    async fn report_invoke_record(
        &self,
        space_id: i64,
        invocation_id: &InvocationId,
        output: &TargetOutputData,
        status: TargetRunStatus,
        session: &Session,
    ) -> anyhow::Result<()>;
}

/// Event bus accepting delayed publication.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_delayed(&self, event: &DownstreamEvent, delay: Duration)
        -> anyhow::Result<()>;
}

/// Batch evaluator lookups. Results come back in no particular order and
/// unknown keys are simply absent.
#[async_trait]
pub trait EvaluatorLookupService: Send + Sync {
    /// Currently visible version of each builtin evaluator.
    async fn batch_get_builtin(&self, ids: &[EvaluatorId]) -> anyhow::Result<Vec<Evaluator>>;

    async fn batch_get_by_id_and_version(
        &self,
        pairs: &[(EvaluatorId, String)],
    ) -> anyhow::Result<Vec<Evaluator>>;
}

/// What one debug run produced.
///
/// A service may fail after producing partial output (usage, timing, a
/// partial result), so both halves can be present at once.
#[derive(Debug, Default)]
pub struct DebugRun {
    pub output: Option<EvaluatorOutputData>,
    pub error: Option<anyhow::Error>,
}

impl DebugRun {
    pub fn completed(output: EvaluatorOutputData) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(error: anyhow::Error) -> Self {
        Self {
            output: None,
            error: Some(error),
        }
    }

    pub fn partial(output: EvaluatorOutputData, error: anyhow::Error) -> Self {
        Self {
            output: Some(output),
            error: Some(error),
        }
    }
}

impl From<anyhow::Result<EvaluatorOutputData>> for DebugRun {
    fn from(result: anyhow::Result<EvaluatorOutputData>) -> Self {
        match result {
            Ok(output) => Self::completed(output),
            Err(e) => Self::failed(e),
        }
    }
}

/// Runs one evaluator against one input row.
#[async_trait]
pub trait DebugExecutionService: Send + Sync {
    async fn run_one(
        &self,
        space_id: i64,
        evaluator: &Evaluator,
        input: &EvaluatorInputData,
        run_config: Option<&RunConfig>,
    ) -> DebugRun;
}

/// Creates and starts experiments.
#[async_trait]
pub trait ExperimentManager: Send + Sync {
    async fn create_experiment(
        &self,
        param: &CreateExperimentParam,
        session: &Session,
    ) -> anyhow::Result<Experiment>;

    /// Start a run of the experiment, returning the run id.
    async fn run_experiment(
        &self,
        workspace_id: i64,
        experiment_id: i64,
        session: &Session,
    ) -> anyhow::Result<i64>;
}
