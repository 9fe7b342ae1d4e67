//! Batch evaluator debugging over the bounded executor.
//!
//! Each input row is run through [`DebugExecutionService::run_one`]
//! independently. The batch call succeeds as long as the pool can be
//! created; rows that fail carry a run error in their output. Output the
//! service produced before failing is kept, and its own run error wins over
//! the service error.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::collaborators::{DebugExecutionService, DebugRun};
use crate::config::OrchestratorConfig;
use crate::domain::{
    EvalOrchError, Evaluator, EvaluatorInputData, EvaluatorOutputData, Result, RunConfig,
    RunError,
};
use crate::executor::BoundedConcurrencyExecutor;

/// Code recorded on a row whose service call failed.
pub const DEBUG_FAILURE_CODE: i32 = 500;

/// `ext` key under which a run config's runtime param is passed to each row.
pub const RUNTIME_PARAM_EXT_KEY: &str = "builtin_runtime_param";

#[derive(Debug, Clone)]
pub struct BatchDebugRequest {
    pub space_id: i64,
    pub evaluator: Evaluator,
    pub inputs: Vec<EvaluatorInputData>,
    pub run_config: Option<RunConfig>,
}

/// Runs debug batches against one [`DebugExecutionService`].
pub struct EvaluatorDebugger {
    service: Arc<dyn DebugExecutionService>,
    executor: BoundedConcurrencyExecutor,
}

impl EvaluatorDebugger {
    pub fn new(service: Arc<dyn DebugExecutionService>, executor: BoundedConcurrencyExecutor) -> Self {
        Self { service, executor }
    }

    /// Create with a pool of `concurrency` workers.
    pub fn with_concurrency(
        service: Arc<dyn DebugExecutionService>,
        concurrency: usize,
    ) -> Result<Self> {
        Ok(Self::new(service, BoundedConcurrencyExecutor::new(concurrency)?))
    }

    /// Create with `config.batch_concurrency` workers.
    pub fn from_config(
        service: Arc<dyn DebugExecutionService>,
        config: &OrchestratorConfig,
    ) -> Result<Self> {
        Self::with_concurrency(service, config.batch_concurrency)
    }

    /// Debug `request.evaluator` against every input row.
    ///
    /// Output `i` belongs to input `i`.
    #[instrument(skip(self, request), fields(space_id = request.space_id, rows = request.inputs.len()))]
    pub async fn batch_debug(&self, request: BatchDebugRequest) -> Result<Vec<EvaluatorOutputData>> {
        if request.space_id <= 0 {
            return Err(EvalOrchError::InvalidInput(
                "space_id must be positive".to_string(),
            ));
        }

        let BatchDebugRequest {
            space_id,
            evaluator,
            inputs,
            run_config,
        } = request;

        let runtime_param = run_config
            .as_ref()
            .and_then(|rc| rc.runtime_param.clone())
            .filter(|p| !p.is_empty());
        let evaluator = Arc::new(evaluator);
        let run_config = Arc::new(run_config);
        let service = Arc::clone(&self.service);

        let results = self
            .executor
            .run(inputs, move |index, mut input| {
                let service = Arc::clone(&service);
                let evaluator = Arc::clone(&evaluator);
                let run_config = Arc::clone(&run_config);
                if let Some(param) = &runtime_param {
                    input
                        .ext
                        .insert(RUNTIME_PARAM_EXT_KEY.to_string(), param.clone());
                }

                async move {
                    let run_config = (*run_config).as_ref();
                    let run = service
                        .run_one(space_id, &evaluator, &input, run_config)
                        .await;
                    if let Some(e) = &run.error {
                        debug!(index, error = %e, partial = run.output.is_some(), "debug row failed");
                    }
                    Ok::<_, RunError>(merge_debug_run(run))
                }
            })
            .await;

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(EvaluatorOutputData::failed))
            .collect())
    }
}

/// Fold a service error into the row's output.
fn merge_debug_run(run: DebugRun) -> EvaluatorOutputData {
    let failure = run
        .error
        .map(|e| RunError::new(DEBUG_FAILURE_CODE, e.to_string()));
    match (run.output, failure) {
        (Some(mut output), failure) => {
            if output.run_error.is_none() {
                output.run_error = failure;
            }
            output
        }
        (None, Some(failure)) => EvaluatorOutputData::failed(failure),
        (None, None) => EvaluatorOutputData::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_merge_keeps_own_run_error() {
        let own = EvaluatorOutputData::failed(RunError::new(42, "bad prompt"));
        let merged = merge_debug_run(DebugRun::partial(own, anyhow!("late failure")));
        assert_eq!(merged.run_error, Some(RunError::new(42, "bad prompt")));
    }

    #[test]
    fn test_merge_of_empty_run_is_empty_output() {
        assert_eq!(merge_debug_run(DebugRun::default()), EvaluatorOutputData::default());
    }
}
