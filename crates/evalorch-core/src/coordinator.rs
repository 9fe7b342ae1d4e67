//! Asynchronous target invocation: issue and callback correlation.
//!
//! `issue_async` starts a target call and stores an [`AsyncContext`] under
//! the returned invocation id. `handle_callback` later claims that context,
//! times the call, forwards the mapped output to the record-reporting
//! service, and republishes the context's downstream event after a debounce
//! delay.
//!
//! The context is claimed with an atomic `take`, so a second delivery of the
//! same callback fails with `ContextNotFound`. If reporting fails the
//! context is put back so the caller can redeliver.

use std::sync::Arc;
use std::time::Duration;

use evalorch_state::{AsyncContext, AsyncCorrelationStore, InvocationId, StorageError};
use tracing::{instrument, warn, Instrument};

use crate::clock::{Clock, SystemClock};
use crate::collaborators::{EventPublisher, TargetExecutionService};
use crate::config::OrchestratorConfig;
use crate::domain::{
    EvalOrchError, InvokeResultReport, IssueOutcome, IssueRequest, Result, TargetOutputData,
    TargetRunStatus,
};
use crate::obs;

/// Timing knobs for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub callback_debounce: Duration,
    pub trajectory_extract_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            callback_debounce: crate::config::DEFAULT_CALLBACK_DEBOUNCE,
            trajectory_extract_interval: Duration::ZERO,
        }
    }
}

impl CoordinatorConfig {
    pub fn publish_delay(&self) -> Duration {
        self.trajectory_extract_interval + self.callback_debounce
    }
}

impl From<&OrchestratorConfig> for CoordinatorConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            callback_debounce: config.callback_debounce,
            trajectory_extract_interval: config.trajectory_extract_interval,
        }
    }
}

pub struct AsyncInvocationCoordinator {
    targets: Arc<dyn TargetExecutionService>,
    store: Arc<dyn AsyncCorrelationStore>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl AsyncInvocationCoordinator {
    pub fn new(
        targets: Arc<dyn TargetExecutionService>,
        store: Arc<dyn AsyncCorrelationStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            targets,
            store,
            publisher,
            clock: Arc::new(SystemClock),
            config: CoordinatorConfig::default(),
        }
    }

    /// Coordinator using the publish delay from `config`.
    pub fn from_config(
        targets: Arc<dyn TargetExecutionService>,
        store: Arc<dyn AsyncCorrelationStore>,
        publisher: Arc<dyn EventPublisher>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self::new(targets, store, publisher).with_config(CoordinatorConfig::from(config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Start an asynchronous target call and record its context.
    ///
    /// The timestamp is taken before the external call. If the context
    /// cannot be stored the invocation id is still returned, with
    /// `context_persisted == false`.
    #[instrument(skip(self, request), fields(space_id = request.space_id, target_id = request.target_id))]
    pub async fn issue_async(&self, request: IssueRequest) -> Result<IssueOutcome> {
        if request.space_id <= 0 || request.target_id <= 0 || request.target_version_id <= 0 {
            return Err(EvalOrchError::InvalidInput(format!(
                "space_id, target_id and target_version_id must be positive (got {}, {}, {})",
                request.space_id, request.target_id, request.target_version_id
            )));
        }

        let issued_at_ms = self.clock.now_ms();
        let issued = self
            .targets
            .issue_async(
                request.space_id,
                request.target_id,
                request.target_version_id,
                &request.execution_ctx,
                &request.input,
            )
            .await
            .map_err(|e| EvalOrchError::downstream("target_execution", e))?;

        let ctx = AsyncContext {
            invocation_id: issued.invocation_id.clone(),
            space_id: request.space_id,
            issued_at_ms,
            session: request.session,
            callee: issued.callee,
            event: request.event,
        };

        let context_persisted = match self.store.put(&ctx).await {
            Ok(()) => true,
            Err(e) => {
                obs::emit_context_persist_failed(issued.invocation_id.as_str(), &e);
                false
            }
        };

        obs::emit_invocation_issued(
            issued.invocation_id.as_str(),
            request.space_id,
            request.target_id,
        );

        Ok(IssueOutcome {
            invocation_id: issued.invocation_id,
            context_persisted,
        })
    }

    /// Correlate a callback with its issued invocation and complete it.
    ///
    /// Errors from the store or either collaborator are returned to the
    /// caller; nothing is retried here.
    pub async fn handle_callback(&self, report: InvokeResultReport) -> Result<()> {
        let span = obs::invocation_span(&report.invocation_id);
        let invocation_id = report.invocation_id.clone();

        let result = self.complete(report).instrument(span).await;
        if let Err(e) = &result {
            obs::emit_callback_failed(&invocation_id, e);
        }
        result
    }

    async fn complete(&self, report: InvokeResultReport) -> Result<()> {
        if report.space_id <= 0 {
            return Err(EvalOrchError::InvalidInput(
                "space_id must be positive".to_string(),
            ));
        }
        let invocation_id = InvocationId::parse(report.invocation_id.as_str())
            .map_err(|e| EvalOrchError::InvalidInput(e.to_string()))?;

        let ctx = self.store.take(&invocation_id).await.map_err(|e| match e {
            StorageError::ContextNotFound { invocation_id } => {
                EvalOrchError::ContextNotFound { invocation_id }
            }
            other => EvalOrchError::Storage(other),
        })?;

        let elapsed_ms = self.clock.now_ms().saturating_sub(ctx.issued_at_ms).max(0);
        let mut output = TargetOutputData::from_report(&report);
        output.time_consuming_ms = Some(elapsed_ms);
        let status = TargetRunStatus::from(report.status);

        if let Err(e) = self
            .targets
            .report_invoke_record(report.space_id, &invocation_id, &output, status, &ctx.session)
            .await
        {
            self.restore(&ctx).await;
            return Err(EvalOrchError::downstream("target_execution", e));
        }

        let published = match &ctx.event {
            Some(event) => {
                self.publisher
                    .publish_delayed(event, self.config.publish_delay())
                    .await
                    .map_err(|e| EvalOrchError::downstream("event_publisher", e))?;
                true
            }
            None => false,
        };

        obs::emit_callback_handled(
            invocation_id.as_str(),
            status_label(status),
            elapsed_ms,
            published,
        );
        Ok(())
    }

    /// Put a claimed context back after a failed report.
    async fn restore(&self, ctx: &AsyncContext) {
        if let Err(e) = self.store.put(ctx).await {
            warn!(
                invocation_id = %ctx.invocation_id,
                error = %e,
                "failed to restore async context after report failure"
            );
        }
    }
}

fn status_label(status: TargetRunStatus) -> &'static str {
    match status {
        TargetRunStatus::Unknown => "unknown",
        TargetRunStatus::Success => "success",
        TargetRunStatus::Fail => "fail",
    }
}
