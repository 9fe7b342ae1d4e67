//! evalorch core library
//!
//! Orchestration for an LLM evaluation platform:
//!
//! - [`EvaluatorVersionResolver`]: turns submitted `(evaluator, version)`
//!   identifiers into concrete version ids with two batch lookups
//! - [`AsyncInvocationCoordinator`]: issues asynchronous target calls and
//!   correlates their callbacks through an
//!   [`AsyncCorrelationStore`](evalorch_state::AsyncCorrelationStore)
//! - [`BoundedConcurrencyExecutor`]: runs independent sub-tasks on a fixed
//!   number of workers with positional, failure-isolated results
//! - [`ExperimentSubmissionPipeline`]: resolve, create, run
//!
//! External services are reached only through the traits in
//! [`collaborators`].

pub mod batch_debug;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod event_bus;
pub mod executor;
pub mod fakes;
pub mod obs;
pub mod pipeline;
pub mod resolver;
pub mod telemetry;

pub use batch_debug::{BatchDebugRequest, EvaluatorDebugger, DEBUG_FAILURE_CODE, RUNTIME_PARAM_EXT_KEY};
pub use clock::{Clock, SystemClock};
pub use collaborators::{
    DebugExecutionService, DebugRun, EvaluatorLookupService, EventPublisher, ExperimentManager,
    TargetExecutionService,
};
pub use config::OrchestratorConfig;
pub use coordinator::{AsyncInvocationCoordinator, CoordinatorConfig};
pub use domain::{EvalOrchError, Result};
pub use event_bus::ChannelEventPublisher;
pub use executor::{BoundedConcurrencyExecutor, TaskResult, TASK_PANIC_CODE};
pub use pipeline::ExperimentSubmissionPipeline;
pub use resolver::{EvaluatorVersionResolver, ResolveRequest, ResolvedEvaluators};
