//! In-memory collaborator fakes (testing only)
//!
//! Each fake records the calls it receives so tests can assert on exactly
//! what reached the collaborator. Failure switches make a fake return an
//! error instead.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use evalorch_state::{DownstreamEvent, InvocationId, Session};

use crate::clock::Clock;
use crate::collaborators::*;
use crate::domain::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FixedClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    pub fn at(now_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicI64::new(now_ms),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// RecordingTargetService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCall {
    pub space_id: i64,
    pub target_id: i64,
    pub target_version_id: i64,
    pub ctx: ExecutionCtx,
    pub input: TargetInputData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportedRecord {
    pub space_id: i64,
    pub invocation_id: InvocationId,
    pub output: TargetOutputData,
    pub status: TargetRunStatus,
    pub session: Session,
}

/// Hands out invocation ids from a queue (or a counter once the queue is
/// empty) and records every report.
#[derive(Debug, Default)]
pub struct RecordingTargetService {
    next_ids: Mutex<Vec<i64>>,
    counter: AtomicI64,
    issued: Mutex<Vec<IssuedCall>>,
    reports: Mutex<Vec<ReportedRecord>>,
    fail_issue: AtomicBool,
    fail_report: AtomicBool,
}

impl RecordingTargetService {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(1000),
            ..Default::default()
        }
    }

    /// Issue these ids, in order, before falling back to the counter.
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let svc = Self::new();
        let mut queue: Vec<i64> = ids.into_iter().collect();
        queue.reverse();
        *lock(&svc.next_ids) = queue;
        svc
    }

    pub fn set_fail_issue(&self, fail: bool) {
        self.fail_issue.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_report(&self, fail: bool) {
        self.fail_report.store(fail, Ordering::SeqCst);
    }

    pub fn issued(&self) -> Vec<IssuedCall> {
        lock(&self.issued).clone()
    }

    pub fn reports(&self) -> Vec<ReportedRecord> {
        lock(&self.reports).clone()
    }
}

#[async_trait]
impl TargetExecutionService for RecordingTargetService {
    async fn issue_async(
        &self,
        space_id: i64,
        target_id: i64,
        target_version_id: i64,
        ctx: &ExecutionCtx,
        input: &TargetInputData,
    ) -> anyhow::Result<IssuedInvocation> {
        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(anyhow!("target rejected invocation"));
        }
        lock(&self.issued).push(IssuedCall {
            space_id,
            target_id,
            target_version_id,
            ctx: ctx.clone(),
            input: input.clone(),
        });
        let id = lock(&self.next_ids)
            .pop()
            .unwrap_or_else(|| self.counter.fetch_add(1, Ordering::SeqCst));
        Ok(IssuedInvocation {
            invocation_id: InvocationId::from(id),
            callee: Some(format!("callee-{target_id}")),
        })
    }

    async fn report_invoke_record(
        &self,
        space_id: i64,
        invocation_id: &InvocationId,
        output: &TargetOutputData,
        status: TargetRunStatus,
        session: &Session,
    ) -> anyhow::Result<()> {
        if self.fail_report.load(Ordering::SeqCst) {
            return Err(anyhow!("record store unavailable"));
        }
        lock(&self.reports).push(ReportedRecord {
            space_id,
            invocation_id: invocation_id.clone(),
            output: output.clone(),
            status,
            session: session.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<(DownstreamEvent, Duration)>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(DownstreamEvent, Duration)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_delayed(&self, event: &DownstreamEvent, delay: Duration) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("event bus unavailable"));
        }
        lock(&self.calls).push((event.clone(), delay));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticEvaluatorLookup
// ---------------------------------------------------------------------------

/// Lookup over a fixed catalogue of evaluator versions.
///
/// Builtin lookups return the `builtin` entries; pinned lookups match on
/// `(evaluator_id, version)`.
#[derive(Debug, Default)]
pub struct StaticEvaluatorLookup {
    catalogue: Vec<Evaluator>,
    builtin_calls: Mutex<Vec<Vec<EvaluatorId>>>,
    pinned_calls: Mutex<Vec<Vec<(EvaluatorId, String)>>>,
    fail: AtomicBool,
}

impl StaticEvaluatorLookup {
    pub fn new(catalogue: Vec<Evaluator>) -> Self {
        Self {
            catalogue,
            ..Default::default()
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn builtin_calls(&self) -> Vec<Vec<EvaluatorId>> {
        lock(&self.builtin_calls).clone()
    }

    pub fn pinned_calls(&self) -> Vec<Vec<(EvaluatorId, String)>> {
        lock(&self.pinned_calls).clone()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("evaluator catalogue unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EvaluatorLookupService for StaticEvaluatorLookup {
    async fn batch_get_builtin(&self, ids: &[EvaluatorId]) -> anyhow::Result<Vec<Evaluator>> {
        self.check()?;
        lock(&self.builtin_calls).push(ids.to_vec());
        // Reverse so callers cannot rely on lookup order.
        Ok(self
            .catalogue
            .iter()
            .rev()
            .filter(|e| e.builtin && ids.contains(&e.evaluator_id))
            .cloned()
            .collect())
    }

    async fn batch_get_by_id_and_version(
        &self,
        pairs: &[(EvaluatorId, String)],
    ) -> anyhow::Result<Vec<Evaluator>> {
        self.check()?;
        lock(&self.pinned_calls).push(pairs.to_vec());
        Ok(self
            .catalogue
            .iter()
            .rev()
            .filter(|e| {
                pairs
                    .iter()
                    .any(|(id, v)| *id == e.evaluator_id && *v == e.version)
            })
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ScriptedDebugService
// ---------------------------------------------------------------------------

type DebugScript = dyn Fn(&EvaluatorInputData) -> DebugRun + Send + Sync;

/// Debug service whose per-row behaviour is a closure.
pub struct ScriptedDebugService {
    script: Box<DebugScript>,
    seen: Mutex<Vec<EvaluatorInputData>>,
}

impl ScriptedDebugService {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&EvaluatorInputData) -> anyhow::Result<EvaluatorOutputData> + Send + Sync + 'static,
    {
        Self::from_runs(move |input| DebugRun::from(script(input)))
    }

    /// Script that can return output and an error together.
    pub fn from_runs<F>(script: F) -> Self
    where
        F: Fn(&EvaluatorInputData) -> DebugRun + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Inputs in the order the service received them.
    pub fn seen(&self) -> Vec<EvaluatorInputData> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl DebugExecutionService for ScriptedDebugService {
    async fn run_one(
        &self,
        _space_id: i64,
        _evaluator: &Evaluator,
        input: &EvaluatorInputData,
        _run_config: Option<&RunConfig>,
    ) -> DebugRun {
        lock(&self.seen).push(input.clone());
        (self.script)(input)
    }
}

// ---------------------------------------------------------------------------
// RecordingExperimentManager
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingExperimentManager {
    created: Mutex<Vec<(CreateExperimentParam, Session)>>,
    runs: Mutex<BTreeMap<i64, i64>>,
    next_id: AtomicI64,
    fail_create: AtomicBool,
    fail_run: AtomicBool,
}

impl RecordingExperimentManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_run(&self, fail: bool) {
        self.fail_run.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<(CreateExperimentParam, Session)> {
        lock(&self.created).clone()
    }

    /// experiment id → run id for every started run.
    pub fn runs(&self) -> BTreeMap<i64, i64> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl ExperimentManager for RecordingExperimentManager {
    async fn create_experiment(
        &self,
        param: &CreateExperimentParam,
        session: &Session,
    ) -> anyhow::Result<Experiment> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("experiment name already taken"));
        }
        lock(&self.created).push((param.clone(), session.clone()));
        Ok(Experiment {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            workspace_id: param.workspace_id,
            name: param.name.clone(),
            evaluator_version_ids: param.evaluator_version_ids.clone(),
        })
    }

    async fn run_experiment(
        &self,
        _workspace_id: i64,
        experiment_id: i64,
        _session: &Session,
    ) -> anyhow::Result<i64> {
        if self.fail_run.load(Ordering::SeqCst) {
            return Err(anyhow!("scheduler unavailable"));
        }
        let run_id = experiment_id * 100;
        lock(&self.runs).insert(experiment_id, run_id);
        Ok(run_id)
    }
}
