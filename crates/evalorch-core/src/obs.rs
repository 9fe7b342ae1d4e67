//! Structured lifecycle events for invocations, callbacks, batches and
//! submissions.
//!
//! Every event carries a stable `event` field so log pipelines can filter on
//! it regardless of message text.

use tracing::{info, warn};

/// Span tagging everything logged while one invocation is handled.
///
/// Attach with `tracing::Instrument` so it stays entered across `.await`s.
pub fn invocation_span(invocation_id: &str) -> tracing::Span {
    tracing::info_span!("evalorch.invocation", invocation_id = %invocation_id)
}

pub fn emit_invocation_issued(invocation_id: &str, space_id: i64, target_id: i64) {
    info!(
        event = "invocation.issued",
        invocation_id = %invocation_id,
        space_id = space_id,
        target_id = target_id,
    );
}

/// The call was accepted but its context could not be stored.
pub fn emit_context_persist_failed(invocation_id: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "invocation.context_persist_failed",
        invocation_id = %invocation_id,
        error = %error,
    );
}

pub fn emit_callback_handled(invocation_id: &str, status: &str, elapsed_ms: i64, published: bool) {
    info!(
        event = "callback.handled",
        invocation_id = %invocation_id,
        status = %status,
        elapsed_ms = elapsed_ms,
        published = published,
    );
}

pub fn emit_callback_failed(invocation_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "callback.failed", invocation_id = %invocation_id, error = %error);
}

/// A scheduled downstream event could not be delivered.
pub fn emit_event_dropped(expt_run_id: i64, eval_set_item_id: i64) {
    warn!(
        event = "event_bus.dropped",
        expt_run_id = expt_run_id,
        eval_set_item_id = eval_set_item_id,
    );
}

pub fn emit_batch_finished(total: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "batch.finished",
        total = total,
        failed = failed,
        duration_ms = duration_ms,
    );
}

pub fn emit_submission_resolved(workspace_id: i64, resolved: usize, skipped: usize) {
    info!(
        event = "submission.resolved",
        workspace_id = workspace_id,
        resolved = resolved,
        skipped = skipped,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_span_enter() {
        let _entered = invocation_span("42").entered();
        emit_callback_handled("42", "success", 10, false);
    }
}
