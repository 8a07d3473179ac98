//! Structured observability hooks for run and inventory events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for run lifecycle and inventory mutation events
//!
//! Events are emitted at `info!` level, recorder failures at `warn!`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("7f9c...", "site.yml");
/// // every event below carries run_id and playbook
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id and playbook.
    pub fn enter(run_id: &str, playbook_id: &str) -> Self {
        Self {
            _span: run_span(run_id, playbook_id).entered(),
        }
    }
}

/// The run span, unentered, for instrumenting a session task.
pub fn run_span(run_id: &str, playbook_id: &str) -> tracing::Span {
    tracing::info_span!("fleetrun.run", run_id = %run_id, playbook = %playbook_id)
}

/// Emit event: run admitted and starting.
pub fn emit_run_started(run_id: &str, playbook_id: &str, requested_by: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        playbook = %playbook_id,
        requested_by = %requested_by,
    );
}

/// Emit event: run limited to a host/group expression.
pub fn emit_run_restricted(run_id: &str, restriction: &str) {
    info!(event = "run.restricted", run_id = %run_id, restriction = %restriction);
}

/// Emit event: process finished (or never started) with its status.
pub fn emit_run_finished(
    run_id: &str,
    exit_code: Option<i32>,
    duration_ms: u64,
    lines: u64,
    success: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        exit_code = ?exit_code,
        duration_ms = duration_ms,
        lines = lines,
        success = success,
    );
}

/// Emit event: the client went away and the process was terminated.
pub fn emit_run_cancelled(run_id: &str, lines: u64) {
    warn!(event = "run.cancelled", run_id = %run_id, lines = lines);
}

/// Emit event: outcome persisted to history.
pub fn emit_outcome_recorded(run_id: &str, status: &str) {
    info!(event = "history.recorded", run_id = %run_id, status = %status);
}

/// Emit event: history write failed (warning level).
pub fn emit_recorder_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "history.record_error", run_id = %run_id, error = %error);
}

/// Emit event: inventory file changed.
pub fn emit_inventory_mutated(op: &str, hostname: &str, lines: usize) {
    info!(event = "inventory.mutated", op = %op, hostname = %hostname, lines = lines);
}
