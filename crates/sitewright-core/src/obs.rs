//! Structured observability hooks for build lifecycle events.
//!
//! This module provides:
//! - A pipeline-scoped [`build_span`] tagging every log line with its trigger
//! - Emission functions for key lifecycle events: trigger dropped, build
//!   started, build finished, build failed, publish completed
//!
//! Verbosity follows `RUST_LOG`; JSON output is selected with `LOG_FORMAT=json`.

use std::time::Duration;

use tracing::{info, warn, Span};

use crate::coordinator::TriggerSource;
use crate::error::PipelineError;

/// Span scoping one pipeline run.
///
/// Attach with `Instrument::instrument` around the pipeline future.
pub fn build_span(source: TriggerSource) -> Span {
    tracing::info_span!("sitewright.build", trigger = %source)
}

/// Emit event: trigger rejected by the single-flight gate or by shutdown.
pub fn emit_trigger_dropped(source: TriggerSource, reason: &str) {
    info!(event = "trigger.dropped", trigger = %source, reason = %reason);
}

/// Emit event: pipeline admitted and starting.
pub fn emit_build_started(source: TriggerSource) {
    info!(event = "build.started", trigger = %source);
}

/// Emit event: artifact published.
pub fn emit_publish_completed(build_id: &str, commit: &str, duration: Duration) {
    info!(
        event = "publish.completed",
        build_id = %build_id,
        commit = %commit,
        duration_ms = duration.as_millis() as u64,
    );
}

/// Emit event: pipeline finished successfully.
pub fn emit_build_finished(build_id: &str, commit: &str, total: Duration) {
    info!(
        event = "build.finished",
        build_id = %build_id,
        commit = %commit,
        duration_ms = total.as_millis() as u64,
        "site built successfully"
    );
}

/// Emit event: pipeline aborted by a stage error (warning level).
///
/// Generator output is attached when the failure came from the generator.
pub fn emit_build_failed(commit: &str, error: &PipelineError, total: Duration) {
    let output = match error {
        PipelineError::Build(e) => e.output().unwrap_or_default(),
        _ => "",
    };
    warn!(
        event = "build.failed",
        stage = error.stage(),
        commit = %commit,
        duration_ms = total.as_millis() as u64,
        output = %output,
        error = %error,
    );
}
