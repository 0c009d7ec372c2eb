//! Progress reporting for pipeline turns.
//!
//! Stages report through `ProgressReporter` so the pipeline stays unaware of
//! the transport. MCP tools bridge it to progress notifications; the CLI and
//! tests use `NoopProgressReporter` or a recording fake.

use std::sync::Arc;

use async_trait::async_trait;

/// Pipeline stages in the order a full turn visits them.
pub const TURN_STAGES: [&str; 6] = [
    "convert", "describe", "retrieve", "generate", "execute", "render",
];

#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Fire-and-forget; never fails the caller.
    async fn report(&self, current: f64, total: f64, message: Option<String>);

    /// Report `stage` as step `step` of `total_steps`.
    async fn step(&self, step: usize, total_steps: usize, message: &str) {
        let current = step as f64 / total_steps.max(1) as f64;
        self.report(current, 1.0, Some(message.to_string())).await;
    }

    /// Report entry into one of [`TURN_STAGES`].
    async fn stage(&self, stage: &str) {
        let step = TURN_STAGES
            .iter()
            .position(|s| *s == stage)
            .map_or(0, |i| i + 1);
        self.step(step, TURN_STAGES.len(), stage).await;
    }
}

pub struct NoopProgressReporter;

#[async_trait]
impl ProgressReporter for NoopProgressReporter {
    async fn report(&self, _current: f64, _total: f64, _message: Option<String>) {}
}

pub fn noop_progress() -> Arc<dyn ProgressReporter> {
    Arc::new(NoopProgressReporter)
}
