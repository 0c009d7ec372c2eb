//! Pipeline progress forwarded to the MCP client as progress notifications.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{Meta, ProgressNotificationParam, ProgressToken};
use rmcp::{Peer, RoleServer};
use tracing::debug;

use crate::progress::{noop_progress, ProgressReporter, TURN_STAGES};

/// Sends each pipeline stage to the client that asked for progress on a
/// tool call. Notification failures are logged and otherwise ignored.
pub struct StageNotifier {
    client: Peer<RoleServer>,
    token: ProgressToken,
    tool: &'static str,
}

impl StageNotifier {
    pub fn new(client: Peer<RoleServer>, token: ProgressToken, tool: &'static str) -> Self {
        Self {
            client,
            token,
            tool,
        }
    }
}

/// Human-readable progress line, e.g. `execute_code: execute (5/6)`.
pub fn stage_message(tool: &str, stage: &str) -> String {
    match TURN_STAGES.iter().position(|s| *s == stage) {
        Some(i) => format!("{}: {} ({}/{})", tool, stage, i + 1, TURN_STAGES.len()),
        None => format!("{}: {}", tool, stage),
    }
}

#[async_trait]
impl ProgressReporter for StageNotifier {
    async fn report(&self, current: f64, total: f64, message: Option<String>) {
        let param = ProgressNotificationParam {
            progress_token: self.token.clone(),
            progress: current,
            total: Some(total),
            message: message.map(|m| stage_message(self.tool, &m)),
        };
        if let Err(e) = self.client.notify_progress(param).await {
            debug!(tool = self.tool, error = %e, "Progress notification dropped");
        }
    }
}

/// Reporter for one tool call; noop when the request carried no progress token.
pub fn stage_progress(
    meta: &Meta,
    client: &Peer<RoleServer>,
    tool: &'static str,
) -> Arc<dyn ProgressReporter> {
    match meta.get_progress_token() {
        Some(token) => Arc::new(StageNotifier::new(client.clone(), token.clone(), tool)),
        None => noop_progress(),
    }
}
