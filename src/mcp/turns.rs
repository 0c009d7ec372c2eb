//! Turn-scoped state for MCP clients driving the tools one by one.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ForgeError;
use crate::pipeline::PipelineState;

pub type SharedState = Arc<Mutex<PipelineState>>;

/// Open turns keyed by id. Idle turns expire, which drops their scratch
/// directories.
#[derive(Clone)]
pub struct TurnStore {
    turns: Cache<Uuid, SharedState>,
}

impl TurnStore {
    pub fn new(max_turns: u64, idle: Duration) -> Self {
        Self {
            turns: Cache::builder()
                .max_capacity(max_turns)
                .time_to_idle(idle)
                .build(),
        }
    }

    pub async fn open(&self, state: PipelineState) -> Uuid {
        let id = state.turn_id;
        self.turns.insert(id, Arc::new(Mutex::new(state))).await;
        id
    }

    pub async fn get(&self, turn_id: &str) -> Result<SharedState, ForgeError> {
        let id = parse_turn_id(turn_id)?;
        self.turns
            .get(&id)
            .await
            .ok_or_else(|| ForgeError::Validation(format!("unknown or expired turn {}", turn_id)))
    }

    /// Remove the turn; the state is dropped once the last holder releases it.
    pub async fn close(&self, turn_id: &str) -> Result<SharedState, ForgeError> {
        let id = parse_turn_id(turn_id)?;
        self.turns
            .remove(&id)
            .await
            .ok_or_else(|| ForgeError::Validation(format!("unknown or expired turn {}", turn_id)))
    }
}

fn parse_turn_id(turn_id: &str) -> Result<Uuid, ForgeError> {
    Uuid::parse_str(turn_id.trim())
        .map_err(|_| ForgeError::Validation(format!("invalid turn id '{}'", turn_id)))
}
