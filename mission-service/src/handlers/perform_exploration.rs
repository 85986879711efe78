//! Carries out the planned exploration, grounded on the reference source's
//! `perform_exploration` step handler.

use saga_runtime::{Fields, ProgressReporter, RuntimeError};
use serde_json::Value;

pub const STREAM_NAME: &str = "exploration:commands";
pub const GROUP_NAME: &str = "exploration_handler_group";
pub const EVENT_TYPE: &str = "exploration:perform";

pub async fn handle(_fields: Fields, progress: ProgressReporter) -> Result<Value, RuntimeError> {
    progress
        .report(0.5, Some(serde_json::json!({ "stage": "exploring" })))
        .await?;

    Ok(serde_json::json!({ "exploration_complete": true }))
}
