//! Reserves robots for a mission, grounded on the reference source's
//! `allocate_resources` step handler.

use saga_runtime::{Fields, ProgressReporter, RuntimeError};
use serde_json::Value;

pub const STREAM_NAME: &str = "resources:commands";
pub const GROUP_NAME: &str = "resources_handler_group";
pub const EVENT_TYPE: &str = "resources:allocate";

pub async fn handle(fields: Fields, progress: ProgressReporter) -> Result<Value, RuntimeError> {
    let robot_count: u32 = fields
        .get("robot_count")
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);

    progress
        .report(0.5, Some(serde_json::json!({ "stage": "allocating" })))
        .await?;

    Ok(serde_json::json!({ "robots_allocated": robot_count }))
}
