//! Merges exploration data into the shared map, grounded on the reference
//! source's `integrate_maps` step handler.

use saga_runtime::{Fields, ProgressReporter, RuntimeError};
use serde_json::Value;

pub const STREAM_NAME: &str = "map:commands";
pub const GROUP_NAME: &str = "map_handler_group";
pub const EVENT_TYPE: &str = "map:integrate";

pub async fn handle(_fields: Fields, progress: ProgressReporter) -> Result<Value, RuntimeError> {
    progress
        .report(0.5, Some(serde_json::json!({ "stage": "integrating" })))
        .await?;

    Ok(serde_json::json!({ "map_integrated": true }))
}
