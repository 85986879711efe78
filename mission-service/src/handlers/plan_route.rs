//! Plans an exploration route for the allocated robots, grounded on the
//! reference source's `plan_route` step handler.

use saga_runtime::{Fields, ProgressReporter, RuntimeError};
use serde_json::Value;

pub const STREAM_NAME: &str = "routing:commands";
pub const GROUP_NAME: &str = "routing_handler_group";
pub const EVENT_TYPE: &str = "routing:plan";

pub async fn handle(fields: Fields, progress: ProgressReporter) -> Result<Value, RuntimeError> {
    let area = fields
        .get("area")
        .cloned()
        .unwrap_or_else(|| "ZoneA".to_string());

    progress
        .report(0.5, Some(serde_json::json!({ "stage": "planning" })))
        .await?;

    Ok(serde_json::json!({ "route_planned": true, "area": area }))
}
