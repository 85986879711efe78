//! Releases the robots reserved by `allocate_resources`, grounded on the
//! reference source's `release_resources` step handler. Shares its
//! `STREAM_NAME` with [`super::allocate_resources`] but reads as its own
//! consumer group: two loops sharing both a stream and a group would race
//! for entries under Redis Streams' per-group delivery, so this handler
//! needs `resources_release_group` to actually see every `resources:release`
//! entry rather than losing some to `allocate_resources`'s loop.
//! Distinguished from `allocate_resources` only by `event_type`.

use saga_runtime::{Fields, ProgressReporter, RuntimeError};
use serde_json::Value;

pub const STREAM_NAME: &str = super::allocate_resources::STREAM_NAME;
pub const GROUP_NAME: &str = "resources_release_group";
pub const EVENT_TYPE: &str = "resources:release";

pub async fn handle(_fields: Fields, progress: ProgressReporter) -> Result<Value, RuntimeError> {
    progress
        .report(0.5, Some(serde_json::json!({ "stage": "releasing" })))
        .await?;

    Ok(serde_json::json!({ "resources_released": true }))
}
