//! The mission-start trigger: reads a `mission:start` command and runs the
//! five-step mission saga to completion or best-effort compensation.
//!
//! Grounded on the reference source's `saga_trigger.py`, with one
//! deliberate divergence: the original silently no-ops when `correlation_id`
//! is missing from the command fields, and never awaits the saga it
//! dispatches. Here a missing `correlation_id` is a [`RuntimeError::MissingField`]
//! and the saga run is always awaited to completion.

use std::sync::Arc;

use saga_core::Bus;
use saga_runtime::{run_saga, Fields, Handler, RuntimeError};

use crate::config::DomainConfig;
use crate::mission_saga::build_steps;

pub const STREAM_NAME: &str = "mission:commands";
pub const GROUP_NAME: &str = "mission_orchestrator_group";
pub const EVENT_TYPE: &str = "mission:start";

/// Build the dispatcher-ready handler closure over a shared bus connection
/// and the domain routing each saga step should address.
#[must_use]
pub fn handler(bus: Arc<dyn Bus>, domains: DomainConfig) -> Handler {
    Arc::new(move |fields: Fields| {
        let bus = Arc::clone(&bus);
        let domains = domains.clone();
        Box::pin(async move { handle(bus.as_ref(), &domains, fields).await })
    })
}

async fn handle(bus: &dyn Bus, domains: &DomainConfig, fields: Fields) -> Result<(), RuntimeError> {
    let correlation_id = fields
        .get("correlation_id")
        .cloned()
        .ok_or_else(|| RuntimeError::MissingField("correlation_id".to_string()))?;

    let robot_count: u32 = fields
        .get("robot_count")
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);
    let area = fields
        .get("area")
        .cloned()
        .unwrap_or_else(|| "ZoneA".to_string());

    let steps = build_steps(domains, robot_count, area);

    match run_saga(bus, &correlation_id, &steps).await {
        Ok(_context) => {
            tracing::info!(correlation_id, "mission saga completed");
            Ok(())
        }
        Err(err) => {
            tracing::error!(correlation_id, error = %err, "mission saga failed");
            Err(RuntimeError::HandlerError(err.to_string()))
        }
    }
}
