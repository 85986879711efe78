//! The five-step robotic mission saga: allocate resources, plan a route,
//! perform exploration, integrate the resulting map, then release the
//! allocated resources. Grounded on the reference source's
//! `mission_start_async/orchestrator.py`, including its per-step
//! `compensate_*` bodies (each just logs and reports what it undid).

use std::sync::Arc;
use std::time::Duration;

use saga_runtime::{SagaContext, SagaStep};
use serde_json::Value;

use crate::config::DomainConfig;
use crate::handlers::{allocate_resources, integrate_maps, perform_exploration, plan_route, release_resources};

const STEP_TIMEOUT: Duration = Duration::from_secs(30);

fn logged_compensation(
    step_name: &'static str,
) -> saga_runtime::Compensation {
    Arc::new(move |correlation_id, saga_id, _ctx| {
        Box::pin(async move {
            tracing::info!(
                correlation_id,
                saga_id,
                step = step_name,
                "compensated"
            );
            Ok(Value::Null)
        })
    })
}

/// Build the ordered step list for one mission saga run, routed according to
/// `domains` (so a saga run addresses whichever stream/group names the
/// deployed step handlers are actually listening on).
#[must_use]
pub fn build_steps(domains: &DomainConfig, robot_count: u32, area: String) -> Vec<SagaStep> {
    vec![
        SagaStep {
            name: "allocate_resources".to_string(),
            command_stream: domains.resources.stream.clone(),
            reply_prefix: domains.resources.reply_prefix.clone(),
            event_type: allocate_resources::EVENT_TYPE.to_string(),
            payload_builder: Arc::new(move |_ctx: &SagaContext| {
                serde_json::json!({ "robot_count": robot_count })
            }),
            compensation: logged_compensation("allocate_resources"),
            timeout: STEP_TIMEOUT,
        },
        SagaStep {
            name: "plan_route".to_string(),
            command_stream: domains.routing.stream.clone(),
            reply_prefix: domains.routing.reply_prefix.clone(),
            event_type: plan_route::EVENT_TYPE.to_string(),
            payload_builder: Arc::new(move |_ctx: &SagaContext| {
                serde_json::json!({ "area": area })
            }),
            compensation: logged_compensation("plan_route"),
            timeout: STEP_TIMEOUT,
        },
        SagaStep {
            name: "perform_exploration".to_string(),
            command_stream: domains.exploration.stream.clone(),
            reply_prefix: domains.exploration.reply_prefix.clone(),
            event_type: perform_exploration::EVENT_TYPE.to_string(),
            payload_builder: Arc::new(|_ctx: &SagaContext| serde_json::json!({})),
            compensation: logged_compensation("perform_exploration"),
            timeout: STEP_TIMEOUT,
        },
        SagaStep {
            name: "integrate_maps".to_string(),
            command_stream: domains.map.stream.clone(),
            reply_prefix: domains.map.reply_prefix.clone(),
            event_type: integrate_maps::EVENT_TYPE.to_string(),
            payload_builder: Arc::new(|_ctx: &SagaContext| serde_json::json!({})),
            compensation: logged_compensation("integrate_maps"),
            timeout: STEP_TIMEOUT,
        },
        SagaStep {
            name: "release_resources".to_string(),
            command_stream: domains.resources.stream.clone(),
            reply_prefix: domains.resources.reply_prefix.clone(),
            event_type: release_resources::EVENT_TYPE.to_string(),
            payload_builder: Arc::new(|_ctx: &SagaContext| serde_json::json!({})),
            compensation: logged_compensation("release_resources"),
            timeout: STEP_TIMEOUT,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn builds_five_steps_in_dependency_order() {
        let config = Config::from_env();
        let steps = build_steps(&config.domains, 3, "ZoneB".to_string());
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "allocate_resources",
                "plan_route",
                "perform_exploration",
                "integrate_maps",
                "release_resources",
            ]
        );
    }

    #[test]
    fn allocate_and_release_share_stream_and_differ_by_event_type() {
        let config = Config::from_env();
        let steps = build_steps(&config.domains, 2, "ZoneA".to_string());
        let allocate = &steps[0];
        let release = &steps[4];
        assert_eq!(allocate.command_stream, release.command_stream);
        assert_ne!(allocate.event_type, release.event_type);
    }
}
