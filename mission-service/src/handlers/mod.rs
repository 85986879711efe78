//! Step handlers for the mission saga, plus the mission-start trigger.

pub mod allocate_resources;
pub mod integrate_maps;
pub mod perform_exploration;
pub mod plan_route;
pub mod release_resources;
pub mod saga_trigger;
