//! Composition root: connects to the bus, registers the mission-start
//! trigger and the five mission step handlers, and runs the dispatcher
//! until a shutdown signal arrives.

mod config;
mod handlers;
mod mission_saga;

use std::sync::Arc;

use saga_bus::RedisBus;
use saga_core::Bus;
use saga_runtime::{multi_stage_reply, Dispatcher, HandlerDescriptor};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(fmt::layer())
        .init();

    tracing::info!(redis_url = %config.bus.redis_url, "connecting to bus");
    let bus = Arc::new(
        RedisBus::builder()
            .redis_url(&config.bus.redis_url)
            .pool_max_size(config.bus.pool_max_size)
            .command_timeout(std::time::Duration::from_secs(config.bus.command_timeout_secs))
            .build()
            .await?,
    );
    tracing::info!("connected to bus");

    let bus_dyn: Arc<dyn Bus> = bus;
    let registry = build_registry(Arc::clone(&bus_dyn), &config);

    let dispatcher = Dispatcher::new(Arc::clone(&bus_dyn));
    dispatcher.prepare(&registry).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = dispatcher.spawn(registry, shutdown_rx);

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping handler loops");
    shutdown_tx.send(true).ok();

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

fn build_registry(bus: Arc<dyn Bus>, config: &config::Config) -> Vec<HandlerDescriptor> {
    use handlers::{
        allocate_resources, integrate_maps, perform_exploration, plan_route, release_resources,
        saga_trigger,
    };

    let domains = &config.domains;

    vec![
        HandlerDescriptor::new(
            "allocate_resources",
            domains.resources.stream.clone(),
            domains.resources.group.clone(),
            Some(allocate_resources::EVENT_TYPE.to_string()),
            Arc::new(multi_stage_reply(
                Arc::clone(&bus),
                Arc::new(allocate_resources::handle),
            )),
        ),
        HandlerDescriptor::new(
            "plan_route",
            domains.routing.stream.clone(),
            domains.routing.group.clone(),
            Some(plan_route::EVENT_TYPE.to_string()),
            Arc::new(multi_stage_reply(Arc::clone(&bus), Arc::new(plan_route::handle))),
        ),
        HandlerDescriptor::new(
            "perform_exploration",
            domains.exploration.stream.clone(),
            domains.exploration.group.clone(),
            Some(perform_exploration::EVENT_TYPE.to_string()),
            Arc::new(multi_stage_reply(
                Arc::clone(&bus),
                Arc::new(perform_exploration::handle),
            )),
        ),
        HandlerDescriptor::new(
            "integrate_maps",
            domains.map.stream.clone(),
            domains.map.group.clone(),
            Some(integrate_maps::EVENT_TYPE.to_string()),
            Arc::new(multi_stage_reply(
                Arc::clone(&bus),
                Arc::new(integrate_maps::handle),
            )),
        ),
        HandlerDescriptor::new(
            "release_resources",
            domains.resources.stream.clone(),
            domains.release_group.clone(),
            Some(release_resources::EVENT_TYPE.to_string()),
            Arc::new(multi_stage_reply(
                Arc::clone(&bus),
                Arc::new(release_resources::handle),
            )),
        ),
        HandlerDescriptor::new(
            "mission_start_trigger",
            config.mission_topic.clone(),
            config.mission_group.clone(),
            Some(saga_trigger::EVENT_TYPE.to_string()),
            saga_trigger::handler(bus, domains.clone()),
        ),
    ]
}

#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
