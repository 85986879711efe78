//! Configuration loaded from environment variables at startup, in the
//! `Config::from_env` style.

use std::env;

/// Runtime configuration for the mission service process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bus connection settings.
    pub bus: BusConfig,
    /// The command stream the mission-start trigger handler listens on.
    pub mission_topic: String,
    /// Consumer group the mission-start trigger handler reads as.
    pub mission_group: String,
    /// Per-domain stream/group/reply-prefix overrides, so each of the five
    /// step handlers can be pointed at a differently-named deployment of its
    /// domain's stream when run as its own process against the same bus.
    pub domains: DomainConfig,
    /// Log filter directive consumed by `tracing_subscriber::EnvFilter`.
    pub log_level: String,
}

/// Bus connection settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Pool size for the connection pool.
    pub pool_max_size: usize,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
}

/// Stream, consumer group, and reply-prefix names for one step domain.
#[derive(Debug, Clone)]
pub struct DomainRouting {
    /// Command stream this domain's handler(s) consume.
    pub stream: String,
    /// Consumer group this domain's handler(s) read as.
    pub group: String,
    /// Reply-stream prefix this domain's saga step requests reply to.
    pub reply_prefix: String,
}

/// Per-domain routing overrides for the five mission step handlers.
/// `resources` covers the stream and reply prefix shared by
/// `allocate_resources` and `release_resources`; the two are still read by
/// two independent consumer groups (`resources.group` and
/// `release_group`) so Redis delivers each stream entry to only one of the
/// two loops' respective groups rather than racing both loops for every
/// entry under one shared group.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    /// Routing for `allocate_resources`. Also carries the `stream` and
    /// `reply_prefix` used by `release_resources` (see `release_group`).
    pub resources: DomainRouting,
    /// Consumer group `release_resources` reads as, independent of
    /// `resources.group` so the two handlers don't race for entries on
    /// their shared stream.
    pub release_group: String,
    /// Routing for `plan_route`.
    pub routing: DomainRouting,
    /// Routing for `perform_exploration`.
    pub exploration: DomainRouting,
    /// Routing for `integrate_maps`.
    pub map: DomainRouting,
}

fn domain_routing(
    prefix: &str,
    default_stream: &str,
    default_group: &str,
    default_reply_prefix: &str,
) -> DomainRouting {
    DomainRouting {
        stream: env::var(format!("{prefix}_STREAM"))
            .unwrap_or_else(|_| default_stream.to_string()),
        group: env::var(format!("{prefix}_GROUP")).unwrap_or_else(|_| default_group.to_string()),
        reply_prefix: env::var(format!("{prefix}_REPLY_PREFIX"))
            .unwrap_or_else(|_| default_reply_prefix.to_string()),
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// development defaults when unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bus: BusConfig {
                redis_url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                pool_max_size: env::var("BUS_POOL_MAX_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(16),
                command_timeout_secs: env::var("BUS_COMMAND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            mission_topic: env::var("MISSION_TOPIC")
                .unwrap_or_else(|_| "mission:commands".to_string()),
            mission_group: env::var("MISSION_GROUP")
                .unwrap_or_else(|_| "mission_orchestrator_group".to_string()),
            domains: DomainConfig {
                resources: domain_routing(
                    "RESOURCES",
                    "resources:commands",
                    "resources_handler_group",
                    "resources:replies",
                ),
                release_group: env::var("RESOURCES_RELEASE_GROUP")
                    .unwrap_or_else(|_| "resources_release_group".to_string()),
                routing: domain_routing(
                    "ROUTING",
                    "routing:commands",
                    "routing_handler_group",
                    "routing:replies",
                ),
                exploration: domain_routing(
                    "EXPLORATION",
                    "exploration:commands",
                    "exploration_handler_group",
                    "exploration:replies",
                ),
                map: domain_routing(
                    "MAP",
                    "map:commands",
                    "map_handler_group",
                    "map:replies",
                ),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let config = Config::from_env();
        assert_eq!(config.mission_topic, "mission:commands");
        assert_eq!(config.bus.pool_max_size, 16);
    }

    #[test]
    fn resources_domain_defaults_share_stream_but_not_group() {
        let config = Config::from_env();
        assert_eq!(config.domains.resources.stream, "resources:commands");
        assert_eq!(config.domains.resources.group, "resources_handler_group");
        assert_eq!(config.domains.resources.reply_prefix, "resources:replies");
        assert_eq!(config.domains.release_group, "resources_release_group");
        assert_ne!(config.domains.release_group, config.domains.resources.group);
    }
}
