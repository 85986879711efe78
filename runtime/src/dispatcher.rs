//! Handler registry & dispatcher (§4.7): hosts one long-lived consumer loop
//! per registered handler, all sharing a single bus connection, with
//! cooperative shutdown via a `tokio::sync::watch` channel in the manner of
//! a projection manager's event-processing loop.

use std::sync::Arc;
use std::time::Duration;

use saga_core::{Bus, GroupOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::RuntimeError;
use crate::registry::HandlerDescriptor;

/// Blocking-read timeout for each `read_group` poll.
const READ_BLOCK_MS: u64 = 1000;

/// Sleep applied after a `read_group` call itself fails, before retrying.
const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Entries requested per `read_group` call.
const READ_COUNT: usize = 10;

/// The consumer name every handler loop reads as. A single well-known name
/// is sufficient as long as each `HandlerDescriptor` is registered with a
/// consumer group no other descriptor reads the same stream under —
/// `Dispatcher` does not itself enforce that distinctness, so callers
/// building the registry are responsible for giving each handler its own
/// group whenever two handlers share a stream.
const CONSUMER_NAME: &str = "listener";

/// Hosts N concurrent consumer loops, one per registered handler.
pub struct Dispatcher {
    bus: Arc<dyn Bus>,
}

impl Dispatcher {
    /// Build a dispatcher over the given bus connection.
    #[must_use]
    pub const fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    /// Create the consumer group for every handler's (stream, group) pair,
    /// using `"$"` (only entries appended after group creation), per §6.4 /
    /// §9 item 2's production mandate.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Bus`] if a group could not be created.
    pub async fn prepare(&self, handlers: &[HandlerDescriptor]) -> Result<(), RuntimeError> {
        for descriptor in handlers {
            match self
                .bus
                .create_group(&descriptor.stream, &descriptor.group, "$")
                .await?
            {
                GroupOutcome::Created => {
                    tracing::info!(
                        handler = descriptor.name,
                        stream = descriptor.stream,
                        group = descriptor.group,
                        "created consumer group"
                    );
                }
                GroupOutcome::AlreadyExists => {
                    tracing::debug!(
                        handler = descriptor.name,
                        stream = descriptor.stream,
                        group = descriptor.group,
                        "consumer group already exists"
                    );
                }
            }
        }
        Ok(())
    }

    /// Spawn one consumer loop per handler, returning their join handles.
    /// Each loop exits on its next iteration after `shutdown` is set to
    /// `true`; in-flight handler invocations are allowed to finish so the
    /// ack/non-ack decision for that entry is never abandoned mid-flight.
    pub fn spawn(
        &self,
        handlers: Vec<HandlerDescriptor>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        handlers
            .into_iter()
            .map(|descriptor| {
                let bus = Arc::clone(&self.bus);
                let shutdown = shutdown.clone();
                tokio::spawn(run_handler_loop(bus, descriptor, shutdown))
            })
            .collect()
    }
}

async fn run_handler_loop(
    bus: Arc<dyn Bus>,
    descriptor: HandlerDescriptor,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        handler = descriptor.name,
        stream = descriptor.stream,
        group = descriptor.group,
        "starting handler loop"
    );

    while !*shutdown.borrow() {
        let read = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
            result = bus.read_group(
                &descriptor.stream,
                &descriptor.group,
                CONSUMER_NAME,
                ">",
                READ_COUNT,
                READ_BLOCK_MS,
            ) => result,
        };

        let response = match read {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    handler = descriptor.name,
                    error = %err,
                    "read_group failed, retrying"
                );
                tokio::time::sleep(TRANSIENT_ERROR_BACKOFF).await;
                continue;
            }
        };

        for (_, entries) in response {
            for entry in entries {
                let entry_event_type = entry.fields.get("event_type").map(String::as_str);
                if let Some(expected) = descriptor.event_type.as_deref() {
                    if entry_event_type != Some(expected) {
                        tracing::debug!(
                            handler = descriptor.name,
                            entry_id = entry.id,
                            event_type = entry_event_type,
                            "event-type filter mismatch, skipping without ack"
                        );
                        continue;
                    }
                }

                match (descriptor.handler)(entry.fields.clone()).await {
                    Ok(()) => {
                        if let Err(err) = bus.ack(&descriptor.stream, &descriptor.group, &entry.id).await {
                            tracing::warn!(
                                handler = descriptor.name,
                                entry_id = entry.id,
                                error = %err,
                                "ack failed after successful handler invocation"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            handler = descriptor.name,
                            entry_id = entry.id,
                            error = %err,
                            "handler invocation failed, entry left unacked for redelivery"
                        );
                    }
                }
            }
        }
    }

    tracing::info!(handler = descriptor.name, "handler loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_testing::InMemoryBus;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn command_fields(event_type: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("event_type".to_string(), event_type.to_string());
        fields.insert("correlation_id".to_string(), "c1".to_string());
        fields
    }

    #[tokio::test]
    async fn acks_entries_the_handler_accepts() {
        let bus = InMemoryBus::new();
        let bus_dyn: Arc<dyn Bus> = Arc::new(bus.clone());

        bus.append("resources:commands", command_fields("resources:allocate"), None)
            .await
            .unwrap();

        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_clone = Arc::clone(&invocations);
        let handler: crate::registry::Handler = Arc::new(move |_fields| {
            let invocations = Arc::clone(&invocations_clone);
            Box::pin(async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let descriptor = HandlerDescriptor::new(
            "allocate_resources",
            "resources:commands",
            "resources_worker_group",
            Some("resources:allocate".to_string()),
            handler,
        );

        let dispatcher = Dispatcher::new(Arc::clone(&bus_dyn));
        dispatcher.prepare(std::slice::from_ref(&descriptor)).await.unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = dispatcher.spawn(vec![descriptor], shutdown_rx);

        saga_testing::helpers::wait_until(StdDuration::from_secs(1), || {
            invocations.load(Ordering::SeqCst) >= 1
        })
        .await;
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn event_type_mismatch_skips_without_invoking_handler() {
        let bus = InMemoryBus::new();
        let bus_dyn: Arc<dyn Bus> = Arc::new(bus.clone());

        bus.append("resources:commands", command_fields("resources:other"), None)
            .await
            .unwrap();

        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_clone = Arc::clone(&invocations);
        let handler: crate::registry::Handler = Arc::new(move |_fields| {
            let invocations = Arc::clone(&invocations_clone);
            Box::pin(async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let descriptor = HandlerDescriptor::new(
            "allocate_resources",
            "resources:commands",
            "resources_worker_group",
            Some("resources:allocate".to_string()),
            handler,
        );

        let dispatcher = Dispatcher::new(Arc::clone(&bus_dyn));
        dispatcher.prepare(std::slice::from_ref(&descriptor)).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = dispatcher.spawn(vec![descriptor], shutdown_rx);

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn distinct_groups_on_shared_stream_each_receive_their_entries() {
        let bus = InMemoryBus::new();
        let bus_dyn: Arc<dyn Bus> = Arc::new(bus.clone());

        bus.append("resources:commands", command_fields("resources:allocate"), None)
            .await
            .unwrap();
        bus.append("resources:commands", command_fields("resources:release"), None)
            .await
            .unwrap();

        let allocate_invocations = Arc::new(AtomicUsize::new(0));
        let allocate_clone = Arc::clone(&allocate_invocations);
        let allocate_handler: crate::registry::Handler = Arc::new(move |_fields| {
            let invocations = Arc::clone(&allocate_clone);
            Box::pin(async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let release_invocations = Arc::new(AtomicUsize::new(0));
        let release_clone = Arc::clone(&release_invocations);
        let release_handler: crate::registry::Handler = Arc::new(move |_fields| {
            let invocations = Arc::clone(&release_clone);
            Box::pin(async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let allocate = HandlerDescriptor::new(
            "allocate_resources",
            "resources:commands",
            "resources_handler_group",
            Some("resources:allocate".to_string()),
            allocate_handler,
        );
        let release = HandlerDescriptor::new(
            "release_resources",
            "resources:commands",
            "resources_release_group",
            Some("resources:release".to_string()),
            release_handler,
        );
        assert_ne!(allocate.group, release.group, "handlers sharing a stream must read as distinct groups");

        let dispatcher = Dispatcher::new(Arc::clone(&bus_dyn));
        dispatcher.prepare(&[allocate.clone(), release.clone()]).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = dispatcher.spawn(vec![allocate, release], shutdown_rx);

        saga_testing::helpers::wait_until(StdDuration::from_secs(1), || {
            allocate_invocations.load(Ordering::SeqCst) >= 1 && release_invocations.load(Ordering::SeqCst) >= 1
        })
        .await;

        assert_eq!(allocate_invocations.load(Ordering::SeqCst), 1);
        assert_eq!(release_invocations.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
