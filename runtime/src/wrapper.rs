//! Multi-stage reply wrapper (§4.6): decorates a step handler so invocation
//! emits `start`, optional `progress`, and a terminal `completed`/`failed`
//! on the command's nominated reply stream.
//!
//! Per the design notes (§9), the decorator is modeled as a constructor
//! (`multi_stage_reply`) that takes the inner handler and returns a plain
//! async closure implementing the same interface the dispatcher invokes —
//! not a macro, and not a trait object wrapping another trait object.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use saga_core::{Bus, Envelope, Status};

use crate::error::RuntimeError;

/// A handle for emitting `progress` events, bound to the command fields it
/// was built from. Modeled as a single-method interface per §9's design
/// note.
#[derive(Clone)]
pub struct ProgressReporter {
    bus: Arc<dyn Bus>,
    reply_stream: String,
    correlation_id: String,
    saga_id: Option<String>,
    event_type: String,
}

impl ProgressReporter {
    /// Emit a `progress` event with body `{fraction, ...extra}`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Bus`] if the event could not be appended.
    pub async fn report(
        &self,
        fraction: f64,
        extra: Option<serde_json::Value>,
    ) -> Result<(), RuntimeError> {
        let mut payload = serde_json::json!({ "fraction": fraction });
        if let Some(serde_json::Value::Object(extra)) = extra {
            if let serde_json::Value::Object(map) = &mut payload {
                map.extend(extra);
            }
        }
        let envelope = Envelope::event(
            &self.correlation_id,
            self.saga_id.as_deref(),
            &self.event_type,
            Status::Progress,
            &payload,
        );
        self.bus
            .append(&self.reply_stream, envelope.into_fields(), None)
            .await?;
        Ok(())
    }
}

/// The fields a handler receives plus the lifecycle sink it reports
/// through, matching the reference source's `fields` argument.
pub type Fields = std::collections::BTreeMap<String, String>;

/// A step handler body: given the command's fields and a progress sink,
/// returns a JSON result (or an error). Handlers that don't care about
/// progress simply ignore the second argument.
pub trait StepFn: Send + Sync {
    /// Run the handler.
    fn call(
        &self,
        fields: Fields,
        progress: ProgressReporter,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, RuntimeError>> + Send>>;
}

impl<F, Fut> StepFn for F
where
    F: Fn(Fields, ProgressReporter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, RuntimeError>> + Send + 'static,
{
    fn call(
        &self,
        fields: Fields,
        progress: ProgressReporter,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, RuntimeError>> + Send>> {
        Box::pin(self(fields, progress))
    }
}

/// Wrap `step` so that invoking it emits the full `start` → `progress*` →
/// `completed`|`failed` lifecycle (§4.6) on the command's `reply_stream`,
/// or — if `reply_stream` is absent — runs `step` directly and suppresses
/// event emission entirely.
///
/// The returned closure is what the dispatcher (§4.7) actually invokes: it
/// always resolves to `Ok(())` or a [`RuntimeError::HandlerError`], having
/// already emitted the matching terminal event as a side effect.
pub fn multi_stage_reply(
    bus: Arc<dyn Bus>,
    step: Arc<dyn StepFn>,
) -> impl Fn(Fields) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send>> {
    move |fields: Fields| {
        let bus = Arc::clone(&bus);
        let step = Arc::clone(&step);
        Box::pin(async move {
            let Some(reply_stream) = fields.get("reply_stream").cloned() else {
                tracing::debug!("skipping event emission: missing reply_stream");
                let reporter = ProgressReporter {
                    bus: Arc::clone(&bus),
                    reply_stream: String::new(),
                    correlation_id: fields.get("correlation_id").cloned().unwrap_or_default(),
                    saga_id: fields.get("saga_id").cloned(),
                    event_type: fields.get("event_type").cloned().unwrap_or_default(),
                };
                step.call(fields, reporter).await.map(|_| ())?;
                return Ok(());
            };

            let correlation_id = fields.get("correlation_id").cloned().unwrap_or_default();
            let saga_id = fields.get("saga_id").cloned();
            let event_type = fields.get("event_type").cloned().unwrap_or_default();

            let reporter = ProgressReporter {
                bus: Arc::clone(&bus),
                reply_stream: reply_stream.clone(),
                correlation_id: correlation_id.clone(),
                saga_id: saga_id.clone(),
                event_type: event_type.clone(),
            };

            let start_event = Envelope::event(
                &correlation_id,
                saga_id.as_deref(),
                &event_type,
                Status::Start,
                &serde_json::json!({}),
            );
            bus.append(&reply_stream, start_event.into_fields(), None)
                .await?;

            match step.call(fields, reporter).await {
                Ok(result) => {
                    let payload = if result.is_object() {
                        result
                    } else if result.is_null() {
                        serde_json::json!({})
                    } else {
                        serde_json::json!({ "result": result })
                    };
                    let completed = Envelope::event(
                        &correlation_id,
                        saga_id.as_deref(),
                        &event_type,
                        Status::Completed,
                        &payload,
                    );
                    bus.append(&reply_stream, completed.into_fields(), None)
                        .await?;
                    Ok(())
                }
                Err(err) => {
                    let failed = Envelope::event(
                        &correlation_id,
                        saga_id.as_deref(),
                        &event_type,
                        Status::Failed,
                        &serde_json::json!({ "error": err.to_string() }),
                    );
                    bus.append(&reply_stream, failed.into_fields(), None)
                        .await?;
                    Err(RuntimeError::HandlerError(err.to_string()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_testing::InMemoryBus;
    use std::collections::BTreeMap;

    fn command_fields(reply_stream: &str) -> Fields {
        let mut fields = BTreeMap::new();
        fields.insert("correlation_id".to_string(), "c1".to_string());
        fields.insert("saga_id".to_string(), "s1".to_string());
        fields.insert("event_type".to_string(), "resources:allocate".to_string());
        fields.insert("reply_stream".to_string(), reply_stream.to_string());
        fields
    }

    async fn all_entries(bus: &InMemoryBus, stream: &str) -> Vec<BTreeMap<String, String>> {
        bus.create_group(stream, "inspect", "0").await.unwrap();
        let response = bus
            .read_group(stream, "inspect", "c", ">", 100, 0)
            .await
            .unwrap();
        response
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .map(|e| e.fields)
            .collect()
    }

    #[tokio::test]
    async fn successful_handler_emits_start_then_completed() {
        let concrete_bus = InMemoryBus::new();
        let bus: Arc<dyn Bus> = Arc::new(concrete_bus.clone());
        let step: Arc<dyn StepFn> =
            Arc::new(|_fields: Fields, _progress: ProgressReporter| async move {
                Ok(serde_json::json!({ "robots_allocated": 2 }))
            });
        let wrapped = multi_stage_reply(Arc::clone(&bus), step);

        let reply_stream = "resources:replies:r1";
        wrapped(command_fields(reply_stream)).await.unwrap();

        let entries = all_entries(&concrete_bus, reply_stream).await;
        let statuses: Vec<_> = entries
            .iter()
            .map(|f| f.get("status").cloned().unwrap_or_default())
            .collect();
        assert_eq!(statuses, vec!["start", "completed"]);
        assert_eq!(
            entries[1].get("payload").cloned(),
            Some(serde_json::json!({ "robots_allocated": 2 }).to_string())
        );
    }

    #[tokio::test]
    async fn failing_handler_emits_failed_and_propagates_error() {
        let concrete_bus = InMemoryBus::new();
        let bus: Arc<dyn Bus> = Arc::new(concrete_bus.clone());
        let step: Arc<dyn StepFn> =
            Arc::new(|_fields: Fields, _progress: ProgressReporter| async move {
                Err(RuntimeError::HandlerError("boom".to_string()))
            });
        let wrapped = multi_stage_reply(Arc::clone(&bus), step);

        let reply_stream = "resources:replies:r2";
        let result = wrapped(command_fields(reply_stream)).await;
        assert!(result.is_err());

        let entries = all_entries(&concrete_bus, reply_stream).await;
        let statuses: Vec<_> = entries
            .iter()
            .map(|f| f.get("status").cloned().unwrap_or_default())
            .collect();
        assert_eq!(statuses, vec!["start", "failed"]);
    }

    #[tokio::test]
    async fn missing_reply_stream_suppresses_event_emission() {
        let concrete_bus = InMemoryBus::new();
        let bus: Arc<dyn Bus> = Arc::new(concrete_bus.clone());
        let step: Arc<dyn StepFn> =
            Arc::new(|_fields: Fields, _progress: ProgressReporter| async move {
                Ok(serde_json::Value::Null)
            });
        let wrapped = multi_stage_reply(Arc::clone(&bus), step);

        let mut fields = BTreeMap::new();
        fields.insert("correlation_id".to_string(), "c1".to_string());
        wrapped(fields).await.unwrap();

        // Nothing was appended anywhere observable since no reply_stream existed.
        let entries = all_entries(&concrete_bus, "resources:replies:none").await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn progress_reports_are_emitted_between_start_and_completed() {
        let concrete_bus = InMemoryBus::new();
        let bus: Arc<dyn Bus> = Arc::new(concrete_bus.clone());
        let step: Arc<dyn StepFn> =
            Arc::new(|_fields: Fields, progress: ProgressReporter| async move {
                progress.report(0.5, None).await?;
                Ok(serde_json::json!({ "done": true }))
            });
        let wrapped = multi_stage_reply(Arc::clone(&bus), step);

        let reply_stream = "resources:replies:r3";
        wrapped(command_fields(reply_stream)).await.unwrap();

        let entries = all_entries(&concrete_bus, reply_stream).await;
        let statuses: Vec<_> = entries
            .iter()
            .map(|f| f.get("status").cloned().unwrap_or_default())
            .collect();
        assert_eq!(statuses, vec!["start", "progress", "completed"]);
    }
}
