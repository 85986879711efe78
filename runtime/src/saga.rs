//! Saga executor (§4.8): runs a sequence of steps via `request_and_reply`,
//! and on a mid-sequence failure compensates completed steps in reverse
//! order on a best-effort basis, grounded on the reference source's
//! `mission_start_async/orchestrator.py` compensation flow.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use saga_core::Bus;
use serde_json::Value;

use crate::coordinator::request_and_reply;
use crate::error::RuntimeError;

/// Accumulated context threaded through a saga run: the correlation id and
/// the field map each completed step replied with, keyed by step name, so a
/// later step's payload builder can reference an earlier step's result.
#[derive(Clone, Debug, Default)]
pub struct SagaContext {
    /// The correlation id shared by every step in this saga instance.
    pub correlation_id: String,
    /// Reply fields from each step completed so far, keyed by step name.
    pub results: BTreeMap<String, BTreeMap<String, String>>,
}

impl SagaContext {
    /// Start a context for a fresh saga run.
    #[must_use]
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            results: BTreeMap::new(),
        }
    }

    /// Look up a prior step's reply field by step name and field key.
    #[must_use]
    pub fn field(&self, step_name: &str, key: &str) -> Option<&str> {
        self.results.get(step_name)?.get(key).map(String::as_str)
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A compensation action for a completed step: given the correlation id,
/// saga id, and the accumulated context, undo the step's effect.
pub type Compensation =
    Arc<dyn Fn(String, String, SagaContext) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

/// A payload builder: given the accumulated context, construct the JSON
/// payload for this step's command.
pub type PayloadBuilder = Arc<dyn Fn(&SagaContext) -> Value + Send + Sync>;

/// One step of a saga, per §4.8: a command/reply round trip plus its
/// best-effort undo action.
#[derive(Clone)]
pub struct SagaStep {
    /// Human-readable step name, used as the results key and in logs.
    pub name: String,
    /// The command stream this step's request is appended to.
    pub command_stream: String,
    /// The reply-stream prefix this step's request/reply round trip uses.
    pub reply_prefix: String,
    /// The `event_type` carried on the command envelope.
    pub event_type: String,
    /// Builds the command payload from the saga's accumulated context.
    pub payload_builder: PayloadBuilder,
    /// Best-effort compensation, invoked in reverse order on a later
    /// step's failure.
    pub compensation: Compensation,
    /// Per-step timeout for the request/reply round trip.
    pub timeout: Duration,
}

/// Error raised when a saga step fails; carries the step name and the
/// underlying cause so callers can log which step broke the chain.
#[derive(Debug, Clone, thiserror::Error)]
#[error("saga step '{step_name}' failed: {source}")]
pub struct SagaStepError {
    /// The step that failed.
    pub step_name: String,
    /// The underlying error.
    #[source]
    pub source: RuntimeError,
}

/// Generate a short random saga id, matching the reference source's
/// shortened correlation-style identifiers used for saga instances.
#[must_use]
pub fn generate_saga_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let raw = rand::random::<u64>();
    (0..8)
        .map(|i| ALPHABET[((raw >> (i * 6)) % ALPHABET.len() as u64) as usize] as char)
        .collect()
}

/// Run `steps` in order against `bus`. On any step's [`RuntimeError`]
/// (anything other than the coordinator's built-in timeout degradation,
/// which already resolves to `Ok`), compensates every completed step in
/// reverse order, best-effort, and then returns [`SagaStepError`] for the
/// step that actually failed.
///
/// # Errors
///
/// Returns [`SagaStepError`] if any step's request/reply round trip itself
/// errors (as opposed to merely timing out, which is not an error per
/// §4.5). Compensation failures are logged but never override the
/// original step error.
pub async fn run_saga(
    bus: &dyn Bus,
    correlation_id: &str,
    steps: &[SagaStep],
) -> Result<SagaContext, SagaStepError> {
    let saga_id = generate_saga_id();
    let mut context = SagaContext::new(correlation_id);
    let mut completed: Vec<&SagaStep> = Vec::new();

    for step in steps {
        let payload = (step.payload_builder)(&context);
        let result = request_and_reply(
            bus,
            &step.command_stream,
            &step.reply_prefix,
            correlation_id,
            &saga_id,
            &step.event_type,
            &payload,
            step.timeout,
        )
        .await;

        match result {
            Ok(fields) => {
                context.results.insert(step.name.clone(), fields);
                completed.push(step);
            }
            Err(source) => {
                tracing::error!(
                    saga_id,
                    step = step.name,
                    error = %source,
                    "saga step failed, starting compensation"
                );
                compensate(completed, correlation_id, &saga_id, context.clone()).await;
                return Err(SagaStepError {
                    step_name: step.name.clone(),
                    source,
                });
            }
        }
    }

    Ok(context)
}

async fn compensate(
    completed: Vec<&SagaStep>,
    correlation_id: &str,
    saga_id: &str,
    context: SagaContext,
) {
    for step in completed.into_iter().rev() {
        tracing::info!(saga_id, step = step.name, "compensating step");
        let outcome = (step.compensation)(
            correlation_id.to_string(),
            saga_id.to_string(),
            context.clone(),
        )
        .await;
        if let Err(err) = outcome {
            tracing::warn!(
                saga_id,
                step = step.name,
                error = %err,
                "compensation failed, continuing best-effort"
            );
        }
    }
}
