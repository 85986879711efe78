//! Handler registry (§4.7): the static, composition-root-built list of
//! registered handlers the dispatcher hosts one consumer loop per.
//!
//! Per §9's design note, this replaces the reference source's package-scan
//! discovery with an explicit `Vec<HandlerDescriptor>` built by `main` —
//! tagged data, not dynamic lookup.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::wrapper::Fields;

/// The callable the dispatcher invokes per matched entry: already wrapped
/// with lifecycle-event emission by [`crate::wrapper::multi_stage_reply`]
/// (or any other `Fields → Result<(), RuntimeError>` callable, for handlers
/// that don't want the wrapper).
pub type Handler =
    Arc<dyn Fn(Fields) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send>> + Send + Sync>;

/// `{name, stream, group, event_type?, fn}` per §3.
#[derive(Clone)]
pub struct HandlerDescriptor {
    /// A human-readable name, used only in logs.
    pub name: String,
    /// The command topic this handler consumes.
    pub stream: String,
    /// The consumer group name for this handler's loop.
    pub group: String,
    /// When set, entries whose `event_type` differs are skipped unacked.
    pub event_type: Option<String>,
    /// The wrapped handler body.
    pub handler: Handler,
}

impl HandlerDescriptor {
    /// Build a descriptor. Per §4.7, a descriptor missing `stream`, `group`,
    /// or `fn` should be skipped with a warning by the registry builder —
    /// since those three are required constructor arguments here, that
    /// invalid state is unrepresentable rather than checked at runtime.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        stream: impl Into<String>,
        group: impl Into<String>,
        event_type: Option<String>,
        handler: Handler,
    ) -> Self {
        Self {
            name: name.into(),
            stream: stream.into(),
            group: group.into(),
            event_type,
            handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_carries_optional_event_type_filter() {
        let handler: Handler = Arc::new(|_fields| Box::pin(async { Ok(()) }));
        let with_filter = HandlerDescriptor::new(
            "allocate_resources",
            "resources:commands",
            "resources_worker_group",
            Some("resources:allocate".to_string()),
            Arc::clone(&handler),
        );
        let without_filter = HandlerDescriptor::new(
            "mission_trigger",
            "mission:commands",
            "mission_orchestrator_group",
            None,
            handler,
        );
        assert_eq!(with_filter.event_type.as_deref(), Some("resources:allocate"));
        assert!(without_filter.event_type.is_none());
    }
}
