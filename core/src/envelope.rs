//! The stream entry envelope: the field map carried by every bus entry.
//!
//! An entry is either a **command** (carries `event_type` and `reply_stream`,
//! no `status`) or an **event** (carries `status`, no `reply_stream`). Both
//! kinds share the same wire shape — a flat string-to-string field map — so
//! [`Envelope`] models both and leaves the distinction to which fields are
//! present.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding an envelope's field map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// A field required by the entry's kind was absent.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// `status` held a value outside `start|progress|completed|failed`.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// `payload` was present but not valid JSON.
    #[error("invalid payload JSON: {0}")]
    InvalidPayload(String),
}

/// The four-stage lifecycle an event entry reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The handler has begun executing.
    Start,
    /// An intermediate progress report.
    Progress,
    /// The handler returned successfully. Terminal.
    Completed,
    /// The handler raised an error. Terminal.
    Failed,
}

impl Status {
    /// True for `Completed` and `Failed`: no further event follows.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "progress" => Ok(Self::Progress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(EnvelopeError::InvalidStatus(other.to_string())),
        }
    }
}

/// A stream entry's field map plus its server-assigned id, once known.
///
/// Keys are kept in a [`BTreeMap`] rather than a `HashMap` so that
/// iteration order (and therefore log output and test fixtures) is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    fields: BTreeMap<String, String>,
}

impl Envelope {
    /// Build the envelope for a command entry per §6.1: `correlation_id`,
    /// `saga_id`, `event_type`, `payload` and `timestamp` are required;
    /// `request_id`, `traceparent`, and `reply_stream` are optional here and
    /// set separately (see [`Envelope::with_reply_stream`] and friends) since
    /// not every command is part of a request/reply exchange.
    #[must_use]
    pub fn command(
        correlation_id: &str,
        saga_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("correlation_id".to_string(), correlation_id.to_string());
        fields.insert("saga_id".to_string(), saga_id.to_string());
        fields.insert("event_type".to_string(), event_type.to_string());
        fields.insert("payload".to_string(), payload.to_string());
        fields.insert("timestamp".to_string(), Utc::now().timestamp().to_string());
        Self { fields }
    }

    /// Build the envelope for an event entry per §6.1: `correlation_id`,
    /// `saga_id`, `event_type`, `status`, `payload`, and `timestamp` are all
    /// required.
    #[must_use]
    pub fn event(
        correlation_id: &str,
        saga_id: Option<&str>,
        event_type: &str,
        status: Status,
        payload: &serde_json::Value,
    ) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("correlation_id".to_string(), correlation_id.to_string());
        if let Some(saga_id) = saga_id {
            fields.insert("saga_id".to_string(), saga_id.to_string());
        }
        fields.insert("event_type".to_string(), event_type.to_string());
        fields.insert("status".to_string(), status.to_string());
        fields.insert("payload".to_string(), payload.to_string());
        fields.insert("timestamp".to_string(), Utc::now().timestamp().to_string());
        Self { fields }
    }

    /// Wrap a field map already read off the bus (e.g. from `read_group`).
    #[must_use]
    pub const fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Consume the envelope, returning its raw field map for `append`.
    #[must_use]
    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    /// Borrow the raw field map.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Attach `request_id` and derive `traceparent = request_id` if the
    /// caller has not set one explicitly, matching the reference behavior
    /// of stamping the request id through as the trace context.
    #[must_use]
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.fields
            .insert("request_id".to_string(), request_id.to_string());
        self.fields
            .entry("traceparent".to_string())
            .or_insert_with(|| request_id.to_string());
        self
    }

    /// Attach the reply stream a callee must emit lifecycle events to.
    #[must_use]
    pub fn with_reply_stream(mut self, reply_stream: &str) -> Self {
        self.fields
            .insert("reply_stream".to_string(), reply_stream.to_string());
        self
    }

    /// Read a required field, raising [`EnvelopeError::MissingField`] if absent.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MissingField`] if `key` is not present.
    pub fn require(&self, key: &str) -> Result<&str, EnvelopeError> {
        self.fields
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| EnvelopeError::MissingField(key.to_string()))
    }

    /// Read an optional field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Convenience accessor: `correlation_id` (required on both kinds).
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MissingField`] if absent.
    pub fn correlation_id(&self) -> Result<&str, EnvelopeError> {
        self.require("correlation_id")
    }

    /// Convenience accessor: `event_type` (required on both kinds).
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MissingField`] if absent.
    pub fn event_type(&self) -> Result<&str, EnvelopeError> {
        self.require("event_type")
    }

    /// Convenience accessor: `request_id`, when present.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.get("request_id")
    }

    /// Convenience accessor: `saga_id`, when present.
    #[must_use]
    pub fn saga_id(&self) -> Option<&str> {
        self.get("saga_id")
    }

    /// Convenience accessor: `reply_stream`, when present.
    #[must_use]
    pub fn reply_stream(&self) -> Option<&str> {
        self.get("reply_stream")
    }

    /// Parse and return `status`, when present.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidStatus`] if `status` is set to a value
    /// outside `start|progress|completed|failed`.
    pub fn status(&self) -> Result<Option<Status>, EnvelopeError> {
        self.get("status").map(Status::from_str).transpose()
    }

    /// Parse `payload` as JSON. Absent payload decodes to `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidPayload`] if `payload` is present but
    /// not valid JSON.
    pub fn payload(&self) -> Result<serde_json::Value, EnvelopeError> {
        match self.get("payload") {
            None => Ok(serde_json::Value::Null),
            Some(text) => {
                serde_json::from_str(text).map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_field_map() {
        let payload = serde_json::json!({"n": 2});
        let env = Envelope::command("c1", "s1", "resources:allocate", &payload)
            .with_request_id("r1")
            .with_reply_stream("resources:replies:r1");

        let fields = env.into_fields();
        let decoded = Envelope::from_fields(fields);

        assert_eq!(decoded.correlation_id().unwrap(), "c1");
        assert_eq!(decoded.saga_id(), Some("s1"));
        assert_eq!(decoded.event_type().unwrap(), "resources:allocate");
        assert_eq!(decoded.request_id(), Some("r1"));
        assert_eq!(decoded.reply_stream(), Some("resources:replies:r1"));
        assert_eq!(decoded.get("traceparent"), Some("r1"));
        assert_eq!(decoded.payload().unwrap(), payload);
        assert!(decoded.status().unwrap().is_none());
    }

    #[test]
    fn event_carries_status_and_no_reply_stream() {
        let env = Envelope::event(
            "c1",
            Some("s1"),
            "resources:allocate",
            Status::Completed,
            &serde_json::json!({"robots_allocated": 2}),
        );
        assert_eq!(env.status().unwrap(), Some(Status::Completed));
        assert!(env.reply_stream().is_none());
    }

    #[test]
    fn missing_correlation_id_is_missing_field() {
        let env = Envelope::from_fields(BTreeMap::new());
        let err = env.correlation_id().unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("correlation_id".to_string()));
    }

    #[test]
    fn invalid_status_is_rejected() {
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), "bogus".to_string());
        let env = Envelope::from_fields(fields);
        assert!(matches!(env.status(), Err(EnvelopeError::InvalidStatus(_))));
    }

    #[test]
    fn status_terminal_classification() {
        assert!(!Status::Start.is_terminal());
        assert!(!Status::Progress.is_terminal());
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
    }
}
