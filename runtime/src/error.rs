//! Error taxonomy for the runtime layer (§7): reply timeouts, handler
//! failures, missing envelope fields, and compensation failures. Bus-level
//! errors ([`saga_core::BusError`]) convert into [`RuntimeError::Bus`] so
//! callers can match on a single error type end to end.

use saga_core::{BusError, EnvelopeError};
use thiserror::Error;

/// Errors raised by the runtime layer.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// No `completed` event arrived on the reply stream within the timeout.
    #[error("reply timeout: no completed reply for correlation_id={correlation_id}, request_id={request_id} within {timeout_secs}s")]
    ReplyTimeout {
        /// The saga-wide correlation id of the pending exchange.
        correlation_id: String,
        /// The request id of the pending exchange.
        request_id: String,
        /// The timeout budget that elapsed.
        timeout_secs: f64,
    },

    /// A wrapped step handler raised an error.
    #[error("handler error: {0}")]
    HandlerError(String),

    /// A required envelope field was absent.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A compensation callable raised an error. Logged by the saga executor
    /// and never propagated — this variant exists so compensations can
    /// report failure through the same `Result` shape as everything else.
    #[error("compensation error: {0}")]
    CompensationError(String),

    /// A bus operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<EnvelopeError> for RuntimeError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::MissingField(field) => Self::MissingField(field),
            other => Self::HandlerError(other.to_string()),
        }
    }
}
