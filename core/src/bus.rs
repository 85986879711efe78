//! The bus client adapter seam: a thin semantic wrapper over a log-structured
//! message bus with consumer groups.
//!
//! [`Bus`] is deliberately narrow — append, create-group, read-group, ack —
//! mirroring standard log-bus consumer-group primitives rather than any one
//! vendor's API. [`crate::environment`] carries the injected-dependency
//! convention this trait follows.
//!
//! # Dyn Compatibility
//!
//! Like the reducer system's event bus seam, this trait uses explicit
//! `Pin<Box<dyn Future>>` returns instead of `async fn` so it can be used as
//! `Arc<dyn Bus>` — every dispatcher loop and saga executor shares one
//! connection through a trait object.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Errors raised by a [`Bus`] implementation.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// The adapter could not reach the bus at all (startup or reconnect).
    #[error("bus connection failed: {0}")]
    ConnectionFailed(String),

    /// A recoverable failure on a single call — the caller's retry loop
    /// should sleep and try again rather than treat this as fatal.
    #[error("transient bus error: {0}")]
    Transient(String),

    /// The bus responded in a way this adapter could not interpret.
    #[error("bus protocol error: {0}")]
    Protocol(String),
}

/// Outcome of [`Bus::create_group`]. Duplicate creation is not an error —
/// per §3, groups are created lazily and repeat creation against an existing
/// (stream, group) pair is a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// The group did not exist and was created.
    Created,
    /// The group already existed; nothing was done.
    AlreadyExists,
}

/// A single entry read back from `read_group`: its server-assigned id and
/// field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// The server-assigned, monotonically-ordered entry id.
    pub id: String,
    /// The entry's field map (see [`crate::envelope::Envelope`]).
    pub fields: BTreeMap<String, String>,
}

/// Entries returned from `read_group`, grouped by stream (a single call may
/// span multiple streams for bus implementations that support it; this
/// runtime only ever reads one stream per call but keeps the shape general).
pub type ReadGroupResponse = Vec<(String, Vec<StreamEntry>)>;

/// Trait for bus client adapters.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: a single connection is shared
/// across every handler loop and saga executor (§5).
pub trait Bus: Send + Sync {
    /// Append an entry to `stream`, returning its server-assigned id.
    ///
    /// `max_len` requests approximate trimming of the stream to bound its
    /// size; implementations may round this up for efficiency.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the append could not be performed.
    fn append(
        &self,
        stream: &str,
        fields: BTreeMap<String, String>,
        max_len: Option<usize>,
    ) -> Pin<Box<dyn Future<Output = Result<String, BusError>> + Send + '_>>;

    /// Idempotently create a consumer group on `stream` starting at `start_id`
    /// (`"$"` for new entries only, `"0"` to replay history).
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] for failures other than the group already
    /// existing, which is reported as `Ok(GroupOutcome::AlreadyExists)`.
    fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GroupOutcome, BusError>> + Send + '_>>;

    /// Read up to `count` entries as `consumer` in `group` on `stream`,
    /// starting from `from_id` (`">"` for only-undelivered), blocking up to
    /// `block_ms` when nothing is available.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the read could not be performed.
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        from_id: &str,
        count: usize,
        block_ms: u64,
    ) -> Pin<Box<dyn Future<Output = Result<ReadGroupResponse, BusError>> + Send + '_>>;

    /// Acknowledge `entry_id` as processed in `group` on `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the acknowledgment could not be performed.
    fn ack(
        &self,
        stream: &str,
        group: &str,
        entry_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn bus_trait_object_is_send_sync() {
        assert_send_sync::<std::sync::Arc<dyn Bus>>();
    }

    #[test]
    fn group_outcome_equality() {
        assert_eq!(GroupOutcome::Created, GroupOutcome::Created);
        assert_ne!(GroupOutcome::Created, GroupOutcome::AlreadyExists);
    }
}
