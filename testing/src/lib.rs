//! # Saga Testing
//!
//! In-memory fakes and test helpers for the saga orchestration runtime:
//! a [`mocks::FixedClock`] for deterministic timestamps and
//! [`mocks::InMemoryBus`], a [`saga_core::Bus`] implementation backed by
//! `tokio::sync::Mutex`-guarded in-process streams, so the dispatcher, reply
//! reader, and saga executor are all testable without a live Redis instance.
//!
//! ## Example
//!
//! ```
//! use saga_testing::mocks::InMemoryBus;
//! use saga_core::Bus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = InMemoryBus::new();
//! let mut fields = std::collections::BTreeMap::new();
//! fields.insert("event_type".to_string(), "resources:allocate".to_string());
//! let id = bus.append("resources:commands", fields, None).await.unwrap();
//! assert!(!id.is_empty());
//! # }
//! ```

use chrono::{DateTime, Utc};
use saga_core::environment::Clock;

/// Mock implementations of injected dependencies: a deterministic clock and
/// an in-memory bus.
pub mod mocks {
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    use saga_core::{Bus, BusError, GroupOutcome, ReadGroupResponse, StreamEntry};
    use tokio::sync::Mutex;

    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests — always returns the same time.
    ///
    /// ```
    /// use saga_testing::mocks::FixedClock;
    /// use saga_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a fixed clock returning `time` from every call to `now`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should never
    /// happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    #[derive(Default)]
    struct StreamState {
        entries: Vec<StreamEntry>,
        groups: BTreeMap<String, GroupCursor>,
        next_id: u64,
    }

    #[derive(Default, Clone)]
    struct GroupCursor {
        next_index: usize,
    }

    /// An in-process [`Bus`] backed by `Vec<StreamEntry>` per stream name,
    /// guarded by a `tokio::sync::Mutex`. `read_group` never actually blocks
    /// for `block_ms`: it returns immediately with whatever is available (or
    /// empty), which is sufficient for driving the reply reader's retry loop
    /// deterministically in tests.
    ///
    /// Delivery is at-least-once like the real adapter: each group cursor
    /// independently tracks how many entries of the stream it has delivered,
    /// and `ack` is a no-op bookkeeping call since nothing is redelivered
    /// without an explicit reset.
    #[derive(Clone, Default)]
    pub struct InMemoryBus {
        streams: Arc<Mutex<BTreeMap<String, StreamState>>>,
    }

    impl InMemoryBus {
        /// Create an empty bus.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Bus for InMemoryBus {
        fn append(
            &self,
            stream: &str,
            fields: BTreeMap<String, String>,
            _max_len: Option<usize>,
        ) -> Pin<Box<dyn Future<Output = Result<String, BusError>> + Send + '_>> {
            let stream = stream.to_string();
            Box::pin(async move {
                let mut streams = self.streams.lock().await;
                let state = streams.entry(stream).or_default();
                state.next_id += 1;
                let id = format!("{}-0", state.next_id);
                state.entries.push(StreamEntry {
                    id: id.clone(),
                    fields,
                });
                Ok(id)
            })
        }

        fn create_group(
            &self,
            stream: &str,
            group: &str,
            _start_id: &str,
        ) -> Pin<Box<dyn Future<Output = Result<GroupOutcome, BusError>> + Send + '_>> {
            let stream = stream.to_string();
            let group = group.to_string();
            Box::pin(async move {
                let mut streams = self.streams.lock().await;
                let state = streams.entry(stream).or_default();
                if state.groups.contains_key(&group) {
                    Ok(GroupOutcome::AlreadyExists)
                } else {
                    state.groups.insert(group, GroupCursor::default());
                    Ok(GroupOutcome::Created)
                }
            })
        }

        fn read_group(
            &self,
            stream: &str,
            group: &str,
            _consumer: &str,
            _from_id: &str,
            count: usize,
            _block_ms: u64,
        ) -> Pin<Box<dyn Future<Output = Result<ReadGroupResponse, BusError>> + Send + '_>> {
            let stream = stream.to_string();
            let group = group.to_string();
            Box::pin(async move {
                let mut streams = self.streams.lock().await;
                let state = streams.entry(stream.clone()).or_default();
                let cursor = state.groups.entry(group).or_default();
                let available = &state.entries[cursor.next_index.min(state.entries.len())..];
                let taken: Vec<_> = available.iter().take(count).cloned().collect();
                cursor.next_index += taken.len();
                if taken.is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok(vec![(stream, taken)])
                }
            })
        }

        fn ack(
            &self,
            _stream: &str,
            _group: &str,
            _entry_id: &str,
        ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
            Box::pin(async move { Ok(()) })
        }
    }
}

/// Test helpers layered on top of [`mocks`] — scenario builders for
/// exercising the dispatcher and saga executor end to end.
pub mod helpers {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use saga_core::Bus;

    use crate::mocks::InMemoryBus;

    /// Append a bare command entry to `stream` for test setup, returning the
    /// assigned entry id.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory bus append fails, which it never does.
    pub async fn seed_command(
        bus: &InMemoryBus,
        stream: &str,
        fields: BTreeMap<String, String>,
    ) -> String {
        bus.append(stream, fields, None)
            .await
            .expect("in-memory bus append is infallible")
    }

    /// Poll `predicate` against the bus every 5ms until it returns true or
    /// `timeout` elapses, for asserting on dispatcher/saga side effects that
    /// land asynchronously in background tasks.
    pub async fn wait_until<F>(timeout: Duration, mut predicate: F)
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while !predicate() {
            if tokio::time::Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Property-based testing utilities. `saga-runtime`'s retry-policy
/// monotonicity check is the only `proptest` usage in the workspace and
/// lives alongside `retry.rs`'s own test code; this module is reserved for
/// cross-cutting generators if this crate ever needs its own.
pub mod properties {}

pub use mocks::{FixedClock, InMemoryBus, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use saga_core::Bus;
    use std::collections::BTreeMap;

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[tokio::test]
    async fn in_memory_bus_round_trips_append_and_read() {
        let bus = InMemoryBus::new();
        let mut fields = BTreeMap::new();
        fields.insert("event_type".to_string(), "resources:allocate".to_string());
        bus.append("resources:commands", fields, None).await.unwrap();

        bus.create_group("resources:commands", "resources_worker_group", "$")
            .await
            .unwrap();
        let response = bus
            .read_group(
                "resources:commands",
                "resources_worker_group",
                "listener",
                ">",
                10,
                0,
            )
            .await
            .unwrap();

        assert_eq!(response.len(), 1);
        let (_, entries) = &response[0];
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].fields.get("event_type").map(String::as_str),
            Some("resources:allocate")
        );
    }

    #[tokio::test]
    async fn create_group_twice_reports_already_exists() {
        let bus = InMemoryBus::new();
        let first = bus.create_group("s", "g", "$").await.unwrap();
        let second = bus.create_group("s", "g", "$").await.unwrap();
        assert_eq!(first, saga_core::GroupOutcome::Created);
        assert_eq!(second, saga_core::GroupOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn independent_groups_each_see_all_entries() {
        let bus = InMemoryBus::new();
        let mut fields = BTreeMap::new();
        fields.insert("k".to_string(), "v".to_string());
        bus.append("s", fields, None).await.unwrap();

        bus.create_group("s", "group-a", "$").await.unwrap();
        bus.create_group("s", "group-b", "$").await.unwrap();

        let a = bus.read_group("s", "group-a", "c", ">", 10, 0).await.unwrap();
        let b = bus.read_group("s", "group-b", "c", ">", 10, 0).await.unwrap();
        assert_eq!(a[0].1.len(), 1);
        assert_eq!(b[0].1.len(), 1);
    }
}
