//! # Saga Core
//!
//! Core traits and types for the saga orchestration runtime: the entry
//! envelope (§3, §6.1), the bus client seam ([`bus::Bus`]), and the injected
//! dependencies (`environment`) that the rest of the runtime is built
//! against.
//!
//! ## Architecture
//!
//! The runtime treats the bus as an external collaborator: [`bus::Bus`] is
//! the only thing downstream crates depend on, so [`saga-bus`](../saga_bus)
//! can be swapped for a test double ([`saga-testing`](../saga_testing)'s
//! `InMemoryBus`) without touching dispatcher, coordinator, or saga logic.

pub mod bus;
pub mod envelope;

/// Injected-dependency traits — the seam through which the rest of the
/// runtime gets time, matching the reducer system's `Clock` convention so
/// tests can swap a fixed clock for the system clock.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Abstracts wall-clock access for testability.
    pub trait Clock: Send + Sync {
        /// The current time.
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use bus::{Bus, BusError, GroupOutcome, ReadGroupResponse, StreamEntry};
pub use envelope::{Envelope, EnvelopeError, Status};
