//! # Saga Runtime
//!
//! Runtime for the saga orchestration system: request/reply coordination
//! over a log-structured bus, a multi-stage reply lifecycle wrapper for
//! step handlers, a consumer-group dispatcher, and a saga executor with
//! best-effort reverse-order compensation.
//!
//! ## Core Components
//!
//! - [`retry`]: pure retry-decision policies (`RetryStrategy`)
//! - [`reply`]: blocks for a command's `completed` reply on its reply stream
//! - [`coordinator`]: mints a request id and runs one request/reply round trip
//! - [`wrapper`]: decorates a step handler with `start`/`progress`/terminal events
//! - [`registry`] / [`dispatcher`]: the handler registry and its consumer loops
//! - [`saga`]: runs a sequence of steps with compensation on failure
//!
//! ## Example
//!
//! ```ignore
//! use saga_runtime::coordinator::request_and_reply;
//! use std::time::Duration;
//!
//! let fields = request_and_reply(
//!     &bus,
//!     "resources:commands",
//!     "resources:replies",
//!     "correlation-1",
//!     "saga-1",
//!     "resources:allocate",
//!     &serde_json::json!({ "robot_count": 2 }),
//!     Duration::from_secs(30),
//! ).await?;
//! ```

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod reply;
pub mod retry;
pub mod saga;
pub mod wrapper;

pub use coordinator::{request_and_reply, DEFAULT_TIMEOUT};
pub use dispatcher::Dispatcher;
pub use error::RuntimeError;
pub use registry::{Handler, HandlerDescriptor};
pub use reply::read_replies;
pub use retry::{RetryDecision, RetryStrategy};
pub use saga::{run_saga, Compensation, PayloadBuilder, SagaContext, SagaStep, SagaStepError};
pub use wrapper::{multi_stage_reply, Fields, ProgressReporter, StepFn};
