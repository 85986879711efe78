//! Reply reader (§4.4): blocks on a per-request reply stream until a
//! `completed` entry arrives or the deadline elapses.

use std::collections::BTreeMap;
use std::time::Duration;

use saga_core::{Bus, Status};
use tokio::time::Instant;

use crate::error::RuntimeError;
use crate::retry::{RetryDecision, RetryStrategy};

/// Read the reply stream for `request_id`, returning the field map of the
/// single `completed` event. `start`/`progress`/unrecognized statuses are
/// logged and discarded (§9 item 1: a `failed` terminal is not raised as an
/// error here — it is simply not `completed`, so the reader degrades to
/// timeout exactly as an absent reply would).
///
/// # Errors
///
/// Returns [`RuntimeError::ReplyTimeout`] if no `completed` event arrives
/// within `timeout`, or [`RuntimeError::Bus`] if the underlying bus call
/// fails outright (not merely empty).
pub async fn read_replies(
    bus: &dyn Bus,
    reply_stream: &str,
    correlation_id: &str,
    request_id: &str,
    timeout: Duration,
    strategy: RetryStrategy,
) -> Result<BTreeMap<String, String>, RuntimeError> {
    let group = format!("{reply_stream}.{request_id}.group");
    let consumer = format!("read_replies-{request_id}");

    bus.create_group(reply_stream, &group, "0").await?;

    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            break;
        }
        // Redis treats BLOCK 0 as block forever, not return-immediately, so a
        // sub-millisecond remaining budget must still round up to 1.
        let block_ms = u64::try_from((timeout - elapsed).as_millis())
            .unwrap_or(u64::MAX)
            .max(1);

        let response = bus
            .read_group(reply_stream, &group, &consumer, ">", 1, block_ms)
            .await?;
        let entries: Vec<_> = response.into_iter().flat_map(|(_, entries)| entries).collect();

        if entries.is_empty() {
            attempt += 1;
            let elapsed = start.elapsed();
            match strategy.decide(attempt, elapsed, timeout) {
                RetryDecision::End => break,
                RetryDecision::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                }
            }
            continue;
        }

        for entry in entries {
            bus.ack(reply_stream, &group, &entry.id).await?;
            let status = entry.fields.get("status").and_then(|s| s.parse::<Status>().ok());
            match status {
                Some(Status::Completed) => return Ok(entry.fields),
                Some(Status::Start | Status::Progress) => {
                    tracing::info!(request_id, status = ?status, "reply status update");
                }
                _ => {
                    tracing::debug!(request_id, "reply entry with unrecognized status discarded");
                }
            }
        }
    }

    tracing::error!(
        correlation_id,
        request_id,
        timeout_secs = timeout.as_secs_f64(),
        "no completed reply received within timeout"
    );
    Err(RuntimeError::ReplyTimeout {
        correlation_id: correlation_id.to_string(),
        request_id: request_id.to_string(),
        timeout_secs: timeout.as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_testing::InMemoryBus;

    #[tokio::test]
    async fn returns_completed_fields_when_present() {
        let bus = InMemoryBus::new();
        let reply_stream = "resources:replies:r1";

        let mut start_fields = BTreeMap::new();
        start_fields.insert("status".to_string(), "start".to_string());
        bus.append(reply_stream, start_fields, None).await.unwrap();

        let mut completed_fields = BTreeMap::new();
        completed_fields.insert("status".to_string(), "completed".to_string());
        completed_fields.insert("robots_allocated".to_string(), "2".to_string());
        bus.append(reply_stream, completed_fields, None).await.unwrap();

        let fields = read_replies(
            &bus,
            reply_stream,
            "c1",
            "r1",
            Duration::from_secs(5),
            RetryStrategy::ImmediateFail,
        )
        .await
        .unwrap();

        assert_eq!(fields.get("status").map(String::as_str), Some("completed"));
        assert_eq!(fields.get("robots_allocated").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn times_out_on_empty_stream() {
        let bus = InMemoryBus::new();
        let err = read_replies(
            &bus,
            "resources:replies:r2",
            "c1",
            "r2",
            Duration::from_millis(50),
            RetryStrategy::ImmediateFail,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RuntimeError::ReplyTimeout { .. }));
    }

    #[tokio::test]
    async fn failed_terminal_is_not_completed_and_times_out() {
        let bus = InMemoryBus::new();
        let reply_stream = "resources:replies:r3";
        let mut failed_fields = BTreeMap::new();
        failed_fields.insert("status".to_string(), "failed".to_string());
        bus.append(reply_stream, failed_fields, None).await.unwrap();

        let err = read_replies(
            &bus,
            reply_stream,
            "c1",
            "r3",
            Duration::from_millis(50),
            RetryStrategy::ImmediateFail,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RuntimeError::ReplyTimeout { .. }));
    }
}
