//! Assertions that wait for asynchronous outcomes.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use shuttle_events::{Event, EventEnvelope, EventStream};
use tokio::time::{Instant, sleep, timeout};

const POLL_STEP: Duration = Duration::from_millis(25);

/// Receive events until one satisfies `predicate`, failing after `limit`.
///
/// # Errors
///
/// Returns an error if the limit elapses or the bus closes first.
pub async fn next_matching<F>(
    stream: &mut EventStream,
    limit: Duration,
    mut predicate: F,
) -> Result<EventEnvelope>
where
    F: FnMut(&Event) -> bool,
{
    timeout(limit, async {
        while let Some(envelope) = stream.next().await {
            if predicate(&envelope.event) {
                return Ok(envelope);
            }
        }
        Err(anyhow!("event bus closed before a matching event arrived"))
    })
    .await
    .map_err(|_| anyhow!("no matching event within {limit:?}"))?
}

/// Poll `condition` until it returns `true`, failing after `limit`.
///
/// # Errors
///
/// Returns an error if the condition never holds within the limit.
pub async fn eventually<F, Fut>(limit: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + limit;
    loop {
        if condition().await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(anyhow!("condition not met within {limit:?}"));
        }
        sleep(POLL_STEP).await;
    }
}
