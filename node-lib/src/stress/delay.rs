use std::time::Duration;

use rama::telemetry::tracing;

/// Draw the realized delay for one request: `time_ms` plus a uniform
/// offset in `[-jitter_ms, +jitter_ms]`, never below zero.
pub fn realize_delay(time_ms: u64, jitter_ms: u64) -> Duration {
    let base = i64::try_from(time_ms).unwrap_or(i64::MAX);
    let jitter = i64::try_from(jitter_ms).unwrap_or(i64::MAX);

    let offset = if jitter > 0 {
        rand::random_range(-jitter..=jitter)
    } else {
        0
    };

    Duration::from_millis(base.saturating_add(offset).max(0) as u64)
}

/// Sleep for a realized delay, only when `time_ms > 0`.
///
/// Only the calling task is suspended. Returns the slept duration.
pub async fn delay(time_ms: u64, jitter_ms: u64) -> Option<Duration> {
    if time_ms == 0 {
        return None;
    }

    let realized = realize_delay(time_ms, jitter_ms);
    tokio::time::sleep(realized).await;
    tracing::info!(
        realized_ms = realized.as_millis() as u64,
        "slept for {} milliseconds",
        realized.as_millis()
    );
    Some(realized)
}
