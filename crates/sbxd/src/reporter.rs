//! Heartbeat and telemetry pushes.
//!
//! All of this is best-effort: a failed push is logged and forgotten, the
//! next cycle tries again. Nothing here is required for playback
//! correctness, so nothing here is allowed to take the node down.

use sbx_net::CatalogClient;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Periodic presence push. The first tick fires immediately, so the node
/// announces itself as soon as it boots.
pub async fn heartbeat_loop(client: CatalogClient, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = client.post_online().await {
                    debug!(error = %e, "heartbeat dropped");
                }
            }
        }
    }
}

/// Periodic sensor push from the latest sample snapshot.
///
/// Reads whatever the link last wrote, never waits for a new arrival, and
/// skips the cycle entirely until a first sample ever shows up. Staleness
/// is tolerated; the newest sample simply overwrites the old one in place.
pub async fn sensor_loop(
    client: CatalogClient,
    sensor_rx: watch::Receiver<Option<f32>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sample = *sensor_rx.borrow();
                match sample {
                    Some(celsius) => {
                        if let Err(e) = client.post_temperature(celsius).await {
                            debug!(error = %e, "sensor push dropped");
                        }
                    }
                    None => trace!("no sensor sample yet; skipping push"),
                }
            }
        }
    }
}

/// One counter increment, fired per door-open trigger.
///
/// Read-increment-write against the catalog with two independent POSTs and
/// no compare-and-swap: a burst of triggers can race and under-count. The
/// catalog owns these counters and tolerates that, so no locking here.
pub async fn bump_counters(client: &CatalogClient) {
    let counts = match client.counters().await {
        Ok(counts) => counts,
        Err(e) => {
            warn!(error = %e, "counter read failed; increment lost");
            return;
        }
    };

    // Two calls, each independently allowed to fail.
    if let Err(e) = client.post_daily(counts.daily + 1).await {
        warn!(error = %e, "daily counter push failed");
    }
    if let Err(e) = client.post_monthly(counts.monthly + 1).await {
        warn!(error = %e, "monthly counter push failed");
    }
}
