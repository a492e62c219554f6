//! Daemon lifecycle: wiring, periodic tasks, signal handling.
//!
//! Independent cadences, one task each: the sync tick, the presence
//! heartbeat, the sensor push, the peripheral link manager, and the
//! playback dispatcher that consumes refresh signals and link events.
//! No component failure terminates the process; each loop logs and waits
//! for its next tick.

use anyhow::{Context, Result};
use sbx_core::config::SbxConfig;
use sbx_core::types::QueueItem;
use sbx_link::ble::BleTransport;
use sbx_link::{LinkEvent, LinkManager};
use sbx_net::{CatalogClient, Transfer};
use sbx_sync::{Coordinator, HttpSource, LiveStore, RefreshEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::playback::{PlaybackSurface, QueuePlayer};
use crate::reporter;

pub async fn run(config: SbxConfig) -> Result<()> {
    let device_id = config
        .device_id()
        .context("no device id: set [catalog] device_id or SBX_DEVICE_ID")?;
    info!(
        device_id = %device_id,
        live_dir = %config.media.live_dir.display(),
        sync_mode = ?config.media.sync_mode,
        "daemon starting"
    );

    let client = CatalogClient::new(&config.catalog, &device_id)?;
    let transfer = Transfer::new(&config.transfer)?;
    let store = LiveStore::open(&config.media.live_dir, &config.media.patterns)?;

    let cancel = CancellationToken::new();
    let (refresh_tx, refresh_rx) = mpsc::channel(8);
    let (link_events_tx, link_events_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(8);
    let (sensor_tx, sensor_rx) = watch::channel(None::<f32>);

    let source = Arc::new(HttpSource::new(client.clone(), transfer));
    let coordinator = Arc::new(Coordinator::new(
        source,
        store.clone(),
        config.media.staging_dir.clone(),
        config.media.sync_mode,
        refresh_tx,
    ));

    // Peripheral link. A machine without bluetooth still syncs and plays.
    match BleTransport::new(&config.link).await {
        Ok(transport) => {
            let manager = LinkManager::new(
                Arc::new(transport),
                config.link.clone(),
                link_events_tx,
                outbound_rx,
                cancel.clone(),
            );
            tokio::spawn(manager.run());
        }
        Err(e) => {
            warn!(error = %e, "bluetooth unavailable; peripheral link disabled");
        }
    }

    let sync_task = tokio::spawn(sync_loop(
        coordinator,
        Duration::from_secs(config.media.poll_interval_secs),
        cancel.clone(),
    ));
    let playback_task = tokio::spawn(playback_loop(
        store,
        refresh_rx,
        link_events_rx,
        client.clone(),
        sensor_tx,
        cancel.clone(),
    ));
    let heartbeat_task = tokio::spawn(reporter::heartbeat_loop(
        client.clone(),
        Duration::from_secs(config.telemetry.heartbeat_interval_secs),
        cancel.clone(),
    ));
    let sensor_task = tokio::spawn(reporter::sensor_loop(
        client,
        sensor_rx,
        Duration::from_secs(config.telemetry.sensor_interval_secs),
        cancel.clone(),
    ));

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    // Reconnect suppression comes first, then teardown. An in-flight
    // transfer is abandoned in place; its partial file resumes next boot.
    cancel.cancel();
    let _ = tokio::join!(sync_task, playback_task, heartbeat_task, sensor_task);
    drop(outbound_tx);

    info!("sbxd exiting cleanly");
    Ok(())
}

async fn sync_loop(coordinator: Arc<Coordinator>, period: Duration, cancel: CancellationToken) {
    // First tick fires immediately: a freshly booted node converges now,
    // not one poll interval from now.
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = coordinator.sync_once() => match result {
                        Ok(report) if report.skipped => {}
                        Ok(report) => debug!(
                            downloaded = report.downloaded,
                            deleted = report.deleted,
                            failed = report.failed,
                            "sync tick done"
                        ),
                        Err(e) => warn!(error = %e, "sync pass failed; next tick retries"),
                    }
                }
            }
        }
    }
}

/// Single consumer for everything that touches the playback queue, so the
/// queue has one owner and no lock.
async fn playback_loop(
    store: LiveStore,
    mut refresh_rx: mpsc::Receiver<RefreshEvent>,
    mut link_events_rx: mpsc::Receiver<LinkEvent>,
    client: CatalogClient,
    sensor_tx: watch::Sender<Option<f32>>,
    cancel: CancellationToken,
) {
    let mut player = QueuePlayer::default();

    // Whatever survived the last run starts playing right away; an offline
    // node keeps showing its local content.
    refresh_queue(&store, &mut player, &RefreshEvent::default());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(refresh) = refresh_rx.recv() => {
                refresh_queue(&store, &mut player, &refresh);
            }
            Some(event) = link_events_rx.recv() => match event {
                LinkEvent::Temperature(celsius) => {
                    // Overwrite in place; the reporter samples on its own cadence.
                    let _ = sensor_tx.send(Some(celsius));
                }
                LinkEvent::DoorOpened => {
                    let client = client.clone();
                    tokio::spawn(async move {
                        reporter::bump_counters(&client).await;
                    });
                }
                LinkEvent::Playback(command) => player.dispatch(command),
                LinkEvent::Notice(text) => debug!(text = %text, "peripheral notice"),
            },
        }
    }
}

/// Re-list the live directory and hand the queue to the surface. Playback
/// only ever re-lists here, on an explicit refresh, so a mid-pass directory
/// (one asset short, one extra) is never observed.
fn refresh_queue(store: &LiveStore, player: &mut QueuePlayer, refresh: &RefreshEvent) {
    let files = match store.playable() {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "listing live directory failed; queue unchanged");
            return;
        }
    };
    if files.is_empty() && player.is_empty() {
        debug!("no local media yet");
        return;
    }

    let items = files
        .into_iter()
        .map(|path| {
            let hints = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| refresh.hints.get(&n.to_lowercase()))
                .cloned()
                .unwrap_or_default();
            QueueItem { path, hints }
        })
        .collect();
    player.set_queue(items);
}
