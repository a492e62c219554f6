//! Peripheral connection state machine.
//!
//! `Idle → Scanning → Connecting → Discovering → Subscribing → Ready`, and
//! every failure anywhere on that path converges on the same backoff-and-
//! rescan transition, so the link self-heals uniformly no matter which step
//! broke. The manager never gives up: only cancelling the shutdown token
//! stops the reconnect loop.

use sbx_core::config::LinkConfig;
use sbx_core::SbxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{self, LinkEvent};
use crate::transport::LinkTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Subscribing,
    Ready,
}

pub struct LinkManager {
    transport: Arc<dyn LinkTransport>,
    config: LinkConfig,
    events_tx: mpsc::Sender<LinkEvent>,
    outbound_rx: mpsc::Receiver<String>,
    outbound_open: bool,
    state_tx: watch::Sender<LinkState>,
    cancel: CancellationToken,
}

impl LinkManager {
    pub fn new(
        transport: Arc<dyn LinkTransport>,
        config: LinkConfig,
        events_tx: mpsc::Sender<LinkEvent>,
        outbound_rx: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Idle);
        LinkManager {
            transport,
            config,
            events_tx,
            outbound_rx,
            outbound_open: true,
            state_tx,
            cancel,
        }
    }

    /// Observe state transitions (used by tests and status displays).
    pub fn state_watch(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Run until the shutdown token is cancelled. Every terminal session
    /// outcome re-enters discovery after the fixed retry delay.
    pub async fn run(mut self) {
        let retry = Duration::from_secs(self.config.retry_delay_secs);

        while !self.cancel.is_cancelled() {
            match self.session().await {
                Ok(()) => break, // deliberate shutdown mid-session
                Err(e) => {
                    warn!(error = %e, retry_secs = retry.as_secs(), "link session ended; rescanning after delay");
                }
            }
            self.set_state(LinkState::Idle);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(retry) => {}
            }
        }

        self.set_state(LinkState::Idle);
        info!("link manager stopped");
    }

    /// One LinkSession: a fresh peer handle, driven to Ready and then
    /// pumped until teardown. Returns Ok only on deliberate shutdown.
    async fn session(&mut self) -> sbx_core::SbxResult<()> {
        let scan_timeout = Duration::from_secs(self.config.scan_timeout_secs);

        self.set_state(LinkState::Scanning);
        let mut peer = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            found = self.transport.scan(&self.config.device_name, scan_timeout) => found?,
        };

        self.set_state(LinkState::Connecting);
        peer.connect().await?;

        self.set_state(LinkState::Discovering);
        peer.discover_channels().await?;

        self.set_state(LinkState::Subscribing);
        let mut lines = peer.subscribe().await?;

        self.set_state(LinkState::Ready);
        info!(device = %self.config.device_name, "peripheral link ready");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    peer.disconnect().await;
                    return Ok(());
                }
                line = lines.recv() => match line {
                    Some(line) => self.dispatch(&line).await,
                    None => return Err(SbxError::Link("notification stream closed".into())),
                },
                outbound = self.outbound_rx.recv(), if self.outbound_open => match outbound {
                    Some(text) => {
                        // Fire-and-forget: a stale link has no write path
                        // and is allowed to fail.
                        if let Err(e) = peer.write_line(&text).await {
                            debug!(error = %e, "outbound write dropped");
                        }
                    }
                    None => self.outbound_open = false,
                },
            }
        }
    }

    async fn dispatch(&self, line: &str) {
        for event in protocol::parse_line(line) {
            match event {
                LinkEvent::Notice(text) => {
                    // Surfaced for the operator; nothing reacts to it.
                    info!(text = %text, "peripheral notice");
                }
                actionable => {
                    if self.events_tx.send(actionable).await.is_err() {
                        debug!("link event consumer is gone");
                    }
                }
            }
        }
    }

    fn set_state(&self, state: LinkState) {
        if *self.state_tx.borrow() != state {
            debug!(?state, "link state");
            let _ = self.state_tx.send(state);
        }
    }
}
