//! Transport seam between the link state machine and the radio.
//!
//! The manager only ever sees these two traits, so its transitions are
//! testable with a scripted in-memory transport. A fresh `LinkPeer` is
//! produced per connection attempt and never reused.

use async_trait::async_trait;
use sbx_core::SbxResult;
use std::time::Duration;
use tokio::sync::mpsc;

/// Inbound lines from the peripheral. The sending side is dropped when the
/// underlying link tears down, so end-of-stream *is* the disconnect signal.
pub type LineStream = mpsc::Receiver<String>;

#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Filtered discovery restricted to an exact advertised name.
    ///
    /// Implementations must stop discovery before returning, success or
    /// not: at most one scan is ever in flight.
    async fn scan(
        &self,
        device_name: &str,
        timeout: Duration,
    ) -> SbxResult<Box<dyn LinkPeer>>;
}

/// One connection attempt's handle. Methods are called in order: connect,
/// discover_channels, subscribe; write_line only after subscribe succeeded.
#[async_trait]
pub trait LinkPeer: Send {
    async fn connect(&mut self) -> SbxResult<()>;

    /// Locate the write and notify channels on the expected service.
    async fn discover_channels(&mut self) -> SbxResult<()>;

    /// Enable notification delivery and return the inbound line stream.
    async fn subscribe(&mut self) -> SbxResult<LineStream>;

    /// Single fire-and-forget write of one command line.
    async fn write_line(&mut self, line: &str) -> SbxResult<()>;

    async fn disconnect(&mut self);
}
