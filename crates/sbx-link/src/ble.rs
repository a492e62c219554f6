//! btleplug transport: the real radio behind the `LinkTransport` seam.
//!
//! The peripheral exposes a UART-style service with a write characteristic
//! (host → device) and a notify characteristic (device → host); enabling
//! notifications writes the standard CCCD, which btleplug does as part of
//! `subscribe`. Discovery filters on the exact advertised name.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use sbx_core::config::LinkConfig;
use sbx_core::{SbxError, SbxResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::transport::{LineStream, LinkPeer, LinkTransport};

pub struct BleTransport {
    adapter: Adapter,
    service_uuid: Uuid,
    write_uuid: Uuid,
    notify_uuid: Uuid,
}

impl BleTransport {
    /// Grab the first adapter and parse the configured GATT ids.
    pub async fn new(config: &LinkConfig) -> SbxResult<Self> {
        let manager = Manager::new().await.map_err(ble_err)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(ble_err)?
            .into_iter()
            .next()
            .ok_or_else(|| SbxError::Link("no bluetooth adapter available".into()))?;

        Ok(BleTransport {
            adapter,
            service_uuid: parse_uuid(&config.service_uuid)?,
            write_uuid: parse_uuid(&config.write_char_uuid)?,
            notify_uuid: parse_uuid(&config.notify_char_uuid)?,
        })
    }
}

#[async_trait]
impl LinkTransport for BleTransport {
    async fn scan(
        &self,
        device_name: &str,
        timeout: Duration,
    ) -> SbxResult<Box<dyn LinkPeer>> {
        let mut events = self.adapter.events().await.map_err(ble_err)?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| SbxError::Link(format!("scan start failed: {e}")))?;

        let found = tokio::time::timeout(timeout, async {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                    continue;
                };
                let name = peripheral
                    .properties()
                    .await
                    .ok()
                    .flatten()
                    .and_then(|p| p.local_name);
                match name {
                    Some(name) if name == device_name => return Some(peripheral),
                    Some(other) => trace!(name = %other, "ignoring non-matching device"),
                    None => {}
                }
            }
            None
        })
        .await;

        // One scan at a time: discovery stops before anything else happens,
        // including before a failure is reported.
        if let Err(e) = self.adapter.stop_scan().await {
            warn!(error = %e, "stopping scan failed");
        }

        match found {
            Ok(Some(peripheral)) => {
                debug!(device = %device_name, "matching peripheral discovered");
                Ok(Box::new(BlePeer {
                    peripheral,
                    service_uuid: self.service_uuid,
                    write_uuid: self.write_uuid,
                    notify_uuid: self.notify_uuid,
                    write_char: None,
                    notify_char: None,
                }))
            }
            Ok(None) => Err(SbxError::Link("scan event stream ended".into())),
            Err(_) => Err(SbxError::Link(format!(
                "no {device_name} found within {}s",
                timeout.as_secs()
            ))),
        }
    }
}

struct BlePeer {
    peripheral: Peripheral,
    service_uuid: Uuid,
    write_uuid: Uuid,
    notify_uuid: Uuid,
    write_char: Option<Characteristic>,
    notify_char: Option<Characteristic>,
}

#[async_trait]
impl LinkPeer for BlePeer {
    async fn connect(&mut self) -> SbxResult<()> {
        self.peripheral
            .connect()
            .await
            .map_err(|e| SbxError::Link(format!("connect failed: {e}")))
    }

    async fn discover_channels(&mut self) -> SbxResult<()> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| SbxError::Link(format!("service discovery failed: {e}")))?;

        let chars = self.peripheral.characteristics();
        self.write_char = chars
            .iter()
            .find(|c| c.service_uuid == self.service_uuid && c.uuid == self.write_uuid)
            .cloned();
        self.notify_char = chars
            .iter()
            .find(|c| c.service_uuid == self.service_uuid && c.uuid == self.notify_uuid)
            .cloned();

        if self.write_char.is_none() || self.notify_char.is_none() {
            return Err(SbxError::Link("required characteristics missing".into()));
        }
        Ok(())
    }

    async fn subscribe(&mut self) -> SbxResult<LineStream> {
        let notify_char = self
            .notify_char
            .clone()
            .ok_or_else(|| SbxError::Link("subscribe before discovery".into()))?;

        self.peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| SbxError::Link(format!("enabling notifications failed: {e}")))?;

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| SbxError::Link(format!("notification stream failed: {e}")))?;

        let notify_uuid = self.notify_uuid;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != notify_uuid {
                    continue;
                }
                // Each notification is treated as one complete line.
                let text = String::from_utf8_lossy(&notification.value)
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }
                trace!(line = %text, "peripheral rx");
                if tx.send(text).await.is_err() {
                    break;
                }
            }
            // tx drops here; the manager reads end-of-stream as teardown.
        });

        Ok(rx)
    }

    async fn write_line(&mut self, line: &str) -> SbxResult<()> {
        let write_char = self
            .write_char
            .as_ref()
            .ok_or_else(|| SbxError::Link("write before discovery".into()))?;
        let framed = format!("{line}\n");
        self.peripheral
            .write(write_char, framed.as_bytes(), WriteType::WithoutResponse)
            .await
            .map_err(|e| SbxError::Link(format!("write failed: {e}")))
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.peripheral.disconnect().await {
            debug!(error = %e, "disconnect failed (link already gone?)");
        }
    }
}

fn parse_uuid(raw: &str) -> SbxResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| SbxError::Protocol(format!("bad GATT uuid {raw:?}: {e}")))
}

fn ble_err(e: btleplug::Error) -> SbxError {
    SbxError::Link(e.to_string())
}
