//! signbox peripheral link.
//!
//! A battery-powered sensor/control box speaks a small text protocol over a
//! BLE UART-style service. `protocol` turns its lines into typed events,
//! `manager` owns the discover/connect/subscribe/recover state machine, and
//! `ble` is the real btleplug transport behind the `LinkTransport` seam.

pub mod ble;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{LinkManager, LinkState};
pub use protocol::LinkEvent;
pub use transport::{LinkPeer, LinkTransport};
