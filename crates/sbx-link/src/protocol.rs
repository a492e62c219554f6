//! Text command protocol spoken by the peripheral.
//!
//! Every notification is one complete line. Classification is independent
//! per category, so a single line can yield several events (a firmware
//! status line may carry both a temperature and a reed state). Matching is
//! case-insensitive throughout.

use regex::Regex;
use sbx_core::types::PlaybackCommand;
use std::sync::OnceLock;
use tracing::debug;

/// First signed decimal number in a line, e.g. the `23.45` in
/// `"Temperature: 23.45 C"`.
fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("literal pattern"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// New sensor reading; overwrites the previous one.
    Temperature(f32),
    /// Reed switch reported open; fires one counter increment.
    DoorOpened,
    Playback(PlaybackCommand),
    /// Free text nothing else claimed; logged, never acted on.
    Notice(String),
}

/// Classify one inbound line. The line is trimmed first; empty input yields
/// nothing.
pub fn parse_line(raw: &str) -> Vec<LinkEvent> {
    let line = raw.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let lower = line.to_lowercase();
    let mut events = Vec::new();
    let mut claimed = false;

    if lower.contains("temperature") {
        claimed = true;
        match number_pattern()
            .find(line)
            .and_then(|m| m.as_str().parse::<f32>().ok())
        {
            Some(value) => events.push(LinkEvent::Temperature(value)),
            None => debug!(line, "temperature line without a number; discarded"),
        }
    }

    if lower.contains("reed") {
        claimed = true;
        if lower.contains("open") {
            events.push(LinkEvent::DoorOpened);
        }
    }

    match lower.as_str() {
        "play" => {
            claimed = true;
            events.push(LinkEvent::Playback(PlaybackCommand::Play));
        }
        "pause" => {
            claimed = true;
            events.push(LinkEvent::Playback(PlaybackCommand::Pause));
        }
        "next" => {
            claimed = true;
            events.push(LinkEvent::Playback(PlaybackCommand::Next));
        }
        _ => {}
    }

    if !claimed {
        events.push(LinkEvent::Notice(line.to_string()));
    }
    events
}
