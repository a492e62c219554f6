//! Playback surface: the boundary to the out-of-scope renderer.
//!
//! The daemon never talks to a real decoder; it drives this trait. The
//! shipped `QueuePlayer` models the queue a renderer would be showing:
//! name-ordered items, a current index whose NEXT wraps around, and
//! drop-on-error advancement so one broken file cannot stall the loop.

use sbx_core::types::{PlaybackCommand, QueueItem};
use tracing::{info, warn};

pub trait PlaybackSurface: Send {
    /// Replace the queue; playback restarts from the first item.
    fn set_queue(&mut self, items: Vec<QueueItem>);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, index: usize);
    /// Advance to (current + 1) modulo queue length.
    fn next(&mut self);
    /// The renderer failed on the current item: drop it and keep going.
    fn on_error(&mut self, message: &str);

    fn dispatch(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play => self.play(),
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Next => self.next(),
        }
    }
}

#[derive(Debug, Default)]
pub struct QueuePlayer {
    items: Vec<QueueItem>,
    current: usize,
    playing: bool,
}

impl QueuePlayer {
    pub fn current(&self) -> Option<&QueueItem> {
        self.items.get(self.current)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.items.is_empty()
    }
}

impl PlaybackSurface for QueuePlayer {
    fn set_queue(&mut self, items: Vec<QueueItem>) {
        info!(count = items.len(), "playback queue replaced");
        self.items = items;
        self.current = 0;
        self.playing = !self.items.is_empty();
    }

    fn play(&mut self) {
        if self.items.is_empty() {
            warn!("play requested with an empty queue");
            return;
        }
        self.playing = true;
        info!(item = ?self.current().map(|i| &i.path), "play");
    }

    fn pause(&mut self) {
        self.playing = false;
        info!("pause");
    }

    fn seek(&mut self, index: usize) {
        if self.items.is_empty() {
            return;
        }
        self.current = index.min(self.items.len() - 1);
        info!(index = self.current, "seek");
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.current = (self.current + 1) % self.items.len();
        self.playing = true;
        info!(item = ?self.current().map(|i| &i.path), "next");
    }

    fn on_error(&mut self, message: &str) {
        let Some(broken) = self.items.get(self.current).cloned() else {
            return;
        };
        warn!(item = %broken.path.display(), message, "playback error; dropping item");
        self.items.remove(self.current);
        if self.items.is_empty() {
            self.playing = false;
        } else if self.current >= self.items.len() {
            self.current = 0;
        }
    }
}
