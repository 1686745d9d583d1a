//! Playback surface seam and completion signalling.
//!
//! The surface is whatever actually renders a clip (a video element, a
//! player window, a simulated timer). It reports back through the
//! [`PlaybackReporter`] it receives with each clip.

pub mod manual;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::queue::{QueueItem, Token};

pub use manual::ManualSurface;
pub use simulated::TimedSurface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Ended,
    Failed(String),
}

/// Completion of one clip, tagged with the session epoch it was loaded in.
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub token: Token,
    pub epoch: u64,
    pub outcome: PlaybackOutcome,
}

/// One-clip completion handle handed to the surface on `load`.
#[derive(Debug, Clone)]
pub struct PlaybackReporter {
    token: Token,
    epoch: u64,
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackReporter {
    pub(crate) fn new(token: Token, epoch: u64, tx: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self { token, epoch, tx }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn ended(self) {
        self.send(PlaybackOutcome::Ended);
    }

    pub fn failed(self, reason: impl Into<String>) {
        self.send(PlaybackOutcome::Failed(reason.into()));
    }

    fn send(self, outcome: PlaybackOutcome) {
        // The driver may already be gone after shutdown; nothing to report to.
        let _ = self.tx.send(PlaybackEvent {
            token: self.token,
            epoch: self.epoch,
            outcome,
        });
    }
}

#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Binds `item`'s clip and, if `autoplay`, starts it. Exactly one of
    /// `done.ended()` / `done.failed()` should follow. Returning `Err` counts
    /// as a failed clip.
    async fn load(&self, item: &QueueItem, autoplay: bool, done: PlaybackReporter) -> Result<()>;

    /// Host video resumed.
    async fn resume(&self) -> Result<()>;

    /// Host video paused.
    async fn pause(&self) -> Result<()>;

    /// Unbind whatever is loaded (queue cleared).
    async fn halt(&self) -> Result<()>;
}
