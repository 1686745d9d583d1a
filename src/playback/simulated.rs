use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::queue::QueueItem;

use super::{PlaybackReporter, PlaybackSurface};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Pretends every clip lasts `clip_len` of unpaused time.
///
/// Stands in for a real player when running headless; pause/resume from the
/// host clock stretch the clip accordingly.
pub struct TimedSurface {
    clip_len: Duration,
    current: Mutex<Option<ActiveClip>>,
}

/// Controls for the one clip on screen. Each clip gets its own play flag so
/// pause and resume never reach a clip that was already replaced.
struct ActiveClip {
    cancel: CancellationToken,
    playing: watch::Sender<bool>,
}

impl TimedSurface {
    pub fn new(clip_len: Duration) -> Self {
        Self {
            clip_len,
            current: Mutex::new(None),
        }
    }

    fn replace_current(&self, next: Option<ActiveClip>) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some(previous) = guard.take() {
                previous.cancel.cancel();
            }
            *guard = next;
        }
    }

    fn set_playing(&self, playing: bool) {
        if let Ok(guard) = self.current.lock() {
            if let Some(clip) = guard.as_ref() {
                clip.playing.send_replace(playing);
            }
        }
    }
}

#[async_trait]
impl PlaybackSurface for TimedSurface {
    async fn load(&self, item: &QueueItem, autoplay: bool, done: PlaybackReporter) -> Result<()> {
        let cancel = CancellationToken::new();
        let (playing, rx) = watch::channel(autoplay);
        self.replace_current(Some(ActiveClip {
            cancel: cancel.clone(),
            playing,
        }));

        log_debug!("simulated clip '{}' from {}", item.token, item.clip);

        tokio::spawn(run_clip(self.clip_len, rx, cancel, done));
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.set_playing(true);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.set_playing(false);
        Ok(())
    }

    async fn halt(&self) -> Result<()> {
        self.replace_current(None);
        Ok(())
    }
}

async fn run_clip(
    clip_len: Duration,
    mut playing: watch::Receiver<bool>,
    cancel: CancellationToken,
    done: PlaybackReporter,
) {
    let mut remaining = clip_len;
    loop {
        if !*playing.borrow_and_update() {
            tokio::select! {
                changed = playing.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
                _ = cancel.cancelled() => return,
            }
        }

        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(remaining) => {
                done.ended();
                return;
            }
            changed = playing.changed() => {
                if changed.is_err() {
                    return;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
            _ = cancel.cancelled() => return,
        }
    }
}
