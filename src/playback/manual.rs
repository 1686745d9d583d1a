use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::queue::{QueueItem, Token};

use super::{PlaybackReporter, PlaybackSurface};

/// A surface driven by hand: records what was loaded and holds the pending
/// reporter until the caller ends or fails the clip.
#[derive(Debug, Default)]
pub struct ManualSurface {
    loads: Mutex<Vec<(QueueItem, bool)>>,
    pending: Mutex<Option<PlaybackReporter>>,
    paused: AtomicBool,
    halts: AtomicUsize,
    reject_next_load: AtomicBool,
    load_delay: Mutex<Duration>,
}

impl ManualSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens in the order they were loaded.
    pub fn loaded_tokens(&self) -> Vec<Token> {
        self.loads
            .lock()
            .map(|loads| loads.iter().map(|(item, _)| item.token.clone()).collect())
            .unwrap_or_default()
    }

    pub fn last_load(&self) -> Option<(QueueItem, bool)> {
        self.loads.lock().ok()?.last().cloned()
    }

    /// Token whose reporter is still outstanding.
    pub fn pending_token(&self) -> Option<Token> {
        self.pending
            .lock()
            .ok()?
            .as_ref()
            .map(|reporter| reporter.token().clone())
    }

    pub fn end_current(&self) -> Option<Token> {
        let reporter = self.pending.lock().ok()?.take()?;
        let token = reporter.token().clone();
        reporter.ended();
        Some(token)
    }

    pub fn fail_current(&self, reason: &str) -> Option<Token> {
        let reporter = self.pending.lock().ok()?.take()?;
        let token = reporter.token().clone();
        reporter.failed(reason);
        Some(token)
    }

    /// Makes the next `load` return an error, as a decode failure would.
    pub fn reject_next_load(&self) {
        self.reject_next_load.store(true, Ordering::SeqCst);
    }

    /// Makes every `load` take this long before the clip is bound.
    pub fn set_load_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.load_delay.lock() {
            *current = delay;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn halt_count(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackSurface for ManualSurface {
    async fn load(&self, item: &QueueItem, autoplay: bool, done: PlaybackReporter) -> Result<()> {
        if let Ok(mut loads) = self.loads.lock() {
            loads.push((item.clone(), autoplay));
        }
        if self.reject_next_load.swap(false, Ordering::SeqCst) {
            bail!("could not decode {}", item.clip);
        }

        let delay = self.load_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(done);
        }
        self.paused.store(!autoplay, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn halt(&self) -> Result<()> {
        self.halts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending.lock() {
            pending.take();
        }
        Ok(())
    }
}
