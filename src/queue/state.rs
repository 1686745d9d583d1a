use std::collections::HashMap;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::overlay::OverlayView;

use super::{ClipQueue, ProcessedSet, QueueConfig, QueueItem, RecencySet, Token};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
}

/// All queue-related state for one overlay or sync session.
///
/// Owned by [`super::ReverseSession`] behind a single mutex, which is what
/// makes admission and recency insertion atomic with respect to each other.
#[derive(Debug)]
pub struct SessionState {
    pub status: PlaybackState,
    pub current: Option<Token>,
    pub queue: ClipQueue,
    pub recency: RecencySet,
    pub processed: ProcessedSet,
    /// Host video play/pause. Gates autoplay of freshly loaded clips only.
    pub running: bool,
    /// Bumped by every reset; results of I/O started under an older epoch are
    /// discarded.
    pub epoch: u64,
    /// Pre-resolved clip locators filled by prefetch.
    pub locators: HashMap<Token, Url>,
}

impl SessionState {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            status: PlaybackState::Idle,
            current: None,
            queue: ClipQueue::new(),
            recency: RecencySet::new(config.recency_ttl),
            processed: ProcessedSet::new(config.processed_capacity),
            running: true,
            epoch: 0,
            locators: HashMap::new(),
        }
    }

    /// Moves the queue head into `Playing`. Returns `None` while a clip is
    /// already in flight or when nothing is queued.
    pub fn begin_next(&mut self) -> Option<QueueItem> {
        if self.status == PlaybackState::Playing {
            return None;
        }
        let item = self.queue.dequeue_front()?;
        self.status = PlaybackState::Playing;
        self.current = Some(item.token.clone());
        Some(item)
    }

    /// Completes the clip for `token`. Signals for a clip that is no longer
    /// current (stale epoch, duplicate report) are ignored.
    pub fn finish(&mut self, token: &Token, epoch: u64) -> bool {
        if epoch != self.epoch || self.current.as_ref() != Some(token) {
            return false;
        }
        self.processed.insert(token.clone());
        self.current = None;
        self.status = PlaybackState::Idle;
        true
    }

    /// Hard reset: empties the queue and every tracking set, returns to `Idle`.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.recency.clear();
        self.processed.clear();
        self.locators.clear();
        self.current = None;
        self.status = PlaybackState::Idle;
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn overlay(&self, next_up: usize) -> OverlayView {
        OverlayView::project(self.current.as_ref(), &self.queue, next_up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(raw: &str) -> Token {
        Token::normalize(raw).unwrap()
    }

    fn queued(state: &mut SessionState, raw: &str) {
        state.queue.enqueue(QueueItem {
            token: tok(raw),
            clip: Url::parse(&format!("http://clips.test/{raw}")).unwrap(),
        });
    }

    #[test]
    fn begin_next_is_a_no_op_while_playing() {
        let mut state = SessionState::new(&QueueConfig::default());
        queued(&mut state, "a");
        queued(&mut state, "b");

        let first = state.begin_next().unwrap();
        assert_eq!(first.token, tok("a"));
        assert_eq!(state.status, PlaybackState::Playing);
        assert!(state.begin_next().is_none());
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn finish_ignores_stale_epoch() {
        let mut state = SessionState::new(&QueueConfig::default());
        queued(&mut state, "a");
        state.begin_next().unwrap();

        assert!(!state.finish(&tok("a"), state.epoch + 1));
        assert!(!state.finish(&tok("b"), state.epoch));
        assert!(state.finish(&tok("a"), state.epoch));
        assert!(state.processed.contains(&tok("a")));
        assert_eq!(state.status, PlaybackState::Idle);
        assert!(state.current.is_none());
    }

    #[test]
    fn reset_clears_everything_and_bumps_epoch() {
        let mut state = SessionState::new(&QueueConfig::default());
        queued(&mut state, "a");
        queued(&mut state, "b");
        state.begin_next().unwrap();
        state.processed.insert(tok("z"));
        let epoch = state.epoch;

        state.reset();

        assert!(state.queue.is_empty());
        assert!(state.processed.is_empty());
        assert!(state.recency.is_empty());
        assert!(state.current.is_none());
        assert_eq!(state.status, PlaybackState::Idle);
        assert_eq!(state.epoch, epoch + 1);
    }
}
