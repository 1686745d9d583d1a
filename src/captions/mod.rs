//! Live caption ingestion: text cleanup, repeat throttling and the feed task
//! that turns captions into admissions.

pub mod feed;

use std::time::Duration;

use tokio::time::Instant;

pub use feed::{CaptionFeed, CaptionSender};

/// Identical captions arriving closer together than this are dropped.
pub const CAPTION_REPEAT_WINDOW: Duration = Duration::from_millis(2000);

/// Drops a word equal (ignoring case) to the one before it. Caption renderers
/// often repeat the trailing word while a line scrolls.
pub fn collapse_repeated_words(text: &str) -> Option<String> {
    let mut kept: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        if let Some(previous) = kept.last() {
            if previous.to_lowercase() == word.to_lowercase() {
                continue;
            }
        }
        kept.push(word);
    }
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(" "))
    }
}

/// Throttle for a caption source that re-emits the same line.
#[derive(Debug)]
pub struct CaptionGate {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl CaptionGate {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True when `caption` should be processed. Only passed captions reset
    /// the window.
    pub fn pass(&mut self, caption: &str, now: Instant) -> bool {
        if let Some((text, at)) = &self.last {
            if text == caption && now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((caption.to_string(), now));
        true
    }
}

impl Default for CaptionGate {
    fn default() -> Self {
        Self::new(CAPTION_REPEAT_WINDOW)
    }
}
