use std::fmt;

use serde::Serialize;

use crate::queue::{ClipQueue, Token};

const WAITING_CAPTION: &str = "Waiting for tokens…";

/// What the overlay shows: the clip on screen and what comes next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverlayView {
    pub now: Option<Token>,
    pub next: Vec<Token>,
}

impl OverlayView {
    pub fn project(current: Option<&Token>, queue: &ClipQueue, next_up: usize) -> Self {
        Self {
            now: current.cloned(),
            next: queue
                .peek_front(next_up)
                .into_iter()
                .map(|item| item.token)
                .collect(),
        }
    }

    /// Caption string, e.g. `Now: HELLO | Next: HOW · ARE · YOU`.
    pub fn caption(&self) -> String {
        let next = self
            .next
            .iter()
            .map(Token::display_label)
            .collect::<Vec<_>>()
            .join(" · ");

        match (&self.now, next.is_empty()) {
            (None, true) => WAITING_CAPTION.to_string(),
            (None, false) => format!("Next: {next}"),
            (Some(now), true) => format!("Now: {}", now.display_label()),
            (Some(now), false) => format!("Now: {} | Next: {next}", now.display_label()),
        }
    }
}

impl fmt::Display for OverlayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.caption())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::*;
    use crate::queue::QueueItem;

    fn queue_of(tokens: &[&str]) -> ClipQueue {
        let mut queue = ClipQueue::new();
        for t in tokens {
            queue.enqueue(QueueItem {
                token: Token::normalize(t).unwrap(),
                clip: Url::parse(&format!("http://clips.test/{t}")).unwrap(),
            });
        }
        queue
    }

    #[test]
    fn empty_overlay_waits() {
        let view = OverlayView::project(None, &ClipQueue::new(), 3);
        assert_eq!(view.caption(), "Waiting for tokens…");
    }

    #[test]
    fn shows_current_and_three_next() {
        let current = Token::normalize("hello").unwrap();
        let view = OverlayView::project(Some(&current), &queue_of(&["how", "are", "you", "today"]), 3);
        assert_eq!(view.caption(), "Now: HELLO | Next: HOW · ARE · YOU");
    }

    #[test]
    fn partial_views() {
        let current = Token::normalize("bye").unwrap();
        assert_eq!(
            OverlayView::project(Some(&current), &ClipQueue::new(), 3).caption(),
            "Now: BYE"
        );
        assert_eq!(
            OverlayView::project(None, &queue_of(&["a", "b"]), 3).to_string(),
            "Next: A · B"
        );
    }
}
