use std::collections::VecDeque;

use reqwest::Url;
use serde::Serialize;

use super::Token;

/// A token admitted for playback together with the clip that renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub token: Token,
    pub clip: Url,
}

/// FIFO of admitted clips awaiting the playback driver.
///
/// Unbounded: burst control is the admission filter's job, not the queue's.
#[derive(Debug, Default, Clone)]
pub struct ClipQueue {
    items: VecDeque<QueueItem>,
}

impl ClipQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    pub fn dequeue_front(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    /// Up to `n` items from the head, without removing them.
    pub fn peek_front(&self, n: usize) -> Vec<QueueItem> {
        self.items.iter().take(n).cloned().collect()
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.items.iter().any(|item| &item.token == token)
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.items.iter().map(|item| item.token.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(token: &str) -> QueueItem {
        QueueItem {
            token: Token::normalize(token).unwrap(),
            clip: Url::parse(&format!("http://clips.test/token-video/{token}")).unwrap(),
        }
    }

    #[test]
    fn dequeues_in_arrival_order() {
        let mut queue = ClipQueue::new();
        queue.enqueue(item("a"));
        queue.enqueue(item("b"));
        queue.enqueue(item("c"));

        assert_eq!(queue.dequeue_front().unwrap().token.as_str(), "a");
        assert_eq!(queue.dequeue_front().unwrap().token.as_str(), "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn peek_is_non_destructive() {
        let mut queue = ClipQueue::new();
        for token in ["a", "b", "c", "d"] {
            queue.enqueue(item(token));
        }

        let peeked: Vec<_> = queue.peek_front(3).into_iter().map(|i| i.token).collect();
        assert_eq!(peeked.len(), 3);
        assert_eq!(peeked[2].as_str(), "c");
        assert_eq!(queue.len(), 4);
        assert!(queue.contains(&Token::normalize("d").unwrap()));

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.peek_front(3).is_empty());
    }
}
