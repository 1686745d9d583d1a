use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use super::Token;

/// Last-admission timestamps, used to suppress re-admission within a TTL.
///
/// Entries are swept lazily from a time-ordered log on each admission attempt,
/// so the map never holds more than one TTL's worth of tokens.
#[derive(Debug, Clone)]
pub struct RecencySet {
    ttl: Duration,
    latest: HashMap<Token, Instant>,
    log: VecDeque<(Instant, Token)>,
}

impl RecencySet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            latest: HashMap::new(),
            log: VecDeque::new(),
        }
    }

    /// Drops every entry whose TTL has elapsed at `now`.
    pub fn sweep(&mut self, now: Instant) {
        while let Some((stamp, _)) = self.log.front() {
            if now.saturating_duration_since(*stamp) < self.ttl {
                break;
            }
            let Some((stamp, token)) = self.log.pop_front() else {
                break;
            };
            // A later `record` for the same token superseded this log entry.
            if self.latest.get(&token) == Some(&stamp) {
                self.latest.remove(&token);
            }
        }
    }

    pub fn is_live(&self, token: &Token, now: Instant) -> bool {
        self.latest
            .get(token)
            .is_some_and(|stamp| now.saturating_duration_since(*stamp) < self.ttl)
    }

    pub fn record(&mut self, token: Token, now: Instant) {
        self.latest.insert(token.clone(), now);
        self.log.push_back((now, token));
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn clear(&mut self) {
        self.latest.clear();
        self.log.clear();
    }
}

/// Tokens that finished playback (successfully or not).
///
/// Unbounded by default. With a capacity the oldest entries are forgotten
/// first, which lets long-running sessions replay very old tokens.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    capacity: Option<usize>,
    members: HashSet<Token>,
    order: VecDeque<Token>,
}

impl ProcessedSet {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            members: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, token: Token) {
        if !self.members.insert(token.clone()) {
            return;
        }
        self.order.push_back(token);

        if let Some(capacity) = self.capacity {
            while self.members.len() > capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.members.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.members.contains(token)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }
}
