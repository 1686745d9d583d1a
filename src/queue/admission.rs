use std::collections::HashMap;

use reqwest::Url;
use serde::Serialize;
use tokio::time::Instant;

use super::{QueueItem, SessionState, Token};

/// Why a token was kept out of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Processed,
    Playing,
    Recent,
    Queued,
}

/// Outcome of one `admit` call, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdmissionReport {
    pub queued: Vec<Token>,
    pub rejected: Vec<(Token, Rejection)>,
    /// Passed screening but no clip could be found.
    pub unresolved: Vec<Token>,
    /// Screening passed, but the session was reset before resolution finished.
    pub discarded: Vec<Token>,
}

impl AdmissionReport {
    pub fn rejection_for(&self, token: &str) -> Option<Rejection> {
        self.rejected
            .iter()
            .find(|(t, _)| t.as_str() == token)
            .map(|(_, reason)| *reason)
    }
}

impl SessionState {
    /// Cheap, synchronous half of admission.
    ///
    /// Checks run cheapest-first: processed, playing, recency, queued. Tokens
    /// that pass are stamped into the recency set under the same lock, so a
    /// racing `admit` for the same token is rejected while resolution is in
    /// flight. Returns the candidates still needing a clip locator.
    pub fn screen<I, S>(
        &mut self,
        tokens: I,
        now: Instant,
        report: &mut AdmissionReport,
    ) -> Vec<Token>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.recency.sweep(now);

        let mut candidates = Vec::new();
        for raw in tokens {
            let Some(token) = Token::normalize(raw.as_ref()) else {
                continue;
            };

            let rejection = if self.processed.contains(&token) {
                Some(Rejection::Processed)
            } else if self.current.as_ref() == Some(&token) {
                Some(Rejection::Playing)
            } else if self.recency.is_live(&token, now) {
                Some(Rejection::Recent)
            } else if self.queue.contains(&token) {
                Some(Rejection::Queued)
            } else {
                None
            };

            match rejection {
                Some(reason) => report.rejected.push((token, reason)),
                None => {
                    self.recency.record(token.clone(), now);
                    candidates.push(token);
                }
            }
        }
        candidates
    }

    /// Second half of admission: appends resolved candidates to the queue.
    ///
    /// `epoch` is the epoch observed at screening time; if the session has
    /// been reset since, every candidate is discarded.
    pub fn accept_resolved(
        &mut self,
        candidates: Vec<Token>,
        locators: &HashMap<Token, Url>,
        epoch: u64,
        report: &mut AdmissionReport,
    ) {
        if epoch != self.epoch {
            report.discarded.extend(candidates);
            return;
        }

        for token in candidates {
            let Some(clip) = locators.get(&token) else {
                report.unresolved.push(token);
                continue;
            };
            if self.queue.contains(&token) || self.processed.contains(&token) {
                report.discarded.push(token);
                continue;
            }
            self.queue.enqueue(QueueItem {
                token: token.clone(),
                clip: clip.clone(),
            });
            report.queued.push(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queue::{PlaybackState, QueueConfig};

    fn tok(raw: &str) -> Token {
        Token::normalize(raw).unwrap()
    }

    fn locators(tokens: &[&str]) -> HashMap<Token, Url> {
        tokens
            .iter()
            .map(|t| (tok(t), Url::parse(&format!("http://clips.test/{t}")).unwrap()))
            .collect()
    }

    #[test]
    fn recency_window_blocks_then_releases() {
        let mut state = SessionState::new(&QueueConfig::default());
        let t0 = Instant::now();

        let mut report = AdmissionReport::default();
        assert_eq!(state.screen(["hello"], t0, &mut report), vec![tok("hello")]);

        let mut report = AdmissionReport::default();
        let again = state.screen(["hello"], t0 + Duration::from_millis(1000), &mut report);
        assert!(again.is_empty());
        assert_eq!(report.rejection_for("hello"), Some(Rejection::Recent));

        let mut report = AdmissionReport::default();
        let later = state.screen(["hello"], t0 + Duration::from_millis(3100), &mut report);
        assert_eq!(later, vec![tok("hello")]);
    }

    #[test]
    fn screening_order_and_reasons() {
        let mut state = SessionState::new(&QueueConfig::default());
        let now = Instant::now();
        state.processed.insert(tok("done"));
        state.current = Some(tok("live"));
        state.status = PlaybackState::Playing;
        state.queue.enqueue(QueueItem {
            token: tok("waiting"),
            clip: Url::parse("http://clips.test/waiting").unwrap(),
        });

        let mut report = AdmissionReport::default();
        let candidates = state.screen(
            ["  DONE", "live", "waiting", "", "fresh", "Fresh"],
            now,
            &mut report,
        );

        assert_eq!(candidates, vec![tok("fresh")]);
        assert_eq!(report.rejection_for("done"), Some(Rejection::Processed));
        assert_eq!(report.rejection_for("live"), Some(Rejection::Playing));
        assert_eq!(report.rejection_for("waiting"), Some(Rejection::Queued));
        // Second spelling of the same token within the batch hits recency.
        assert_eq!(report.rejection_for("fresh"), Some(Rejection::Recent));
    }

    #[test]
    fn unresolved_tokens_stay_out_but_remain_recent() {
        let mut state = SessionState::new(&QueueConfig::default());
        let now = Instant::now();

        let mut report = AdmissionReport::default();
        let candidates = state.screen(["ghost", "cat"], now, &mut report);
        let epoch = state.epoch;
        state.accept_resolved(candidates, &locators(&["cat"]), epoch, &mut report);

        assert_eq!(report.queued, vec![tok("cat")]);
        assert_eq!(report.unresolved, vec![tok("ghost")]);
        assert!(!state.queue.contains(&tok("ghost")));

        let mut retry = AdmissionReport::default();
        let candidates = state.screen(["ghost"], now + Duration::from_millis(500), &mut retry);
        assert!(candidates.is_empty());
        assert_eq!(retry.rejection_for("ghost"), Some(Rejection::Recent));
    }

    #[test]
    fn reset_between_screen_and_accept_discards() {
        let mut state = SessionState::new(&QueueConfig::default());
        let mut report = AdmissionReport::default();
        let candidates = state.screen(["cat"], Instant::now(), &mut report);
        let epoch = state.epoch;

        state.reset();
        state.accept_resolved(candidates, &locators(&["cat"]), epoch, &mut report);

        assert!(state.queue.is_empty());
        assert_eq!(report.discarded, vec![tok("cat")]);
    }
}
