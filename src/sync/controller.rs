use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Result};
use reqwest::Url;
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{locator_from, TokenBackend},
    queue::{ReverseSession, Token},
};

use super::{
    clock::PlaybackClock,
    config::{RewindPolicy, SyncConfig},
    segment::{due_segments, lookahead_segments, normalize_segments, RawSegment, TranscriptSegment},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Tokens (and optionally a composed clip) fetched ahead of a segment's start.
#[derive(Debug, Clone)]
pub struct PrefetchedSegment {
    pub tokens: Vec<String>,
    pub composed_clip: Option<Url>,
}

/// What one poll of the host clock did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub time: Duration,
    pub admitted: Vec<usize>,
    pub prefetching: Vec<usize>,
    pub rearmed: Vec<usize>,
}

#[derive(Debug, Default)]
struct SyncState {
    status: SyncStatus,
    segments: Arc<Vec<TranscriptSegment>>,
    admitted: BTreeSet<usize>,
    last_time: Option<Duration>,
    prefetched: HashMap<usize, PrefetchedSegment>,
    /// Segments a prefetch was started for, successful or not.
    prefetch_attempted: HashSet<usize>,
    /// Admitted segments whose tokens have not reached the session yet.
    admitting: usize,
    /// Bumped on every start; prefetch results from an older run are dropped.
    generation: u64,
}

/// Drives segment admission from the host video's clock.
#[derive(Clone)]
pub struct TranscriptSync {
    state: Arc<Mutex<SyncState>>,
    session: ReverseSession,
    clock: Arc<dyn PlaybackClock>,
    config: SyncConfig,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl TranscriptSync {
    pub fn new(session: ReverseSession, clock: Arc<dyn PlaybackClock>, config: SyncConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SyncState::default())),
            session,
            clock,
            config,
            ticker: Arc::new(Mutex::new(None)),
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn session(&self) -> &ReverseSession {
        &self.session
    }

    pub async fn status(&self) -> SyncStatus {
        self.state.lock().await.status
    }

    pub async fn admitted(&self) -> BTreeSet<usize> {
        self.state.lock().await.admitted.clone()
    }

    pub async fn prefetched(&self, index: usize) -> Option<PrefetchedSegment> {
        self.state.lock().await.prefetched.get(&index).cloned()
    }

    /// True once every segment has been admitted and handed to the session.
    pub async fn is_exhausted(&self) -> bool {
        let state = self.state.lock().await;
        state.admitting == 0 && state.admitted.len() >= state.segments.len()
    }

    /// Normalizes the transcript and starts polling. Returns the number of
    /// segments kept after normalization.
    pub async fn start(&self, raw: &[RawSegment]) -> Result<usize> {
        let segments = normalize_segments(raw, &self.config.merge);
        let count = segments.len();

        {
            let mut state = self.state.lock().await;
            if state.status != SyncStatus::Stopped {
                bail!("transcript sync already active");
            }
            let generation = state.generation.wrapping_add(1);
            *state = SyncState {
                status: SyncStatus::Running,
                segments: Arc::new(segments),
                generation,
                ..SyncState::default()
            };
        }

        self.session.set_running(true).await;
        self.spawn_ticker().await;

        log_info!(
            "transcript sync started with {} segments (poll {:?})",
            count,
            self.config.poll_interval
        );
        Ok(count)
    }

    /// Stops future polls. A poll already in flight runs to completion.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().await;
            if state.status == SyncStatus::Stopped {
                return;
            }
            state.status = SyncStatus::Stopped;
        }
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        // Detach rather than abort so an in-flight admission can land.
        self.ticker.lock().await.take();
        log_info!("transcript sync stopped");
    }

    /// Host video paused.
    pub async fn pause(&self) {
        {
            let mut state = self.state.lock().await;
            if state.status != SyncStatus::Running {
                return;
            }
            state.status = SyncStatus::Paused;
        }
        self.session.set_running(false).await;
    }

    /// Host video resumed.
    pub async fn play(&self) {
        {
            let mut state = self.state.lock().await;
            if state.status != SyncStatus::Paused {
                return;
            }
            state.status = SyncStatus::Running;
        }
        self.session.set_running(true).await;
    }

    /// Reads the clock once, admits due segments and kicks off prefetches.
    pub async fn poll_once(&self) -> TickReport {
        let now = self.clock.current_time();
        let mut report = TickReport {
            time: now,
            ..TickReport::default()
        };

        let (segments, generation) = {
            let mut state = self.state.lock().await;
            if state.status == SyncStatus::Stopped {
                return report;
            }

            if let Some(previous) = state.last_time {
                if now + self.config.admit_tolerance < previous {
                    report.rearmed = self.on_rewind(&mut state, now);
                }
            }
            state.last_time = Some(now);

            let due = due_segments(
                &state.segments,
                &state.admitted,
                now,
                self.config.admit_tolerance,
            );
            // Marked before any await so a concurrent poll cannot admit twice.
            state.admitted.extend(due.iter().copied());
            state.admitting += due.len();
            report.admitted = due;

            let ahead: Vec<usize> = lookahead_segments(
                &state.segments,
                &state.admitted,
                now,
                self.config.admit_tolerance,
                self.config.prefetch_window,
            )
            .into_iter()
            .filter(|index| !state.prefetch_attempted.contains(index))
            .collect();
            state.prefetch_attempted.extend(ahead.iter().copied());
            report.prefetching = ahead;

            (Arc::clone(&state.segments), state.generation)
        };

        for &index in &report.prefetching {
            self.spawn_prefetch(index, segments[index].text.clone(), generation);
        }

        for &index in &report.admitted {
            let segment = &segments[index];
            match self.segment_tokens(index, &segment.text).await {
                Ok(tokens) => {
                    log_debug!(
                        "segment {} @{:?} -> {:?}",
                        index,
                        segment.start,
                        tokens
                    );
                    self.session.admit(tokens).await;
                }
                Err(err) => {
                    log_warn!("segment {} dropped, tokenization failed: {err:#}", index);
                }
            }

            let mut state = self.state.lock().await;
            if state.generation == generation {
                state.admitting = state.admitting.saturating_sub(1);
            }
        }

        report
    }

    fn on_rewind(&self, state: &mut SyncState, now: Duration) -> Vec<usize> {
        log_info!("host clock rewound to {:?}", now);
        if self.config.rewind_policy != RewindPolicy::Rearm {
            return Vec::new();
        }

        let horizon = now + self.config.admit_tolerance;
        let rearmed: Vec<usize> = state
            .admitted
            .iter()
            .copied()
            .filter(|&index| state.segments[index].start > horizon)
            .collect();
        for index in &rearmed {
            state.admitted.remove(index);
        }
        rearmed
    }

    async fn segment_tokens(&self, index: usize, text: &str) -> Result<Vec<String>> {
        let cached = {
            let state = self.state.lock().await;
            state.prefetched.get(&index).map(|p| p.tokens.clone())
        };
        if let Some(tokens) = cached {
            return Ok(tokens);
        }
        let fetched = fetch_segment(self.session.backend().as_ref(), &self.config, text).await?;
        Ok(fetched.tokens)
    }

    fn spawn_prefetch(&self, index: usize, text: String, generation: u64) {
        let this = self.clone();
        tokio::spawn(async move {
            let backend = this.session.backend();
            let fetched = match fetch_segment(backend.as_ref(), &this.config, &text).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    log_debug!("prefetch for segment {} failed: {err:#}", index);
                    return;
                }
            };

            let tokens: Vec<Token> = fetched
                .tokens
                .iter()
                .filter_map(|t| Token::normalize(t))
                .collect();
            if let Err(err) = this.session.prefetch_locators(&tokens).await {
                log_debug!("locator prefetch for segment {} failed: {err:#}", index);
            }

            let mut state = this.state.lock().await;
            if state.generation == generation {
                state.prefetched.insert(index, fetched);
            }
        });
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(this.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log_debug!("sync ticker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        this.poll_once().await;
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }
}

async fn fetch_segment(
    backend: &dyn TokenBackend,
    config: &SyncConfig,
    text: &str,
) -> Result<PrefetchedSegment> {
    if config.compose_segments {
        let composed = backend.compose_segment(text, config.use_llm).await?;
        let composed_clip = match locator_from(backend.base_url(), &composed.video_url) {
            Ok(url) => Some(url),
            Err(err) => {
                log_warn!("ignoring composed clip: {err:#}");
                None
            }
        };
        return Ok(PrefetchedSegment {
            tokens: composed.tokens,
            composed_clip,
        });
    }

    let reply = backend.tokenize(text).await?;
    if !reply.missing.is_empty() {
        log_warn!("no clips for {:?}", reply.missing);
    }
    Ok(PrefetchedSegment {
        tokens: reply.tokens,
        composed_clip: None,
    })
}
