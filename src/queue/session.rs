use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use reqwest::Url;
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    backend::TokenBackend,
    overlay::OverlayView,
    playback::{PlaybackEvent, PlaybackOutcome, PlaybackReporter, PlaybackSurface},
};

use super::{AdmissionReport, PlaybackState, QueueConfig, ResolutionStrategy, SessionState, Token};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: PlaybackState,
    pub current: Option<Token>,
    pub queued: Vec<Token>,
    pub processed_count: usize,
    pub running: bool,
}

/// One overlay's clip queue, admission filter and playback driver.
///
/// Cheap to clone; clones share the same session. Playback completion flows
/// back from the surface over a channel into a single driver task, which is
/// the only place a finished clip gets retired.
#[derive(Clone)]
pub struct ReverseSession {
    id: String,
    config: QueueConfig,
    state: Arc<Mutex<SessionState>>,
    backend: Arc<dyn TokenBackend>,
    surface: Arc<dyn PlaybackSurface>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    overlay: Arc<watch::Sender<OverlayView>>,
    driver: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel: CancellationToken,
}

impl ReverseSession {
    /// Creates the session and spawns its driver task. Must be called inside
    /// a tokio runtime.
    pub fn start(
        backend: Arc<dyn TokenBackend>,
        surface: Arc<dyn PlaybackSurface>,
        config: QueueConfig,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (overlay, _) = watch::channel(OverlayView::default());

        let session = Self {
            id: Uuid::new_v4().to_string(),
            state: Arc::new(Mutex::new(SessionState::new(&config))),
            config,
            backend,
            surface,
            events,
            overlay: Arc::new(overlay),
            driver: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        };

        let handle = tokio::spawn(drive(session.clone(), events_rx, session.cancel.clone()));
        if let Ok(mut guard) = session.driver.try_lock() {
            *guard = Some(handle);
        }

        log_info!("reverse session {} started", session.id);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> Arc<dyn TokenBackend> {
        Arc::clone(&self.backend)
    }

    /// Receiver of overlay updates; the current value is always fresh.
    pub fn subscribe_overlay(&self) -> watch::Receiver<OverlayView> {
        self.overlay.subscribe()
    }

    pub fn overlay(&self) -> OverlayView {
        self.overlay.borrow().clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            session_id: self.id.clone(),
            state: state.status,
            current: state.current.clone(),
            queued: state.queue.tokens(),
            processed_count: state.processed.len(),
            running: state.running,
        }
    }

    /// Runs a batch of raw tokens through the admission filter, resolves
    /// clips for the survivors, queues them and kicks the driver.
    pub async fn admit<I, S>(&self, tokens: I) -> AdmissionReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = AdmissionReport::default();

        let (candidates, epoch, cached) = {
            let mut state = self.state.lock().await;
            let candidates = state.screen(tokens, Instant::now(), &mut report);
            let cached: HashMap<Token, Url> = candidates
                .iter()
                .filter_map(|t| state.locators.get(t).map(|url| (t.clone(), url.clone())))
                .collect();
            (candidates, state.epoch, cached)
        };

        if !candidates.is_empty() {
            let uncached: Vec<Token> = candidates
                .iter()
                .filter(|t| !cached.contains_key(*t))
                .cloned()
                .collect();
            let mut locators = self.resolve(&uncached).await;
            locators.extend(cached);

            let mut state = self.state.lock().await;
            state.accept_resolved(candidates, &locators, epoch, &mut report);
        }

        for token in &report.unresolved {
            log_warn!("no clip for '{}', dropped", token);
        }
        if !report.discarded.is_empty() {
            log_debug!("discarded {} stale admissions", report.discarded.len());
        }
        if !report.queued.is_empty() {
            log_info!("queued {:?}", report.queued);
        }

        self.publish_overlay().await;
        self.advance().await;
        report
    }

    /// Clip locators for `tokens` per the configured strategy. Batch failure
    /// degrades to per-token URLs rather than losing the batch.
    async fn resolve(&self, tokens: &[Token]) -> HashMap<Token, Url> {
        if tokens.is_empty() {
            return HashMap::new();
        }

        if self.config.resolution == ResolutionStrategy::Batch {
            match self.backend.batch_clip_locators(tokens).await {
                Ok(resolved) => return resolved,
                Err(err) => {
                    log_warn!("batch resolution failed, using per-token urls: {err:#}");
                }
            }
        }

        self.per_token_locators(tokens)
    }

    fn per_token_locators(&self, tokens: &[Token]) -> HashMap<Token, Url> {
        let mut resolved = HashMap::new();
        for token in tokens {
            match self.backend.token_clip_url(token) {
                Ok(url) => {
                    resolved.insert(token.clone(), url);
                }
                Err(err) => log_warn!("cannot build clip url for '{}': {err:#}", token),
            }
        }
        resolved
    }

    /// Stores pre-resolved locators so later admissions skip the round trip.
    pub async fn prime_locators(&self, locators: HashMap<Token, Url>) {
        if locators.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        state.locators.extend(locators);
    }

    /// Pre-resolves `tokens` into the locator cache without admitting them.
    pub async fn prefetch_locators(&self, tokens: &[Token]) -> Result<usize> {
        let missing: Vec<Token> = {
            let state = self.state.lock().await;
            tokens
                .iter()
                .filter(|t| !state.locators.contains_key(*t) && !state.processed.contains(t))
                .cloned()
                .collect()
        };
        if missing.is_empty() || self.config.resolution == ResolutionStrategy::PerToken {
            return Ok(0);
        }
        let resolved = self.backend.batch_clip_locators(&missing).await?;
        let count = resolved.len();
        self.prime_locators(resolved).await;
        Ok(count)
    }

    /// Starts the next clip unless one is already playing.
    pub async fn advance(&self) {
        let (item, epoch, autoplay) = {
            let mut state = self.state.lock().await;
            let Some(item) = state.begin_next() else {
                return;
            };
            (item, state.epoch, state.running)
        };

        log_info!("playing '{}' ({})", item.token, item.clip);
        self.publish_overlay().await;

        let reporter = PlaybackReporter::new(item.token.clone(), epoch, self.events.clone());
        if let Err(err) = self.surface.load(&item, autoplay, reporter.clone()).await {
            reporter.failed(format!("{err:#}"));
            return;
        }

        // clear() or set_running() may have run while the clip was binding.
        let (epoch_now, running_now) = {
            let state = self.state.lock().await;
            (state.epoch, state.running)
        };
        let followup = if epoch_now != epoch {
            log_debug!("'{}' bound after a clear, halting", item.token);
            self.surface.halt().await
        } else if running_now != autoplay {
            if running_now {
                self.surface.resume().await
            } else {
                self.surface.pause().await
            }
        } else {
            Ok(())
        };
        if let Err(err) = followup {
            log_warn!("surface did not settle after load: {err:#}");
        }
    }

    /// Host video play/pause. Only gates autoplay; never admission.
    pub async fn set_running(&self, running: bool) {
        let playing = {
            let mut state = self.state.lock().await;
            state.running = running;
            state.status == PlaybackState::Playing
        };

        if playing {
            let result = if running {
                self.surface.resume().await
            } else {
                self.surface.pause().await
            };
            if let Err(err) = result {
                log_warn!("surface did not follow play/pause: {err:#}");
            }
        }

        if running {
            self.advance().await;
        }
    }

    /// Hard reset: empties the queue and tracking sets, halts playback.
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock().await;
            state.reset();
        }
        if let Err(err) = self.surface.halt().await {
            log_warn!("surface halt failed: {err:#}");
        }
        self.publish_overlay().await;
        log_info!("reverse session {} cleared", self.id);
    }

    /// Stops the driver task. Late playback reports are dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.driver.lock().await.take() {
            let _ = handle.await;
        }
        log_info!("reverse session {} stopped", self.id);
    }

    async fn on_playback_event(&self, event: PlaybackEvent) {
        let finished = {
            let mut state = self.state.lock().await;
            state.finish(&event.token, event.epoch)
        };
        if !finished {
            log_debug!("ignoring stale playback report for '{}'", event.token);
            return;
        }

        match &event.outcome {
            PlaybackOutcome::Ended => log_debug!("finished '{}'", event.token),
            PlaybackOutcome::Failed(reason) => {
                log_warn!("clip '{}' failed, skipping: {reason}", event.token)
            }
        }

        self.publish_overlay().await;
        self.advance().await;
    }

    async fn publish_overlay(&self) {
        // Sent under the lock so concurrent publishers cannot reorder views.
        let state = self.state.lock().await;
        let view = state.overlay(self.config.next_up);
        self.overlay.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

async fn drive(
    session: ReverseSession,
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                // The session itself holds a sender, so this only ends on shutdown.
                let Some(event) = event else {
                    break;
                };
                session.on_playback_event(event).await;
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::StaticBackend;
    use crate::playback::ManualSurface;
    use crate::queue::Rejection;

    const VOCAB: [&str; 6] = ["hello", "how", "are", "you", "a", "b"];

    fn setup() -> (ReverseSession, Arc<StaticBackend>, Arc<ManualSurface>) {
        let backend = Arc::new(StaticBackend::new("http://clips.test", VOCAB).unwrap());
        let surface = Arc::new(ManualSurface::new());
        let session = ReverseSession::start(backend.clone(), surface.clone(), QueueConfig::default());
        (session, backend, surface)
    }

    fn tok(raw: &str) -> Token {
        Token::normalize(raw).unwrap()
    }

    /// Lets the driver task drain pending playback events.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn plays_in_order_and_self_advances() {
        let (session, _, surface) = setup();

        let report = session.admit(["hello", "how", "are"]).await;
        assert_eq!(report.queued, vec![tok("hello"), tok("how"), tok("are")]);

        let snap = session.snapshot().await;
        assert_eq!(snap.state, PlaybackState::Playing);
        assert_eq!(snap.current, Some(tok("hello")));
        assert_eq!(snap.queued, vec![tok("how"), tok("are")]);

        // A second advance while playing is a no-op.
        session.advance().await;
        assert_eq!(surface.loaded_tokens(), vec![tok("hello")]);

        surface.end_current();
        settle().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current, Some(tok("how")));
        assert_eq!(snap.processed_count, 1);
        assert_eq!(surface.loaded_tokens(), vec![tok("hello"), tok("how")]);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_never_holds_duplicates() {
        let (session, _, _) = setup();

        session.admit(["a", "b", "hello", "how"]).await;
        let report = session.admit(["b", "how", "HOW", "b"]).await;
        assert!(report.queued.is_empty());

        let queued = session.snapshot().await.queued;
        let mut deduped = queued.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(queued.len(), deduped.len());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_clip_counts_as_played() {
        let (session, _, surface) = setup();
        session.admit(["a", "b"]).await;

        surface.fail_current("decode error");
        settle().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current, Some(tok("b")));
        assert_eq!(snap.processed_count, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        let report = session.admit(["a"]).await;
        assert_eq!(report.rejection_for("a"), Some(Rejection::Processed));
    }

    #[tokio::test(start_paused = true)]
    async fn load_error_does_not_stall_the_queue() {
        let (session, _, surface) = setup();
        surface.reject_next_load();

        session.admit(["a", "b"]).await;
        settle().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current, Some(tok("b")));
        assert_eq!(surface.loaded_tokens(), vec![tok("a"), tok("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_token_is_dropped_and_stays_recent() {
        let (session, backend, _) = setup();
        backend.without_clip("you");

        let report = session.admit(["you"]).await;
        assert_eq!(report.unresolved, vec![tok("you")]);
        assert!(session.snapshot().await.current.is_none());

        tokio::time::advance(Duration::from_millis(1000)).await;
        let report = session.admit(["you"]).await;
        assert_eq!(report.rejection_for("you"), Some(Rejection::Recent));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_failure_falls_back_to_per_token_urls() {
        let (session, backend, surface) = setup();
        backend.fail_batch(true);

        let report = session.admit(["hello"]).await;
        assert_eq!(report.queued, vec![tok("hello")]);
        let (item, _) = surface.last_load().unwrap();
        assert_eq!(item.clip.as_str(), "http://clips.test/token-video/hello");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_mid_playback_resets_everything() {
        let (session, _, surface) = setup();
        session.admit(["hello", "how", "are"]).await;
        surface.end_current();
        settle().await;

        session.clear().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.state, PlaybackState::Idle);
        assert!(snap.current.is_none());
        assert!(snap.queued.is_empty());
        assert_eq!(snap.processed_count, 0);
        assert_eq!(surface.halt_count(), 1);
        assert_eq!(session.overlay().caption(), "Waiting for tokens…");

        let report = session.admit(["hello", "how", "are"]).await;
        assert_eq!(report.queued, vec![tok("hello"), tok("how"), tok("are")]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_report_after_clear_is_ignored() {
        let (session, _, surface) = setup();
        session.admit(["a"]).await;

        let (tx_token, epoch) = (tok("a"), 0);
        session.clear().await;
        session.admit(["a", "b"]).await;

        // Report from the pre-clear clip of "a".
        PlaybackReporter::new(tx_token, epoch, session.events.clone()).ended();
        settle().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current, Some(tok("a")));
        assert_eq!(snap.processed_count, 0);
        assert_eq!(surface.pending_token(), Some(tok("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_host_loads_without_autoplay() {
        let (session, _, surface) = setup();
        session.set_running(false).await;

        let report = session.admit(["hello"]).await;
        assert_eq!(report.queued, vec![tok("hello")]);
        let (_, autoplay) = surface.last_load().unwrap();
        assert!(!autoplay);
        assert!(surface.is_paused());

        session.set_running(true).await;
        assert!(!surface.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_tracks_queue() {
        let (session, _, surface) = setup();
        let mut rx = session.subscribe_overlay();

        session.admit(["hello", "how", "are", "you", "a"]).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().caption(),
            "Now: HELLO | Next: HOW · ARE · YOU"
        );

        surface.end_current();
        settle().await;
        assert_eq!(session.overlay().caption(), "Now: HOW | Next: ARE · YOU · A");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_admits_queue_once() {
        let (session, backend, _) = setup();
        backend.set_latency(Duration::from_millis(50));

        let (first, second) = tokio::join!(session.admit(["hello"]), session.admit(["hello"]));

        let queued = first.queued.len() + second.queued.len();
        assert_eq!(queued, 1);
        let rejected = first.rejected.len() + second.rejected.len();
        assert_eq!(rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn prefetched_locators_skip_the_backend() {
        let (session, backend, _) = setup();
        let fetched = session.prefetch_locators(&[tok("a"), tok("b")]).await.unwrap();
        assert_eq!(fetched, 2);
        assert_eq!(backend.batch_calls(), 1);

        session.admit(["a", "b"]).await;
        assert_eq!(backend.batch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_during_a_slow_load_halts_the_bound_clip() {
        let (session, _, surface) = setup();
        surface.set_load_delay(Duration::from_millis(100));

        let admit = tokio::spawn({
            let session = session.clone();
            async move { session.admit(["hello"]).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.clear().await;
        admit.await.unwrap();

        let snap = session.snapshot().await;
        assert_eq!(snap.state, PlaybackState::Idle);
        assert!(snap.current.is_none());
        assert_eq!(surface.pending_token(), None);
        assert_eq!(surface.halt_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_during_a_slow_load_is_not_overridden() {
        let (session, _, surface) = setup();
        surface.set_load_delay(Duration::from_millis(100));

        let admit = tokio::spawn({
            let session = session.clone();
            async move { session.admit(["hello"]).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.set_running(false).await;
        admit.await.unwrap();

        let (_, autoplay) = surface.last_load().unwrap();
        assert!(autoplay);
        assert!(surface.is_paused());
        assert_eq!(surface.pending_token(), Some(tok("hello")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlay_matches_state_after_concurrent_mutations() {
        let (session, _, surface) = setup();

        let tasks: Vec<_> = VOCAB
            .iter()
            .map(|word| {
                let session = session.clone();
                tokio::spawn(async move { session.admit([*word]).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        surface.end_current();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snap = session.snapshot().await;
        let expected = OverlayView {
            now: snap.current.clone(),
            next: snap.queued.iter().take(3).cloned().collect(),
        };
        assert_eq!(session.overlay(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_driver() {
        let (session, _, surface) = setup();
        session.admit(["a", "b"]).await;
        session.shutdown().await;

        surface.end_current();
        settle().await;
        assert_eq!(session.snapshot().await.current, Some(tok("a")));
    }
}
