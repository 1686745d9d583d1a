use anyhow::{bail, Context, Result};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::queue::ReverseSession;

use super::{collapse_repeated_words, CaptionGate};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Handle for pushing caption text into a running feed. Clone one per source
/// (observer, poller, stdin).
#[derive(Debug, Clone)]
pub struct CaptionSender {
    tx: mpsc::UnboundedSender<String>,
}

impl CaptionSender {
    /// Returns false once the feed has stopped.
    pub fn send(&self, caption: impl Into<String>) -> bool {
        self.tx.send(caption.into()).is_ok()
    }
}

pub struct CaptionFeed {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    sender: Option<CaptionSender>,
}

impl CaptionFeed {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            sender: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, session: ReverseSession) -> Result<CaptionSender> {
        if self.handle.is_some() {
            bail!("caption feed already active");
        }

        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = CaptionSender { tx };

        let handle = tokio::spawn(caption_loop(session, rx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.sender = Some(sender.clone());
        Ok(sender)
    }

    /// Processes every caption already sent, then ends the feed. Callers must
    /// drop their own senders first or this waits for them.
    pub async fn finish(&mut self) -> Result<()> {
        self.sender.take();
        self.cancel_token.take();

        if let Some(handle) = self.handle.take() {
            handle.await.context("caption feed task failed to join")
        } else {
            Ok(())
        }
    }

    /// Stops taking captions. A caption already being tokenized finishes first.
    pub async fn stop(&mut self) -> Result<()> {
        self.sender.take();
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("caption feed task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for CaptionFeed {
    fn default() -> Self {
        Self::new()
    }
}

async fn caption_loop(
    session: ReverseSession,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel_token: CancellationToken,
) {
    let mut gate = CaptionGate::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("caption feed shutting down");
                break;
            }
            caption = rx.recv() => {
                let Some(caption) = caption else {
                    break;
                };
                process_caption(&session, &mut gate, &caption).await;
            }
        }
    }
}

async fn process_caption(session: &ReverseSession, gate: &mut CaptionGate, raw: &str) {
    let Some(text) = collapse_repeated_words(raw) else {
        return;
    };
    if !gate.pass(&text, Instant::now()) {
        log_debug!("repeated caption skipped: {text}");
        return;
    }

    let reply = match session.backend().tokenize(&text).await {
        Ok(reply) => reply,
        Err(err) => {
            log_warn!("caption tokenization failed: {err:#}");
            return;
        }
    };

    if !reply.missing.is_empty() {
        log_warn!("no clips for {:?}", reply.missing);
    }
    if reply.tokens.is_empty() {
        log_debug!("caption '{text}' mapped to no tokens");
        return;
    }

    session.admit(reply.tokens).await;
}
