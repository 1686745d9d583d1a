use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Url;

use crate::queue::Token;

use super::{
    parse_base_url, ComposeSegmentResponse, FrameDetection, RecognitionBackend, TokenBackend,
    TokenizeResponse,
};

/// In-memory backend over a fixed vocabulary.
///
/// Tokenizes by whitespace against the vocabulary and resolves every
/// vocabulary word to `{base}/token-video/{word}`. Failures and latency can be
/// injected to exercise the degraded paths.
pub struct StaticBackend {
    base: Url,
    vocabulary: HashSet<String>,
    without_clip: Mutex<HashSet<String>>,
    fail_tokenize: AtomicBool,
    fail_batch: AtomicBool,
    latency: Mutex<Duration>,
    tokenize_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    compose_calls: AtomicUsize,
    detections: Mutex<Vec<FrameDetection>>,
}

impl StaticBackend {
    pub fn new<I, S>(base_url: &str, vocabulary: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            base: parse_base_url(base_url)?,
            vocabulary: vocabulary
                .into_iter()
                .filter_map(|word| Token::normalize(word.as_ref()))
                .map(|token| token.as_str().to_string())
                .collect(),
            without_clip: Mutex::new(HashSet::new()),
            fail_tokenize: AtomicBool::new(false),
            fail_batch: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            tokenize_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            compose_calls: AtomicUsize::new(0),
            detections: Mutex::new(Vec::new()),
        })
    }

    /// Keeps `word` in the vocabulary but reports no clip for it.
    pub fn without_clip(&self, word: &str) {
        if let Ok(mut set) = self.without_clip.lock() {
            set.insert(word.to_lowercase());
        }
    }

    pub fn fail_tokenize(&self, fail: bool) {
        self.fail_tokenize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_batch(&self, fail: bool) {
        self.fail_batch.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every call, measured on the tokio clock.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Detections returned by successive `infer_frame` calls.
    pub fn queue_detections(&self, detections: impl IntoIterator<Item = FrameDetection>) {
        if let Ok(mut guard) = self.detections.lock() {
            guard.extend(detections);
        }
    }

    pub fn tokenize_calls(&self) -> usize {
        self.tokenize_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn compose_calls(&self) -> usize {
        self.compose_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().map(|d| *d).unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn split(&self, text: &str) -> TokenizeResponse {
        let mut all: Vec<String> = Vec::new();
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() || all.last() == Some(&word) {
                continue;
            }
            all.push(word);
        }

        let (tokens, missing) = all
            .iter()
            .cloned()
            .partition(|word| self.vocabulary.contains(word));

        let mut available: Vec<String> = self.vocabulary.iter().cloned().collect();
        available.sort();

        TokenizeResponse {
            tokens,
            tokens_all: all,
            missing,
            available,
        }
    }

    fn has_clip(&self, word: &str) -> bool {
        let hidden = self
            .without_clip
            .lock()
            .map(|set| set.contains(word))
            .unwrap_or(false);
        self.vocabulary.contains(word) && !hidden
    }
}

#[async_trait]
impl TokenBackend for StaticBackend {
    fn base_url(&self) -> &Url {
        &self.base
    }

    async fn tokenize(&self, text: &str) -> Result<TokenizeResponse> {
        self.tokenize_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_tokenize.load(Ordering::SeqCst) {
            bail!("tokenize-text unavailable");
        }
        if text.trim().is_empty() {
            bail!("no text provided");
        }
        Ok(self.split(text))
    }

    async fn batch_clip_locators(&self, tokens: &[Token]) -> Result<HashMap<Token, Url>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_batch.load(Ordering::SeqCst) {
            bail!("batch-token-videos unavailable");
        }

        let mut resolved = HashMap::new();
        for token in tokens {
            if self.has_clip(token.as_str()) {
                resolved.insert(token.clone(), self.token_clip_url(token)?);
            }
        }
        Ok(resolved)
    }

    async fn compose_segment(&self, text: &str, _use_llm: bool) -> Result<ComposeSegmentResponse> {
        let call = self.compose_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_tokenize.load(Ordering::SeqCst) {
            bail!("reverse-translate-segment unavailable");
        }
        Ok(ComposeSegmentResponse {
            video_url: format!("/outputs/segment-{call}.mp4"),
            tokens: self.split(text).tokens,
        })
    }
}

#[async_trait]
impl RecognitionBackend for StaticBackend {
    async fn infer_frame(&self, _jpeg: Vec<u8>) -> Result<FrameDetection> {
        self.simulate_latency().await;
        let mut queued = match self.detections.lock() {
            Ok(guard) => guard,
            Err(_) => bail!("detection queue poisoned"),
        };
        if queued.is_empty() {
            return Ok(FrameDetection::default());
        }
        Ok(queued.remove(0))
    }

    async fn sentence_from_words(&self, words: &[String]) -> Result<String> {
        self.simulate_latency().await;
        if self.fail_tokenize.load(Ordering::SeqCst) {
            bail!("process-confirmed-words unavailable");
        }
        Ok(words.join(" "))
    }
}
