//! Camera-side sign recognition: per-frame detections are voted into
//! confirmed words, which the backend turns into a sentence.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;

use crate::backend::{FrameDetection, RecognitionBackend};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const INFER_TIMEOUT: Duration = Duration::from_secs(2);

/// Majority vote over a window of confident detections.
#[derive(Debug, Clone)]
pub struct WordConfirmer {
    threshold: f64,
    window: usize,
    pending: Vec<String>,
    confirmed: Vec<String>,
}

impl WordConfirmer {
    pub fn new(threshold: f64, window: usize) -> Self {
        Self {
            threshold,
            window: window.max(1),
            pending: Vec::new(),
            confirmed: Vec::new(),
        }
    }

    /// Feeds one detection; returns the word it confirmed, if any.
    pub fn observe(&mut self, detection: &FrameDetection) -> Option<String> {
        let label = detection
            .detected_sign
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())?;
        if detection.confidence < self.threshold {
            return None;
        }

        self.pending.push(label.to_string());
        if self.pending.len() < self.window {
            return None;
        }

        let word = majority(&self.pending)?;
        self.pending.clear();
        self.confirmed.push(word.clone());
        Some(word)
    }

    pub fn confirmed(&self) -> &[String] {
        &self.confirmed
    }

    pub fn take_confirmed(&mut self) -> Vec<String> {
        self.pending.clear();
        std::mem::take(&mut self.confirmed)
    }
}

impl Default for WordConfirmer {
    fn default() -> Self {
        Self::new(CONFIDENCE_THRESHOLD, 1)
    }
}

/// Most frequent label; ties go to the one seen first.
fn majority(labels: &[String]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for label in labels {
        let count = counts[label.as_str()];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((label.as_str(), count));
        }
    }
    best.map(|(label, _)| label.to_string())
}

/// "HELLO my friend" -> "Hello My Friend".
pub fn title_case(words: &[String]) -> String {
    words
        .iter()
        .flat_map(|w| w.split_whitespace())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Another frame was still being inferred.
    Skipped,
    Detected(FrameDetection),
    Confirmed(String),
    Failed,
}

/// Clears the in-flight flag even if the submitting future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct RecognitionSession {
    backend: Arc<dyn RecognitionBackend>,
    confirmer: Arc<Mutex<WordConfirmer>>,
    in_flight: Arc<AtomicBool>,
    timeout: Duration,
}

impl RecognitionSession {
    pub fn new(backend: Arc<dyn RecognitionBackend>) -> Self {
        Self::with_confirmer(backend, WordConfirmer::default())
    }

    pub fn with_confirmer(backend: Arc<dyn RecognitionBackend>, confirmer: WordConfirmer) -> Self {
        Self {
            backend,
            confirmer: Arc::new(Mutex::new(confirmer)),
            in_flight: Arc::new(AtomicBool::new(false)),
            timeout: INFER_TIMEOUT,
        }
    }

    /// Sends one JPEG frame for inference. At most one frame is in flight;
    /// frames arriving meanwhile are skipped rather than queued.
    pub async fn submit_frame(&self, jpeg: Vec<u8>) -> FrameOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return FrameOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let detection = match tokio::time::timeout(self.timeout, self.backend.infer_frame(jpeg)).await {
            Ok(Ok(detection)) => detection,
            Ok(Err(err)) => {
                log_debug!("frame inference failed: {err:#}");
                return FrameOutcome::Failed;
            }
            Err(_) => {
                log_debug!("frame inference timed out after {:?}", self.timeout);
                return FrameOutcome::Failed;
            }
        };

        let confirmed = self.confirmer.lock().await.observe(&detection);
        match confirmed {
            Some(word) => {
                log_info!("confirmed sign '{word}'");
                FrameOutcome::Confirmed(word)
            }
            None => FrameOutcome::Detected(detection),
        }
    }

    /// Turns the confirmed words into a sentence and starts over. `None`
    /// when nothing was confirmed.
    pub async fn finish(&self) -> Option<String> {
        let words = self.confirmer.lock().await.take_confirmed();
        if words.is_empty() {
            return None;
        }

        match self.backend.sentence_from_words(&words).await {
            Ok(sentence) if !sentence.trim().is_empty() => Some(sentence),
            Ok(_) => Some(title_case(&words)),
            Err(err) => {
                log_warn!("sentence generation failed, using plain words: {err:#}");
                Some(title_case(&words))
            }
        }
    }
}
