use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How admitted tokens get their clip locators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// One batch call per admission batch, per-token URLs on failure.
    #[default]
    Batch,
    /// Always build per-token URLs; no network round trip.
    PerToken,
}

/// Tunables for the admission filter and playback driver.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Window during which a token, once admitted, cannot be admitted again.
    pub recency_ttl: Duration,

    /// Number of queued tokens shown by the overlay.
    pub next_up: usize,

    pub resolution: ResolutionStrategy,

    /// Optional bound on remembered processed tokens (`None` = unbounded).
    pub processed_capacity: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            recency_ttl: Duration::from_millis(3000),
            next_up: 3,
            resolution: ResolutionStrategy::Batch,
            processed_capacity: None,
        }
    }
}
