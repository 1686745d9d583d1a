use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds for folding adjacent transcript segments together.
#[derive(Debug, Clone)]
pub struct SegmentMergeConfig {
    /// Segments closer than this are merge candidates.
    pub max_gap: Duration,

    /// ...as long as the merged segment stays shorter than this.
    pub max_span: Duration,
}

impl Default for SegmentMergeConfig {
    fn default() -> Self {
        Self {
            max_gap: Duration::from_millis(200),
            max_span: Duration::from_millis(2500),
        }
    }
}

/// What happens to admitted segments when the host clock jumps backwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RewindPolicy {
    /// Admitted segments stay admitted; seeking back replays nothing.
    #[default]
    Keep,
    /// Segments starting after the new position become admissible again.
    Rearm,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,

    /// A segment is due once `start <= now + admit_tolerance`.
    pub admit_tolerance: Duration,

    /// Segments starting within this window ahead of `now` get prefetched.
    pub prefetch_window: Duration,

    pub merge: SegmentMergeConfig,

    pub rewind_policy: RewindPolicy,

    /// Fetch segment tokens from the segment-compose endpoint instead of the
    /// plain tokenizer.
    pub compose_segments: bool,

    pub use_llm: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            admit_tolerance: Duration::from_millis(100),
            prefetch_window: Duration::from_secs(8),
            merge: SegmentMergeConfig::default(),
            rewind_policy: RewindPolicy::Keep,
            compose_segments: false,
            use_llm: true,
        }
    }
}
