pub mod clock;
pub mod config;
pub mod controller;
pub mod segment;

pub use clock::{ManualClock, PlaybackClock, WallClock};
pub use config::{RewindPolicy, SegmentMergeConfig, SyncConfig};
pub use controller::{PrefetchedSegment, SyncStatus, TickReport, TranscriptSync};
pub use segment::{normalize_segments, RawSegment, TranscriptSegment};
