pub mod admission;
pub mod clip_queue;
pub mod config;
pub mod session;
pub mod state;
pub mod token;
pub mod tracking;

pub use admission::{AdmissionReport, Rejection};
pub use clip_queue::{ClipQueue, QueueItem};
pub use config::{QueueConfig, ResolutionStrategy};
pub use session::{ReverseSession, SessionSnapshot};
pub use state::{PlaybackState, SessionState};
pub use token::Token;
pub use tracking::{ProcessedSet, RecencySet};
