pub mod backend;
pub mod captions;
pub mod cli;
pub mod commands;
pub mod overlay;
pub mod playback;
pub mod queue;
pub mod recognition;
pub mod settings;
pub mod sync;
pub mod utils;

use std::time::Duration;

use anyhow::Result;

pub use backend::{HttpBackend, RecognitionBackend, StaticBackend, TokenBackend};
pub use captions::{CaptionFeed, CaptionSender};
pub use cli::{CliArgs, Command};
pub use overlay::OverlayView;
pub use playback::{PlaybackReporter, PlaybackSurface};
pub use queue::{AdmissionReport, QueueConfig, ReverseSession, SessionSnapshot, Token};
pub use recognition::{RecognitionSession, WordConfirmer};
pub use settings::SettingsStore;
pub use sync::{PlaybackClock, RawSegment, SyncConfig, TranscriptSync};

pub async fn run(args: CliArgs) -> Result<()> {
    utils::logging::init(args.debug);

    log::info!("SignLink starting up...");

    let settings = SettingsStore::new(args.settings.clone())?;

    match args.command {
        Command::Replay {
            transcript,
            clip_ms,
        } => commands::replay(&settings, &transcript, Duration::from_millis(clip_ms)).await,
        Command::Captions { clip_ms } => {
            commands::captions(&settings, Duration::from_millis(clip_ms)).await
        }
        Command::Config { backend_url } => commands::config(&settings, backend_url),
    }
}
