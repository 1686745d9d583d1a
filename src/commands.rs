use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
    task::JoinHandle,
};

use crate::{
    backend::HttpBackend,
    captions::{CaptionFeed, CaptionSender},
    overlay::OverlayView,
    playback::TimedSurface,
    queue::{PlaybackState, ReverseSession},
    settings::SettingsStore,
    sync::{RawSegment, TranscriptSync, WallClock},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const DRAIN_CHECK: Duration = Duration::from_millis(250);

fn start_session(settings: &SettingsStore, clip_len: Duration) -> Result<ReverseSession> {
    let backend_url = settings.effective_backend_url();
    let backend = Arc::new(HttpBackend::new(&backend_url)?);
    let surface = Arc::new(TimedSurface::new(clip_len));
    let session = ReverseSession::start(backend, surface, settings.queue_config());
    log_info!("session {} using backend {backend_url}", session.id());
    Ok(session)
}

/// Prints every overlay change until the session shuts down.
fn print_overlay(mut overlay: watch::Receiver<OverlayView>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while overlay.changed().await.is_ok() {
            let caption = overlay.borrow_and_update().caption();
            println!("{caption}");
        }
    })
}

async fn is_drained(session: &ReverseSession) -> bool {
    let snapshot = session.snapshot().await;
    snapshot.state == PlaybackState::Idle && snapshot.queued.is_empty()
}

async fn wait_until_drained(session: &ReverseSession) {
    while !is_drained(session).await {
        tokio::time::sleep(DRAIN_CHECK).await;
    }
}

/// End of caption input: admits everything still in the feed, then lets the
/// queue play out.
pub(crate) async fn finish_captions(
    feed: &mut CaptionFeed,
    sender: CaptionSender,
    session: &ReverseSession,
) -> Result<()> {
    drop(sender);
    feed.finish().await?;
    wait_until_drained(session).await;
    Ok(())
}

pub fn load_transcript(path: &Path) -> Result<Vec<RawSegment>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript from {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a transcript array", path.display()))
}

pub async fn replay(settings: &SettingsStore, transcript: &Path, clip_len: Duration) -> Result<()> {
    let raw = load_transcript(transcript)?;
    let session = start_session(settings, clip_len)?;
    let printer = print_overlay(session.subscribe_overlay());

    let clock = Arc::new(WallClock::start());
    let sync = TranscriptSync::new(session.clone(), clock, settings.sync_config());
    let count = sync.start(&raw).await?;
    println!("{count} segments, Ctrl-C to stop");

    let mut check = tokio::time::interval(DRAIN_CHECK);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log_info!("interrupted");
                break;
            }
            _ = check.tick() => {
                if sync.is_exhausted().await && is_drained(&session).await {
                    break;
                }
            }
        }
    }

    sync.stop().await;
    session.clear().await;
    session.shutdown().await;
    printer.abort();
    Ok(())
}

pub async fn captions(settings: &SettingsStore, clip_len: Duration) -> Result<()> {
    let session = start_session(settings, clip_len)?;
    let printer = print_overlay(session.subscribe_overlay());

    let mut feed = CaptionFeed::new();
    let sender = feed.start(session.clone())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reached_eof = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        sender.send(line);
                    }
                    Ok(None) => {
                        reached_eof = true;
                        break;
                    }
                    Err(err) => {
                        log_warn!("stdin closed: {err}");
                        break;
                    }
                }
            }
        }
    }

    if reached_eof {
        finish_captions(&mut feed, sender, &session).await?;
    } else {
        feed.stop().await?;
    }
    session.shutdown().await;
    printer.abort();
    Ok(())
}

pub fn config(settings: &SettingsStore, backend_url: Option<String>) -> Result<()> {
    if let Some(url) = backend_url {
        crate::backend::parse_base_url(&url)?;
        settings.set_backend_url(&url)?;
    }
    let current = settings.snapshot();
    println!("{}", serde_json::to_string_pretty(&current)?);
    println!("effective backend: {}", settings.effective_backend_url());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::StaticBackend, queue::QueueConfig};

    #[tokio::test(start_paused = true)]
    async fn captions_piped_before_eof_all_play() {
        let backend = Arc::new(
            StaticBackend::new("http://clips.test", ["hello", "world", "thanks"]).unwrap(),
        );
        backend.set_latency(Duration::from_millis(200));
        let surface = Arc::new(TimedSurface::new(Duration::from_millis(500)));
        let session = ReverseSession::start(backend, surface, QueueConfig::default());
        let mut feed = CaptionFeed::new();
        let sender = feed.start(session.clone()).unwrap();

        sender.send("hello");
        sender.send("world");
        sender.send("thanks");
        finish_captions(&mut feed, sender, &session).await.unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.processed_count, 3);
        assert!(snapshot.current.is_none());
        assert!(snapshot.queued.is_empty());
    }

    #[test]
    fn transcript_file_parses_loose_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.json");
        fs::write(
            &path,
            r#"[{"start": "0.5", "end": 2, "text": "hello"}, {"start": 3, "text": "no end"}]"#,
        )
        .unwrap();

        let raw = load_transcript(&path).unwrap();
        assert_eq!(raw.len(), 2);
        assert!(load_transcript(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn config_rejects_bad_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("signlink.json")).unwrap();
        assert!(config(&store, Some("not a url".into())).is_err());
        assert!(!dir.path().join("signlink.json").exists());
    }
}
