use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

/// The host video's playback position. Read by polling, never pushed.
pub trait PlaybackClock: Send + Sync {
    fn current_time(&self) -> Duration;
}

/// Clock moved by hand; seeks are just `set`.
#[derive(Debug, Default)]
pub struct ManualClock {
    position: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, position: Duration) {
        if let Ok(mut guard) = self.position.lock() {
            *guard = position;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.position.lock() {
            *guard += by;
        }
    }
}

impl PlaybackClock for ManualClock {
    fn current_time(&self) -> Duration {
        self.position.lock().map(|d| *d).unwrap_or_default()
    }
}

#[derive(Debug)]
struct WallState {
    /// Position accumulated over earlier running windows.
    baseline: Duration,
    running_anchor: Option<Instant>,
}

/// Real-time clock that can be paused, standing in for a video player.
#[derive(Debug)]
pub struct WallClock {
    state: Mutex<WallState>,
}

impl WallClock {
    /// Starts running immediately from zero.
    pub fn start() -> Self {
        Self {
            state: Mutex::new(WallState {
                baseline: Duration::ZERO,
                running_anchor: Some(Instant::now()),
            }),
        }
    }

    pub fn pause(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(anchor) = state.running_anchor.take() {
                state.baseline += anchor.elapsed();
            }
        }
    }

    pub fn resume(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.running_anchor.is_none() {
                state.running_anchor = Some(Instant::now());
            }
        }
    }
}

impl PlaybackClock for WallClock {
    fn current_time(&self) -> Duration {
        match self.state.lock() {
            Ok(state) => match state.running_anchor {
                Some(anchor) => state.baseline + anchor.elapsed(),
                None => state.baseline,
            },
            Err(_) => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wall_clock_stops_while_paused() {
        let clock = WallClock::start();
        tokio::time::advance(Duration::from_secs(2)).await;
        clock.pause();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.current_time(), Duration::from_secs(2));

        clock.resume();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(clock.current_time(), Duration::from_secs(3));
    }

    #[test]
    fn manual_clock_seeks() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(4));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.current_time(), Duration::from_secs(1));
    }
}
