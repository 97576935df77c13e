//! The polling and display control loop.
//!
//! [`PollLoop`] repeatedly asks a [`PlaybackClient`] what is playing and tells
//! a [`Sink`] what to show. It is built from three parts:
//!
//! # Connection State Machine
//!
//! ```text
//!   connect() ok                 connect() failed
//! ┌──────────────► READY ◄──────────────────────────┐ ok
//! │                                                  │
//! start ── connect() failed ──► ERROR_RETRYING ──────┘
//!                                 │  retry_count < MAX_RETRIES:
//!                                 │  notice, 2 s pause, connect()
//!                                 ▼  retry_count == MAX_RETRIES
//!                              ERROR_FATAL (loop ends)
//! ```
//!
//! Only `connect()` failures move the machine. A failed poll while ready is
//! shown, treated as "nothing playing" and otherwise forgotten.
//!
//! # Change Detection
//!
//! * A playing track whose id differs from the last one shown renders the
//!   Now Playing panel.
//! * The same track renders nothing.
//! * Nothing playing renders the Paused panel, on every poll.
//!
//! # Adaptive Interval
//!
//! Polls happen every [`POLL_INTERVAL_DEFAULT`]. When the current track ends
//! sooner than that, the next poll is moved to its end so the next track
//! shows up without delay. See [`next_interval`].

use std::{convert::Infallible, ops::ControlFlow, time::Duration};

use crate::{
    client::{ConnectionError, PlaybackClient},
    display::{Block, Diagnostics, Sink},
    snapshot::Snapshot,
    util,
};

/// Time between polls when no track is about to end.
pub const POLL_INTERVAL_DEFAULT: Duration = Duration::from_secs(5);

/// Shortest time between polls.
pub const POLL_INTERVAL_MIN: Duration = Duration::from_millis(100);

/// Connection attempts after the initial one before giving up.
pub const MAX_RETRIES: u32 = 3;

/// Pause before each connection attempt after a failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    #[default]
    Ready,
    Error,
}

/// Everything the loop remembers between polls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopState {
    pub connection_status: ConnectionStatus,

    /// Id of the track on the Now Playing panel, if that is showing.
    pub last_track_id: Option<String>,

    /// End of the track on the Now Playing panel, in epoch seconds.
    pub last_ends_at: Option<f64>,

    /// Connection attempts since the last successful one.
    pub retry_count: u32,

    /// Message of the last connection failure.
    pub last_error: Option<String>,
}

/// Delay until the next poll.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interval {
    pub duration: Duration,

    /// Whether the delay was shortened to meet the end of a track.
    pub premature: bool,
}

/// Computes the delay until the next poll.
///
/// Starts from [`POLL_INTERVAL_DEFAULT`]. If a track is playing that ends
/// within that time, waits only until its end, but no less than
/// [`POLL_INTERVAL_MIN`]. A track that already ended according to stale data
/// does not shorten the delay; the next poll sorts that out.
#[must_use]
pub fn next_interval(snapshot: Option<&Snapshot>, now: f64) -> Interval {
    let default = Interval {
        duration: POLL_INTERVAL_DEFAULT,
        premature: false,
    };

    let Some(ends_at) = snapshot.and_then(|snapshot| snapshot.ends_at) else {
        return default;
    };

    let time_to_end = ends_at - now;
    if time_to_end > 0.0 && time_to_end <= POLL_INTERVAL_DEFAULT.as_secs_f64() {
        Interval {
            duration: Duration::from_secs_f64(time_to_end).max(POLL_INTERVAL_MIN),
            premature: true,
        }
    } else {
        default
    }
}

/// Drives polling and rendering.
pub struct PollLoop<C, S> {
    client: C,
    sink: S,
    state: LoopState,
    debug: bool,

    /// The error behind `state.last_error`, handed out when giving up.
    failure: Option<ConnectionError>,
}

impl<C, S> PollLoop<C, S>
where
    C: PlaybackClient,
    S: Sink,
{
    pub fn new(client: C, sink: S) -> Self {
        Self {
            client,
            sink,
            state: LoopState::default(),
            debug: false,
            failure: None,
        }
    }

    /// Renders diagnostics after every poll.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn state(&self) -> &LoopState {
        &self.state
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Connects and polls until connecting fails for good.
    ///
    /// # Errors
    ///
    /// Returns the last connection failure after [`MAX_RETRIES`] retries.
    /// This is the only way the loop ends; cancel the future to stop it
    /// earlier.
    pub async fn run(&mut self) -> Result<Infallible, ConnectionError> {
        self.connect().await;

        loop {
            if let ControlFlow::Break(e) = self.step().await {
                return Err(e);
            }
        }
    }

    /// Attempts to connect and records the outcome.
    ///
    /// Failures are logged here, as warnings while retries remain.
    pub async fn connect(&mut self) {
        match self.client.connect().await {
            Ok(()) => {
                if self.state.connection_status == ConnectionStatus::Error {
                    info!("connected after {} retries", self.state.retry_count);
                }
                self.state.connection_status = ConnectionStatus::Ready;
                self.state.retry_count = 0;
                self.state.last_error = None;
                self.failure = None;
            }
            Err(e) => {
                if self.state.retry_count < MAX_RETRIES {
                    warn!("{e}");
                } else {
                    error!("{e}; giving up");
                }
                self.state.connection_status = ConnectionStatus::Error;
                self.state.last_error = Some(e.to_string());
                self.failure = Some(e);
            }
        }
    }

    /// Performs one iteration: a poll followed by its delay when ready, or
    /// a connection retry when not.
    ///
    /// Breaks with the connection failure when retries are exhausted, after
    /// rendering the fatal notice.
    pub async fn step(&mut self) -> ControlFlow<ConnectionError> {
        match self.state.connection_status {
            ConnectionStatus::Ready => {
                let interval = self.tick().await;
                trace!("next poll in {:.2}s", interval.duration.as_secs_f64());
                tokio::time::sleep(interval.duration).await;
                ControlFlow::Continue(())
            }
            ConnectionStatus::Error => self.retry().await,
        }
    }

    async fn retry(&mut self) -> ControlFlow<ConnectionError> {
        if self.state.retry_count < MAX_RETRIES {
            self.state.retry_count += 1;
            warn!(
                "reconnecting in {}s ({}/{MAX_RETRIES})",
                RETRY_DELAY.as_secs(),
                self.state.retry_count
            );
            self.sink.render(Block::Retry {
                attempt: self.state.retry_count,
                max_retries: MAX_RETRIES,
            });

            tokio::time::sleep(RETRY_DELAY).await;
            self.connect().await;

            return ControlFlow::Continue(());
        }

        let error = self
            .state
            .last_error
            .clone()
            .unwrap_or_else(|| String::from("unknown error"));
        self.sink.render(Block::Fatal {
            attempts: MAX_RETRIES,
            error,
        });

        let failure = self.failure.take().unwrap_or_else(|| {
            ConnectionError(crate::error::Error::unknown("connection failed"))
        });
        ControlFlow::Break(failure)
    }

    /// Polls once and renders the outcome, without waiting afterwards.
    ///
    /// Returns the delay until the next poll.
    pub async fn tick(&mut self) -> Interval {
        let (current, fetch_error) = match self.client.fetch_currently_playing().await {
            Ok(current) => (current, None),
            Err(e) => {
                warn!("{e}");
                (None, Some(e))
            }
        };
        let now = util::now_from_epoch();

        match current {
            Some(ref snapshot) => {
                if self.state.last_track_id.as_deref() != Some(snapshot.track_id.as_str()) {
                    debug!("now playing: {snapshot}");
                    self.state.last_track_id = Some(snapshot.track_id.clone());
                    self.state.last_ends_at = snapshot.ends_at;
                    self.sink.render(Block::NowPlaying(snapshot.clone()));
                }
            }
            None => {
                self.state.last_track_id = None;
                self.state.last_ends_at = None;
                self.sink.render(Block::Paused);
            }
        }

        // Shown after the panel, which clears the screen.
        if let Some(e) = fetch_error {
            self.sink.render(Block::FetchFailed(e.to_string()));
        }

        let interval = next_interval(current.as_ref(), now);

        if self.debug {
            self.sink.render(Block::Diagnostics(Diagnostics {
                now,
                poll_interval: interval.duration.as_secs_f64(),
                last_track_id: self.state.last_track_id.clone(),
                ends_at: current.as_ref().and_then(|snapshot| snapshot.ends_at),
                premature_poll: interval.premature,
            }));

            if interval.premature {
                self.sink.render(Block::AwaitingTrackEnd);
            }
        }

        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ending_at(ends_at: Option<f64>) -> Snapshot {
        Snapshot {
            track_id: "track".to_owned(),
            artist: "Artist".to_owned(),
            title: "Title".to_owned(),
            cover_url: None,
            ends_at,
        }
    }

    fn interval_for(ends_in: f64) -> Interval {
        let now = 1_700_000_000.0;
        next_interval(Some(&ending_at(Some(now + ends_in))), now)
    }

    #[test]
    fn shrinks_to_track_end() {
        let interval = interval_for(3.0);
        assert!((interval.duration.as_secs_f64() - 3.0).abs() < 1e-6);
        assert!(interval.premature);
    }

    #[test]
    fn shrinks_at_exactly_default() {
        let interval = interval_for(5.0);
        assert!((interval.duration.as_secs_f64() - 5.0).abs() < 1e-6);
        assert!(interval.premature);
    }

    #[test]
    fn distant_end_keeps_default() {
        assert_eq!(
            interval_for(10.0),
            Interval {
                duration: POLL_INTERVAL_DEFAULT,
                premature: false
            }
        );
    }

    #[test]
    fn past_end_keeps_default() {
        assert_eq!(interval_for(-1.0).duration, POLL_INTERVAL_DEFAULT);
        assert_eq!(interval_for(0.0).duration, POLL_INTERVAL_DEFAULT);
        assert!(!interval_for(0.0).premature);
    }

    #[test]
    fn imminent_end_is_floored() {
        let interval = interval_for(0.01);
        assert_eq!(interval.duration, POLL_INTERVAL_MIN);
        assert!(interval.premature);
    }

    #[test]
    fn nothing_playing_or_unknown_end_keeps_default() {
        assert_eq!(next_interval(None, 0.0).duration, POLL_INTERVAL_DEFAULT);
        assert_eq!(
            next_interval(Some(&ending_at(None)), 0.0).duration,
            POLL_INTERVAL_DEFAULT
        );
    }

    #[test]
    fn interval_stays_in_bounds() {
        let now = 1_700_000_000.0;
        let mut ends_in = -20.0;
        while ends_in < 20.0 {
            let duration = next_interval(Some(&ending_at(Some(now + ends_in))), now).duration;
            assert!(duration >= POLL_INTERVAL_MIN, "{ends_in}: {duration:?}");
            assert!(duration <= POLL_INTERVAL_DEFAULT, "{ends_in}: {duration:?}");
            ends_in += 0.05;
        }
    }
}
