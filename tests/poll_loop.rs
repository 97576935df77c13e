use std::{cell::RefCell, collections::VecDeque, time::Duration};

use log::{Level, LevelFilter, Log, Metadata, Record};

use nowplaying64::{
    client::{ConnectionError, FetchError, PlaybackClient},
    display::{Block, Sink},
    error::Error,
    poller::{ConnectionStatus, PollLoop, MAX_RETRIES, POLL_INTERVAL_DEFAULT, RETRY_DELAY},
    snapshot::Snapshot,
    util,
};
use tokio::time::Instant;

/// Client that plays back prepared results.
///
/// Connecting fails and fetching finds nothing once the script runs out.
#[derive(Default)]
struct Scripted {
    connects: VecDeque<Result<(), ConnectionError>>,
    fetches: VecDeque<Result<Option<Snapshot>, FetchError>>,
    connected_at: Vec<Instant>,
    fetch_calls: usize,
}

impl Scripted {
    fn connecting() -> Self {
        Self {
            connects: VecDeque::from([Ok(())]),
            ..Self::default()
        }
    }

    fn then_fetch(mut self, result: Result<Option<Snapshot>, FetchError>) -> Self {
        self.fetches.push_back(result);
        self
    }
}

impl PlaybackClient for Scripted {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connected_at.push(Instant::now());
        self.connects
            .pop_front()
            .unwrap_or_else(|| Err(ConnectionError(Error::unauthenticated("invalid_client"))))
    }

    async fn fetch_currently_playing(&mut self) -> Result<Option<Snapshot>, FetchError> {
        self.fetch_calls += 1;
        self.fetches.pop_front().unwrap_or(Ok(None))
    }
}

#[derive(Default)]
struct Recorder {
    blocks: Vec<Block>,
}

impl Sink for Recorder {
    fn render(&mut self, block: Block) {
        self.blocks.push(block);
    }
}

impl Recorder {
    fn count(&self, wanted: impl Fn(&Block) -> bool) -> usize {
        self.blocks.iter().filter(|block| wanted(block)).count()
    }
}

thread_local! {
    static LOGGED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Logger that keeps records per thread, apart from concurrently running
/// tests.
struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LOGGED.with(|logged| {
            logged
                .borrow_mut()
                .push((record.level(), record.args().to_string()));
        });
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;

fn capture_logs() {
    // Installed by whichever test gets here first.
    let _ = log::set_logger(&CAPTURE);
    log::set_max_level(LevelFilter::Trace);
    LOGGED.with(|logged| logged.borrow_mut().clear());
}

fn logged(level: Level, containing: &str) -> usize {
    LOGGED.with(|logged| {
        logged
            .borrow()
            .iter()
            .filter(|(l, message)| *l == level && message.contains(containing))
            .count()
    })
}

fn track(id: &str) -> Snapshot {
    Snapshot {
        track_id: id.to_owned(),
        artist: "Artist".to_owned(),
        title: format!("Title {id}"),
        cover_url: None,
        ends_at: Some(util::now_from_epoch() + 180.0),
    }
}

fn fetch_failure() -> FetchError {
    FetchError(Error::unavailable("503 Service Unavailable"))
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let mut poll_loop = PollLoop::new(Scripted::default(), Recorder::default());
    let started = Instant::now();

    let e = poll_loop.run().await.unwrap_err();

    assert!(e.to_string().contains("invalid_client"));
    assert!(started.elapsed() >= RETRY_DELAY * MAX_RETRIES);
    assert!(started.elapsed() < RETRY_DELAY * MAX_RETRIES + Duration::from_millis(100));

    let blocks = &poll_loop.sink().blocks;
    assert_eq!(
        blocks[..3],
        [
            Block::Retry {
                attempt: 1,
                max_retries: 3
            },
            Block::Retry {
                attempt: 2,
                max_retries: 3
            },
            Block::Retry {
                attempt: 3,
                max_retries: 3
            },
        ]
    );
    assert!(matches!(
        blocks[3],
        Block::Fatal { attempts: 3, ref error } if error.contains("invalid_client")
    ));
    assert_eq!(blocks.len(), 4);

    // One initial attempt plus one per retry, each retry after the delay.
    let connected_at = &poll_loop.client().connected_at;
    assert_eq!(connected_at.len(), 4);
    for pair in connected_at.windows(2) {
        assert!(pair[1] - pair[0] >= RETRY_DELAY);
    }

    let state = poll_loop.state();
    assert_eq!(state.connection_status, ConnectionStatus::Error);
    assert_eq!(state.retry_count, MAX_RETRIES);
    assert_eq!(poll_loop.client().fetch_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn recovers_within_retries() {
    let client = Scripted {
        connects: VecDeque::from([
            Err(ConnectionError(Error::unavailable("connect refused"))),
            Err(ConnectionError(Error::unavailable("connect refused"))),
            Ok(()),
        ]),
        ..Scripted::default()
    };
    let mut poll_loop = PollLoop::new(client, Recorder::default());

    poll_loop.connect().await;
    assert_eq!(poll_loop.state().connection_status, ConnectionStatus::Error);
    assert_eq!(poll_loop.state().retry_count, 0);
    assert!(poll_loop.state().last_error.is_some());

    assert!(poll_loop.step().await.is_continue());
    assert_eq!(poll_loop.state().retry_count, 1);
    assert_eq!(poll_loop.state().connection_status, ConnectionStatus::Error);

    assert!(poll_loop.step().await.is_continue());
    assert_eq!(poll_loop.state().connection_status, ConnectionStatus::Ready);
    assert_eq!(poll_loop.state().retry_count, 0);
    assert_eq!(poll_loop.state().last_error, None);

    // Polling resumes.
    assert!(poll_loop.step().await.is_continue());
    assert_eq!(poll_loop.client().fetch_calls, 1);
    assert_eq!(
        poll_loop.sink().count(|block| matches!(block, Block::Retry { .. })),
        2
    );
    assert_eq!(poll_loop.sink().blocks.last(), Some(&Block::Paused));
}

#[tokio::test(start_paused = true)]
async fn renders_on_track_change_and_every_paused_poll() {
    let (a, b) = (track("a"), track("b"));
    let client = Scripted::connecting()
        .then_fetch(Ok(Some(a.clone())))
        .then_fetch(Ok(Some(a.clone())))
        .then_fetch(Ok(None))
        .then_fetch(Ok(None))
        .then_fetch(Ok(Some(b.clone())))
        .then_fetch(Ok(Some(a.clone())))
        .then_fetch(Err(fetch_failure()))
        .then_fetch(Ok(Some(a.clone())));
    let mut poll_loop = PollLoop::new(client, Recorder::default());
    poll_loop.connect().await;

    let mut rendered_per_tick = Vec::new();
    for _ in 0..8 {
        let before = poll_loop.sink().blocks.len();
        poll_loop.tick().await;
        rendered_per_tick.push(poll_loop.sink().blocks[before..].to_vec());
    }

    assert_eq!(rendered_per_tick[0], [Block::NowPlaying(a.clone())]);
    assert!(rendered_per_tick[1].is_empty());
    assert_eq!(rendered_per_tick[2], [Block::Paused]);
    assert_eq!(rendered_per_tick[3], [Block::Paused]);
    assert_eq!(rendered_per_tick[4], [Block::NowPlaying(b)]);
    assert_eq!(rendered_per_tick[5], [Block::NowPlaying(a.clone())]);
    assert_eq!(rendered_per_tick[6].len(), 2);
    assert_eq!(rendered_per_tick[6][0], Block::Paused);
    assert!(matches!(rendered_per_tick[6][1], Block::FetchFailed(ref e) if e.contains("503")));
    // The failed poll cleared the track, so the same track shows again.
    assert_eq!(rendered_per_tick[7], [Block::NowPlaying(a.clone())]);

    assert_eq!(poll_loop.state().last_track_id.as_deref(), Some("a"));
    assert_eq!(poll_loop.state().last_ends_at, a.ends_at);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_leaves_connection_alone() {
    let client = Scripted::connecting().then_fetch(Err(fetch_failure()));
    let mut poll_loop = PollLoop::new(client, Recorder::default());
    poll_loop.connect().await;

    let interval = poll_loop.tick().await;

    let state = poll_loop.state();
    assert_eq!(state.connection_status, ConnectionStatus::Ready);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.last_error, None);
    assert_eq!(state.last_track_id, None);
    assert_eq!(interval.duration, POLL_INTERVAL_DEFAULT);
    assert!(!interval.premature);
}

#[tokio::test(start_paused = true)]
async fn same_track_keeps_stored_end() {
    let first = track("a");
    let mut later = first.clone();
    later.ends_at = first.ends_at.map(|ends_at| ends_at + 30.0);

    let client = Scripted::connecting()
        .then_fetch(Ok(Some(first.clone())))
        .then_fetch(Ok(Some(later)));
    let mut poll_loop = PollLoop::new(client, Recorder::default());
    poll_loop.connect().await;

    poll_loop.tick().await;
    poll_loop.tick().await;

    assert_eq!(poll_loop.state().last_ends_at, first.ends_at);
    assert_eq!(poll_loop.sink().blocks.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn polls_early_near_track_end() {
    let mut ending = track("a");
    ending.ends_at = Some(util::now_from_epoch() + 3.0);

    let client = Scripted::connecting().then_fetch(Ok(Some(ending)));
    let mut poll_loop = PollLoop::new(client, Recorder::default()).with_debug(true);
    poll_loop.connect().await;

    let interval = poll_loop.tick().await;

    assert!(interval.premature);
    let secs = interval.duration.as_secs_f64();
    assert!(secs > 2.9 && secs <= 3.0, "{secs}");

    let blocks = &poll_loop.sink().blocks;
    assert_eq!(blocks.len(), 3);
    assert!(matches!(blocks[0], Block::NowPlaying(_)));
    assert!(matches!(
        blocks[1],
        Block::Diagnostics(ref d) if d.premature_poll && d.last_track_id.as_deref() == Some("a")
    ));
    assert_eq!(blocks[2], Block::AwaitingTrackEnd);
}

#[tokio::test(start_paused = true)]
async fn diagnostics_only_in_debug_mode() {
    let client = Scripted::connecting();
    let mut poll_loop = PollLoop::new(client, Recorder::default());
    poll_loop.connect().await;

    poll_loop.tick().await;

    assert_eq!(poll_loop.sink().blocks, [Block::Paused]);
}

#[tokio::test(start_paused = true)]
async fn run_polls_at_default_cadence() {
    let mut poll_loop = PollLoop::new(Scripted::connecting(), Recorder::default());

    let stopped =
        tokio::time::timeout(POLL_INTERVAL_DEFAULT * 2 + Duration::from_secs(2), poll_loop.run())
            .await;

    assert!(stopped.is_err(), "loop ended while connected");
    assert_eq!(poll_loop.client().fetch_calls, 3);
    assert_eq!(poll_loop.sink().blocks, vec![Block::Paused; 3]);
}

#[tokio::test(start_paused = true)]
async fn logs_each_connection_failure_once() {
    capture_logs();
    let mut poll_loop = PollLoop::new(Scripted::default(), Recorder::default());

    let _ = poll_loop.run().await;

    // Initial attempt and two retries warn, the last retry is the error.
    assert_eq!(logged(Level::Warn, "invalid_client"), 3);
    assert_eq!(logged(Level::Error, "invalid_client"), 1);
}
