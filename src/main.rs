use std::{error::Error, path::PathBuf, process};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use veil::Redact;

use nowplaying64::{
    client::Client,
    config::{self, Config},
    display::{Console, Sink},
    poller::PollLoop,
    secrets::CredentialSource,
    signal, util,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Environment variable that enables poll diagnostics.
const DEBUG_ENV: &str = "DEBUG";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Default, PartialEq, Eq, Parser, Redact)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Spotify application client id
    ///
    /// [default: read from the secrets file]
    #[arg(long, env = "SPOTIPY_CLIENT_ID")]
    client_id: Option<String>,

    /// Spotify application client secret
    ///
    /// [default: read from the secrets file]
    #[arg(long, env = "SPOTIPY_CLIENT_SECRET", hide_env_values = true)]
    #[redact]
    client_secret: Option<String>,

    /// Secrets file with `client_id` and `client_secret`
    ///
    /// Used when the credentials are not passed on the command line or in
    /// the environment. Ensure that this file is kept secure and not shared
    /// publicly.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Redirect URI registered for the application
    #[arg(long, env = "SPOTIPY_REDIRECT_URI", value_hint = ValueHint::Url, default_value_t = String::from(config::DEFAULT_REDIRECT_URI))]
    redirect_uri: String,

    /// Token cache file
    ///
    /// Holds the access and refresh tokens between runs. Deleting it forces
    /// authorizing again.
    #[arg(long, env = "SPOTIPY_CACHE_PATH", value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from(config::DEFAULT_CACHE_PATH))]
    cache_path: String,

    /// Market to resolve tracks in, as an ISO 3166-1 alpha-2 country code
    #[arg(long, default_value_t = String::from(config::DEFAULT_MARKET))]
    market: String,

    /// Show diagnostics after every poll
    ///
    /// Also enabled by setting `DEBUG` to `1`, `true` or `yes`.
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// Logs go to standard error, away from the panels on standard output.
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Main application loop.
///
/// Runs until a shutdown signal arrives or connecting to Spotify failed on
/// every attempt. Both end normally: giving up has already been shown on
/// `sink`.
///
/// # Errors
///
/// This function returns an error when the HTTP client or the signal
/// handlers cannot be set up.
async fn run<S: Sink>(args: Args, sink: S) -> Result<(), Box<dyn Error>> {
    let credentials = CredentialSource {
        client_id: args.client_id,
        client_secret: args.client_secret,
        secrets_file: Some(PathBuf::from(args.secrets_file)),
    };

    let mut config = Config::with_credentials(credentials)?;
    config.redirect_uri = args.redirect_uri;
    config.cache_path = PathBuf::from(args.cache_path);
    config.market = args.market;
    config.debug =
        args.debug || std::env::var(DEBUG_ENV).is_ok_and(|value| util::is_truthy(&value));

    let client = Client::new(config.clone())?;
    let mut poll_loop = PollLoop::new(client, sink).with_debug(config.debug);
    let mut signals = signal::Handler::new()?;

    tokio::select! {
        // Prioritize shutdown signals.
        biased;

        received = signals.recv() => {
            info!("received {received}; shutting down gracefully");
        }

        result = poll_loop.run() => match result {
            Ok(never) => match never {},
            Err(e) => debug!("poll loop ended: {e}"),
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// Polling is strictly sequential, so a single threaded runtime suffices.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args, Console::stdout()).await {
        error!("{e}");
        process::exit(1);
    }
}
