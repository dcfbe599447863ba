use std::{path::PathBuf, process, time::Duration};

use clap::{command, Parser, ValueEnum, ValueHint};
use log::{debug, error, info, warn, LevelFilter};

use nodelink::{
    client::Client,
    config::Config,
    error::{Error, Result},
    http::{self, SearchSource},
    node::Node,
    protocol::UserId,
    signal::{Handler, ShutdownSignal},
    util::format_time,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// How long to wait for the node at startup.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Source {
    #[default]
    Youtube,
    Soundcloud,
}

impl From<Source> for SearchSource {
    fn from(source: Source) -> Self {
        match source {
            Source::Youtube => SearchSource::YouTube,
            Source::Soundcloud => SearchSource::SoundCloud,
        }
    }
}

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node configuration file
    ///
    /// Keep this file private: it contains the node's password.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Node host, overriding the configuration file
    #[arg(long, env = "NODELINK_HOST", value_hint = ValueHint::Hostname)]
    host: Option<String>,

    /// Node port, overriding the configuration file
    #[arg(long, env = "NODELINK_PORT")]
    port: Option<u16>,

    /// Node password, overriding the configuration file
    #[arg(long, env = "NODELINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Bot user id, overriding the configuration file
    #[arg(long, env = "NODELINK_USER_ID")]
    user_id: Option<u64>,

    /// Load tracks for this identifier, URL or search query and print them
    #[arg(long)]
    query: Option<String>,

    /// Where to search when the query is not a URL
    #[arg(long, value_enum, default_value_t = Source::Youtube)]
    source: Source,

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
/// Command line arguments take precedence over `RUST_LOG`, which takes
/// precedence over the default of `info`.
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("nodelink", level);
    }

    logger.init();
}

/// Reads the configuration file, if any, and applies command line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).inspect_err(|e| {
            error!("unable to read {}: {e}", path.display());
        })?,
        None => Config::default(),
    };

    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = &args.password {
        config.password.clone_from(password);
    }
    if let Some(user_id) = args.user_id {
        config.user_id = user_id;
    }

    Ok(config)
}

async fn print_tracks(node: &Node, query: &str, source: SearchSource) -> Result<()> {
    let rest = http::Client::new(node.config())?;
    let result = if query.contains("://") {
        rest.load_tracks(query).await?
    } else {
        rest.search(query, source).await?
    };

    if let Some(message) = result.exception_message() {
        warn!("{query}: {message}");
    }
    if result.tracks.is_empty() {
        info!("{query}: no matches");
    }

    for (i, track) in result.tracks.iter().enumerate() {
        info!("{:>3}. {track} [{}]", i + 1, format_time(track.length()));
    }

    Ok(())
}

/// Main application loop.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the node could not
/// be reached in time.
async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let user_id = UserId::try_from(config.user_id)
        .map_err(|_| Error::invalid_argument("a user id is required, see --user-id"))?;

    let client = Client::new(user_id);
    let listeners = client.listeners();
    listeners.register_event_listener(|guild_id, event| info!("guild {guild_id}: {event}"));
    listeners.register_stats_listener(|stats| {
        debug!(
            "node stats: {} player(s), {} playing, up {}, cpu load {:.2}",
            stats.players,
            stats.playing_players,
            format_time(stats.uptime),
            stats.cpu.lavalink_load,
        );
    });

    let node = client.add_node(config, Some(CONNECT_TIMEOUT)).await?;

    if let Some(query) = &args.query {
        if let Err(e) = print_tracks(&node, query, args.source.into()).await {
            error!("{query}: {e}");
        }
    }

    let mut signals = Handler::new()?;
    loop {
        let signal = signals.recv().await;
        if signal.is_shutdown() {
            info!("received {signal}, shutting down gracefully");
            break;
        }

        debug_assert_eq!(signal, ShutdownSignal::Reconnect);
        info!("received {signal}, reconnecting");
        client.reconnect_nodes();
    }

    client.close().await;
    Ok(())
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    debug!("Command {args:#?}");

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
