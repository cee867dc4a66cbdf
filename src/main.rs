//! cmdconfirm - MQTT command consumer entry point

use clap::{Parser, Subcommand};
use cmdconfirm::config::ClientConfig;
use cmdconfirm::error::SessionError;
use cmdconfirm::observability::{init_default_logging, metrics::metrics};
use cmdconfirm::session::{Session, StaticTopicSource, StdinTopicSource, TopicSource};
use cmdconfirm::transport::mqtt::MqttTransport;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Instrument};

/// Default configuration locations, tried in order
const DEFAULT_CONFIG_PATHS: &[&str] = &["cmdconfirm.toml", "config/cmdconfirm.toml"];

/// MQTT command consumer
#[derive(Parser)]
#[command(name = "cmdconfirm")]
#[command(about = "Subscribe to topics and confirm COMMAND messages on command/confirm")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CMDCONFIRM_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, subscribe and confirm commands until terminated
    Run {
        /// Topics to subscribe to instead of prompting, e.g. "devices/lamp devices/fan"
        #[arg(long)]
        topics: Option<String>,
    },
    /// Validate the configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { topics } => run_client(config, topics),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ClientConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ClientConfig::load_from_file(path)?);
        }
    }

    Err(format!(
        "No configuration file found. Provide one with -c/--config or create {}",
        DEFAULT_CONFIG_PATHS[0]
    )
    .into())
}

fn run_client(config: ClientConfig, topics: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    // The session loop is the only driver of progress
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        info!(
            "Starting cmdconfirm v{} for broker {}",
            env!("CARGO_PKG_VERSION"),
            config.broker.url
        );

        let transport = MqttTransport::new(&config).map_err(SessionError::Transport)?;
        let mut session = Session::with_transport(transport, &config)?;

        let mut source: Box<dyn TopicSource> = match topics {
            Some(line) => Box::new(StaticTopicSource::new([line])),
            None => Box::new(StdinTopicSource::new()),
        };

        let span = cmdconfirm::session_span!(client_id = %config.broker.client_id);
        let started = session.start(source.as_mut()).instrument(span).await;
        if let Err(e) = started {
            if let Ok(snapshot) = serde_json::to_string(&metrics().get_metrics()) {
                info!(metrics = %snapshot, "Metrics at startup failure");
            }
            return Err(e.into());
        }

        session.run().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn handle_config_command(config: &ClientConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
