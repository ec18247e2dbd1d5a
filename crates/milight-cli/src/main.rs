//! Command-line interface for the Milight hub bridge.

mod host;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use milight_devices::config::env_vars;
use milight_devices::{
    BridgeConfig, BridgeService, DebugLevel, DeviceKind, InMemoryRegistry, MqttTransport,
};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;

/// Milight Hub bridge - Mirror hub lights into a device registry over MQTT.
#[derive(Parser, Debug)]
#[command(name = "milight-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Config file (TOML). Defaults to milight.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug level: None, Normal, Verbose or Verbose+.
    #[arg(short, long, global = true)]
    debug: Option<DebugLevel>,

    /// Verbose output (same as --debug Verbose).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// State-topic pattern.
    #[arg(long, global = true)]
    state_topic: Option<String>,

    /// Command-topic pattern.
    #[arg(long, global = true)]
    command_topic: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the broker and run the bridge.
    Run {
        /// Broker address.
        #[arg(long)]
        host: Option<String>,
        /// Broker port.
        #[arg(short, long)]
        port: Option<u16>,
        /// Broker username.
        #[arg(long)]
        username: Option<String>,
        /// Broker password.
        #[arg(long)]
        password: Option<String>,
        /// Comma-separated topics to ignore.
        #[arg(long)]
        ignored_topics: Option<String>,
        /// JSON options, e.g. {"addDiscoveredDeviceUsed": false}.
        #[arg(long)]
        options: Option<String>,
        /// Read host requests as JSON lines from stdin.
        #[arg(long)]
        stdin: bool,
    },
    /// Show the compiled topic patterns and resolve a sample topic.
    Topics {
        /// State topic to resolve.
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(config.debug);
    if let Some(path) = BridgeConfig::source_path(args.config.as_deref()) {
        info!("Loaded config from: {}", path.display());
    }

    match args.command {
        Command::Run { stdin, .. } => run_bridge(config, stdin).await,
        Command::Topics { topic } => show_topics(&config, topic.as_deref()),
        Command::Config => show_config(&config),
    }
}

/// Defaults, then file, then environment, then flags.
fn load_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::load(args.config.as_deref()).context("Failed to load config")?;
    config
        .apply_env()
        .context("Invalid MILIGHT_* environment variable")?;

    if let Some(debug) = args.debug {
        config.debug = debug;
    } else if args.verbose {
        config.debug = DebugLevel::Verbose;
    }
    if let Some(topic) = &args.state_topic {
        config.state_topic = topic.clone();
    }
    if let Some(topic) = &args.command_topic {
        config.command_topic = topic.clone();
    }

    if let Command::Run {
        host,
        port,
        username,
        password,
        ignored_topics,
        options,
        ..
    } = &args.command
    {
        if let Some(host) = host {
            config.mqtt.host = host.clone();
        }
        if let Some(port) = port {
            config.mqtt.port = *port;
        }
        if let Some(username) = username {
            config.mqtt.username = Some(username.clone());
        }
        if let Some(password) = password {
            config.mqtt.password = Some(password.clone());
        }
        if let Some(ignored) = ignored_topics {
            config.ignored_topics = ignored.clone();
        }
        if let Some(options) = options {
            config.options = options.clone();
        }
    }

    Ok(config)
}

fn init_tracing(debug: DebugLevel) {
    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(debug.filter_directive()));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run_bridge(config: BridgeConfig, stdin: bool) -> Result<()> {
    let settings = config.resolve().context("Invalid topic configuration")?;

    let registry = InMemoryRegistry::new();
    let (transport, events) = MqttTransport::start(&config.mqtt);
    let transport = Arc::new(transport);
    let (request_tx, requests) = mpsc::channel(32);

    if stdin {
        let console_registry = registry.clone();
        tokio::spawn(async move {
            let input = BufReader::new(tokio::io::stdin());
            if let Err(e) = host::run_console(input, console_registry, request_tx).await {
                tracing::warn!("Console stopped: {:#}", e);
            }
        });
    } else {
        drop(request_tx);
    }

    let service = BridgeService::new(Arc::new(registry.clone()), transport.clone(), settings);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    service.run(events, requests, shutdown).await;
    transport.shutdown();

    info!("Stopped with {} device(s) registered", registry.len().await);
    Ok(())
}

fn show_topics(config: &BridgeConfig, topic: Option<&str>) -> Result<()> {
    let settings = config.resolve().context("Invalid topic configuration")?;

    println!("State topic:   {}", settings.state_topic);
    println!("Command topic: {}", settings.command_topic);
    println!("Subscription:  {}", settings.state_topic.subscription_filter());

    let Some(topic) = topic else {
        return Ok(());
    };

    let Some(identity) = settings.state_topic.extract_identity(topic) else {
        bail!("Topic '{}' does not match the state pattern", topic);
    };

    println!();
    println!("Device id:     {}", identity.device_id());
    println!("Device type:   {}", identity.device_type());
    println!("Group id:      {}", identity.group_id());
    match DeviceKind::for_device_type(identity.device_type()) {
        Some(kind) => println!("Kind:          {}", kind),
        None => println!("Kind:          unsupported"),
    }
    println!("Commands to:   {}", settings.command_topic.render(&identity));
    if settings.ignored_topics.contains(topic) {
        println!("Ignored:       yes");
    }

    Ok(())
}

fn show_config(config: &BridgeConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.mqtt.password.is_some() {
        shown.mqtt.password = Some("********".to_string());
    }
    let rendered = toml::to_string(&shown).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}
