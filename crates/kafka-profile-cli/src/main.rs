//! Kafka client profile CLI
//!
//! Builds a named client profile from a YAML settings file and runs
//! read-only queries against the cluster it points at.

mod commands;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_profile_core::{
    AuthConfig, ClientProfile, ClusterClient, ConfigSource, KafkaClient, ProfileBuilder, Settings,
    StaticTokenProvider, TransportLogger,
};

/// Inspect Kafka clusters through named client profiles.
#[derive(Parser)]
#[command(name = "kafka-profile")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Client profile to use; empty selects the built-in defaults.
    #[arg(short, long, default_value = "")]
    profile: String,

    /// Bootstrap servers, comma separated.
    #[arg(short, long, value_delimiter = ',', env = "KAFKA_BOOTSTRAP_SERVERS")]
    servers: Vec<String>,

    /// Pre-signed token for profiles using IAM authentication.
    #[arg(long, env = "KAFKA_IAM_TOKEN", hide_env_values = true)]
    iam_token: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the profile, connect, and summarize the cluster.
    Check,
    /// List topics with their partition counts.
    Topics,
    /// List consumer groups and their protocol types.
    Groups,
    /// Show earliest and latest offsets of a topic's partitions.
    Offsets {
        /// Topic to inspect.
        topic: String,
    },
}

/// `logging.*` section of the settings file.
#[derive(Debug, Clone)]
struct LoggingConfig {
    level: String,
    json: bool,
}

impl LoggingConfig {
    fn from_settings(settings: &dyn ConfigSource) -> Self {
        let level = settings.get_string("logging.level");
        Self {
            level: if level.is_empty() {
                "info".to_string()
            } else {
                level
            },
            json: settings.get_bool("logging.json"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::from_file(&args.config)
        .with_context(|| format!("failed to load settings from {}", args.config))?;

    let logging = LoggingConfig::from_settings(&settings);
    let log_config = match args.verbose {
        0 => logging,
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..logging
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..logging
        },
    };
    setup_tracing(&log_config);

    let profile = ProfileBuilder::new(&settings)
        .build(&args.profile)
        .with_context(|| format!("invalid client profile '{}'", args.profile))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = %profile.name,
        kafka_version = %profile.version,
        tls = profile.tls_enabled(),
        "starting kafka-profile"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(args, profile))
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Reports go to stdout; keep logs out of the way.
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn run(args: Args, profile: ClientProfile) -> anyhow::Result<()> {
    if args.servers.is_empty() {
        bail!("no bootstrap servers given (use --servers or KAFKA_BOOTSTRAP_SERVERS)");
    }

    let profile = Arc::new(profile);
    let logger = TransportLogger::current();
    let iam = matches!(profile.auth, AuthConfig::AwsIam(_));
    let client = match args.iam_token {
        Some(token) if iam => {
            let provider = Arc::new(StaticTokenProvider::new(token));
            KafkaClient::connect_with_token_provider(profile, &args.servers, logger, provider).await
        }
        _ => KafkaClient::connect(profile, &args.servers, logger).await,
    }
    .context("failed to connect to cluster")?;

    execute(&client, &args.command).await
}

/// Run `command` and print its report. The client is closed either way;
/// a command failure takes precedence over a close failure.
async fn execute(client: &dyn ClusterClient, command: &Command) -> anyhow::Result<()> {
    let result = match command {
        Command::Check => commands::check(client).await.and_then(|report| print(&report)),
        Command::Topics => commands::topics(client).await.and_then(|report| print(&report)),
        Command::Groups => commands::groups(client).await.and_then(|report| print(&report)),
        Command::Offsets { topic } => commands::offsets(client, topic)
            .await
            .and_then(|report| print(&report)),
    };

    let closed = client.close().await.context("failed to close client");
    result.and(closed)
}

fn print<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
