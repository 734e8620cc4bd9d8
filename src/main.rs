//! msgbridge - block-structured chat API in front of OpenAI-compatible backends
//!
//! A local proxy that accepts `/v1/messages` requests and forwards them to a
//! single chat-completions backend.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use msgbridge::config::{Config, KeySource, Overrides, Preset, API_KEY_ENV, PROXY_TOKEN_ENV};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "msgbridge")]
#[command(about = "Translate block-structured chat requests for OpenAI-compatible backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by `serve` and `check`. Credentials are not accepted here;
/// they come from the environment or the config file only.
#[derive(clap::Args)]
struct ConfigArgs {
    /// Path to an optional TOML configuration file
    #[arg(short, long, env = "MSGBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend preset: xai, zai or custom
    #[arg(short, long, env = "MSGBRIDGE_PROVIDER")]
    provider: Option<Preset>,

    /// Display name for the backend
    #[arg(long)]
    name: Option<String>,

    /// Backend base URL (required for the custom preset)
    #[arg(short, long, env = "MSGBRIDGE_URL")]
    url: Option<String>,

    /// Interface to listen on
    #[arg(long, env = "MSGBRIDGE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "MSGBRIDGE_PORT")]
    port: Option<u16>,

    /// Require `Authorization: Bearer $MSGBRIDGE_PROXY_TOKEN` on /v1/messages
    #[arg(long, env = "MSGBRIDGE_REQUIRE_AUTH")]
    require_auth: bool,
}

impl ConfigArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            preset: self.provider,
            name: self.name.clone(),
            url: self.url.clone(),
            host: self.host.clone(),
            port: self.port,
            require_auth: self.require_auth.then_some(true),
        }
    }

    fn load(&self) -> anyhow::Result<(Config, KeySource)> {
        Ok(Config::load(self.config.as_deref(), &self.overrides())?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        #[command(flatten)]
        args: ConfigArgs,
    },

    /// Validate configuration and print a redacted summary
    Check {
        #[command(flatten)]
        args: ConfigArgs,
    },

    /// Show the built-in backend presets
    Providers,
}

fn init_tracing(level: &str) {
    let default_filter = format!("msgbridge={},tower_http=info", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { args } => {
            let (config, key_source) = match args.load() {
                Ok(loaded) => loaded,
                Err(e) => {
                    init_tracing("info");
                    tracing::error!(error = %e, "Invalid configuration");
                    return Err(e);
                }
            };
            init_tracing(&config.logging.level);
            tracing::info!(key_source = %key_source, "Loaded configuration");

            msgbridge::proxy::run_server(config).await
        }

        Commands::Check { args } => {
            init_tracing("warn");
            let (config, key_source) = args.load()?;
            println!("{}", config.summary());
            println!("key from: {}", key_source);
            for warning in config.warnings() {
                println!("warning: {}", warning);
            }
            println!("Configuration OK");
            Ok(())
        }

        Commands::Providers => {
            for preset in Preset::ALL {
                println!(
                    "{:<8} {:<8} port {:<5} {}",
                    preset.id(),
                    preset.display_name(),
                    preset.default_port(),
                    preset.default_url().unwrap_or("(set --url)"),
                );
                println!(
                    "         key: ${} or ${}",
                    API_KEY_ENV,
                    preset.key_env_var()
                );
            }
            println!("\nProxy auth token: ${}", PROXY_TOKEN_ENV);
            Ok(())
        }
    }
}
